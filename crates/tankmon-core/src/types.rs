use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::ops::RangeInclusive;

// ─── Ports ────────────────────────────────────────────────────────

/// Lowest port accepted as a manual pin.
pub const MIN_PINNED_PORT: u16 = 1024;

/// Default auto-discovery range start (inclusive).
pub const DEFAULT_SCAN_START: u16 = 7070;

/// Default auto-discovery range end (inclusive). 130 slots with the start above.
pub const DEFAULT_SCAN_END: u16 = 7199;

/// Inclusive port range probed by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Result<Self, CoreError> {
        if start == 0 || start > end {
            return Err(CoreError::InvalidPortRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn len(&self) -> usize {
        usize::from(self.end - self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }

    pub fn ports(&self) -> RangeInclusive<u16> {
        self.start..=self.end
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            start: DEFAULT_SCAN_START,
            end: DEFAULT_SCAN_END,
        }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Validate a manual pin. `0` clears the pin; anything else must be in
/// `1024..=65535`.
pub fn validate_pin(port: u32) -> Result<u16, CoreError> {
    if port == 0 {
        return Ok(0);
    }
    match u16::try_from(port) {
        Ok(p) if p >= MIN_PINNED_PORT => Ok(p),
        _ => Err(CoreError::InvalidPin(port)),
    }
}

// ─── Account ──────────────────────────────────────────────────────

/// Tracked account as seen by the engine. Owned by the external store;
/// the engine only reads these three fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub display_name: String,
    /// Manual port override. `0` means auto-discovery.
    #[serde(default)]
    pub pinned_port: u16,
}

impl Account {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            pinned_port: 0,
        }
    }

    #[must_use]
    pub fn pinned(mut self, port: u16) -> Self {
        self.pinned_port = port;
        self
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned_port > 0
    }

    /// Case-insensitive identity key compared against `playerName`.
    pub fn match_key(&self) -> String {
        identity_key(&self.display_name)
    }
}

/// Normalize a reported or configured name into a comparable identity key.
pub fn identity_key(name: &str) -> String {
    name.trim().to_lowercase()
}

// ─── Status payload (`GET /status`) ───────────────────────────────

fn default_script_status() -> String {
    "IDLE".to_string()
}

/// Decode a field, falling back to its default on `null` or a type mismatch.
/// One malformed cosmetic field must not reject the whole payload.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(raw).unwrap_or_default())
}

fn lenient_script_status<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(status) => status,
        _ => default_script_status(),
    })
}

fn lenient_login_state<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(state) => Some(state),
        _ => None,
    })
}

/// Profit may arrive as an integer, a float (truncated) or a numeric string.
/// Anything else is unknown.
fn lenient_profit<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(match &raw {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>().ok().or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    })
}

/// Schema of the `/status` payload.
///
/// Missing fields fall back to their defaults (empty name, zero numerics,
/// not paused, `"IDLE"` script). `profit_gp` and `login_state` stay `None`
/// when absent: that means "unknown", never zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    #[serde(default, deserialize_with = "lenient")]
    pub player_name: String,
    #[serde(default, deserialize_with = "lenient")]
    pub world: u32,
    #[serde(default, deserialize_with = "lenient")]
    pub hp: u32,
    #[serde(default, deserialize_with = "lenient")]
    pub max_hp: u32,
    #[serde(default, deserialize_with = "lenient")]
    pub uptime_seconds: u64,
    #[serde(default, deserialize_with = "lenient")]
    pub paused: bool,
    #[serde(default = "default_script_status", deserialize_with = "lenient_script_status")]
    pub script_status: String,
    #[serde(
        default,
        deserialize_with = "lenient_profit",
        skip_serializing_if = "Option::is_none"
    )]
    pub profit_gp: Option<i64>,
    #[serde(
        default,
        deserialize_with = "lenient_login_state",
        skip_serializing_if = "Option::is_none"
    )]
    pub login_state: Option<String>,
}

impl Default for StatusPayload {
    fn default() -> Self {
        Self {
            player_name: String::new(),
            world: 0,
            hp: 0,
            max_hp: 0,
            uptime_seconds: 0,
            paused: false,
            script_status: default_script_status(),
            profit_gp: None,
            login_state: None,
        }
    }
}

impl StatusPayload {
    /// Parse a raw `/status` body. Only non-objects are rejected; each field
    /// falls back on its own.
    pub fn from_value(value: serde_json::Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    /// Identity key of the reporting client, `None` when the name is blank.
    pub fn identity(&self) -> Option<String> {
        let key = identity_key(&self.player_name);
        (!key.is_empty()).then_some(key)
    }

    pub fn is_logged_in(&self) -> bool {
        self.login_state.as_deref() == Some("LOGGED_IN")
    }
}

// ─── Plugins (`GET /plugins`) ─────────────────────────────────────

/// One plugin entry as reported by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginState {
    pub class_name: String,
    pub name: String,
    pub active: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlugin {
    #[serde(default)]
    class_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    active: Option<bool>,
}

impl PluginState {
    pub fn new(class_name: impl Into<String>, name: impl Into<String>, active: bool) -> Self {
        Self {
            class_name: class_name.into(),
            name: name.into(),
            active,
        }
    }
}

/// Fallback display name: last dotted segment of the class name.
fn short_class_name(class_name: &str) -> &str {
    class_name.rsplit('.').next().unwrap_or(class_name)
}

/// Parse a `/plugins` body. Non-array bodies yield an empty list; entries
/// without a class name are dropped.
pub fn parse_plugins(value: serde_json::Value) -> Vec<PluginState> {
    let serde_json::Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<RawPlugin>(item).ok())
        .filter_map(|raw| {
            let class_name = raw.class_name.filter(|c| !c.trim().is_empty())?;
            let name = match raw.name {
                Some(n) if !n.trim().is_empty() => n,
                _ => short_class_name(&class_name).to_string(),
            };
            Some(PluginState {
                class_name,
                name,
                active: raw.active.unwrap_or(false),
            })
        })
        .collect()
}

// ─── Logs (`GET /logs`) ───────────────────────────────────────────

/// Parse a `/logs` body: either a list of strings or a single string.
pub fn parse_logs(value: serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::String(line) => vec![line],
        serde_json::Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::String(line) => Some(line),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

// ─── Probe result ─────────────────────────────────────────────────

/// Everything one port reported during one probe round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub port: u16,
    pub status: StatusPayload,
    pub plugins: Vec<PluginState>,
    pub logs: Vec<String>,
}

impl ProbeResult {
    pub fn new(port: u16, status: StatusPayload) -> Self {
        Self {
            port,
            status,
            plugins: Vec::new(),
            logs: Vec::new(),
        }
    }
}

// ─── Error ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    InvalidPin(u32),
    InvalidPortRange { start: u16, end: u16 },
    InvalidThreshold(u32),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPin(port) => {
                write!(f, "pinned port {port} outside {MIN_PINNED_PORT}-65535")
            }
            Self::InvalidPortRange { start, end } => {
                write!(f, "invalid port range {start}-{end}")
            }
            Self::InvalidThreshold(n) => write!(f, "offline threshold must be >= 1, got {n}"),
        }
    }
}

impl std::error::Error for CoreError {}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_range_has_130_slots() {
        let range = PortRange::default();
        assert_eq!(range.len(), 130);
        assert!(range.contains(7070));
        assert!(range.contains(7199));
        assert!(!range.contains(7200));
        assert_eq!(range.to_string(), "7070-7199");
    }

    #[test]
    fn range_rejects_inverted_bounds() {
        assert_eq!(
            PortRange::new(7200, 7100),
            Err(CoreError::InvalidPortRange {
                start: 7200,
                end: 7100
            })
        );
        assert!(PortRange::new(0, 10).is_err());
        assert_eq!(PortRange::new(8000, 8000).expect("single").len(), 1);
    }

    #[test]
    fn pin_validation() {
        assert_eq!(validate_pin(0), Ok(0));
        assert_eq!(validate_pin(1024), Ok(1024));
        assert_eq!(validate_pin(65535), Ok(65535));
        assert_eq!(validate_pin(1023), Err(CoreError::InvalidPin(1023)));
        assert_eq!(validate_pin(70000), Err(CoreError::InvalidPin(70000)));
    }

    #[test]
    fn match_key_is_trimmed_and_lowercased() {
        let acc = Account::new("a1", "  Bob The Builder ");
        assert_eq!(acc.match_key(), "bob the builder");
        assert!(!acc.is_pinned());
        assert!(acc.pinned(9000).is_pinned());
    }

    #[test]
    fn status_defaults_apply_to_missing_fields() {
        let status = StatusPayload::from_value(json!({"playerName": "Bob"})).expect("parse");
        assert_eq!(status.player_name, "Bob");
        assert_eq!(status.world, 0);
        assert!(!status.paused);
        assert_eq!(status.script_status, "IDLE");
        assert_eq!(status.profit_gp, None);
        assert_eq!(status.login_state, None);
    }

    #[test]
    fn status_profit_zero_is_distinct_from_missing() {
        let status = StatusPayload::from_value(json!({"profitGp": 0})).expect("parse");
        assert_eq!(status.profit_gp, Some(0));
    }

    #[test]
    fn status_null_fields_take_defaults() {
        let status =
            StatusPayload::from_value(json!({"playerName": null, "hp": null})).expect("parse");
        assert_eq!(status.player_name, "");
        assert_eq!(status.hp, 0);
        assert_eq!(status.identity(), None);
    }

    #[test]
    fn status_rejects_only_non_objects() {
        assert!(StatusPayload::from_value(json!(["Bob"])).is_none());
        assert!(StatusPayload::from_value(json!("Bob")).is_none());
        let status = StatusPayload::from_value(json!({"playerName": "Bob", "world": "three"}))
            .expect("parse");
        assert_eq!(status.world, 0);
        assert_eq!(status.identity().as_deref(), Some("bob"));
    }

    #[test]
    fn status_ill_typed_fields_fall_back_per_field() {
        let status = StatusPayload::from_value(json!({
            "playerName": "Amy",
            "hp": -1,
            "maxHp": "lots",
            "uptimeSeconds": 12.5,
            "paused": "yes",
            "scriptStatus": 3,
            "loginState": false,
        }))
        .expect("parse");
        assert_eq!(status.player_name, "Amy");
        assert_eq!(status.hp, 0);
        assert_eq!(status.max_hp, 0);
        assert_eq!(status.uptime_seconds, 0);
        assert!(!status.paused);
        assert_eq!(status.script_status, "IDLE");
        assert_eq!(status.login_state, None);
    }

    #[test]
    fn status_profit_accepts_floats_and_numeric_strings() {
        let parse = |v: serde_json::Value| {
            StatusPayload::from_value(json!({ "profitGp": v })).expect("parse")
        };
        assert_eq!(parse(json!(1234.5)).profit_gp, Some(1234));
        assert_eq!(parse(json!(-99.9)).profit_gp, Some(-99));
        assert_eq!(parse(json!("42")).profit_gp, Some(42));
        assert_eq!(parse(json!("n/a")).profit_gp, None);
        assert_eq!(parse(json!(null)).profit_gp, None);
    }

    #[test]
    fn status_login_state() {
        let status =
            StatusPayload::from_value(json!({"loginState": "LOGGED_IN"})).expect("parse");
        assert!(status.is_logged_in());
        assert!(!StatusPayload::default().is_logged_in());
    }

    #[test]
    fn plugins_parse_with_fallback_names() {
        let plugins = parse_plugins(json!([
            {"className": "net.runelite.client.plugins.microbot.Woodcutting", "active": true},
            {"className": "com.x.Other", "name": "Other Plugin"},
            {"name": "no class"},
            42
        ]));
        assert_eq!(plugins.len(), 2);
        assert_eq!(plugins[0].name, "Woodcutting");
        assert!(plugins[0].active);
        assert_eq!(plugins[1].name, "Other Plugin");
        assert!(!plugins[1].active);
    }

    #[test]
    fn plugins_non_array_is_empty() {
        assert!(parse_plugins(json!({"className": "x"})).is_empty());
        assert!(parse_plugins(serde_json::Value::Null).is_empty());
    }

    #[test]
    fn logs_accept_list_or_single_string() {
        assert_eq!(parse_logs(json!("one")), vec!["one".to_string()]);
        assert_eq!(
            parse_logs(json!(["a", 1, "b"])),
            vec!["a".to_string(), "b".to_string()]
        );
        assert!(parse_logs(json!({"x": 1})).is_empty());
    }

    #[test]
    fn error_display() {
        assert!(CoreError::InvalidPin(80).to_string().contains("80"));
        assert!(
            CoreError::InvalidThreshold(0)
                .to_string()
                .contains("threshold")
        );
    }
}

//! Display strings derived from a binding's last status.
//!
//! Consumers render these as-is; nothing here touches binding state.

use serde::{Deserialize, Serialize};

use crate::plugins::drop_party_active;
use crate::types::{PluginState, ProbeResult, StatusPayload};

/// Placeholder for unknown values.
pub const UNKNOWN: &str = "—";

/// Longest log message kept, in characters.
pub const MAX_LOG_CHARS: usize = 80;

/// Hp below this fraction of max is shown as low.
const LOW_HP_RATIO: f64 = 0.3;

/// Coarse colour hint for a rendered value.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    #[default]
    Normal,
    Muted,
    Good,
    Bad,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusView {
    pub online: bool,
    pub player: String,
    pub world: String,
    pub hp: String,
    pub hp_low: bool,
    pub uptime: String,
    pub profit: String,
    pub profit_tone: Tone,
    pub script: String,
    pub script_tone: Tone,
}

impl StatusView {
    pub fn offline() -> Self {
        Self {
            online: false,
            player: String::new(),
            world: UNKNOWN.into(),
            hp: UNKNOWN.into(),
            hp_low: false,
            uptime: UNKNOWN.into(),
            profit: UNKNOWN.into(),
            profit_tone: Tone::Muted,
            script: UNKNOWN.into(),
            script_tone: Tone::Muted,
        }
    }

    pub fn from_result(result: Option<&ProbeResult>) -> Self {
        let Some(result) = result else {
            return Self::offline();
        };
        let status = &result.status;
        let (profit, profit_tone) = match status.profit_gp {
            Some(gp) => format_profit(gp),
            None => (UNKNOWN.to_string(), Tone::Muted),
        };
        let (script, script_tone) =
            script_label(status, &last_log_message(&result.logs), &result.plugins);

        Self {
            online: true,
            player: status.player_name.clone(),
            world: if status.world > 0 {
                status.world.to_string()
            } else {
                UNKNOWN.into()
            },
            hp: if status.max_hp > 0 {
                format!("{}/{}", status.hp, status.max_hp)
            } else {
                UNKNOWN.into()
            },
            hp_low: is_hp_low(status.hp, status.max_hp),
            uptime: format_uptime(status.uptime_seconds),
            profit,
            profit_tone,
            script,
            script_tone,
        }
    }
}

/// Message part of the last non-blank log line (`HH:mm:ss LEVEL logger - message`).
pub fn last_log_message(logs: &[String]) -> String {
    let Some(line) = logs.iter().rev().map(|l| l.trim()).find(|l| !l.is_empty()) else {
        return String::new();
    };
    let msg = match line.split_once(" - ") {
        Some((_, rest)) => rest.trim(),
        None => line,
    };
    if msg.chars().count() > MAX_LOG_CHARS {
        let mut cut: String = msg.chars().take(MAX_LOG_CHARS).collect();
        cut.push('…');
        cut
    } else {
        msg.to_string()
    }
}

pub fn format_profit(gp: i64) -> (String, Tone) {
    if gp == 0 {
        return ("0 gp".into(), Tone::Muted);
    }
    let (sign, tone) = if gp > 0 {
        ('+', Tone::Good)
    } else {
        ('-', Tone::Bad)
    };
    let val = gp.unsigned_abs();
    let text = if val >= 1_000_000 {
        format!("{sign}{:.1}m", val as f64 / 1_000_000.0)
    } else if val >= 1_000 {
        format!("{sign}{:.1}k", val as f64 / 1_000.0)
    } else {
        format!("{sign}{val} gp")
    };
    (text, tone)
}

pub fn format_uptime(seconds: u64) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{h}h {m}m")
    } else {
        format!("{m}m {s}s")
    }
}

pub fn is_hp_low(hp: u32, max_hp: u32) -> bool {
    max_hp > 0 && f64::from(hp) < f64::from(max_hp) * LOW_HP_RATIO
}

/// Script line: paused wins, then the latest log, then the reported status.
pub fn script_label(status: &StatusPayload, last_log: &str, plugins: &[PluginState]) -> (String, Tone) {
    if status.paused {
        return ("PAUSED".into(), Tone::Warn);
    }
    if !last_log.is_empty() {
        return (last_log.to_string(), Tone::Good);
    }
    let idle = status.script_status.is_empty() || status.script_status == "IDLE";
    if idle && drop_party_active(plugins) {
        return ("DROP PARTY".into(), Tone::Good);
    }
    if idle {
        let label = if status.script_status.is_empty() {
            "IDLE".to_string()
        } else {
            status.script_status.clone()
        };
        (label, Tone::Muted)
    } else {
        (status.script_status.clone(), Tone::Good)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_message_strips_prefix_and_skips_blanks() {
        let logs = vec![
            "12:00:01 INFO Script - chopping".to_string(),
            "12:00:02 INFO Script - banking logs".to_string(),
            "   ".to_string(),
        ];
        assert_eq!(last_log_message(&logs), "banking logs");
        assert_eq!(last_log_message(&["raw line".to_string()]), "raw line");
        assert_eq!(last_log_message(&[]), "");
    }

    #[test]
    fn log_message_truncates_on_chars() {
        let long = format!("t INFO x - {}", "é".repeat(100));
        let msg = last_log_message(&[long]);
        assert_eq!(msg.chars().count(), MAX_LOG_CHARS + 1);
        assert!(msg.ends_with('…'));
    }

    #[test]
    fn profit_formatting() {
        assert_eq!(format_profit(0), ("0 gp".into(), Tone::Muted));
        assert_eq!(format_profit(950), ("+950 gp".into(), Tone::Good));
        assert_eq!(format_profit(1_240), ("+1.2k".into(), Tone::Good));
        assert_eq!(format_profit(-3_400_000), ("-3.4m".into(), Tone::Bad));
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(250), "4m 10s");
        assert_eq!(format_uptime(3900), "1h 5m");
        assert_eq!(format_uptime(0), "0m 0s");
    }

    #[test]
    fn hp_low_threshold() {
        assert!(is_hp_low(29, 100));
        assert!(!is_hp_low(30, 100));
        assert!(!is_hp_low(0, 0));
    }

    #[test]
    fn script_label_priority() {
        let mut status = StatusPayload::default();
        let plugins = vec![PluginState::new("com.x.DropParty", "DP", true)];

        assert_eq!(script_label(&status, "", &plugins).0, "DROP PARTY");
        assert_eq!(script_label(&status, "", &[]), ("IDLE".into(), Tone::Muted));
        assert_eq!(script_label(&status, "walking", &plugins).0, "walking");

        status.script_status = "RUNNING".into();
        assert_eq!(script_label(&status, "", &plugins), ("RUNNING".into(), Tone::Good));

        status.paused = true;
        assert_eq!(script_label(&status, "walking", &plugins), ("PAUSED".into(), Tone::Warn));
    }

    #[test]
    fn view_of_missing_result_is_offline() {
        let view = StatusView::from_result(None);
        assert!(!view.online);
        assert_eq!(view.profit, UNKNOWN);
    }

    #[test]
    fn view_of_live_result() {
        let mut result = ProbeResult::new(
            7070,
            StatusPayload {
                player_name: "Bob".into(),
                world: 301,
                hp: 10,
                max_hp: 99,
                uptime_seconds: 61,
                ..StatusPayload::default()
            },
        );
        result.logs = vec!["t INFO s - mining".into()];

        let view = StatusView::from_result(Some(&result));
        assert!(view.online);
        assert_eq!(view.world, "301");
        assert_eq!(view.hp, "10/99");
        assert!(view.hp_low);
        assert_eq!(view.uptime, "1m 1s");
        assert_eq!(view.profit, UNKNOWN);
        assert_eq!(view.script, "mining");
    }
}

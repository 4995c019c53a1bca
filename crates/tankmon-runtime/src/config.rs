//! Engine configuration: optional TOML file, every field defaulted.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use tankmon_core::plugins::DEFAULT_MANAGED_MARKERS;
use tankmon_core::{DEFAULT_OFFLINE_THRESHOLD, ManagedMarkers, PortRange};
use tankmon_probe::{DEFAULT_HOST, ProbeTimeouts};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub host: String,
    pub port_range: PortRange,
    pub scan_interval_ms: u64,
    pub self_poll_interval_ms: u64,
    pub offline_threshold: u32,
    pub scan_timeout_ms: u64,
    pub detail_timeout_ms: u64,
    pub command_timeout_ms: u64,
    pub reset_settle_ms: u64,
    pub managed_plugin_markers: Vec<String>,
    /// External account store. `None` uses [`default_data_dir`].
    pub accounts_path: Option<PathBuf>,
    /// Favorites file. `None` uses [`default_data_dir`].
    pub favorites_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let timeouts = ProbeTimeouts::default();
        Self {
            host: DEFAULT_HOST.to_string(),
            port_range: PortRange::default(),
            scan_interval_ms: 5000,
            self_poll_interval_ms: 5000,
            offline_threshold: DEFAULT_OFFLINE_THRESHOLD,
            scan_timeout_ms: duration_ms(timeouts.scan),
            detail_timeout_ms: duration_ms(timeouts.detail),
            command_timeout_ms: duration_ms(timeouts.command),
            reset_settle_ms: 1200,
            managed_plugin_markers: DEFAULT_MANAGED_MARKERS.iter().map(|m| m.to_string()).collect(),
            accounts_path: None,
            favorites_path: None,
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl EngineConfig {
    /// Load from `path`, or defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        PortRange::new(self.port_range.start, self.port_range.end)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.offline_threshold == 0 {
            return Err(ConfigError::Invalid(
                tankmon_core::CoreError::InvalidThreshold(0).to_string(),
            ));
        }
        for (name, value) in [
            ("scan_interval_ms", self.scan_interval_ms),
            ("self_poll_interval_ms", self.self_poll_interval_ms),
            ("scan_timeout_ms", self.scan_timeout_ms),
            ("detail_timeout_ms", self.detail_timeout_ms),
            ("command_timeout_ms", self.command_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be > 0")));
            }
        }
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".into()));
        }
        Ok(())
    }

    pub fn timeouts(&self) -> ProbeTimeouts {
        ProbeTimeouts {
            scan: Duration::from_millis(self.scan_timeout_ms),
            detail: Duration::from_millis(self.detail_timeout_ms),
            command: Duration::from_millis(self.command_timeout_ms),
        }
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn self_poll_interval(&self) -> Duration {
        Duration::from_millis(self.self_poll_interval_ms)
    }

    pub fn reset_settle(&self) -> Duration {
        Duration::from_millis(self.reset_settle_ms)
    }

    pub fn markers(&self) -> ManagedMarkers {
        ManagedMarkers::new(&self.managed_plugin_markers)
    }

    pub fn accounts_path(&self) -> PathBuf {
        self.accounts_path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("accounts.json"))
    }

    pub fn favorites_path(&self) -> PathBuf {
        self.favorites_path
            .clone()
            .unwrap_or_else(|| default_data_dir().join("favorites.json"))
    }
}

/// `$XDG_CONFIG_HOME/tankmon`, else `$HOME/.config/tankmon`.
pub fn default_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME")
        && !dir.is_empty()
    {
        return PathBuf::from(dir).join("tankmon");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config").join("tankmon")
}

// ─── Tests ────────────────────────────────────────────────────────

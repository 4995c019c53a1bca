//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::EngineConfig;

#[derive(Parser)]
#[command(name = "tankmon", about = "live status for local game clients")]
pub struct Cli {
    /// UDS socket path (default: /tmp/tankmon-$USER/tankmond.sock)
    #[arg(long, short = 's', global = true)]
    pub socket_path: Option<String>,

    /// Engine config file (TOML)
    #[arg(long, global = true, env = "TANKMON_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the daemon (engine + UDS server)
    Daemon(DaemonOpts),
    /// List accounts and their live status (default)
    Ls(LsOpts),
    /// Request an immediate refresh
    Refresh(RefreshOpts),
    /// Start or stop a plugin
    Toggle(ToggleOpts),
    /// Stop and restart every active managed plugin
    Reset(AccountArg),
    /// Reset the session profit counter
    ProfitReset(AccountArg),
    /// Pause the running script
    Pause(AccountArg),
    /// Resume the running script
    Resume(AccountArg),
    /// Star or unstar a plugin
    Star(PluginArgs),
    /// Block until an account reports logged in
    Wait(WaitOpts),
}

#[derive(Args, Default)]
pub struct DaemonOpts {
    /// Account store (accounts.json)
    #[arg(long)]
    pub accounts: Option<PathBuf>,

    /// Scan interval in milliseconds
    #[arg(long)]
    pub scan_interval_ms: Option<u64>,

    /// Consecutive misses before an account is offline
    #[arg(long)]
    pub offline_threshold: Option<u32>,

    /// Client host
    #[arg(long)]
    pub host: Option<String>,
}

impl DaemonOpts {
    /// Apply flag overrides on top of the loaded config.
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(path) = &self.accounts {
            config.accounts_path = Some(path.clone());
        }
        if let Some(ms) = self.scan_interval_ms {
            config.scan_interval_ms = ms;
        }
        if let Some(n) = self.offline_threshold {
            config.offline_threshold = n;
        }
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
    }
}

#[derive(Args, Default)]
pub struct LsOpts {
    /// Show every plugin, not only managed ones
    #[arg(long)]
    pub all: bool,

    /// Raw JSON output
    #[arg(long)]
    pub json: bool,

    /// Color output: auto, always, never
    #[arg(long, default_value = "auto")]
    pub color: String,
}

#[derive(Args)]
pub struct RefreshOpts {
    /// Only this account (id or display name)
    pub account: Option<String>,
}

#[derive(Args)]
pub struct AccountArg {
    /// Account id or display name
    pub account: String,
}

#[derive(Args)]
pub struct PluginArgs {
    /// Account id or display name
    pub account: String,
    /// Plugin class name
    pub class_name: String,
}

#[derive(Args)]
pub struct ToggleOpts {
    #[command(flatten)]
    pub plugin: PluginArgs,

    /// Force on
    #[arg(long, conflicts_with = "off")]
    pub on: bool,

    /// Force off
    #[arg(long)]
    pub off: bool,
}

impl ToggleOpts {
    /// Explicit target, `None` to flip.
    pub fn target(&self) -> Option<bool> {
        match (self.on, self.off) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Args)]
pub struct WaitOpts {
    /// Account id or display name
    pub account: String,

    /// Timeout in seconds
    #[arg(long, default_value = "180")]
    pub timeout: u64,

    /// No progress output
    #[arg(long, short)]
    pub quiet: bool,
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/tankmon/tankmond.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/tankmon-{user}/tankmond.sock")
}

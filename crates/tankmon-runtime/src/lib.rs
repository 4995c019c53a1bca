//! tankmon-runtime: the engine (scheduler, self-pollers, toggle
//! coordinator), the account and favorites stores, and the daemon/CLI
//! surface around them.

pub mod accounts;
pub mod cli;
pub mod client;
pub mod cmd_ls;
pub mod cmd_wait;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod daemon;
pub mod engine;
pub mod favorites;
pub mod scheduler;
mod self_poller;
pub mod server;
pub mod sink;

pub use accounts::{AccountSource, AccountsError, JsonAccountFile, StaticAccounts};
pub use config::{ConfigError, EngineConfig};
pub use coordinator::{CommandOutcome, PluginToggleCoordinator, ResetOutcome};
pub use engine::Engine;
pub use favorites::Favorites;
pub use scheduler::{CycleOutcome, CycleStats};
pub use server::{ServerState, handle_request};
pub use sink::{BroadcastSink, StatusEvent, StatusSink, TracingSink};

//! tankmon-core: pure status-aggregation logic.
//! Payload schema, snapshot matching, per-account binding state machine,
//! plugin ordering and display helpers. No IO, no async.

pub mod binding;
pub mod matcher;
pub mod plugins;
pub mod snapshot;
pub mod table;
pub mod types;
pub mod view;

pub use binding::{
    AccountBinding, BindingEvent, BindingSignal, BindingState, DEFAULT_OFFLINE_THRESHOLD,
    apply_binding_event,
};
pub use matcher::{IdentityIndex, MatchCollision, MatchOutcome, MatchReport, match_accounts};
pub use plugins::{ManagedMarkers, order_plugins};
pub use snapshot::ScanSnapshot;
pub use table::{BindingTable, PinChange, SyncReport};
pub use types::{
    Account, CoreError, PluginState, PortRange, ProbeResult, StatusPayload, identity_key,
    parse_logs, parse_plugins, validate_pin,
};
pub use view::{StatusView, Tone};

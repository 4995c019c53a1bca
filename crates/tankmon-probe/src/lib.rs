//! tankmon-probe: HTTP IO boundary.
//! Transport trait with a pooled reqwest implementation, per-port probes,
//! the range scanner and client commands. No binding logic lives here.

pub mod commands;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod prober;
pub mod scanner;
pub mod transport;

pub use commands::ClientCommand;
pub use error::ProbeError;
pub use prober::{LOGS_PATH, PLUGINS_PATH, PortProber, ProbeTimeouts, STATUS_PATH};
pub use scanner::{ScanDepth, Scanner};
pub use transport::{DEFAULT_HOST, HttpTransport, ProbeTransport};

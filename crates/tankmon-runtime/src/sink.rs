//! Consumer-facing status signals.

use serde::Serialize;
use tokio::sync::broadcast;

use tankmon_core::ProbeResult;

/// Receives debounced per-account updates. Called after the batch that
/// produced them is committed, never while the binding lock is held.
pub trait StatusSink: Send + Sync {
    fn on_matched(&self, account_id: &str, result: &ProbeResult);
    fn on_offline(&self, account_id: &str);
}

/// Logs every signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn on_matched(&self, account_id: &str, result: &ProbeResult) {
        tracing::debug!(
            account = account_id,
            port = result.port,
            player = %result.status.player_name,
            plugins = result.plugins.len(),
            "matched"
        );
    }

    fn on_offline(&self, account_id: &str) {
        tracing::info!(account = account_id, "offline");
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusEvent {
    Matched {
        account_id: String,
        result: ProbeResult,
    },
    Offline {
        account_id: String,
    },
}

impl StatusEvent {
    pub fn account_id(&self) -> &str {
        match self {
            Self::Matched { account_id, .. } | Self::Offline { account_id } => account_id,
        }
    }
}

/// Fans signals out to any number of subscribers. Lagging receivers lose
/// the oldest events; sending with no subscriber is not an error.
pub struct BroadcastSink {
    tx: broadcast::Sender<StatusEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }
}

impl StatusSink for BroadcastSink {
    fn on_matched(&self, account_id: &str, result: &ProbeResult) {
        let _ = self.tx.send(StatusEvent::Matched {
            account_id: account_id.to_string(),
            result: result.clone(),
        });
    }

    fn on_offline(&self, account_id: &str) {
        let _ = self.tx.send(StatusEvent::Offline {
            account_id: account_id.to_string(),
        });
    }
}

//! PortProber: bounded-timeout probes that never fail loudly.
//!
//! Every transport error is logged at `trace` and folded into `None`;
//! callers only ever see "data" or "no data from this port".

use std::time::Duration;

use serde_json::Value;
use tankmon_core::{PluginState, ProbeResult, StatusPayload, parse_logs, parse_plugins};

use crate::transport::ProbeTransport;

pub const STATUS_PATH: &str = "/status";
pub const PLUGINS_PATH: &str = "/plugins";
pub const LOGS_PATH: &str = "/logs";

/// Per-request timeouts by request class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTimeouts {
    /// `/status` during a range scan.
    pub scan: Duration,
    /// `/status`, `/plugins` and `/logs` for a known port.
    pub detail: Duration,
    /// POST commands.
    pub command: Duration,
}

impl Default for ProbeTimeouts {
    fn default() -> Self {
        Self {
            scan: Duration::from_millis(300),
            detail: Duration::from_millis(1000),
            command: Duration::from_millis(3000),
        }
    }
}

pub struct PortProber<T> {
    transport: T,
    timeouts: ProbeTimeouts,
}

impl<T: ProbeTransport> PortProber<T> {
    pub fn new(transport: T, timeouts: ProbeTimeouts) -> Self {
        Self {
            transport,
            timeouts,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn timeouts(&self) -> ProbeTimeouts {
        self.timeouts
    }

    /// One GET. Refusal, timeout, non-2xx or a non-JSON body yield `None`.
    pub async fn probe(&self, port: u16, path: &str, timeout: Duration) -> Option<Value> {
        match self.transport.get(port, path, timeout).await {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::trace!(port, path, error = %e, "probe failed");
                None
            }
        }
    }

    /// `/status` parsed against the payload schema.
    pub async fn status(&self, port: u16, timeout: Duration) -> Option<StatusPayload> {
        let value = self.probe(port, STATUS_PATH, timeout).await?;
        let status = StatusPayload::from_value(value);
        if status.is_none() {
            tracing::trace!(port, "status payload did not match schema");
        }
        status
    }

    /// Plugins and logs, fetched concurrently; each defaults to empty.
    pub async fn details(&self, port: u16) -> (Vec<PluginState>, Vec<String>) {
        let (plugins, logs) = tokio::join!(
            self.probe(port, PLUGINS_PATH, self.timeouts.detail),
            self.probe(port, LOGS_PATH, self.timeouts.detail),
        );
        (
            plugins.map(parse_plugins).unwrap_or_default(),
            logs.map(parse_logs).unwrap_or_default(),
        )
    }

    /// Full result for one port: `None` unless `/status` succeeds.
    pub async fn fetch_result(&self, port: u16, status_timeout: Duration) -> Option<ProbeResult> {
        let status = self.status(port, status_timeout).await?;
        let (plugins, logs) = self.details(port).await;
        Some(ProbeResult {
            port,
            status,
            plugins,
            logs,
        })
    }

    /// POST with the command timeout. Returns whether the client accepted it.
    pub async fn post(&self, port: u16, path: &str, body: Option<&Value>) -> bool {
        match self
            .transport
            .post(port, path, body, self.timeouts.command)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(port, path, error = %e, "command failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeTransport;
    use serde_json::json;

    fn prober(fake: FakeTransport) -> PortProber<FakeTransport> {
        PortProber::new(
            fake,
            ProbeTimeouts {
                scan: Duration::from_millis(20),
                detail: Duration::from_millis(50),
                command: Duration::from_millis(50),
            },
        )
    }

    #[tokio::test]
    async fn probe_folds_every_failure_into_none() {
        let fake = FakeTransport::new();
        fake.fail_with(7070, "/status", 500);
        fake.respond_slowly(7071, "/status", Duration::from_millis(200), json!({}));
        let p = prober(fake);

        assert_eq!(p.probe(7070, STATUS_PATH, Duration::from_millis(20)).await, None);
        assert_eq!(p.probe(7071, STATUS_PATH, Duration::from_millis(20)).await, None);
        assert_eq!(p.probe(7072, STATUS_PATH, Duration::from_millis(20)).await, None);
    }

    #[tokio::test]
    async fn status_rejects_schema_mismatch() {
        let fake = FakeTransport::new();
        fake.respond(7070, "/status", json!(["not", "an", "object"]));
        fake.respond(7071, "/status", json!({"playerName": "Bob", "world": 420}));
        let p = prober(fake);

        assert!(p.status(7070, Duration::from_millis(20)).await.is_none());
        let status = p.status(7071, Duration::from_millis(20)).await.expect("status");
        assert_eq!(status.world, 420);
    }

    #[tokio::test]
    async fn fetch_result_defaults_missing_details() {
        let fake = FakeTransport::new();
        fake.serve_player(7070, "Bob");
        fake.respond(
            7070,
            "/plugins",
            json!([{"className": "com.x.Plugin", "active": true}]),
        );
        let p = prober(fake);

        let result = p.fetch_result(7070, Duration::from_millis(20)).await.expect("result");
        assert_eq!(result.port, 7070);
        assert_eq!(result.plugins.len(), 1);
        assert_eq!(result.plugins[0].name, "Plugin");
        assert!(result.logs.is_empty());
    }

    #[tokio::test]
    async fn fetch_result_skips_details_without_status() {
        let fake = FakeTransport::new();
        fake.respond(7070, "/plugins", json!([]));
        let p = prober(fake);

        assert!(p.fetch_result(7070, Duration::from_millis(20)).await.is_none());
        assert_eq!(p.transport().get_count(), 1);
    }

    #[tokio::test]
    async fn post_reports_acceptance() {
        let fake = FakeTransport::new();
        fake.serve_player(7070, "Bob");
        let p = prober(fake);

        assert!(p.post(7070, "/pause", None).await);
        assert!(!p.post(7999, "/pause", None).await);
        assert_eq!(p.transport().posts().len(), 2);
    }
}

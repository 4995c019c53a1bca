//! Scanner: concurrent `/status` sweep over the port range.
//!
//! At most one scan runs per Scanner. A trigger while one is in flight
//! returns `None` instead of queueing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::future::join_all;
use tankmon_core::{PortRange, ProbeResult, ScanSnapshot};

use crate::prober::PortProber;
use crate::transport::ProbeTransport;

/// What to fetch from each responding port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanDepth {
    /// `/status`, then `/plugins` and `/logs`.
    #[default]
    Full,
    /// `/status` only.
    StatusOnly,
}

pub struct Scanner<T> {
    prober: Arc<PortProber<T>>,
    range: PortRange,
    depth: ScanDepth,
    status_timeout: Duration,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag however the scan future ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T: ProbeTransport> Scanner<T> {
    pub fn new(prober: Arc<PortProber<T>>, range: PortRange) -> Self {
        let status_timeout = prober.timeouts().scan;
        Self {
            prober,
            range,
            depth: ScanDepth::Full,
            status_timeout,
            in_flight: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_depth(mut self, depth: ScanDepth) -> Self {
        self.depth = depth;
        self
    }

    #[must_use]
    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    pub fn range(&self) -> PortRange {
        self.range
    }

    pub fn is_scanning(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Probe every port in the range concurrently and collect the responders.
    pub async fn scan(&self) -> Option<ScanSnapshot> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(range = %self.range, "scan already in flight, trigger dropped");
            return None;
        }
        let _guard = InFlight(&self.in_flight);

        let taken_at = Utc::now();
        let started = Instant::now();
        let probes = self.range.ports().map(|port| self.probe_port(port));
        let results: Vec<ProbeResult> = join_all(probes).await.into_iter().flatten().collect();
        let snapshot = ScanSnapshot::new(results, taken_at, started.elapsed());

        tracing::debug!(
            range = %self.range,
            responders = snapshot.len(),
            elapsed_ms = snapshot.elapsed().as_millis() as u64,
            "scan complete"
        );
        Some(snapshot)
    }

    async fn probe_port(&self, port: u16) -> Option<ProbeResult> {
        match self.depth {
            ScanDepth::Full => self.prober.fetch_result(port, self.status_timeout).await,
            ScanDepth::StatusOnly => {
                let status = self.prober.status(port, self.status_timeout).await?;
                Some(ProbeResult::new(port, status))
            }
        }
    }
}

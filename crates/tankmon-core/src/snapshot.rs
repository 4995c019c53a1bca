//! Immutable result of one scan pass across the port range.
//!
//! Ports are kept in a `BTreeMap` so every consumer iterates them in
//! ascending order. The matcher's collision tie-break depends on that
//! ordering, so it is part of the type rather than an accident of hashing.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::types::ProbeResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSnapshot {
    results: BTreeMap<u16, ProbeResult>,
    taken_at: DateTime<Utc>,
    elapsed: Duration,
}

impl ScanSnapshot {
    /// Build a snapshot from the ports that answered `/status`. If a port
    /// appears twice the later entry wins; callers probe each port once.
    pub fn new(
        results: impl IntoIterator<Item = ProbeResult>,
        taken_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        Self {
            results: results.into_iter().map(|r| (r.port, r)).collect(),
            taken_at,
            elapsed,
        }
    }

    pub fn empty(taken_at: DateTime<Utc>) -> Self {
        Self::new(Vec::new(), taken_at, Duration::ZERO)
    }

    pub fn get(&self, port: u16) -> Option<&ProbeResult> {
        self.results.get(&port)
    }

    /// Responding ports, ascending.
    pub fn ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.results.keys().copied()
    }

    /// Results in ascending port order.
    pub fn iter(&self) -> impl Iterator<Item = &ProbeResult> {
        self.results.values()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Wall-clock time the scan took.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Shape of the snapshot with volatile fields (uptime, hp, logs)
    /// stripped: `(port, identity, plugin class names)` per responder.
    pub fn shape(&self) -> Vec<(u16, Option<String>, Vec<String>)> {
        self.results
            .values()
            .map(|r| {
                (
                    r.port,
                    r.status.identity(),
                    r.plugins.iter().map(|p| p.class_name.clone()).collect(),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PluginState, StatusPayload};

    fn result(port: u16, name: &str, uptime: u64) -> ProbeResult {
        let status = StatusPayload {
            player_name: name.into(),
            uptime_seconds: uptime,
            ..StatusPayload::default()
        };
        let mut r = ProbeResult::new(port, status);
        r.plugins = vec![PluginState::new("com.x.A", "A", true)];
        r
    }

    #[test]
    fn ports_iterate_ascending_regardless_of_insert_order() {
        let snap = ScanSnapshot::new(
            vec![result(7090, "c", 1), result(7070, "a", 1), result(7080, "b", 1)],
            Utc::now(),
            Duration::from_millis(120),
        );
        assert_eq!(snap.ports().collect::<Vec<_>>(), vec![7070, 7080, 7090]);
        assert_eq!(snap.len(), 3);
        assert_eq!(snap.get(7080).map(|r| r.status.player_name.as_str()), Some("b"));
        assert_eq!(snap.elapsed(), Duration::from_millis(120));
    }

    #[test]
    fn shape_ignores_volatile_fields() {
        let now = Utc::now();
        let first = ScanSnapshot::new(vec![result(7070, "Bob", 10)], now, Duration::ZERO);
        let second = ScanSnapshot::new(vec![result(7070, "bob", 99)], now, Duration::ZERO);
        assert_ne!(first, second);
        assert_eq!(first.shape(), second.shape());
    }

    #[test]
    fn empty_snapshot() {
        let snap = ScanSnapshot::empty(Utc::now());
        assert!(snap.is_empty());
        assert_eq!(snap.iter().count(), 0);
    }
}

//! Scheduler: periodic scan/match cycles for auto-discovered accounts.
//!
//! Ticks every `scan_interval`; a refresh request runs a cycle early and
//! restarts the interval. Requests that arrive while a cycle is running
//! are folded into the next one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use tankmon_core::match_accounts;
use tankmon_probe::ProbeTransport;

use crate::engine::Shared;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleStats {
    pub responders: usize,
    pub hits: usize,
    pub misses: usize,
    pub collisions: usize,
    pub signals: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every account is pinned (or there are none); no scan was issued.
    Idle,
    /// A scan was already in flight.
    Busy,
    Completed(CycleStats),
}

pub(crate) async fn run_scheduler<T: ProbeTransport + 'static>(
    shared: Arc<Shared<T>>,
    mut refresh_rx: mpsc::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(shared.config.scan_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let requested = tokio::select! {
            () = shared.cancel.cancelled() => break,
            _ = ticker.tick() => false,
            Some(()) = refresh_rx.recv() => true,
        };
        while refresh_rx.try_recv().is_ok() {}

        let outcome = run_cycle(&shared).await;
        if let CycleOutcome::Completed(stats) = &outcome {
            tracing::debug!(
                requested,
                responders = stats.responders,
                hits = stats.hits,
                misses = stats.misses,
                signals = stats.signals,
                elapsed_ms = stats.elapsed.as_millis() as u64,
                "cycle complete"
            );
        }
        if requested {
            ticker.reset();
        }
    }

    tracing::debug!("scheduler stopped");
}

/// One cycle: sync accounts, scan, match, commit, then dispatch.
pub(crate) async fn run_cycle<T: ProbeTransport + 'static>(shared: &Arc<Shared<T>>) -> CycleOutcome {
    let started = Instant::now();
    let accounts = shared.sync_accounts().await;
    if !shared.table.lock().await.needs_discovery() {
        return CycleOutcome::Idle;
    }

    let Some(snapshot) = shared.scanner.scan().await else {
        return CycleOutcome::Busy;
    };

    let (report, signals) = {
        let mut table = shared.table.lock().await;
        let report = match_accounts(&snapshot, &accounts);
        let signals = table.apply_match_report(&report, Utc::now());
        (report, signals)
    };

    for collision in &report.collisions {
        tracing::debug!(
            identity = %collision.identity,
            chosen = collision.chosen_port,
            ignored = ?collision.ignored_ports,
            "identity reported by several ports"
        );
    }
    for id in &report.duplicate_accounts {
        tracing::debug!(account = %id, "another account already claimed this identity");
    }
    for (id, signal) in &signals {
        shared.dispatch(id, signal);
    }

    CycleOutcome::Completed(CycleStats {
        responders: snapshot.len(),
        hits: report.hits(),
        misses: report.misses(),
        collisions: report.collisions.len(),
        signals: signals.len(),
        elapsed: started.elapsed(),
    })
}

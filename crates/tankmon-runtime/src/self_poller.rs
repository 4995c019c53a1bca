//! Self-poller: one task per pinned account, polling its port directly.
//!
//! A stopped poller never commits a result: cancellation is re-checked
//! under the table lock before every apply.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tankmon_core::BindingEvent;
use tankmon_probe::ProbeTransport;

use crate::engine::Shared;

pub(crate) struct SelfPollerHandle {
    port: u16,
    cancel: CancellationToken,
    poke: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SelfPollerHandle {
    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Skip the rest of the current sleep.
    pub(crate) fn poke(&self) {
        self.poke.notify_one();
    }

    /// Cancel the task. The returned handle resolves once it has exited.
    pub(crate) fn stop(self) -> JoinHandle<()> {
        self.cancel.cancel();
        self.task
    }
}

pub(crate) fn spawn<T: ProbeTransport + 'static>(
    shared: Arc<Shared<T>>,
    account_id: String,
    port: u16,
) -> SelfPollerHandle {
    let cancel = shared.cancel.child_token();
    let poke = Arc::new(Notify::new());
    tracing::debug!(account = %account_id, port, "self-poller started");
    let task = tokio::spawn(run(
        shared,
        account_id,
        port,
        cancel.clone(),
        Arc::clone(&poke),
    ));
    SelfPollerHandle {
        port,
        cancel,
        poke,
        task,
    }
}

async fn run<T: ProbeTransport + 'static>(
    shared: Arc<Shared<T>>,
    account_id: String,
    port: u16,
    cancel: CancellationToken,
    poke: Arc<Notify>,
) {
    let interval = shared.config.self_poll_interval();
    let timeout = shared.config.timeouts().detail;

    while !cancel.is_cancelled() {
        let result = shared.prober.fetch_result(port, timeout).await;
        let now = Utc::now();
        let event = match result {
            Some(result) => BindingEvent::SelfPollHit { result, at: now },
            None => BindingEvent::SelfPollMiss { port, at: now },
        };

        let signal = {
            let mut table = shared.table.lock().await;
            if cancel.is_cancelled() {
                break;
            }
            table.apply(&account_id, &event)
        };
        if let Some(signal) = signal {
            shared.dispatch(&account_id, &signal);
        }

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(interval) => {}
            () = poke.notified() => {
                tracing::trace!(account = %account_id, "self-poll requested");
            }
        }
    }

    tracing::debug!(account = %account_id, port, "self-poller stopped");
}

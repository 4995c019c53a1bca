//! Engine: owns the binding table and every background task.
//!
//! One scheduler task drives scan/match cycles; one self-poller task per
//! pinned account polls its port directly. All binding transitions go
//! through the table behind a single `tokio::sync::Mutex`, and signals are
//! delivered to the sink only after the lock is released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use tankmon_core::{Account, AccountBinding, BindingSignal, BindingTable, ManagedMarkers};
use tankmon_probe::{PortProber, ProbeTransport, Scanner};

use crate::accounts::AccountSource;
use crate::config::EngineConfig;
use crate::coordinator::PluginToggleCoordinator;
use crate::scheduler::{self, CycleOutcome};
use crate::self_poller::{self, SelfPollerHandle};
use crate::sink::StatusSink;

fn lock<T>(m: &StdMutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared by the scheduler, the self-pollers and the coordinator.
pub(crate) struct Shared<T> {
    pub(crate) config: EngineConfig,
    pub(crate) prober: Arc<PortProber<T>>,
    pub(crate) scanner: Scanner<T>,
    pub(crate) table: Mutex<BindingTable>,
    pub(crate) markers: ManagedMarkers,
    accounts: Arc<dyn AccountSource>,
    known_accounts: StdMutex<Vec<Account>>,
    sink: Arc<dyn StatusSink>,
    pollers: StdMutex<HashMap<String, SelfPollerHandle>>,
    refresh_tx: mpsc::Sender<()>,
    pub(crate) cancel: CancellationToken,
}

impl<T: ProbeTransport + 'static> Shared<T> {
    /// Re-read the account store and reconcile bindings and self-pollers.
    ///
    /// An unreadable store keeps the previous account list. Accounts whose
    /// pin is out of range are returned with the pin cleared.
    pub(crate) async fn sync_accounts(self: &Arc<Self>) -> Vec<Account> {
        let mut accounts = match self.accounts.load() {
            Ok(accounts) => accounts,
            Err(e) => {
                tracing::warn!(error = %e, "account store unreadable, keeping previous accounts");
                return lock(&self.known_accounts).clone();
            }
        };
        if self.cancel.is_cancelled() {
            return accounts;
        }

        let report = {
            let mut table = self.table.lock().await;
            table.sync_accounts(&accounts, Utc::now())
        };

        for (id, e) in &report.invalid_pins {
            tracing::debug!(account = %id, error = %e, "pin ignored, using auto-discovery");
            for account in accounts.iter_mut().filter(|a| &a.id == id) {
                account.pinned_port = 0;
            }
        }
        for id in &report.created {
            tracing::debug!(account = %id, "tracking account");
        }
        for id in &report.removed {
            tracing::info!(account = %id, "account removed");
            self.stop_self_poller(id);
        }
        for (id, change) in &report.pin_changes {
            tracing::info!(account = %id, old = change.old, new = change.new, "pin changed");
            if change.old > 0 {
                self.stop_self_poller(id);
            }
            if change.new > 0 {
                self.start_self_poller(id, change.new);
            }
        }

        *lock(&self.known_accounts) = accounts.clone();
        accounts
    }

    fn start_self_poller(self: &Arc<Self>, account_id: &str, port: u16) {
        let handle = self_poller::spawn(Arc::clone(self), account_id.to_string(), port);
        if let Some(old) = lock(&self.pollers).insert(account_id.to_string(), handle) {
            old.stop();
        }
    }

    fn stop_self_poller(&self, account_id: &str) {
        if let Some(handle) = lock(&self.pollers).remove(account_id) {
            handle.stop();
        }
    }

    /// Deliver one signal to the sink.
    pub(crate) fn dispatch(&self, account_id: &str, signal: &BindingSignal) {
        match signal {
            BindingSignal::Matched(result) => self.sink.on_matched(account_id, result),
            BindingSignal::Offline => self.sink.on_offline(account_id),
        }
    }

    /// Ask for fresh data: wake the account's self-poller if it has one,
    /// otherwise request a scheduler cycle.
    pub(crate) fn request_refresh(&self, account_id: &str) {
        if let Some(handle) = lock(&self.pollers).get(account_id) {
            handle.poke();
            return;
        }
        self.refresh_now();
    }

    /// Coalescing trigger: at most one request is ever pending.
    pub(crate) fn refresh_now(&self) {
        if self.refresh_tx.try_send(()).is_err() {
            tracing::trace!("refresh already pending");
        }
    }
}

// ─── Engine ──────────────────────────────────────────────────────────

pub struct Engine<T: ProbeTransport + 'static> {
    shared: Arc<Shared<T>>,
    refresh_rx: StdMutex<Option<mpsc::Receiver<()>>>,
    scheduler: StdMutex<Option<JoinHandle<()>>>,
}

impl<T: ProbeTransport + 'static> Engine<T> {
    /// Build an engine. Nothing runs until [`Engine::start`]; cycles can
    /// also be driven by hand with [`Engine::run_cycle`].
    pub fn new(
        config: EngineConfig,
        transport: T,
        accounts: Arc<dyn AccountSource>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        let prober = Arc::new(PortProber::new(transport, config.timeouts()));
        let scanner = Scanner::new(Arc::clone(&prober), config.port_range);
        let (refresh_tx, refresh_rx) = mpsc::channel(1);
        let shared = Arc::new(Shared {
            table: Mutex::new(BindingTable::new(config.offline_threshold)),
            markers: config.markers(),
            config,
            prober,
            scanner,
            accounts,
            known_accounts: StdMutex::new(Vec::new()),
            sink,
            pollers: StdMutex::new(HashMap::new()),
            refresh_tx,
            cancel: CancellationToken::new(),
        });
        Self {
            shared,
            refresh_rx: StdMutex::new(Some(refresh_rx)),
            scheduler: StdMutex::new(None),
        }
    }

    /// Spawn the scheduler task. Calling it twice is a no-op.
    pub fn start(&self) {
        let Some(refresh_rx) = lock(&self.refresh_rx).take() else {
            return;
        };
        tracing::info!(
            range = %self.shared.config.port_range,
            interval_ms = self.shared.config.scan_interval_ms,
            threshold = self.shared.config.offline_threshold,
            "engine started"
        );
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(scheduler::run_scheduler(shared, refresh_rx));
        *lock(&self.scheduler) = Some(handle);
    }

    /// Request a scan/match cycle as soon as possible.
    pub fn refresh_now(&self) {
        self.shared.refresh_now();
    }

    /// Refresh one account through whichever path owns it.
    pub fn request_refresh(&self, account_id: &str) {
        self.shared.request_refresh(account_id);
    }

    /// Re-read the account store now instead of waiting for the next tick.
    pub async fn sync_accounts(&self) -> Vec<Account> {
        self.shared.sync_accounts().await
    }

    /// Run one scheduler cycle on the caller's task.
    pub async fn run_cycle(&self) -> CycleOutcome {
        scheduler::run_cycle(&self.shared).await
    }

    /// Accounts as of the last successful store read.
    pub fn accounts(&self) -> Vec<Account> {
        lock(&self.shared.known_accounts).clone()
    }

    pub async fn bindings(&self) -> Vec<AccountBinding> {
        self.shared.table.lock().await.iter().cloned().collect()
    }

    pub async fn binding(&self, account_id: &str) -> Option<AccountBinding> {
        self.shared.table.lock().await.get(account_id).cloned()
    }

    /// `(account_id, port)` for every running self-poller, sorted by id.
    pub fn self_pollers(&self) -> Vec<(String, u16)> {
        let mut pollers: Vec<(String, u16)> = lock(&self.shared.pollers)
            .iter()
            .map(|(id, handle)| (id.clone(), handle.port()))
            .collect();
        pollers.sort();
        pollers
    }

    pub fn coordinator(&self) -> PluginToggleCoordinator<T> {
        PluginToggleCoordinator::new(Arc::clone(&self.shared))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn markers(&self) -> &ManagedMarkers {
        &self.shared.markers
    }

    pub fn prober(&self) -> &PortProber<T> {
        &self.shared.prober
    }

    /// Stop the scheduler and every self-poller, waiting for each to exit.
    /// In-flight probes finish on their own timeouts.
    pub async fn shutdown(&self) {
        self.shared.cancel.cancel();
        let scheduler = lock(&self.scheduler).take();
        if let Some(handle) = scheduler
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "scheduler task failed");
        }
        let pollers: Vec<SelfPollerHandle> =
            lock(&self.shared.pollers).drain().map(|(_, h)| h).collect();
        for handle in pollers {
            if let Err(e) = handle.stop().await {
                tracing::warn!(error = %e, "self-poller task failed");
            }
        }
        tracing::info!("engine stopped");
    }
}

impl<T: ProbeTransport + 'static> Drop for Engine<T> {
    fn drop(&mut self) {
        self.shared.cancel.cancel();
    }
}

// ─── Tests ────────────────────────────────────────────────────────

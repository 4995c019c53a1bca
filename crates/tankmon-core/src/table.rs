//! All live bindings, keyed by account id.
//!
//! Bindings are created lazily the first time an account id is seen and
//! dropped when the account disappears from the store. Pin edits coming
//! from the store are turned into `PinSet` / `PinCleared` events here so
//! the caller only has to react to the returned [`SyncReport`].

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use crate::binding::{
    AccountBinding, BindingEvent, BindingSignal, DEFAULT_OFFLINE_THRESHOLD, apply_binding_event,
};
use crate::matcher::{MatchOutcome, MatchReport};
use crate::types::{Account, CoreError, validate_pin};

/// Pin transition observed during [`BindingTable::sync_accounts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinChange {
    /// 0 when the account was auto (or new).
    pub old: u16,
    /// 0 when the pin was cleared.
    pub new: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: Vec<String>,
    pub removed: Vec<String>,
    /// `(account_id, change)` for every account whose pin moved.
    pub pin_changes: Vec<(String, PinChange)>,
    /// Accounts whose stored pin is outside the accepted range; treated as auto.
    pub invalid_pins: Vec<(String, CoreError)>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.removed.is_empty()
            && self.pin_changes.is_empty()
            && self.invalid_pins.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BindingTable {
    bindings: BTreeMap<String, AccountBinding>,
    threshold: u32,
}

impl Default for BindingTable {
    fn default() -> Self {
        Self::new(DEFAULT_OFFLINE_THRESHOLD)
    }
}

impl BindingTable {
    pub fn new(threshold: u32) -> Self {
        Self {
            bindings: BTreeMap::new(),
            threshold: threshold.max(1),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Reconcile bindings with the current account list.
    ///
    /// Store order is preserved in `created`; repeated ids after the first
    /// are ignored.
    pub fn sync_accounts<'a>(
        &mut self,
        accounts: impl IntoIterator<Item = &'a Account>,
        now: DateTime<Utc>,
    ) -> SyncReport {
        let mut report = SyncReport::default();
        let mut seen: HashSet<&str> = HashSet::new();

        for account in accounts {
            if !seen.insert(account.id.as_str()) {
                continue;
            }
            let pin = match validate_pin(u32::from(account.pinned_port)) {
                Ok(pin) => pin,
                Err(e) => {
                    report.invalid_pins.push((account.id.clone(), e));
                    0
                }
            };

            match self.bindings.get(&account.id) {
                None => {
                    let binding = AccountBinding::new(account.id.clone(), pin, now);
                    if pin > 0 {
                        report
                            .pin_changes
                            .push((account.id.clone(), PinChange { old: 0, new: pin }));
                    }
                    report.created.push(account.id.clone());
                    self.bindings.insert(account.id.clone(), binding);
                }
                Some(existing) if existing.pinned_port != pin => {
                    let old = existing.pinned_port;
                    let event = if pin > 0 {
                        BindingEvent::PinSet { port: pin, at: now }
                    } else {
                        BindingEvent::PinCleared { at: now }
                    };
                    let (next, _) = apply_binding_event(existing, &event, self.threshold);
                    self.bindings.insert(account.id.clone(), next);
                    report
                        .pin_changes
                        .push((account.id.clone(), PinChange { old, new: pin }));
                }
                Some(_) => {}
            }
        }

        let gone: Vec<String> = self
            .bindings
            .keys()
            .filter(|id| !seen.contains(id.as_str()))
            .cloned()
            .collect();
        for id in gone {
            self.bindings.remove(&id);
            report.removed.push(id);
        }

        report
    }

    /// Apply one match report as a single batch.
    ///
    /// Returns the signals to deliver, in account-id order. Ids in the
    /// report with no binding (removed between scan and apply) are skipped.
    pub fn apply_match_report(
        &mut self,
        report: &MatchReport,
        now: DateTime<Utc>,
    ) -> Vec<(String, BindingSignal)> {
        let mut signals = Vec::new();
        for (id, outcome) in &report.outcomes {
            let event = match outcome {
                MatchOutcome::Hit(result) => BindingEvent::MatchHit {
                    result: result.clone(),
                    at: now,
                },
                MatchOutcome::Miss => BindingEvent::MatchMiss { at: now },
            };
            if let Some(signal) = self.apply(id, &event) {
                signals.push((id.clone(), signal));
            }
        }
        signals
    }

    /// Apply a single event. Unknown ids are ignored.
    pub fn apply(&mut self, account_id: &str, event: &BindingEvent) -> Option<BindingSignal> {
        let binding = self.bindings.get_mut(account_id)?;
        let (next, signal) = apply_binding_event(binding, event, self.threshold);
        *binding = next;
        signal
    }

    pub fn get(&self, account_id: &str) -> Option<&AccountBinding> {
        self.bindings.get(account_id)
    }

    /// Resolved port for an account, `None` when unknown or offline.
    pub fn resolved_port(&self, account_id: &str) -> Option<u16> {
        self.bindings.get(account_id)?.resolved_port
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccountBinding> {
        self.bindings.values()
    }

    /// `(account_id, pinned_port)` for every pinned binding.
    pub fn pinned(&self) -> impl Iterator<Item = (&str, u16)> {
        self.bindings
            .values()
            .filter(|b| b.is_pinned())
            .map(|b| (b.account_id.as_str(), b.pinned_port))
    }

    /// True when at least one binding relies on auto-discovery.
    pub fn needs_discovery(&self) -> bool {
        self.bindings.values().any(|b| !b.is_pinned())
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingState;
    use crate::matcher::match_accounts;
    use crate::snapshot::ScanSnapshot;
    use crate::types::{ProbeResult, StatusPayload};
    use std::time::Duration;

    fn responder(port: u16, name: &str) -> ProbeResult {
        ProbeResult::new(
            port,
            StatusPayload {
                player_name: name.into(),
                ..StatusPayload::default()
            },
        )
    }

    fn cycle(
        table: &mut BindingTable,
        accounts: &[Account],
        entries: &[(u16, &str)],
    ) -> Vec<(String, BindingSignal)> {
        let now = Utc::now();
        table.sync_accounts(accounts, now);
        let snap = ScanSnapshot::new(
            entries.iter().map(|(p, n)| responder(*p, n)),
            now,
            Duration::ZERO,
        );
        let report = match_accounts(&snap, accounts);
        table.apply_match_report(&report, now)
    }

    #[test]
    fn sync_creates_lazily_and_tears_down() {
        let mut table = BindingTable::default();
        let now = Utc::now();
        let accounts = vec![Account::new("a", "A"), Account::new("b", "B").pinned(9000)];

        let report = table.sync_accounts(&accounts, now);
        assert_eq!(report.created, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            report.pin_changes,
            vec![("b".to_string(), PinChange { old: 0, new: 9000 })]
        );
        assert_eq!(table.len(), 2);
        assert!(table.needs_discovery());

        let report = table.sync_accounts(&accounts[1..], now);
        assert_eq!(report.removed, vec!["a".to_string()]);
        assert!(table.get("a").is_none());
        assert!(!table.needs_discovery());

        assert!(table.sync_accounts(&accounts[1..], now).is_empty());
    }

    #[test]
    fn sync_detects_pin_edits() {
        let mut table = BindingTable::default();
        let now = Utc::now();
        table.sync_accounts(&[Account::new("a", "A")], now);

        let report = table.sync_accounts(&[Account::new("a", "A").pinned(9100)], now);
        assert_eq!(
            report.pin_changes,
            vec![("a".to_string(), PinChange { old: 0, new: 9100 })]
        );
        assert_eq!(table.get("a").map(|b| b.state), Some(BindingState::SelfPolling));
        assert_eq!(table.pinned().collect::<Vec<_>>(), vec![("a", 9100)]);

        let report = table.sync_accounts(&[Account::new("a", "A")], now);
        assert_eq!(
            report.pin_changes,
            vec![("a".to_string(), PinChange { old: 9100, new: 0 })]
        );
        assert_eq!(table.get("a").map(|b| b.state), Some(BindingState::Unbound));
    }

    #[test]
    fn sync_treats_out_of_range_pin_as_auto() {
        let mut table = BindingTable::default();
        let report = table.sync_accounts(&[Account::new("a", "A").pinned(80)], Utc::now());
        assert_eq!(report.invalid_pins.len(), 1);
        assert!(report.pin_changes.is_empty());
        assert!(!table.get("a").expect("binding").is_pinned());
    }

    #[test]
    fn duplicate_ids_keep_the_first() {
        let mut table = BindingTable::default();
        let report = table.sync_accounts(
            &[Account::new("a", "A"), Account::new("a", "Other").pinned(9000)],
            Utc::now(),
        );
        assert_eq!(report.created, vec!["a".to_string()]);
        assert!(!table.get("a").expect("binding").is_pinned());
    }

    #[test]
    fn pinned_alice_is_untouched_by_scan() {
        let mut table = BindingTable::default();
        let accounts = vec![Account::new("alice", "Alice").pinned(9000)];
        table.sync_accounts(&accounts, Utc::now());
        let before = table.get("alice").cloned();

        let signals = cycle(&mut table, &accounts, &[(7080, "alice")]);

        assert!(signals.is_empty());
        assert_eq!(table.get("alice").cloned(), before);
        assert_eq!(table.resolved_port("alice"), Some(9000));
    }

    #[test]
    fn batch_apply_emits_one_signal_per_account() {
        let mut table = BindingTable::new(2);
        let accounts = vec![Account::new("bob", "Bob"), Account::new("carl", "Carl")];

        let signals = cycle(&mut table, &accounts, &[(7070, "Bob"), (7071, "Bob"), (7075, "Carl")]);
        assert_eq!(signals.len(), 2);
        assert_eq!(table.resolved_port("bob"), Some(7070));
        assert_eq!(table.resolved_port("carl"), Some(7075));

        // Bob hits again; Carl's first miss stays silent below the threshold.
        let signals = cycle(&mut table, &accounts, &[(7070, "Bob")]);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].0, "bob");
        assert!(matches!(signals[0].1, BindingSignal::Matched(_)));
        assert_eq!(table.resolved_port("carl"), Some(7075));
        let signals = cycle(&mut table, &accounts, &[(7070, "Bob")]);
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[1], ("carl".to_string(), BindingSignal::Offline));
        assert_eq!(table.resolved_port("carl"), None);
    }

    #[test]
    fn apply_ignores_unknown_accounts() {
        let mut table = BindingTable::default();
        assert_eq!(
            table.apply("ghost", &BindingEvent::MatchMiss { at: Utc::now() }),
            None
        );
        assert!(table.is_empty());
    }
}

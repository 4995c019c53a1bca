//! Identity matcher: resolves a scan snapshot against unpinned accounts.
//!
//! - Identity is the trimmed, lower-cased `playerName`; blank names never match.
//! - When two ports report the same identity, the lowest port wins and the
//!   others are recorded as [`MatchCollision`] diagnostics.
//! - When two accounts share a match key, the first one (in the order the
//!   caller supplies) claims the port; the rest are reported as misses.
//! - Pinned accounts are skipped entirely.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::snapshot::ScanSnapshot;
use crate::types::{Account, ProbeResult};

// ─── Identity index ──────────────────────────────────────────────

/// Two or more ports claimed the same identity in one snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchCollision {
    pub identity: String,
    /// Port that won (lowest).
    pub chosen_port: u16,
    /// Ports that were ignored for this cycle, ascending.
    pub ignored_ports: Vec<u16>,
}

/// identity → chosen port, built once per snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityIndex {
    by_identity: HashMap<String, u16>,
    collisions: Vec<MatchCollision>,
}

impl IdentityIndex {
    pub fn build(snapshot: &ScanSnapshot) -> Self {
        let mut by_identity: HashMap<String, u16> = HashMap::new();
        let mut ignored: BTreeMap<String, Vec<u16>> = BTreeMap::new();

        // ScanSnapshot iterates in ascending port order.
        for result in snapshot.iter() {
            let Some(identity) = result.status.identity() else {
                continue;
            };
            if by_identity.contains_key(&identity) {
                ignored.entry(identity).or_default().push(result.port);
            } else {
                by_identity.insert(identity, result.port);
            }
        }

        let collisions = ignored
            .into_iter()
            .map(|(identity, ignored_ports)| MatchCollision {
                chosen_port: by_identity[&identity],
                identity,
                ignored_ports,
            })
            .collect();

        Self {
            by_identity,
            collisions,
        }
    }

    pub fn port_for(&self, identity: &str) -> Option<u16> {
        self.by_identity.get(identity).copied()
    }

    pub fn len(&self) -> usize {
        self.by_identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_identity.is_empty()
    }

    pub fn collisions(&self) -> &[MatchCollision] {
        &self.collisions
    }
}

// ─── Match report ────────────────────────────────────────────────

/// Per-account outcome of one match pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Hit(ProbeResult),
    Miss,
}

impl MatchOutcome {
    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Hit(result) => Some(result.port),
            Self::Miss => None,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchReport {
    /// Outcome per unpinned account id.
    pub outcomes: BTreeMap<String, MatchOutcome>,
    /// Port collisions seen in the snapshot.
    pub collisions: Vec<MatchCollision>,
    /// Account ids that lost a port to an earlier account with the same key.
    pub duplicate_accounts: Vec<String>,
}

impl MatchReport {
    pub fn hits(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_hit()).count()
    }

    pub fn misses(&self) -> usize {
        self.outcomes.len() - self.hits()
    }
}

/// Resolve a snapshot against the tracked accounts.
///
/// Only accounts with `pinned_port == 0` appear in the report.
pub fn match_accounts<'a>(
    snapshot: &ScanSnapshot,
    accounts: impl IntoIterator<Item = &'a Account>,
) -> MatchReport {
    let index = IdentityIndex::build(snapshot);
    let mut claimed: HashSet<u16> = HashSet::new();
    let mut report = MatchReport {
        collisions: index.collisions().to_vec(),
        ..MatchReport::default()
    };

    for account in accounts {
        if account.is_pinned() || report.outcomes.contains_key(&account.id) {
            continue;
        }
        let outcome = match index.port_for(&account.match_key()) {
            Some(port) if claimed.insert(port) => match snapshot.get(port) {
                Some(result) => MatchOutcome::Hit(result.clone()),
                None => MatchOutcome::Miss,
            },
            Some(_) => {
                report.duplicate_accounts.push(account.id.clone());
                MatchOutcome::Miss
            }
            None => MatchOutcome::Miss,
        };
        report.outcomes.insert(account.id.clone(), outcome);
    }

    report
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusPayload;
    use chrono::Utc;
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

    fn snapshot(entries: &[(u16, &str)]) -> ScanSnapshot {
        ScanSnapshot::new(
            entries.iter().map(|(p, n)| responder(*p, n)),
            Utc::now(),
            Duration::ZERO,
        )
    }

    #[test]
    fn duplicate_identity_lowest_port_wins() {
        // Inserted out of order on purpose.
        let snap = snapshot(&[(7071, "Bob"), (7070, "Bob")]);
        let bob = Account::new("bob", "Bob");

        let report = match_accounts(&snap, [&bob]);

        assert_eq!(report.outcomes["bob"].port(), Some(7070));
        assert_eq!(
            report.collisions,
            vec![MatchCollision {
                identity: "bob".into(),
                chosen_port: 7070,
                ignored_ports: vec![7071],
            }]
        );
    }

    #[test]
    fn match_is_case_insensitive_and_trimmed() {
        let snap = snapshot(&[(7075, "  CARL ")]);
        let carl = Account::new("c", "carl");
        let report = match_accounts(&snap, [&carl]);
        assert_eq!(report.outcomes["c"].port(), Some(7075));
    }

    #[test]
    fn pinned_accounts_are_excluded() {
        let snap = snapshot(&[(7080, "alice")]);
        let alice = Account::new("alice", "Alice").pinned(9000);
        let report = match_accounts(&snap, [&alice]);
        assert!(report.outcomes.is_empty());
    }

    #[test]
    fn unmatched_account_is_a_miss() {
        let snap = snapshot(&[(7080, "someone")]);
        let dave = Account::new("d", "Dave");
        let report = match_accounts(&snap, [&dave]);
        assert_eq!(report.outcomes["d"], MatchOutcome::Miss);
        assert_eq!(report.misses(), 1);
        assert_eq!(report.hits(), 0);
    }

    #[test]
    fn blank_names_never_match() {
        let snap = snapshot(&[(7070, "   ")]);
        let blank = Account::new("b", "");
        let report = match_accounts(&snap, [&blank]);
        assert_eq!(report.outcomes["b"], MatchOutcome::Miss);
        assert!(IdentityIndex::build(&snap).is_empty());
    }

    #[test]
    fn same_key_accounts_never_share_a_port() {
        let snap = snapshot(&[(7070, "Eve")]);
        let first = Account::new("e1", "Eve");
        let second = Account::new("e2", "EVE");

        let report = match_accounts(&snap, [&first, &second]);

        assert_eq!(report.outcomes["e1"].port(), Some(7070));
        assert_eq!(report.outcomes["e2"], MatchOutcome::Miss);
        assert_eq!(report.duplicate_accounts, vec!["e2".to_string()]);
    }

    #[test]
    fn no_port_is_bound_twice() {
        let snap = snapshot(&[
            (7070, "a"),
            (7071, "b"),
            (7072, "a"),
            (7073, "c"),
            (7074, "b"),
        ]);
        let accounts = [
            Account::new("1", "A"),
            Account::new("2", "b"),
            Account::new("3", "a"),
            Account::new("4", "C"),
            Account::new("5", "zed"),
        ];
        let report = match_accounts(&snap, accounts.iter());

        let mut seen = HashSet::new();
        for port in report.outcomes.values().filter_map(MatchOutcome::port) {
            assert!(seen.insert(port), "port {port} bound twice");
        }
        assert_eq!(report.hits(), 3);
    }
}

//! Per-account binding state machine.
//!
//! Tracks which port currently serves an account and debounces the
//! transition to offline:
//!
//! ## States
//!
//! - `Unbound`: no port known yet (auto mode)
//! - `SelfPolling`: pinned to a fixed port; a dedicated poller owns updates
//! - `AutoMatched`: bound via the last matcher hit
//! - `OfflinePending(n)`: `n` consecutive misses, `0 < n < threshold`
//! - `Offline`: threshold reached; resolved port and last status cleared
//!
//! ## Key transitions
//!
//! - pin set: `* -> SelfPolling` (matcher events ignored from then on)
//! - pin cleared: `* -> Unbound`
//! - matcher hit: `{Unbound, AutoMatched, OfflinePending, Offline} -> AutoMatched`
//! - matcher miss: `AutoMatched -> OfflinePending(1) -> ... -> Offline`
//! - `Unbound` counts misses silently and goes `Offline` at the threshold
//!
//! The offline signal fires exactly once per transition into offline.
//! Pinned bindings use the same debounce for their own poll results but
//! keep the pinned port as their resolved port.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ProbeResult, validate_pin};

// ─── Constants ───────────────────────────────────────────────────────

/// Consecutive misses before a bound account is reported offline.
pub const DEFAULT_OFFLINE_THRESHOLD: u32 = 3;

// ─── Binding State ───────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BindingState {
    /// No port known.
    #[default]
    Unbound,
    /// Pinned port; the self-poller owns updates.
    SelfPolling,
    /// Bound via the last matcher hit.
    AutoMatched,
    /// Missed `misses` consecutive cycles, still below the threshold.
    OfflinePending { misses: u32 },
    /// Threshold reached.
    Offline,
}

impl BindingState {
    pub fn as_label(self) -> String {
        match self {
            Self::Unbound => "UNBOUND".into(),
            Self::SelfPolling => "SELF_POLLING".into(),
            Self::AutoMatched => "AUTO_MATCHED".into(),
            Self::OfflinePending { misses } => format!("OFFLINE_PENDING({misses})"),
            Self::Offline => "OFFLINE".into(),
        }
    }
}

impl fmt::Display for BindingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_label())
    }
}

// ─── Account Binding ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBinding {
    pub account_id: String,
    /// Manual pin (0 = auto).
    pub pinned_port: u16,
    /// Port currently serving this account. Either the pin or the last
    /// matcher hit, never both.
    pub resolved_port: Option<u16>,
    pub consecutive_misses: u32,
    pub state: BindingState,
    /// Last data received for this account, possibly with optimistic
    /// local edits applied on top.
    pub last_status: Option<ProbeResult>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl AccountBinding {
    /// Create a binding for a newly seen account.
    pub fn new(account_id: impl Into<String>, pinned_port: u16, now: DateTime<Utc>) -> Self {
        let binding = Self {
            account_id: account_id.into(),
            pinned_port: 0,
            resolved_port: None,
            consecutive_misses: 0,
            state: BindingState::Unbound,
            last_status: None,
            last_seen_at: None,
            updated_at: now,
        };
        if pinned_port > 0 {
            apply_binding_event(
                &binding,
                &BindingEvent::PinSet {
                    port: pinned_port,
                    at: now,
                },
                DEFAULT_OFFLINE_THRESHOLD,
            )
            .0
        } else {
            binding
        }
    }

    pub fn is_pinned(&self) -> bool {
        self.pinned_port > 0
    }

    pub fn is_online(&self) -> bool {
        self.resolved_port.is_some() && self.last_status.is_some()
    }

    /// State as shown to consumers. A pinned binding stays `SelfPolling`
    /// internally; its own miss count is folded in here.
    pub fn reported_state(&self, threshold: u32) -> BindingState {
        let threshold = threshold.max(1);
        match (self.state, self.consecutive_misses) {
            (BindingState::SelfPolling, 0) => BindingState::SelfPolling,
            (BindingState::SelfPolling, n) if n >= threshold => BindingState::Offline,
            (BindingState::SelfPolling, misses) => BindingState::OfflinePending { misses },
            (state, _) => state,
        }
    }
}

// ─── Binding Events & Signals ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingEvent {
    /// Manual pin set or changed.
    PinSet { port: u16, at: DateTime<Utc> },
    /// Manual pin removed; back to auto-discovery.
    PinCleared { at: DateTime<Utc> },
    /// Matcher found this account in the current snapshot.
    MatchHit {
        result: ProbeResult,
        at: DateTime<Utc>,
    },
    /// Matcher did not find this account in the current snapshot.
    MatchMiss { at: DateTime<Utc> },
    /// Self-poller got a `/status` answer from `result.port`.
    SelfPollHit {
        result: ProbeResult,
        at: DateTime<Utc>,
    },
    /// Self-poller got nothing from `port`.
    SelfPollMiss { port: u16, at: DateTime<Utc> },
    /// Optimistic local plugin flag edit, pending confirmation by the next poll.
    LocalPluginState {
        class_names: Vec<String>,
        active: bool,
    },
    /// Optimistic local profit reset.
    LocalProfitReset,
}

/// Consumer-facing signal produced by a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingSignal {
    /// Fresh data for the account.
    Matched(ProbeResult),
    /// The account just went offline.
    Offline,
}

// ─── State Machine ───────────────────────────────────────────────────

/// Pure function: apply an event to a binding.
///
/// Returns the next binding and the signal to deliver, if any. The input
/// is not mutated. `threshold` values below 1 are treated as 1.
pub fn apply_binding_event(
    state: &AccountBinding,
    event: &BindingEvent,
    threshold: u32,
) -> (AccountBinding, Option<BindingSignal>) {
    let threshold = threshold.max(1);
    let mut next = state.clone();
    let mut signal = None;

    match event {
        // ── Pin set ──────────────────────────────────────────────
        BindingEvent::PinSet { port, at } => {
            // Invalid pins are treated as no pin at all.
            let port = validate_pin(u32::from(*port)).unwrap_or(0);
            if port == 0 {
                return apply_binding_event(state, &BindingEvent::PinCleared { at: *at }, threshold);
            }
            if state.pinned_port != port {
                next.last_status = None;
                next.last_seen_at = None;
            }
            next.pinned_port = port;
            next.resolved_port = Some(port);
            next.consecutive_misses = 0;
            next.state = BindingState::SelfPolling;
            next.updated_at = *at;
        }

        // ── Pin cleared ──────────────────────────────────────────
        BindingEvent::PinCleared { at } => {
            if state.is_pinned() {
                next.pinned_port = 0;
                next.resolved_port = None;
                next.consecutive_misses = 0;
                next.last_status = None;
                next.last_seen_at = None;
                next.state = BindingState::Unbound;
                next.updated_at = *at;
            }
        }

        // ── Matcher hit ──────────────────────────────────────────
        BindingEvent::MatchHit { result, at } => {
            if state.is_pinned() {
                return (next, None);
            }
            next.resolved_port = Some(result.port);
            next.consecutive_misses = 0;
            next.state = BindingState::AutoMatched;
            next.last_status = Some(result.clone());
            next.last_seen_at = Some(*at);
            next.updated_at = *at;
            signal = Some(BindingSignal::Matched(result.clone()));
        }

        // ── Matcher miss ─────────────────────────────────────────
        BindingEvent::MatchMiss { at } => {
            if state.is_pinned() {
                return (next, None);
            }
            next.consecutive_misses = state.consecutive_misses.saturating_add(1);
            next.updated_at = *at;
            match state.state {
                BindingState::Offline => {}
                _ if next.consecutive_misses >= threshold => {
                    next.state = BindingState::Offline;
                    next.resolved_port = None;
                    next.last_status = None;
                    signal = Some(BindingSignal::Offline);
                }
                BindingState::Unbound => {}
                _ => {
                    next.state = BindingState::OfflinePending {
                        misses: next.consecutive_misses,
                    };
                }
            }
        }

        // ── Self-poll hit ────────────────────────────────────────
        BindingEvent::SelfPollHit { result, at } => {
            // Rounds started before a pin change report the old port.
            if !state.is_pinned() || result.port != state.pinned_port {
                return (next, None);
            }
            next.consecutive_misses = 0;
            next.last_status = Some(result.clone());
            next.last_seen_at = Some(*at);
            next.updated_at = *at;
            signal = Some(BindingSignal::Matched(result.clone()));
        }

        // ── Self-poll miss ───────────────────────────────────────
        BindingEvent::SelfPollMiss { port, at } => {
            if !state.is_pinned() || *port != state.pinned_port {
                return (next, None);
            }
            next.consecutive_misses = state.consecutive_misses.saturating_add(1);
            next.updated_at = *at;
            if state.consecutive_misses < threshold && next.consecutive_misses >= threshold {
                next.last_status = None;
                signal = Some(BindingSignal::Offline);
            }
        }

        // ── Optimistic edits ─────────────────────────────────────
        BindingEvent::LocalPluginState {
            class_names,
            active,
        } => {
            if let Some(last) = next.last_status.as_mut() {
                for plugin in last
                    .plugins
                    .iter_mut()
                    .filter(|p| class_names.contains(&p.class_name))
                {
                    plugin.active = *active;
                }
            }
        }

        BindingEvent::LocalProfitReset => {
            if let Some(last) = next.last_status.as_mut() {
                last.status.profit_gp = Some(0);
            }
        }
    }

    (next, signal)
}

// ─── Tests ───────────────────────────────────────────────────────────

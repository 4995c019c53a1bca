//! `tankmon wait`: block until an account's client reports logged in.
//!
//! Probes clients directly, so it works without a running daemon.

use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tankmon_core::{Account, PortRange, StatusPayload, identity_key};
use tankmon_probe::{PortProber, ProbeTransport, ScanDepth, Scanner};

/// Per-port timeout while searching; refused ports fail well before it.
pub const WAIT_PROBE_TIMEOUT: Duration = Duration::from_millis(100);

/// Delay between search rounds.
pub const WAIT_INTERVAL: Duration = Duration::from_secs(2);

/// Finds the account's `/status` once per round: the pinned port only, or
/// a status-only sweep of the range otherwise.
pub struct LoginProbe<T> {
    prober: Arc<PortProber<T>>,
    scanner: Scanner<T>,
    account: Account,
}

impl<T: ProbeTransport> LoginProbe<T> {
    pub fn new(prober: Arc<PortProber<T>>, range: PortRange, account: Account) -> Self {
        let scanner = Scanner::new(Arc::clone(&prober), range)
            .with_depth(ScanDepth::StatusOnly)
            .with_status_timeout(WAIT_PROBE_TIMEOUT);
        Self {
            prober,
            scanner,
            account,
        }
    }

    /// The account's current status, `None` when no client reports it.
    pub async fn find(&self) -> Option<StatusPayload> {
        let key = self.account.match_key();
        if key.is_empty() {
            return None;
        }
        if self.account.is_pinned() {
            let status = self
                .prober
                .status(self.account.pinned_port, WAIT_PROBE_TIMEOUT)
                .await?;
            return (identity_key(&status.player_name) == key).then_some(status);
        }
        let snapshot = self.scanner.scan().await?;
        // Ascending port order: the lowest matching port wins.
        snapshot
            .iter()
            .find(|r| identity_key(&r.status.player_name) == key)
            .map(|r| r.status.clone())
    }

    /// True when the client reports `LOGGED_IN`.
    pub async fn logged_in(&self) -> bool {
        self.find().await.is_some_and(|s| s.is_logged_in())
    }
}

/// Entry point for `tankmon wait`.
///
/// Returns an exit code:
/// - 0: logged in
/// - 1: timeout
/// - 3: interrupted (Ctrl-C)
pub async fn cmd_wait<T: ProbeTransport>(
    probe: &LoginProbe<T>,
    timeout: Duration,
    interval: Duration,
    quiet: bool,
) -> i32 {
    let is_tty = std::io::stderr().is_terminal();
    let show = is_tty && !quiet;
    let start = Instant::now();
    let name = probe.account.display_name.as_str();

    loop {
        let logged_in = tokio::select! {
            result = probe.logged_in() => result,
            _ = tokio::signal::ctrl_c() => {
                if show {
                    eprintln!();
                }
                return 3;
            }
        };

        if logged_in {
            if show {
                eprintln!("\r{name} logged in. ({}s)", start.elapsed().as_secs());
            }
            return 0;
        }

        if start.elapsed() >= timeout {
            if show {
                eprintln!("\rTimeout after {}s", timeout.as_secs());
            }
            return 1;
        }

        if show {
            let elapsed = start.elapsed().as_secs();
            let elapsed_display = if elapsed >= 60 {
                format!("{}m{:02}s", elapsed / 60, elapsed % 60)
            } else {
                format!("{elapsed}s")
            };
            eprint!("\rWaiting for {name}... ({elapsed_display})");
            let _ = std::io::stderr().flush();
        }

        let remaining = timeout.saturating_sub(start.elapsed());
        tokio::select! {
            _ = tokio::time::sleep(interval.min(remaining)) => {}
            _ = tokio::signal::ctrl_c() => {
                if show {
                    eprintln!();
                }
                return 3;
            }
        }
    }
}

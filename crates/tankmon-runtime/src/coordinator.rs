//! Plugin toggle coordinator: user commands against an account's client.
//!
//! Commands go to the account's current resolved port and are never
//! retried. Plugin flags are flipped locally before the request is sent;
//! the next poll confirms or reverts them.

use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;

use tankmon_core::BindingEvent;
use tankmon_probe::{ClientCommand, ProbeTransport};

use crate::engine::Shared;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOutcome {
    /// The client accepted the request.
    Sent,
    /// The request went out but failed or was refused.
    Rejected,
    /// The account has no resolved port; nothing was sent.
    Dropped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResetOutcome {
    /// No resolved port, before or after the settle delay.
    Dropped,
    /// No managed plugin was active.
    NothingActive,
    /// Stopped and started `plugins`; `accepted` start requests succeeded.
    Restarted { plugins: Vec<String>, accepted: usize },
}

pub struct PluginToggleCoordinator<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for PluginToggleCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: ProbeTransport + 'static> PluginToggleCoordinator<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>) -> Self {
        Self { shared }
    }

    async fn resolved_port(&self, account_id: &str) -> Option<u16> {
        self.shared.table.lock().await.resolved_port(account_id)
    }

    async fn set_local(&self, account_id: &str, class_names: Vec<String>, active: bool) {
        let event = BindingEvent::LocalPluginState {
            class_names,
            active,
        };
        self.shared.table.lock().await.apply(account_id, &event);
    }

    async fn send_to(&self, port: u16, command: &ClientCommand) -> CommandOutcome {
        if self.shared.prober.send(port, command).await {
            CommandOutcome::Sent
        } else {
            CommandOutcome::Rejected
        }
    }

    /// Flip one plugin. `currently_active` is the state the caller saw.
    pub async fn toggle(
        &self,
        account_id: &str,
        class_name: &str,
        currently_active: bool,
    ) -> CommandOutcome {
        let target = !currently_active;
        let port = {
            let mut table = self.shared.table.lock().await;
            let Some(port) = table.resolved_port(account_id) else {
                tracing::debug!(account = account_id, class_name, "toggle dropped, no port");
                return CommandOutcome::Dropped;
            };
            table.apply(
                account_id,
                &BindingEvent::LocalPluginState {
                    class_names: vec![class_name.to_string()],
                    active: target,
                },
            );
            port
        };
        let outcome = self
            .send_to(port, &ClientCommand::set_plugin(class_name, target))
            .await;
        if outcome == CommandOutcome::Sent {
            self.shared.request_refresh(account_id);
        }
        outcome
    }

    /// Stop every active managed plugin, wait for the client to settle,
    /// then start them again on whatever port the account resolves to now.
    pub async fn reset_all(&self, account_id: &str) -> ResetOutcome {
        let (port, plugins) = {
            let table = self.shared.table.lock().await;
            let Some(binding) = table.get(account_id) else {
                return ResetOutcome::Dropped;
            };
            let Some(port) = binding.resolved_port else {
                tracing::debug!(account = account_id, "reset dropped, no port");
                return ResetOutcome::Dropped;
            };
            let plugins = binding
                .last_status
                .as_ref()
                .map(|result| self.shared.markers.active_class_names(&result.plugins))
                .unwrap_or_default();
            (port, plugins)
        };
        if plugins.is_empty() {
            return ResetOutcome::NothingActive;
        }

        self.set_local(account_id, plugins.clone(), false).await;
        let stops = plugins
            .iter()
            .map(|class_name| ClientCommand::set_plugin(class_name.as_str(), false))
            .collect::<Vec<_>>();
        join_all(stops.iter().map(|command| self.send_to(port, command))).await;

        tokio::time::sleep(self.shared.config.reset_settle()).await;

        let Some(port) = self.resolved_port(account_id).await else {
            tracing::info!(account = account_id, "port lost during reset, restart skipped");
            return ResetOutcome::Dropped;
        };
        let starts = plugins
            .iter()
            .map(|class_name| ClientCommand::set_plugin(class_name.as_str(), true))
            .collect::<Vec<_>>();
        let accepted = join_all(starts.iter().map(|command| self.send_to(port, command)))
            .await
            .into_iter()
            .filter(|outcome| *outcome == CommandOutcome::Sent)
            .count();
        self.set_local(account_id, plugins.clone(), true).await;
        self.shared.request_refresh(account_id);

        tracing::info!(account = account_id, port, restarted = plugins.len(), accepted, "plugins reset");
        ResetOutcome::Restarted { plugins, accepted }
    }

    /// Zero the session profit counter.
    pub async fn reset_profit(&self, account_id: &str) -> CommandOutcome {
        let Some(port) = self.resolved_port(account_id).await else {
            return CommandOutcome::Dropped;
        };
        let outcome = self.send_to(port, &ClientCommand::ResetProfit).await;
        if outcome == CommandOutcome::Sent {
            self.shared
                .table
                .lock()
                .await
                .apply(account_id, &BindingEvent::LocalProfitReset);
            self.shared.request_refresh(account_id);
        }
        outcome
    }

    pub async fn pause(&self, account_id: &str) -> CommandOutcome {
        self.simple(account_id, ClientCommand::Pause).await
    }

    pub async fn resume(&self, account_id: &str) -> CommandOutcome {
        self.simple(account_id, ClientCommand::Resume).await
    }

    async fn simple(&self, account_id: &str, command: ClientCommand) -> CommandOutcome {
        let Some(port) = self.resolved_port(account_id).await else {
            tracing::debug!(account = account_id, %command, "command dropped, no port");
            return CommandOutcome::Dropped;
        };
        let outcome = self.send_to(port, &command).await;
        if outcome == CommandOutcome::Sent {
            self.shared.request_refresh(account_id);
        }
        outcome
    }
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::StaticAccounts;
    use crate::config::EngineConfig;
    use crate::engine::Engine;
    use crate::sink::TracingSink;
    use serde_json::json;
    use tankmon_core::{Account, PortRange};
    use tankmon_probe::fake::{FakeTransport, RecordedPost};

    fn engine(fake: &Arc<FakeTransport>, accounts: Vec<Account>) -> Engine<Arc<FakeTransport>> {
        let config = EngineConfig {
            port_range: PortRange::new(7070, 7075).expect("range"),
            scan_interval_ms: 60_000,
            self_poll_interval_ms: 60_000,
            scan_timeout_ms: 50,
            detail_timeout_ms: 50,
            command_timeout_ms: 50,
            reset_settle_ms: 5,
            ..EngineConfig::default()
        };
        Engine::new(
            config,
            Arc::clone(fake),
            Arc::new(StaticAccounts::new(accounts)),
            Arc::new(TracingSink),
        )
    }

    fn serve_bob(fake: &FakeTransport, port: u16) {
        fake.serve_player(port, "Bob");
        fake.respond(
            port,
            "/plugins",
            json!([
                {"className": "net.microbot.Woodcutting", "name": "Woodcutting", "active": true},
                {"className": "net.babytank.Fishing", "name": "Fishing", "active": false},
                {"className": "net.runelite.Xp", "name": "Xp", "active": true}
            ]),
        );
    }

    fn plugin_active(result: &tankmon_core::ProbeResult, class_name: &str) -> Option<bool> {
        result
            .plugins
            .iter()
            .find(|p| p.class_name == class_name)
            .map(|p| p.active)
    }

    #[tokio::test]
    async fn toggle_without_port_is_dropped() {
        let fake = Arc::new(FakeTransport::new());
        let engine = engine(&fake, vec![Account::new("bob", "Bob")]);
        engine.sync_accounts().await;

        let outcome = engine.coordinator().toggle("bob", "net.microbot.X", false).await;

        assert_eq!(outcome, CommandOutcome::Dropped);
        assert!(fake.posts().is_empty());
    }

    #[tokio::test]
    async fn toggle_flips_locally_then_sends() {
        let fake = Arc::new(FakeTransport::new());
        serve_bob(&fake, 7072);
        let engine = engine(&fake, vec![Account::new("bob", "Bob")]);
        engine.run_cycle().await;

        let outcome = engine
            .coordinator()
            .toggle("bob", "net.microbot.Woodcutting", true)
            .await;

        assert_eq!(outcome, CommandOutcome::Sent);
        assert_eq!(
            fake.posts(),
            vec![RecordedPost {
                port: 7072,
                path: "/plugins/stop".into(),
                body: Some(json!({"className": "net.microbot.Woodcutting"})),
            }]
        );
        let binding = engine.binding("bob").await.expect("binding");
        let status = binding.last_status.expect("status");
        assert_eq!(plugin_active(&status, "net.microbot.Woodcutting"), Some(false));
    }

    #[tokio::test]
    async fn reset_restarts_only_active_managed_plugins() {
        let fake = Arc::new(FakeTransport::new());
        serve_bob(&fake, 7071);
        let engine = engine(&fake, vec![Account::new("bob", "Bob")]);
        engine.run_cycle().await;

        let outcome = engine.coordinator().reset_all("bob").await;

        assert_eq!(
            outcome,
            ResetOutcome::Restarted {
                plugins: vec!["net.microbot.Woodcutting".into()],
                accepted: 1,
            }
        );
        let paths: Vec<String> = fake.posts().into_iter().map(|p| p.path).collect();
        assert_eq!(paths, vec!["/plugins/stop", "/plugins/start"]);
    }

    #[tokio::test]
    async fn reset_with_nothing_active_sends_nothing() {
        let fake = Arc::new(FakeTransport::new());
        fake.serve_player(7070, "Bob");
        let engine = engine(&fake, vec![Account::new("bob", "Bob")]);
        engine.run_cycle().await;

        assert_eq!(engine.coordinator().reset_all("bob").await, ResetOutcome::NothingActive);
        assert!(fake.posts().is_empty());
    }

    #[tokio::test]
    async fn rejected_command_is_reported_not_retried() {
        let fake = Arc::new(FakeTransport::new());
        serve_bob(&fake, 7073);
        fake.fail_with(7073, "/pause", 500);
        let engine = engine(&fake, vec![Account::new("bob", "Bob")]);
        engine.run_cycle().await;

        assert_eq!(engine.coordinator().pause("bob").await, CommandOutcome::Rejected);
        assert_eq!(fake.posts().len(), 1);
    }

    #[tokio::test]
    async fn profit_reset_zeroes_local_counter() {
        let fake = Arc::new(FakeTransport::new());
        fake.respond(7070, "/status", json!({"playerName": "Bob", "profitGp": 5000}));
        let engine = engine(&fake, vec![Account::new("bob", "Bob")]);
        engine.run_cycle().await;

        assert_eq!(engine.coordinator().reset_profit("bob").await, CommandOutcome::Sent);
        let binding = engine.binding("bob").await.expect("binding");
        assert_eq!(binding.last_status.expect("status").status.profit_gp, Some(0));
    }
}

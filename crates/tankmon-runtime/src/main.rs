//! tankmon: live status for local game clients.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde_json::json;

use tankmon_probe::{HttpTransport, PortProber};
use tankmon_runtime::accounts::{AccountSource, JsonAccountFile};
use tankmon_runtime::cli::{self, Command};
use tankmon_runtime::cmd_wait::{self, LoginProbe};
use tankmon_runtime::config::EngineConfig;
use tankmon_runtime::{client, cmd_ls, context, daemon, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);

    let command = args
        .command
        .unwrap_or_else(|| Command::Ls(cli::LsOpts::default()));

    match command {
        Command::Daemon(opts) => {
            let filter = std::env::var("TANKMON_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!("tankmon daemon starting");

            let mut config = EngineConfig::load(args.config.as_deref())?;
            opts.apply(&mut config);
            daemon::run_daemon(config, &socket_path).await?;
        }
        Command::Ls(opts) => {
            let use_color = context::resolve_color(&opts.color);
            cmd_ls::cmd_ls(&socket_path, opts.all, opts.json, use_color).await?;
        }
        Command::Refresh(opts) => {
            let params = match opts.account {
                Some(account) => json!({ "account": account }),
                None => json!({}),
            };
            client::cmd_command(&socket_path, "refresh", params).await?;
        }
        Command::Toggle(opts) => {
            let mut params = json!({
                "account": opts.plugin.account,
                "class_name": opts.plugin.class_name,
            });
            if let Some(active) = opts.target() {
                params["active"] = json!(active);
            }
            client::cmd_command(&socket_path, "toggle_plugin", params).await?;
        }
        Command::Reset(opts) => {
            client::cmd_command(&socket_path, "reset_plugins", json!({ "account": opts.account }))
                .await?;
        }
        Command::ProfitReset(opts) => {
            client::cmd_command(&socket_path, "reset_profit", json!({ "account": opts.account }))
                .await?;
        }
        Command::Pause(opts) => {
            client::cmd_command(&socket_path, "pause", json!({ "account": opts.account })).await?;
        }
        Command::Resume(opts) => {
            client::cmd_command(&socket_path, "resume", json!({ "account": opts.account })).await?;
        }
        Command::Star(opts) => {
            client::cmd_command(
                &socket_path,
                "toggle_favorite",
                json!({ "account": opts.account, "class_name": opts.class_name }),
            )
            .await?;
        }
        Command::Wait(opts) => {
            let config = EngineConfig::load(args.config.as_deref())?;
            let accounts = JsonAccountFile::new(config.accounts_path()).load()?;
            let Some(account) = server::resolve_account(&accounts, &opts.account) else {
                anyhow::bail!("unknown account {:?}", opts.account);
            };
            let prober = Arc::new(PortProber::new(
                HttpTransport::new(config.host.clone()),
                config.timeouts(),
            ));
            let probe = LoginProbe::new(prober, config.port_range, account);
            let exit_code = cmd_wait::cmd_wait(
                &probe,
                Duration::from_secs(opts.timeout),
                cmd_wait::WAIT_INTERVAL,
                opts.quiet,
            )
            .await;
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

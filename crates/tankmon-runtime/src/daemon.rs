//! `tankmon daemon`: engine plus UDS server until ctrl-c or SIGTERM.

use std::sync::Arc;

use tankmon_probe::HttpTransport;

use crate::accounts::JsonAccountFile;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::favorites::Favorites;
use crate::server::{self, ServerState};
use crate::sink::TracingSink;

pub async fn run_daemon(config: EngineConfig, socket_path: &str) -> anyhow::Result<()> {
    config.validate()?;

    let accounts_path = config.accounts_path();
    let favorites = Arc::new(Favorites::load(config.favorites_path()));
    tracing::info!(
        accounts = %accounts_path.display(),
        favorites = %favorites.path().display(),
        "daemon config loaded"
    );

    let transport = HttpTransport::new(config.host.clone());
    let engine = Arc::new(Engine::new(
        config,
        transport,
        Arc::new(JsonAccountFile::new(accounts_path)),
        Arc::new(TracingSink),
    ));
    engine.start();

    // Start UDS server
    let server_state = ServerState {
        engine: Arc::clone(&engine),
        favorites,
    };
    let server_socket = socket_path.to_string();
    let mut server_handle = tokio::spawn(async move {
        if let Err(e) = server::run_server(&server_socket, server_state).await {
            tracing::error!("UDS server error: {e}");
        }
    });

    // Wait for shutdown signal (ctrl-c or SIGTERM)
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                        _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                    }
                }
                Err(e) => {
                    tracing::warn!("cannot register SIGTERM handler: {e}");
                    ctrl_c.await.ok();
                    tracing::info!("received ctrl-c, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            tracing::info!("received ctrl-c, shutting down");
        }
    };

    tokio::select! {
        () = shutdown => {}
        _ = &mut server_handle => {
            tracing::warn!("server exited unexpectedly");
        }
    }

    server_handle.abort();
    engine.shutdown().await;

    // Cleanup socket
    let _ = std::fs::remove_file(socket_path);
    tracing::info!("daemon stopped");
    Ok(())
}

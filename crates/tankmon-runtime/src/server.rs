//! UDS JSON-RPC server: minimal hand-rolled implementation.
//! Connection-per-request, newline-delimited JSON.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

use tankmon_core::{Account, AccountBinding, ManagedMarkers, StatusView, order_plugins};
use tankmon_probe::ProbeTransport;

use crate::engine::Engine;
use crate::favorites::Favorites;

const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const PARSE_ERROR: i64 = -32700;
const INTERNAL_ERROR: i64 = -32603;

/// Everything a request handler can reach.
pub struct ServerState<T: ProbeTransport + 'static> {
    pub engine: Arc<Engine<T>>,
    pub favorites: Arc<Favorites>,
}

impl<T: ProbeTransport + 'static> Clone for ServerState<T> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            favorites: Arc::clone(&self.favorites),
        }
    }
}

/// Run the UDS JSON-RPC server.
pub async fn run_server<T: ProbeTransport + 'static>(
    socket_path: &str,
    state: ServerState<T>,
) -> anyhow::Result<()> {
    // Create socket directory with mode 0700
    let socket_dir = Path::new(socket_path)
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    // Check for stale socket
    if Path::new(socket_path).exists() {
        if tokio::net::UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {socket_path}");
        } else {
            anyhow::bail!("another daemon is already running at {socket_path}");
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("UDS server listening on {socket_path}");

    loop {
        let (stream, _) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, state).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }
}

async fn handle_connection<T: ProbeTransport + 'static>(
    stream: tokio::net::UnixStream,
    state: ServerState<T>,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response = match serde_json::from_str::<Value>(line.trim()) {
        Ok(request) => handle_request(&state, &request).await,
        Err(e) => error_response(Value::Null, PARSE_ERROR, &e.to_string()),
    };

    let mut resp = serde_json::to_string(&response)?;
    resp.push('\n');
    writer.write_all(resp.as_bytes()).await?;

    Ok(())
}

fn error_response(id: Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {"code": code, "message": message},
        "id": id,
    })
}

/// Method failure, mapped to a JSON-RPC error object.
struct RpcError {
    code: i64,
    message: String,
}

impl RpcError {
    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: INVALID_PARAMS,
            message: message.into(),
        }
    }
}

/// Dispatch one decoded request and build the full response object.
pub async fn handle_request<T: ProbeTransport + 'static>(
    state: &ServerState<T>,
    request: &Value,
) -> Value {
    let method = request["method"].as_str().unwrap_or("");
    let id = request["id"].clone();
    let params = &request["params"];

    let result = match method {
        "list_accounts" => Ok(list_accounts(state, params["all"].as_bool().unwrap_or(false)).await),
        "refresh" => refresh(state, params),
        "toggle_plugin" => toggle_plugin(state, params).await,
        "reset_plugins" => match account_param(state, params) {
            Ok(account) => {
                let outcome = state.engine.coordinator().reset_all(&account.id).await;
                serde_json::to_value(outcome).map_err(|e| RpcError {
                    code: INTERNAL_ERROR,
                    message: e.to_string(),
                })
            }
            Err(e) => Err(e),
        },
        "reset_profit" | "pause" | "resume" => simple_command(state, method, params).await,
        "toggle_favorite" => toggle_favorite(state, params),
        _ => {
            return error_response(id, METHOD_NOT_FOUND, "method not found");
        }
    };

    match result {
        Ok(result) => json!({
            "jsonrpc": "2.0",
            "result": result,
            "id": id,
        }),
        Err(e) => {
            tracing::debug!(method, code = e.code, error = %e.message, "request failed");
            error_response(id, e.code, &e.message)
        }
    }
}

/// Find an account by id, else by case-insensitive display name.
pub fn resolve_account(accounts: &[Account], key: &str) -> Option<Account> {
    let key = key.trim();
    accounts
        .iter()
        .find(|a| a.id == key)
        .or_else(|| {
            accounts
                .iter()
                .find(|a| a.display_name.trim().eq_ignore_ascii_case(key))
        })
        .cloned()
}

fn account_param<T: ProbeTransport + 'static>(
    state: &ServerState<T>,
    params: &Value,
) -> Result<Account, RpcError> {
    let key = params["account"]
        .as_str()
        .ok_or_else(|| RpcError::invalid_params("missing \"account\""))?;
    resolve_account(&state.engine.accounts(), key)
        .ok_or_else(|| RpcError::invalid_params(format!("unknown account {key:?}")))
}

fn class_name_param(params: &Value) -> Result<&str, RpcError> {
    params["class_name"]
        .as_str()
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| RpcError::invalid_params("missing \"class_name\""))
}

async fn list_accounts<T: ProbeTransport + 'static>(state: &ServerState<T>, all: bool) -> Value {
    let accounts = state.engine.accounts();
    let bindings = state.engine.bindings().await;
    let markers = state.engine.markers();
    let threshold = state.engine.config().offline_threshold;
    let entries: Vec<Value> = accounts
        .iter()
        .map(|account| {
            let binding = bindings.iter().find(|b| b.account_id == account.id);
            let favorites = state.favorites.get(&account.id);
            account_entry(account, binding, &favorites, markers, threshold, all)
        })
        .collect();
    Value::Array(entries)
}

/// One `list_accounts` row.
pub(crate) fn account_entry(
    account: &Account,
    binding: Option<&AccountBinding>,
    favorites: &HashSet<String>,
    markers: &ManagedMarkers,
    threshold: u32,
    all: bool,
) -> Value {
    let last = binding.and_then(|b| b.last_status.as_ref());
    let view = StatusView::from_result(last);
    let plugins: Vec<Value> = last
        .map(|result| {
            let listed: Vec<_> = if all {
                result.plugins.iter().collect()
            } else {
                markers.filter(&result.plugins).collect()
            };
            order_plugins(listed, favorites)
                .into_iter()
                .map(|p| {
                    json!({
                        "class_name": p.class_name,
                        "name": p.name,
                        "active": p.active,
                        "favorite": favorites.contains(&p.class_name),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "id": account.id,
        "display_name": account.display_name,
        "state": binding.map(|b| b.reported_state(threshold).as_label()),
        "pinned_port": binding.map_or(0, |b| b.pinned_port),
        "resolved_port": binding.and_then(|b| b.resolved_port),
        "misses": binding.map_or(0, |b| b.consecutive_misses),
        "view": view,
        "plugins": plugins,
        "last_seen_at": binding.and_then(|b| b.last_seen_at),
        "updated_at": binding.map(|b| b.updated_at),
    })
}

fn refresh<T: ProbeTransport + 'static>(
    state: &ServerState<T>,
    params: &Value,
) -> Result<Value, RpcError> {
    if params["account"].is_null() {
        state.engine.refresh_now();
        return Ok(json!({"requested": "all"}));
    }
    let account = account_param(state, params)?;
    state.engine.request_refresh(&account.id);
    Ok(json!({"requested": account.id}))
}

async fn toggle_plugin<T: ProbeTransport + 'static>(
    state: &ServerState<T>,
    params: &Value,
) -> Result<Value, RpcError> {
    let account = account_param(state, params)?;
    let class_name = class_name_param(params)?;
    // Explicit target wins; otherwise flip what the last poll reported.
    let currently_active = match params["active"].as_bool() {
        Some(target) => !target,
        None => state
            .engine
            .binding(&account.id)
            .await
            .and_then(|b| b.last_status)
            .and_then(|r| r.plugins.into_iter().find(|p| p.class_name == class_name))
            .is_some_and(|p| p.active),
    };
    let outcome = state
        .engine
        .coordinator()
        .toggle(&account.id, class_name, currently_active)
        .await;
    Ok(json!({"outcome": outcome, "active": !currently_active}))
}

async fn simple_command<T: ProbeTransport + 'static>(
    state: &ServerState<T>,
    method: &str,
    params: &Value,
) -> Result<Value, RpcError> {
    let account = account_param(state, params)?;
    let coordinator = state.engine.coordinator();
    let outcome = match method {
        "reset_profit" => coordinator.reset_profit(&account.id).await,
        "pause" => coordinator.pause(&account.id).await,
        _ => coordinator.resume(&account.id).await,
    };
    Ok(json!({"outcome": outcome}))
}

fn toggle_favorite<T: ProbeTransport + 'static>(
    state: &ServerState<T>,
    params: &Value,
) -> Result<Value, RpcError> {
    let account = account_param(state, params)?;
    let class_name = class_name_param(params)?;
    let starred = state
        .favorites
        .toggle(&account.id, class_name)
        .map_err(|e| RpcError {
            code: INTERNAL_ERROR,
            message: format!("failed to save favorites: {e}"),
        })?;
    Ok(json!({"starred": starred}))
}

// ─── Tests ────────────────────────────────────────────────────────

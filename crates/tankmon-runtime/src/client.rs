//! UDS JSON-RPC client for CLI subcommands.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

pub(crate) async fn rpc_call(
    socket_path: &str,
    method: &str,
    params: Value,
) -> anyhow::Result<Value> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot connect to daemon at {socket_path}: {e}"))?;

    let (reader, mut writer) = stream.into_split();

    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
    let mut req = serde_json::to_string(&request)?;
    req.push('\n');
    writer.write_all(req.as_bytes()).await?;
    writer.shutdown().await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response: Value = serde_json::from_str(line.trim())?;

    if let Some(error) = response.get("error") {
        let message = error["message"].as_str().unwrap_or("unknown error");
        anyhow::bail!("RPC error: {message}");
    }

    Ok(response["result"].clone())
}

/// `tankmon toggle|reset|profit-reset|pause|resume|star|refresh`: one call,
/// one summary line.
pub async fn cmd_command(socket_path: &str, method: &str, params: Value) -> anyhow::Result<()> {
    let result = rpc_call(socket_path, method, params).await?;
    println!("{}", format_result(method, &result));
    Ok(())
}

/// Human summary of a command result.
pub(crate) fn format_result(method: &str, result: &Value) -> String {
    match method {
        "toggle_favorite" => {
            if result["starred"].as_bool() == Some(true) {
                "starred".to_string()
            } else {
                "unstarred".to_string()
            }
        }
        "refresh" => match result["requested"].as_str() {
            Some("all") | None => "refresh requested".to_string(),
            Some(id) => format!("refresh requested for {id}"),
        },
        "reset_plugins" => match result["outcome"].as_str() {
            Some("restarted") => {
                let plugins: Vec<&str> = result["plugins"]
                    .as_array()
                    .map(|a| a.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                format!(
                    "restarted {} plugin(s), {} accepted: {}",
                    plugins.len(),
                    result["accepted"].as_u64().unwrap_or(0),
                    plugins.join(", ")
                )
            }
            Some("nothing_active") => "no active managed plugins".to_string(),
            _ => "dropped: account has no port".to_string(),
        },
        _ => match result["outcome"].as_str() {
            Some("sent") => "ok".to_string(),
            Some("rejected") => "rejected by client".to_string(),
            Some("dropped") => "dropped: account has no port".to_string(),
            _ => result.to_string(),
        },
    }
}

//! `tankmon ls`: one block per account, status line then plugins.

use chrono::{DateTime, Utc};
use serde_json::Value;

use tankmon_core::Tone;
use tankmon_core::view::UNKNOWN;

use crate::client::rpc_call;
use crate::context::{paint, relative_time, tone_sgr, truncate};

/// Longest plugin name shown before truncation.
const PLUGIN_NAME_WIDTH: usize = 28;

/// Entry point for `tankmon ls`.
pub async fn cmd_ls(socket_path: &str, all: bool, json: bool, use_color: bool) -> anyhow::Result<()> {
    let accounts = rpc_call(socket_path, "list_accounts", serde_json::json!({ "all": all })).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&accounts)?);
        return Ok(());
    }

    let arr = accounts.as_array().cloned().unwrap_or_default();
    let output = format_ls(&arr, Utc::now(), use_color);
    if output.is_empty() {
        println!("no accounts");
    } else {
        println!("{output}");
    }
    Ok(())
}

fn tone_of(value: &Value) -> Tone {
    serde_json::from_value(value.clone()).unwrap_or_default()
}

fn age(account: &Value, now: DateTime<Utc>) -> Option<String> {
    let seen: DateTime<Utc> = serde_json::from_value(account["last_seen_at"].clone()).ok()?;
    Some(relative_time((now - seen).num_seconds()))
}

fn port_label(account: &Value) -> String {
    let pinned = account["pinned_port"].as_u64().unwrap_or(0);
    match account["resolved_port"].as_u64() {
        Some(port) if pinned > 0 => format!(":{port} (pinned)"),
        Some(port) => format!(":{port}"),
        None => "no port".to_string(),
    }
}

/// Render `list_accounts` rows.
pub fn format_ls(accounts: &[Value], now: DateTime<Utc>, use_color: bool) -> String {
    let name_width = accounts
        .iter()
        .map(|a| a["display_name"].as_str().unwrap_or("?").chars().count())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    for account in accounts {
        let view = &account["view"];
        let online = view["online"].as_bool().unwrap_or(false);
        let name = account["display_name"].as_str().unwrap_or("?");
        let state = account["state"].as_str().unwrap_or("UNBOUND");

        let dot = if online {
            paint("●", "32", use_color)
        } else {
            paint("○", "2", use_color)
        };
        let name = paint(&format!("{name:<name_width$}"), "1", use_color);
        let state = if state.starts_with("OFFLINE_PENDING") {
            paint(state, tone_sgr(Tone::Warn), use_color)
        } else {
            paint(state, "2", use_color)
        };
        out.push_str(&format!("{dot} {name}  {state}  {}", port_label(account)));

        if online {
            let hp = view["hp"].as_str().unwrap_or(UNKNOWN);
            let hp = if view["hp_low"].as_bool() == Some(true) {
                paint(hp, tone_sgr(Tone::Bad), use_color)
            } else {
                hp.to_string()
            };
            let profit = paint(
                view["profit"].as_str().unwrap_or(UNKNOWN),
                tone_sgr(tone_of(&view["profit_tone"])),
                use_color,
            );
            let script = paint(
                view["script"].as_str().unwrap_or(UNKNOWN),
                tone_sgr(tone_of(&view["script_tone"])),
                use_color,
            );
            out.push_str(&format!(
                "\n    w{}  hp {hp}  up {}  {profit}  {script}",
                view["world"].as_str().unwrap_or(UNKNOWN),
                view["uptime"].as_str().unwrap_or(UNKNOWN),
            ));
            if let Some(age) = age(account, now) {
                out.push_str(&format!("  {}", paint(&age, "2", use_color)));
            }
        }

        for plugin in account["plugins"].as_array().into_iter().flatten() {
            let active = plugin["active"].as_bool().unwrap_or(false);
            let star = if plugin["favorite"].as_bool() == Some(true) {
                paint("★", "1;33", use_color)
            } else {
                " ".to_string()
            };
            let flag = if active {
                paint("on ", "32", use_color)
            } else {
                paint("off", "2", use_color)
            };
            let name = truncate(plugin["name"].as_str().unwrap_or("?"), PLUGIN_NAME_WIDTH);
            out.push_str(&format!(
                "\n    {star} {flag} {name:<PLUGIN_NAME_WIDTH$} {}",
                paint(plugin["class_name"].as_str().unwrap_or(""), "36", use_color)
            ));
        }
        out.push('\n');
    }

    while out.ends_with('\n') {
        out.pop();
    }
    out
}

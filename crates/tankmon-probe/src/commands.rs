//! Client-side commands (`POST` endpoints).

use std::fmt;

use serde_json::{Value, json};

use crate::prober::PortProber;
use crate::transport::ProbeTransport;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    StartPlugin { class_name: String },
    StopPlugin { class_name: String },
    ResetProfit,
    Pause,
    Resume,
}

impl ClientCommand {
    /// Start or stop, by the desired end state.
    pub fn set_plugin(class_name: impl Into<String>, active: bool) -> Self {
        let class_name = class_name.into();
        if active {
            Self::StartPlugin { class_name }
        } else {
            Self::StopPlugin { class_name }
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Self::StartPlugin { .. } => "/plugins/start",
            Self::StopPlugin { .. } => "/plugins/stop",
            Self::ResetProfit => "/profit/reset",
            Self::Pause => "/pause",
            Self::Resume => "/resume",
        }
    }

    pub fn body(&self) -> Option<Value> {
        match self {
            Self::StartPlugin { class_name } | Self::StopPlugin { class_name } => {
                Some(json!({ "className": class_name }))
            }
            Self::ResetProfit | Self::Pause | Self::Resume => None,
        }
    }
}

impl fmt::Display for ClientCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartPlugin { class_name } => write!(f, "start {class_name}"),
            Self::StopPlugin { class_name } => write!(f, "stop {class_name}"),
            Self::ResetProfit => f.write_str("reset profit"),
            Self::Pause => f.write_str("pause"),
            Self::Resume => f.write_str("resume"),
        }
    }
}

impl<T: ProbeTransport> PortProber<T> {
    /// Send one command. Never retried.
    pub async fn send(&self, port: u16, command: &ClientCommand) -> bool {
        let body = command.body();
        let accepted = self.post(port, command.path(), body.as_ref()).await;
        tracing::debug!(port, %command, accepted, "client command");
        accepted
    }
}

//! Error types for the HTTP probe boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("port {port}: {path} timed out after {timeout_ms} ms")]
    Timeout {
        port: u16,
        path: String,
        timeout_ms: u64,
    },

    #[error("port {port}: {path} request failed: {source}")]
    Http {
        port: u16,
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("port {port}: {path} connection failed: {detail}")]
    Connect {
        port: u16,
        path: String,
        detail: String,
    },

    #[error("port {port}: {path} returned HTTP {status}")]
    Status { port: u16, path: String, status: u16 },

    #[error("port {port}: {path} returned a malformed body: {detail}")]
    Malformed {
        port: u16,
        path: String,
        detail: String,
    },

    #[error("failed to build http client: {0}")]
    Client(String),
}

impl ProbeError {
    /// Transport-level failure; the pooled connection for the port is suspect.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Http { .. } | Self::Connect { .. } | Self::Client(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_classification() {
        let timeout = ProbeError::Timeout {
            port: 7070,
            path: "/status".into(),
            timeout_ms: 300,
        };
        let status = ProbeError::Status {
            port: 7070,
            path: "/status".into(),
            status: 503,
        };
        assert!(timeout.is_io());
        assert!(!status.is_io());
        assert_eq!(status.to_string(), "port 7070: /status returned HTTP 503");
    }
}

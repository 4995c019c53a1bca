//! ProbeTransport trait and HttpTransport (reqwest, one client per port).
//! The trait is the mock-injection seam for every async component.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::ProbeError;

/// Loopback host used by client processes.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// HTTP transport against `host:port`. Implementations must never retry.
pub trait ProbeTransport: Send + Sync {
    /// GET `path` and decode the body as JSON.
    fn get(
        &self,
        port: u16,
        path: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, ProbeError>> + Send;

    /// POST `path` with an optional JSON body. Any 2xx is success.
    fn post(
        &self,
        port: u16,
        path: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), ProbeError>> + Send;
}

impl<T: ProbeTransport> ProbeTransport for &T {
    fn get(
        &self,
        port: u16,
        path: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, ProbeError>> + Send {
        (**self).get(port, path, timeout)
    }

    fn post(
        &self,
        port: u16,
        path: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), ProbeError>> + Send {
        (**self).post(port, path, body, timeout)
    }
}

impl<T: ProbeTransport> ProbeTransport for Arc<T> {
    fn get(
        &self,
        port: u16,
        path: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value, ProbeError>> + Send {
        (**self).get(port, path, timeout)
    }

    fn post(
        &self,
        port: u16,
        path: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), ProbeError>> + Send {
        (**self).post(port, path, body, timeout)
    }
}

// ─── HttpTransport ───────────────────────────────────────────────────

/// Real transport. Keeps one keep-alive `reqwest::Client` per port and
/// drops it on any transport-level failure.
pub struct HttpTransport {
    host: String,
    pool: Mutex<HashMap<u16, reqwest::Client>>,
}

impl HttpTransport {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            pool: Mutex::new(HashMap::new()),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    fn url(&self, port: u16, path: &str) -> String {
        format!("http://{}:{port}{path}", self.host)
    }

    async fn client_for(&self, port: u16) -> Result<reqwest::Client, ProbeError> {
        let mut pool = self.pool.lock().await;
        if let Some(client) = pool.get(&port) {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
            .no_proxy()
            .pool_max_idle_per_host(1)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;
        pool.insert(port, client.clone());
        Ok(client)
    }

    async fn evict(&self, port: u16) {
        if self.pool.lock().await.remove(&port).is_some() {
            tracing::trace!(port, "evicted pooled connection");
        }
    }

    /// Number of ports with a pooled client.
    pub async fn pooled(&self) -> usize {
        self.pool.lock().await.len()
    }

    async fn finish<R>(&self, port: u16, result: Result<R, ProbeError>) -> Result<R, ProbeError> {
        let io_failure = matches!(&result, Err(e) if e.is_io());
        if io_failure {
            self.evict(port).await;
        }
        result
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(DEFAULT_HOST)
    }
}

fn request_error(port: u16, path: &str, timeout: Duration, e: reqwest::Error) -> ProbeError {
    if e.is_timeout() {
        ProbeError::Timeout {
            port,
            path: path.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    } else if e.is_connect() {
        ProbeError::Connect {
            port,
            path: path.to_string(),
            detail: e.to_string(),
        }
    } else if e.is_decode() {
        ProbeError::Malformed {
            port,
            path: path.to_string(),
            detail: e.to_string(),
        }
    } else {
        ProbeError::Http {
            port,
            path: path.to_string(),
            source: e,
        }
    }
}

fn check_status(port: u16, path: &str, resp: &reqwest::Response) -> Result<(), ProbeError> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(ProbeError::Status {
            port,
            path: path.to_string(),
            status: status.as_u16(),
        })
    }
}

impl ProbeTransport for HttpTransport {
    async fn get(&self, port: u16, path: &str, timeout: Duration) -> Result<Value, ProbeError> {
        let client = self.client_for(port).await?;
        let result = async {
            let resp = client
                .get(self.url(port, path))
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| request_error(port, path, timeout, e))?;
            check_status(port, path, &resp)?;
            resp.json::<Value>()
                .await
                .map_err(|e| request_error(port, path, timeout, e))
        }
        .await;
        self.finish(port, result).await
    }

    async fn post(
        &self,
        port: u16,
        path: &str,
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<(), ProbeError> {
        let client = self.client_for(port).await?;
        let mut request = client.post(self.url(port, path)).timeout(timeout);
        if let Some(body) = body {
            request = request.json(body);
        }
        let result = async {
            let resp = request
                .send()
                .await
                .map_err(|e| request_error(port, path, timeout, e))?;
            check_status(port, path, &resp)
        }
        .await;
        self.finish(port, result).await
    }
}

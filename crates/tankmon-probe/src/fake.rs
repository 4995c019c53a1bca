//! In-memory transport for tests. Routes are `(port, path)` pairs; anything
//! unrouted behaves like a refused connection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::Semaphore;

use crate::error::ProbeError;
use crate::transport::ProbeTransport;

#[derive(Debug, Clone)]
enum Reply {
    Json(Value),
    Status(u16),
    Slow(Duration, Value),
}

/// One POST observed by the fake.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPost {
    pub port: u16,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<(u16, String), Reply>>,
    posts: Mutex<Vec<RecordedPost>>,
    gets: AtomicUsize,
    post_gate: Mutex<Option<Arc<Semaphore>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn refused(port: u16, path: &str) -> ProbeError {
    ProbeError::Connect {
        port,
        path: path.to_string(),
        detail: "connection refused".into(),
    }
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for GET `path` on `port`.
    pub fn respond(&self, port: u16, path: &str, body: Value) {
        lock(&self.routes).insert((port, path.to_string()), Reply::Json(body));
    }

    /// Serve `body` after `delay`. Requests with a shorter timeout time out.
    pub fn respond_slowly(&self, port: u16, path: &str, delay: Duration, body: Value) {
        lock(&self.routes).insert((port, path.to_string()), Reply::Slow(delay, body));
    }

    /// Answer `path` on `port` with a non-2xx status.
    pub fn fail_with(&self, port: u16, path: &str, status: u16) {
        lock(&self.routes).insert((port, path.to_string()), Reply::Status(status));
    }

    /// Serve a minimal `/status` for `name`.
    pub fn serve_player(&self, port: u16, name: &str) {
        self.respond(port, "/status", json!({ "playerName": name }));
    }

    /// Stop serving every path on `port`.
    pub fn shutdown_port(&self, port: u16) {
        lock(&self.routes).retain(|(p, _), _| *p != port);
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn posts(&self) -> Vec<RecordedPost> {
        lock(&self.posts).clone()
    }

    /// Hold every subsequent POST until a permit is added to the returned
    /// semaphore. The request is recorded before it blocks.
    pub fn gate_posts(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *lock(&self.post_gate) = Some(Arc::clone(&gate));
        gate
    }

    fn serves(&self, port: u16) -> bool {
        lock(&self.routes).keys().any(|(p, _)| *p == port)
    }

    fn route(&self, port: u16, path: &str) -> Option<Reply> {
        lock(&self.routes).get(&(port, path.to_string())).cloned()
    }
}

impl ProbeTransport for FakeTransport {
    async fn get(&self, port: u16, path: &str, timeout: Duration) -> Result<Value, ProbeError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        match self.route(port, path) {
            None => Err(refused(port, path)),
            Some(Reply::Json(body)) => Ok(body),
            Some(Reply::Status(status)) => Err(ProbeError::Status {
                port,
                path: path.to_string(),
                status,
            }),
            Some(Reply::Slow(delay, body)) => {
                if delay > timeout {
                    tokio::time::sleep(timeout).await;
                    Err(ProbeError::Timeout {
                        port,
                        path: path.to_string(),
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    })
                } else {
                    tokio::time::sleep(delay).await;
                    Ok(body)
                }
            }
        }
    }

    async fn post(
        &self,
        port: u16,
        path: &str,
        body: Option<&Value>,
        _timeout: Duration,
    ) -> Result<(), ProbeError> {
        lock(&self.posts).push(RecordedPost {
            port,
            path: path.to_string(),
            body: body.cloned(),
        });
        let gate = lock(&self.post_gate).clone();
        if let Some(gate) = gate
            && let Ok(permit) = gate.acquire().await
        {
            permit.forget();
        }
        if let Some(Reply::Status(status)) = self.route(port, path) {
            return Err(ProbeError::Status {
                port,
                path: path.to_string(),
                status,
            });
        }
        if self.serves(port) {
            Ok(())
        } else {
            Err(refused(port, path))
        }
    }
}

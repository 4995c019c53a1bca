//! Read-only view of the external account store.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::Deserialize;
use thiserror::Error;

use tankmon_core::Account;

#[derive(Debug, Error)]
pub enum AccountsError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of tracked accounts, consulted once per scheduler tick.
pub trait AccountSource: Send + Sync {
    fn load(&self) -> Result<Vec<Account>, AccountsError>;
}

/// One entry of `accounts.json`. Fields the engine does not use are ignored
/// and the ones it uses are optional per record.
#[derive(Debug, Deserialize)]
struct StoredAccount {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    http_port: Option<serde_json::Value>,
}

impl StoredAccount {
    /// `None` for records without a usable id.
    fn into_account(self) -> Option<Account> {
        let id = self.id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty());
        let Some(id) = id else {
            tracing::warn!(
                display_name = self.display_name.as_deref().unwrap_or_default(),
                "skipping account record without an id"
            );
            return None;
        };
        let raw_port = self.http_port.as_ref().and_then(serde_json::Value::as_i64).unwrap_or(0);
        let port = match u16::try_from(raw_port) {
            Ok(port) => port,
            Err(_) => {
                tracing::warn!(account = %id, http_port = raw_port, "ignoring out-of-range http_port");
                0
            }
        };
        Some(Account::new(id, self.display_name.unwrap_or_default()).pinned(port))
    }
}

/// `accounts.json` as written by the account manager. A missing file is an
/// empty store.
pub struct JsonAccountFile {
    path: PathBuf,
}

impl JsonAccountFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AccountSource for JsonAccountFile {
    fn load(&self) -> Result<Vec<Account>, AccountsError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(AccountsError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let stored: Vec<StoredAccount> =
            serde_json::from_str(&text).map_err(|source| AccountsError::Parse {
                path: self.path.clone(),
                source,
            })?;
        Ok(stored.into_iter().filter_map(StoredAccount::into_account).collect())
    }
}

/// In-memory store, replaced wholesale by [`StaticAccounts::set`].
#[derive(Default)]
pub struct StaticAccounts {
    accounts: Mutex<Vec<Account>>,
}

impl StaticAccounts {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self {
            accounts: Mutex::new(accounts),
        }
    }

    pub fn set(&self, accounts: Vec<Account>) {
        *self.accounts.lock().unwrap_or_else(PoisonError::into_inner) = accounts;
    }
}

impl AccountSource for StaticAccounts {
    fn load(&self) -> Result<Vec<Account>, AccountsError> {
        Ok(self
            .accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

// ─── Tests ────────────────────────────────────────────────────────

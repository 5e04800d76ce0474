//! Client-local persistence: the embedded record store and the session file.
//!
//! The store is multi-user capable even though a typical client holds a
//! single account: every key is namespaced by user id, and
//! `(user_id, client_side_id)` is the uniqueness boundary for records.

pub mod records;
pub mod session;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("local storage unavailable")]
    Backend(#[from] sled::Error),

    #[error("stored row is corrupt")]
    Corrupt(#[from] serde_json::Error),

    #[error("record not found")]
    NotFound,
}

/// The embedded client database. One tree per table; all mutations go
/// through a single write lock so version bumps stay monotonic under
/// concurrent callers.
#[derive(Debug)]
pub struct LocalStore {
    _db: sled::Db,
    records: sled::Tree,
    users: sled::Tree,
    write_lock: Mutex<()>,
}

/// Locally cached account row: what the client needs to rederive its keys
/// offline. Never contains the master password or any key derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalUser {
    pub user_id: i64,
    pub login: String,
    pub name: String,
    /// Base64-encoded per-account salt.
    pub encryption_salt: String,
    /// Base64-encoded wrapped-key envelope (KDF params + sealed DEK).
    pub encrypted_master_key: String,
}

impl LocalStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let records = db.open_tree("records")?;
        let users = db.open_tree("users")?;
        Ok(Self {
            _db: db,
            records,
            users,
            write_lock: Mutex::new(()),
        })
    }

    pub fn save_user(&self, user: &LocalUser) -> Result<(), StoreError> {
        let _guard = self.write_guard();
        let bytes = serde_json::to_vec(user)?;
        self.users.insert(user.user_id.to_be_bytes(), bytes)?;
        Ok(())
    }

    pub fn get_user(&self, user_id: i64) -> Result<LocalUser, StoreError> {
        match self.users.get(user_id.to_be_bytes())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Err(StoreError::NotFound),
        }
    }

    pub(crate) fn records_tree(&self) -> &sled::Tree {
        &self.records
    }

    pub(crate) fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Key of a record row: `<user_id>/<client_side_id>`.
pub(crate) fn record_key(user_id: i64, client_side_id: &str) -> Vec<u8> {
    format!("{user_id}/{client_side_id}").into_bytes()
}

/// Prefix under which all of one user's records live.
pub(crate) fn user_prefix(user_id: i64) -> Vec<u8> {
    format!("{user_id}/").into_bytes()
}

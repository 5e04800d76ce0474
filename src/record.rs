//! The stored vault record and its lightweight sync projection.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::payload::CipheredPayload;

/// A vault record as persisted on either side: sealed payload plus the
/// bookkeeping the sync engine needs. Identified by `(user_id,
/// client_side_id)`; `version` starts at 1 and only the server-acknowledged
/// path increments it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateRecord {
    pub user_id: i64,
    pub client_side_id: String,
    pub payload: CipheredPayload,
    pub version: i64,
    /// Hex SHA-256 of the canonical serialization of `payload`.
    pub hash: String,
    /// Soft-delete tombstone; tombstoned rows are kept so late-joining
    /// devices converge.
    pub deleted: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

impl PrivateRecord {
    pub fn state(&self) -> RecordState {
        RecordState {
            client_side_id: self.client_side_id.clone(),
            hash: self.hash.clone(),
            version: self.version,
            deleted: self.deleted,
            updated_at: self.updated_at,
        }
    }
}

/// Sync descriptor: everything the reconciler needs, no payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordState {
    pub client_side_id: String,
    pub hash: String,
    pub version: i64,
    pub deleted: bool,
    pub updated_at: u64,
}

pub fn now_unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

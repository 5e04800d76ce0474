//! Server-side persistence: `users`, `logins` (unique-login index), and
//! `ciphers` trees.
//!
//! Update and delete go through a compare-and-set that reads the current
//! version and conditionally writes in one atomic step (under the store's
//! write lock), returning both nullable outputs so the caller can tell
//! "record absent" from "version stale" without a second round trip.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::record::{PrivateRecord, RecordState, now_unix_seconds};
use crate::remote::UpdateItem;

#[derive(Debug, Error)]
pub enum ServerStoreError {
    #[error("server storage unavailable")]
    Backend(#[from] sled::Error),

    #[error("stored row is corrupt")]
    Corrupt(#[from] serde_json::Error),

    #[error("login is already taken")]
    LoginTaken,
}

/// Account row as persisted server-side. All key-material fields are opaque
/// base64 blobs; the master password never appears in any form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUser {
    pub user_id: i64,
    pub login: String,
    pub name: String,
    pub auth_hash: String,
    pub encryption_salt: String,
    pub encrypted_master_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_password_hint: Option<String>,
    pub created_at: u64,
}

/// Result of a compare-and-set: the pair of nullable outputs.
///
/// | `current_version` | `updated_id` | meaning          |
/// |-------------------|--------------|------------------|
/// | `None`            | `None`       | record absent    |
/// | `Some`            | `None`       | version stale    |
/// | `Some`            | `Some`       | write accepted   |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasOutcome {
    pub current_version: Option<i64>,
    pub updated_id: Option<String>,
}

#[derive(Debug)]
pub struct ServerStore {
    _db: sled::Db,
    users: sled::Tree,
    logins: sled::Tree,
    ciphers: sled::Tree,
    write_lock: Mutex<()>,
}

impl ServerStore {
    pub fn open(path: &Path) -> Result<Self, ServerStoreError> {
        let db = sled::open(path)?;
        let users = db.open_tree("users")?;
        let logins = db.open_tree("logins")?;
        let ciphers = db.open_tree("ciphers")?;
        Ok(Self {
            _db: db,
            users,
            logins,
            ciphers,
            write_lock: Mutex::new(()),
        })
    }

    fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn cipher_key(user_id: i64, client_side_id: &str) -> Vec<u8> {
        format!("{user_id}/{client_side_id}").into_bytes()
    }

    fn cipher_prefix(user_id: i64) -> Vec<u8> {
        format!("{user_id}/").into_bytes()
    }

    /// Insert a new account; `login` is unique.
    pub fn create_user(
        &self,
        login: &str,
        name: &str,
        auth_hash: &str,
        encryption_salt: &str,
        encrypted_master_key: &str,
        master_password_hint: Option<String>,
    ) -> Result<StoredUser, ServerStoreError> {
        let _guard = self.write_guard();

        if self.logins.get(login.as_bytes())?.is_some() {
            return Err(ServerStoreError::LoginTaken);
        }

        let user_id = self._db.generate_id()? as i64 + 1;
        let user = StoredUser {
            user_id,
            login: login.to_string(),
            name: name.to_string(),
            auth_hash: auth_hash.to_string(),
            encryption_salt: encryption_salt.to_string(),
            encrypted_master_key: encrypted_master_key.to_string(),
            master_password_hint,
            created_at: now_unix_seconds(),
        };

        self.users
            .insert(user_id.to_be_bytes(), serde_json::to_vec(&user)?)?;
        self.logins
            .insert(login.as_bytes(), user_id.to_be_bytes().to_vec())?;
        Ok(user)
    }

    pub fn find_by_login(&self, login: &str) -> Result<Option<StoredUser>, ServerStoreError> {
        let Some(id_bytes) = self.logins.get(login.as_bytes())? else {
            return Ok(None);
        };
        let id = i64::from_be_bytes(id_bytes.as_ref().try_into().unwrap_or_default());
        self.find_by_id(id)
    }

    pub fn find_by_id(&self, user_id: i64) -> Result<Option<StoredUser>, ServerStoreError> {
        match self.users.get(user_id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Ingest uploaded records. Re-uploads are idempotent: an incoming row
    /// never clobbers an equal-or-newer stored version.
    pub fn insert_records(
        &self,
        user_id: i64,
        items: &[PrivateRecord],
    ) -> Result<(), ServerStoreError> {
        let _guard = self.write_guard();
        for item in items {
            let key = Self::cipher_key(user_id, &item.client_side_id);
            if let Some(bytes) = self.ciphers.get(&key)? {
                let existing: PrivateRecord = serde_json::from_slice(&bytes)?;
                if existing.version >= item.version {
                    continue;
                }
            }
            self.ciphers.insert(key, serde_json::to_vec(item)?)?;
        }
        Ok(())
    }

    pub fn get_records(
        &self,
        user_id: i64,
        client_side_ids: &[String],
    ) -> Result<Vec<PrivateRecord>, ServerStoreError> {
        let mut out = Vec::with_capacity(client_side_ids.len());
        for id in client_side_ids {
            let key = Self::cipher_key(user_id, id);
            if let Some(bytes) = self.ciphers.get(key)? {
                out.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(out)
    }

    pub fn get_states(&self, user_id: i64) -> Result<Vec<RecordState>, ServerStoreError> {
        let mut out = Vec::new();
        for row in self.ciphers.scan_prefix(Self::cipher_prefix(user_id)) {
            let (_, bytes) = row?;
            let record: PrivateRecord = serde_json::from_slice(&bytes)?;
            out.push(record.state());
        }
        Ok(out)
    }

    /// Compare-and-set payload replacement. Accepted writes bump the version
    /// authoritatively.
    pub fn cas_update(
        &self,
        user_id: i64,
        item: &UpdateItem,
    ) -> Result<CasOutcome, ServerStoreError> {
        let _guard = self.write_guard();
        let key = Self::cipher_key(user_id, &item.client_side_id);

        let Some(bytes) = self.ciphers.get(&key)? else {
            return Ok(CasOutcome {
                current_version: None,
                updated_id: None,
            });
        };
        let mut record: PrivateRecord = serde_json::from_slice(&bytes)?;

        if record.version != item.expected_version {
            return Ok(CasOutcome {
                current_version: Some(record.version),
                updated_id: None,
            });
        }

        record.payload = item.payload.clone();
        record.hash = item.hash.clone();
        record.version += 1;
        record.updated_at = now_unix_seconds();
        self.ciphers.insert(key, serde_json::to_vec(&record)?)?;

        Ok(CasOutcome {
            current_version: Some(record.version),
            updated_id: Some(record.client_side_id),
        })
    }

    /// Compare-and-set tombstoning. Deleting an already-deleted record is a
    /// success and does not move the version.
    pub fn cas_delete(
        &self,
        user_id: i64,
        client_side_id: &str,
        expected_version: i64,
    ) -> Result<CasOutcome, ServerStoreError> {
        let _guard = self.write_guard();
        let key = Self::cipher_key(user_id, client_side_id);

        let Some(bytes) = self.ciphers.get(&key)? else {
            return Ok(CasOutcome {
                current_version: None,
                updated_id: None,
            });
        };
        let mut record: PrivateRecord = serde_json::from_slice(&bytes)?;

        if record.deleted {
            return Ok(CasOutcome {
                current_version: Some(record.version),
                updated_id: Some(record.client_side_id),
            });
        }

        if record.version != expected_version {
            return Ok(CasOutcome {
                current_version: Some(record.version),
                updated_id: None,
            });
        }

        record.deleted = true;
        record.version += 1;
        record.updated_at = now_unix_seconds();
        self.ciphers.insert(key, serde_json::to_vec(&record)?)?;

        Ok(CasOutcome {
            current_version: Some(record.version),
            updated_id: Some(record.client_side_id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::CipheredPayload;

    fn scratch_store() -> (tempfile::TempDir, ServerStore) {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = ServerStore::open(&dir.path().join("server.db")).expect("open store");
        (dir, store)
    }

    fn payload(tag: &str) -> CipheredPayload {
        CipheredPayload {
            kind: 1,
            metadata: format!("bWV0YS17{tag}"),
            data: format!("ZGF0YS17{tag}"),
            notes: None,
            additional_fields: None,
        }
    }

    fn record(user_id: i64, id: &str, version: i64) -> PrivateRecord {
        PrivateRecord {
            user_id,
            client_side_id: id.to_string(),
            payload: payload(id),
            version,
            hash: format!("h-{id}-{version}"),
            deleted: false,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
        }
    }

    fn update_item(id: &str, expected_version: i64) -> UpdateItem {
        UpdateItem {
            client_side_id: id.to_string(),
            payload: payload("updated"),
            hash: format!("h-{id}-updated"),
            expected_version,
            updated_at: 1_700_000_100,
        }
    }

    #[test]
    fn duplicate_login_is_rejected() {
        let (_dir, store) = scratch_store();
        store
            .create_user("alice", "Alice", "ah", "salt", "emk", None)
            .unwrap();
        let err = store
            .create_user("alice", "Other", "ah2", "salt2", "emk2", None)
            .unwrap_err();
        assert!(matches!(err, ServerStoreError::LoginTaken));
    }

    #[test]
    fn user_ids_are_distinct_and_lookup_works_both_ways() {
        let (_dir, store) = scratch_store();
        let a = store
            .create_user("alice", "Alice", "ah", "salt", "emk", None)
            .unwrap();
        let b = store
            .create_user("bob", "Bob", "bh", "bsalt", "bemk", Some("pet name".into()))
            .unwrap();

        assert_ne!(a.user_id, b.user_id);
        assert_eq!(store.find_by_login("bob").unwrap(), Some(b.clone()));
        assert_eq!(store.find_by_id(a.user_id).unwrap(), Some(a));
        assert_eq!(store.find_by_login("carol").unwrap(), None);
    }

    #[test]
    fn cas_update_distinguishes_absent_from_stale() {
        let (_dir, store) = scratch_store();
        store.insert_records(1, &[record(1, "r1", 3)]).unwrap();

        // Absent: both outputs null.
        let absent = store.cas_update(1, &update_item("missing", 1)).unwrap();
        assert_eq!(absent.current_version, None);
        assert_eq!(absent.updated_id, None);

        // Stale expectation: version reported, no write.
        let stale = store.cas_update(1, &update_item("r1", 2)).unwrap();
        assert_eq!(stale.current_version, Some(3));
        assert_eq!(stale.updated_id, None);
        assert_eq!(store.get_records(1, &["r1".into()]).unwrap()[0].version, 3);

        // Matching expectation: write accepted, version bumped.
        let ok = store.cas_update(1, &update_item("r1", 3)).unwrap();
        assert_eq!(ok.current_version, Some(4));
        assert_eq!(ok.updated_id.as_deref(), Some("r1"));

        let stored = &store.get_records(1, &["r1".into()]).unwrap()[0];
        assert_eq!(stored.version, 4);
        assert_eq!(stored.hash, "h-r1-updated");
    }

    #[test]
    fn cas_delete_tombstones_and_is_idempotent() {
        let (_dir, store) = scratch_store();
        store.insert_records(1, &[record(1, "r1", 1)]).unwrap();

        let ok = store.cas_delete(1, "r1", 1).unwrap();
        assert_eq!(ok.current_version, Some(2));
        assert_eq!(ok.updated_id.as_deref(), Some("r1"));

        let stored = &store.get_records(1, &["r1".into()]).unwrap()[0];
        assert!(stored.deleted);
        assert_eq!(stored.version, 2);

        // A second delete succeeds without moving the version.
        let again = store.cas_delete(1, "r1", 9).unwrap();
        assert_eq!(again.current_version, Some(2));
        assert_eq!(again.updated_id.as_deref(), Some("r1"));
    }

    #[test]
    fn cas_delete_reports_stale_versions() {
        let (_dir, store) = scratch_store();
        store.insert_records(1, &[record(1, "r1", 5)]).unwrap();

        let stale = store.cas_delete(1, "r1", 4).unwrap();
        assert_eq!(stale.current_version, Some(5));
        assert_eq!(stale.updated_id, None);
        assert!(!store.get_records(1, &["r1".into()]).unwrap()[0].deleted);
    }

    #[test]
    fn reupload_never_rolls_back_a_newer_row() {
        let (_dir, store) = scratch_store();
        store.insert_records(1, &[record(1, "r1", 3)]).unwrap();
        store.insert_records(1, &[record(1, "r1", 1)]).unwrap();

        assert_eq!(store.get_records(1, &["r1".into()]).unwrap()[0].version, 3);
    }

    #[test]
    fn states_are_scoped_per_user() {
        let (_dir, store) = scratch_store();
        store.insert_records(1, &[record(1, "r1", 1)]).unwrap();
        store.insert_records(2, &[record(2, "r2", 1)]).unwrap();

        let states = store.get_states(1).unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].client_side_id, "r1");
    }
}

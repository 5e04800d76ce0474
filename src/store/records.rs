//! Record table operations.

use crate::record::{PrivateRecord, RecordState, now_unix_seconds};
use crate::store::{LocalStore, StoreError, record_key, user_prefix};

impl LocalStore {
    /// Upsert by `(user_id, client_side_id)`.
    ///
    /// This is the ingest path for rows fetched from the server; it never
    /// conflicts with a concurrent local create because last write wins
    /// under the store's write lock.
    pub fn save(&self, records: &[PrivateRecord]) -> Result<(), StoreError> {
        let _guard = self.write_guard();
        for record in records {
            let key = record_key(record.user_id, &record.client_side_id);
            let bytes = serde_json::to_vec(record)?;
            self.records_tree().insert(key, bytes)?;
        }
        Ok(())
    }

    pub fn get(&self, user_id: i64, client_side_id: &str) -> Result<PrivateRecord, StoreError> {
        let key = record_key(user_id, client_side_id);
        match self.records_tree().get(key)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Err(StoreError::NotFound),
        }
    }

    /// All of one user's records, tombstones included.
    pub fn get_all(&self, user_id: i64) -> Result<Vec<PrivateRecord>, StoreError> {
        let mut out = Vec::new();
        for row in self.records_tree().scan_prefix(user_prefix(user_id)) {
            let (_, bytes) = row?;
            out.push(serde_json::from_slice(&bytes)?);
        }
        Ok(out)
    }

    /// Projection over `(client_side_id, hash, version, deleted, updated_at)`.
    pub fn get_all_states(&self, user_id: i64) -> Result<Vec<RecordState>, StoreError> {
        let records = self.get_all(user_id)?;
        Ok(records.iter().map(PrivateRecord::state).collect())
    }

    /// Overwrite by `(user_id, client_side_id)`. The caller supplies the new
    /// `version`, `hash`, and `updated_at`.
    pub fn update(&self, record: &PrivateRecord) -> Result<(), StoreError> {
        let _guard = self.write_guard();
        let key = record_key(record.user_id, &record.client_side_id);
        if self.records_tree().get(&key)?.is_none() {
            return Err(StoreError::NotFound);
        }
        let bytes = serde_json::to_vec(record)?;
        self.records_tree().insert(key, bytes)?;
        Ok(())
    }

    /// Set the tombstone flag and bump `updated_at`.
    pub fn soft_delete(&self, user_id: i64, client_side_id: &str) -> Result<(), StoreError> {
        let _guard = self.write_guard();
        let key = record_key(user_id, client_side_id);
        let bytes = self.records_tree().get(&key)?.ok_or(StoreError::NotFound)?;
        let mut record: PrivateRecord = serde_json::from_slice(&bytes)?;
        record.deleted = true;
        record.updated_at = now_unix_seconds();
        self.records_tree().insert(key, serde_json::to_vec(&record)?)?;
        Ok(())
    }

    /// Atomic `version <- version + 1`, applied after a server write is
    /// acknowledged so local and server converge.
    pub fn increment_version(&self, user_id: i64, client_side_id: &str) -> Result<(), StoreError> {
        let _guard = self.write_guard();
        let key = record_key(user_id, client_side_id);
        let bytes = self.records_tree().get(&key)?.ok_or(StoreError::NotFound)?;
        let mut record: PrivateRecord = serde_json::from_slice(&bytes)?;
        record.version += 1;
        self.records_tree().insert(key, serde_json::to_vec(&record)?)?;
        Ok(())
    }

    /// Hard-remove a row. Only for tombstones that never reached the server.
    pub fn purge(&self, user_id: i64, client_side_id: &str) -> Result<(), StoreError> {
        let _guard = self.write_guard();
        let key = record_key(user_id, client_side_id);
        self.records_tree().remove(key)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::CipheredPayload;

    fn scratch_store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = LocalStore::open(&dir.path().join("client.db")).expect("open store");
        (dir, store)
    }

    fn sample_record(user_id: i64, client_side_id: &str, version: i64) -> PrivateRecord {
        PrivateRecord {
            user_id,
            client_side_id: client_side_id.to_string(),
            payload: CipheredPayload {
                kind: 1,
                metadata: "bWV0YQ==".to_string(),
                data: "ZGF0YQ==".to_string(),
                notes: None,
                additional_fields: None,
            },
            version,
            hash: format!("hash-{client_side_id}-{version}"),
            deleted: false,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
        }
    }

    #[test]
    fn save_is_an_upsert() {
        let (_dir, store) = scratch_store();
        let a = sample_record(1, "r1", 1);
        store.save(std::slice::from_ref(&a)).unwrap();

        let mut newer = a.clone();
        newer.version = 3;
        newer.hash = "hash-r1-3".to_string();
        store.save(std::slice::from_ref(&newer)).unwrap();

        let read = store.get(1, "r1").unwrap();
        assert_eq!(read.version, 3);
        assert_eq!(read.hash, "hash-r1-3");
    }

    #[test]
    fn records_are_scoped_per_user() {
        let (_dir, store) = scratch_store();
        store
            .save(&[sample_record(1, "r1", 1), sample_record(2, "r1", 1)])
            .unwrap();

        assert_eq!(store.get_all(1).unwrap().len(), 1);
        assert_eq!(store.get_all(2).unwrap().len(), 1);
        assert!(store.get_all(3).unwrap().is_empty());
    }

    #[test]
    fn get_missing_record_is_not_found() {
        let (_dir, store) = scratch_store();
        assert!(matches!(store.get(1, "nope"), Err(StoreError::NotFound)));
    }

    #[test]
    fn states_projection_includes_tombstones() {
        let (_dir, store) = scratch_store();
        store
            .save(&[sample_record(1, "alive", 1), sample_record(1, "gone", 2)])
            .unwrap();
        store.soft_delete(1, "gone").unwrap();

        let states = store.get_all_states(1).unwrap();
        assert_eq!(states.len(), 2);

        let gone = states
            .iter()
            .find(|s| s.client_side_id == "gone")
            .expect("tombstone present");
        assert!(gone.deleted);
        assert_eq!(gone.version, 2);
    }

    #[test]
    fn soft_delete_bumps_updated_at_but_not_version() {
        let (_dir, store) = scratch_store();
        store.save(&[sample_record(1, "r1", 4)]).unwrap();
        store.soft_delete(1, "r1").unwrap();

        let read = store.get(1, "r1").unwrap();
        assert!(read.deleted);
        assert_eq!(read.version, 4);
        assert!(read.updated_at > 1_700_000_000);
    }

    #[test]
    fn increment_version_is_monotonic() {
        let (_dir, store) = scratch_store();
        store.save(&[sample_record(1, "r1", 1)]).unwrap();

        store.increment_version(1, "r1").unwrap();
        store.increment_version(1, "r1").unwrap();

        assert_eq!(store.get(1, "r1").unwrap().version, 3);
    }

    #[test]
    fn increment_version_on_missing_record_is_not_found() {
        let (_dir, store) = scratch_store();
        assert!(matches!(
            store.increment_version(1, "nope"),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn purge_removes_the_row() {
        let (_dir, store) = scratch_store();
        store.save(&[sample_record(1, "r1", 1)]).unwrap();
        store.purge(1, "r1").unwrap();
        assert!(matches!(store.get(1, "r1"), Err(StoreError::NotFound)));
    }

    #[test]
    fn user_rows_roundtrip() {
        let (_dir, store) = scratch_store();
        let user = crate::store::LocalUser {
            user_id: 7,
            login: "alice".to_string(),
            name: "Alice".to_string(),
            encryption_salt: "c2FsdHNhbHRzYWx0c2E=".to_string(),
            encrypted_master_key: "UEtXMQ==".to_string(),
        };
        store.save_user(&user).unwrap();
        assert_eq!(store.get_user(7).unwrap(), user);
        assert!(matches!(store.get_user(8), Err(StoreError::NotFound)));
    }
}

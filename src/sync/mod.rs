//! Two-way reconciliation between the local store and the server.
//!
//! A pass reads both state lists once, classifies every record, then runs
//! five phases in a fixed order: server deletes, server updates, batch
//! upload, batch download, local tombstones. Every action is individually
//! idempotent, so a crash or cancellation between actions is safe — the
//! next pass re-reads state and the remaining work reappears.

pub mod plan;
pub mod worker;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::Session;
use crate::payload::{self, CodecError};
use crate::record::{PrivateRecord, RecordState};
use crate::remote::{DeleteEntry, DeleteRequest, DownloadRequest, RemoteError, ServerAdapter, UpdateItem};
use crate::store::{LocalStore, StoreError};
use crate::vault::service::{update_request, upload_request};

pub use plan::{SyncAction, SyncPlan, build_plan, classify};
pub use worker::SyncWorker;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Cooperative cancellation, observed between actions — never inside one.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// What one pass did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub pushed_deletes: usize,
    pub pushed_updates: usize,
    pub uploaded: usize,
    pub downloaded: usize,
    pub tombstoned_locally: usize,
    pub purged_locally: usize,
    pub conflicts_downgraded: usize,
    pub unchanged: usize,
    pub cancelled: bool,
}

pub struct SyncEngine<'a> {
    store: &'a LocalStore,
    remote: &'a dyn ServerAdapter,
}

impl<'a> SyncEngine<'a> {
    pub fn new(store: &'a LocalStore, remote: &'a dyn ServerAdapter) -> Self {
        Self { store, remote }
    }

    /// One full reconciliation pass for the session's user.
    ///
    /// Server mutations always complete before the corresponding local
    /// version converges; transport failures abort the pass and leave
    /// everything for the next tick.
    pub fn full_sync(
        &self,
        session: &Session,
        cancel: &CancelFlag,
    ) -> Result<SyncOutcome, SyncError> {
        let user_id = session.user_id;
        let local_states = self.store.get_all_states(user_id)?;
        let server_states = self
            .remote
            .get_server_states(&session.token, user_id)?;

        let server_by_id: BTreeMap<String, RecordState> = server_states
            .iter()
            .map(|state| (state.client_side_id.clone(), state.clone()))
            .collect();

        let plan = build_plan(&local_states, &server_states);
        let mut outcome = SyncOutcome {
            unchanged: plan.unchanged,
            ..SyncOutcome::default()
        };
        if plan.is_empty() {
            debug!(user_id, "nothing to reconcile");
            return Ok(outcome);
        }
        info!(
            user_id,
            deletes = plan.delete_server.len(),
            updates = plan.update_server.len(),
            uploads = plan.upload.len(),
            downloads = plan.download_create.len() + plan.download_overwrite.len(),
            "starting sync pass"
        );

        // Phase 1: propagate local tombstones. Idempotent on the server.
        for client_side_id in &plan.delete_server {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                return Ok(outcome);
            }
            self.push_delete(session, client_side_id, &server_by_id, &mut outcome)?;
        }

        // Phase 2: push staged writes; conflicts downgrade to downloads.
        let mut download_ids = Vec::new();
        for client_side_id in &plan.update_server {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                return Ok(outcome);
            }
            self.push_update(
                session,
                client_side_id,
                &server_by_id,
                &mut download_ids,
                &mut outcome,
            )?;
        }

        // Phase 3: batch-upload records the server has never seen.
        if !plan.upload.is_empty() {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                return Ok(outcome);
            }
            let mut items = Vec::with_capacity(plan.upload.len());
            for client_side_id in &plan.upload {
                match self.store.get(user_id, client_side_id) {
                    Ok(record) => items.push(record),
                    Err(StoreError::NotFound) => continue,
                    Err(err) => return Err(err.into()),
                }
            }
            outcome.uploaded = items.len();
            let request = upload_request(user_id, items)?;
            self.remote.upload(&session.token, &request)?;
        }

        // Phase 4: batch-download creates, overwrites, and downgraded ids.
        download_ids.extend(plan.download_create.iter().cloned());
        download_ids.extend(plan.download_overwrite.iter().cloned());
        if !download_ids.is_empty() {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                return Ok(outcome);
            }
            outcome.downloaded = self.pull_records(session, download_ids)?;
        }

        // Phase 5: mirror server tombstones after downloads, so a record
        // resurrected mid-pass was already overwritten by the download path.
        for client_side_id in &plan.delete_local {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                return Ok(outcome);
            }
            if let Some(server_state) = server_by_id.get(client_side_id) {
                self.mirror_tombstone(user_id, client_side_id, server_state)?;
                outcome.tombstoned_locally += 1;
            }
        }

        for client_side_id in &plan.purge_local {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                return Ok(outcome);
            }
            self.store.purge(user_id, client_side_id)?;
            outcome.purged_locally += 1;
        }

        info!(user_id, ?outcome, "sync pass complete");
        Ok(outcome)
    }

    fn push_delete(
        &self,
        session: &Session,
        client_side_id: &str,
        server_by_id: &BTreeMap<String, RecordState>,
        outcome: &mut SyncOutcome,
    ) -> Result<(), SyncError> {
        let Some(server_state) = server_by_id.get(client_side_id) else {
            return Ok(());
        };

        let request = DeleteRequest {
            user_id: session.user_id,
            entries: vec![DeleteEntry {
                client_side_id: client_side_id.to_string(),
                expected_version: server_state.version,
            }],
            length: 1,
        };
        match self.remote.delete(&session.token, &request) {
            Ok(()) => {
                self.store
                    .increment_version(session.user_id, client_side_id)?;
                outcome.pushed_deletes += 1;
                Ok(())
            }
            Err(RemoteError::VersionConflict) => {
                // The server moved mid-pass; the next pass reclassifies.
                warn!(client_side_id, "delete raced a newer server version");
                Ok(())
            }
            Err(RemoteError::NotFound) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn push_update(
        &self,
        session: &Session,
        client_side_id: &str,
        server_by_id: &BTreeMap<String, RecordState>,
        download_ids: &mut Vec<String>,
        outcome: &mut SyncOutcome,
    ) -> Result<(), SyncError> {
        let record = match self.store.get(session.user_id, client_side_id) {
            Ok(record) => record,
            Err(StoreError::NotFound) => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let Some(server_state) = server_by_id.get(client_side_id) else {
            return Ok(());
        };

        let item = UpdateItem {
            client_side_id: client_side_id.to_string(),
            payload: record.payload.clone(),
            hash: record.hash.clone(),
            expected_version: server_state.version,
            updated_at: record.updated_at,
        };
        let request = update_request(session.user_id, vec![item])?;

        match self.remote.update(&session.token, &request) {
            Ok(()) => {
                // Converge to the version the server just assigned.
                let accepted = PrivateRecord {
                    version: server_state.version + 1,
                    ..record
                };
                self.store.update(&accepted)?;
                outcome.pushed_updates += 1;
                Ok(())
            }
            Err(RemoteError::VersionConflict) => {
                debug!(client_side_id, "update conflict; downgrading to download");
                download_ids.push(client_side_id.to_string());
                outcome.conflicts_downgraded += 1;
                Ok(())
            }
            Err(RemoteError::NotFound) => {
                warn!(client_side_id, "server lost a record we tried to update");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Fetch a batch and ingest every row whose integrity hash checks out.
    fn pull_records(
        &self,
        session: &Session,
        client_side_ids: Vec<String>,
    ) -> Result<usize, SyncError> {
        let length = client_side_ids.len();
        let request = DownloadRequest {
            user_id: session.user_id,
            client_side_ids,
            length,
        };
        let records = self.remote.download(&session.token, &request)?;

        let mut accepted = Vec::with_capacity(records.len());
        for record in records {
            if record.user_id != session.user_id {
                warn!(
                    client_side_id = %record.client_side_id,
                    "dropping download scoped to another user"
                );
                continue;
            }
            match payload::compute_hash(&record.payload) {
                Ok(computed) if computed == record.hash => accepted.push(record),
                _ => warn!(
                    client_side_id = %record.client_side_id,
                    "dropping download with a bad integrity hash"
                ),
            }
        }

        let count = accepted.len();
        self.store.save(&accepted)?;
        Ok(count)
    }

    /// Mark the local row deleted with the server's exact bookkeeping so the
    /// next pass sees two identical tombstones.
    fn mirror_tombstone(
        &self,
        user_id: i64,
        client_side_id: &str,
        server_state: &RecordState,
    ) -> Result<(), SyncError> {
        let record = match self.store.get(user_id, client_side_id) {
            Ok(record) => record,
            Err(StoreError::NotFound) => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let tombstone = PrivateRecord {
            deleted: true,
            version: server_state.version,
            hash: server_state.hash.clone(),
            updated_at: server_state.updated_at,
            ..record
        };
        self.store.save(std::slice::from_ref(&tombstone))?;
        Ok(())
    }
}

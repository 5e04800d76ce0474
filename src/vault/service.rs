//! Create/read/update/delete with local-then-remote staging.
//!
//! The ordering rule every operation obeys: the local mutation is durable
//! before the network call is attempted, and the local version is bumped
//! only after the server acknowledges. A crash in between leaves the client
//! with a staged write the next sync pushes.

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::Session;
use crate::payload::{
    self, CipheredPayload, CodecError, DecipheredPayload, ItemKind,
};
use crate::record::{PrivateRecord, now_unix_seconds};
use crate::remote::{
    DeleteEntry, DeleteRequest, RemoteError, ServerAdapter, UpdateItem, UpdateRequest,
    UploadRequest,
};
use crate::store::{LocalStore, StoreError};

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("record not found")]
    NotFound,

    #[error("version conflict")]
    Conflict,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Remote(RemoteError),
}

impl From<StoreError> for VaultError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => VaultError::NotFound,
            other => VaultError::Store(other),
        }
    }
}

impl From<RemoteError> for VaultError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::VersionConflict => VaultError::Conflict,
            RemoteError::NotFound => VaultError::NotFound,
            other => VaultError::Remote(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOutcome {
    pub client_side_id: String,
    /// False when the server was unreachable; the record is staged locally
    /// and the next sync uploads it.
    pub uploaded: bool,
}

/// One line of `list` output: the decrypted header of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSummary {
    pub client_side_id: String,
    pub kind: ItemKind,
    pub name: String,
    pub folder: Option<String>,
    pub version: i64,
    pub updated_at: u64,
}

pub struct VaultService<'a> {
    store: &'a LocalStore,
    remote: &'a dyn ServerAdapter,
}

impl<'a> VaultService<'a> {
    pub fn new(store: &'a LocalStore, remote: &'a dyn ServerAdapter) -> Self {
        Self { store, remote }
    }

    /// Seal, persist locally at version 1, then try the upload. Server
    /// unavailability is not an error here; sync reconciles later.
    pub fn create(
        &self,
        session: &Session,
        plain: &DecipheredPayload,
    ) -> Result<CreateOutcome, VaultError> {
        let ciphered = payload::encrypt_payload(plain, session.dek())?;
        let hash = payload::compute_hash(&ciphered)?;
        let client_side_id = Uuid::new_v4().to_string();
        let now = now_unix_seconds();

        let record = PrivateRecord {
            user_id: session.user_id,
            client_side_id: client_side_id.clone(),
            payload: ciphered,
            version: 1,
            hash,
            deleted: false,
            created_at: now,
            updated_at: now,
        };
        self.store.save(std::slice::from_ref(&record))?;

        let request = upload_request(session.user_id, vec![record])?;
        match self.remote.upload(&session.token, &request) {
            Ok(()) => Ok(CreateOutcome {
                client_side_id,
                uploaded: true,
            }),
            Err(err) if err.is_unavailable() => {
                warn!(%err, "upload deferred; record staged for next sync");
                Ok(CreateOutcome {
                    client_side_id,
                    uploaded: false,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    pub fn read(
        &self,
        session: &Session,
        client_side_id: &str,
    ) -> Result<DecipheredPayload, VaultError> {
        let record = self.store.get(session.user_id, client_side_id)?;
        if record.deleted {
            return Err(VaultError::NotFound);
        }
        Ok(payload::decrypt_payload(&record.payload, session.dek())?)
    }

    /// Decrypted headers of all live records, sorted by folder then name.
    pub fn list(&self, session: &Session) -> Result<Vec<RecordSummary>, VaultError> {
        let mut out = Vec::new();
        for record in self.store.get_all(session.user_id)? {
            if record.deleted {
                continue;
            }
            let plain = payload::decrypt_payload(&record.payload, session.dek())?;
            out.push(RecordSummary {
                client_side_id: record.client_side_id,
                kind: plain.data.kind(),
                name: plain.metadata.name,
                folder: plain.metadata.folder,
                version: record.version,
                updated_at: record.updated_at,
            });
        }
        out.sort_by(|a, b| {
            let af = a.folder.as_deref().unwrap_or("");
            let bf = b.folder.as_deref().unwrap_or("");
            af.cmp(bf).then_with(|| a.name.cmp(&b.name))
        });
        Ok(out)
    }

    /// Stage the new payload locally at the current version, then ask the
    /// server to accept it against that expectation.
    pub fn update(
        &self,
        session: &Session,
        client_side_id: &str,
        plain: &DecipheredPayload,
    ) -> Result<(), VaultError> {
        let record = self.store.get(session.user_id, client_side_id)?;
        if record.deleted {
            return Err(VaultError::NotFound);
        }

        let ciphered = payload::encrypt_payload(plain, session.dek())?;
        let hash = payload::compute_hash(&ciphered)?;
        let now = now_unix_seconds();

        let staged = PrivateRecord {
            payload: ciphered.clone(),
            hash: hash.clone(),
            updated_at: now,
            ..record.clone()
        };
        self.store.update(&staged)?;

        let item = UpdateItem {
            client_side_id: client_side_id.to_string(),
            payload: ciphered,
            hash,
            expected_version: record.version,
            updated_at: now,
        };
        let request = update_request(session.user_id, vec![item])?;
        self.remote.update(&session.token, &request)?;

        // The server accepted and bumped; converge the local copy.
        self.store
            .increment_version(session.user_id, client_side_id)?;
        debug!(client_side_id, "update acknowledged");
        Ok(())
    }

    /// Tombstone locally, then propagate. A record the server never saw is
    /// purged by the next sync instead.
    pub fn delete(&self, session: &Session, client_side_id: &str) -> Result<(), VaultError> {
        let record = self.store.get(session.user_id, client_side_id)?;
        if record.deleted {
            return Ok(());
        }

        self.store.soft_delete(session.user_id, client_side_id)?;

        let request = DeleteRequest {
            user_id: session.user_id,
            entries: vec![DeleteEntry {
                client_side_id: client_side_id.to_string(),
                expected_version: record.version,
            }],
            length: 1,
        };
        match self.remote.delete(&session.token, &request) {
            Ok(()) => {
                self.store
                    .increment_version(session.user_id, client_side_id)?;
                debug!(client_side_id, "delete acknowledged");
                Ok(())
            }
            // Never uploaded: the local tombstone is all there is to do.
            Err(RemoteError::NotFound) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

pub(crate) fn upload_request(
    user_id: i64,
    items: Vec<PrivateRecord>,
) -> Result<UploadRequest, CodecError> {
    let payloads: Vec<&CipheredPayload> = items.iter().map(|item| &item.payload).collect();
    let hash = payload::compute_list_hash(&payloads)?;
    let length = items.len();
    Ok(UploadRequest {
        user_id,
        items,
        hash,
        length,
    })
}

pub(crate) fn update_request(
    user_id: i64,
    updates: Vec<UpdateItem>,
) -> Result<UpdateRequest, CodecError> {
    let payloads: Vec<&CipheredPayload> = updates.iter().map(|item| &item.payload).collect();
    let hash = payload::compute_list_hash(&payloads)?;
    let length = updates.len();
    Ok(UpdateRequest {
        user_id,
        updates,
        hash,
        length,
    })
}

//! The server's request-level logic, transport-agnostic.
//!
//! Both the HTTP surface and the embedded adapter call into [`Backend`];
//! neither adds semantics of its own beyond status-code mapping.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use thiserror::Error;
use tracing::{debug, info};

use crate::payload::{self, CLIENT_SIDE_ID_MAX_LEN, CipheredPayload};
use crate::record::PrivateRecord;
use crate::remote::{
    DeleteRequest, DownloadRequest, LOGIN_MAX_LEN, LoginRequest, RegisterRequest, SaltParams,
    StatesResponse, UpdateRequest, UploadRequest, UserSummary,
};
use crate::server::store::{CasOutcome, ServerStore, ServerStoreError, StoredUser};
use crate::server::token::{TokenError, TokenSigner};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("invalid credentials")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("record not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("internal error")]
    Internal,
}

impl From<ServerStoreError> for ServiceError {
    fn from(err: ServerStoreError) -> Self {
        match err {
            ServerStoreError::LoginTaken => ServiceError::Conflict,
            ServerStoreError::Backend(_) | ServerStoreError::Corrupt(_) => ServiceError::Internal,
        }
    }
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Rejected => ServiceError::Unauthorized,
            TokenError::Issue(_) => ServiceError::Internal,
        }
    }
}

pub struct Backend {
    store: ServerStore,
    tokens: TokenSigner,
}

impl Backend {
    pub fn new(store: ServerStore, tokens: TokenSigner) -> Self {
        Self { store, tokens }
    }

    pub fn register(
        &self,
        request: &RegisterRequest,
    ) -> Result<(UserSummary, String), ServiceError> {
        validate_login(&request.login)?;
        validate_b64_field("auth_hash", &request.auth_hash)?;
        validate_b64_field("encryption_salt", &request.encryption_salt)?;
        validate_b64_field("encrypted_master_key", &request.encrypted_master_key)?;

        let user = self.store.create_user(
            &request.login,
            &request.name,
            &request.auth_hash,
            &request.encryption_salt,
            &request.encrypted_master_key,
            request.master_password_hint.clone(),
        )?;
        let token = self.tokens.issue(user.user_id)?;

        info!(user_id = user.user_id, "registered account");
        Ok((summarize(&user), token))
    }

    pub fn request_salt(&self, login: &str) -> Result<SaltParams, ServiceError> {
        let user = self
            .store
            .find_by_login(login)?
            .ok_or(ServiceError::NotFound)?;
        Ok(SaltParams {
            login: user.login,
            encryption_salt: user.encryption_salt,
        })
    }

    pub fn login(&self, request: &LoginRequest) -> Result<(UserSummary, String), ServiceError> {
        let user = self
            .store
            .find_by_login(&request.login)?
            .ok_or(ServiceError::Unauthorized)?;

        if user.auth_hash != request.auth_hash {
            return Err(ServiceError::Unauthorized);
        }

        let token = self.tokens.issue(user.user_id)?;
        info!(user_id = user.user_id, "login accepted");
        Ok((summarize(&user), token))
    }

    /// Resolve a bearer token to the user it identifies.
    pub fn authorize(&self, token: &str) -> Result<i64, ServiceError> {
        Ok(self.tokens.verify(token)?)
    }

    pub fn upload(&self, user_id: i64, request: &UploadRequest) -> Result<(), ServiceError> {
        check_scope(user_id, request.user_id)?;
        check_batch_shape(request.items.len(), request.length)?;
        verify_list_hash(
            request.items.iter().map(|item| &item.payload),
            &request.hash,
        )?;

        for item in &request.items {
            check_scope(user_id, item.user_id)?;
            validate_client_side_id(&item.client_side_id)?;
            verify_record_hash(&item.payload, &item.hash)?;
            if item.version < 1 {
                return Err(ServiceError::Validation("version must be >= 1".into()));
            }
        }

        self.store.insert_records(user_id, &request.items)?;
        debug!(user_id, count = request.items.len(), "upload accepted");
        Ok(())
    }

    pub fn download(
        &self,
        user_id: i64,
        request: &DownloadRequest,
    ) -> Result<Vec<PrivateRecord>, ServiceError> {
        check_scope(user_id, request.user_id)?;
        check_batch_shape(request.client_side_ids.len(), request.length)?;
        Ok(self.store.get_records(user_id, &request.client_side_ids)?)
    }

    pub fn update(&self, user_id: i64, request: &UpdateRequest) -> Result<(), ServiceError> {
        check_scope(user_id, request.user_id)?;
        check_batch_shape(request.updates.len(), request.length)?;
        verify_list_hash(
            request.updates.iter().map(|item| &item.payload),
            &request.hash,
        )?;

        for item in &request.updates {
            verify_record_hash(&item.payload, &item.hash)?;
            let outcome = self.store.cas_update(user_id, item)?;
            resolve_cas(outcome)?;
        }
        debug!(user_id, count = request.updates.len(), "update accepted");
        Ok(())
    }

    pub fn delete(&self, user_id: i64, request: &DeleteRequest) -> Result<(), ServiceError> {
        check_scope(user_id, request.user_id)?;
        check_batch_shape(request.entries.len(), request.length)?;

        for entry in &request.entries {
            let outcome =
                self.store
                    .cas_delete(user_id, &entry.client_side_id, entry.expected_version)?;
            resolve_cas(outcome)?;
        }
        debug!(user_id, count = request.entries.len(), "delete accepted");
        Ok(())
    }

    pub fn states(&self, user_id: i64) -> Result<StatesResponse, ServiceError> {
        let states = self.store.get_states(user_id)?;
        let length = states.len();
        Ok(StatesResponse {
            private_data_states: states,
            length,
        })
    }
}

fn summarize(user: &StoredUser) -> UserSummary {
    UserSummary {
        user_id: user.user_id,
        login: user.login.clone(),
        name: user.name.clone(),
        encryption_salt: user.encryption_salt.clone(),
        encrypted_master_key: user.encrypted_master_key.clone(),
        master_password_hint: user.master_password_hint.clone(),
    }
}

fn validate_login(login: &str) -> Result<(), ServiceError> {
    if login.is_empty() || login.len() > LOGIN_MAX_LEN {
        return Err(ServiceError::Validation(format!(
            "login must be 1..={LOGIN_MAX_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_b64_field(field: &str, value: &str) -> Result<(), ServiceError> {
    if value.is_empty() {
        return Err(ServiceError::Validation(format!("{field} must not be empty")));
    }
    B64.decode(value)
        .map_err(|_| ServiceError::Validation(format!("{field} is not valid base64")))?;
    Ok(())
}

fn validate_client_side_id(client_side_id: &str) -> Result<(), ServiceError> {
    if client_side_id.is_empty() || client_side_id.len() > CLIENT_SIDE_ID_MAX_LEN {
        return Err(ServiceError::Validation(format!(
            "client_side_id must be 1..={CLIENT_SIDE_ID_MAX_LEN} characters"
        )));
    }
    Ok(())
}

fn check_scope(authorized: i64, requested: i64) -> Result<(), ServiceError> {
    if authorized != requested {
        return Err(ServiceError::Forbidden);
    }
    Ok(())
}

fn check_batch_shape(actual: usize, declared: usize) -> Result<(), ServiceError> {
    if actual != declared {
        return Err(ServiceError::Validation(format!(
            "length field says {declared}, batch carries {actual}"
        )));
    }
    Ok(())
}

fn verify_list_hash<'a>(
    payloads: impl Iterator<Item = &'a CipheredPayload>,
    declared: &str,
) -> Result<(), ServiceError> {
    let payloads: Vec<&CipheredPayload> = payloads.collect();
    let computed =
        payload::compute_list_hash(&payloads).map_err(|_| ServiceError::Internal)?;
    if computed != declared {
        return Err(ServiceError::Validation(
            "batch integrity hash mismatch".into(),
        ));
    }
    Ok(())
}

fn verify_record_hash(payload: &CipheredPayload, declared: &str) -> Result<(), ServiceError> {
    let computed = payload::compute_hash(payload).map_err(|_| ServiceError::Internal)?;
    if computed != declared {
        return Err(ServiceError::Validation(
            "record integrity hash mismatch".into(),
        ));
    }
    Ok(())
}

fn resolve_cas(outcome: CasOutcome) -> Result<(), ServiceError> {
    match (outcome.current_version, outcome.updated_id) {
        (None, None) => Err(ServiceError::NotFound),
        (Some(_), None) => Err(ServiceError::Conflict),
        (Some(_), Some(_)) => Ok(()),
        // The store never reports a write without a current version.
        (None, Some(_)) => Err(ServiceError::Internal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keychain::SecretBytes;
    use crate::payload::{DecipheredPayload, ItemData, Metadata, encrypt_payload};
    use crate::record::now_unix_seconds;
    use crate::remote::UpdateItem;

    fn backend() -> (tempfile::TempDir, Backend) {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = ServerStore::open(&dir.path().join("server.db")).expect("open store");
        let backend = Backend::new(store, TokenSigner::new("test-secret", 3600));
        (dir, backend)
    }

    fn register_request(login: &str) -> RegisterRequest {
        RegisterRequest {
            login: login.to_string(),
            name: "Tester".to_string(),
            auth_hash: B64.encode([1u8; 32]),
            encryption_salt: B64.encode([2u8; 16]),
            encrypted_master_key: B64.encode([3u8; 60]),
            master_password_hint: None,
        }
    }

    fn sealed_payload(tag: &str) -> CipheredPayload {
        let dek = SecretBytes::from(vec![9u8; 32]);
        encrypt_payload(
            &DecipheredPayload {
                metadata: Metadata {
                    name: tag.to_string(),
                    folder: None,
                },
                data: ItemData::Text {
                    text: format!("body of {tag}"),
                },
                notes: None,
                additional_fields: None,
            },
            &dek,
        )
        .expect("seal payload")
    }

    fn upload_request(user_id: i64, id: &str) -> UploadRequest {
        let payload = sealed_payload(id);
        let hash = payload::compute_hash(&payload).unwrap();
        let record = PrivateRecord {
            user_id,
            client_side_id: id.to_string(),
            payload,
            version: 1,
            hash,
            deleted: false,
            created_at: now_unix_seconds(),
            updated_at: now_unix_seconds(),
        };
        let list_hash = payload::compute_list_hash(&[record.payload.clone()]).unwrap();
        UploadRequest {
            user_id,
            items: vec![record],
            hash: list_hash,
            length: 1,
        }
    }

    #[test]
    fn register_login_and_authorize() {
        let (_dir, backend) = backend();
        let (user, token) = backend.register(&register_request("alice")).unwrap();
        assert_eq!(backend.authorize(&token).unwrap(), user.user_id);

        let (again, token2) = backend
            .login(&LoginRequest {
                login: "alice".to_string(),
                auth_hash: B64.encode([1u8; 32]),
            })
            .unwrap();
        assert_eq!(again.user_id, user.user_id);
        assert_eq!(backend.authorize(&token2).unwrap(), user.user_id);
    }

    #[test]
    fn wrong_auth_hash_is_unauthorized() {
        let (_dir, backend) = backend();
        backend.register(&register_request("alice")).unwrap();

        let err = backend
            .login(&LoginRequest {
                login: "alice".to_string(),
                auth_hash: B64.encode([99u8; 32]),
            })
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized));
    }

    #[test]
    fn duplicate_login_is_a_conflict() {
        let (_dir, backend) = backend();
        backend.register(&register_request("alice")).unwrap();
        let err = backend.register(&register_request("alice")).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict));
    }

    #[test]
    fn overlong_login_is_rejected() {
        let (_dir, backend) = backend();
        let err = backend
            .register(&register_request("a-login-name-that-is-way-too-long"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn salt_request_for_unknown_login_is_not_found() {
        let (_dir, backend) = backend();
        assert!(matches!(
            backend.request_salt("ghost"),
            Err(ServiceError::NotFound)
        ));
    }

    #[test]
    fn upload_rejects_length_mismatch() {
        let (_dir, backend) = backend();
        let (user, _) = backend.register(&register_request("alice")).unwrap();

        let mut request = upload_request(user.user_id, "r1");
        request.length = 5;
        let err = backend.upload(user.user_id, &request).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn upload_rejects_integrity_hash_mismatch() {
        let (_dir, backend) = backend();
        let (user, _) = backend.register(&register_request("alice")).unwrap();

        let mut request = upload_request(user.user_id, "r1");
        request.hash = "0".repeat(64);
        let err = backend.upload(user.user_id, &request).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn upload_for_another_user_is_forbidden() {
        let (_dir, backend) = backend();
        let (user, _) = backend.register(&register_request("alice")).unwrap();

        let request = upload_request(user.user_id + 1, "r1");
        let err = backend.upload(user.user_id, &request).unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden));
    }

    #[test]
    fn update_distinguishes_conflict_from_not_found() {
        let (_dir, backend) = backend();
        let (user, _) = backend.register(&register_request("alice")).unwrap();
        backend
            .upload(user.user_id, &upload_request(user.user_id, "r1"))
            .unwrap();

        let fresh = sealed_payload("r1-v2");
        let item_hash = payload::compute_hash(&fresh).unwrap();
        let make_request = |client_side_id: &str, expected_version: i64| {
            let item = UpdateItem {
                client_side_id: client_side_id.to_string(),
                payload: fresh.clone(),
                hash: item_hash.clone(),
                expected_version,
                updated_at: now_unix_seconds(),
            };
            let list_hash = payload::compute_list_hash(&[item.payload.clone()]).unwrap();
            UpdateRequest {
                user_id: user.user_id,
                updates: vec![item],
                hash: list_hash,
                length: 1,
            }
        };

        let conflict = backend
            .update(user.user_id, &make_request("r1", 7))
            .unwrap_err();
        assert!(matches!(conflict, ServiceError::Conflict));

        let missing = backend
            .update(user.user_id, &make_request("ghost", 1))
            .unwrap_err();
        assert!(matches!(missing, ServiceError::NotFound));

        backend.update(user.user_id, &make_request("r1", 1)).unwrap();
        let states = backend.states(user.user_id).unwrap();
        assert_eq!(states.private_data_states[0].version, 2);
    }
}

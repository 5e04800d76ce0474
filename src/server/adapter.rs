//! In-process implementation of the client's server contract.
//!
//! Drives [`Backend`] directly, bypassing HTTP. The integration suite runs
//! entire multi-device scenarios against it, and it demonstrates that no
//! transport type leaks into the core.

use std::sync::Arc;

use crate::record::{PrivateRecord, RecordState};
use crate::remote::{
    AuthSuccess, DeleteRequest, DownloadRequest, LoginRequest, RegisterRequest, RemoteError,
    SaltParams, ServerAdapter, UpdateRequest, UploadRequest,
};
use crate::server::service::{Backend, ServiceError};

#[derive(Clone)]
pub struct EmbeddedServer {
    backend: Arc<Backend>,
}

impl EmbeddedServer {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self { backend }
    }

    fn authorize(&self, token: &str) -> Result<i64, RemoteError> {
        self.backend.authorize(token).map_err(to_remote)
    }
}

fn to_remote(err: ServiceError) -> RemoteError {
    match err {
        ServiceError::Validation(message) => RemoteError::BadRequest(message),
        ServiceError::Unauthorized => RemoteError::Unauthorized,
        ServiceError::Forbidden => RemoteError::Forbidden,
        ServiceError::NotFound => RemoteError::NotFound,
        ServiceError::Conflict => RemoteError::VersionConflict,
        ServiceError::Internal => RemoteError::InternalServerError,
    }
}

impl ServerAdapter for EmbeddedServer {
    fn register(&self, request: &RegisterRequest) -> Result<AuthSuccess, RemoteError> {
        let (user, token) = self.backend.register(request).map_err(to_remote)?;
        Ok(AuthSuccess { user, token })
    }

    fn request_salt(&self, login: &str) -> Result<SaltParams, RemoteError> {
        self.backend.request_salt(login).map_err(to_remote)
    }

    fn login(&self, request: &LoginRequest) -> Result<AuthSuccess, RemoteError> {
        let (user, token) = self.backend.login(request).map_err(to_remote)?;
        Ok(AuthSuccess { user, token })
    }

    fn upload(&self, token: &str, request: &UploadRequest) -> Result<(), RemoteError> {
        let user_id = self.authorize(token)?;
        self.backend.upload(user_id, request).map_err(to_remote)
    }

    fn download(
        &self,
        token: &str,
        request: &DownloadRequest,
    ) -> Result<Vec<PrivateRecord>, RemoteError> {
        let user_id = self.authorize(token)?;
        self.backend.download(user_id, request).map_err(to_remote)
    }

    fn update(&self, token: &str, request: &UpdateRequest) -> Result<(), RemoteError> {
        let user_id = self.authorize(token)?;
        self.backend.update(user_id, request).map_err(to_remote)
    }

    fn delete(&self, token: &str, request: &DeleteRequest) -> Result<(), RemoteError> {
        let user_id = self.authorize(token)?;
        self.backend.delete(user_id, request).map_err(to_remote)
    }

    fn get_server_states(
        &self,
        token: &str,
        _user_id: i64,
    ) -> Result<Vec<RecordState>, RemoteError> {
        let user_id = self.authorize(token)?;
        let states = self.backend.states(user_id).map_err(to_remote)?;
        Ok(states.private_data_states)
    }
}

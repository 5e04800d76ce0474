//! The transport-agnostic contract the client core consumes.
//!
//! The core only ever talks to a [`ServerAdapter`]; implementations are
//! interchangeable. [`http::HttpServerAdapter`] speaks the JSON/HTTP wire
//! protocol, and `server::adapter::EmbeddedServer` drives the server service
//! in-process. No transport type leaks out of this module.

pub mod http;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{PrivateRecord, RecordState};

/// Maximum accepted length of an account login, enforced on both sides.
pub const LOGIN_MAX_LEN: usize = 20;

/// Error taxonomy every adapter surfaces, mapped from transport status.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid credentials")]
    Unauthorized,

    #[error("forbidden")]
    Forbidden,

    #[error("record not found")]
    NotFound,

    #[error("version conflict")]
    VersionConflict,

    #[error("bad gateway")]
    BadGateway,

    #[error("internal server error")]
    InternalServerError,

    #[error("unreachable server: {0}")]
    Transport(String),
}

impl RemoteError {
    pub fn from_status(code: u16, body: String) -> Self {
        match code {
            400 => RemoteError::BadRequest(body),
            401 => RemoteError::Unauthorized,
            403 => RemoteError::Forbidden,
            404 => RemoteError::NotFound,
            409 => RemoteError::VersionConflict,
            502 => RemoteError::BadGateway,
            _ => RemoteError::InternalServerError,
        }
    }

    /// Whether the failure means "server unavailable" rather than "request
    /// rejected" — the cases a staged local write may wait out.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            RemoteError::Transport(_) | RemoteError::BadGateway | RemoteError::InternalServerError
        )
    }
}

/// Registration payload. All key-material fields are base64-encoded and
/// opaque to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub login: String,
    pub name: String,
    pub auth_hash: String,
    pub encryption_salt: String,
    pub encrypted_master_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_password_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaltParamsRequest {
    pub login: String,
}

/// The pre-login handshake: everything needed to derive the KEK locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaltParams {
    pub login: String,
    pub encryption_salt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub auth_hash: String,
}

/// Account row as the server reports it. `encrypted_master_key` is the
/// wrapped-key envelope only the account's KEK can open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub user_id: i64,
    pub login: String,
    pub name: String,
    pub encryption_salt: String,
    pub encrypted_master_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_password_hint: Option<String>,
}

/// Outcome of register/login: the account row plus a bearer token.
#[derive(Debug, Clone)]
pub struct AuthSuccess {
    pub user: UserSummary,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRequest {
    pub user_id: i64,
    pub items: Vec<PrivateRecord>,
    /// Hex SHA-256 over the canonical serialization of the payload list.
    pub hash: String,
    /// Redundant element count for a quick sanity check.
    pub length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub user_id: i64,
    pub client_side_ids: Vec<String>,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateItem {
    pub client_side_id: String,
    pub payload: crate::payload::CipheredPayload,
    pub hash: String,
    pub expected_version: i64,
    pub updated_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub user_id: i64,
    pub updates: Vec<UpdateItem>,
    pub hash: String,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteEntry {
    pub client_side_id: String,
    pub expected_version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub user_id: i64,
    pub entries: Vec<DeleteEntry>,
    pub length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatesResponse {
    pub private_data_states: Vec<RecordState>,
    pub length: usize,
}

/// The capability set the core consumes from a server.
pub trait ServerAdapter: Send + Sync {
    fn register(&self, request: &RegisterRequest) -> Result<AuthSuccess, RemoteError>;

    fn request_salt(&self, login: &str) -> Result<SaltParams, RemoteError>;

    fn login(&self, request: &LoginRequest) -> Result<AuthSuccess, RemoteError>;

    fn upload(&self, token: &str, request: &UploadRequest) -> Result<(), RemoteError>;

    fn download(
        &self,
        token: &str,
        request: &DownloadRequest,
    ) -> Result<Vec<PrivateRecord>, RemoteError>;

    fn update(&self, token: &str, request: &UpdateRequest) -> Result<(), RemoteError>;

    fn delete(&self, token: &str, request: &DeleteRequest) -> Result<(), RemoteError>;

    fn get_server_states(&self, token: &str, user_id: i64)
    -> Result<Vec<RecordState>, RemoteError>;
}

//! HTTP surface: the axum router mapping the wire protocol onto [`Backend`].

use axum::extract::{FromRequestParts, Json, State};
use axum::http::request::Parts;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::Router;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::remote::{
    DeleteRequest, DownloadRequest, LoginRequest, RegisterRequest, SaltParamsRequest,
    UpdateRequest, UploadRequest,
};
use crate::server::ServeOptions;
use crate::server::service::{Backend, ServiceError};
use crate::server::store::{ServerStore, ServerStoreError};
use crate::server::token::TokenSigner;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error(transparent)]
    Storage(#[from] ServerStoreError),

    #[error("io error")]
    Io(#[from] std::io::Error),
}

/// Open storage, build the router, and serve until ctrl-c.
pub fn run(options: &ServeOptions) -> Result<(), ServeError> {
    let store = ServerStore::open(&options.db_path)?;
    let tokens = TokenSigner::new(&options.token_secret, options.token_ttl_secs);
    let backend = Arc::new(Backend::new(store, tokens));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let listener = tokio::net::TcpListener::bind(&options.bind_addr).await?;
        info!(addr = %options.bind_addr, "server listening");
        axum::serve(listener, router(backend))
            .with_graceful_shutdown(async {
                let _ = tokio::signal::ctrl_c().await;
                info!("shutting down");
            })
            .await
    })?;

    Ok(())
}

pub fn router(backend: Arc<Backend>) -> Router {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/params", post(params))
        .route("/api/auth/login", post(login))
        .route("/api/data/", post(upload))
        .route("/api/data/download", post(download))
        .route("/api/data/update", put(update))
        .route("/api/data/delete", delete(delete_records))
        .route("/api/sync/", get(states))
        .with_state(backend)
}

/// Service failures rendered as wire status codes.
struct ApiFailure(ServiceError);

impl From<ServiceError> for ApiFailure {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden => StatusCode::FORBIDDEN,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::Conflict => StatusCode::CONFLICT,
            ServiceError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}

/// Extracts and validates the bearer token, yielding the caller's user id.
struct AuthUser(i64);

impl FromRequestParts<Arc<Backend>> for AuthUser {
    type Rejection = ApiFailure;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<Backend>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiFailure(ServiceError::Unauthorized))?;

        let user_id = state.authorize(token)?;
        Ok(AuthUser(user_id))
    }
}

async fn register(
    State(backend): State<Arc<Backend>>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiFailure> {
    let (user, token) = backend.register(&request)?;
    Ok((
        [(header::AUTHORIZATION, format!("Bearer {token}"))],
        Json(user),
    ))
}

async fn params(
    State(backend): State<Arc<Backend>>,
    Json(request): Json<SaltParamsRequest>,
) -> Result<impl IntoResponse, ApiFailure> {
    Ok(Json(backend.request_salt(&request.login)?))
}

async fn login(
    State(backend): State<Arc<Backend>>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiFailure> {
    let (user, token) = backend.login(&request)?;
    Ok((
        [(header::AUTHORIZATION, format!("Bearer {token}"))],
        Json(user),
    ))
}

async fn upload(
    State(backend): State<Arc<Backend>>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<UploadRequest>,
) -> Result<impl IntoResponse, ApiFailure> {
    backend.upload(user_id, &request)?;
    Ok(StatusCode::OK)
}

async fn download(
    State(backend): State<Arc<Backend>>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<DownloadRequest>,
) -> Result<impl IntoResponse, ApiFailure> {
    Ok(Json(backend.download(user_id, &request)?))
}

async fn update(
    State(backend): State<Arc<Backend>>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<UpdateRequest>,
) -> Result<impl IntoResponse, ApiFailure> {
    backend.update(user_id, &request)?;
    Ok(StatusCode::OK)
}

async fn delete_records(
    State(backend): State<Arc<Backend>>,
    AuthUser(user_id): AuthUser,
    Json(request): Json<DeleteRequest>,
) -> Result<impl IntoResponse, ApiFailure> {
    backend.delete(user_id, &request)?;
    Ok(StatusCode::OK)
}

async fn states(
    State(backend): State<Arc<Backend>>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse, ApiFailure> {
    Ok(Json(backend.states(user_id)?))
}

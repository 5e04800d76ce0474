//! Blocking HTTP implementation of the server contract.

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::AUTHORIZATION;
use std::time::Duration;

use crate::record::{PrivateRecord, RecordState};
use crate::remote::{
    AuthSuccess, DeleteRequest, DownloadRequest, LoginRequest, RegisterRequest, RemoteError,
    SaltParams, SaltParamsRequest, ServerAdapter, StatesResponse, UpdateRequest, UploadRequest,
    UserSummary,
};

pub struct HttpServerAdapter {
    http: Client,
    base_url: String,
}

impl HttpServerAdapter {
    /// Every request carries `timeout` as its deadline.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn send(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request
            .send()
            .map_err(|err| RemoteError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let code = status.as_u16();
        let body = response.text().unwrap_or_default();
        Err(RemoteError::from_status(code, body))
    }

    /// Register and login hand the bearer back in the `Authorization` header.
    fn auth_exchange(
        &self,
        request: RequestBuilder,
    ) -> Result<AuthSuccess, RemoteError> {
        let response = self.send(request)?;

        let token = response
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::to_string)
            .ok_or_else(|| {
                RemoteError::Transport("response carried no bearer token".to_string())
            })?;

        let user: UserSummary = response
            .json()
            .map_err(|err| RemoteError::Transport(err.to_string()))?;

        Ok(AuthSuccess { user, token })
    }
}

impl ServerAdapter for HttpServerAdapter {
    fn register(&self, request: &RegisterRequest) -> Result<AuthSuccess, RemoteError> {
        self.auth_exchange(self.http.post(self.url("/api/auth/register")).json(request))
    }

    fn request_salt(&self, login: &str) -> Result<SaltParams, RemoteError> {
        let body = SaltParamsRequest {
            login: login.to_string(),
        };
        let response = self.send(self.http.post(self.url("/api/auth/params")).json(&body))?;
        response
            .json()
            .map_err(|err| RemoteError::Transport(err.to_string()))
    }

    fn login(&self, request: &LoginRequest) -> Result<AuthSuccess, RemoteError> {
        self.auth_exchange(self.http.post(self.url("/api/auth/login")).json(request))
    }

    fn upload(&self, token: &str, request: &UploadRequest) -> Result<(), RemoteError> {
        self.send(
            self.http
                .post(self.url("/api/data/"))
                .bearer_auth(token)
                .json(request),
        )?;
        Ok(())
    }

    fn download(
        &self,
        token: &str,
        request: &DownloadRequest,
    ) -> Result<Vec<PrivateRecord>, RemoteError> {
        let response = self.send(
            self.http
                .post(self.url("/api/data/download"))
                .bearer_auth(token)
                .json(request),
        )?;
        response
            .json()
            .map_err(|err| RemoteError::Transport(err.to_string()))
    }

    fn update(&self, token: &str, request: &UpdateRequest) -> Result<(), RemoteError> {
        self.send(
            self.http
                .put(self.url("/api/data/update"))
                .bearer_auth(token)
                .json(request),
        )?;
        Ok(())
    }

    fn delete(&self, token: &str, request: &DeleteRequest) -> Result<(), RemoteError> {
        self.send(
            self.http
                .delete(self.url("/api/data/delete"))
                .bearer_auth(token)
                .json(request),
        )?;
        Ok(())
    }

    fn get_server_states(
        &self,
        token: &str,
        _user_id: i64,
    ) -> Result<Vec<RecordState>, RemoteError> {
        let response = self.send(self.http.get(self.url("/api/sync/")).bearer_auth(token))?;
        let states: StatesResponse = response
            .json()
            .map_err(|err| RemoteError::Transport(err.to_string()))?;
        Ok(states.private_data_states)
    }
}

//! Registration, login, and session lifecycle.
//!
//! There is no ambient session: every vault operation receives an explicit
//! [`Session`] value. The DEK inside it exists only in process memory and is
//! zeroized when the session is dropped.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::keychain::{self, AUTH_HASH_DOMAIN, KdfParams, SecretBytes};
use crate::remote::{
    LOGIN_MAX_LEN, LoginRequest, RegisterRequest, RemoteError, ServerAdapter, UserSummary,
};
use crate::store::session::{self, PersistedSession, SessionIoError};
use crate::store::{LocalStore, LocalUser, StoreError};

/// An unlocked session: identity, bearer credential, and the DEK.
///
/// The DEK is never persisted; dropping the session zeroizes it.
pub struct Session {
    pub user_id: i64,
    pub token: String,
    dek: SecretBytes,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("token", &self.token)
            .field("dek", &"[redacted]")
            .finish()
    }
}

impl Session {
    pub fn dek(&self) -> &SecretBytes {
        &self.dek
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Deliberately covers wrong password, unknown login, and DEK-unwrap
    /// failures alike.
    #[error("invalid credentials or corrupted vault")]
    InvalidCredentials,

    #[error("login is already taken")]
    LoginTaken,

    #[error("login must be 1..={LOGIN_MAX_LEN} characters")]
    InvalidLogin,

    #[error("no local account data for this session; login again")]
    AccountUnavailable,

    #[error(transparent)]
    Crypto(keychain::CryptoError),

    #[error(transparent)]
    Remote(RemoteError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionIoError),
}

pub struct AuthService<'a> {
    remote: &'a dyn ServerAdapter,
    store: &'a LocalStore,
    session_path: PathBuf,
    kdf_params: KdfParams,
    kdf_floor: KdfParams,
}

impl<'a> AuthService<'a> {
    pub fn new(
        remote: &'a dyn ServerAdapter,
        store: &'a LocalStore,
        session_path: &Path,
        kdf_params: KdfParams,
        kdf_floor: KdfParams,
    ) -> Self {
        Self {
            remote,
            store,
            session_path: session_path.to_path_buf(),
            kdf_params,
            kdf_floor,
        }
    }

    /// Run the registration ceremony and leave an unlocked session behind.
    pub fn register(
        &self,
        login: &str,
        name: &str,
        master_password: &SecretString,
        master_password_hint: Option<String>,
    ) -> Result<Session, AuthError> {
        if login.is_empty() || login.len() > LOGIN_MAX_LEN {
            return Err(AuthError::InvalidLogin);
        }

        let salt = keychain::generate_encryption_salt().map_err(AuthError::Crypto)?;
        let dek = keychain::generate_dek().map_err(AuthError::Crypto)?;
        let kek =
            keychain::derive_kek(master_password, &salt, self.kdf_params).map_err(AuthError::Crypto)?;

        let wrapped = keychain::wrap_dek(&dek, &kek).map_err(AuthError::Crypto)?;
        let envelope = keychain::encode_wrapped_key(self.kdf_params, &wrapped);
        let auth_hash = keychain::auth_hash(&kek, AUTH_HASH_DOMAIN);

        let request = RegisterRequest {
            login: login.to_string(),
            name: name.to_string(),
            auth_hash: B64.encode(auth_hash),
            encryption_salt: B64.encode(salt),
            encrypted_master_key: B64.encode(&envelope),
            master_password_hint,
        };

        let success = self.remote.register(&request).map_err(|err| match err {
            RemoteError::VersionConflict => AuthError::LoginTaken,
            other => AuthError::Remote(other),
        })?;

        self.remember(&success.user, &success.token)?;
        Ok(Session {
            user_id: success.user.user_id,
            token: success.token,
            dek,
        })
    }

    /// Derive, authenticate, unwrap. Every credential-shaped failure is the
    /// same opaque error.
    pub fn login(&self, login: &str, master_password: &SecretString) -> Result<Session, AuthError> {
        let params = self.remote.request_salt(login).map_err(|err| match err {
            RemoteError::NotFound | RemoteError::Unauthorized => AuthError::InvalidCredentials,
            other => AuthError::Remote(other),
        })?;

        let salt = B64
            .decode(&params.encryption_salt)
            .map_err(|_| AuthError::InvalidCredentials)?;
        let kek = keychain::derive_kek(master_password, &salt, self.kdf_params)
            .map_err(AuthError::Crypto)?;
        let auth_hash = keychain::auth_hash(&kek, AUTH_HASH_DOMAIN);

        let success = self
            .remote
            .login(&LoginRequest {
                login: login.to_string(),
                auth_hash: B64.encode(auth_hash),
            })
            .map_err(|err| match err {
                RemoteError::Unauthorized | RemoteError::NotFound => AuthError::InvalidCredentials,
                other => AuthError::Remote(other),
            })?;

        let dek = self.unwrap_master_key(
            &success.user.encrypted_master_key,
            &salt,
            master_password,
            Some(&kek),
        )?;

        self.remember(&success.user, &success.token)?;
        Ok(Session {
            user_id: success.user.user_id,
            token: success.token,
            dek,
        })
    }

    /// Recover `(user_id, token)` from the persisted session, if any.
    ///
    /// The returned session is locked: the DEK must be rederived through
    /// [`AuthService::unlock`] before any payload operation.
    pub fn restore(&self) -> Result<Option<PersistedSession>, AuthError> {
        let Some(persisted) = session::load(&self.session_path)? else {
            return Ok(None);
        };

        // The subject claim is the authority on identity; the signature is
        // the server's to check, not ours.
        match parse_token_subject(&persisted.token) {
            Some(user_id) if user_id == persisted.user_id => Ok(Some(persisted)),
            _ => {
                debug!("persisted token subject unusable; discarding session");
                session::clear(&self.session_path)?;
                Ok(None)
            }
        }
    }

    /// Rederive KEK + DEK for a restored session using locally cached
    /// account data.
    pub fn unlock(
        &self,
        persisted: &PersistedSession,
        master_password: &SecretString,
    ) -> Result<Session, AuthError> {
        let user = match self.store.get_user(persisted.user_id) {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(AuthError::AccountUnavailable),
            Err(err) => return Err(AuthError::Store(err)),
        };

        let salt = B64
            .decode(&user.encryption_salt)
            .map_err(|_| AuthError::InvalidCredentials)?;
        let dek =
            self.unwrap_master_key(&user.encrypted_master_key, &salt, master_password, None)?;

        Ok(Session {
            user_id: persisted.user_id,
            token: persisted.token.clone(),
            dek,
        })
    }

    /// Zeroize the DEK (by dropping the session) and clear persisted state.
    pub fn logout(&self, session: Session) -> Result<(), AuthError> {
        drop(session);
        self.clear_session()
    }

    /// Drop the persisted session without an unlocked [`Session`] in hand —
    /// the CLI path, where no DEK has been derived in this process.
    pub fn clear_session(&self) -> Result<(), AuthError> {
        session::clear(&self.session_path)?;
        Ok(())
    }

    /// Open a base64 wrapped-key envelope, honoring its recorded KDF
    /// parameters. `derived` short-circuits the common case where the
    /// envelope parameters match the KEK already in hand.
    fn unwrap_master_key(
        &self,
        encrypted_master_key: &str,
        salt: &[u8],
        master_password: &SecretString,
        derived: Option<&SecretBytes>,
    ) -> Result<SecretBytes, AuthError> {
        let envelope = B64
            .decode(encrypted_master_key)
            .map_err(|_| AuthError::InvalidCredentials)?;

        let (params, blob) =
            keychain::decode_wrapped_key(&envelope, self.kdf_floor).map_err(|err| match err {
                keychain::CryptoError::MalformedWrappedKey => AuthError::InvalidCredentials,
                other => AuthError::Crypto(other),
            })?;

        let freshly_derived = match derived {
            Some(_) if params == self.kdf_params => None,
            _ => {
                Some(keychain::derive_kek(master_password, salt, params).map_err(AuthError::Crypto)?)
            }
        };
        let kek = freshly_derived
            .as_ref()
            .or(derived)
            .ok_or(AuthError::InvalidCredentials)?;

        keychain::unwrap_dek(blob, kek).map_err(|err| match err {
            keychain::CryptoError::Unsealed => AuthError::InvalidCredentials,
            other => AuthError::Crypto(other),
        })
    }

    fn remember(&self, user: &UserSummary, token: &str) -> Result<(), AuthError> {
        self.store.save_user(&LocalUser {
            user_id: user.user_id,
            login: user.login.clone(),
            name: user.name.clone(),
            encryption_salt: user.encryption_salt.clone(),
            encrypted_master_key: user.encrypted_master_key.clone(),
        })?;

        session::save(
            &self.session_path,
            &PersistedSession {
                user_id: user.user_id,
                token: token.to_string(),
                issued_at: crate::record::now_unix_seconds(),
            },
        )?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    sub: String,
}

/// Parse the subject claim without verifying the signature. Used only to
/// recover our own user id locally; the server does the real validation.
fn parse_token_subject(token: &str) -> Option<i64> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    data.claims.sub.parse::<i64>().ok()
}

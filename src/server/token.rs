//! Bearer token issuance and validation (JWS, HS256).
//!
//! The subject claim carries the stringified user id. The server validates
//! signature, issuer, and expiry in full; clients parse the subject without
//! verification solely to recover their own user id (see `auth`).

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::now_unix_seconds;

pub const TOKEN_ISSUER: &str = "passkeeper";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token could not be issued")]
    Issue(#[source] jsonwebtoken::errors::Error),

    #[error("token rejected")]
    Rejected,
}

pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl TokenSigner {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    pub fn issue(&self, user_id: i64) -> Result<String, TokenError> {
        let now = now_unix_seconds();
        let claims = Claims {
            sub: user_id.to_string(),
            iss: TOKEN_ISSUER.to_string(),
            iat: now,
            exp: now + self.ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(TokenError::Issue)
    }

    /// Full validation: signature, issuer, expiry. Any failure is rejected
    /// without detail.
    pub fn verify(&self, token: &str) -> Result<i64, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);

        let data =
            decode::<Claims>(token, &self.decoding, &validation).map_err(|_| TokenError::Rejected)?;
        data.claims
            .sub
            .parse::<i64>()
            .map_err(|_| TokenError::Rejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_verify_roundtrip() {
        let signer = TokenSigner::new("test-secret", 3600);
        let token = signer.issue(42).unwrap();
        assert_eq!(signer.verify(&token).unwrap(), 42);
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let signer = TokenSigner::new("test-secret", 3600);
        let other = TokenSigner::new("other-secret", 3600);

        let token = other.issue(42).unwrap();
        assert!(matches!(signer.verify(&token), Err(TokenError::Rejected)));
    }

    #[test]
    fn garbage_is_rejected() {
        let signer = TokenSigner::new("test-secret", 3600);
        assert!(matches!(
            signer.verify("not.a.token"),
            Err(TokenError::Rejected)
        ));
    }
}

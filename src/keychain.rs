//! Cryptographic building blocks for the key hierarchy.
//!
//! This module intentionally provides small, composable primitives which
//! higher-level vault code can wire together. There is no I/O and no global
//! state here; everything is a pure function over byte strings.
//!
//! Design notes:
//!
//! - KDF: Argon2id derives the KEK (key-encryption key) from the master
//!   password + per-account salt.
//! - Key hierarchy: a randomly generated DEK encrypts all vault payloads; the
//!   DEK is wrapped (encrypted) with the KEK so it can live on the server.
//! - AEAD: AES-256-GCM provides authenticated encryption. Nonces must be
//!   unique per key; every seal draws a fresh one.
//! - AuthHash: a one-way transform of the KEK used as the server-facing
//!   login credential, domain-separated so it never equals the KEK itself.
//!
//! Security foot-guns to avoid:
//!
//! - Never report *why* an unwrap failed. Wrong password, truncated blob, and
//!   tampered ciphertext are all the same opaque error.
//! - Do not log or print keys, plaintext payloads, or derived hashes.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::{Algorithm, Argon2, Params as Argon2Params, Version};
use rand::RngCore;
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretSlice, SecretString};
use sha2::{Digest, Sha256};
use thiserror::Error;
use zeroize::Zeroizing;

/// Size (bytes) of the per-account encryption salt.
pub const ENCRYPTION_SALT_LEN: usize = 16;
/// Size (bytes) of the data encryption key (DEK).
pub const DEK_LEN: usize = 32;
/// Size (bytes) of the key-encryption key (KEK) derived by Argon2id.
pub const KEK_LEN: usize = 32;
/// Size (bytes) of AES-256-GCM nonces.
pub const GCM_NONCE_LEN: usize = 12;

/// Fixed, non-secret domain-separation string mixed into the auth hash.
///
/// Shared by client and server; its sole purpose is to guarantee
/// `auth_hash != kek`.
pub const AUTH_HASH_DOMAIN: &str = "passkeeper/auth-hash/v1";

/// Magic prefix of the wrapped-key envelope that records KDF parameters.
const WRAPPED_KEY_MAGIC: &[u8; 4] = b"PKW1";
/// Envelope layout: magic(4) + memory_kib(4) + iterations(4) + parallelism(4).
const WRAPPED_KEY_HEADER_LEN: usize = 4 + 4 + 4 + 4;

/// Secret bytes held in memory with zeroize-on-drop semantics.
pub type SecretBytes = SecretSlice<u8>;

/// Argon2id tuning parameters, recorded alongside every wrapped key so they
/// can be upgraded over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl KdfParams {
    /// Default production parameters: 64 MiB, one pass, four lanes.
    pub fn recommended() -> Self {
        Self {
            memory_kib: 64 * 1024,
            iterations: 1,
            parallelism: 4,
        }
    }

    /// The weakest parameters a client will agree to decrypt with.
    pub fn floor() -> Self {
        Self {
            memory_kib: 8 * 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    pub fn for_tests() -> Self {
        Self {
            memory_kib: 8 * 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    /// Whether `self` is at least as strong as `floor` in every dimension.
    pub fn meets_floor(&self, floor: Self) -> bool {
        self.memory_kib >= floor.memory_kib
            && self.iterations >= floor.iterations
            && self.parallelism >= floor.parallelism
    }

    fn to_argon2_params(self, output_len: usize) -> Result<Argon2Params, CryptoError> {
        Ok(Argon2Params::new(
            self.memory_kib,
            self.iterations,
            self.parallelism,
            Some(output_len),
        )?)
    }
}

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("secure randomness unavailable")]
    Random,

    #[error("argon2 error")]
    Argon2(#[from] argon2::Error),

    #[error("aead error")]
    Aead,

    #[error("wrong password or corrupted vault")]
    Unsealed,

    #[error("key derivation parameters below the configured floor")]
    ParamsBelowFloor,

    #[error("malformed wrapped key")]
    MalformedWrappedKey,
}

/// Generate `N` cryptographically-secure random bytes.
///
/// Randomness failures are fatal for the current operation; there is no
/// retry path.
pub fn random_bytes<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|_| CryptoError::Random)?;
    Ok(bytes)
}

/// Generate a fresh per-account encryption salt.
pub fn generate_encryption_salt() -> Result<[u8; ENCRYPTION_SALT_LEN], CryptoError> {
    random_bytes::<ENCRYPTION_SALT_LEN>()
}

/// Generate a fresh DEK (data encryption key).
pub fn generate_dek() -> Result<SecretBytes, CryptoError> {
    Ok(SecretBytes::from(random_bytes::<DEK_LEN>()?.to_vec()))
}

/// Derive the KEK (32 bytes) from the master password using Argon2id.
pub fn derive_kek(
    master_password: &SecretString,
    salt: &[u8],
    params: KdfParams,
) -> Result<SecretBytes, CryptoError> {
    let argon2_params = params.to_argon2_params(KEK_LEN)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut out = vec![0u8; KEK_LEN];
    argon2.hash_password_into(master_password.expose_secret().as_bytes(), salt, &mut out)?;
    Ok(SecretBytes::from(out))
}

/// Compute the server-facing login credential: `SHA-256(kek || auth_salt)`.
///
/// The result is sent to the server and is safe to transmit; it cannot be
/// inverted to recover the KEK.
pub fn auth_hash(kek: &SecretBytes, auth_salt: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(kek.expose_secret());
    hasher.update(auth_salt.as_bytes());
    hasher.finalize().into()
}

/// Seal arbitrary bytes with AES-256-GCM under `key`.
///
/// Output layout is `nonce || ciphertext` (the GCM tag is the ciphertext
/// tail in this encoding). A fresh 12-byte nonce is drawn per call.
pub fn seal(key: &SecretBytes, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key.expose_secret()).map_err(|_| CryptoError::Aead)?;
    let nonce = random_bytes::<GCM_NONCE_LEN>()?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| CryptoError::Aead)?;

    let mut out = Vec::with_capacity(GCM_NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a `nonce || ciphertext` blob sealed by [`seal`].
///
/// Any failure (short blob, bad tag, wrong key) is reported as the opaque
/// [`CryptoError::Unsealed`] so callers cannot build a decryption oracle.
pub fn open(key: &SecretBytes, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    if blob.len() < GCM_NONCE_LEN {
        return Err(CryptoError::Unsealed);
    }
    let (nonce, ciphertext) = blob.split_at(GCM_NONCE_LEN);

    let cipher =
        Aes256Gcm::new_from_slice(key.expose_secret()).map_err(|_| CryptoError::Unsealed)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::Unsealed)?;
    Ok(Zeroizing::new(plaintext))
}

/// Wrap (encrypt) the DEK with the KEK.
pub fn wrap_dek(dek: &SecretBytes, kek: &SecretBytes) -> Result<Vec<u8>, CryptoError> {
    seal(kek, dek.expose_secret())
}

/// Unwrap (decrypt) the DEK with the KEK.
///
/// Returns the opaque [`CryptoError::Unsealed`] on any failure.
pub fn unwrap_dek(blob: &[u8], kek: &SecretBytes) -> Result<SecretBytes, CryptoError> {
    let plaintext = open(kek, blob)?;
    if plaintext.len() != DEK_LEN {
        return Err(CryptoError::Unsealed);
    }
    Ok(SecretBytes::from(plaintext.to_vec()))
}

/// Prefix a wrapped-key blob with the KDF parameters that produced its KEK.
///
/// The envelope travels with the ciphertext (it is what the server stores as
/// `encrypted_master_key`) so parameters can be upgraded per account.
pub fn encode_wrapped_key(params: KdfParams, blob: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(WRAPPED_KEY_HEADER_LEN + blob.len());
    out.extend_from_slice(WRAPPED_KEY_MAGIC);
    out.extend_from_slice(&params.memory_kib.to_le_bytes());
    out.extend_from_slice(&params.iterations.to_le_bytes());
    out.extend_from_slice(&params.parallelism.to_le_bytes());
    out.extend_from_slice(blob);
    out
}

/// Split a wrapped-key envelope into its KDF parameters and ciphertext.
///
/// Refuses envelopes whose recorded parameters are weaker than `floor`.
pub fn decode_wrapped_key(
    bytes: &[u8],
    floor: KdfParams,
) -> Result<(KdfParams, &[u8]), CryptoError> {
    if bytes.len() < WRAPPED_KEY_HEADER_LEN || &bytes[0..4] != WRAPPED_KEY_MAGIC {
        return Err(CryptoError::MalformedWrappedKey);
    }

    let memory_kib = u32::from_le_bytes(bytes[4..8].try_into().expect("slice is 4 bytes"));
    let iterations = u32::from_le_bytes(bytes[8..12].try_into().expect("slice is 4 bytes"));
    let parallelism = u32::from_le_bytes(bytes[12..16].try_into().expect("slice is 4 bytes"));
    let params = KdfParams {
        memory_kib,
        iterations,
        parallelism,
    };

    if !params.meets_floor(floor) {
        return Err(CryptoError::ParamsBelowFloor);
    }

    Ok((params, &bytes[WRAPPED_KEY_HEADER_LEN..]))
}

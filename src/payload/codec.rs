//! Sealing, opening, and hashing of record payloads.
//!
//! Hashes are always computed over the *ciphertext* in canonical form, so
//! both sides can verify transport integrity without any plaintext
//! knowledge. Canonical form is the serde_json value encoding, whose object
//! maps are BTreeMap-backed: equal values always produce identical bytes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::keychain::{self, SecretBytes};
use crate::payload::{CipheredPayload, DecipheredPayload, ItemData, ItemKind, Metadata};

#[derive(Debug, Error)]
pub enum CodecError {
    /// Any decrypt-path failure: bad base64, short blob, bad tag, or
    /// garbled plaintext. Deliberately indistinguishable.
    #[error("wrong password or corrupted vault")]
    Opaque,

    #[error("payload serialization failed")]
    Serialize(#[from] serde_json::Error),

    #[error(transparent)]
    Crypto(#[from] keychain::CryptoError),
}

/// Serialize a value deterministically: JSON with sorted object keys.
pub fn canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let value = serde_json::to_value(value)?;
    Ok(serde_json::to_vec(&value)?)
}

/// Seal every component of a plaintext payload independently with the DEK.
pub fn encrypt_payload(
    plain: &DecipheredPayload,
    dek: &SecretBytes,
) -> Result<CipheredPayload, CodecError> {
    let notes = match &plain.notes {
        Some(notes) => Some(seal_component(dek, notes)?),
        None => None,
    };
    let additional_fields = match &plain.additional_fields {
        Some(fields) => Some(seal_component(dek, fields)?),
        None => None,
    };

    Ok(CipheredPayload {
        kind: plain.data.kind().code(),
        metadata: seal_component(dek, &plain.metadata)?,
        data: seal_component(dek, &plain.data)?,
        notes,
        additional_fields,
    })
}

/// Open a sealed payload back into plaintext.
///
/// Every failure mode collapses into [`CodecError::Opaque`].
pub fn decrypt_payload(
    ciphered: &CipheredPayload,
    dek: &SecretBytes,
) -> Result<DecipheredPayload, CodecError> {
    let kind = ItemKind::from_code(ciphered.kind).ok_or(CodecError::Opaque)?;

    let metadata: Metadata = open_component(dek, &ciphered.metadata)?;
    let data: ItemData = open_component(dek, &ciphered.data)?;
    if data.kind() != kind {
        return Err(CodecError::Opaque);
    }

    let notes = match &ciphered.notes {
        Some(blob) => Some(open_component(dek, blob)?),
        None => None,
    };
    let additional_fields = match &ciphered.additional_fields {
        Some(blob) => Some(open_component(dek, blob)?),
        None => None,
    };

    Ok(DecipheredPayload {
        metadata,
        data,
        notes,
        additional_fields,
    })
}

/// Hex SHA-256 of the canonical serialization of a sealed payload.
pub fn compute_hash(ciphered: &CipheredPayload) -> Result<String, CodecError> {
    Ok(hex_digest(&canonical_bytes(ciphered)?))
}

/// Hex SHA-256 of the canonical serialization of a batch, used as the
/// transport-integrity hash on upload and update requests.
pub fn compute_list_hash<T: Serialize>(items: &[T]) -> Result<String, CodecError> {
    Ok(hex_digest(&canonical_bytes(&items)?))
}

fn hex_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn seal_component<T: Serialize>(dek: &SecretBytes, value: &T) -> Result<String, CodecError> {
    let plaintext = canonical_bytes(value)?;
    let blob = keychain::seal(dek, &plaintext)?;
    Ok(B64.encode(blob))
}

fn open_component<T: serde::de::DeserializeOwned>(
    dek: &SecretBytes,
    encoded: &str,
) -> Result<T, CodecError> {
    let blob = B64.decode(encoded).map_err(|_| CodecError::Opaque)?;
    let plaintext = keychain::open(dek, &blob).map_err(|_| CodecError::Opaque)?;
    serde_json::from_slice(&plaintext).map_err(|_| CodecError::Opaque)
}

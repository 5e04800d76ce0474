//! Plaintext and sealed payload models.
//!
//! The plaintext side ([`DecipheredPayload`]) only ever exists in client
//! memory. The sealed side ([`CipheredPayload`]) is what travels over the
//! wire and lands in storage: every component is an independent
//! base64(nonce || ciphertext) blob so partial updates can re-seal only the
//! field that changed.

pub mod codec;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use codec::{CodecError, compute_hash, compute_list_hash, decrypt_payload, encrypt_payload};

/// Maximum accepted length of a client-generated record identifier.
pub const CLIENT_SIDE_ID_MAX_LEN: usize = 40;

/// Discriminant of a vault record's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemKind {
    LoginPassword,
    Text,
    Binary,
    BankCard,
}

impl ItemKind {
    /// Stable wire code for this kind.
    pub fn code(self) -> u8 {
        match self {
            ItemKind::LoginPassword => 1,
            ItemKind::Text => 2,
            ItemKind::Binary => 3,
            ItemKind::BankCard => 4,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ItemKind::LoginPassword),
            2 => Some(ItemKind::Text),
            3 => Some(ItemKind::Binary),
            4 => Some(ItemKind::BankCard),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::LoginPassword => "login",
            ItemKind::Text => "text",
            ItemKind::Binary => "binary",
            ItemKind::BankCard => "bank-card",
        }
    }
}

/// Shared plaintext header: display name and optional folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

/// The secret body of a record, one variant per [`ItemKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ItemData {
    LoginPassword {
        username: String,
        password: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        urls: Vec<String>,
    },
    Text {
        text: String,
    },
    Binary {
        filename: String,
        /// File contents, base64-encoded. Attachments ride inside the sealed
        /// payload; there is no external blob store.
        bytes: String,
    },
    BankCard {
        number: String,
        holder: String,
        expires: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cvv: Option<String>,
    },
}

impl ItemData {
    pub fn kind(&self) -> ItemKind {
        match self {
            ItemData::LoginPassword { .. } => ItemKind::LoginPassword,
            ItemData::Text { .. } => ItemKind::Text,
            ItemData::Binary { .. } => ItemKind::Binary,
            ItemData::BankCard { .. } => ItemKind::BankCard,
        }
    }
}

/// A fully decrypted record payload. Client memory only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecipheredPayload {
    pub metadata: Metadata,
    pub data: ItemData,
    pub notes: Option<String>,
    pub additional_fields: Option<BTreeMap<String, String>>,
}

/// A sealed record payload: each component is base64(nonce || ciphertext).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipheredPayload {
    /// Wire code of the payload kind, see [`ItemKind::code`].
    #[serde(rename = "type")]
    pub kind: u8,
    pub metadata: String,
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_fields: Option<String>,
}

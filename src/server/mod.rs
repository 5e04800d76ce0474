//! The server: account registry plus an opaque-blob store.
//!
//! Nothing in this tree can decrypt a payload. The server authenticates
//! clients by auth-hash, stores sealed blobs verbatim, enforces version
//! monotonicity through compare-and-set, and verifies transport-integrity
//! hashes — all without plaintext knowledge.

pub mod adapter;
pub mod http;
pub mod service;
pub mod store;
pub mod token;

use std::path::PathBuf;

/// Everything needed to bring up a server instance.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub token_secret: String,
    pub token_ttl_secs: u64,
}

//! Foreground vault operations: create, read, update, delete.

pub mod service;

pub use service::{CreateOutcome, RecordSummary, VaultError, VaultService};

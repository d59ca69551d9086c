//! Domain entities and value types
//!
//! This module contains the core domain types for AttSync:
//! - Newtypes for validated keys, fingerprints and remote identifiers
//! - Snapshots of the local directory and the remote store
//! - The reconciliation diff
//! - Persisted sync state and the bounded history log
//! - Free-text asset notes shown in the rendered document
//! - Domain-specific error types

pub mod diff;
pub mod errors;
pub mod history;
pub mod newtypes;
pub mod notes;
pub mod snapshot;

// Re-export commonly used types
pub use diff::SyncDiff;
pub use errors::DomainError;
pub use history::{HistoryEntry, HistoryLog};
pub use newtypes::*;
pub use notes::Notes;
pub use snapshot::{LocalAsset, RemoteAttachmentRecord, Snapshot, StateSnapshot};

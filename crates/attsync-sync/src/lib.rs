//! AttSync Sync - Reconciliation engine
//!
//! Provides:
//! - Content fingerprinting and local directory scanning
//! - Pure snapshot reconciliation
//! - Bounded-concurrency execution with retry
//! - Atomic state persistence with bounded history
//! - Debounced change notification from the filesystem watcher
//!
//! ## Modules
//!
//! - [`engine`] - Sync cycle state machine and trigger coalescing
//! - [`executor`] - Per-kind worker pools for deletes, uploads and downloads
//! - [`fingerprint`] - SHA-256 content digests and the mtime cache
//! - [`notes`] - Notes file shown next to assets on the document
//! - [`notifier`] - Quiet-window debouncer that fires sync triggers
//! - [`patterns`] - Include/exclude glob matching
//! - [`reconciler`] - `reconcile(local, remote) -> SyncDiff`
//! - [`retry`] - Retry policy with exponential backoff and jitter
//! - [`scanner`] - Local snapshot production
//! - [`state`] - Persisted state snapshot and history
//! - [`watcher`] - `notify`-based filesystem watcher

pub mod engine;
pub mod executor;
pub mod fingerprint;
pub mod notes;
pub mod notifier;
pub mod patterns;
pub mod reconciler;
pub mod retry;
pub mod scanner;
pub mod state;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use attsync_core::domain::errors::DomainError;
use attsync_core::ports::RemoteError;
use thiserror::Error;

/// Errors that abort a whole sync cycle
///
/// Per-item failures never surface here; they are recorded as item
/// outcomes in the cycle report.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error occurred during file operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The target directory does not exist
    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    /// A remote call needed by the whole cycle failed
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Persisted state could not be read or written
    #[error("State error: {0}")]
    State(#[from] state::StateError),

    /// A domain-level error propagated from attsync-core
    #[error("Domain error: {0}")]
    DomainError(#[from] DomainError),

    /// The filesystem watcher could not be started
    #[error("Watcher error: {0}")]
    Watcher(String),
}

/// Lock a std mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

//! Remote store port (driven/secondary port)
//!
//! This module defines the interface to the remote attachment store and the
//! typed error taxonomy the sync engine uses to decide what to retry.
//!
//! ## Design Notes
//!
//! - Unlike most ports, methods return [`RemoteError`] rather than
//!   `anyhow::Result`: the executor branches on the error class (retry,
//!   abort the queue, treat as success) so adapters must classify.
//! - `upload` is create-or-replace by key and `delete` treats a missing id
//!   as success, so every mutation is safe to repeat.

use std::time::Duration;

use thiserror::Error;

use crate::domain::newtypes::{AssetKey, RemoteId};
use crate::domain::snapshot::RemoteAttachmentRecord;

// ============================================================================
// RemoteError
// ============================================================================

/// Errors returned by a remote store adapter
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Connection failure or dropped response
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// A server-side error occurred (5xx)
    #[error("Server error {status}: {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// Rate limit exceeded; the server may say how long to wait
    #[error("Too many requests, retry after {retry_after:?}")]
    RateLimited {
        /// Parsed `Retry-After` value, if the server sent one
        retry_after: Option<Duration>,
    },

    /// Edit conflict or lock held by a concurrent writer (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Credentials are missing, invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Credentials are valid but lack permission
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The request itself was rejected as malformed
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The target resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The response could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Transient failures that may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Network(_)
                | RemoteError::Timeout(_)
                | RemoteError::Server { .. }
                | RemoteError::RateLimited { .. }
                | RemoteError::Conflict(_)
        )
    }

    /// Authorization and malformed-request failures
    ///
    /// Every remaining request of the same kind would fail the same way, so
    /// the executor stops that kind's queue when it sees one.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RemoteError::Unauthorized(_) | RemoteError::Forbidden(_) | RemoteError::BadRequest(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }

    /// Server-provided wait hint, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RemoteError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

// ============================================================================
// IRemoteStore
// ============================================================================

/// Port trait for the remote attachment store
///
/// Implementations must be safe to share across the executor's worker
/// tasks. Adapters perform exactly one attempt per call; retrying is the
/// caller's job.
#[async_trait::async_trait]
pub trait IRemoteStore: Send + Sync {
    /// List every attachment currently held by the store
    async fn list(&self) -> Result<Vec<RemoteAttachmentRecord>, RemoteError>;

    /// Create or replace the attachment stored under `key`
    async fn upload(&self, key: &AssetKey, data: Vec<u8>)
        -> Result<RemoteAttachmentRecord, RemoteError>;

    /// Delete the attachment with the given id
    ///
    /// Adapters may return `NotFound`; callers treat it as success.
    async fn delete(&self, id: &RemoteId) -> Result<(), RemoteError>;

    /// Fetch the content of an attachment
    async fn download(&self, id: &RemoteId) -> Result<Vec<u8>, RemoteError>;

    /// Replace the derived document with `body`
    async fn publish_document(&self, title: &str, body: &str) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RemoteError::Network("reset".into()).is_transient());
        assert!(RemoteError::Timeout("30s".into()).is_transient());
        assert!(RemoteError::Server {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());
        assert!(RemoteError::RateLimited { retry_after: None }.is_transient());
        assert!(RemoteError::Conflict("locked".into()).is_transient());

        assert!(!RemoteError::Unauthorized("bad token".into()).is_transient());
        assert!(!RemoteError::NotFound("x".into()).is_transient());
        assert!(!RemoteError::InvalidResponse("x".into()).is_transient());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(RemoteError::Unauthorized("x".into()).is_fatal());
        assert!(RemoteError::Forbidden("x".into()).is_fatal());
        assert!(RemoteError::BadRequest("x".into()).is_fatal());
        assert!(!RemoteError::NotFound("x".into()).is_fatal());
        assert!(!RemoteError::Timeout("x".into()).is_fatal());
    }

    #[test]
    fn test_retry_after() {
        let err = RemoteError::RateLimited {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(RemoteError::Network("x".into()).retry_after(), None);
    }
}

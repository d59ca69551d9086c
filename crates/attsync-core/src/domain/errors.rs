//! Domain error types
//!
//! Errors raised when a domain value fails validation at construction time.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Asset key is empty, absolute, or escapes the target directory
    #[error("Invalid asset key: {0}")]
    InvalidKey(String),

    /// Fingerprint is not a 64-character hex SHA-256 digest
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// Remote identifier is empty or malformed
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

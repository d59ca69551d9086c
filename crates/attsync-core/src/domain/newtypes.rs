//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for asset keys, content
//! fingerprints and remote identifiers. Each newtype ensures data validity
//! at construction time, so the rest of the engine never re-checks them.

use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// AssetKey
// ============================================================================

/// Stable key identifying one asset in both snapshots
///
/// Keys use `/` as the separator regardless of platform. A key is never
/// empty, never absolute and never contains a `..` segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AssetKey(String);

impl AssetKey {
    /// Create a new AssetKey
    ///
    /// Backslashes are normalised to `/`.
    ///
    /// # Errors
    /// Returns error if the key is empty, absolute, or escapes its root
    pub fn new(key: String) -> Result<Self, DomainError> {
        let key = key.replace('\\', "/");

        if key.is_empty() {
            return Err(DomainError::InvalidKey("key cannot be empty".to_string()));
        }
        if key.starts_with('/') {
            return Err(DomainError::InvalidKey(format!("key must be relative: {key}")));
        }
        if key.split('/').any(|seg| seg == ".." || seg.is_empty()) {
            return Err(DomainError::InvalidKey(format!(
                "key contains an empty or parent segment: {key}"
            )));
        }

        Ok(Self(key))
    }

    /// Build a key from a path relative to the target directory
    ///
    /// # Errors
    /// Returns error if the path has non-normal components or is not UTF-8
    pub fn from_relative_path(path: &Path) -> Result<Self, DomainError> {
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(seg) => {
                    let seg = seg.to_str().ok_or_else(|| {
                        DomainError::InvalidKey(format!("non UTF-8 path: {}", path.display()))
                    })?;
                    segments.push(seg);
                }
                Component::CurDir => {}
                _ => {
                    return Err(DomainError::InvalidKey(format!(
                        "path must be relative and normalised: {}",
                        path.display()
                    )))
                }
            }
        }
        Self::new(segments.join("/"))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The last segment of the key
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl Display for AssetKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AssetKey {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for AssetKey {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<AssetKey> for String {
    fn from(key: AssetKey) -> Self {
        key.0
    }
}

// ============================================================================
// Fingerprint
// ============================================================================

/// Hex-encoded SHA-256 content digest
///
/// Stored lowercase; input of either case is accepted and normalised.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Length of a hex-encoded SHA-256 digest
    pub const HEX_LEN: usize = 64;

    /// Create a new Fingerprint
    ///
    /// # Errors
    /// Returns error if the value is not 64 hex characters
    pub fn new(value: String) -> Result<Self, DomainError> {
        if value.len() != Self::HEX_LEN {
            return Err(DomainError::InvalidFingerprint(format!(
                "expected {} hex characters, got {}",
                Self::HEX_LEN,
                value.len()
            )));
        }
        if !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::InvalidFingerprint(format!(
                "non-hex characters in {value}"
            )));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    /// Encode a raw 32-byte digest
    #[must_use]
    pub fn from_digest(digest: &[u8; 32]) -> Self {
        use std::fmt::Write;

        let mut hex = String::with_capacity(Self::HEX_LEN);
        for byte in digest {
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for log lines
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

// ============================================================================
// RemoteId
// ============================================================================

/// Identifier assigned by the remote store to one attachment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteId(String);

impl RemoteId {
    /// Create a new RemoteId
    ///
    /// # Errors
    /// Returns error if the ID is empty or contains whitespace or `/`
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidRemoteId(
                "Remote ID cannot be empty".to_string(),
            ));
        }

        if id.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(DomainError::InvalidRemoteId(format!(
                "Remote ID contains invalid characters: {id}"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemoteId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RemoteId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemoteId> for String {
    fn from(id: RemoteId) -> Self {
        id.0
    }
}

//! Content fingerprints
//!
//! A fingerprint is the SHA-256 digest of a file's bytes. It is the only
//! signal used to decide whether an asset changed; modification times are
//! used solely by [`FingerprintCache`] to skip re-hashing files that have
//! not been touched since the previous scan.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

use attsync_core::domain::Fingerprint;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

use crate::{lock, SyncError};

/// Read buffer size for streaming file hashes
const CHUNK_SIZE: usize = 64 * 1024;

/// Fingerprint an in-memory buffer
pub fn fingerprint_bytes(data: &[u8]) -> Fingerprint {
    let digest: [u8; 32] = Sha256::digest(data).into();
    Fingerprint::from_digest(&digest)
}

/// Fingerprint a file by streaming its content
///
/// # Errors
/// Returns [`SyncError::IoError`] if the file cannot be opened or read.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn fingerprint_file(path: &Path) -> Result<Fingerprint, SyncError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let digest: [u8; 32] = hasher.finalize().into();
    let fp = Fingerprint::from_digest(&digest);
    debug!(fingerprint = %fp.short(), "file hashed");
    Ok(fp)
}

// ============================================================================
// FingerprintCache
// ============================================================================

#[derive(Debug, Clone)]
struct CachedEntry {
    size: u64,
    modified: SystemTime,
    fingerprint: Fingerprint,
}

/// Remembers the fingerprint of each path together with its size and mtime
///
/// A lookup hits only when both size and mtime are unchanged. Files whose
/// filesystem reports no mtime are always re-hashed.
#[derive(Debug, Default)]
pub struct FingerprintCache {
    entries: Mutex<HashMap<PathBuf, CachedEntry>>,
}

impl FingerprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached fingerprint for `path` if its size and mtime still match
    pub fn lookup(&self, path: &Path, size: u64, modified: Option<SystemTime>) -> Option<Fingerprint> {
        let modified = modified?;
        let entries = lock(&self.entries);
        entries
            .get(path)
            .filter(|e| e.size == size && e.modified == modified)
            .map(|e| e.fingerprint.clone())
    }

    pub fn store(&self, path: PathBuf, size: u64, modified: Option<SystemTime>, fingerprint: Fingerprint) {
        let Some(modified) = modified else {
            return;
        };
        lock(&self.entries).insert(
            path,
            CachedEntry {
                size,
                modified,
                fingerprint,
            },
        );
    }

    /// Drop entries for paths that were not seen in the latest scan
    pub fn retain(&self, live: &HashSet<PathBuf>) {
        lock(&self.entries).retain(|path, _| live.contains(path));
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_known_digest() {
        // sha256("test")
        assert_eq!(
            fingerprint_bytes(b"test").as_str(),
            "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08"
        );
    }

    #[test]
    fn test_different_content_different_fingerprint() {
        assert_ne!(fingerprint_bytes(b"a"), fingerprint_bytes(b"b"));
        assert_eq!(fingerprint_bytes(b"same"), fingerprint_bytes(b"same"));
    }

    #[tokio::test]
    async fn test_file_matches_bytes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        // Larger than one chunk to exercise the streaming loop
        let data: Vec<u8> = (0..(CHUNK_SIZE * 2 + 17)).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(&path, &data).await.unwrap();

        let from_file = fingerprint_file(&path).await.unwrap();
        assert_eq!(from_file, fingerprint_bytes(&data));
    }

    #[tokio::test]
    async fn test_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.png");
        tokio::fs::write(&path, b"").await.unwrap();
        assert_eq!(fingerprint_file(&path).await.unwrap(), fingerprint_bytes(b""));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let result = fingerprint_file(Path::new("/nonexistent/file.png")).await;
        assert!(matches!(result, Err(SyncError::IoError(_))));
    }

    #[test]
    fn test_cache_hit_requires_same_size_and_mtime() {
        let cache = FingerprintCache::new();
        let path = PathBuf::from("/assets/a.png");
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let fp = fingerprint_bytes(b"a");

        cache.store(path.clone(), 10, Some(t0), fp.clone());
        assert_eq!(cache.lookup(&path, 10, Some(t0)), Some(fp));
        assert_eq!(cache.lookup(&path, 11, Some(t0)), None);
        assert_eq!(cache.lookup(&path, 10, Some(t0 + Duration::from_secs(1))), None);
        assert_eq!(cache.lookup(&path, 10, None), None);
    }

    #[test]
    fn test_cache_without_mtime_is_not_stored() {
        let cache = FingerprintCache::new();
        cache.store(PathBuf::from("/x"), 1, None, fingerprint_bytes(b"x"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_retain() {
        let cache = FingerprintCache::new();
        let t = Some(SystemTime::UNIX_EPOCH);
        cache.store(PathBuf::from("/a"), 1, t, fingerprint_bytes(b"a"));
        cache.store(PathBuf::from("/b"), 1, t, fingerprint_bytes(b"b"));

        let live: HashSet<PathBuf> = [PathBuf::from("/a")].into_iter().collect();
        cache.retain(&live);
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(Path::new("/a"), 1, t).is_some());
    }
}

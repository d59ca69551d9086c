//! Local directory scanner
//!
//! Produces the local [`Snapshot`] at the start of every cycle by walking
//! the target directory, filtering through [`FilePatterns`] and
//! fingerprinting each tracked file. Files whose size and mtime are
//! unchanged since the previous scan reuse their cached fingerprint.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use attsync_core::config::KeyMode;
use attsync_core::domain::{AssetKey, DomainError, LocalAsset, Snapshot};
use tracing::{debug, info, instrument, warn};

use crate::fingerprint::{fingerprint_file, FingerprintCache};
use crate::patterns::FilePatterns;
use crate::SyncError;

/// Outcome of one directory scan
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Fingerprints of every readable tracked file
    pub snapshot: Snapshot,
    /// Full details per key, used by the executor to find the file to upload
    pub assets: BTreeMap<AssetKey, LocalAsset>,
    /// Tracked files that exist but could not be read, with the error text
    pub unreadable: BTreeMap<AssetKey, String>,
    /// Paths that were skipped because no valid key could be derived
    pub skipped: Vec<(PathBuf, String)>,
}

impl ScanResult {
    /// Human-readable list of every per-file problem
    pub fn errors(&self) -> Vec<String> {
        self.unreadable
            .iter()
            .map(|(key, err)| format!("{key}: {err}"))
            .chain(
                self.skipped
                    .iter()
                    .map(|(path, err)| format!("{}: {err}", path.display())),
            )
            .collect()
    }
}

/// Walks the target directory and fingerprints tracked files
pub struct LocalScanner {
    root: PathBuf,
    patterns: FilePatterns,
    key_mode: KeyMode,
    cache: FingerprintCache,
}

impl LocalScanner {
    pub fn new(root: PathBuf, patterns: FilePatterns, key_mode: KeyMode) -> Self {
        Self {
            root,
            patterns,
            key_mode,
            cache: FingerprintCache::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn patterns(&self) -> &FilePatterns {
        &self.patterns
    }

    /// Derive the asset key for a path relative to the root
    pub fn key_for(&self, relative: &Path) -> Result<AssetKey, DomainError> {
        match self.key_mode {
            KeyMode::RelativePath => AssetKey::from_relative_path(relative),
            KeyMode::FileName => {
                let name = relative
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| DomainError::InvalidKey(relative.display().to_string()))?;
                AssetKey::new(name.to_string())
            }
        }
    }

    /// Whether an absolute path under the root would be tracked
    pub fn is_tracked(&self, path: &Path) -> bool {
        path.strip_prefix(&self.root)
            .ok()
            .map(relative_str)
            .is_some_and(|rel| self.patterns.matches(&rel))
    }

    /// Scan the target directory
    ///
    /// # Errors
    /// Returns [`SyncError::PathNotFound`] if the root is missing or not a
    /// directory, and [`SyncError::IoError`] if the root cannot be listed.
    /// Problems with individual files are reported in the result instead.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn scan(&self) -> Result<ScanResult, SyncError> {
        match tokio::fs::metadata(&self.root).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(SyncError::PathNotFound(self.root.clone())),
        }

        let mut result = ScanResult::default();
        let mut seen = HashSet::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if dir == self.root => return Err(err.into()),
                Err(err) => {
                    warn!(path = %dir.display(), error = %err, "Skipping unreadable directory");
                    result.skipped.push((dir, err.to_string()));
                    continue;
                }
            };

            let mut paths = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                paths.push(entry.path());
            }
            // Deterministic order so duplicate keys resolve the same way every scan
            paths.sort();

            for path in paths {
                let meta = match tokio::fs::metadata(&path).await {
                    Ok(meta) => meta,
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "Cannot stat entry");
                        continue;
                    }
                };

                if meta.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !meta.is_file() {
                    continue;
                }

                self.scan_file(path, &meta, &mut result, &mut seen).await;
            }
        }

        self.cache.retain(&seen);

        info!(
            tracked = result.snapshot.len(),
            unreadable = result.unreadable.len(),
            skipped = result.skipped.len(),
            "Local scan complete"
        );
        Ok(result)
    }

    async fn scan_file(
        &self,
        path: PathBuf,
        meta: &std::fs::Metadata,
        result: &mut ScanResult,
        seen: &mut HashSet<PathBuf>,
    ) {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return;
        };
        if !self.patterns.matches(&relative_str(relative)) {
            return;
        }

        let key = match self.key_for(relative) {
            Ok(key) => key,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Skipping file with invalid key");
                result.skipped.push((path, err.to_string()));
                return;
            }
        };

        let size = meta.len();
        let modified = meta.modified().ok();

        let fingerprint = match self.cache.lookup(&path, size, modified) {
            Some(fp) => {
                debug!(key = %key, "Fingerprint cache hit");
                fp
            }
            None => match fingerprint_file(&path).await {
                Ok(fp) => {
                    self.cache.store(path.clone(), size, modified, fp.clone());
                    fp
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "Cannot read tracked file, excluding it this cycle");
                    result.unreadable.insert(key, err.to_string());
                    return;
                }
            },
        };

        seen.insert(path.clone());

        if let Some(previous) = result.assets.get(&key) {
            warn!(
                key = %key,
                kept = %path.display(),
                dropped = %previous.path.display(),
                "Duplicate asset key, last scanned file wins"
            );
        }

        result.unreadable.remove(&key);
        result.snapshot.insert(key.clone(), fingerprint.clone());
        result.assets.insert(
            key.clone(),
            LocalAsset {
                key,
                path,
                fingerprint,
                size,
                modified,
            },
        );
    }
}

fn relative_str(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

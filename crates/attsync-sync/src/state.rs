//! Persisted sync state
//!
//! Two JSON files live in the state directory:
//!
//! - `state.json` - the [`StateSnapshot`] describing what the remote store
//!   holds after the last committed cycle
//! - `history.json` - the bounded list of [`HistoryEntry`] values, oldest first
//!
//! Both are replaced atomically: content is written to `<file>.tmp`, flushed,
//! then renamed over the target. A reader therefore sees either the old or
//! the new file, never a partial write. Callers serialize commits; the
//! store itself holds no lock.

use std::path::{Path, PathBuf};

use attsync_core::domain::{HistoryEntry, HistoryLog, StateSnapshot};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

/// Errors raised while reading or writing the state files
#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {}: {source}", path.display())]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything loaded from disk at the start of a cycle
#[derive(Debug, Clone, Default)]
pub struct PersistedState {
    pub snapshot: StateSnapshot,
    /// Oldest first
    pub history: Vec<HistoryEntry>,
    /// False when no usable state file was found (bootstrap path)
    pub exists: bool,
}

/// What [`StateStore::clear`] removes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    Cache,
    History,
    All,
}

/// JSON-file-backed state store
#[derive(Debug, Clone)]
pub struct StateStore {
    state_path: PathBuf,
    history_path: PathBuf,
    retention: usize,
}

impl StateStore {
    pub fn new(state_path: PathBuf, history_path: PathBuf, retention: usize) -> Self {
        Self {
            state_path,
            history_path,
            retention: retention.max(1),
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    /// Load the state snapshot and history
    ///
    /// A missing state file is not an error; it yields an empty snapshot
    /// with `exists == false`. A corrupt file is logged and treated the
    /// same way, which makes the next cycle do a full remote listing.
    #[instrument(skip(self), fields(path = %self.state_path.display()))]
    pub async fn load(&self) -> Result<PersistedState, StateError> {
        let snapshot: Option<StateSnapshot> = read_json(&self.state_path).await?;
        let history = self.history().await?;

        let state = match snapshot {
            Some(snapshot) => PersistedState {
                snapshot,
                history,
                exists: true,
            },
            None => PersistedState {
                snapshot: StateSnapshot::default(),
                history,
                exists: false,
            },
        };

        debug!(
            exists = state.exists,
            assets = state.snapshot.assets.len(),
            version = state.snapshot.version,
            "State loaded"
        );
        Ok(state)
    }

    /// Stored history, oldest first; empty if absent or unreadable
    pub async fn history(&self) -> Result<Vec<HistoryEntry>, StateError> {
        let entries: Option<Vec<HistoryEntry>> = read_json(&self.history_path).await?;
        Ok(HistoryLog::from_entries(entries.unwrap_or_default(), self.retention).into_vec())
    }

    /// Persist a new snapshot and append `entry` to the history
    ///
    /// Returns the retained history, oldest first.
    #[instrument(skip_all, fields(version = snapshot.version))]
    pub async fn commit(
        &self,
        snapshot: &StateSnapshot,
        entry: HistoryEntry,
    ) -> Result<Vec<HistoryEntry>, StateError> {
        let mut log = HistoryLog::from_entries(self.history().await?, self.retention);
        log.push(entry);
        let history = log.into_vec();

        write_json_atomic(&self.history_path, &history).await?;
        write_json_atomic(&self.state_path, snapshot).await?;

        info!(
            assets = snapshot.assets.len(),
            history = history.len(),
            "State committed"
        );
        Ok(history)
    }

    /// Remove persisted files
    pub async fn clear(&self, scope: ClearScope) -> Result<(), StateError> {
        if matches!(scope, ClearScope::Cache | ClearScope::All) {
            remove_if_exists(&self.state_path).await?;
        }
        if matches!(scope, ClearScope::History | ClearScope::All) {
            remove_if_exists(&self.history_path).await?;
        }
        info!(?scope, "Persisted state cleared");
        Ok(())
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StateError> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StateError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    match serde_json::from_slice(&content) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Ignoring corrupt state file");
            Ok(None)
        }
    }
}

/// Write `value` as pretty JSON via temp file + rename
async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StateError> {
    let io_err = |source: std::io::Error| StateError::Io {
        path: path.to_path_buf(),
        source,
    };

    let data = serde_json::to_vec_pretty(value).map_err(|source| StateError::Serialization {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    // Temporary file in the same directory so the rename stays on one filesystem
    let tmp_path = {
        let mut p = path.as_os_str().to_owned();
        p.push(".tmp");
        PathBuf::from(p)
    };

    let mut file = tokio::fs::File::create(&tmp_path).await.map_err(io_err)?;
    file.write_all(&data).await.map_err(io_err)?;
    file.sync_all().await.map_err(io_err)?;
    drop(file);

    tokio::fs::rename(&tmp_path, path).await.map_err(io_err)?;
    debug!(path = %path.display(), bytes = data.len(), "File replaced atomically");
    Ok(())
}

async fn remove_if_exists(path: &Path) -> Result<(), StateError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StateError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attsync_core::domain::{AssetKey, Fingerprint, RemoteId};
    use tempfile::TempDir;

    fn store(dir: &TempDir, retention: usize) -> StateStore {
        StateStore::new(
            dir.path().join("state.json"),
            dir.path().join("history.json"),
            retention,
        )
    }

    fn snapshot_with(key: &str, version: u64) -> StateSnapshot {
        let mut snap = StateSnapshot {
            version,
            ..Default::default()
        };
        snap.record_upload(
            AssetKey::new(key.to_string()).unwrap(),
            Fingerprint::new("c".repeat(64)).unwrap(),
            RemoteId::new("42".to_string()).unwrap(),
        );
        snap
    }

    #[tokio::test]
    async fn test_load_absent_is_empty() {
        let dir = TempDir::new().unwrap();
        let state = store(&dir, 5).load().await.unwrap();
        assert!(!state.exists);
        assert!(state.snapshot.assets.is_empty());
        assert!(state.history.is_empty());
    }

    #[tokio::test]
    async fn test_commit_then_load() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, 5);
        let snap = snapshot_with("a.png", 1);

        let history = s
            .commit(&snap, HistoryEntry::now("startup", 1, 0, 0, 0))
            .await
            .unwrap();
        assert_eq!(history.len(), 1);

        let loaded = s.load().await.unwrap();
        assert!(loaded.exists);
        assert_eq!(loaded.snapshot, snap);
        assert_eq!(loaded.history[0].reason, "startup");
    }

    #[tokio::test]
    async fn test_commit_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, 5);
        s.commit(&snapshot_with("a.png", 1), HistoryEntry::now("x", 0, 0, 0, 0))
            .await
            .unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().all(|n| !n.ends_with(".tmp")), "{names:?}");
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, 3);
        for i in 0..6 {
            s.commit(&snapshot_with("a.png", i), HistoryEntry::now("x", i as usize, 0, 0, 0))
                .await
                .unwrap();
        }
        let history = s.history().await.unwrap();
        let added: Vec<_> = history.iter().map(|e| e.added).collect();
        assert_eq!(added, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn test_corrupt_state_treated_as_absent() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("state.json"), b"{ not json").unwrap();
        let state = store(&dir, 5).load().await.unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn test_commit_creates_state_dir() {
        let dir = TempDir::new().unwrap();
        let s = StateStore::new(
            dir.path().join("nested/state.json"),
            dir.path().join("nested/history.json"),
            5,
        );
        s.commit(&StateSnapshot::default(), HistoryEntry::now("x", 0, 0, 0, 0))
            .await
            .unwrap();
        assert!(dir.path().join("nested/state.json").exists());
    }

    #[tokio::test]
    async fn test_clear_scopes() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir, 5);
        s.commit(&snapshot_with("a.png", 1), HistoryEntry::now("x", 0, 0, 0, 0))
            .await
            .unwrap();

        s.clear(ClearScope::Cache).await.unwrap();
        assert!(!s.state_path().exists());
        assert!(s.history_path().exists());

        s.clear(ClearScope::All).await.unwrap();
        assert!(!s.history_path().exists());

        // Clearing again is a no-op
        s.clear(ClearScope::All).await.unwrap();
    }
}

//! Filesystem watcher
//!
//! Wraps the `notify` crate to monitor the target directory, converting raw
//! OS events into [`ChangeEvent`] values. Only events for tracked asset
//! files are forwarded; directory events, access events and scratch files
//! never reach the channel.
//!
//! ## Architecture
//!
//! ```text
//! inotify / FSEvents / kqueue
//!       │
//!       ▼
//!  FileWatcher  ──→  mpsc::channel  ──→  ChangeNotifier  ──→  SyncEngine
//! ```

use std::path::{Path, PathBuf};

use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::patterns::is_scratch_file;
use crate::SyncError;

/// Capacity of the event channel between the OS callback and the notifier
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// ChangeEvent
// ============================================================================

/// A filesystem change affecting a tracked asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Renamed {
        /// The original path before the rename
        old: PathBuf,
        /// The new path after the rename
        new: PathBuf,
    },
}

impl ChangeEvent {
    /// Returns the primary path associated with this event
    ///
    /// For rename events, this returns the new (destination) path.
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created(p) => p,
            ChangeEvent::Modified(p) => p,
            ChangeEvent::Deleted(p) => p,
            ChangeEvent::Renamed { new, .. } => new,
        }
    }

    /// Every path touched by this event
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            ChangeEvent::Renamed { old, new } => vec![old.as_path(), new.as_path()],
            other => vec![other.path()],
        }
    }
}

// ============================================================================
// FileWatcher
// ============================================================================

/// Watches the target directory using the OS-native mechanism
///
/// The filter decides which absolute paths are tracked; a rename passes if
/// either side is tracked. Dropping the watcher stops event delivery and
/// closes the channel.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    root: Option<PathBuf>,
    /// Directories watched for single files outside the root
    file_dirs: Vec<PathBuf>,
}

impl FileWatcher {
    /// Creates a watcher and the receiver its events are delivered on
    ///
    /// # Errors
    /// Returns [`SyncError::Watcher`] if the OS watcher cannot be created
    pub fn new<F>(filter: F) -> Result<(Self, mpsc::Receiver<ChangeEvent>), SyncError>
    where
        F: Fn(&Path) -> bool + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<ChangeEvent>(EVENT_CHANNEL_CAPACITY);

        let watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    let Some(change) = map_notify_event(&event) else {
                        return;
                    };
                    if !is_relevant(&change, &filter) {
                        debug!(event = ?change, "Ignoring untracked path");
                        return;
                    }
                    // notify invokes this callback on its own thread, outside the runtime
                    if let Err(e) = tx.blocking_send(change) {
                        warn!(error = %e, "Failed to send change event (receiver dropped)");
                    }
                }
                Err(err) => {
                    error!(error = %err, "File watcher error");
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| SyncError::Watcher(format!("failed to create file watcher: {e}")))?;

        Ok((
            Self {
                watcher,
                root: None,
                file_dirs: Vec::new(),
            },
            rx,
        ))
    }

    /// Starts watching `path` recursively
    ///
    /// # Errors
    /// Returns [`SyncError::PathNotFound`] if the directory does not exist
    /// and [`SyncError::Watcher`] if the OS refuses the watch (for example
    /// when the inotify watch limit is reached).
    pub fn watch(&mut self, path: &Path) -> Result<(), SyncError> {
        if !path.is_dir() {
            return Err(SyncError::PathNotFound(path.to_path_buf()));
        }

        info!(path = %path.display(), "Starting recursive watch");
        self.watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|e| SyncError::Watcher(format!("failed to watch {}: {e}", path.display())))?;
        self.root = Some(path.to_path_buf());
        Ok(())
    }

    /// Also deliver events for the single file `path`
    ///
    /// A file under the watched root is already covered. Otherwise its
    /// parent directory is watched non-recursively, so replacing the file
    /// through a rename is seen too. Call [`watch`](Self::watch) first.
    pub fn watch_file(&mut self, path: &Path) -> Result<(), SyncError> {
        if self.root.as_deref().is_some_and(|root| path.starts_with(root)) {
            debug!(path = %path.display(), "File already under watched root");
            return Ok(());
        }
        let Some(dir) = path.parent().filter(|dir| dir.is_dir()) else {
            return Err(SyncError::PathNotFound(path.to_path_buf()));
        };
        if self.file_dirs.iter().any(|watched| watched == dir) {
            return Ok(());
        }

        info!(path = %path.display(), "Watching file");
        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| SyncError::Watcher(format!("failed to watch {}: {e}", dir.display())))?;
        self.file_dirs.push(dir.to_path_buf());
        Ok(())
    }

    /// Stops watching the current root and any watched files
    pub fn unwatch(&mut self) -> Result<(), SyncError> {
        for dir in self.file_dirs.drain(..) {
            if let Err(e) = self.watcher.unwatch(&dir) {
                warn!(path = %dir.display(), error = %e, "Failed to unwatch file directory");
            }
        }
        let Some(root) = self.root.take() else {
            return Ok(());
        };
        info!(path = %root.display(), "Stopping watch");
        self.watcher
            .unwatch(&root)
            .map_err(|e| SyncError::Watcher(format!("failed to unwatch {}: {e}", root.display())))
    }

    /// The directory currently being watched
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Parent directories watched on behalf of [`watch_file`](Self::watch_file)
    pub fn file_dirs(&self) -> &[PathBuf] {
        &self.file_dirs
    }
}

fn is_relevant<F: Fn(&Path) -> bool>(change: &ChangeEvent, filter: &F) -> bool {
    change.paths().into_iter().any(|p| {
        let scratch = p
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_scratch_file);
        !scratch && filter(p)
    })
}

// ============================================================================
// Event mapping - notify::Event → ChangeEvent
// ============================================================================

/// Converts a `notify::Event` into a [`ChangeEvent`]
///
/// - `Create(File | Any | Other)` -> `Created`
/// - `Modify(Data(*))` and other content modifications -> `Modified`
/// - `Modify(Name(Both))` with 2 paths -> `Renamed`
/// - `Modify(Name(From))` -> `Deleted`, `Modify(Name(To))` -> `Created`
/// - `Remove(File | Any | Other)` -> `Deleted`
///
/// Folder events, metadata-only changes and access events yield `None`.
fn map_notify_event(event: &notify::Event) -> Option<ChangeEvent> {
    let paths = &event.paths;

    match &event.kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => None,

        EventKind::Create(_) => Some(ChangeEvent::Created(paths.first()?.clone())),

        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if paths.len() >= 2 {
                Some(ChangeEvent::Renamed {
                    old: paths[0].clone(),
                    new: paths[1].clone(),
                })
            } else {
                Some(ChangeEvent::Modified(paths.first()?.clone()))
            }
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            Some(ChangeEvent::Deleted(paths.first()?.clone()))
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            Some(ChangeEvent::Created(paths.first()?.clone()))
        }

        // Permission or timestamp changes do not alter content
        EventKind::Modify(ModifyKind::Metadata(_)) => None,

        EventKind::Modify(_) => Some(ChangeEvent::Modified(paths.first()?.clone())),

        EventKind::Remove(_) => Some(ChangeEvent::Deleted(paths.first()?.clone())),

        _ => {
            debug!(kind = ?event.kind, "Ignoring event kind");
            None
        }
    }
}

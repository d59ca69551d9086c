//! Notes file loading
//!
//! Reads the YAML notes file that annotates assets on the rendered document.
//! A missing file means no notes. A file that fails to read or parse keeps
//! the last good notes so a half-saved edit never blanks the page.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use attsync_core::domain::Notes;
use tracing::{debug, warn};

use crate::lock;

/// Notes file on disk plus the last notes parsed from it
#[derive(Debug)]
pub struct NotesFile {
    path: PathBuf,
    current: Mutex<Notes>,
}

impl NotesFile {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            current: Mutex::new(Notes::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `path` refers to this notes file
    pub fn matches(&self, path: &Path) -> bool {
        path == self.path
    }

    /// Re-read the file and return the notes to render with
    pub async fn load(&self) -> Notes {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => match Notes::from_yaml_str(&content) {
                Ok(notes) => {
                    debug!(path = %self.path.display(), count = notes.len(), "Loaded notes");
                    *lock(&self.current) = notes.clone();
                    notes
                }
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Notes file is not a valid YAML map, keeping previous notes"
                    );
                    lock(&self.current).clone()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Notes file missing");
                *lock(&self.current) = Notes::new();
                Notes::new()
            }
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read notes file, keeping previous notes"
                );
                lock(&self.current).clone()
            }
        }
    }
}

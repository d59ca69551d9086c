//! Debounced change notification
//!
//! The [`ChangeNotifier`] turns a stream of [`ChangeEvent`]s into calls to a
//! [`ChangeHandler`] once the directory has been quiet for the debounce
//! window. It keeps a single pending deadline: every event pushes the
//! deadline out by the full window, so a burst of saves produces one call.
//!
//! The handler runs on a spawned task and is never invoked twice at the
//! same time. Events arriving while it runs are collected into the next
//! batch; if that batch settles before the handler returns, it fires as
//! soon as the handler finishes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::watcher::ChangeEvent;

// ============================================================================
// ChangeBatch / PendingChanges
// ============================================================================

/// The settled changes handed to a [`ChangeHandler`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    events: Vec<ChangeEvent>,
}

impl ChangeBatch {
    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }

    pub fn paths(&self) -> Vec<&Path> {
        self.events.iter().map(ChangeEvent::path).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Changes collected since the last firing, latest event per path
#[derive(Debug, Default)]
pub struct PendingChanges {
    by_path: HashMap<PathBuf, ChangeEvent>,
}

impl PendingChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ChangeEvent) {
        debug!(event = ?event, "Enqueuing change event");
        self.by_path.insert(event.path().to_path_buf(), event);
    }

    /// Drain everything into a batch ordered by path
    pub fn take(&mut self) -> ChangeBatch {
        let mut entries: Vec<_> = self.by_path.drain().collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        ChangeBatch {
            events: entries.into_iter().map(|(_, event)| event).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

// ============================================================================
// ChangeHandler
// ============================================================================

/// Receives settled change batches
#[async_trait]
pub trait ChangeHandler: Send + Sync {
    async fn on_changes(&self, batch: ChangeBatch);
}

// ============================================================================
// ChangeNotifier
// ============================================================================

/// Quiet-window debouncer between the watcher and the sync engine
#[derive(Debug, Clone, Copy)]
pub struct ChangeNotifier {
    debounce: Duration,
}

impl ChangeNotifier {
    pub fn new(debounce: Duration) -> Self {
        Self { debounce }
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    /// Run until `shutdown` is cancelled or the event channel closes
    ///
    /// When the channel closes, pending changes are flushed once. On
    /// shutdown, pending changes are dropped but an in-flight handler is
    /// awaited before returning.
    pub async fn run(
        self,
        mut rx: mpsc::Receiver<ChangeEvent>,
        handler: Arc<dyn ChangeHandler>,
        shutdown: CancellationToken,
    ) {
        let mut pending = PendingChanges::new();
        let mut deadline: Option<Instant> = None;
        // The window settled while the handler was still busy
        let mut ready = false;
        let mut in_flight: Option<JoinHandle<()>> = None;
        let mut channel_open = true;

        info!(debounce_ms = self.debounce.as_millis() as u64, "Change notifier started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    if !pending.is_empty() {
                        debug!(dropped = pending.len(), "Shutdown with unsettled changes");
                    }
                    break;
                }

                joined = wait_in_flight(&mut in_flight) => {
                    in_flight = None;
                    if let Err(e) = joined {
                        error!(error = %e, "Change handler task failed");
                    }
                    if ready {
                        ready = false;
                        in_flight = Some(fire(&mut pending, &handler));
                    }
                }

                event = rx.recv(), if channel_open => match event {
                    Some(event) => {
                        pending.push(event);
                        deadline = Some(Instant::now() + self.debounce);
                        ready = false;
                    }
                    None => {
                        debug!("Event channel closed, flushing pending changes");
                        channel_open = false;
                        deadline = None;
                        if !pending.is_empty() {
                            if in_flight.is_some() {
                                ready = true;
                            } else {
                                in_flight = Some(fire(&mut pending, &handler));
                            }
                        }
                    }
                },

                _ = sleep_until(deadline) => {
                    deadline = None;
                    if pending.is_empty() {
                        continue;
                    }
                    if in_flight.is_some() {
                        debug!(pending = pending.len(), "Window settled while handler busy, deferring");
                        ready = true;
                    } else {
                        in_flight = Some(fire(&mut pending, &handler));
                    }
                }
            }

            if !channel_open && in_flight.is_none() && !ready {
                break;
            }
        }

        if let Some(handle) = in_flight.take() {
            debug!("Waiting for in-flight change handler");
            if let Err(e) = handle.await {
                error!(error = %e, "Change handler task failed");
            }
        }

        info!("Change notifier stopped");
    }
}

fn fire(pending: &mut PendingChanges, handler: &Arc<dyn ChangeHandler>) -> JoinHandle<()> {
    let batch = pending.take();
    info!(changes = batch.len(), "Changes settled, notifying handler");
    let handler = Arc::clone(handler);
    tokio::spawn(async move { handler.on_changes(batch).await })
}

async fn wait_in_flight(handle: &mut Option<JoinHandle<()>>) -> Result<(), JoinError> {
    match handle {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

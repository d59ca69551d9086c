//! Sync cycle orchestration
//!
//! The [`SyncEngine`] runs one reconciliation cycle at a time:
//!
//! ```text
//! Idle → ScanningRemote → ScanningLocal → Reconciling → Executing
//!      → Persisting → Rendering → Idle
//! ```
//!
//! 1. **ScanningRemote**: reuse the persisted snapshot, or list the remote
//!    store on a full trigger (or when no state exists yet)
//! 2. **ScanningLocal**: fingerprint the target directory
//! 3. **Reconciling**: diff local against remote; a dry run stops here
//! 4. **Executing**: deletes, then uploads, through the [`Executor`]
//! 5. **Persisting**: commit the snapshot, changed only where an operation
//!    succeeded, and append a history entry
//! 6. **Rendering**: classify the committed keys, render and publish the
//!    derived document
//!
//! An incremental trigger whose deletes lack a persisted remote id lists
//! the remote store before executing. A trigger raised by a notes file edit
//! re-renders even when the diff is empty.
//!
//! Once the shutdown token is cancelled no further queued cycle starts; the
//! running cycle always finishes.
//! Per-item failures are recorded in the [`SyncReport`]; only failures that
//! make the cycle unsafe (listing, local scan, persisted state unreadable)
//! abort it, and they do so before any destructive operation.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use attsync_core::domain::{AssetKey, HistoryEntry, Notes, Snapshot, StateSnapshot, SyncDiff};
use attsync_core::ports::{IDocumentRenderer, IRemoteStore};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::executor::{
    ConcurrencyLimits, DeleteOp, ExecutionPlan, Executor, ItemOutcome, OpKind, Outcome, UploadOp,
};
use crate::notes::NotesFile;
use crate::notifier::{ChangeBatch, ChangeHandler};
use crate::reconciler::reconcile;
use crate::retry::RetryPolicy;
use crate::scanner::{LocalScanner, ScanResult};
use crate::state::StateStore;
use crate::watcher::ChangeEvent;
use crate::{lock, SyncError};

// ============================================================================
// EngineState
// ============================================================================

/// Phase of the current cycle, observable through [`SyncEngine::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Idle,
    ScanningRemote,
    ScanningLocal,
    Reconciling,
    Executing,
    Persisting,
    Rendering,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngineState::Idle => "idle",
            EngineState::ScanningRemote => "scanning remote",
            EngineState::ScanningLocal => "scanning local",
            EngineState::Reconciling => "reconciling",
            EngineState::Executing => "executing",
            EngineState::Persisting => "persisting",
            EngineState::Rendering => "rendering",
        };
        f.write_str(s)
    }
}

// ============================================================================
// SyncTrigger
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// List the remote store instead of trusting persisted state
    Full,
    /// Reuse persisted state as the remote snapshot
    Incremental,
}

/// Why and how a cycle should run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTrigger {
    pub mode: TriggerMode,
    pub reason: String,
    pub dry_run: bool,
    /// Re-render the document even if nothing needs syncing
    pub redraw: bool,
}

impl SyncTrigger {
    pub fn full(reason: impl Into<String>) -> Self {
        Self {
            mode: TriggerMode::Full,
            reason: reason.into(),
            dry_run: false,
            redraw: false,
        }
    }

    pub fn incremental(reason: impl Into<String>) -> Self {
        Self {
            mode: TriggerMode::Incremental,
            reason: reason.into(),
            dry_run: false,
            redraw: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn redraw(mut self, redraw: bool) -> Self {
        self.redraw = redraw;
        self
    }

    /// Combine two pending triggers into one
    ///
    /// Full wins over incremental and distinct reasons are joined. The
    /// result is a dry run only if both were, and redraws if either did.
    pub fn merge(self, other: SyncTrigger) -> SyncTrigger {
        let mode = if self.mode == TriggerMode::Full || other.mode == TriggerMode::Full {
            TriggerMode::Full
        } else {
            TriggerMode::Incremental
        };
        let reason = if self.reason == other.reason {
            self.reason
        } else {
            format!("{}; {}", self.reason, other.reason)
        };
        SyncTrigger {
            mode,
            reason,
            dry_run: self.dry_run && other.dry_run,
            redraw: self.redraw || other.redraw,
        }
    }
}

// ============================================================================
// SyncReport
// ============================================================================

/// Summary of one cycle, produced even under partial failure
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub reason: String,
    pub mode: TriggerMode,
    pub dry_run: bool,
    pub diff: SyncDiff,
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
    pub skipped: usize,
    pub outcomes: Vec<ItemOutcome>,
    /// Local files that could not be read or keyed this cycle
    pub scan_errors: Vec<String>,
    /// Non-item problems: unfetchable remote content, commit failure
    pub errors: Vec<String>,
    pub committed: bool,
    pub rendered: bool,
    pub render_error: Option<String>,
    pub duration_ms: u64,
}

impl SyncReport {
    fn new(trigger: &SyncTrigger) -> Self {
        Self {
            reason: trigger.reason.clone(),
            mode: trigger.mode,
            dry_run: trigger.dry_run,
            diff: SyncDiff::default(),
            added: 0,
            updated: 0,
            deleted: 0,
            failed: 0,
            skipped: 0,
            outcomes: Vec::new(),
            scan_errors: Vec::new(),
            errors: Vec::new(),
            committed: false,
            rendered: false,
            render_error: None,
            duration_ms: 0,
        }
    }

    /// Whether every planned operation succeeded and nothing else went wrong
    pub fn is_clean(&self) -> bool {
        self.failed == 0
            && self.skipped == 0
            && self.scan_errors.is_empty()
            && self.errors.is_empty()
            && self.render_error.is_none()
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

pub struct SyncEngine {
    remote: Arc<dyn IRemoteStore>,
    renderer: Arc<dyn IDocumentRenderer>,
    store: StateStore,
    scanner: LocalScanner,
    executor: Executor,
    retry: RetryPolicy,
    /// Held for the whole of a cycle
    cycle_lock: tokio::sync::Mutex<()>,
    /// At most one trigger waits behind the running cycle
    queued: Mutex<Option<SyncTrigger>>,
    state_tx: watch::Sender<EngineState>,
    cycles: AtomicU64,
    notes: Option<NotesFile>,
    /// Stops queued cycles from starting
    shutdown: CancellationToken,
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn IRemoteStore>,
        renderer: Arc<dyn IDocumentRenderer>,
        store: StateStore,
        scanner: LocalScanner,
        limits: ConcurrencyLimits,
        retry: RetryPolicy,
    ) -> Self {
        let executor = Executor::new(Arc::clone(&remote), limits, retry.clone());
        let (state_tx, _) = watch::channel(EngineState::Idle);
        Self {
            remote,
            renderer,
            store,
            scanner,
            executor,
            retry,
            cycle_lock: tokio::sync::Mutex::new(()),
            queued: Mutex::new(None),
            state_tx,
            cycles: AtomicU64::new(0),
            notes: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Render notes from `path` next to the assets
    pub fn with_notes(mut self, path: PathBuf) -> Self {
        self.notes = Some(NotesFile::new(path));
        self
    }

    /// Stop draining queued triggers once `token` is cancelled
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn is_notes_file(&self, path: &Path) -> bool {
        self.notes.as_ref().is_some_and(|notes| notes.matches(path))
    }

    /// Trigger waiting behind the running cycle, if any
    pub fn queued_trigger(&self) -> Option<SyncTrigger> {
        lock(&self.queued).clone()
    }

    pub fn state(&self) -> EngineState {
        *self.state_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<EngineState> {
        self.state_tx.subscribe()
    }

    /// Number of cycles started since construction
    pub fn cycle_count(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn scanner(&self) -> &LocalScanner {
        &self.scanner
    }

    /// Run one cycle, waiting for any running cycle to finish first
    ///
    /// Triggers queued meanwhile stay queued until the next [`trigger`](Self::trigger).
    pub async fn run_once(&self, trigger: SyncTrigger) -> Result<SyncReport, SyncError> {
        let _guard = self.cycle_lock.lock().await;
        self.run_cycle(trigger).await
    }

    /// Request a cycle without waiting behind a running one
    ///
    /// If a cycle is running, `trigger` is merged into the queued trigger
    /// and `Ok(None)` is returned; the running caller picks it up when its
    /// cycle ends. Otherwise this call runs cycles until the queue is empty
    /// and returns the result of the last one.
    pub async fn trigger(&self, trigger: SyncTrigger) -> Result<Option<SyncReport>, SyncError> {
        {
            let mut queued = lock(&self.queued);
            let merged = match queued.take() {
                Some(pending) => pending.merge(trigger),
                None => trigger,
            };
            *queued = Some(merged);
        }

        let mut last: Option<Result<SyncReport, SyncError>> = None;
        loop {
            let Ok(guard) = self.cycle_lock.try_lock() else {
                debug!("Cycle in progress, trigger queued");
                break;
            };

            let next = lock(&self.queued).take();
            if let Some(next) = next {
                if self.shutdown.is_cancelled() {
                    info!(reason = %next.reason, "Shutdown requested, not starting queued cycle");
                    let mut queued = lock(&self.queued);
                    let kept = match queued.take() {
                        Some(later) => next.merge(later),
                        None => next,
                    };
                    *queued = Some(kept);
                    drop(queued);
                    drop(guard);
                    break;
                }
                last = Some(self.run_cycle(next).await);
                drop(guard);
                continue;
            }
            drop(guard);

            // A trigger queued between the take and the unlock saw the lock
            // held and returned; pick it up here.
            if lock(&self.queued).is_none() {
                break;
            }
        }

        last.transpose()
    }

    fn set_state(&self, state: EngineState) {
        self.state_tx.send_replace(state);
    }

    async fn run_cycle(&self, trigger: SyncTrigger) -> Result<SyncReport, SyncError> {
        self.cycles.fetch_add(1, Ordering::SeqCst);
        let result = self.cycle(trigger).await;
        self.set_state(EngineState::Idle);
        if let Err(e) = &result {
            error!(error = %e, "Sync cycle aborted");
        }
        result
    }

    #[instrument(skip_all, fields(reason = %trigger.reason, mode = ?trigger.mode, dry_run = trigger.dry_run, redraw = trigger.redraw))]
    async fn cycle(&self, trigger: SyncTrigger) -> Result<SyncReport, SyncError> {
        let start = Instant::now();
        let mut report = SyncReport::new(&trigger);
        info!("Starting sync cycle");

        let persisted = self.store.load().await?;

        // ScanningRemote
        self.set_state(EngineState::ScanningRemote);
        let full = trigger.mode == TriggerMode::Full || !persisted.exists;
        let prior_version = persisted.snapshot.version;
        let mut base = if full {
            self.list_remote(&mut report).await?
        } else {
            persisted.snapshot
        };
        base.version = prior_version;

        // ScanningLocal
        self.set_state(EngineState::ScanningLocal);
        let scan = self.scanner.scan().await?;
        report.scan_errors = scan.errors();

        // Reconciling
        self.set_state(EngineState::Reconciling);
        let mut diff = reconcile_scan(&scan, &base.assets);
        if !full && diff.to_delete.iter().any(|key| base.id_for(key).is_none()) {
            info!("Persisted state lacks remote ids for pending deletes, listing remote");
            self.set_state(EngineState::ScanningRemote);
            base = self.list_remote(&mut report).await?;
            base.version = prior_version;
            self.set_state(EngineState::Reconciling);
            diff = reconcile_scan(&scan, &base.assets);
        }
        report.diff = diff.clone();
        info!(summary = %diff.summary(), "Reconciled");

        if trigger.dry_run {
            report.duration_ms = start.elapsed().as_millis() as u64;
            info!(summary = %diff.summary(), "Dry run, no changes applied");
            return Ok(report);
        }
        if !diff.has_changes() && trigger.mode == TriggerMode::Incremental {
            if trigger.redraw {
                self.refresh_document(&base, &persisted.history, &mut report).await;
            }
            report.duration_ms = start.elapsed().as_millis() as u64;
            debug!(rendered = report.rendered, "No changes");
            return Ok(report);
        }

        // Executing
        self.set_state(EngineState::Executing);
        let plan = build_plan(&diff, &scan, &base);
        let execution = self.executor.execute(plan).await;

        report.added = execution.succeeded(OpKind::Add);
        report.updated = execution.succeeded(OpKind::Update);
        report.deleted = execution.succeeded(OpKind::Delete);
        report.failed = execution.failed();
        report.skipped = execution.skipped();

        // Persisting
        self.set_state(EngineState::Persisting);
        let next = apply_outcomes(&base, &execution.outcomes);
        report.outcomes = execution.outcomes;

        let entry = HistoryEntry::now(
            trigger.reason.clone(),
            report.added,
            report.updated,
            report.deleted,
            report.failed,
        )
        .with_skipped(report.skipped);
        let history = match self.store.commit(&next, entry).await {
            Ok(history) => {
                report.committed = true;
                Some(history)
            }
            Err(e) => {
                error!(error = %e, "Failed to commit sync state");
                report.errors.push(format!("state commit failed: {e}"));
                None
            }
        };

        // Rendering
        if let Some(history) = history {
            self.refresh_document(&next, &history, &mut report).await;
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            added = report.added,
            updated = report.updated,
            deleted = report.deleted,
            failed = report.failed,
            skipped = report.skipped,
            duration_ms = report.duration_ms,
            "Sync cycle complete"
        );
        Ok(report)
    }

    /// Full remote listing, filtered to tracked keys and fingerprinted
    async fn list_remote(&self, report: &mut SyncReport) -> Result<StateSnapshot, SyncError> {
        let records = self
            .retry
            .run("list", || self.remote.list())
            .await
            .map_err(|e| SyncError::Remote(e.error))?;
        let total = records.len();

        let patterns = self.scanner.patterns();
        let tracked: Vec<_> = records
            .into_iter()
            .filter(|r| patterns.matches(r.key.as_str()))
            .collect();
        debug!(total, tracked = tracked.len(), "Remote listing");

        let fetched = self.executor.fetch_fingerprints(tracked).await;
        for (key, error) in &fetched.failures {
            report
                .errors
                .push(format!("{key}: cannot fingerprint remote copy: {error}"));
        }

        Ok(StateSnapshot::from_records(&fetched.records))
    }

    async fn refresh_document(
        &self,
        snapshot: &StateSnapshot,
        history: &[HistoryEntry],
        report: &mut SyncReport,
    ) {
        self.set_state(EngineState::Rendering);
        match self.render(snapshot, history).await {
            Ok(()) => report.rendered = true,
            Err(e) => {
                warn!(error = %e, "Document refresh failed");
                report.render_error = Some(e);
            }
        }
    }

    async fn render(
        &self,
        snapshot: &StateSnapshot,
        history: &[HistoryEntry],
    ) -> Result<(), String> {
        let keys: Vec<AssetKey> = snapshot.assets.keys().cloned().collect();
        let categories = self.renderer.classify(&keys);
        let newest_first: Vec<HistoryEntry> = history.iter().rev().cloned().collect();
        let notes = match &self.notes {
            Some(notes) => notes.load().await,
            None => Notes::new(),
        };
        let body = self.renderer.render(&categories, &newest_first, &notes);
        let title = self.renderer.title();

        self.retry
            .run("publish", || self.remote.publish_document(&title, &body))
            .await
            .map_err(|e| e.to_string())?;
        debug!(title = %title, sections = categories.sections().len(), "Document published");
        Ok(())
    }
}

/// Reconcile, keeping unreadable local files out of the delete set
fn reconcile_scan(scan: &ScanResult, remote: &Snapshot) -> SyncDiff {
    let mut diff = reconcile(&scan.snapshot, remote);
    for key in scan.unreadable.keys() {
        if diff.to_delete.remove(key) {
            debug!(key = %key, "Unreadable locally, not deleting remote copy");
        }
    }
    diff
}

fn build_plan(diff: &SyncDiff, scan: &ScanResult, base: &StateSnapshot) -> ExecutionPlan {
    let deletes = diff
        .to_delete
        .iter()
        .map(|key| DeleteOp {
            key: key.clone(),
            id: base.id_for(key).cloned(),
        })
        .collect();

    let uploads = diff
        .to_add
        .iter()
        .map(|key| (key, OpKind::Add))
        .chain(diff.to_update.iter().map(|key| (key, OpKind::Update)))
        .filter_map(|(key, kind)| {
            scan.assets.get(key).map(|asset| UploadOp {
                key: key.clone(),
                path: asset.path.clone(),
                kind,
            })
        })
        .collect();

    ExecutionPlan { deletes, uploads }
}

/// Next snapshot: `base` changed only where an operation succeeded
fn apply_outcomes(base: &StateSnapshot, outcomes: &[ItemOutcome]) -> StateSnapshot {
    let mut next = base.clone();
    for item in outcomes {
        match (&item.kind, &item.outcome) {
            (OpKind::Delete, Outcome::Succeeded { .. }) => next.record_delete(&item.key),
            (
                OpKind::Add | OpKind::Update,
                Outcome::Succeeded {
                    record: Some(record),
                    fingerprint: Some(fingerprint),
                },
            ) => next.record_upload(item.key.clone(), fingerprint.clone(), record.id.clone()),
            _ => {}
        }
    }
    next.version = base.version + 1;
    next
}

#[async_trait]
impl ChangeHandler for SyncEngine {
    async fn on_changes(&self, batch: ChangeBatch) {
        let redraw = batch
            .events()
            .iter()
            .flat_map(ChangeEvent::paths)
            .any(|path| self.is_notes_file(path));
        let trigger =
            SyncTrigger::incremental(format!("{} file change(s)", batch.len())).redraw(redraw);
        match self.trigger(trigger).await {
            Ok(Some(report)) => debug!(summary = %report.diff.summary(), "Change-triggered cycle done"),
            Ok(None) => debug!("Change trigger queued behind running cycle"),
            Err(e) => error!(error = %e, "Change-triggered cycle failed"),
        }
    }
}

//! Plan execution with bounded concurrency
//!
//! The [`Executor`] runs an [`ExecutionPlan`] against the remote store. Each
//! operation kind has its own pool, sized from configuration and bounded by
//! a `tokio::sync::Semaphore`, with work spawned onto a `JoinSet`:
//!
//! - **delete** (default 1, i.e. serialized)
//! - **upload** (default 4) for both adds and updates
//! - **download** (default 8) for fingerprinting remote content
//!
//! The whole delete phase finishes before any upload starts. Every item
//! yields exactly one [`Outcome`]; a failing item never cancels another,
//! except that an authorization or malformed-request error stops the
//! remaining queue of its own kind.

use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use attsync_core::config::ConcurrencyConfig;
use attsync_core::domain::{AssetKey, Fingerprint, RemoteAttachmentRecord, RemoteId};
use attsync_core::ports::{IRemoteStore, RemoteError};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::fingerprint::fingerprint_bytes;
use crate::retry::{RetryError, RetryPolicy};

// ============================================================================
// Plan
// ============================================================================

/// Which operation an item belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Delete,
    Add,
    Update,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Delete => write!(f, "delete"),
            OpKind::Add => write!(f, "add"),
            OpKind::Update => write!(f, "update"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOp {
    pub key: AssetKey,
    /// Remote id from the persisted state or listing; `None` if unknown
    pub id: Option<RemoteId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOp {
    pub key: AssetKey,
    pub path: PathBuf,
    /// `Add` or `Update`
    pub kind: OpKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub deletes: Vec<DeleteOp>,
    pub uploads: Vec<UploadOp>,
}

impl ExecutionPlan {
    pub fn len(&self) -> usize {
        self.deletes.len() + self.uploads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded {
        /// What the store returned for an upload; `None` for deletes
        record: Option<RemoteAttachmentRecord>,
        /// Fingerprint of the bytes actually uploaded
        fingerprint: Option<Fingerprint>,
    },
    Failed {
        attempts: u32,
        error: String,
    },
    Skipped {
        reason: String,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub key: AssetKey,
    pub kind: OpKind,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    /// Deletes first, then uploads; ordered by key within each phase
    pub outcomes: Vec<ItemOutcome>,
}

impl ExecutionReport {
    pub fn succeeded(&self, kind: OpKind) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.kind == kind && o.outcome.is_success())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Failed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Skipped { .. }))
            .count()
    }

    pub fn get(&self, key: &AssetKey) -> Option<&ItemOutcome> {
        self.outcomes.iter().find(|o| &o.key == key)
    }
}

/// Result of [`Executor::fetch_fingerprints`]
#[derive(Debug, Clone, Default)]
pub struct FetchReport {
    /// Every input record; fingerprints filled in where the download worked
    pub records: Vec<RemoteAttachmentRecord>,
    /// Keys whose content could not be fetched, with the error text
    pub failures: Vec<(AssetKey, String)>,
}

// ============================================================================
// Executor
// ============================================================================

/// Pool sizes per operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyLimits {
    pub upload: usize,
    pub delete: usize,
    pub download: usize,
}

impl Default for ConcurrencyLimits {
    fn default() -> Self {
        Self::from(&ConcurrencyConfig::default())
    }
}

impl From<&ConcurrencyConfig> for ConcurrencyLimits {
    fn from(config: &ConcurrencyConfig) -> Self {
        Self {
            upload: config.upload.max(1),
            delete: config.delete.max(1),
            download: config.download.max(1),
        }
    }
}

pub struct Executor {
    remote: Arc<dyn IRemoteStore>,
    limits: ConcurrencyLimits,
    retry: RetryPolicy,
}

impl Executor {
    pub fn new(remote: Arc<dyn IRemoteStore>, limits: ConcurrencyLimits, retry: RetryPolicy) -> Self {
        Self {
            remote,
            limits,
            retry,
        }
    }

    /// Run every operation in `plan`, deletes first
    #[instrument(skip_all, fields(deletes = plan.deletes.len(), uploads = plan.uploads.len()))]
    pub async fn execute(&self, plan: ExecutionPlan) -> ExecutionReport {
        let mut outcomes = Vec::with_capacity(plan.len());

        let deletes: Vec<_> = plan
            .deletes
            .into_iter()
            .map(|op| {
                let remote = Arc::clone(&self.remote);
                let retry = self.retry.clone();
                let key = op.key.clone();
                (key, OpKind::Delete, async move { delete_one(remote, retry, op).await })
            })
            .collect();
        outcomes.extend(run_pool("delete", self.limits.delete, deletes).await);

        let uploads: Vec<_> = plan
            .uploads
            .into_iter()
            .map(|op| {
                let remote = Arc::clone(&self.remote);
                let retry = self.retry.clone();
                let key = op.key.clone();
                let kind = op.kind;
                (key, kind, async move { upload_one(remote, retry, op).await })
            })
            .collect();
        outcomes.extend(run_pool("upload", self.limits.upload, uploads).await);

        let report = ExecutionReport { outcomes };
        info!(
            succeeded = report.outcomes.len() - report.failed() - report.skipped(),
            failed = report.failed(),
            skipped = report.skipped(),
            "Execution finished"
        );
        report
    }

    /// Download and hash the content of records that carry no fingerprint
    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn fetch_fingerprints(&self, records: Vec<RemoteAttachmentRecord>) -> FetchReport {
        let mut report = FetchReport::default();
        let mut missing = Vec::new();

        for record in records {
            if record.fingerprint.is_some() {
                report.records.push(record);
            } else {
                missing.push(record);
            }
        }

        if missing.is_empty() {
            return report;
        }
        debug!(count = missing.len(), "Fetching remote content to fingerprint");

        let downloads: Vec<_> = missing
            .iter()
            .map(|record| {
                let remote = Arc::clone(&self.remote);
                let retry = self.retry.clone();
                let id = record.id.clone();
                (record.key.clone(), OpKind::Add, async move {
                    download_one(remote, retry, id).await
                })
            })
            .collect();
        let outcomes = run_pool("download", self.limits.download, downloads).await;

        for mut record in missing {
            match outcomes.iter().find(|o| o.key == record.key).map(|o| &o.outcome) {
                Some(Outcome::Succeeded { fingerprint, .. }) => {
                    record.fingerprint = fingerprint.clone();
                }
                Some(Outcome::Failed { error, .. }) => {
                    report.failures.push((record.key.clone(), error.clone()));
                }
                Some(Outcome::Skipped { reason }) => {
                    report.failures.push((record.key.clone(), reason.clone()));
                }
                None => {
                    report
                        .failures
                        .push((record.key.clone(), "no outcome recorded".to_string()));
                }
            }
            report.records.push(record);
        }

        if !report.failures.is_empty() {
            warn!(failed = report.failures.len(), "Some remote attachments could not be fingerprinted");
        }
        report
    }
}

// ============================================================================
// Pool
// ============================================================================

/// Work result plus whether it must stop the rest of the queue
type Work = (Outcome, bool);

/// Run `items` with at most `limit` in flight
///
/// Once any item reports a fatal error, items that have not started yet
/// are recorded as `Skipped`. Items are started in the order given.
async fn run_pool<Fut>(
    label: &'static str,
    limit: usize,
    items: Vec<(AssetKey, OpKind, Fut)>,
) -> Vec<ItemOutcome>
where
    Fut: Future<Output = Work> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let abort = Arc::new(AtomicBool::new(false));
    let mut expected = Vec::with_capacity(items.len());
    let mut set = JoinSet::new();

    for (key, kind, work) in items {
        expected.push((key.clone(), kind));
        let semaphore = Arc::clone(&semaphore);
        let abort = Arc::clone(&abort);

        set.spawn(async move {
            let outcome = match semaphore.acquire_owned().await {
                Err(_) => Outcome::Skipped {
                    reason: "worker pool closed".to_string(),
                },
                Ok(_permit) if abort.load(Ordering::SeqCst) => Outcome::Skipped {
                    reason: format!("{label} queue stopped after a fatal error"),
                },
                Ok(_permit) => {
                    let (outcome, fatal) = work.await;
                    if fatal && !abort.swap(true, Ordering::SeqCst) {
                        error!(key = %key, queue = label, "Fatal remote error, stopping queue");
                    }
                    outcome
                }
            };
            ItemOutcome { key, kind, outcome }
        });
    }

    let mut outcomes = Vec::with_capacity(expected.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => error!(queue = label, error = %e, "Worker task failed"),
        }
    }

    // A panicked task still owes its item an outcome
    let reported: HashSet<(AssetKey, OpKind)> =
        outcomes.iter().map(|o| (o.key.clone(), o.kind)).collect();
    for (key, kind) in expected {
        if !reported.contains(&(key.clone(), kind)) {
            outcomes.push(ItemOutcome {
                key,
                kind,
                outcome: Outcome::Failed {
                    attempts: 0,
                    error: "worker task panicked".to_string(),
                },
            });
        }
    }

    outcomes.sort_by(|a, b| a.key.cmp(&b.key));
    outcomes
}

fn failed(err: RetryError) -> Work {
    let fatal = err.error.is_fatal();
    (
        Outcome::Failed {
            attempts: err.attempts,
            error: err.error.to_string(),
        },
        fatal,
    )
}

async fn delete_one(remote: Arc<dyn IRemoteStore>, retry: RetryPolicy, op: DeleteOp) -> Work {
    let Some(id) = op.id else {
        warn!(key = %op.key, "No remote id known, cannot delete");
        return (
            Outcome::Skipped {
                reason: "no remote id known for this key".to_string(),
            },
            false,
        );
    };

    match retry.run("delete", || remote.delete(&id)).await {
        Ok(()) => {
            debug!(key = %op.key, id = %id, "Deleted");
            (success(None, None), false)
        }
        Err(RetryError {
            error: RemoteError::NotFound(_),
            ..
        }) => {
            debug!(key = %op.key, id = %id, "Already absent remotely");
            (success(None, None), false)
        }
        Err(err) => {
            warn!(key = %op.key, error = %err, "Delete failed");
            failed(err)
        }
    }
}

async fn upload_one(remote: Arc<dyn IRemoteStore>, retry: RetryPolicy, op: UploadOp) -> Work {
    let data = match tokio::fs::read(&op.path).await {
        Ok(data) => data,
        Err(e) => {
            warn!(key = %op.key, path = %op.path.display(), error = %e, "Cannot read local file");
            return (
                Outcome::Failed {
                    attempts: 0,
                    error: format!("cannot read {}: {e}", op.path.display()),
                },
                false,
            );
        }
    };
    let fingerprint = fingerprint_bytes(&data);

    match retry
        .run("upload", || remote.upload(&op.key, data.clone()))
        .await
    {
        Ok(record) => {
            debug!(key = %op.key, id = %record.id, kind = %op.kind, "Uploaded");
            (success(Some(record), Some(fingerprint)), false)
        }
        Err(err) => {
            warn!(key = %op.key, error = %err, "Upload failed");
            failed(err)
        }
    }
}

async fn download_one(remote: Arc<dyn IRemoteStore>, retry: RetryPolicy, id: RemoteId) -> Work {
    match retry.run("download", || remote.download(&id)).await {
        Ok(data) => (success(None, Some(fingerprint_bytes(&data))), false),
        Err(err) => failed(err),
    }
}

fn success(record: Option<RemoteAttachmentRecord>, fingerprint: Option<Fingerprint>) -> Outcome {
    Outcome::Succeeded {
        record,
        fingerprint,
    }
}

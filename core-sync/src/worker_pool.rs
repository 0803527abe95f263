//! # Worker Pool
//!
//! Executes a reconcile plan against the remote catalog with bounded
//! concurrency.
//!
//! ## Overview
//!
//! - At most `worker_count` operations run at once (`Semaphore` + `JoinSet`)
//! - Creates and updates drain completely before any delete is dispatched
//! - A per-path lock keeps two operations on one item from overlapping
//! - Every remote attempt, retries and set calls included, first waits on the
//!   shared [`RateLimiter`]
//! - A successful operation performs exactly one catalog mutation before it
//!   counts as done: `record_sync` for creates and updates, `delete` for
//!   deletes
//! - A failed operation leaves the catalog untouched and is recorded as an
//!   [`ItemFailure`]
//! - A fatal error cancels the token; nothing new is dispatched, in-flight
//!   operations finish and commit, the rest are counted as not dispatched
//!
//! ## Set Assignment
//!
//! When an operation carries a set name, the set is looked up in the catalog
//! under a per-name lock. A missing set is created remotely with this item as
//! its primary and stored immediately so later items join it. Otherwise the
//! item is added to the set unless the catalog already records the
//! membership. Set failures are warnings; the item still commits.

use crate::progress::{percent, ProgressSink};
use crate::rate_limiter::RateLimiter;
use crate::reconciler::{Operation, OperationKind};
use crate::run::{ItemFailure, RunContext};
use bridge_traits::{Clock, RemoteCatalog, RemoteError};
use core_library::{CatalogRepository, ItemStatus, MediaItem, MediaSet};
use core_runtime::events::{CatalogEvent, SyncEvent};
use core_runtime::retry::{RetryOutcome, RetryPolicy};
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedMutexGuard, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const DEFAULT_WORKERS: usize = 4;
const DEFAULT_PROGRESS_INTERVAL: u64 = 10;

// ============================================================================
// Keyed Locks
// ============================================================================

/// Async mutex per key, created on first use.
#[derive(Default)]
struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

// ============================================================================
// Task Results
// ============================================================================

enum ItemResult {
    Succeeded,
    Failed(ItemFailure),
}

struct TaskReport {
    kind: OperationKind,
    result: ItemResult,
    warnings: Vec<String>,
    fatal: Option<String>,
}

impl TaskReport {
    fn succeeded(kind: OperationKind) -> Self {
        Self {
            kind,
            result: ItemResult::Succeeded,
            warnings: Vec::new(),
            fatal: None,
        }
    }

    fn failed(op: &Operation, message: impl Into<String>) -> Self {
        Self {
            kind: op.kind,
            result: ItemResult::Failed(ItemFailure::new(
                op.path(),
                op.kind,
                message,
                op.attempts,
            )),
            warnings: Vec::new(),
            fatal: None,
        }
    }

    fn with_warning(mut self, warning: String) -> Self {
        self.warnings.push(warning);
        self
    }

    fn with_fatal(mut self, reason: String) -> Self {
        self.fatal = Some(reason);
        self
    }
}

/// What the pool reports back to the coordinator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub dispatched: u64,
    pub not_dispatched: u64,
    /// Reason the run was aborted, if it was
    pub fatal: Option<String>,
}

// ============================================================================
// Worker Pool
// ============================================================================

struct Shared {
    remote: Arc<dyn RemoteCatalog>,
    catalog: Arc<dyn CatalogRepository>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    progress: Arc<dyn ProgressSink>,
    path_locks: KeyedLocks,
    set_locks: KeyedLocks,
    cancel: CancellationToken,
}

pub struct WorkerPool {
    remote: Arc<dyn RemoteCatalog>,
    catalog: Arc<dyn CatalogRepository>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
    worker_count: usize,
    progress_interval: u64,
}

impl WorkerPool {
    pub fn new(
        remote: Arc<dyn RemoteCatalog>,
        catalog: Arc<dyn CatalogRepository>,
        limiter: Arc<RateLimiter>,
        clock: Arc<dyn Clock>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            remote,
            catalog,
            limiter,
            retry: RetryPolicy::default(),
            clock,
            progress,
            cancel: CancellationToken::new(),
            worker_count: DEFAULT_WORKERS,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Also stop dispatching when `token` is cancelled.
    ///
    /// A fatal error cancels a child of `token`, never `token` itself.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token.child_token();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_count = workers.max(1);
        self
    }

    pub fn with_progress_interval(mut self, every: u64) -> Self {
        self.progress_interval = every.max(1);
        self
    }

    fn shared(&self) -> Arc<Shared> {
        Arc::new(Shared {
            remote: Arc::clone(&self.remote),
            catalog: Arc::clone(&self.catalog),
            limiter: Arc::clone(&self.limiter),
            retry: self.retry,
            clock: Arc::clone(&self.clock),
            progress: Arc::clone(&self.progress),
            path_locks: KeyedLocks::default(),
            set_locks: KeyedLocks::default(),
            cancel: self.cancel.clone(),
        })
    }

    /// Run every operation, folding results into `ctx`.
    pub async fn execute(&self, operations: Vec<Operation>, ctx: &mut RunContext) -> PoolReport {
        let total = operations.len() as u64;
        let (uploads, deletes): (Vec<Operation>, Vec<Operation>) = operations
            .into_iter()
            .partition(|op| op.kind != OperationKind::Delete);

        let shared = self.shared();
        let mut tracker = ProgressTracker::new(total, self.progress_interval);
        let mut report = PoolReport::default();

        info!(
            run_id = %ctx.run_id(),
            uploads = uploads.len(),
            deletes = deletes.len(),
            workers = self.worker_count,
            "Executing plan"
        );

        self.run_phase(&shared, uploads, ctx, &mut tracker, &mut report)
            .await;
        self.run_phase(&shared, deletes, ctx, &mut tracker, &mut report)
            .await;

        tracker.finish(ctx, shared.progress.as_ref());

        if shared.cancel.is_cancelled() && !ctx.is_aborted() {
            ctx.abort("Run cancelled");
        }
        ctx.record_not_dispatched(report.not_dispatched);
        report.fatal = match ctx.outcome() {
            crate::run::RunOutcome::Aborted { reason } => Some(reason),
            _ => None,
        };

        report
    }

    async fn run_phase(
        &self,
        shared: &Arc<Shared>,
        operations: Vec<Operation>,
        ctx: &mut RunContext,
        tracker: &mut ProgressTracker,
        report: &mut PoolReport,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.worker_count));
        let mut in_flight: JoinSet<TaskReport> = JoinSet::new();
        let mut pending = operations.into_iter();

        while let Some(op) = pending.next() {
            let permit = tokio::select! {
                biased;
                _ = shared.cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                report.not_dispatched += 1 + pending.len() as u64;
                break;
            };

            while let Some(joined) = in_flight.try_join_next() {
                absorb(shared, joined, ctx, tracker);
            }

            report.dispatched += 1;
            let shared = Arc::clone(shared);
            in_flight.spawn(async move {
                let _permit = permit;
                let kind = op.kind;
                let path = op.path().to_string();
                match AssertUnwindSafe(execute_operation(&shared, op))
                    .catch_unwind()
                    .await
                {
                    Ok(report) => {
                        if report.fatal.is_some() {
                            shared.cancel.cancel();
                        }
                        report
                    }
                    Err(_) => {
                        error!(path = %path, "Worker panicked");
                        TaskReport {
                            kind,
                            result: ItemResult::Failed(ItemFailure::new(
                                path,
                                kind,
                                "Worker panicked",
                                0,
                            )),
                            warnings: Vec::new(),
                            fatal: None,
                        }
                    }
                }
            });
        }

        while let Some(joined) = in_flight.join_next().await {
            absorb(shared, joined, ctx, tracker);
        }
    }
}

/// Fold one finished task into the run totals.
fn absorb(
    shared: &Shared,
    joined: Result<TaskReport, JoinError>,
    ctx: &mut RunContext,
    tracker: &mut ProgressTracker,
) {
    let report = match joined {
        Ok(report) => report,
        Err(e) => {
            ctx.record_failure(ItemFailure {
                path: String::new(),
                operation: "task".to_string(),
                message: e.to_string(),
                attempts: 0,
            });
            tracker.advance(ctx, shared.progress.as_ref());
            return;
        }
    };

    match report.result {
        ItemResult::Succeeded => ctx.record_success(report.kind),
        ItemResult::Failed(failure) => {
            shared.progress.publish(SyncEvent::ItemFailed {
                run_id: ctx.run_id().to_string(),
                path: failure.path.clone(),
                operation: failure.operation.clone(),
                message: failure.message.clone(),
                attempts: failure.attempts,
            });
            ctx.record_failure(failure);
        }
    }

    for warning in report.warnings {
        ctx.record_warning(warning);
    }

    if let Some(reason) = report.fatal {
        error!(run_id = %ctx.run_id(), reason = %reason, "Fatal error, stopping dispatch");
        ctx.abort(reason);
    }

    tracker.advance(ctx, shared.progress.as_ref());
}

// ============================================================================
// Progress
// ============================================================================

struct ProgressTracker {
    total: u64,
    every: u64,
    processed: u64,
    last_published: Option<u64>,
}

impl ProgressTracker {
    fn new(total: u64, every: u64) -> Self {
        Self {
            total,
            every,
            processed: 0,
            last_published: None,
        }
    }

    fn advance(&mut self, ctx: &RunContext, sink: &dyn ProgressSink) {
        self.processed += 1;
        if self.processed.is_multiple_of(self.every) || self.processed == self.total {
            self.publish(ctx, sink);
        }
    }

    fn finish(&mut self, ctx: &RunContext, sink: &dyn ProgressSink) {
        if self.last_published != Some(self.processed) {
            self.publish(ctx, sink);
        }
    }

    fn publish(&mut self, ctx: &RunContext, sink: &dyn ProgressSink) {
        self.last_published = Some(self.processed);
        sink.publish(SyncEvent::Progress {
            run_id: ctx.run_id().to_string(),
            processed: self.processed,
            total: self.total,
            percent: percent(self.processed, self.total),
        });
    }
}

// ============================================================================
// Operation Execution
// ============================================================================

async fn execute_operation(shared: &Shared, mut op: Operation) -> TaskReport {
    let _item_guard = shared.path_locks.lock(op.path()).await;
    debug!(path = %op.path(), kind = %op.kind, "Executing operation");

    match op.kind {
        OperationKind::Create => {
            let Some(upload) = op.upload.clone() else {
                return TaskReport::failed(&op, "Create without upload source");
            };
            let outcome = remote_call(shared, || shared.remote.create(&upload)).await;
            match settle(&mut op, outcome) {
                Ok(remote_id) => commit_upload(shared, &op, remote_id, ItemStatus::New).await,
                Err(report) => report,
            }
        }
        OperationKind::Update => {
            let (Some(upload), Some(remote_id)) = (op.upload.clone(), op.item.remote_id.clone())
            else {
                return TaskReport::failed(&op, "Update without upload source or remote id");
            };
            let outcome = remote_call(shared, || shared.remote.update(&remote_id, &upload)).await;
            match settle(&mut op, outcome) {
                Ok(()) => commit_upload(shared, &op, remote_id, ItemStatus::Modified).await,
                Err(report) => report,
            }
        }
        OperationKind::Delete => {
            let Some(remote_id) = op.item.remote_id.clone() else {
                return TaskReport::failed(&op, "Delete without remote id");
            };
            let outcome = remote_call(shared, || shared.remote.delete(&remote_id)).await;
            match settle(&mut op, outcome) {
                Ok(()) => commit_delete(shared, &op, remote_id).await,
                Err(report) => report,
            }
        }
    }
}

/// One remote call under the retry policy, each attempt gated by the limiter.
async fn remote_call<T, F, Fut>(shared: &Shared, call: F) -> RetryOutcome<T, RemoteError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    shared
        .retry
        .run(|attempt| {
            let pending = call();
            async move {
                shared.limiter.acquire().await;
                if attempt > 1 {
                    debug!(attempt, "Retrying remote call");
                }
                pending.await
            }
        })
        .await
}

/// Record attempts on the operation; a non-success becomes the task report.
fn settle<T>(op: &mut Operation, outcome: RetryOutcome<T, RemoteError>) -> Result<T, TaskReport> {
    op.attempts = outcome.attempts();
    match outcome {
        RetryOutcome::Succeeded { value, .. } => Ok(value),
        RetryOutcome::Failed { error, attempts, exhausted } => {
            warn!(
                path = %op.path(),
                kind = %op.kind,
                attempts,
                exhausted,
                error = %error,
                "Operation failed"
            );
            op.last_error = Some(error.to_string());
            Err(TaskReport::failed(op, error.to_string()))
        }
        RetryOutcome::Fatal { error, .. } => {
            op.last_error = Some(error.to_string());
            Err(abort_with(op, error.to_string()))
        }
    }
}

fn abort_with(op: &Operation, reason: String) -> TaskReport {
    TaskReport::failed(op, reason.clone()).with_fatal(reason)
}

async fn commit_upload(
    shared: &Shared,
    op: &Operation,
    remote_id: String,
    status: ItemStatus,
) -> TaskReport {
    let item = op
        .item
        .clone()
        .synced(remote_id.clone(), status, shared.clock.unix_timestamp());

    let mut warnings = Vec::new();
    let mut fatal = None;
    let set = match &op.set_name {
        Some(name) => match assign_set(shared, name, &item).await {
            Ok(set) => Some(set),
            Err(SetFailure { warning, fatal: set_fatal }) => {
                warnings.push(warning);
                fatal = set_fatal;
                None
            }
        },
        None => None,
    };

    match shared.catalog.record_sync(&item, set.as_ref()).await {
        Ok(()) => {
            debug!(path = %item.path, remote_id = %remote_id, status = %status, "Recorded");
            shared.progress.catalog_changed(CatalogEvent::ItemRecorded {
                path: item.path.clone(),
                remote_id,
                status: status.as_str().to_string(),
            });
            let mut report = TaskReport::succeeded(op.kind);
            report.warnings = warnings;
            report.fatal = fatal;
            report
        }
        Err(e) => {
            let mut report = catalog_failure(op, &e);
            report.warnings.extend(warnings);
            if report.fatal.is_none() {
                report.fatal = fatal;
            }
            report
        }
    }
}

async fn commit_delete(shared: &Shared, op: &Operation, remote_id: String) -> TaskReport {
    match shared.catalog.delete(op.path()).await {
        Ok(_) => {
            debug!(path = %op.path(), remote_id = %remote_id, "Removed");
            shared.progress.catalog_changed(CatalogEvent::ItemRemoved {
                path: op.path().to_string(),
                remote_id,
            });
            TaskReport::succeeded(op.kind)
        }
        Err(e) => catalog_failure(op, &e),
    }
}

/// Catalog write failed after the remote side changed.
fn catalog_failure(op: &Operation, e: &core_library::CatalogError) -> TaskReport {
    if e.is_transient() {
        let warning = format!(
            "Remote {} of {} succeeded but the catalog write failed: {}",
            op.kind,
            op.path(),
            e
        );
        TaskReport::failed(op, e.to_string()).with_warning(warning)
    } else {
        error!(path = %op.path(), error = %e, "Catalog write failed");
        abort_with(op, format!("Catalog error: {}", e))
    }
}

struct SetFailure {
    warning: String,
    fatal: Option<String>,
}

impl SetFailure {
    fn new(name: &str, item: &MediaItem, message: impl std::fmt::Display) -> Self {
        Self {
            warning: format!("Set '{}' not assigned to {}: {}", name, item.path, message),
            fatal: None,
        }
    }
}

async fn assign_set(
    shared: &Shared,
    name: &str,
    item: &MediaItem,
) -> Result<MediaSet, SetFailure> {
    let _set_guard = shared.set_locks.lock(name).await;
    let Some(remote_id) = item.remote_id.as_deref() else {
        return Err(SetFailure::new(name, item, "item has no remote id"));
    };

    let existing = shared
        .catalog
        .find_set_by_name(name)
        .await
        .map_err(|e| SetFailure::new(name, item, e))?;

    if let Some(set) = existing {
        if item.set_ids.contains(&set.remote_id) {
            return Ok(set);
        }
        let outcome = remote_call(shared, || shared.remote.add_to_set(&set.remote_id, remote_id)).await;
        return match outcome {
            RetryOutcome::Succeeded { .. } => Ok(set),
            other => Err(set_call_failure(name, item, other)),
        };
    }

    let outcome = remote_call(shared, || shared.remote.create_set(name, remote_id)).await;
    let set_id = match outcome {
        RetryOutcome::Succeeded { value, .. } => value,
        other => return Err(set_call_failure(name, item, other)),
    };

    let set = MediaSet::new(set_id, name, shared.clock.unix_timestamp());
    shared
        .catalog
        .upsert_set(&set)
        .await
        .map_err(|e| SetFailure::new(name, item, e))?;

    info!(set = %name, set_id = %set.remote_id, "Created remote set");
    shared.progress.catalog_changed(CatalogEvent::SetCreated {
        set_id: set.remote_id.clone(),
        name: set.name.clone(),
    });
    Ok(set)
}

fn set_call_failure<T>(
    name: &str,
    item: &MediaItem,
    outcome: RetryOutcome<T, RemoteError>,
) -> SetFailure {
    match outcome {
        RetryOutcome::Fatal { error, .. } => SetFailure {
            fatal: Some(error.to_string()),
            ..SetFailure::new(name, item, &error)
        },
        RetryOutcome::Failed { error, .. } => SetFailure::new(name, item, &error),
        RetryOutcome::Succeeded { .. } => SetFailure::new(name, item, "unexpected success"),
    }
}

//! # Run Coordinator
//!
//! Drives one synchronization run from lock to summary.
//!
//! ## Workflow
//!
//! 1. Acquire the exclusive run lock. Failure returns [`SyncError::Lock`]
//!    before anything else is touched.
//! 2. Allocate a [`RunId`] from the clock, strictly after the last recorded
//!    one, and record the run as `running`
//! 3. Load the catalog snapshot
//! 4. Scan and reconcile on a blocking thread
//! 5. Execute the plan through the [`WorkerPool`]
//! 6. Record totals and outcome, publish the final event
//! 7. Release the lock, whatever happened in 3-6
//!
//! Errors after the lock is held do not escape as `Err`: they end the run as
//! [`RunOutcome::Aborted`] so the caller always gets a [`RunSummary`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::RunCoordinator;
//!
//! let coordinator = RunCoordinator::new(config, remote, catalog, history, clock)?;
//! let summary = coordinator.run().await?;
//! println!("{} created, {} failed", summary.stats.created, summary.stats.failed);
//! ```

use crate::audit::{self, AuditReport};
use crate::convert::ExternalToolConverter;
use crate::exclusion::ExclusionRules;
use crate::progress::{NoopProgress, ProgressSink};
use crate::rate_limiter::RateLimiter;
use crate::reconciler::{reconcile, OperationKind, ReconcilePlan};
use crate::repository::{RunHistoryRepository, RunRecord};
use crate::run::{RunContext, RunId, RunOutcome, RunSummary};
use crate::run_lock;
use crate::scanner::Scanner;
use crate::worker_pool::WorkerPool;
use crate::{Result, SyncError};
use bridge_traits::{Clock, RawConverter, RemoteCatalog};
use chrono::{DateTime, Utc};
use core_library::{CatalogRepository, MediaItem};
use core_runtime::config::SyncConfig;
use core_runtime::events::SyncEvent;
use core_runtime::retry::RetryPolicy;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub struct RunCoordinator {
    config: SyncConfig,
    rules: Arc<ExclusionRules>,
    remote: Arc<dyn RemoteCatalog>,
    catalog: Arc<dyn CatalogRepository>,
    history: Arc<dyn RunHistoryRepository>,
    converter: Option<Arc<dyn RawConverter>>,
    clock: Arc<dyn Clock>,
    progress: Arc<dyn ProgressSink>,
    current: Mutex<Option<CancellationToken>>,
    last_run_id: Mutex<Option<RunId>>,
}

impl RunCoordinator {
    /// Validate the configuration and compile the exclusion rules.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Config`] for an invalid configuration or pattern.
    pub fn new(
        config: SyncConfig,
        remote: Arc<dyn RemoteCatalog>,
        catalog: Arc<dyn CatalogRepository>,
        history: Arc<dyn RunHistoryRepository>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let rules = Arc::new(ExclusionRules::for_sync(&config)?);

        Ok(Self {
            config,
            rules,
            remote,
            catalog,
            history,
            converter: None,
            clock,
            progress: Arc::new(NoopProgress),
            current: Mutex::new(None),
            last_run_id: Mutex::new(None),
        })
    }

    /// Use `converter` for raw files instead of the configured external tool.
    pub fn with_converter(mut self, converter: Arc<dyn RawConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Whether a run currently holds the lock, in this process or another.
    pub fn is_running(&self) -> bool {
        run_lock::is_locked(&self.config.lock_path)
    }

    /// Stop dispatching in the active run. Returns `false` if none is active.
    pub fn cancel(&self) -> bool {
        let current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        match current.as_ref() {
            Some(token) => {
                info!("Cancelling active run");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Execute one run.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Lock`] if another run holds the lock. Every later
    /// failure is reported through the summary's outcome.
    #[instrument(skip(self), fields(root = %self.config.root_dir.display()))]
    pub async fn run(&self) -> Result<RunSummary> {
        let guard = run_lock::try_acquire(&self.config.lock_path, "sync")?;
        let started_at = self.clock.now();
        let run_id = self.next_run_id(started_at).await;

        let mut ctx = RunContext::new(run_id, &self.config.root_dir, started_at, guard);
        let cancel = CancellationToken::new();
        self.set_current(Some(cancel.clone()));

        info!(run_id = %ctx.run_id(), "Sync run started");
        let record = self.open_history(&ctx).await;
        self.progress.publish(SyncEvent::Started {
            run_id: ctx.run_id().to_string(),
            root: self.config.root_dir.display().to_string(),
        });

        if let Err(e) = self.execute(&mut ctx, cancel).await {
            error!(run_id = %ctx.run_id(), error = %e, "Sync run aborted");
            ctx.abort(e.to_string());
        }

        let summary = ctx.summary(self.clock.now());
        self.close_history(record, &summary).await;
        self.publish_summary(&summary);
        self.set_current(None);
        ctx.release();

        info!(
            run_id = %summary.run_id,
            outcome = %summary.outcome.status(),
            created = summary.stats.created,
            updated = summary.stats.updated,
            deleted = summary.stats.deleted,
            skipped = summary.stats.skipped,
            failed = summary.stats.failed,
            duration_ms = summary.duration_ms(),
            "Sync run finished"
        );
        Ok(summary)
    }

    /// Compare catalog and remote without changing either.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Lock`] while a run is active, or the remote or
    /// catalog error that stopped the audit.
    pub async fn audit(&self) -> Result<AuditReport> {
        let limiter = RateLimiter::from_rate(&self.config.rate_limit);
        let retry = RetryPolicy::from(&self.config.remote_retry);
        audit::audit(
            &self.config.lock_path,
            self.remote.as_ref(),
            self.catalog.as_ref(),
            &limiter,
            &retry,
        )
        .await
    }

    // ========================================================================
    // Phases
    // ========================================================================

    async fn execute(&self, ctx: &mut RunContext, cancel: CancellationToken) -> Result<()> {
        let converter = self.run_converter()?;

        info!(run_id = %ctx.run_id(), "Loading catalog snapshot");
        let snapshot: HashMap<String, MediaItem> = self
            .catalog
            .list_all()
            .await?
            .into_iter()
            .map(|item| (item.path.clone(), item))
            .collect();

        info!(run_id = %ctx.run_id(), cataloged = snapshot.len(), "Scanning");
        let plan = self.plan(snapshot, converter.clone()).await?;

        ctx.record_plan(&plan);
        for failure in ctx.failures() {
            self.progress.publish(SyncEvent::ItemFailed {
                run_id: ctx.run_id().to_string(),
                path: failure.path.clone(),
                operation: failure.operation.clone(),
                message: failure.message.clone(),
                attempts: failure.attempts,
            });
        }
        self.progress.publish(SyncEvent::Planned {
            run_id: ctx.run_id().to_string(),
            creates: plan.count(OperationKind::Create) as u64,
            updates: plan.count(OperationKind::Update) as u64,
            deletes: plan.count(OperationKind::Delete) as u64,
            unchanged: plan.unchanged.len() as u64,
            oversized: plan.oversized.len() as u64,
            scan_failures: plan.failures.len() as u64,
        });
        info!(
            run_id = %ctx.run_id(),
            operations = plan.len(),
            unchanged = plan.unchanged.len(),
            oversized = plan.oversized.len(),
            scan_failures = plan.failures.len(),
            "Plan ready"
        );

        let pool = WorkerPool::new(
            Arc::clone(&self.remote),
            Arc::clone(&self.catalog),
            Arc::new(RateLimiter::from_rate(&self.config.rate_limit)),
            Arc::clone(&self.clock),
            Arc::clone(&self.progress),
        )
        .with_retry(RetryPolicy::from(&self.config.remote_retry))
        .with_workers(self.config.worker_count)
        .with_progress_interval(self.config.progress_interval)
        .with_cancellation(cancel);

        pool.execute(plan.operations, ctx).await;

        // Converted files must outlive the uploads.
        drop(converter);
        Ok(())
    }

    async fn plan(
        &self,
        snapshot: HashMap<String, MediaItem>,
        converter: Option<Arc<dyn RawConverter>>,
    ) -> Result<ReconcilePlan> {
        let root = self.config.root_dir.clone();
        if !root.is_dir() {
            return Err(SyncError::filesystem(root, "Root is not a directory"));
        }

        let mut scanner =
            Scanner::new(root, Arc::clone(&self.rules)).set_from_folder(self.config.set_from_folder);
        if let Some(converter) = converter {
            scanner = scanner.with_converter(converter);
        }
        let rules = Arc::clone(&self.rules);

        tokio::task::spawn_blocking(move || reconcile(scanner.scan(), &snapshot, &rules))
            .await
            .map_err(|e| SyncError::Task(e.to_string()))
    }

    fn run_converter(&self) -> Result<Option<Arc<dyn RawConverter>>> {
        if let Some(converter) = &self.converter {
            return Ok(Some(Arc::clone(converter)));
        }
        if !self.config.raw_conversion.enabled {
            return Ok(None);
        }

        let Some(tool) = &self.config.raw_conversion.tool_path else {
            return Err(SyncError::Config(core_runtime::Error::Config(
                "raw_conversion requires raw_converter_path".to_string(),
            )));
        };
        let converter = ExternalToolConverter::new(tool, &self.config.raw_conversion.extensions)
            .map_err(|e| SyncError::filesystem(tool, e))?;
        debug!(scratch = %converter.scratch_dir().display(), "Raw conversion enabled");
        Ok(Some(Arc::new(converter)))
    }

    // ========================================================================
    // History and Events
    // ========================================================================

    /// Allocate an identifier after every one already issued or recorded.
    /// Called with the run lock held.
    async fn next_run_id(&self, now: DateTime<Utc>) -> RunId {
        let recorded = match self.history.latest_id().await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "Failed to read last run id");
                None
            }
        };

        let mut last = self.last_run_id.lock().unwrap_or_else(|p| p.into_inner());
        let previous = recorded.into_iter().chain(last.clone()).max();
        let run_id = RunId::following(now, previous.as_ref());
        *last = Some(run_id.clone());
        run_id
    }

    async fn open_history(&self, ctx: &RunContext) -> Option<RunRecord> {
        let now_ms = ctx.started_at().timestamp_millis();
        match self
            .history
            .abort_stale("Interrupted before completion", now_ms)
            .await
        {
            Ok(0) => {}
            Ok(n) => warn!(runs = n, "Closed runs left open by an earlier process"),
            Err(e) => warn!(error = %e, "Failed to close stale runs"),
        }

        let record = RunRecord::started(
            ctx.run_id().clone(),
            self.config.root_dir.display().to_string(),
            now_ms,
        );
        match self.history.insert(&record).await {
            Ok(()) => Some(record),
            Err(e) => {
                warn!(run_id = %ctx.run_id(), error = %e, "Failed to record run start");
                None
            }
        }
    }

    async fn close_history(&self, record: Option<RunRecord>, summary: &RunSummary) {
        let Some(record) = record else {
            return;
        };
        if let Err(e) = self.history.update(&record.finish(summary)).await {
            warn!(run_id = %summary.run_id, error = %e, "Failed to record run outcome");
        }
    }

    fn publish_summary(&self, summary: &RunSummary) {
        let run_id = summary.run_id.to_string();
        let stats = summary.stats;
        let event = match &summary.outcome {
            RunOutcome::Aborted { reason } => SyncEvent::Aborted {
                run_id,
                reason: reason.clone(),
                created: stats.created,
                updated: stats.updated,
                deleted: stats.deleted,
                failed: stats.failed,
                not_dispatched: stats.not_dispatched,
            },
            RunOutcome::Completed | RunOutcome::CompletedWithFailures => SyncEvent::Completed {
                run_id,
                created: stats.created,
                updated: stats.updated,
                deleted: stats.deleted,
                skipped: stats.skipped,
                failed: stats.failed,
                duration_ms: summary.duration_ms(),
            },
        };
        self.progress.publish(event);
    }

    fn set_current(&self, token: Option<CancellationToken>) {
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = token;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::SqliteRunHistoryRepository;
    use async_trait::async_trait;
    use bridge_traits::{MediaUpload, RemoteEntry, RemoteError, SystemClock};
    use core_library::db::create_test_pool;
    use core_library::SqliteCatalogStore;
    use tempfile::TempDir;

    struct EmptyRemote;

    #[async_trait]
    impl RemoteCatalog for EmptyRemote {
        async fn create(&self, item: &MediaUpload) -> std::result::Result<String, RemoteError> {
            Ok(format!("r-{}", item.path))
        }
        async fn update(&self, _: &str, _: &MediaUpload) -> std::result::Result<(), RemoteError> {
            Ok(())
        }
        async fn delete(&self, _: &str) -> std::result::Result<(), RemoteError> {
            Ok(())
        }
        async fn list(&self) -> std::result::Result<Vec<RemoteEntry>, RemoteError> {
            Ok(Vec::new())
        }
        async fn create_set(&self, name: &str, _: &str) -> std::result::Result<String, RemoteError> {
            Ok(format!("set-{}", name))
        }
        async fn add_to_set(&self, _: &str, _: &str) -> std::result::Result<(), RemoteError> {
            Ok(())
        }
    }

    async fn coordinator(config: SyncConfig) -> Result<RunCoordinator> {
        let pool = create_test_pool().await.unwrap();
        RunCoordinator::new(
            config,
            Arc::new(EmptyRemote),
            Arc::new(SqliteCatalogStore::new(pool.clone())),
            Arc::new(SqliteRunHistoryRepository::new(pool)),
            Arc::new(SystemClock),
        )
    }

    #[tokio::test]
    async fn test_invalid_pattern_rejected_at_construction() {
        let dir = TempDir::new().unwrap();
        let mut config = SyncConfig::builder()
            .root_dir(dir.path())
            .catalog_path(dir.path().join("catalog.db"))
            .build()
            .unwrap();
        config.exclusions.patterns = vec!["(unclosed".to_string()];

        assert!(matches!(
            coordinator(config).await,
            Err(SyncError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_root_aborts_and_releases_lock() {
        let dir = TempDir::new().unwrap();
        let config = SyncConfig::builder()
            .root_dir(dir.path().join("missing"))
            .catalog_path(dir.path().join("catalog.db"))
            .build()
            .unwrap();
        let coordinator = coordinator(config).await.unwrap();

        let summary = coordinator.run().await.unwrap();
        assert!(summary.outcome.is_aborted());
        assert!(!coordinator.is_running());
        assert!(!coordinator.cancel());
    }
}

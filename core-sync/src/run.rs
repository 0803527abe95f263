//! # Run State
//!
//! Identity, totals and outcome of one synchronization run.
//!
//! ## Overview
//!
//! A [`RunContext`] exists only while its run holds the exclusive run lock.
//! It owns the lock guard and the running totals. The worker pool folds each
//! finished operation into it through the `record_*` methods; nothing else
//! mutates the totals. At the end the context produces a [`RunSummary`] and
//! releases the lock.
//!
//! ## Outcomes
//!
//! ```text
//! Running ──┬──> Completed              (no failures)
//!           ├──> CompletedWithFailures  (some items failed, run finished)
//!           └──> Aborted                (fatal error, dispatch stopped)
//! ```

use crate::error::{Result, SyncError};
use crate::reconciler::{OperationKind, ReconcilePlan};
use crate::run_lock::RunLockGuard;
use bridge_traits::Clock;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

// ============================================================================
// Run Identifier
// ============================================================================

const RUN_ID_FORMAT: &str = "%Y%m%d-%H%M%S-%3f";

/// Run identifier derived from the wall clock: `YYYYMMDD-HHMMSS-mmm`.
///
/// Used for correlation only. Identifiers sort in start order; the
/// coordinator allocates them with [`RunId::following`] so they stay strictly
/// increasing when the clock stands still or steps back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn new(clock: &dyn Clock) -> Self {
        Self::at(clock.now())
    }

    pub fn at(time: DateTime<Utc>) -> Self {
        Self(time.format(RUN_ID_FORMAT).to_string())
    }

    /// Identifier for `time`, bumped to one millisecond past `previous` when
    /// `time` would not sort after it.
    pub fn following(time: DateTime<Utc>, previous: Option<&RunId>) -> Self {
        let floor = previous
            .and_then(RunId::timestamp)
            .map(|t| t + chrono::Duration::milliseconds(1));
        match floor {
            Some(floor) if floor > time => Self::at(floor),
            _ => Self::at(time),
        }
    }

    /// Instant encoded in the identifier, at millisecond precision.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let (base, millis) = self.0.rsplit_once('-')?;
        let naive = NaiveDateTime::parse_from_str(base, "%Y%m%d-%H%M%S").ok()?;
        let millis: i64 = millis.parse().ok()?;
        Some(naive.and_utc() + chrono::Duration::milliseconds(millis))
    }

    /// Parse a run ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error unless the string is `YYYYMMDD-HHMMSS-mmm` with a
    /// valid calendar date and time.
    pub fn from_string(s: &str) -> Result<Self> {
        let invalid = || SyncError::InvalidRunId(s.to_string());

        let parts: Vec<&str> = s.split('-').collect();
        let [date, time, millis] = parts.as_slice() else {
            return Err(invalid());
        };
        let all_digits = |p: &str, len: usize| p.len() == len && p.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(*date, 8) || !all_digits(*time, 6) || !all_digits(*millis, 3) {
            return Err(invalid());
        }

        NaiveDateTime::parse_from_str(&format!("{}{}", date, time), "%Y%m%d%H%M%S")
            .map_err(|_| invalid())?;

        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// Persisted status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    CompletedWithFailures,
    Aborted,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::CompletedWithFailures => "completed_with_failures",
            RunStatus::Aborted => "aborted",
        }
    }
}

impl FromStr for RunStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "completed_with_failures" => Ok(RunStatus::CompletedWithFailures),
            "aborted" => Ok(RunStatus::Aborted),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a finished run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    CompletedWithFailures,
    Aborted { reason: String },
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            RunOutcome::Completed => RunStatus::Completed,
            RunOutcome::CompletedWithFailures => RunStatus::CompletedWithFailures,
            RunOutcome::Aborted { .. } => RunStatus::Aborted,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, RunOutcome::Aborted { .. })
    }
}

// ============================================================================
// Totals
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Operations in the plan
    pub planned: u64,
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    /// Unchanged and oversized files
    pub skipped: u64,
    /// Failed operations and unreadable files
    pub failed: u64,
    /// Operations never started because the run aborted
    pub not_dispatched: u64,
}

/// A per-item failure, recorded and reported, never dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub path: String,
    /// `create`, `update`, `delete` or `scan`
    pub operation: String,
    pub message: String,
    pub attempts: u32,
}

impl ItemFailure {
    pub fn new(
        path: impl Into<String>,
        operation: OperationKind,
        message: impl Into<String>,
        attempts: u32,
    ) -> Self {
        Self {
            path: path.into(),
            operation: operation.as_str().to_string(),
            message: message.into(),
            attempts,
        }
    }

    pub fn scan(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            operation: "scan".to_string(),
            message: message.into(),
            attempts: 0,
        }
    }
}

/// Final report of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub outcome: RunOutcome,
    pub stats: RunStats,
    pub failures: Vec<ItemFailure>,
    /// Recoverable problems that did not fail an item (set assignment, ...)
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn duration_ms(&self) -> u64 {
        (self.completed_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}

// ============================================================================
// Run Context
// ============================================================================

/// Live state of the one active run.
#[derive(Debug)]
pub struct RunContext {
    run_id: RunId,
    root: PathBuf,
    started_at: DateTime<Utc>,
    lock: Option<RunLockGuard>,
    stats: RunStats,
    failures: Vec<ItemFailure>,
    warnings: Vec<String>,
    abort_reason: Option<String>,
}

impl RunContext {
    pub fn new(
        run_id: RunId,
        root: impl Into<PathBuf>,
        started_at: DateTime<Utc>,
        lock: RunLockGuard,
    ) -> Self {
        Self {
            run_id,
            root: root.into(),
            started_at,
            lock: Some(lock),
            stats: RunStats::default(),
            failures: Vec::new(),
            warnings: Vec::new(),
            abort_reason: None,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn failures(&self) -> &[ItemFailure] {
        &self.failures
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn is_aborted(&self) -> bool {
        self.abort_reason.is_some()
    }

    /// Fold the reconcile results that need no remote call.
    pub fn record_plan(&mut self, plan: &ReconcilePlan) {
        self.stats.planned = plan.len() as u64;
        self.stats.skipped += (plan.unchanged.len() + plan.oversized.len()) as u64;
        for failure in &plan.failures {
            self.record_failure(ItemFailure::scan(&failure.path, &failure.message));
        }
    }

    pub fn record_success(&mut self, kind: OperationKind) {
        match kind {
            OperationKind::Create => self.stats.created += 1,
            OperationKind::Update => self.stats.updated += 1,
            OperationKind::Delete => self.stats.deleted += 1,
        }
    }

    pub fn record_failure(&mut self, failure: ItemFailure) {
        self.stats.failed += 1;
        self.failures.push(failure);
    }

    pub fn record_warning(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        warn!(run_id = %self.run_id, warning = %warning, "Run warning");
        self.warnings.push(warning);
    }

    pub fn record_not_dispatched(&mut self, count: u64) {
        self.stats.not_dispatched += count;
    }

    /// Mark the run aborted. The first reason wins.
    pub fn abort(&mut self, reason: impl Into<String>) {
        if self.abort_reason.is_none() {
            self.abort_reason = Some(reason.into());
        }
    }

    pub fn outcome(&self) -> RunOutcome {
        match &self.abort_reason {
            Some(reason) => RunOutcome::Aborted {
                reason: reason.clone(),
            },
            None if self.stats.failed > 0 => RunOutcome::CompletedWithFailures,
            None => RunOutcome::Completed,
        }
    }

    pub fn summary(&self, completed_at: DateTime<Utc>) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            outcome: self.outcome(),
            stats: self.stats,
            failures: self.failures.clone(),
            warnings: self.warnings.clone(),
            started_at: self.started_at,
            completed_at,
        }
    }

    /// Release the run lock.
    pub fn release(mut self) {
        if let Some(lock) = self.lock.take() {
            lock.release();
        }
    }
}

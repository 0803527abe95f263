//! # Run History Repository
//!
//! Provides database persistence for sync runs.
//!
//! ## Overview
//!
//! Every run inserts a `sync_runs` row when it starts (status `running`) and
//! updates it with its totals and outcome when it ends. The history is
//! informational; the catalog never depends on it.
//!
//! A row still `running` while a new run holds the lock belongs to a process
//! that died mid-run; [`RunHistoryRepository::abort_stale`] closes such rows.

use crate::run::{RunId, RunOutcome, RunStats, RunStatus, RunSummary};
use crate::{Result, SyncError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

// ============================================================================
// Run Record
// ============================================================================

/// One row of run history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: RunId,
    pub status: RunStatus,
    pub root_dir: String,
    pub stats: RunStats,
    pub abort_reason: Option<String>,
    /// Unix epoch milliseconds
    pub started_at: i64,
    pub completed_at: Option<i64>,
}

impl RunRecord {
    /// Record for a run that just started.
    pub fn started(id: RunId, root_dir: impl Into<String>, started_at: i64) -> Self {
        Self {
            id,
            status: RunStatus::Running,
            root_dir: root_dir.into(),
            stats: RunStats::default(),
            abort_reason: None,
            started_at,
            completed_at: None,
        }
    }

    /// Apply a finished run's summary.
    pub fn finish(mut self, summary: &RunSummary) -> Self {
        self.status = summary.outcome.status();
        self.stats = summary.stats;
        self.abort_reason = match &summary.outcome {
            RunOutcome::Aborted { reason } => Some(reason.clone()),
            _ => None,
        };
        self.completed_at = Some(summary.completed_at.timestamp_millis());
        self
    }
}

// ============================================================================
// Repository Trait
// ============================================================================

/// Repository trait for run history persistence
#[async_trait]
pub trait RunHistoryRepository: Send + Sync {
    /// Insert a new run
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the id exists
    async fn insert(&self, record: &RunRecord) -> Result<()>;

    /// Update an existing run
    ///
    /// # Errors
    ///
    /// Returns an error if the run doesn't exist or the database operation fails
    async fn update(&self, record: &RunRecord) -> Result<()>;

    /// Find a run by ID
    async fn find_by_id(&self, id: &RunId) -> Result<Option<RunRecord>>;

    /// Most recent runs first
    async fn recent(&self, limit: u32) -> Result<Vec<RunRecord>>;

    /// Greatest run ID ever recorded
    async fn latest_id(&self) -> Result<Option<RunId>>;

    /// Mark every run still `running` as aborted. Returns how many rows changed.
    async fn abort_stale(&self, reason: &str, completed_at: i64) -> Result<u64>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of RunHistoryRepository
pub struct SqliteRunHistoryRepository {
    pool: SqlitePool,
}

impl SqliteRunHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a run
#[derive(Debug, FromRow)]
struct RunRow {
    id: String,
    status: String,
    root_dir: String,
    items_planned: i64,
    items_created: i64,
    items_updated: i64,
    items_deleted: i64,
    items_skipped: i64,
    items_failed: i64,
    items_not_dispatched: i64,
    abort_reason: Option<String>,
    started_at: i64,
    completed_at: Option<i64>,
}

impl TryFrom<RunRow> for RunRecord {
    type Error = SyncError;

    fn try_from(row: RunRow) -> Result<Self> {
        Ok(RunRecord {
            id: RunId::from_string(&row.id)?,
            status: row.status.parse()?,
            root_dir: row.root_dir,
            stats: RunStats {
                planned: row.items_planned as u64,
                created: row.items_created as u64,
                updated: row.items_updated as u64,
                deleted: row.items_deleted as u64,
                skipped: row.items_skipped as u64,
                failed: row.items_failed as u64,
                not_dispatched: row.items_not_dispatched as u64,
            },
            abort_reason: row.abort_reason,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, status, root_dir,
           items_planned, items_created, items_updated, items_deleted,
           items_skipped, items_failed, items_not_dispatched,
           abort_reason, started_at, completed_at
    FROM sync_runs
"#;

#[async_trait]
impl RunHistoryRepository for SqliteRunHistoryRepository {
    async fn insert(&self, record: &RunRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_runs (
                id, status, root_dir,
                items_planned, items_created, items_updated, items_deleted,
                items_skipped, items_failed, items_not_dispatched,
                abort_reason, started_at, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.as_str())
        .bind(record.status.as_str())
        .bind(&record.root_dir)
        .bind(record.stats.planned as i64)
        .bind(record.stats.created as i64)
        .bind(record.stats.updated as i64)
        .bind(record.stats.deleted as i64)
        .bind(record.stats.skipped as i64)
        .bind(record.stats.failed as i64)
        .bind(record.stats.not_dispatched as i64)
        .bind(&record.abort_reason)
        .bind(record.started_at)
        .bind(record.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn update(&self, record: &RunRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_runs SET
                status = ?,
                items_planned = ?,
                items_created = ?,
                items_updated = ?,
                items_deleted = ?,
                items_skipped = ?,
                items_failed = ?,
                items_not_dispatched = ?,
                abort_reason = ?,
                completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(record.status.as_str())
        .bind(record.stats.planned as i64)
        .bind(record.stats.created as i64)
        .bind(record.stats.updated as i64)
        .bind(record.stats.deleted as i64)
        .bind(record.stats.skipped as i64)
        .bind(record.stats.failed as i64)
        .bind(record.stats.not_dispatched as i64)
        .bind(&record.abort_reason)
        .bind(record.completed_at)
        .bind(record.id.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::Database(format!(
                "Run not found: {}",
                record.id
            )));
        }

        Ok(())
    }

    async fn find_by_id(&self, id: &RunId) -> Result<Option<RunRecord>> {
        let row = sqlx::query_as::<_, RunRow>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        row.map(RunRecord::try_from).transpose()
    }

    async fn recent(&self, limit: u32) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query_as::<_, RunRow>(&format!(
            "{} ORDER BY started_at DESC, id DESC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        rows.into_iter()
            .map(RunRecord::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn latest_id(&self) -> Result<Option<RunId>> {
        let id: Option<String> = sqlx::query_scalar("SELECT MAX(id) FROM sync_runs")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        id.as_deref().map(RunId::from_string).transpose()
    }

    async fn abort_stale(&self, reason: &str, completed_at: i64) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE sync_runs SET status = 'aborted', abort_reason = ?, completed_at = ?
            WHERE status = 'running'
            "#,
        )
        .bind(reason)
        .bind(completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::{ItemFailure, RunSummary};
    use chrono::{TimeZone, Utc};
    use core_library::db::create_test_pool;

    async fn repo() -> SqliteRunHistoryRepository {
        SqliteRunHistoryRepository::new(create_test_pool().await.unwrap())
    }

    fn run_id(s: &str) -> RunId {
        RunId::from_string(s).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = repo().await;
        let record = RunRecord::started(run_id("20250101-120000-000"), "/photos", 1_000);
        repo.insert(&record).await.unwrap();

        let found = repo.find_by_id(&record.id).await.unwrap().unwrap();
        assert_eq!(found, record);
        assert_eq!(found.status, RunStatus::Running);

        assert!(repo
            .find_by_id(&run_id("20250101-120000-001"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_finish_updates_counts_and_outcome() {
        let repo = repo().await;
        let started = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let record = RunRecord::started(
            run_id("20250101-120000-000"),
            "/photos",
            started.timestamp_millis(),
        );
        repo.insert(&record).await.unwrap();

        let summary = RunSummary {
            run_id: record.id.clone(),
            outcome: RunOutcome::Aborted {
                reason: "quota exhausted".to_string(),
            },
            stats: RunStats {
                planned: 10,
                created: 3,
                updated: 1,
                deleted: 0,
                skipped: 5,
                failed: 1,
                not_dispatched: 5,
            },
            failures: vec![ItemFailure::scan("x.jpg", "denied")],
            warnings: Vec::new(),
            started_at: started,
            completed_at: started + chrono::Duration::seconds(2),
        };
        let finished = record.finish(&summary);
        repo.update(&finished).await.unwrap();

        let found = repo.find_by_id(&finished.id).await.unwrap().unwrap();
        assert_eq!(found.status, RunStatus::Aborted);
        assert_eq!(found.stats, summary.stats);
        assert_eq!(found.abort_reason.as_deref(), Some("quota exhausted"));
        assert_eq!(
            found.completed_at,
            Some(started.timestamp_millis() + 2_000)
        );
    }

    #[tokio::test]
    async fn test_update_missing_run_fails() {
        let repo = repo().await;
        let record = RunRecord::started(run_id("20250101-120000-000"), "/photos", 1);
        assert!(matches!(
            repo.update(&record).await,
            Err(SyncError::Database(_))
        ));
    }

    #[tokio::test]
    async fn test_recent_and_abort_stale() {
        let repo = repo().await;
        assert_eq!(repo.latest_id().await.unwrap(), None);
        for (i, id) in ["20250101-120000-000", "20250102-120000-000", "20250103-120000-000"]
            .iter()
            .enumerate()
        {
            repo.insert(&RunRecord::started(run_id(id), "/photos", i as i64))
                .await
                .unwrap();
        }

        assert_eq!(
            repo.latest_id().await.unwrap(),
            Some(run_id("20250103-120000-000"))
        );

        let recent = repo.recent(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id.as_str(), "20250103-120000-000");
        assert_eq!(recent[1].id.as_str(), "20250102-120000-000");

        let changed = repo.abort_stale("interrupted", 99).await.unwrap();
        assert_eq!(changed, 3);
        let all = repo.recent(10).await.unwrap();
        assert!(all.iter().all(|r| r.status == RunStatus::Aborted));
        assert!(all.iter().all(|r| r.completed_at == Some(99)));
        assert_eq!(repo.abort_stale("interrupted", 100).await.unwrap(), 0);
    }
}

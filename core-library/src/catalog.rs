//! # Catalog Store
//!
//! Persistent record of every item already pushed to the remote service.
//!
//! ## Overview
//!
//! The catalog is the single source of truth for what the remote side should
//! already hold. Each successful remote operation produces exactly one catalog
//! mutation, applied in a single SQLite transaction:
//!
//! - create/update: [`CatalogRepository::record_sync`] writes the item, its set
//!   and the membership together
//! - delete: [`CatalogRepository::delete`] removes the item; memberships
//!   cascade
//!
//! Writers are serialized by an async write gate. A write that still hits a
//! busy or locked database is retried by the store's [`RetryPolicy`] and
//! surfaces as [`CatalogError::Contention`] once the attempt ceiling is
//! reached.

use crate::error::{CatalogError, Result};
use crate::models::{ItemStatus, MediaItem, MediaSet};
use async_trait::async_trait;
use core_runtime::retry::{Backoff, RetryOutcome, RetryPolicy};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

// ============================================================================
// Repository Trait
// ============================================================================

/// Catalog persistence interface
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Find an item by its relative path
    async fn lookup(&self, path: &str) -> Result<Option<MediaItem>>;

    /// Insert or replace an item record
    ///
    /// Memberships listed in `item.set_ids` are added; existing memberships
    /// are kept.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the item has no remote identifier.
    async fn upsert(&self, item: &MediaItem) -> Result<()>;

    /// Delete an item and its memberships
    ///
    /// # Returns
    /// - `Ok(true)` if the item was deleted
    /// - `Ok(false)` if no item had that path
    async fn delete(&self, path: &str) -> Result<bool>;

    /// Every cataloged item, ordered by path
    async fn list_all(&self) -> Result<Vec<MediaItem>>;

    async fn count(&self) -> Result<u64>;

    /// Commit one successful create/update: the item, the optional set and
    /// the membership, all in one transaction.
    async fn record_sync(&self, item: &MediaItem, set: Option<&MediaSet>) -> Result<()>;

    async fn find_set_by_name(&self, name: &str) -> Result<Option<MediaSet>>;

    async fn upsert_set(&self, set: &MediaSet) -> Result<()>;

    /// Add an item to a set
    ///
    /// # Returns
    /// - `Ok(true)` if the membership was added
    /// - `Ok(false)` if it already existed
    async fn add_membership(&self, path: &str, set_remote_id: &str) -> Result<bool>;

    async fn list_sets(&self) -> Result<Vec<MediaSet>>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of [`CatalogRepository`]
pub struct SqliteCatalogStore {
    pool: SqlitePool,
    write_gate: Mutex<()>,
    retry: RetryPolicy,
}

#[derive(Debug, FromRow)]
struct MediaItemRow {
    path: String,
    size: i64,
    modified_at: i64,
    fingerprint: String,
    remote_id: String,
    status: String,
    last_synced_at: Option<i64>,
}

impl TryFrom<MediaItemRow> for MediaItem {
    type Error = CatalogError;

    fn try_from(row: MediaItemRow) -> Result<Self> {
        Ok(MediaItem {
            path: row.path,
            size: u64::try_from(row.size).map_err(|_| CatalogError::InvalidInput {
                field: "size".to_string(),
                message: format!("Negative size stored: {}", row.size),
            })?,
            modified_at: row.modified_at,
            fingerprint: row.fingerprint,
            remote_id: Some(row.remote_id),
            status: row.status.parse()?,
            last_synced_at: row.last_synced_at,
            set_ids: Vec::new(),
        })
    }
}

#[derive(Debug, FromRow)]
struct MediaSetRow {
    remote_id: String,
    name: String,
    created_at: i64,
}

impl From<MediaSetRow> for MediaSet {
    fn from(row: MediaSetRow) -> Self {
        MediaSet {
            remote_id: row.remote_id,
            name: row.name,
            created_at: row.created_at,
        }
    }
}

impl SqliteCatalogStore {
    /// Create a store with the default contention policy (5 attempts, 50ms apart).
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_retry(pool, RetryPolicy::new(5, Backoff::Fixed(Duration::from_millis(50))))
    }

    pub fn with_retry(pool: SqlitePool, retry: RetryPolicy) -> Self {
        Self {
            pool,
            write_gate: Mutex::new(()),
            retry,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn validate_item(item: &MediaItem) -> Result<()> {
        item.validate().map_err(|message| CatalogError::InvalidInput {
            field: "MediaItem".to_string(),
            message,
        })
    }

    fn validate_set(set: &MediaSet) -> Result<()> {
        set.validate().map_err(|message| CatalogError::InvalidInput {
            field: "MediaSet".to_string(),
            message,
        })
    }

    /// Run one write under the gate, retrying contention.
    async fn write<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let outcome = self
            .retry
            .run(|attempt| {
                let pending = op();
                async move {
                    let _gate = self.write_gate.lock().await;
                    if attempt > 1 {
                        debug!(operation, attempt, "Retrying catalog write");
                    }
                    pending.await
                }
            })
            .await;

        match outcome {
            RetryOutcome::Succeeded { value, .. } => Ok(value),
            RetryOutcome::Failed {
                error,
                attempts,
                exhausted: true,
            } => {
                warn!(operation, attempts, error = %error, "Catalog write contention exhausted");
                Err(CatalogError::Contention {
                    attempts,
                    message: error.to_string(),
                })
            }
            RetryOutcome::Failed { error, .. } | RetryOutcome::Fatal { error, .. } => Err(error),
        }
    }

    async fn load_set_ids(&self, path: &str) -> Result<Vec<String>> {
        let ids: Vec<(String,)> = sqlx::query_as(
            "SELECT set_remote_id FROM set_memberships WHERE item_path = ? ORDER BY set_remote_id",
        )
        .bind(path)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn upsert_once(&self, item: &MediaItem) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_item(&mut tx, item).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn record_sync_once(&self, item: &MediaItem, set: Option<&MediaSet>) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if let Some(set) = set {
            write_set(&mut tx, set).await?;
        }

        write_item(&mut tx, item).await?;

        if let Some(set) = set {
            insert_membership(&mut tx, &item.path, &set.remote_id).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_once(&self, path: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM media_items WHERE path = ?")
            .bind(path)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_set_once(&self, set: &MediaSet) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        write_set(&mut tx, set).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn add_membership_once(&self, path: &str, set_remote_id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let added = insert_membership(&mut tx, path, set_remote_id).await?;
        tx.commit().await?;
        Ok(added)
    }
}

async fn write_item(conn: &mut SqliteConnection, item: &MediaItem) -> Result<()> {
    let remote_id = item.remote_id.as_deref().unwrap_or_default();

    sqlx::query(
        r#"
        INSERT INTO media_items (
            path, size, modified_at, fingerprint, remote_id, status, last_synced_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(path) DO UPDATE SET
            size = excluded.size,
            modified_at = excluded.modified_at,
            fingerprint = excluded.fingerprint,
            remote_id = excluded.remote_id,
            status = excluded.status,
            last_synced_at = excluded.last_synced_at
        "#,
    )
    .bind(&item.path)
    .bind(item.size as i64)
    .bind(item.modified_at)
    .bind(&item.fingerprint)
    .bind(remote_id)
    .bind(item.status.as_str())
    .bind(item.last_synced_at)
    .execute(&mut *conn)
    .await?;

    for set_id in &item.set_ids {
        insert_membership(conn, &item.path, set_id).await?;
    }

    Ok(())
}

async fn write_set(conn: &mut SqliteConnection, set: &MediaSet) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO media_sets (remote_id, name, created_at)
        VALUES (?, ?, ?)
        ON CONFLICT(remote_id) DO UPDATE SET name = excluded.name
        "#,
    )
    .bind(&set.remote_id)
    .bind(&set.name)
    .bind(set.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn insert_membership(
    conn: &mut SqliteConnection,
    path: &str,
    set_remote_id: &str,
) -> Result<bool> {
    let result = sqlx::query(
        "INSERT OR IGNORE INTO set_memberships (item_path, set_remote_id) VALUES (?, ?)",
    )
    .bind(path)
    .bind(set_remote_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

#[async_trait]
impl CatalogRepository for SqliteCatalogStore {
    async fn lookup(&self, path: &str) -> Result<Option<MediaItem>> {
        let row: Option<MediaItemRow> = sqlx::query_as("SELECT * FROM media_items WHERE path = ?")
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut item = MediaItem::try_from(row)?;
        item.set_ids = self.load_set_ids(path).await?;
        Ok(Some(item))
    }

    async fn upsert(&self, item: &MediaItem) -> Result<()> {
        Self::validate_item(item)?;
        self.write("upsert", || self.upsert_once(item)).await
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        let deleted = self.write("delete", || self.delete_once(path)).await?;
        debug!(path, deleted, "Catalog item deleted");
        Ok(deleted)
    }

    async fn list_all(&self) -> Result<Vec<MediaItem>> {
        let rows: Vec<MediaItemRow> = sqlx::query_as("SELECT * FROM media_items ORDER BY path")
            .fetch_all(&self.pool)
            .await?;

        let memberships: Vec<(String, String)> = sqlx::query_as(
            "SELECT item_path, set_remote_id FROM set_memberships ORDER BY item_path, set_remote_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_path: HashMap<String, Vec<String>> = HashMap::new();
        for (path, set_id) in memberships {
            by_path.entry(path).or_default().push(set_id);
        }

        rows.into_iter()
            .map(|row| {
                let mut item = MediaItem::try_from(row)?;
                item.set_ids = by_path.remove(&item.path).unwrap_or_default();
                Ok(item)
            })
            .collect()
    }

    async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn record_sync(&self, item: &MediaItem, set: Option<&MediaSet>) -> Result<()> {
        Self::validate_item(item)?;
        if let Some(set) = set {
            Self::validate_set(set)?;
        }

        if !matches!(item.status, ItemStatus::New | ItemStatus::Modified) {
            return Err(CatalogError::InvalidInput {
                field: "status".to_string(),
                message: format!(
                    "Only new or modified items can be recorded, got {}",
                    item.status
                ),
            });
        }

        self.write("record_sync", || self.record_sync_once(item, set))
            .await
    }

    async fn find_set_by_name(&self, name: &str) -> Result<Option<MediaSet>> {
        let row: Option<MediaSetRow> = sqlx::query_as("SELECT * FROM media_sets WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(MediaSet::from))
    }

    async fn upsert_set(&self, set: &MediaSet) -> Result<()> {
        Self::validate_set(set)?;
        self.write("upsert_set", || self.upsert_set_once(set)).await
    }

    async fn add_membership(&self, path: &str, set_remote_id: &str) -> Result<bool> {
        self.write("add_membership", || {
            self.add_membership_once(path, set_remote_id)
        })
        .await
    }

    async fn list_sets(&self) -> Result<Vec<MediaSet>> {
        let rows: Vec<MediaSetRow> = sqlx::query_as("SELECT * FROM media_sets ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(MediaSet::from).collect())
    }
}

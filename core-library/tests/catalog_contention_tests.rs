//! Catalog writes against a file another connection holds write-locked.

use core_library::catalog::{CatalogRepository, SqliteCatalogStore};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::error::CatalogError;
use core_library::models::{ItemStatus, MediaItem};
use core_runtime::retry::{Backoff, RetryPolicy};
use sqlx::pool::PoolConnection;
use sqlx::Sqlite;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn item(path: &str) -> MediaItem {
    MediaItem::new(path, 1_024, 1_700_000_000, "fp").synced("remote-1", ItemStatus::New, 1)
}

/// Store whose connections give up on a busy database almost immediately.
async fn impatient_store(db_path: &Path, attempts: u32) -> SqliteCatalogStore {
    let pool = create_pool(
        DatabaseConfig::new(db_path)
            .max_connections(2)
            .busy_timeout(Duration::from_millis(10)),
    )
    .await
    .unwrap();
    SqliteCatalogStore::with_retry(
        pool,
        RetryPolicy::new(attempts, Backoff::Fixed(Duration::from_millis(5))),
    )
}

/// Open a second connection and take the write lock.
async fn hold_write_lock(db_path: &Path) -> PoolConnection<Sqlite> {
    let pool = create_pool(DatabaseConfig::new(db_path).max_connections(1))
        .await
        .unwrap();
    let mut conn = pool.acquire().await.unwrap();
    sqlx::query("BEGIN IMMEDIATE")
        .execute(&mut *conn)
        .await
        .unwrap();
    conn
}

#[tokio::test]
async fn held_write_lock_exhausts_retries_as_contention() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog.db");
    let store = impatient_store(&db_path, 3).await;
    let mut holder = hold_write_lock(&db_path).await;

    let err = store.upsert(&item("a.jpg")).await.unwrap_err();
    match &err {
        CatalogError::Contention { attempts, .. } => assert_eq!(*attempts, 3),
        other => panic!("expected contention, got {:?}", other),
    }
    assert!(err.is_transient());

    // Reads are not blocked by a pending writer.
    assert!(store.lookup("a.jpg").await.unwrap().is_none());

    sqlx::query("ROLLBACK")
        .execute(&mut *holder)
        .await
        .unwrap();
    store.upsert(&item("a.jpg")).await.unwrap();
    assert!(store.lookup("a.jpg").await.unwrap().is_some());
}

#[tokio::test]
async fn write_succeeds_once_lock_is_released_mid_retry() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog.db");
    let store = impatient_store(&db_path, 50).await;
    let mut holder = hold_write_lock(&db_path).await;

    let release = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(60)).await;
        sqlx::query("ROLLBACK")
            .execute(&mut *holder)
            .await
            .unwrap();
    });

    store.upsert(&item("b.jpg")).await.unwrap();
    release.await.unwrap();
    assert_eq!(store.count().await.unwrap(), 1);
}

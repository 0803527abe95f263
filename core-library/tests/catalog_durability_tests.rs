//! Catalog records survive closing and reopening a file-backed pool.

use core_library::catalog::{CatalogRepository, SqliteCatalogStore};
use core_library::db::{create_pool, DatabaseConfig};
use core_library::models::{ItemStatus, MediaItem, MediaSet};
use tempfile::TempDir;

#[tokio::test]
async fn committed_records_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog.db");

    let item = MediaItem::new("2024/Trip/IMG_0001.jpg", 2_048, 1_700_000_000, "c0ffee")
        .synced("remote-1", ItemStatus::New, 1_700_000_010);
    let set = MediaSet::new("set-1", "Trip", 1_700_000_010);

    {
        let pool = create_pool(DatabaseConfig::new(&db_path)).await.unwrap();
        let store = SqliteCatalogStore::new(pool.clone());
        store.record_sync(&item, Some(&set)).await.unwrap();
        pool.close().await;
    }

    let pool = create_pool(DatabaseConfig::new(&db_path)).await.unwrap();
    let store = SqliteCatalogStore::new(pool);

    let found = store
        .lookup("2024/Trip/IMG_0001.jpg")
        .await
        .unwrap()
        .expect("record should survive reopen");
    assert_eq!(found.remote_id.as_deref(), Some("remote-1"));
    assert_eq!(found.fingerprint, "c0ffee");
    assert_eq!(found.set_ids, vec!["set-1".to_string()]);
    assert_eq!(store.find_set_by_name("Trip").await.unwrap(), Some(set));
}

#[tokio::test]
async fn two_pools_on_one_file_see_each_others_commits() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("catalog.db");

    let writer = SqliteCatalogStore::new(create_pool(DatabaseConfig::new(&db_path)).await.unwrap());
    let reader = SqliteCatalogStore::new(create_pool(DatabaseConfig::new(&db_path)).await.unwrap());

    let item = MediaItem::new("a.png", 10, 0, "aa").synced("r-a", ItemStatus::New, 1);
    writer.upsert(&item).await.unwrap();

    assert_eq!(reader.count().await.unwrap(), 1);
    assert!(reader.delete("a.png").await.unwrap());
    assert_eq!(writer.lookup("a.png").await.unwrap(), None);
}

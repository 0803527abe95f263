//! Read-only comparison of the catalog with the remote listing.
//!
//! An audit reports remote entries the catalog does not know (orphans) and
//! catalog records whose remote identifier the service no longer lists
//! (dangling). It holds the run lock while it reads so it never observes a
//! half-applied run, and it changes nothing on either side.

use crate::error::{Result, SyncError};
use crate::rate_limiter::RateLimiter;
use crate::run_lock;
use bridge_traits::{RemoteCatalog, RemoteEntry};
use core_library::{CatalogRepository, MediaItem};
use core_runtime::retry::RetryPolicy;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, instrument};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub remote_total: usize,
    pub catalog_total: usize,
    /// Listed remotely, unknown to the catalog
    pub remote_orphans: Vec<RemoteEntry>,
    /// Cataloged, missing from the remote listing
    pub dangling: Vec<MediaItem>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.remote_orphans.is_empty() && self.dangling.is_empty()
    }
}

/// Compare the catalog with the remote listing under the run lock.
///
/// # Errors
///
/// - [`SyncError::Lock`] if a run is in progress
/// - [`SyncError::Remote`] if listing fails after retries
/// - [`SyncError::Catalog`] if the catalog cannot be read
#[instrument(skip(remote, catalog, limiter, retry), fields(lock_path = %lock_path.display()))]
pub async fn audit(
    lock_path: &Path,
    remote: &dyn RemoteCatalog,
    catalog: &dyn CatalogRepository,
    limiter: &RateLimiter,
    retry: &RetryPolicy,
) -> Result<AuditReport> {
    let guard = run_lock::try_acquire(lock_path, "audit")?;

    let items = catalog.list_all().await?;
    let entries = retry
        .run(|_attempt| async move {
            limiter.acquire().await;
            remote.list().await
        })
        .await
        .into_result()
        .map_err(SyncError::Remote)?;

    guard.release();

    let report = compare(entries, items);
    info!(
        remote_total = report.remote_total,
        catalog_total = report.catalog_total,
        orphans = report.remote_orphans.len(),
        dangling = report.dangling.len(),
        "Audit finished"
    );
    Ok(report)
}

fn compare(entries: Vec<RemoteEntry>, items: Vec<MediaItem>) -> AuditReport {
    let remote_ids: HashSet<&str> = entries.iter().map(|e| e.remote_id.as_str()).collect();
    let known_ids: HashSet<&str> = items.iter().filter_map(|i| i.remote_id.as_deref()).collect();

    let remote_orphans = entries
        .iter()
        .filter(|e| !known_ids.contains(e.remote_id.as_str()))
        .cloned()
        .collect();
    let dangling = items
        .iter()
        .filter(|i| {
            i.remote_id
                .as_deref()
                .is_some_and(|id| !remote_ids.contains(id))
        })
        .cloned()
        .collect();

    AuditReport {
        remote_total: entries.len(),
        catalog_total: items.len(),
        remote_orphans,
        dangling,
    }
}

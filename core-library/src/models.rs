//! Catalog domain models.

use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Item Status
// ============================================================================

/// Classification of an item relative to the catalog.
///
/// Persisted records carry the classification that produced their last
/// successful commit: `New` after a create, `Modified` after an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    New,
    Unchanged,
    Modified,
    Deleted,
    Failed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::New => "new",
            ItemStatus::Unchanged => "unchanged",
            ItemStatus::Modified => "modified",
            ItemStatus::Deleted => "deleted",
            ItemStatus::Failed => "failed",
        }
    }
}

impl FromStr for ItemStatus {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(ItemStatus::New),
            "unchanged" => Ok(ItemStatus::Unchanged),
            "modified" => Ok(ItemStatus::Modified),
            "deleted" => Ok(ItemStatus::Deleted),
            "failed" => Ok(ItemStatus::Failed),
            _ => Err(CatalogError::InvalidInput {
                field: "status".to_string(),
                message: format!("Unknown item status: {}", s),
            }),
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Media Item
// ============================================================================

/// A local media file and its last known synchronized state.
///
/// Identity is the path relative to the synchronized root, always with `/`
/// separators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub path: String,
    pub size: u64,
    /// Modification time (Unix epoch seconds)
    pub modified_at: i64,
    /// Lowercase hex SHA-256 of the uploaded bytes
    pub fingerprint: String,
    pub remote_id: Option<String>,
    pub status: ItemStatus,
    /// When the last successful remote operation committed (Unix epoch seconds)
    pub last_synced_at: Option<i64>,
    /// Remote identifiers of the sets this item belongs to
    pub set_ids: Vec<String>,
}

impl MediaItem {
    /// A freshly scanned, never synchronized item.
    pub fn new(
        path: impl Into<String>,
        size: u64,
        modified_at: i64,
        fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            size,
            modified_at,
            fingerprint: fingerprint.into(),
            remote_id: None,
            status: ItemStatus::New,
            last_synced_at: None,
            set_ids: Vec::new(),
        }
    }

    /// Mark the item as committed under `remote_id`.
    pub fn synced(mut self, remote_id: impl Into<String>, status: ItemStatus, at: i64) -> Self {
        self.remote_id = Some(remote_id.into());
        self.status = status;
        self.last_synced_at = Some(at);
        self
    }

    pub fn is_synced(&self) -> bool {
        self.remote_id.is_some()
    }

    /// Validate the item before it is written to the catalog.
    pub fn validate(&self) -> Result<(), String> {
        if self.path.trim().is_empty() {
            return Err("Item path cannot be empty".to_string());
        }

        if self.path.starts_with('/') || self.path.contains('\\') {
            return Err(format!(
                "Item path must be relative with '/' separators: {}",
                self.path
            ));
        }

        if self.fingerprint.is_empty() {
            return Err("Item fingerprint cannot be empty".to_string());
        }

        match self.remote_id.as_deref() {
            None => Err(format!("Item {} has no remote identifier", self.path)),
            Some(id) if id.trim().is_empty() => {
                Err(format!("Item {} has an empty remote identifier", self.path))
            }
            Some(_) => Ok(()),
        }
    }
}

// ============================================================================
// Media Set
// ============================================================================

/// A remote set (album) grouping items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaSet {
    pub remote_id: String,
    pub name: String,
    /// Unix epoch seconds
    pub created_at: i64,
}

impl MediaSet {
    pub fn new(remote_id: impl Into<String>, name: impl Into<String>, created_at: i64) -> Self {
        Self {
            remote_id: remote_id.into(),
            name: name.into(),
            created_at,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.remote_id.trim().is_empty() {
            return Err("Set remote identifier cannot be empty".to_string());
        }
        if self.name.trim().is_empty() {
            return Err("Set name cannot be empty".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_names() {
        for status in [
            ItemStatus::New,
            ItemStatus::Unchanged,
            ItemStatus::Modified,
            ItemStatus::Deleted,
            ItemStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<ItemStatus>().unwrap(), status);
        }
        assert!("pending".parse::<ItemStatus>().is_err());
    }

    #[test]
    fn test_item_validation() {
        let item = MediaItem::new("2024/beach.jpg", 10, 1_700_000_000, "ab12");
        assert!(item.validate().unwrap_err().contains("no remote identifier"));

        let item = item.synced("r-1", ItemStatus::New, 1_700_000_100);
        assert!(item.validate().is_ok());
        assert!(item.is_synced());
        assert_eq!(item.last_synced_at, Some(1_700_000_100));

        let windows = MediaItem::new("2024\\beach.jpg", 10, 0, "ab12").synced("r", ItemStatus::New, 0);
        assert!(windows.validate().is_err());

        let absolute = MediaItem::new("/etc/passwd", 10, 0, "ab12").synced("r", ItemStatus::New, 0);
        assert!(absolute.validate().is_err());
    }

    #[test]
    fn test_set_validation() {
        assert!(MediaSet::new("s-1", "Holidays", 0).validate().is_ok());
        assert!(MediaSet::new("", "Holidays", 0).validate().is_err());
        assert!(MediaSet::new("s-1", " ", 0).validate().is_err());
    }
}

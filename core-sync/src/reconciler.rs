//! # Reconciler
//!
//! Pure diff of a scan against a catalog snapshot.
//!
//! ## Rules
//!
//! - path not cataloged: `Create`
//! - cataloged with the same fingerprint: unchanged, no operation
//! - cataloged with a different fingerprint: `Update`, carrying the existing
//!   remote identifier forward
//! - cataloged but not observed in the scan: `Delete`, unless the record is
//!   excluded by the current rules or exceeds the size ceiling
//!
//! Modification time never decides anything; only the fingerprint does.
//! Oversized and unreadable files still count as observed, so a file that
//! exists locally is never deleted remotely. A directory the walk could not
//! read shields every record beneath it; a failure on the root shields the
//! whole catalog. Deletes come after every
//! create and update in the plan. A rename is an independent delete and
//! create.

use crate::exclusion::ExclusionRules;
use crate::scanner::{ScanCandidate, ScanEntry};
use bridge_traits::MediaUpload;
use core_library::{ItemStatus, MediaItem};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

// ============================================================================
// Operations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One remote mutation to perform for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub kind: OperationKind,
    /// Target item. For updates and deletes it carries the cataloged remote id.
    pub item: MediaItem,
    /// Bytes to push; present for creates and updates
    pub upload: Option<MediaUpload>,
    pub set_name: Option<String>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl Operation {
    fn create(candidate: ScanCandidate) -> Self {
        let item = MediaItem::new(
            candidate.path.clone(),
            candidate.size,
            candidate.modified_at,
            candidate.fingerprint.clone(),
        );
        Self::with_upload(OperationKind::Create, item, candidate)
    }

    fn update(candidate: ScanCandidate, existing: &MediaItem) -> Self {
        let mut item = MediaItem::new(
            candidate.path.clone(),
            candidate.size,
            candidate.modified_at,
            candidate.fingerprint.clone(),
        );
        item.remote_id = existing.remote_id.clone();
        item.status = ItemStatus::Modified;
        item.set_ids = existing.set_ids.clone();
        Self::with_upload(OperationKind::Update, item, candidate)
    }

    fn delete(existing: &MediaItem) -> Self {
        let mut item = existing.clone();
        item.status = ItemStatus::Deleted;
        Self {
            kind: OperationKind::Delete,
            item,
            upload: None,
            set_name: None,
            attempts: 0,
            last_error: None,
        }
    }

    fn with_upload(kind: OperationKind, item: MediaItem, candidate: ScanCandidate) -> Self {
        let title = Path::new(&candidate.path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| candidate.path.clone());

        Self {
            kind,
            item,
            upload: Some(MediaUpload {
                path: candidate.path,
                source: candidate.source,
                fingerprint: candidate.fingerprint,
                size: candidate.upload_size,
                modified_at: candidate.modified_at,
                title,
            }),
            set_name: candidate.set_name,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.item.path
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.item.remote_id.as_deref()
    }
}

/// A scanned path that could not be considered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFailure {
    pub path: String,
    pub message: String,
}

/// Ordered operations plus what the scan reported without an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Creates and updates in scan order, then deletes in path order
    pub operations: Vec<Operation>,
    pub unchanged: Vec<String>,
    pub oversized: Vec<String>,
    pub failures: Vec<ScanFailure>,
}

impl ReconcilePlan {
    pub fn count(&self, kind: OperationKind) -> usize {
        self.operations.iter().filter(|op| op.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }
}

// ============================================================================
// Reconcile
// ============================================================================

/// Diff `entries` against the catalog `snapshot` keyed by path.
pub fn reconcile<I>(
    entries: I,
    snapshot: &HashMap<String, MediaItem>,
    rules: &ExclusionRules,
) -> ReconcilePlan
where
    I: IntoIterator<Item = ScanEntry>,
{
    let mut plan = ReconcilePlan::default();
    let mut observed: HashSet<String> = HashSet::new();
    let mut unreadable: Vec<String> = Vec::new();

    for entry in entries {
        observed.insert(entry.path().to_string());
        if let ScanEntry::Failed { path, .. } = &entry {
            unreadable.push(path.clone());
        }

        match entry {
            ScanEntry::Candidate(candidate) => match snapshot.get(&candidate.path) {
                None => {
                    debug!(path = %candidate.path, "Create");
                    plan.operations.push(Operation::create(candidate));
                }
                Some(existing) if existing.fingerprint == candidate.fingerprint => {
                    plan.unchanged.push(candidate.path);
                }
                Some(existing) => {
                    debug!(path = %candidate.path, "Update");
                    plan.operations.push(Operation::update(candidate, existing));
                }
            },
            ScanEntry::Oversized { path, .. } => plan.oversized.push(path),
            ScanEntry::Failed { path, message } => plan.failures.push(ScanFailure { path, message }),
        }
    }

    let mut deletes: Vec<&MediaItem> = snapshot
        .values()
        .filter(|item| !observed.contains(&item.path))
        .filter(|item| !unreadable.iter().any(|dir| is_beneath(&item.path, dir)))
        .filter(|item| !rules.is_path_excluded(&item.path) && !rules.exceeds_size(item.size))
        .collect();
    deletes.sort_by(|a, b| a.path.cmp(&b.path));

    for item in deletes {
        debug!(path = %item.path, "Delete");
        plan.operations.push(Operation::delete(item));
    }

    plan
}

/// `path` is `dir` itself or lies inside it. The empty path is the root.
fn is_beneath(path: &str, dir: &str) -> bool {
    if dir.is_empty() {
        return true;
    }
    path.strip_prefix(dir)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_runtime::config::ExclusionConfig;
    use std::path::PathBuf;

    fn rules() -> ExclusionRules {
        ExclusionRules::from_config(&ExclusionConfig {
            folders: vec!["@eaDir".to_string()],
            allowed_extensions: vec!["jpg".to_string()],
            max_file_size_bytes: Some(1_000),
            ..ExclusionConfig::default()
        })
        .unwrap()
    }

    fn candidate(path: &str, fingerprint: &str, modified_at: i64) -> ScanEntry {
        ScanEntry::Candidate(ScanCandidate {
            path: path.to_string(),
            source: PathBuf::from("/root").join(path),
            size: 10,
            upload_size: 10,
            modified_at,
            fingerprint: fingerprint.to_string(),
            set_name: Some("album".to_string()),
        })
    }

    fn cataloged(path: &str, fingerprint: &str, remote_id: &str) -> MediaItem {
        MediaItem::new(path, 10, 100, fingerprint).synced(remote_id, ItemStatus::New, 100)
    }

    fn snapshot(items: Vec<MediaItem>) -> HashMap<String, MediaItem> {
        items.into_iter().map(|i| (i.path.clone(), i)).collect()
    }

    #[test]
    fn test_create_skip_update() {
        let catalog = snapshot(vec![
            cataloged("b.jpg", "fp-b", "r-b"),
            cataloged("c.jpg", "fp-c-old", "r-c"),
        ]);
        let plan = reconcile(
            vec![
                candidate("a.jpg", "fp-a", 1),
                candidate("b.jpg", "fp-b", 1),
                candidate("c.jpg", "fp-c-new", 1),
            ],
            &catalog,
            &rules(),
        );

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.operations[0].kind, OperationKind::Create);
        assert_eq!(plan.operations[0].path(), "a.jpg");
        assert_eq!(plan.operations[0].remote_id(), None);
        assert_eq!(plan.operations[0].set_name.as_deref(), Some("album"));

        assert_eq!(plan.operations[1].kind, OperationKind::Update);
        assert_eq!(plan.operations[1].remote_id(), Some("r-c"));
        assert_eq!(plan.operations[1].item.status, ItemStatus::Modified);
        let upload = plan.operations[1].upload.as_ref().unwrap();
        assert_eq!(upload.title, "c");
        assert_eq!(upload.fingerprint, "fp-c-new");

        assert_eq!(plan.unchanged, vec!["b.jpg".to_string()]);
    }

    #[test]
    fn test_fingerprint_is_authoritative_over_mtime() {
        let catalog = snapshot(vec![cataloged("a.jpg", "fp-a", "r-a")]);

        let touched = reconcile(vec![candidate("a.jpg", "fp-a", 999)], &catalog, &rules());
        assert!(touched.is_empty());
        assert_eq!(touched.unchanged.len(), 1);

        let rewritten = reconcile(vec![candidate("a.jpg", "fp-a2", 100)], &catalog, &rules());
        assert_eq!(rewritten.count(OperationKind::Update), 1);
    }

    #[test]
    fn test_unchanged_tree_is_empty_plan() {
        let catalog = snapshot(vec![
            cataloged("a.jpg", "fp-a", "r-a"),
            cataloged("x/b.jpg", "fp-b", "r-b"),
        ]);
        let plan = reconcile(
            vec![candidate("a.jpg", "fp-a", 1), candidate("x/b.jpg", "fp-b", 1)],
            &catalog,
            &rules(),
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn test_missing_items_become_deletes_after_uploads() {
        let catalog = snapshot(vec![
            cataloged("z.jpg", "fp-z", "r-z"),
            cataloged("gone.jpg", "fp-g", "r-g"),
        ]);
        let plan = reconcile(
            vec![candidate("new.jpg", "fp-n", 1), candidate("z.jpg", "fp-z2", 1)],
            &catalog,
            &rules(),
        );

        let kinds: Vec<OperationKind> = plan.operations.iter().map(|op| op.kind).collect();
        assert_eq!(
            kinds,
            vec![
                OperationKind::Create,
                OperationKind::Update,
                OperationKind::Delete
            ]
        );
        let delete = &plan.operations[2];
        assert_eq!(delete.path(), "gone.jpg");
        assert_eq!(delete.remote_id(), Some("r-g"));
        assert_eq!(delete.item.status, ItemStatus::Deleted);
        assert!(delete.upload.is_none());
    }

    #[test]
    fn test_excluded_oversized_and_failed_records_are_not_deleted() {
        let mut big = cataloged("big.jpg", "fp-big", "r-big");
        big.size = 5_000;
        let catalog = snapshot(vec![
            cataloged("@eaDir/thumb.jpg", "fp-t", "r-t"),
            cataloged("notes.txt", "fp-n", "r-n"),
            big,
            cataloged("huge.jpg", "fp-h", "r-h"),
            cataloged("locked.jpg", "fp-l", "r-l"),
        ]);

        let plan = reconcile(
            vec![
                ScanEntry::Oversized {
                    path: "huge.jpg".to_string(),
                    size: 2_000,
                    limit: 1_000,
                },
                ScanEntry::Failed {
                    path: "locked.jpg".to_string(),
                    message: "Permission denied".to_string(),
                },
            ],
            &catalog,
            &rules(),
        );

        assert!(plan.is_empty(), "unexpected operations: {:?}", plan.operations);
        assert_eq!(plan.oversized, vec!["huge.jpg".to_string()]);
        assert_eq!(plan.failures.len(), 1);
        assert_eq!(plan.failures[0].path, "locked.jpg");
    }

    #[test]
    fn test_rename_is_delete_plus_create() {
        let catalog = snapshot(vec![cataloged("old.jpg", "fp-same", "r-old")]);
        let plan = reconcile(vec![candidate("new.jpg", "fp-same", 1)], &catalog, &rules());

        assert_eq!(plan.count(OperationKind::Create), 1);
        assert_eq!(plan.count(OperationKind::Delete), 1);
        assert_eq!(plan.operations[0].path(), "new.jpg");
        assert_eq!(plan.operations[1].path(), "old.jpg");
    }

    #[test]
    fn test_unreadable_directory_shields_its_records() {
        let catalog = snapshot(vec![
            cataloged("Album/a.jpg", "fp-a", "r-a"),
            cataloged("Album/Nested/b.jpg", "fp-b", "r-b"),
            cataloged("Album2/c.jpg", "fp-c", "r-c"),
        ]);
        let plan = reconcile(
            vec![ScanEntry::Failed {
                path: "Album".to_string(),
                message: "Permission denied (os error 13)".to_string(),
            }],
            &catalog,
            &rules(),
        );

        let deletes: Vec<&str> = plan.operations.iter().map(|op| op.path()).collect();
        assert_eq!(deletes, vec!["Album2/c.jpg"]);
        assert_eq!(plan.failures.len(), 1);
    }

    #[test]
    fn test_unreadable_root_deletes_nothing() {
        let catalog = snapshot(vec![
            cataloged("a.jpg", "fp-a", "r-a"),
            cataloged("x/b.jpg", "fp-b", "r-b"),
        ]);
        let plan = reconcile(
            vec![ScanEntry::Failed {
                path: String::new(),
                message: "Input/output error (os error 5)".to_string(),
            }],
            &catalog,
            &rules(),
        );
        assert!(plan.is_empty());
    }

    #[test]
    fn test_is_beneath() {
        assert!(is_beneath("Album/a.jpg", "Album"));
        assert!(is_beneath("Album", "Album"));
        assert!(is_beneath("anything.jpg", ""));
        assert!(!is_beneath("Album2/a.jpg", "Album"));
        assert!(!is_beneath("Albums.jpg", "Album"));
    }
}

//! # Local Tree Scanner
//!
//! Walks the synchronized root and yields one [`ScanEntry`] per file that
//! survives the exclusion rules.
//!
//! ## Overview
//!
//! - Excluded directories are pruned from the walk, never descended into
//! - Exclusion is decided from the relative path before any bytes are read
//! - Oversized files are reported, not fingerprinted
//! - Raw files are converted first when a converter is installed; the
//!   converted bytes are fingerprinted and uploaded under the original path
//! - Unreadable entries and conversion failures become [`ScanEntry::Failed`]
//!   and the walk continues
//!
//! The scan is lazy ([`ScanIter`] is an `Iterator`) and keeps no state
//! between runs. It is blocking I/O; the coordinator drives it from
//! `spawn_blocking`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let scanner = Scanner::new(root, Arc::new(rules)).set_from_folder(true);
//! for entry in scanner.scan() {
//!     match entry {
//!         ScanEntry::Candidate(c) => println!("{} {}", c.path, c.fingerprint),
//!         ScanEntry::Oversized { path, .. } => println!("too large: {}", path),
//!         ScanEntry::Failed { path, message } => println!("{}: {}", path, message),
//!     }
//! }
//! ```

use crate::exclusion::ExclusionRules;
use bridge_traits::RawConverter;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

const READ_BUFFER_SIZE: usize = 64 * 1024;

// ============================================================================
// Scan Output
// ============================================================================

/// A file eligible for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCandidate {
    /// Relative path with `/` separators
    pub path: String,
    /// Absolute path of the bytes to upload (the converted file for raws)
    pub source: PathBuf,
    /// Size of the local file
    pub size: u64,
    /// Size of the bytes at `source`
    pub upload_size: u64,
    /// Local modification time, Unix seconds
    pub modified_at: i64,
    /// Lowercase hex SHA-256 of the bytes at `source`
    pub fingerprint: String,
    /// Remote set the item belongs in, from its parent folder
    pub set_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEntry {
    Candidate(ScanCandidate),
    /// Skipped because it exceeds the size ceiling
    Oversized { path: String, size: u64, limit: u64 },
    /// Could not be read or converted
    Failed { path: String, message: String },
}

impl ScanEntry {
    pub fn path(&self) -> &str {
        match self {
            ScanEntry::Candidate(candidate) => &candidate.path,
            ScanEntry::Oversized { path, .. } => path,
            ScanEntry::Failed { path, .. } => path,
        }
    }
}

// ============================================================================
// Scanner
// ============================================================================

#[derive(Clone)]
pub struct Scanner {
    root: PathBuf,
    rules: Arc<ExclusionRules>,
    converter: Option<Arc<dyn RawConverter>>,
    set_from_folder: bool,
}

impl Scanner {
    pub fn new(root: impl Into<PathBuf>, rules: Arc<ExclusionRules>) -> Self {
        Self {
            root: root.into(),
            rules,
            converter: None,
            set_from_folder: false,
        }
    }

    pub fn with_converter(mut self, converter: Arc<dyn RawConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn set_from_folder(mut self, enabled: bool) -> Self {
        self.set_from_folder = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a fresh walk of the root.
    pub fn scan(&self) -> ScanIter {
        let rules = Arc::clone(&self.rules);
        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| !is_pruned(entry, &rules));

        ScanIter {
            scanner: self.clone(),
            walker: Box::new(walker),
        }
    }

    fn relative_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut parts = Vec::new();
        for component in relative.components() {
            parts.push(component.as_os_str().to_str()?);
        }
        Some(parts.join("/"))
    }

    fn process(&self, entry: DirEntry) -> Option<ScanEntry> {
        let file_type = entry.file_type();
        if !file_type.is_file() {
            if file_type.is_symlink() {
                debug!(path = %entry.path().display(), "Skipping symlink");
            }
            return None;
        }

        let Some(rel_path) = self.relative_path(entry.path()) else {
            return Some(ScanEntry::Failed {
                path: entry.path().to_string_lossy().into_owned(),
                message: "Path is not valid UTF-8".to_string(),
            });
        };

        if self.rules.is_path_excluded(&rel_path) {
            debug!(path = %rel_path, "Excluded");
            return None;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => return Some(failed(rel_path, e)),
        };

        let size = metadata.len();
        if self.rules.exceeds_size(size) {
            let limit = self.rules.max_file_size().unwrap_or_default();
            debug!(path = %rel_path, size, limit, "Exceeds size ceiling");
            return Some(ScanEntry::Oversized {
                path: rel_path,
                size,
                limit,
            });
        }

        let modified_at = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        let (source, upload_size) = match self.converter_for(&rel_path) {
            Some(converter) => match converter.convert(entry.path()) {
                Ok(converted) => match std::fs::metadata(&converted) {
                    Ok(meta) => (converted, meta.len()),
                    Err(e) => return Some(failed(rel_path, e)),
                },
                Err(e) => {
                    warn!(path = %rel_path, error = %e, "Raw conversion failed");
                    return Some(failed(rel_path, e));
                }
            },
            None => (entry.path().to_path_buf(), size),
        };

        let fingerprint = match fingerprint_file(&source) {
            Ok(fingerprint) => fingerprint,
            Err(e) => return Some(failed(rel_path, e)),
        };

        let set_name = if self.set_from_folder {
            parent_folder_name(&rel_path)
        } else {
            None
        };

        Some(ScanEntry::Candidate(ScanCandidate {
            path: rel_path,
            source,
            size,
            upload_size,
            modified_at,
            fingerprint,
            set_name,
        }))
    }

    fn converter_for(&self, rel_path: &str) -> Option<&Arc<dyn RawConverter>> {
        if !self.rules.is_raw(rel_path) {
            return None;
        }
        let extension = Path::new(rel_path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())?;
        self.converter
            .as_ref()
            .filter(|converter| converter.handles(&extension))
    }
}

impl std::fmt::Debug for Scanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scanner")
            .field("root", &self.root)
            .field("converter", &self.converter.is_some())
            .field("set_from_folder", &self.set_from_folder)
            .finish()
    }
}

/// Lazy walk over the root. Yields entries in file-name order per directory.
pub struct ScanIter {
    scanner: Scanner,
    walker: Box<dyn Iterator<Item = walkdir::Result<DirEntry>> + Send>,
}

impl Iterator for ScanIter {
    type Item = ScanEntry;

    fn next(&mut self) -> Option<ScanEntry> {
        loop {
            match self.walker.next()? {
                Ok(entry) => {
                    if let Some(scanned) = self.scanner.process(entry) {
                        return Some(scanned);
                    }
                }
                Err(e) => {
                    let path = e
                        .path()
                        .and_then(|p| self.scanner.relative_path(p))
                        .unwrap_or_default();
                    warn!(path = %path, error = %e, "Failed to read directory entry");
                    return Some(ScanEntry::Failed {
                        path,
                        message: e.to_string(),
                    });
                }
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn is_pruned(entry: &DirEntry, rules: &ExclusionRules) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| rules.is_excluded_dir(name))
}

fn failed(path: String, err: impl std::fmt::Display) -> ScanEntry {
    warn!(path = %path, error = %err, "Skipping unreadable file");
    ScanEntry::Failed {
        path,
        message: err.to_string(),
    }
}

fn parent_folder_name(rel_path: &str) -> Option<String> {
    let (parent, _) = rel_path.rsplit_once('/')?;
    parent.rsplit('/').next().map(str::to_string)
}

/// Lowercase hex SHA-256 of a file's bytes.
pub fn fingerprint_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::BridgeError;
    use core_runtime::config::ExclusionConfig;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &[u8]) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn rules(config: ExclusionConfig) -> Arc<ExclusionRules> {
        Arc::new(ExclusionRules::from_config(&config).unwrap())
    }

    fn candidates(entries: &[ScanEntry]) -> Vec<&ScanCandidate> {
        entries
            .iter()
            .filter_map(|e| match e {
                ScanEntry::Candidate(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_scan_applies_exclusions_and_size_ceiling() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "2024/beach.jpg", b"beach");
        write(dir.path(), "2024/@eaDir/beach.jpg", b"thumb");
        write(dir.path(), "notes.txt", b"text");
        write(dir.path(), "big.jpg", &[0u8; 64]);

        let scanner = Scanner::new(
            dir.path(),
            rules(ExclusionConfig {
                folders: vec!["@eaDir".to_string()],
                allowed_extensions: vec!["jpg".to_string()],
                max_file_size_bytes: Some(32),
                ..ExclusionConfig::default()
            }),
        );
        let entries: Vec<ScanEntry> = scanner.scan().collect();

        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[1],
            ScanEntry::Oversized {
                path: "big.jpg".to_string(),
                size: 64,
                limit: 32
            }
        );
        let found = candidates(&entries);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].path, "2024/beach.jpg");
        assert_eq!(found[0].size, 5);
        assert_eq!(found[0].upload_size, 5);
    }

    #[test]
    fn test_fingerprint_depends_only_on_content() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/one.jpg", b"same bytes");
        write(dir.path(), "b/renamed.jpg", b"same bytes");
        write(dir.path(), "c/other.jpg", b"other bytes");

        let scanner = Scanner::new(dir.path(), rules(ExclusionConfig::default()));
        let entries: Vec<ScanEntry> = scanner.scan().collect();
        let found = candidates(&entries);

        assert_eq!(found.len(), 3);
        assert_eq!(found[0].fingerprint, found[1].fingerprint);
        assert_ne!(found[0].fingerprint, found[2].fingerprint);
        assert_eq!(found[0].fingerprint.len(), 64);
        assert_eq!(
            fingerprint_file(&dir.path().join("a/one.jpg")).unwrap(),
            found[0].fingerprint
        );
    }

    #[test]
    fn test_set_name_from_parent_folder() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "top.jpg", b"1");
        write(dir.path(), "2024/Holiday/sea.jpg", b"2");

        let scanner =
            Scanner::new(dir.path(), rules(ExclusionConfig::default())).set_from_folder(true);
        let entries: Vec<ScanEntry> = scanner.scan().collect();
        let found = candidates(&entries);

        assert_eq!(found[0].path, "2024/Holiday/sea.jpg");
        assert_eq!(found[0].set_name.as_deref(), Some("Holiday"));
        assert_eq!(found[1].path, "top.jpg");
        assert_eq!(found[1].set_name, None);
    }

    struct CopyConverter {
        out: TempDir,
    }

    impl RawConverter for CopyConverter {
        fn handles(&self, extension: &str) -> bool {
            extension == "nef"
        }

        fn convert(&self, source: &Path) -> bridge_traits::error::Result<PathBuf> {
            let bytes = fs::read(source)?;
            if bytes.starts_with(b"corrupt") {
                return Err(BridgeError::ConversionFailed {
                    path: source.to_path_buf(),
                    message: "unsupported raw".to_string(),
                });
            }
            let target = self.out.path().join("converted.jpg");
            fs::write(&target, [bytes.as_slice(), b"-converted"].concat())?;
            Ok(target)
        }
    }

    #[test]
    fn test_raw_conversion_fingerprints_converted_bytes() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "raw/IMG_1.NEF", b"raw");
        write(dir.path(), "raw/IMG_2.nef", b"corrupt");

        let exclusion = ExclusionConfig {
            allowed_extensions: vec!["jpg".to_string()],
            ..ExclusionConfig::default()
        };
        let rules = Arc::new(
            ExclusionRules::from_config(&exclusion)
                .unwrap()
                .with_raw_extensions(&["nef"]),
        );
        let converter = Arc::new(CopyConverter {
            out: TempDir::new().unwrap(),
        });
        let scanner = Scanner::new(dir.path(), rules).with_converter(converter);
        let entries: Vec<ScanEntry> = scanner.scan().collect();

        assert_eq!(entries.len(), 2);
        let ScanEntry::Candidate(converted) = &entries[0] else {
            panic!("expected candidate, got {:?}", entries[0]);
        };
        assert_eq!(converted.path, "raw/IMG_1.NEF");
        assert_eq!(converted.size, 3);
        assert_eq!(converted.upload_size, 13);
        assert_eq!(
            converted.fingerprint,
            format!("{:x}", Sha256::digest(b"raw-converted"))
        );
        assert!(matches!(&entries[1], ScanEntry::Failed { path, .. } if path == "raw/IMG_2.nef"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinks_are_not_followed() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "real/a.jpg", b"a");
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();

        let scanner = Scanner::new(dir.path(), rules(ExclusionConfig::default()));
        let paths: Vec<String> = scanner.scan().map(|e| e.path().to_string()).collect();
        assert_eq!(paths, vec!["real/a.jpg".to_string()]);
    }

    #[cfg(unix)]
    fn set_mode(path: &Path, mode: u32) {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_file_is_reported_and_scan_continues() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.jpg", b"a");
        write(dir.path(), "locked.jpg", b"secret");
        write(dir.path(), "z.jpg", b"z");
        let locked = dir.path().join("locked.jpg");
        set_mode(&locked, 0o000);
        if File::open(&locked).is_ok() {
            // Permission bits do not bind this user (root).
            set_mode(&locked, 0o644);
            return;
        }

        let scanner = Scanner::new(dir.path(), rules(ExclusionConfig::default()));
        let entries: Vec<ScanEntry> = scanner.scan().collect();
        set_mode(&locked, 0o644);

        assert_eq!(entries.len(), 3);
        assert!(matches!(
            &entries[1],
            ScanEntry::Failed { path, .. } if path == "locked.jpg"
        ));
        let found: Vec<&str> = candidates(&entries).iter().map(|c| c.path.as_str()).collect();
        assert_eq!(found, vec!["a.jpg", "z.jpg"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_reported_and_not_deleted() {
        use crate::reconciler::reconcile;
        use core_library::{ItemStatus, MediaItem};
        use std::collections::HashMap;

        let dir = TempDir::new().unwrap();
        write(dir.path(), "Album/a.jpg", b"a");
        write(dir.path(), "top.jpg", b"top");
        let album = dir.path().join("Album");
        set_mode(&album, 0o000);
        if fs::read_dir(&album).is_ok() {
            set_mode(&album, 0o755);
            return;
        }

        let rules = rules(ExclusionConfig::default());
        let scanner = Scanner::new(dir.path(), Arc::clone(&rules));
        let entries: Vec<ScanEntry> = scanner.scan().collect();
        set_mode(&album, 0o755);

        assert!(entries
            .iter()
            .any(|e| matches!(e, ScanEntry::Failed { path, .. } if path == "Album")));
        assert_eq!(candidates(&entries).len(), 1);

        let cataloged = MediaItem::new("Album/a.jpg", 1, 1, "fp-a").synced("r-a", ItemStatus::New, 1);
        let snapshot: HashMap<String, MediaItem> =
            [(cataloged.path.clone(), cataloged)].into_iter().collect();
        let plan = reconcile(entries, &snapshot, &rules);

        assert_eq!(plan.count(crate::reconciler::OperationKind::Delete), 0);
        assert_eq!(plan.count(crate::reconciler::OperationKind::Create), 1);
        assert_eq!(plan.failures.len(), 1);
    }
}

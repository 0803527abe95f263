//! # Exclusion Rules
//!
//! Immutable per-run predicate set deciding which local paths take part in a
//! run.
//!
//! A relative path is excluded when any of these hold:
//! - one of its directory components is an excluded folder name
//! - an exclusion regex finds a match anywhere in the relative path (`/`
//!   separators); patterns anchor themselves with `^` and `$`
//! - its extension is not allowed (an empty allow-list allows everything;
//!   raw extensions are allowed while raw conversion is enabled)
//!
//! The size ceiling is checked separately through [`ExclusionRules::exceeds_size`]
//! because oversized files are reported rather than silently skipped.

use crate::error::{Result, SyncError};
use core_runtime::config::{ExclusionConfig, SyncConfig};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ExclusionRules {
    folders: HashSet<String>,
    patterns: Vec<Regex>,
    allowed_extensions: HashSet<String>,
    raw_extensions: HashSet<String>,
    max_file_size: Option<u64>,
}

impl ExclusionRules {
    /// Compile the rules.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first invalid pattern.
    pub fn from_config(config: &ExclusionConfig) -> Result<Self> {
        let patterns = config
            .patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    SyncError::Config(core_runtime::Error::Config(format!(
                        "Invalid exclusion pattern '{}': {}",
                        pattern, e
                    )))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            folders: config.folders.iter().cloned().collect(),
            patterns,
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            raw_extensions: HashSet::new(),
            max_file_size: config.max_file_size_bytes,
        })
    }

    /// Rules for a whole run, including raw extensions when conversion is on.
    pub fn for_sync(config: &SyncConfig) -> Result<Self> {
        let rules = Self::from_config(&config.exclusions)?;
        if config.raw_conversion.enabled {
            Ok(rules.with_raw_extensions(&config.raw_conversion.extensions))
        } else {
            Ok(rules)
        }
    }

    pub fn with_raw_extensions<S: AsRef<str>>(mut self, extensions: &[S]) -> Self {
        self.raw_extensions = extensions
            .iter()
            .map(|e| e.as_ref().to_lowercase())
            .collect();
        self
    }

    /// Whether a directory with this name is pruned from the walk.
    pub fn is_excluded_dir(&self, name: &str) -> bool {
        self.folders.contains(name)
    }

    /// Whether a file at `rel_path` is excluded by name, pattern or extension.
    pub fn is_path_excluded(&self, rel_path: &str) -> bool {
        let mut components: Vec<&str> = rel_path.split('/').collect();
        components.pop();
        if components.iter().any(|c| self.is_excluded_dir(c)) {
            return true;
        }

        if self.patterns.iter().any(|re| re.is_match(rel_path)) {
            return true;
        }

        !self.is_extension_allowed(rel_path)
    }

    pub fn exceeds_size(&self, size: u64) -> bool {
        self.max_file_size.is_some_and(|max| size > max)
    }

    pub fn max_file_size(&self) -> Option<u64> {
        self.max_file_size
    }

    /// Whether `rel_path` carries a raw extension handed to the converter.
    pub fn is_raw(&self, rel_path: &str) -> bool {
        extension_of(rel_path).is_some_and(|ext| self.raw_extensions.contains(&ext))
    }

    fn is_extension_allowed(&self, rel_path: &str) -> bool {
        if self.allowed_extensions.is_empty() {
            return true;
        }

        match extension_of(rel_path) {
            Some(ext) => self.allowed_extensions.contains(&ext) || self.raw_extensions.contains(&ext),
            None => false,
        }
    }
}

fn extension_of(rel_path: &str) -> Option<String> {
    Path::new(rel_path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(folders: &[&str], patterns: &[&str], extensions: &[&str]) -> ExclusionRules {
        ExclusionRules::from_config(&ExclusionConfig {
            folders: folders.iter().map(|s| s.to_string()).collect(),
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
            allowed_extensions: extensions.iter().map(|s| s.to_string()).collect(),
            max_file_size_bytes: Some(1000),
        })
        .unwrap()
    }

    #[test]
    fn test_folder_component_excludes() {
        let rules = rules(&["@eaDir", ".thumbnails"], &[], &[]);
        assert!(rules.is_path_excluded("2024/@eaDir/beach.jpg"));
        assert!(rules.is_path_excluded(".thumbnails/x.png"));
        assert!(!rules.is_path_excluded("2024/beach.jpg"));
        // A file named like an excluded folder is not a folder.
        assert!(!rules.is_path_excluded("2024/@eaDir"));
        assert!(rules.is_excluded_dir("@eaDir"));
    }

    #[test]
    fn test_regex_patterns() {
        let rules = rules(&[], &[r"^tmp/", r"\.part$"], &[]);
        assert!(rules.is_path_excluded("tmp/a.jpg"));
        assert!(rules.is_path_excluded("2024/a.jpg.part"));
        assert!(!rules.is_path_excluded("2024/tmp/a.jpg"));
    }

    #[test]
    fn test_unanchored_pattern_matches_anywhere() {
        let rules = rules(&[], &[r"Thumbs"], &[]);
        assert!(rules.is_path_excluded("Thumbs.jpg"));
        assert!(rules.is_path_excluded("2024/Thumbs/a.jpg"));
        assert!(rules.is_path_excluded("2024/myThumbsUp.jpg"));
        assert!(!rules.is_path_excluded("2024/thumbs.jpg"));
    }

    #[test]
    fn test_extension_allow_list_is_case_insensitive() {
        let rules = rules(&[], &[], &["jpg", "mov"]);
        assert!(!rules.is_path_excluded("a.JPG"));
        assert!(!rules.is_path_excluded("b/c.Mov"));
        assert!(rules.is_path_excluded("notes.txt"));
        assert!(rules.is_path_excluded("Makefile"));
    }

    #[test]
    fn test_raw_extensions_allowed_with_conversion() {
        let plain = rules(&[], &[], &["jpg"]);
        assert!(plain.is_path_excluded("IMG_1.NEF"));

        let with_raw = rules(&[], &[], &["jpg"]).with_raw_extensions(&["nef", "cr2"]);
        assert!(!with_raw.is_path_excluded("IMG_1.NEF"));
        assert!(with_raw.is_raw("IMG_1.NEF"));
        assert!(!with_raw.is_raw("IMG_1.jpg"));
    }

    #[test]
    fn test_size_ceiling() {
        let rules = rules(&[], &[], &[]);
        assert!(!rules.exceeds_size(1000));
        assert!(rules.exceeds_size(1001));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let result = ExclusionRules::from_config(&ExclusionConfig {
            patterns: vec!["[a-".to_string()],
            ..ExclusionConfig::default()
        });
        assert!(matches!(result, Err(SyncError::Config(_))));
    }
}

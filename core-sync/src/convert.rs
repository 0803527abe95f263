//! External raw-format converter.
//!
//! Runs `<tool> <source> <output>` for each raw file and returns the output
//! path. Outputs land in a scratch directory owned by the converter and
//! removed when it is dropped, so one converter lives for exactly one run.

use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{BridgeError, RawConverter};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use tempfile::TempDir;
use tracing::{debug, instrument};

const OUTPUT_EXTENSION: &str = "jpg";

pub struct ExternalToolConverter {
    tool: PathBuf,
    extensions: HashSet<String>,
    scratch: TempDir,
    sequence: AtomicU64,
}

impl ExternalToolConverter {
    /// Create a converter with a fresh scratch directory.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Io`] if the scratch directory cannot be created.
    pub fn new<S: AsRef<str>>(tool: impl Into<PathBuf>, extensions: &[S]) -> BridgeResult<Self> {
        let scratch = tempfile::Builder::new().prefix("media-sync-raw-").tempdir()?;
        Ok(Self {
            tool: tool.into(),
            extensions: extensions
                .iter()
                .map(|e| e.as_ref().to_lowercase())
                .collect(),
            scratch,
            sequence: AtomicU64::new(0),
        })
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    fn output_path(&self, source: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "converted".to_string());
        // Sequence prefix keeps equal stems from different folders apart.
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.scratch
            .path()
            .join(format!("{:06}-{}.{}", n, stem, OUTPUT_EXTENSION))
    }
}

impl RawConverter for ExternalToolConverter {
    fn handles(&self, extension: &str) -> bool {
        self.extensions.contains(&extension.to_lowercase())
    }

    #[instrument(skip(self), fields(tool = %self.tool.display()))]
    fn convert(&self, source: &Path) -> BridgeResult<PathBuf> {
        let output = self.output_path(source);
        let conversion_failed = |message: String| BridgeError::ConversionFailed {
            path: source.to_path_buf(),
            message,
        };

        let result = Command::new(&self.tool)
            .arg(source)
            .arg(&output)
            .output()
            .map_err(|e| conversion_failed(format!("Failed to run converter: {}", e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(conversion_failed(format!(
                "Converter exited with {}: {}",
                result.status,
                stderr.trim()
            )));
        }

        if !output.is_file() {
            return Err(conversion_failed(
                "Converter produced no output file".to_string(),
            ));
        }

        debug!(output = %output.display(), "Converted raw file");
        Ok(output)
    }
}

impl std::fmt::Debug for ExternalToolConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalToolConverter")
            .field("tool", &self.tool)
            .field("extensions", &self.extensions)
            .field("scratch", &self.scratch.path())
            .finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_converts_with_copy_tool() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("IMG_1.NEF");
        fs::write(&source, b"raw bytes").unwrap();

        let converter = ExternalToolConverter::new("/bin/cp", &["nef"]).unwrap();
        assert!(converter.handles("NEF"));
        assert!(!converter.handles("jpg"));

        let output = converter.convert(&source).unwrap();
        assert!(output.starts_with(converter.scratch_dir()));
        assert_eq!(output.extension().unwrap(), "jpg");
        assert_eq!(fs::read(&output).unwrap(), b"raw bytes");

        let second = converter.convert(&source).unwrap();
        assert_ne!(output, second);
    }

    #[test]
    fn test_failing_tool_is_conversion_error() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("IMG_2.cr2");
        fs::write(&source, b"raw").unwrap();

        let converter = ExternalToolConverter::new("/bin/false", &["cr2"]).unwrap();
        match converter.convert(&source) {
            Err(BridgeError::ConversionFailed { path, .. }) => assert_eq!(path, source),
            other => panic!("expected ConversionFailed, got {:?}", other.map(|_| ())),
        }

        let missing = ExternalToolConverter::new("/nonexistent/tool", &["cr2"]).unwrap();
        assert!(matches!(
            missing.convert(&source),
            Err(BridgeError::ConversionFailed { .. })
        ));
    }

    #[test]
    fn test_scratch_dir_removed_on_drop() {
        let converter = ExternalToolConverter::new("/bin/cp", &["nef"]).unwrap();
        let scratch = converter.scratch_dir().to_path_buf();
        assert!(scratch.is_dir());
        drop(converter);
        assert!(!scratch.exists());
    }
}

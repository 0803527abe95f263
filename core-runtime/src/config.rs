//! # Sync Configuration Module
//!
//! Typed configuration for a synchronization run.
//!
//! ## Overview
//!
//! The configuration is built with [`SyncConfigBuilder`] and validated once,
//! at load time, before any scanning happens. Every recognized key has a
//! declared value kind and a validator; invalid input is rejected with an
//! [`Error::Config`] describing which key failed and why. Nothing is ever
//! evaluated as code.
//!
//! Hosts that read settings from a file or the environment hand the raw
//! `key = value` pairs to [`SyncConfig::from_pairs`], which applies the
//! [`CONFIG_SCHEMA`] to parse each value into its declared type.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::SyncConfig;
//!
//! let config = SyncConfig::builder()
//!     .root_dir("/home/me/Pictures")
//!     .catalog_path("/home/me/.media-sync/catalog.db")
//!     .exclude_folders(["@eaDir", ".thumbnails"])
//!     .allowed_extensions(["jpg", "png", "mov"])
//!     .rate_limit(1, std::time::Duration::from_secs(1))
//!     .build()?;
//! ```
//!
//! ```ignore
//! let config = SyncConfig::from_pairs([
//!     ("root_dir", "/home/me/Pictures"),
//!     ("catalog_path", "/home/me/.media-sync/catalog.db"),
//!     ("max_remote_attempts", "5"),
//!     ("backoff", "fixed"),
//! ])?;
//! ```

use crate::error::{Error, Result};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Raw extensions converted when raw conversion is enabled.
pub const DEFAULT_RAW_EXTENSIONS: &[&str] = &["nef", "cr2", "cr3", "arw", "dng", "orf", "rw2", "raf"];

const MAX_WORKERS: usize = 64;
const MAX_REMOTE_ATTEMPTS: u32 = 20;
const MAX_CATALOG_ATTEMPTS: u32 = 50;
const MAX_RATE_INTERVAL_MS: u64 = 3_600_000;
const MAX_BACKOFF_BASE_MS: u64 = 600_000;
const MAX_CATALOG_BACKOFF_MS: u64 = 10_000;

/// Configuration of a synchronization run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncConfig {
    /// Local directory tree to synchronize
    pub root_dir: PathBuf,

    /// SQLite catalog file
    pub catalog_path: PathBuf,

    /// Exclusive run lock file
    pub lock_path: PathBuf,

    pub exclusions: ExclusionConfig,

    pub rate_limit: RateLimitConfig,

    /// Retry discipline for remote calls
    pub remote_retry: RetryConfig,

    /// Retry discipline for catalog write contention
    pub catalog_retry: RetryConfig,

    pub raw_conversion: RawConversionConfig,

    /// Number of concurrent workers executing remote operations
    pub worker_count: usize,

    /// Place each item in a remote set named after its parent folder
    pub set_from_folder: bool,

    /// Emit a progress event every N completed operations
    pub progress_interval: u64,
}

/// Which local paths take part in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionConfig {
    /// Directory names skipped wherever they appear
    pub folders: Vec<String>,
    /// Regular expressions matched against the relative path
    pub patterns: Vec<String>,
    /// Lowercase extensions without the dot; empty allows every extension
    pub allowed_extensions: Vec<String>,
    /// Files larger than this are skipped and reported
    pub max_file_size_bytes: Option<u64>,
}

/// Remote call rate: at most `calls` per `interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitConfig {
    pub calls: u32,
    pub interval: Duration,
}

impl RateLimitConfig {
    /// Minimum spacing between two consecutive calls.
    pub fn min_interval(&self) -> Duration {
        self.interval / self.calls.max(1)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            calls: 1,
            interval: Duration::from_millis(1000),
        }
    }
}

/// Delay policy between two attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    None,
    Fixed,
    Exponential,
}

impl BackoffKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackoffKind::None => "none",
            BackoffKind::Fixed => "fixed",
            BackoffKind::Exponential => "exponential",
        }
    }
}

impl FromStr for BackoffKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(BackoffKind::None),
            "fixed" => Ok(BackoffKind::Fixed),
            "exponential" => Ok(BackoffKind::Exponential),
            other => Err(Error::Config(format!(
                "Unknown backoff policy '{}'. Expected one of: none, fixed, exponential",
                other
            ))),
        }
    }
}

/// Bounded retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryConfig {
    fn remote_default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffKind::Exponential,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(30_000),
        }
    }

    fn catalog_default() -> Self {
        Self {
            max_attempts: 5,
            backoff: BackoffKind::Fixed,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(50),
        }
    }
}

/// External conversion of camera raw files before upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawConversionConfig {
    pub enabled: bool,
    pub tool_path: Option<PathBuf>,
    /// Lowercase extensions handed to the converter
    pub extensions: Vec<String>,
}

impl Default for RawConversionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            tool_path: None,
            extensions: DEFAULT_RAW_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SyncConfig {
    /// Creates a new builder for constructing a `SyncConfig`.
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }

    /// Build a configuration from raw `key = value` pairs.
    ///
    /// Each key must appear in [`CONFIG_SCHEMA`]. Values are parsed according
    /// to the key's declared [`ValueKind`]; the resulting configuration is then
    /// validated like any builder-made one. A repeated key overrides the
    /// earlier value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for unknown keys, unparsable values, missing
    /// required keys and values that fail validation.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<SyncConfig>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut builder = SyncConfigBuilder::default();

        for (key, raw) in pairs {
            let key = key.as_ref().trim();
            let key_spec = ConfigKey::lookup(key).ok_or_else(|| {
                Error::Config(format!("Unknown configuration key '{}'", key))
            })?;
            let value = key_spec.parse(raw.as_ref())?;
            builder = builder.apply(key_spec.name, value)?;
        }

        builder.build()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(Error::Config("Root directory cannot be empty".to_string()));
        }

        if self.catalog_path.as_os_str().is_empty() {
            return Err(Error::Config("Catalog path cannot be empty".to_string()));
        }

        if self.lock_path.as_os_str().is_empty() {
            return Err(Error::Config("Lock path cannot be empty".to_string()));
        }

        if self.exclusions.folders.iter().any(|f| f.trim().is_empty()) {
            return Err(Error::Config(
                "Excluded folder names cannot be empty".to_string(),
            ));
        }

        for pattern in &self.exclusions.patterns {
            Regex::new(pattern).map_err(|e| {
                Error::Config(format!("Invalid exclusion pattern '{}': {}", pattern, e))
            })?;
        }

        if self
            .exclusions
            .allowed_extensions
            .iter()
            .any(|e| e.is_empty())
        {
            return Err(Error::Config(
                "Allowed extensions cannot contain empty entries".to_string(),
            ));
        }

        if self.exclusions.max_file_size_bytes == Some(0) {
            return Err(Error::Config(
                "Maximum file size must be greater than 0 bytes".to_string(),
            ));
        }

        if self.rate_limit.calls == 0 {
            return Err(Error::Config(
                "Rate limit must allow at least 1 call per interval".to_string(),
            ));
        }

        if self.rate_limit.interval.is_zero() {
            return Err(Error::Config(
                "Rate limit interval must be greater than 0ms".to_string(),
            ));
        }

        if self.rate_limit.interval > Duration::from_millis(MAX_RATE_INTERVAL_MS) {
            return Err(Error::Config(
                "Rate limit interval exceeds maximum of 1 hour (3,600,000ms)".to_string(),
            ));
        }

        validate_retry("Remote", &self.remote_retry, MAX_REMOTE_ATTEMPTS, MAX_BACKOFF_BASE_MS)?;
        validate_retry(
            "Catalog",
            &self.catalog_retry,
            MAX_CATALOG_ATTEMPTS,
            MAX_CATALOG_BACKOFF_MS,
        )?;

        if self.raw_conversion.enabled && self.raw_conversion.tool_path.is_none() {
            return Err(Error::Config(
                "Raw conversion enabled but no converter tool path provided. \
                 Set raw_converter_path or disable raw_conversion."
                    .to_string(),
            ));
        }

        if self.worker_count == 0 || self.worker_count > MAX_WORKERS {
            return Err(Error::Config(format!(
                "Worker count must be between 1 and {}",
                MAX_WORKERS
            )));
        }

        if self.progress_interval == 0 {
            return Err(Error::Config(
                "Progress interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn validate_retry(label: &str, retry: &RetryConfig, max_attempts: u32, max_base_ms: u64) -> Result<()> {
    if retry.max_attempts == 0 || retry.max_attempts > max_attempts {
        return Err(Error::Config(format!(
            "{} retry attempts must be between 1 and {}",
            label, max_attempts
        )));
    }

    if retry.base_delay > Duration::from_millis(max_base_ms) {
        return Err(Error::Config(format!(
            "{} backoff delay exceeds maximum of {}ms",
            label, max_base_ms
        )));
    }

    if retry.backoff == BackoffKind::Exponential && retry.max_delay < retry.base_delay {
        return Err(Error::Config(format!(
            "{} maximum backoff delay must not be lower than the base delay",
            label
        )));
    }

    Ok(())
}

/// Default lock file location: next to the catalog, with `.lock` appended to
/// the extension.
pub fn default_lock_path(catalog_path: &Path) -> PathBuf {
    let mut lock_path = catalog_path.to_path_buf();
    match lock_path.extension() {
        Some(ext) => {
            let new_ext = format!("{}.lock", ext.to_string_lossy());
            lock_path.set_extension(new_ext);
        }
        None => {
            lock_path.set_extension("lock");
        }
    }
    lock_path
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for constructing [`SyncConfig`] instances.
#[derive(Debug, Default)]
pub struct SyncConfigBuilder {
    root_dir: Option<PathBuf>,
    catalog_path: Option<PathBuf>,
    lock_path: Option<PathBuf>,
    exclusions: ExclusionConfig,
    rate_limit: Option<RateLimitConfig>,
    rate_limit_calls: Option<u32>,
    rate_limit_interval: Option<Duration>,
    remote_retry: Option<RetryConfig>,
    catalog_retry: Option<RetryConfig>,
    raw_conversion: RawConversionConfig,
    worker_count: Option<usize>,
    set_from_folder: Option<bool>,
    progress_interval: Option<u64>,
}

impl SyncConfigBuilder {
    /// Sets the local directory to synchronize (required).
    pub fn root_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.root_dir = Some(path.into());
        self
    }

    /// Sets the SQLite catalog location (required).
    pub fn catalog_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.catalog_path = Some(path.into());
        self
    }

    /// Sets the run lock location.
    ///
    /// Default: the catalog path with `.lock` appended to its extension.
    pub fn lock_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.lock_path = Some(path.into());
        self
    }

    pub fn exclude_folders<I, S>(mut self, folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusions.folders = folders.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude_patterns<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusions.patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Restricts the run to these extensions (case-insensitive, dot optional).
    pub fn allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.exclusions.allowed_extensions = extensions
            .into_iter()
            .map(|e| normalize_extension(e.as_ref()))
            .collect();
        self
    }

    pub fn max_file_size_bytes(mut self, size: u64) -> Self {
        self.exclusions.max_file_size_bytes = Some(size);
        self
    }

    /// Allows at most `calls` remote calls per `interval`.
    ///
    /// Default: 1 call per second
    pub fn rate_limit(mut self, calls: u32, interval: Duration) -> Self {
        self.rate_limit = Some(RateLimitConfig { calls, interval });
        self
    }

    pub fn remote_retry(mut self, retry: RetryConfig) -> Self {
        self.remote_retry = Some(retry);
        self
    }

    pub fn catalog_retry(mut self, retry: RetryConfig) -> Self {
        self.catalog_retry = Some(retry);
        self
    }

    /// Enables raw conversion through the given external tool.
    pub fn raw_converter<P: Into<PathBuf>>(mut self, tool_path: P) -> Self {
        self.raw_conversion.enabled = true;
        self.raw_conversion.tool_path = Some(tool_path.into());
        self
    }

    pub fn raw_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.raw_conversion.extensions = extensions
            .into_iter()
            .map(|e| normalize_extension(e.as_ref()))
            .collect();
        self
    }

    /// Default: 4
    pub fn worker_count(mut self, workers: usize) -> Self {
        self.worker_count = Some(workers);
        self
    }

    /// Default: true
    pub fn set_from_folder(mut self, enabled: bool) -> Self {
        self.set_from_folder = Some(enabled);
        self
    }

    /// Default: 10
    pub fn progress_interval(mut self, every: u64) -> Self {
        self.progress_interval = Some(every);
        self
    }

    /// Apply one parsed schema value.
    fn apply(mut self, key: &str, value: ConfigValue) -> Result<Self> {
        let remote = self.remote_retry.get_or_insert_with(RetryConfig::remote_default);
        let catalog = self
            .catalog_retry
            .get_or_insert_with(RetryConfig::catalog_default);

        match (key, value) {
            ("root_dir", ConfigValue::Path(p)) => self.root_dir = Some(p),
            ("catalog_path", ConfigValue::Path(p)) => self.catalog_path = Some(p),
            ("lock_path", ConfigValue::Path(p)) => self.lock_path = Some(p),
            ("exclude_folders", ConfigValue::List(l)) => self.exclusions.folders = l,
            ("exclude_patterns", ConfigValue::List(l)) => self.exclusions.patterns = l,
            ("allowed_extensions", ConfigValue::List(l)) => {
                self.exclusions.allowed_extensions =
                    l.iter().map(|e| normalize_extension(e)).collect()
            }
            ("max_file_size_bytes", ConfigValue::Integer(n)) => {
                self.exclusions.max_file_size_bytes = Some(n)
            }
            ("rate_limit_calls", ConfigValue::Integer(n)) => {
                self.rate_limit_calls = Some(to_u32(key, n)?)
            }
            ("rate_limit_interval_ms", ConfigValue::Integer(n)) => {
                self.rate_limit_interval = Some(Duration::from_millis(n))
            }
            ("max_remote_attempts", ConfigValue::Integer(n)) => {
                remote.max_attempts = to_u32(key, n)?
            }
            ("backoff", ConfigValue::Choice(c)) => remote.backoff = c.parse()?,
            ("backoff_base_ms", ConfigValue::Integer(n)) => {
                remote.base_delay = Duration::from_millis(n)
            }
            ("backoff_max_ms", ConfigValue::Integer(n)) => {
                remote.max_delay = Duration::from_millis(n)
            }
            ("max_catalog_attempts", ConfigValue::Integer(n)) => {
                catalog.max_attempts = to_u32(key, n)?
            }
            ("catalog_backoff_ms", ConfigValue::Integer(n)) => {
                catalog.base_delay = Duration::from_millis(n);
                catalog.max_delay = Duration::from_millis(n);
            }
            ("raw_conversion", ConfigValue::Bool(b)) => self.raw_conversion.enabled = b,
            ("raw_converter_path", ConfigValue::Path(p)) => {
                self.raw_conversion.tool_path = Some(p)
            }
            ("raw_extensions", ConfigValue::List(l)) => {
                self.raw_conversion.extensions =
                    l.iter().map(|e| normalize_extension(e)).collect()
            }
            ("worker_count", ConfigValue::Integer(n)) => {
                self.worker_count = Some(usize::try_from(n).map_err(|_| {
                    Error::Config(format!("Value for '{}' is out of range", key))
                })?)
            }
            ("set_from_folder", ConfigValue::Bool(b)) => self.set_from_folder = Some(b),
            ("progress_interval", ConfigValue::Integer(n)) => self.progress_interval = Some(n),
            (key, value) => {
                return Err(Error::Internal(format!(
                    "Schema mismatch for key '{}': {:?}",
                    key, value
                )))
            }
        }

        Ok(self)
    }

    /// Builds the final `SyncConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required setting is missing or any value
    /// fails validation.
    pub fn build(self) -> Result<SyncConfig> {
        let root_dir = self.root_dir.ok_or_else(|| {
            Error::Config("Root directory is required. Use .root_dir() to set it.".to_string())
        })?;

        let catalog_path = self.catalog_path.ok_or_else(|| {
            Error::Config(
                "Catalog path is required. Use .catalog_path() to set it.".to_string(),
            )
        })?;

        let lock_path = self
            .lock_path
            .unwrap_or_else(|| default_lock_path(&catalog_path));

        let mut rate_limit = self.rate_limit.unwrap_or_default();
        if let Some(calls) = self.rate_limit_calls {
            rate_limit.calls = calls;
        }
        if let Some(interval) = self.rate_limit_interval {
            rate_limit.interval = interval;
        }

        let config = SyncConfig {
            root_dir,
            catalog_path,
            lock_path,
            exclusions: self.exclusions,
            rate_limit,
            remote_retry: self.remote_retry.unwrap_or_else(RetryConfig::remote_default),
            catalog_retry: self
                .catalog_retry
                .unwrap_or_else(RetryConfig::catalog_default),
            raw_conversion: self.raw_conversion,
            worker_count: self.worker_count.unwrap_or(4),
            set_from_folder: self.set_from_folder.unwrap_or(true),
            progress_interval: self.progress_interval.unwrap_or(10),
        };

        config.validate()?;

        Ok(config)
    }
}

fn to_u32(key: &str, value: u64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::Config(format!("Value for '{}' is out of range", key)))
}

// ============================================================================
// Key Schema
// ============================================================================

/// Declared type of a configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Path,
    Bool,
    Integer,
    /// Comma-separated list
    List,
    /// One of a fixed set of names
    Choice(&'static [&'static str]),
}

/// A parsed configuration value.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ConfigValue {
    Path(PathBuf),
    Bool(bool),
    Integer(u64),
    List(Vec<String>),
    Choice(String),
}

/// One recognized configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigKey {
    pub name: &'static str,
    pub kind: ValueKind,
}

const BACKOFF_CHOICES: &[&str] = &["none", "fixed", "exponential"];

/// Every key understood by [`SyncConfig::from_pairs`].
pub const CONFIG_SCHEMA: &[ConfigKey] = &[
    ConfigKey { name: "root_dir", kind: ValueKind::Path },
    ConfigKey { name: "catalog_path", kind: ValueKind::Path },
    ConfigKey { name: "lock_path", kind: ValueKind::Path },
    ConfigKey { name: "exclude_folders", kind: ValueKind::List },
    ConfigKey { name: "exclude_patterns", kind: ValueKind::List },
    ConfigKey { name: "allowed_extensions", kind: ValueKind::List },
    ConfigKey { name: "max_file_size_bytes", kind: ValueKind::Integer },
    ConfigKey { name: "rate_limit_calls", kind: ValueKind::Integer },
    ConfigKey { name: "rate_limit_interval_ms", kind: ValueKind::Integer },
    ConfigKey { name: "max_remote_attempts", kind: ValueKind::Integer },
    ConfigKey { name: "backoff", kind: ValueKind::Choice(BACKOFF_CHOICES) },
    ConfigKey { name: "backoff_base_ms", kind: ValueKind::Integer },
    ConfigKey { name: "backoff_max_ms", kind: ValueKind::Integer },
    ConfigKey { name: "max_catalog_attempts", kind: ValueKind::Integer },
    ConfigKey { name: "catalog_backoff_ms", kind: ValueKind::Integer },
    ConfigKey { name: "raw_conversion", kind: ValueKind::Bool },
    ConfigKey { name: "raw_converter_path", kind: ValueKind::Path },
    ConfigKey { name: "raw_extensions", kind: ValueKind::List },
    ConfigKey { name: "worker_count", kind: ValueKind::Integer },
    ConfigKey { name: "set_from_folder", kind: ValueKind::Bool },
    ConfigKey { name: "progress_interval", kind: ValueKind::Integer },
];

impl ConfigKey {
    pub fn lookup(name: &str) -> Option<&'static ConfigKey> {
        CONFIG_SCHEMA.iter().find(|k| k.name == name)
    }

    fn parse(&self, raw: &str) -> Result<ConfigValue> {
        let raw = raw.trim();
        let invalid = |expected: &str| {
            Error::Config(format!(
                "Invalid value for '{}': expected {}, got '{}'",
                self.name, expected, raw
            ))
        };

        match self.kind {
            ValueKind::Path => {
                if raw.is_empty() {
                    Err(invalid("a path"))
                } else {
                    Ok(ConfigValue::Path(PathBuf::from(raw)))
                }
            }
            ValueKind::Bool => match raw.to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(ConfigValue::Bool(true)),
                "false" | "no" | "off" | "0" => Ok(ConfigValue::Bool(false)),
                _ => Err(invalid("a boolean")),
            },
            ValueKind::Integer => raw
                .replace('_', "")
                .parse::<u64>()
                .map(ConfigValue::Integer)
                .map_err(|_| invalid("a non-negative integer")),
            ValueKind::List => Ok(ConfigValue::List(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            )),
            ValueKind::Choice(choices) => {
                let lowered = raw.to_lowercase();
                if choices.contains(&lowered.as_str()) {
                    Ok(ConfigValue::Choice(lowered))
                } else {
                    Err(invalid(&format!("one of {}", choices.join(", "))))
                }
            }
        }
    }
}

//! Remote Catalog Abstraction
//!
//! The remote media service is treated as an opaque capability. Hosts provide an
//! implementation that speaks whatever wire protocol the service uses; the core
//! only relies on the operations below and on the error class each failure
//! carries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// How a failure should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// Retry the same operation (timeouts, rate limiting, temporary outages)
    Transient,
    /// Abandon this item and continue with the rest of the run
    Permanent,
    /// Abort the whole run (authentication failure, exhausted quota)
    Fatal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Permanent => "permanent",
            ErrorClass::Fatal => "fatal",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorClass::Transient)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every [`RemoteCatalog`] operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{class} remote error: {message}")]
pub struct RemoteError {
    pub class: ErrorClass,
    pub message: String,
    /// Server-provided hint for how long to wait before retrying
    pub retry_after: Option<Duration>,
}

impl RemoteError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Permanent, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Fatal, message)
    }

    /// Rate limit response; transient with an optional back-off hint.
    pub fn rate_limited(retry_after: Option<Duration>) -> Self {
        Self {
            class: ErrorClass::Transient,
            message: "Rate limit exceeded".to_string(),
            retry_after,
        }
    }

    /// Classify an HTTP-style status code.
    ///
    /// - `408`, `429` and `5xx` are transient
    /// - `401` and `403` are fatal (credentials rejected or quota exhausted)
    /// - every other status is permanent for the item
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let class = match status {
            408 | 429 | 500..=599 => ErrorClass::Transient,
            401 | 403 => ErrorClass::Fatal,
            _ => ErrorClass::Permanent,
        };
        Self::new(class, format!("HTTP {}: {}", status, message.into()))
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.class == ErrorClass::Fatal
    }
}

/// Everything the remote side needs to store one local media file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaUpload {
    /// Relative path inside the synchronized root (identity of the item)
    pub path: String,
    /// Absolute path of the bytes to upload (may be a converted file)
    pub source: PathBuf,
    /// Content fingerprint (lowercase hex SHA-256)
    pub fingerprint: String,
    /// Size of the uploaded bytes
    pub size: u64,
    /// Modification time of the local file (Unix epoch seconds)
    pub modified_at: i64,
    /// Display title, derived from the file stem
    pub title: String,
}

/// Entry reported by [`RemoteCatalog::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub remote_id: String,
    pub title: Option<String>,
    pub fingerprint: Option<String>,
}

/// Remote media catalog capability.
///
/// Implementations must be safe to call from several workers at once; the core
/// applies its own rate limiting and retry discipline around every call.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::remote::{MediaUpload, RemoteCatalog, RemoteError};
///
/// async fn push(remote: &dyn RemoteCatalog, upload: &MediaUpload) -> Result<String, RemoteError> {
///     remote.create(upload).await
/// }
/// ```
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// Upload a new item and return its remote identifier.
    async fn create(&self, item: &MediaUpload) -> Result<String, RemoteError>;

    /// Replace the content of an existing remote item.
    async fn update(&self, remote_id: &str, item: &MediaUpload) -> Result<(), RemoteError>;

    /// Delete a remote item.
    async fn delete(&self, remote_id: &str) -> Result<(), RemoteError>;

    /// List every item currently stored remotely.
    async fn list(&self) -> Result<Vec<RemoteEntry>, RemoteError>;

    /// Create a set (album) whose primary item is `primary_remote_id`.
    ///
    /// The primary item is a member of the new set.
    async fn create_set(&self, name: &str, primary_remote_id: &str)
        -> Result<String, RemoteError>;

    /// Add an item to an existing set.
    async fn add_to_set(&self, set_remote_id: &str, remote_id: &str) -> Result<(), RemoteError>;
}

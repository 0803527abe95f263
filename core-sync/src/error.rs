use bridge_traits::remote::RemoteError;
use core_library::CatalogError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Run lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Configuration error: {0}")]
    Config(#[from] core_runtime::Error),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Filesystem error at {path}: {message}")]
    Filesystem { path: PathBuf, message: String },

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid run ID: {0}")]
    InvalidRunId(String),

    #[error("Invalid run status: {0}")]
    InvalidStatus(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl SyncError {
    pub fn filesystem(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        SyncError::Filesystem {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Errors from the exclusive run lock.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Another sync run holds the lock: {0}")]
    Locked(PathBuf),

    #[error("Failed to create lock file: {0}")]
    CreateFailed(#[source] io::Error),

    #[error("Failed to acquire lock: {0}")]
    AcquireFailed(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;

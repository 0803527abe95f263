use std::path::PathBuf;
use thiserror::Error;

/// Failure of a host capability other than the remote catalog.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Conversion of {path} failed: {message}")]
    ConversionFailed { path: PathBuf, message: String },

    #[error("Log sink rejected entry: {0}")]
    SinkFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

//! Raw Format Conversion
//!
//! Camera raw files are usually not accepted by media services as-is. A
//! `RawConverter` turns a raw file into an uploadable one before it is
//! fingerprinted. Conversion runs on the scanning thread, so the trait is
//! synchronous.

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Converts raw-format files into an uploadable format.
pub trait RawConverter: Send + Sync {
    /// Returns `true` if the converter recognizes the (lowercase) extension.
    fn handles(&self, extension: &str) -> bool;

    /// Convert `source` and return the path of the converted file.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ConversionFailed`](crate::BridgeError::ConversionFailed)
    /// when the conversion tool fails or produces no output.
    fn convert(&self, source: &Path) -> Result<PathBuf>;
}

//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the sync engine crates:
//! - Typed configuration schema with fail-fast validation
//! - Logging and tracing bootstrap
//! - Event bus
//! - Generic retry policy
//!
//! ## Overview
//!
//! Nothing in this crate touches the filesystem, the catalog or the remote
//! service. It establishes the conventions the other crates build on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod retry;

pub use config::SyncConfig;
pub use error::{Error, Result};
pub use retry::{Backoff, Classify, RetryOutcome, RetryPolicy};

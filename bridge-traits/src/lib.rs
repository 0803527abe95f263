//! # Host Bridge Traits
//!
//! Capability traits the sync core depends on but does not implement itself.
//!
//! ## Overview
//!
//! This crate defines the contract between the synchronization core and the
//! host. Each trait represents a capability whose concrete implementation lives
//! outside the core: the remote media service, the raw-format conversion tool,
//! the wall clock and the host logging pipeline.
//!
//! ## Traits
//!
//! - [`RemoteCatalog`](remote::RemoteCatalog) - Create/update/delete/list remote media items and sets
//! - [`RawConverter`](convert::RawConverter) - Convert camera raw files before upload
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! Remote failures are reported as [`RemoteError`](remote::RemoteError) values
//! carrying an [`ErrorClass`](remote::ErrorClass). The class, not the message,
//! decides whether the core retries the call, abandons the item or aborts the
//! run. Every other bridge uses [`BridgeError`](error::BridgeError).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across worker tasks.

pub mod convert;
pub mod error;
pub mod remote;
pub mod time;

pub use error::BridgeError;

pub use convert::RawConverter;
pub use remote::{ErrorClass, MediaUpload, RemoteCatalog, RemoteEntry, RemoteError};
pub use time::{Clock, ConsoleLogger, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};

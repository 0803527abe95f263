//! Workspace umbrella crate.
//!
//! Re-exports the service façade so host applications can depend on a single
//! crate (`media-sync-workspace`) instead of wiring each workspace member.

pub use core_service::*;

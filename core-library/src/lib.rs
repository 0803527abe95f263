//! # Catalog Store
//!
//! Owns the SQLite catalog recording what has already been synchronized to
//! the remote media service.
//!
//! ## Overview
//!
//! This crate manages:
//! - The connection pool, durability pragmas and embedded migrations
//! - `MediaItem` and `MediaSet` models
//! - The `CatalogRepository` trait and its SQLite implementation
//!
//! The `sync_runs` table used for run history is created by the same
//! migrations; its repository lives in `core-sync`.

pub mod catalog;
pub mod db;
pub mod error;
pub mod models;

pub use catalog::{CatalogRepository, SqliteCatalogStore};
pub use error::{CatalogError, Result};
pub use models::{ItemStatus, MediaItem, MediaSet};

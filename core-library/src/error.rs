use bridge_traits::remote::ErrorClass;
use core_runtime::retry::Classify;
use thiserror::Error;

/// SQLite primary result codes that signal lock contention.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Catalog still contended after {attempts} attempts: {message}")]
    Contention { attempts: u32, message: String },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl CatalogError {
    /// Busy/locked database, pool exhaustion or reported contention.
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogError::Contention { .. } => true,
            CatalogError::Database(sqlx::Error::PoolTimedOut) => true,
            CatalogError::Database(sqlx::Error::Database(db)) => {
                let code = db
                    .code()
                    .and_then(|code| code.parse::<i32>().ok())
                    .map(|code| code & 0xff);
                matches!(code, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED))
                    || db.message().contains("database is locked")
            }
            _ => false,
        }
    }
}

impl Classify for CatalogError {
    fn class(&self) -> ErrorClass {
        if self.is_transient() {
            ErrorClass::Transient
        } else {
            ErrorClass::Permanent
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CatalogError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(CatalogError::Contention {
            attempts: 5,
            message: "database is locked".to_string()
        }
        .is_transient());
        assert!(!CatalogError::Database(sqlx::Error::RowNotFound).is_transient());
        assert!(!CatalogError::Migration("bad".to_string()).is_transient());
        assert_eq!(
            CatalogError::Database(sqlx::Error::PoolTimedOut).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            CatalogError::InvalidInput {
                field: "remote_id".to_string(),
                message: "missing".to_string()
            }
            .class(),
            ErrorClass::Permanent
        );
    }
}

//! # LocalStore Errors
//!
//! Every fallible store call returns [`DbResult`].
//!
//! ## Where They Go
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    From SQLite to the operator                          │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)                                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError (this module) ← Adds context and categorization                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncError (pdv-sync) ← Fatal / phase / row classification              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Aggregate sync message shown to the operator                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Local store errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// The store was used before `LocalStore::initialize` completed.
    ///
    /// ## When This Occurs
    /// - A UI call races application startup
    /// - `initialize()` failed and the caller kept going
    #[error("Local store is not initialized")]
    NotInitialized,

    /// A lookup by id or key matched nothing.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE index rejected the write.
    ///
    /// ## Typical Causes
    /// - A second sale with the same uuid
    /// - Two open sessions racing for the same number
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// A child row points at a parent that does not exist.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// The store file could not be opened or the pool was closed.
    ///
    /// ## Typical Causes
    /// - Permissions on the data directory
    /// - No space left on the device
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration bookkeeping failed (the migration table itself is unusable).
    ///
    /// Individual migration failures never surface here; they are logged
    /// and skipped.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// SQLite rejected a statement.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A parameter passed to the generic surface can't be bound.
    #[error("Unsupported parameter at position {position}: {reason}")]
    UnsupportedParameter { position: usize, reason: String },

    /// Every pooled connection stayed busy past the acquire timeout.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Anything sqlx reports that has no better category.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Shorthand for [`DbError::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Whether this is a unique-constraint failure.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }
}

/// Categorizes sqlx failures.
///
/// ```text
/// RowNotFound               → NotFound
/// Database (constraint msg) → UniqueViolation | ForeignKeyViolation | QueryFailed
/// PoolTimedOut              → PoolExhausted
/// PoolClosed                → ConnectionFailed
/// anything else             → Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("row", "?"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // "UNIQUE constraint failed: <table>.<column>"
                if let Some(field) = msg.strip_prefix("UNIQUE constraint failed: ") {
                    DbError::UniqueViolation {
                        field: field.to_string(),
                        value: String::from("?"),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("store closed".into()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

/// Result alias used throughout pdv-db.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_initialized_message() {
        assert_eq!(
            DbError::NotInitialized.to_string(),
            "Local store is not initialized"
        );
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
        assert!(!err.is_unique_violation());
    }
}

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A required field was missing or empty on create.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// The store detected contention (SQLITE_BUSY/LOCKED). Retried a
    /// bounded number of times before surfacing as `Internal`.
    #[error("Store conflict")]
    Conflict,

    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(rusqlite::Error),

    /// Store unavailable or corrupted state. Not retried by the core.
    #[error("Internal store error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(f, _)
                if matches!(f.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                StoreError::Conflict
            }
            _ => StoreError::Sqlite(e),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

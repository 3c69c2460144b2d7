use std::path::PathBuf;

use thiserror::Error;
use veilsync_shared::ValidationError;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the data directory or a blob file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// Creation was requested for a store that is already on disk.
    #[error("Store already exists: {0}")]
    AlreadyExists(PathBuf),

    /// Malformed hash, address or key handed to a mutating call.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// A field name outside the mutable-column whitelist.
    #[error("Invalid field name: {0:?}")]
    InvalidField(String),

    #[error("Block too large: {size} bytes (max {max})")]
    BlockTooLarge { size: usize, max: usize },

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

pub(crate) fn not_found(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    }
}

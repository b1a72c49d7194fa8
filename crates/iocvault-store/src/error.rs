//! Storage errors.
//!
//! Every store call returns [`StoreResult`]. Callers in the vault crate map
//! `NotFound` and `InvalidArgument` onto their own taxonomy; everything else
//! surfaces as an internal failure.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Applying schema version `version` failed; the transaction was rolled back.
    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    /// No row with `id` is visible to the caller.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The blocking worker panicked, was cancelled, or found the connection
    /// mutex poisoned.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

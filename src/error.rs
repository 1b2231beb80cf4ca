//! Crate-level error types.
//!
//! Per-commit problems (undecodable blobs, messages without an id) never
//! surface here; the indexer logs and skips them. These enums cover the
//! failures that end an operation.

use thiserror::Error;

use crate::sync::git::GitError;

/// Failure of the embedded message store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Failures that abort an indexing run.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The stored resume point is no longer part of the branch history.
    #[error("resume point {commit} is missing from history; refusing to re-index")]
    HistoryIntegrity { commit: String },
    #[error("another indexing run holds the writer lease ({holder})")]
    AlreadyRunning { holder: String },
    #[error("repository error: {0}")]
    Repository(GitError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("indexing run cancelled")]
    Cancelled,
}

impl From<GitError> for IndexError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::MissingResumePoint { commit } => IndexError::HistoryIntegrity { commit },
            other => IndexError::Repository(other),
        }
    }
}

impl From<sqlx::Error> for IndexError {
    fn from(err: sqlx::Error) -> Self {
        IndexError::Store(StoreError::Database(err))
    }
}

/// Failures of thread lookup and search. An unknown id is not one of them.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("repository error: {0}")]
    Repository(#[from] GitError),
}

impl From<sqlx::Error> for LookupError {
    fn from(err: sqlx::Error) -> Self {
        LookupError::Store(StoreError::Database(err))
    }
}

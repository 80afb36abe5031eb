use thiserror::Error;

/// Errors raised by a [`crate::JobStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    #[error("Execution not found: {id}")]
    ExecutionNotFound { id: String },

    /// The store is unreachable or otherwise unusable (poisoned lock, closed pool).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::JobNotFound { .. } | StoreError::ExecutionNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

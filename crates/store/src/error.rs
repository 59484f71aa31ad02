use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Repository error types.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

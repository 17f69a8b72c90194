use thiserror::Error;

/// The error taxonomy of the indexing/retrieval core.
///
/// `NotFound` is not treated as a hard failure by query orchestration — callers
/// that want an empty result instead of an error should match on it explicitly.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Store(format!("serialization failure: {err}"))
    }
}

impl From<redb::Error> for CoreError {
    fn from(err: redb::Error) -> Self {
        CoreError::Store(err.to_string())
    }
}

impl From<redb::DatabaseError> for CoreError {
    fn from(err: redb::DatabaseError) -> Self {
        CoreError::Store(err.to_string())
    }
}

impl From<redb::TransactionError> for CoreError {
    fn from(err: redb::TransactionError) -> Self {
        CoreError::Store(err.to_string())
    }
}

impl From<redb::TableError> for CoreError {
    fn from(err: redb::TableError) -> Self {
        CoreError::Store(err.to_string())
    }
}

impl From<redb::StorageError> for CoreError {
    fn from(err: redb::StorageError) -> Self {
        CoreError::Store(err.to_string())
    }
}

impl From<redb::CommitError> for CoreError {
    fn from(err: redb::CommitError) -> Self {
        CoreError::Store(err.to_string())
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::Store(format!("{err:#}"))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

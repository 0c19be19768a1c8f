use thiserror::Error;

/// Errors returned by the durable stores.
///
/// A store operation that returns an error has still updated the in-memory state where that
/// makes sense; the error signals that the change is not durable.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(String),
    #[error("store db error: {0}")]
    Db(String),
    /// Persisted data could not be interpreted.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Invalid configuration or arguments.
    #[error("store invalid data: {0}")]
    Invalid(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Db(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

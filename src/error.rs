use thiserror::Error;

/// Error taxonomy for the booking and settlement engine.
///
/// Validation and authorization failures raise synchronously as typed
/// errors. Business outcomes on the unauthenticated callback path (amount
/// mismatch, duplicate delivery) are modeled as structured results instead,
/// see [`crate::application::payments::CallbackStatus`].
#[derive(Error, Debug)]
pub enum MarketError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),
    #[error("external dependency degraded: {0}")]
    ExternalDependencyDegraded(String),
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    #[error("internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl From<csv::Error> for MarketError {
    fn from(e: csv::Error) -> Self {
        MarketError::InternalError(Box::new(e))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for MarketError {
    fn from(e: rocksdb::Error) -> Self {
        MarketError::InternalError(Box::new(e))
    }
}

pub type Result<T> = std::result::Result<T, MarketError>;

// Tollgate — Top-level error types
//
// Aggregates errors from the lifecycle and store modules into a single
// error enum for the application boundary.

use thiserror::Error;

/// Top-level error type for all Tollgate operations.
#[derive(Debug, Error)]
pub enum TollgateError {
    #[error(transparent)]
    Credential(#[from] crate::lifecycle::CredentialError),

    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TollgateError>;

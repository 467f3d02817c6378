// Tollgate — Store error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt entry at key {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("{0}")]
    Other(String),
}

// Tollgate — Lifecycle error taxonomy

use thiserror::Error;

use crate::remote::RemoteError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Remote API failure. `status` is None when no response was received.
    #[error("Upstream error (status {status:?}): {body}")]
    Upstream { status: Option<u16>, body: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<RemoteError> for CredentialError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::InvalidConfig(reason) => Self::InvalidArgument(reason),
            RemoteError::Status { status, body } => Self::Upstream {
                status: Some(status),
                body,
            },
            RemoteError::Transport(body) | RemoteError::Decode(body) => Self::Upstream {
                status: None,
                body,
            },
        }
    }
}

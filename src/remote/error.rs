// Tollgate — Remote API error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// The organization config cannot produce a client (missing url/token).
    #[error("Invalid client configuration: {0}")]
    InvalidConfig(String),

    /// The request never produced a response (connect failure, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The API answered with a status the operation does not accept.
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// The API answered 2xx with a body we could not decode.
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl RemoteError {
    /// HTTP status of the upstream response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

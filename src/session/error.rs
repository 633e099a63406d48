// Session error types

use axum::http::StatusCode;
use std::time::Duration;
use thiserror::Error;

use crate::directory::DirectoryError;

/// Errors raised by a session store backend
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The cache could not be reached or rejected the command
    #[error("session store unavailable: {0}")]
    Unavailable(String),

    /// A command did not complete within the configured timeout
    #[error("session store timed out after {0:?}")]
    Timeout(Duration),

    /// A stored value could not be decoded
    #[error("corrupt session store value: {0}")]
    Corrupt(String),
}

/// Errors raised by session lifecycle operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// No valid session and no redeemable persistent grant
    #[error("unauthorized")]
    Unauthorized,

    /// A persistent grant was presented with a name that does not match the stored one
    #[error("persistent grant integrity mismatch")]
    IntegrityMismatch,

    /// Token or compound id is syntactically invalid
    #[error("malformed credential: {0}")]
    Malformed(String),

    /// Freshly generated token already exists in the store
    #[error("session token collision")]
    Collision,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("account directory error: {0}")]
    Directory(#[from] DirectoryError),
}

impl SessionError {
    /// Map to the status surfaced to HTTP clients; auth failures are indistinguishable
    pub fn to_status_code(&self) -> StatusCode {
        match self {
            SessionError::Unauthorized
            | SessionError::IntegrityMismatch
            | SessionError::Malformed(_) => StatusCode::UNAUTHORIZED,
            SessionError::Directory(DirectoryError::InvalidCredentials) => {
                StatusCode::UNAUTHORIZED
            }
            SessionError::Collision
            | SessionError::Store(_)
            | SessionError::Directory(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

// Account directory
// The session layer only needs two things from the account system:
// resolving a username to a stable subject id, and verifying credentials.

pub mod memory;

use async_trait::async_trait;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::{AccountSeed, MemoryAccountDirectory};

/// Account as seen by the session layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: String,
}

#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account directory unavailable: {0}")]
    Unavailable(String),
}

impl DirectoryError {
    pub fn to_status_code(&self) -> StatusCode {
        match self {
            DirectoryError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            DirectoryError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Trait for account directory backends
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Resolve a username to its subject id
    async fn resolve_username(&self, username: &str) -> Result<Option<String>, DirectoryError>;

    /// Verify an email/password pair
    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Account, DirectoryError>;
}

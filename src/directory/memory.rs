// In-memory account directory backed by bcrypt hashes

use super::{Account, AccountDirectory, DirectoryError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Account entry as it appears in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSeed {
    pub id: String,
    pub username: String,
    pub email: String,
    /// bcrypt hash of the password
    pub password_hash: String,
}

#[derive(Debug, Clone)]
struct StoredAccount {
    account: Account,
    email: String,
    password_hash: String,
}

/// In-memory account directory
pub struct MemoryAccountDirectory {
    by_email: Arc<RwLock<HashMap<String, StoredAccount>>>,
    by_username: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryAccountDirectory {
    pub fn new() -> Self {
        Self {
            by_email: Arc::new(RwLock::new(HashMap::new())),
            by_username: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Build a directory from configured accounts
    pub async fn from_seeds(seeds: &[AccountSeed]) -> Self {
        let directory = Self::new();
        for seed in seeds {
            directory.insert(seed.clone()).await;
        }
        directory
    }

    /// Insert or replace an account
    pub async fn insert(&self, seed: AccountSeed) {
        let mut by_email = self.by_email.write().await;
        let mut by_username = self.by_username.write().await;

        // A replaced account must not leave its old username behind
        if let Some(previous) = by_email.get(&seed.email) {
            by_username.remove(&previous.account.username);
        }

        by_username.insert(seed.username.clone(), seed.id.clone());
        by_email.insert(
            seed.email.clone(),
            StoredAccount {
                account: Account {
                    id: seed.id,
                    username: seed.username,
                },
                email: seed.email,
                password_hash: seed.password_hash,
            },
        );
    }

    pub async fn len(&self) -> usize {
        self.by_email.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryAccountDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountDirectory for MemoryAccountDirectory {
    async fn resolve_username(&self, username: &str) -> Result<Option<String>, DirectoryError> {
        let by_username = self.by_username.read().await;
        Ok(by_username.get(username).cloned())
    }

    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Account, DirectoryError> {
        let stored = {
            let by_email = self.by_email.read().await;
            by_email
                .get(email)
                .cloned()
                .ok_or(DirectoryError::InvalidCredentials)?
        };

        // bcrypt is CPU bound; keep it off the async workers
        let hash = stored.password_hash.clone();
        let password = password.to_string();
        let valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| DirectoryError::Unavailable(format!("verification task failed: {}", e)))?
            .map_err(|e| {
                warn!("Unusable password hash for {}: {}", stored.email, e);
                DirectoryError::InvalidCredentials
            })?;

        if !valid {
            debug!("Password mismatch for {}", stored.email);
            return Err(DirectoryError::InvalidCredentials);
        }

        Ok(stored.account)
    }
}

// Session manager for high-level session operations

use super::error::{SessionError, StoreError};
use super::storage::SessionStore;
use super::types::{
    CompoundId, PersistentGrant, Redemption, SessionConfig, ValidatedSession, generate_token,
    is_well_formed_token, persist_key, session_key,
};
use crate::directory::AccountDirectory;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Session manager for handling the session and persistent grant lifecycle
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    directory: Arc<dyn AccountDirectory>,
    config: SessionConfig,
}

impl SessionManager {
    /// Create a new session manager
    pub fn new(
        store: Arc<dyn SessionStore>,
        directory: Arc<dyn AccountDirectory>,
        config: SessionConfig,
    ) -> Self {
        Self {
            store,
            directory,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Mint a new session token for a subject.
    /// A token that already exists is reported as a collision, never overwritten.
    pub async fn create_session(&self, subject_id: &str) -> Result<String, SessionError> {
        let token = generate_token();

        let created = self
            .store
            .set_if_absent(
                &session_key(&token),
                subject_id,
                self.config.session_window(),
            )
            .await?;

        if !created {
            warn!("Session token collision while creating session for {}", subject_id);
            return Err(SessionError::Collision);
        }

        info!("Created session for subject {}", subject_id);
        Ok(token)
    }

    /// Validate a session token with sliding expiration.
    ///
    /// When the remaining TTL is at or below half of the session window the
    /// TTL is reset to the full window and `renewed` is set, so the caller can
    /// reissue the cookie. Above half, the TTL is left untouched.
    pub async fn validate(&self, token: &str) -> Result<Option<ValidatedSession>, SessionError> {
        if !is_well_formed_token(token) {
            return Err(SessionError::Malformed("session token".to_string()));
        }

        let key = session_key(token);

        let Some(subject_id) = self.store.get(&key).await? else {
            debug!("Session token not cached");
            return Ok(None);
        };

        // The key may expire between the two reads
        let Some(remaining) = self.store.ttl(&key).await? else {
            return Ok(None);
        };

        let renewed = if remaining <= self.config.renewal_threshold() {
            if !self.store.expire(&key, self.config.session_window()).await? {
                return Ok(None);
            }
            debug!(
                "Renewed session for subject {} ({:?} remaining)",
                subject_id, remaining
            );
            true
        } else {
            false
        };

        Ok(Some(ValidatedSession {
            subject_id,
            renewed,
        }))
    }

    /// Issue a long-lived grant and return the `<name>.<key>` compound id
    pub async fn create_persistent_grant(
        &self,
        subject_name: &str,
        subject_id: &str,
    ) -> Result<String, SessionError> {
        if subject_name.is_empty() {
            return Err(SessionError::Malformed("subject name".to_string()));
        }

        let key = generate_token();
        let grant = PersistentGrant {
            subject_name: subject_name.to_string(),
            subject_id: subject_id.to_string(),
        };
        let value = serde_json::to_string(&grant)
            .map_err(|e| StoreError::Corrupt(format!("grant encoding failed: {}", e)))?;

        let created = self
            .store
            .set_if_absent(&persist_key(&key), &value, self.config.persist_window())
            .await?;

        if !created {
            warn!("Persistent grant key collision for {}", subject_name);
            return Err(SessionError::Collision);
        }

        info!("Created persistent grant for {}", subject_name);
        Ok(format!("{}.{}", subject_name, key))
    }

    /// Redeem a persistent grant and mint a fresh session for its subject
    pub async fn redeem_persistent(&self, compound_id: &str) -> Result<Redemption, SessionError> {
        let CompoundId { name, key } = CompoundId::parse(compound_id)
            .ok_or_else(|| SessionError::Malformed("persistent id".to_string()))?;

        let Some(raw) = self.store.get(&persist_key(key)).await? else {
            debug!("Persistent grant not cached");
            return Err(SessionError::Unauthorized);
        };

        let grant: PersistentGrant = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Corrupt(format!("grant decoding failed: {}", e)))?;

        if grant.subject_name != name {
            warn!(
                "Persistent grant name mismatch: claimed {} but grant belongs to {} (possible cookie hijacking)",
                name, grant.subject_name
            );
            return Err(SessionError::IntegrityMismatch);
        }

        let Some(subject_id) = self.directory.resolve_username(name).await? else {
            debug!("Persistent grant for unknown account {}", name);
            return Err(SessionError::Unauthorized);
        };

        // The name now belongs to a different account
        if subject_id != grant.subject_id {
            warn!(
                "Persistent grant for {} was issued to subject {} but the name resolves to {}",
                name, grant.subject_id, subject_id
            );
            return Err(SessionError::IntegrityMismatch);
        }

        let token = self.create_session(&subject_id).await?;
        info!("Redeemed persistent grant for {}", name);

        Ok(Redemption { subject_id, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{AccountSeed, MemoryAccountDirectory};
    use crate::session::storage::MemorySessionStore;
    use crate::session::types::{PERSIST_PREFIX, SESSION_PREFIX};
    use async_trait::async_trait;
    use std::time::Duration;

    async fn directory() -> Arc<MemoryAccountDirectory> {
        let seeds = vec![
            AccountSeed {
                id: "17".to_string(),
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: String::new(),
            },
            AccountSeed {
                id: "23".to_string(),
                username: "mallory".to_string(),
                email: "mallory@example.com".to_string(),
                password_hash: String::new(),
            },
        ];
        Arc::new(MemoryAccountDirectory::from_seeds(&seeds).await)
    }

    async fn setup() -> (Arc<MemorySessionStore>, SessionManager) {
        let store = Arc::new(MemorySessionStore::new());
        let manager = SessionManager::new(
            store.clone(),
            directory().await,
            SessionConfig::default(),
        );
        (store, manager)
    }

    async fn remaining(store: &MemorySessionStore, token: &str) -> Duration {
        store.ttl(&session_key(token)).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_out_of_range_grant_window_is_a_store_error() {
        let store = Arc::new(MemorySessionStore::new());
        let config = SessionConfig {
            persist_ttl_secs: u64::MAX,
            ..Default::default()
        };
        let manager = SessionManager::new(store.clone(), directory().await, config);

        let result = manager.create_persistent_grant("alice", "17").await;
        assert!(matches!(
            result,
            Err(SessionError::Store(StoreError::Corrupt(_)))
        ));
        assert_eq!(store.live_count(PERSIST_PREFIX).await, 0);
    }

    /// Store whose create-if-absent always reports an existing key
    struct CollidingStore;

    #[async_trait]
    impl SessionStore for CollidingStore {
        async fn set_if_absent(&self, _: &str, _: &str, _: Duration) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
            Ok(None)
        }
        async fn expire(&self, _: &str, _: Duration) -> Result<bool, StoreError> {
            Ok(false)
        }
        async fn ttl(&self, _: &str) -> Result<Option<Duration>, StoreError> {
            Ok(None)
        }
    }

    /// Store that is never reachable
    struct DownStore;

    #[async_trait]
    impl SessionStore for DownStore {
        async fn set_if_absent(&self, _: &str, _: &str, _: Duration) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Timeout(Duration::from_millis(100)))
        }
        async fn expire(&self, _: &str, _: Duration) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
        async fn ttl(&self, _: &str) -> Result<Option<Duration>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_and_validate_session() {
        let (store, manager) = setup().await;

        let token = manager.create_session("17").await.unwrap();
        assert_eq!(token.len(), 64);
        assert_eq!(store.live_count(SESSION_PREFIX).await, 1);

        let validated = manager.validate(&token).await.unwrap().unwrap();
        assert_eq!(validated.subject_id, "17");
        assert!(!validated.renewed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_after_70s_renews() {
        let (store, manager) = setup().await;
        let token = manager.create_session("17").await.unwrap();

        // 50s remaining is at or below half of 120s
        tokio::time::advance(Duration::from_secs(70)).await;
        let validated = manager.validate(&token).await.unwrap().unwrap();
        assert!(validated.renewed);
        assert_eq!(remaining(&store, &token).await, Duration::from_secs(120));
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_after_30s_leaves_ttl() {
        let (store, manager) = setup().await;
        let token = manager.create_session("17").await.unwrap();

        // 90s remaining is above half of 120s
        tokio::time::advance(Duration::from_secs(30)).await;
        let validated = manager.validate(&token).await.unwrap().unwrap();
        assert!(!validated.renewed);
        assert_eq!(remaining(&store, &token).await, Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_renews_at_exactly_half_window() {
        let (store, manager) = setup().await;
        let token = manager.create_session("17").await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(manager.validate(&token).await.unwrap().unwrap().renewed);
        assert_eq!(remaining(&store, &token).await, Duration::from_secs(120));

        // Just after a renewal the session is back above the threshold
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!manager.validate(&token).await.unwrap().unwrap().renewed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_session_outlives_window_only_with_activity() {
        let (_store, manager) = setup().await;
        let token = manager.create_session("17").await.unwrap();

        // Regular activity keeps the session alive well past one window
        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(70)).await;
            assert!(manager.validate(&token).await.unwrap().is_some());
        }

        // Inactivity for a full window ends it
        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(manager.validate(&token).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_validate_unknown_and_malformed_tokens() {
        let (_store, manager) = setup().await;

        let unknown = "ab".repeat(32);
        assert!(manager.validate(&unknown).await.unwrap().is_none());

        assert!(matches!(
            manager.validate("not-a-token").await,
            Err(SessionError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_collision_is_reported() {
        let manager = SessionManager::new(
            Arc::new(CollidingStore),
            directory().await,
            SessionConfig::default(),
        );

        assert!(matches!(
            manager.create_session("17").await,
            Err(SessionError::Collision)
        ));
        assert!(matches!(
            manager.create_persistent_grant("alice", "17").await,
            Err(SessionError::Collision)
        ));
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let manager = SessionManager::new(
            Arc::new(DownStore),
            directory().await,
            SessionConfig::default(),
        );

        assert!(matches!(
            manager.create_session("17").await,
            Err(SessionError::Store(StoreError::Unavailable(_)))
        ));
        assert!(matches!(
            manager.validate(&"ab".repeat(32)).await,
            Err(SessionError::Store(StoreError::Timeout(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_redeem_persistent_grant() {
        let (store, manager) = setup().await;

        let compound = manager.create_persistent_grant("alice", "17").await.unwrap();
        assert!(compound.starts_with("alice."));
        assert_eq!(store.live_count(PERSIST_PREFIX).await, 1);
        assert_eq!(store.live_count(SESSION_PREFIX).await, 0);

        let redemption = manager.redeem_persistent(&compound).await.unwrap();
        assert_eq!(redemption.subject_id, "17");

        // Exactly one new session, and it validates to alice's subject
        assert_eq!(store.live_count(SESSION_PREFIX).await, 1);
        let validated = manager.validate(&redemption.token).await.unwrap().unwrap();
        assert_eq!(validated.subject_id, "17");
    }

    #[tokio::test(start_paused = true)]
    async fn test_redeem_with_mismatched_name() {
        let (store, manager) = setup().await;

        let compound = manager.create_persistent_grant("alice", "17").await.unwrap();
        let (_, key) = compound.rsplit_once('.').unwrap();

        let forged = format!("mallory.{}", key);
        assert!(matches!(
            manager.redeem_persistent(&forged).await,
            Err(SessionError::IntegrityMismatch)
        ));
        assert_eq!(store.live_count(SESSION_PREFIX).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_redeem_against_literal_grant() {
        let (store, manager) = setup().await;
        let key = "deadbeef".repeat(8);

        let grant = serde_json::to_string(&PersistentGrant {
            subject_name: "alice".to_string(),
            subject_id: "17".to_string(),
        })
        .unwrap();
        store
            .set_if_absent(&persist_key(&key), &grant, Duration::from_secs(604_800))
            .await
            .unwrap();

        let redemption = manager
            .redeem_persistent(&format!("alice.{}", key))
            .await
            .unwrap();
        assert_eq!(redemption.subject_id, "17");

        assert!(matches!(
            manager.redeem_persistent(&format!("mallory.{}", key)).await,
            Err(SessionError::IntegrityMismatch)
        ));
        assert_eq!(store.live_count(SESSION_PREFIX).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_redeem_after_username_reassigned() {
        let store = Arc::new(MemorySessionStore::new());
        let directory = directory().await;
        let manager = SessionManager::new(store.clone(), directory.clone(), SessionConfig::default());

        let compound = manager.create_persistent_grant("alice", "17").await.unwrap();

        // The original account is renamed and a new account takes the name
        directory
            .insert(AccountSeed {
                id: "17".to_string(),
                username: "alicia".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: String::new(),
            })
            .await;
        directory
            .insert(AccountSeed {
                id: "99".to_string(),
                username: "alice".to_string(),
                email: "imposter@example.com".to_string(),
                password_hash: String::new(),
            })
            .await;

        assert!(matches!(
            manager.redeem_persistent(&compound).await,
            Err(SessionError::IntegrityMismatch)
        ));
        assert_eq!(store.live_count(SESSION_PREFIX).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_redeem_unknown_expired_and_malformed() {
        let (_store, manager) = setup().await;

        assert!(matches!(
            manager
                .redeem_persistent(&format!("alice.{}", "ab".repeat(32)))
                .await,
            Err(SessionError::Unauthorized)
        ));
        assert!(matches!(
            manager.redeem_persistent("alice").await,
            Err(SessionError::Malformed(_))
        ));
        assert!(matches!(
            manager.redeem_persistent("alice.deadbeef").await,
            Err(SessionError::Malformed(_))
        ));

        let compound = manager.create_persistent_grant("alice", "17").await.unwrap();
        tokio::time::advance(Duration::from_secs(604_800)).await;
        assert!(matches!(
            manager.redeem_persistent(&compound).await,
            Err(SessionError::Unauthorized)
        ));
    }
}

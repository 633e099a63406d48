// Redis-backed session store
// Sessions and persistent grants live as plain string keys with native TTLs

use super::error::StoreError;
use super::storage::SessionStore;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Cmd, FromRedisValue, RedisError};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error};

/// Redis session store
pub struct RedisSessionStore {
    /// Multiplexed connection, cloned per command
    conn: MultiplexedConnection,
    /// Upper bound on a single command round trip
    command_timeout: Duration,
}

impl RedisSessionStore {
    /// Create a new Redis session store
    pub async fn new(redis_url: &str, command_timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url).map_err(unavailable)?;
        let conn = tokio::time::timeout(command_timeout, client.get_multiplexed_tokio_connection())
            .await
            .map_err(|_| StoreError::Timeout(command_timeout))?
            .map_err(unavailable)?;

        debug!("Connected to session store at {}", redis_url);

        Ok(Self {
            conn,
            command_timeout,
        })
    }

    /// Run a command, failing closed on timeout or connection errors
    async fn run<T: FromRedisValue>(&self, cmd: Cmd) -> Result<T, StoreError> {
        let mut conn = self.conn.clone();
        bounded(self.command_timeout, async move {
            cmd.query_async::<_, T>(&mut conn).await
        })
        .await
    }

    /// Round-trip check run once at startup
    pub async fn ping(&self) -> Result<(), StoreError> {
        let _: String = self.run(redis::cmd("PING")).await?;
        Ok(())
    }
}

async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, RedisError>>,
) -> Result<T, StoreError> {
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            error!("Redis session store error: {}", e);
            Err(unavailable(e))
        }
        Err(_) => {
            error!("Redis session store command timed out after {:?}", limit);
            Err(StoreError::Timeout(limit))
        }
    }
}

fn unavailable(e: RedisError) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

fn as_millis(ttl: Duration) -> Result<u64, StoreError> {
    let millis = u64::try_from(ttl.as_millis())
        .map_err(|_| StoreError::Corrupt(format!("ttl {:?} out of range", ttl)))?;
    // Redis rejects a zero expiry
    Ok(millis.max(1))
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX").arg("PX").arg(as_millis(ttl)?);

        // SET NX replies OK on success and nil when the key exists
        let reply: Option<String> = self.run(cmd).await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        self.run(cmd).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut cmd = redis::cmd("PEXPIRE");
        cmd.arg(key).arg(as_millis(ttl)?);
        let updated: i64 = self.run(cmd).await?;
        Ok(updated == 1)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut cmd = redis::cmd("PTTL");
        cmd.arg(key);
        let millis: i64 = self.run(cmd).await?;

        // -2: no such key, -1: key without expiry (never written by this store)
        match millis {
            -2 => Ok(None),
            -1 => Err(StoreError::Corrupt(format!("{} has no expiry", key))),
            ms if ms >= 0 => Ok(Some(Duration::from_millis(ms as u64))),
            other => Err(StoreError::Corrupt(format!(
                "unexpected PTTL reply {} for {}",
                other, key
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require a Redis instance running
    // Skip them in CI unless Redis is available

    #[test]
    fn test_expiry_millis_bounds() {
        assert_eq!(as_millis(Duration::from_secs(120)).unwrap(), 120_000);
        assert_eq!(as_millis(Duration::ZERO).unwrap(), 1);
        assert!(matches!(
            as_millis(Duration::MAX),
            Err(StoreError::Corrupt(_))
        ));
    }

    async fn connect() -> RedisSessionStore {
        RedisSessionStore::new("redis://127.0.0.1/", Duration::from_secs(1))
            .await
            .expect("Failed to connect to Redis")
    }

    #[tokio::test]
    #[ignore] // Remove this to run with a local Redis instance
    async fn test_redis_set_if_absent() {
        let store = connect().await;
        let key = format!("session:test-{}", crate::session::types::generate_token());

        assert!(
            store
                .set_if_absent(&key, "user-1", Duration::from_secs(30))
                .await
                .unwrap()
        );
        assert!(
            !store
                .set_if_absent(&key, "user-2", Duration::from_secs(30))
                .await
                .unwrap()
        );
        assert_eq!(store.get(&key).await.unwrap(), Some("user-1".to_string()));
    }

    #[tokio::test]
    #[ignore] // Remove this to run with a local Redis instance
    async fn test_redis_ttl_and_expire() {
        let store = connect().await;
        let key = format!("session:test-{}", crate::session::types::generate_token());

        store
            .set_if_absent(&key, "user-1", Duration::from_secs(30))
            .await
            .unwrap();

        let remaining = store.ttl(&key).await.unwrap().unwrap();
        assert!(remaining <= Duration::from_secs(30));

        assert!(store.expire(&key, Duration::from_secs(120)).await.unwrap());
        let remaining = store.ttl(&key).await.unwrap().unwrap();
        assert!(remaining > Duration::from_secs(30));

        assert_eq!(store.ttl("session:missing-key").await.unwrap(), None);
        assert!(
            !store
                .expire("session:missing-key", Duration::from_secs(1))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_unreachable_redis_fails_closed() {
        // Nothing listens on port 1
        let result = RedisSessionStore::new("redis://127.0.0.1:1/", Duration::from_secs(1)).await;
        assert!(result.is_err());
    }
}

// Session management module
// Provides cache-backed session tokens with sliding expiration and long-lived persistent grants

pub mod error;
pub mod manager;
pub mod redis_store;
pub mod storage;
pub mod types;

pub use error::{SessionError, StoreError};
pub use manager::SessionManager;
pub use redis_store::RedisSessionStore;
pub use storage::{MemorySessionStore, SessionStore};
pub use types::{PersistentGrant, Redemption, SessionConfig, ValidatedSession};

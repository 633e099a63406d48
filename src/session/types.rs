// Session types and data structures

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of random bytes behind every session token and grant key
pub const TOKEN_BYTES: usize = 32;

/// Store namespace for ephemeral session tokens
pub const SESSION_PREFIX: &str = "session:";

/// Store namespace for persistent grants
pub const PERSIST_PREFIX: &str = "persist:";

/// Longest window either cookie may be configured with (365 days)
pub const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Sliding session window in seconds
    pub session_ttl_secs: u64,
    /// Persistent grant lifetime in seconds
    pub persist_ttl_secs: u64,
    /// Add the Secure attribute to issued cookies
    pub cookie_secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 120,
            persist_ttl_secs: 604_800, // 7 days
            cookie_secure: false,
        }
    }
}

impl SessionConfig {
    pub fn session_window(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn persist_window(&self) -> Duration {
        Duration::from_secs(self.persist_ttl_secs)
    }

    /// Remaining TTL at or below this point triggers a renewal
    pub fn renewal_threshold(&self) -> Duration {
        self.session_window() / 2
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.session_ttl_secs == 0 {
            return Err("session_ttl_secs must be greater than zero".to_string());
        }
        if self.persist_ttl_secs > MAX_WINDOW_SECS {
            return Err(format!(
                "persist_ttl_secs must not exceed {} seconds",
                MAX_WINDOW_SECS
            ));
        }
        if self.persist_ttl_secs <= self.session_ttl_secs {
            return Err("persist_ttl_secs must exceed session_ttl_secs".to_string());
        }
        Ok(())
    }
}

/// Result of a successful token validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedSession {
    pub subject_id: String,
    /// TTL was reset to the full window; the cookie should be reissued
    pub renewed: bool,
}

/// Result of redeeming a persistent grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redemption {
    pub subject_id: String,
    /// Freshly minted session token
    pub token: String,
}

/// Stored value behind `persist:<key>`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistentGrant {
    pub subject_name: String,
    pub subject_id: String,
}

/// Claimed name and key parsed out of a `<name>.<key>` compound id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundId<'a> {
    pub name: &'a str,
    pub key: &'a str,
}

impl<'a> CompoundId<'a> {
    /// Split on the last separator; keys are hex so they never contain one
    pub fn parse(raw: &'a str) -> Option<Self> {
        let (name, key) = raw.rsplit_once('.')?;
        if name.is_empty() || !is_well_formed_token(key) {
            return None;
        }
        Some(Self { name, key })
    }
}

/// Generate a hex-encoded 256-bit random value
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Tokens and grant keys are lowercase hex of exactly `TOKEN_BYTES` bytes
pub fn is_well_formed_token(token: &str) -> bool {
    token.len() == TOKEN_BYTES * 2
        && token
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

pub fn session_key(token: &str) -> String {
    format!("{}{}", SESSION_PREFIX, token)
}

pub fn persist_key(key: &str) -> String {
    format!("{}{}", PERSIST_PREFIX, key)
}

// Registry of connected clients
// The registry is the only long-lived owner of connection handles

use super::message::OutboundFrame;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info};

/// Connection identifier, unique for the lifetime of the registry
pub type ClientId = u64;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,

    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),

    #[error("frame encoding failed: {0}")]
    Encode(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("client {0} is already registered")]
    DuplicateClient(ClientId),

    #[error("client {0} is not registered")]
    UnknownClient(ClientId),

    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// Outbound half of a client connection
#[async_trait]
pub trait ClientSink: Send + Sync {
    async fn deliver(&self, frame: Arc<OutboundFrame>) -> Result<(), DeliveryError>;
}

/// Sink that hands frames to a per-connection writer task through a bounded queue
pub struct ChannelSink {
    tx: mpsc::Sender<Arc<OutboundFrame>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Arc<OutboundFrame>>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ClientSink for ChannelSink {
    async fn deliver(&self, frame: Arc<OutboundFrame>) -> Result<(), DeliveryError> {
        self.tx.send(frame).await.map_err(|_| DeliveryError::Closed)
    }
}

/// Registered client
pub struct Client {
    pub id: ClientId,
    /// Canonical identity stamped on everything this client writes
    pub sender_id: String,
    pub display_name: Option<String>,
    sink: Arc<dyn ClientSink>,
}

impl Client {
    pub fn new(id: ClientId, sender_id: impl Into<String>, sink: Arc<dyn ClientSink>) -> Self {
        Self {
            id,
            sender_id: sender_id.into(),
            display_name: None,
            sink,
        }
    }
}

/// Identity view of a client, without its connection handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: ClientId,
    pub sender_id: String,
    pub display_name: Option<String>,
}

/// Registry of currently connected clients
pub struct ClientRegistry {
    clients: RwLock<HashMap<ClientId, Client>>,
    next_id: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh client id
    pub fn next_id(&self) -> ClientId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Add a client. Ids must be unique at insertion time.
    pub async fn register(&self, client: Client) -> Result<(), HubError> {
        let mut clients = self.clients.write().await;
        if clients.contains_key(&client.id) {
            return Err(HubError::DuplicateClient(client.id));
        }
        info!("Registered client {} ({})", client.id, client.sender_id);
        clients.insert(client.id, client);
        Ok(())
    }

    /// Remove a client if present. Unregistering an absent id is a no-op.
    pub async fn unregister(&self, id: ClientId) -> bool {
        let removed = self.clients.write().await.remove(&id).is_some();
        if removed {
            info!("Unregistered client {}", id);
        } else {
            debug!("Client {} already unregistered", id);
        }
        removed
    }

    /// Record the display name a client announced
    pub async fn set_display_name(&self, id: ClientId, name: &str) -> Result<(), HubError> {
        let mut clients = self.clients.write().await;
        let client = clients.get_mut(&id).ok_or(HubError::UnknownClient(id))?;
        client.display_name = Some(name.to_string());
        Ok(())
    }

    pub async fn get(&self, id: ClientId) -> Option<ClientInfo> {
        self.clients.read().await.get(&id).map(|c| ClientInfo {
            id: c.id,
            sender_id: c.sender_id.clone(),
            display_name: c.display_name.clone(),
        })
    }

    /// Consistent copy of the current members, taken under the lock.
    /// Deliveries run against the copy after the lock is released.
    pub async fn snapshot(&self) -> Vec<(ClientId, Arc<dyn ClientSink>)> {
        self.clients
            .read()
            .await
            .values()
            .map(|c| (c.id, c.sink.clone()))
            .collect()
    }

    pub async fn contains(&self, id: ClientId) -> bool {
        self.clients.read().await.contains_key(&id)
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

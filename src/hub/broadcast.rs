// Broadcast hub
// Fans messages out to every registered client with per-client error isolation

use super::message::{ClientFrame, Message, OutboundFrame};
use super::registry::{Client, ClientId, ClientRegistry, DeliveryError, HubError};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Largest recent-message log a hub may keep
pub const MAX_RECENT_CAPACITY: usize = 10_000;

/// Hub configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Echo a client's own writes back to it
    pub include_sender: bool,
    /// Upper bound on one delivery attempt
    pub delivery_timeout_ms: u64,
    /// Frames queued per connection before deliveries start waiting
    pub outbound_buffer: usize,
    /// Close connections that stay silent this long
    pub idle_timeout_secs: u64,
    /// Number of published frames kept for inspection
    pub recent_capacity: usize,
    /// Upgrade only requests that pass the session gate
    pub require_auth: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            include_sender: true,
            delivery_timeout_ms: 2_000,
            outbound_buffer: 64,
            idle_timeout_secs: 300,
            recent_capacity: 100,
            require_auth: true,
        }
    }
}

impl HubConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.outbound_buffer == 0 {
            return Err("outbound_buffer must be greater than zero".to_string());
        }
        if self.delivery_timeout_ms == 0 {
            return Err("delivery_timeout_ms must be greater than zero".to_string());
        }
        if self.idle_timeout_secs == 0 {
            return Err("idle_timeout_secs must be greater than zero".to_string());
        }
        if self.recent_capacity > MAX_RECENT_CAPACITY {
            return Err(format!(
                "recent_capacity must not exceed {}",
                MAX_RECENT_CAPACITY
            ));
        }
        Ok(())
    }
}

/// Outcome of one publish
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub attempted: usize,
    pub delivered: usize,
    /// Clients whose delivery failed; they have been unregistered
    pub failed: Vec<ClientId>,
}

/// Published frame kept in the recent log
#[derive(Debug, Clone, Serialize)]
pub struct RecentMessage {
    #[serde(flatten)]
    pub frame: OutboundFrame,
    pub published_at: DateTime<Utc>,
}

/// Broadcast hub owning the client registry
pub struct BroadcastHub {
    registry: ClientRegistry,
    config: HubConfig,
    recent: Mutex<VecDeque<RecentMessage>>,
}

impl BroadcastHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            registry: ClientRegistry::new(),
            recent: Mutex::new(VecDeque::with_capacity(
                config.recent_capacity.min(MAX_RECENT_CAPACITY),
            )),
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn next_client_id(&self) -> ClientId {
        self.registry.next_id()
    }

    pub async fn register(&self, client: Client) -> Result<(), HubError> {
        self.registry.register(client).await
    }

    pub async fn unregister(&self, id: ClientId) -> bool {
        self.registry.unregister(id).await
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Deliver a frame to every registered client except `exclude`.
    ///
    /// Attempts run concurrently against a snapshot of the registry, each
    /// bounded by the delivery timeout. Clients whose delivery fails are
    /// unregistered once all attempts have finished.
    pub async fn publish(&self, frame: OutboundFrame, exclude: Option<ClientId>) -> PublishReport {
        let frame = Arc::new(frame);
        let limit = self.config.delivery_timeout();

        let targets = self.registry.snapshot().await;
        let attempts = targets
            .into_iter()
            .filter(|(id, _)| Some(*id) != exclude)
            .map(|(id, sink)| {
                let frame = frame.clone();
                async move {
                    let result = match tokio::time::timeout(limit, sink.deliver(frame)).await {
                        Ok(result) => result,
                        Err(_) => Err(DeliveryError::Timeout(limit)),
                    };
                    (id, result)
                }
            });

        let results = join_all(attempts).await;

        let mut report = PublishReport {
            attempted: results.len(),
            ..Default::default()
        };
        for (id, result) in results {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Delivery to client {} failed: {}", id, e);
                    report.failed.push(id);
                }
            }
        }

        for id in &report.failed {
            self.registry.unregister(*id).await;
        }

        self.remember(&frame).await;

        debug!(
            "Published to {}/{} clients",
            report.delivered, report.attempted
        );
        report
    }

    /// Handle a decoded frame from a registered client
    pub async fn handle(&self, client_id: ClientId, frame: ClientFrame) -> Result<PublishReport, HubError> {
        let client = self
            .registry
            .get(client_id)
            .await
            .ok_or(HubError::UnknownClient(client_id))?;

        match frame {
            ClientFrame::InitialConnection { username } => {
                let display_name = username.trim();
                if display_name.is_empty() {
                    return Err(HubError::InvalidMessage("empty display name".to_string()));
                }

                self.registry
                    .set_display_name(client_id, display_name)
                    .await?;

                let message = Message::Join {
                    sender_id: client.sender_id,
                    display_name: display_name.to_string(),
                };
                Ok(self.publish(message.to_frame(), None).await)
            }
            ClientFrame::WriteMessage { body } => {
                let display_name = client
                    .display_name
                    .unwrap_or_else(|| client.sender_id.clone());

                let message = Message::Write {
                    sender_id: client.sender_id,
                    display_name,
                    body,
                };

                let exclude = (!self.config.include_sender).then_some(client_id);
                Ok(self.publish(message.to_frame(), exclude).await)
            }
        }
    }

    /// Recently published frames, oldest first
    pub async fn recent(&self) -> Vec<RecentMessage> {
        self.recent.lock().await.iter().cloned().collect()
    }

    async fn remember(&self, frame: &OutboundFrame) {
        if self.config.recent_capacity == 0 {
            return;
        }

        let mut recent = self.recent.lock().await;
        while recent.len() >= self.config.recent_capacity {
            recent.pop_front();
        }
        recent.push_back(RecentMessage {
            frame: frame.clone(),
            published_at: Utc::now(),
        });
    }
}

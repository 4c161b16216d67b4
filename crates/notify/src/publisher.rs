//! Event publisher — routes notification events toward push connections.
//!
//! Routing is broadcast: the fleet has no directory of which instance holds
//! a user's connection, so every instance queue receives the routing message
//! and each dispatcher decides reachability from its local registry. The
//! peer set is static configuration (`INSTANCE_PEERS`).

use redis::aio::ConnectionManager;
use uuid::Uuid;

use teamup_common::types::RoutingMessage;

use crate::broker;

/// Broadcast publisher over the instance queues.
#[derive(Clone)]
pub struct EventPublisher {
    redis: ConnectionManager,
    peers: Vec<String>,
}

impl EventPublisher {
    pub fn new(redis: ConnectionManager, peers: Vec<String>) -> Self {
        Self { redis, peers }
    }

    /// Fan a routing message out to every instance queue. One notification
    /// per message keeps the message-level ack exact.
    ///
    /// A failed append to one peer does not stop the fan-out; the first
    /// error is returned once every peer has been attempted, so the caller
    /// can surface it as a delivery-pipeline failure.
    pub async fn publish(&mut self, notification_id: Uuid) -> anyhow::Result<()> {
        let message = RoutingMessage::single(notification_id);
        let payload = serde_json::to_string(&message)?;

        let mut first_error = None;
        for peer in &self.peers {
            let queue = broker::queue_key(peer);
            match broker::publish(&mut self.redis, &queue, &payload).await {
                Ok(entry_id) => {
                    tracing::debug!(
                        notification_id = %notification_id,
                        queue = %queue,
                        entry_id = %entry_id,
                        "Routing message enqueued"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        notification_id = %notification_id,
                        queue = %queue,
                        error = %e,
                        "Failed to enqueue routing message"
                    );
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

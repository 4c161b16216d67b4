//! Broker consumer — drives routed events to their terminal outcome.
//!
//! Each worker tails its instance's durable queue and walks every routing
//! message through the same state machine:
//!
//! 1. RECEIVED: entry pulled from the instance queue
//! 2. RESOLVED: notification ids loaded from the store; missing ids dropped
//! 3. per notification: DELIVERED over a live local channel, or DEFERRED
//!    when the recipient is not connected here (the pull path serves it)
//! 4. ACKED once every notification reached a terminal outcome; any
//!    unexpected failure before that dead-letters the whole message instead
//!
//! Acknowledgment is message-level and manual — never before outcomes are
//! determined, so a crash mid-processing leaves the entry pending and the
//! drain pass redelivers it on restart.

use std::sync::Arc;
use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::{StreamId, StreamReadOptions, StreamReadReply};
use sqlx::PgPool;

use teamup_common::types::{Notification, RoutingMessage};

use crate::broker;
use crate::channel::ChannelError;
use crate::payload::EventPayload;
use crate::registry::ConnectionRegistry;
use crate::store::NotificationStore;

/// Read new entries past the group cursor.
const NEW_ENTRIES: &str = ">";

/// Re-read entries delivered to this consumer but never acked.
const PENDING_ENTRIES: &str = "0";

/// Entries pulled per read.
const READ_COUNT: usize = 16;

/// Backoff after a failed poll (broker unreachable).
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Terminal outcome for one notification within a routing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Pushed over a live channel on this instance.
    Delivered,
    /// Not reachable from here; stays unread for the pull path.
    Deferred,
}

/// Aggregate outcome of one routing message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MessageOutcome {
    pub delivered: usize,
    pub deferred: usize,
    /// Ids that no longer had a stored row.
    pub dropped: usize,
}

/// One consumer worker bound to this instance's durable queue.
pub struct Dispatcher {
    instance_id: String,
    consumer: String,
    pool: PgPool,
    redis: ConnectionManager,
    registry: Arc<ConnectionRegistry>,
    block_ms: u64,
}

impl Dispatcher {
    pub fn new(
        instance_id: String,
        worker_index: u32,
        pool: PgPool,
        redis: ConnectionManager,
        registry: Arc<ConnectionRegistry>,
        block_ms: u64,
    ) -> Self {
        // Consumer names are stable across restarts so each worker reclaims
        // its own pending entries.
        let consumer = format!("{}-w{}", instance_id, worker_index);
        Self {
            instance_id,
            consumer,
            pool,
            redis,
            registry,
            block_ms,
        }
    }

    /// Run the consume loop. Never returns under normal operation.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let queue = broker::queue_key(&self.instance_id);
        broker::ensure_group(&mut self.redis, &queue).await?;

        tracing::info!(
            queue = %queue,
            consumer = %self.consumer,
            "Dispatcher worker started"
        );

        // Entries received before a crash were never acked; drain them first
        // so redelivery happens ahead of new traffic.
        loop {
            match self.poll(&queue, PENDING_ENTRIES).await {
                Ok(0) => break,
                Ok(redelivered) => {
                    tracing::warn!(redelivered, "Re-processed pending entries from previous run");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to drain pending entries");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }

        loop {
            if let Err(e) = self.poll(&queue, NEW_ENTRIES).await {
                tracing::error!(error = %e, "Dispatcher poll failed");
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }

    /// Pull one batch of entries and process each to a terminal outcome.
    /// Returns how many entries were handled.
    pub async fn poll(&mut self, queue: &str, start_id: &str) -> anyhow::Result<usize> {
        let mut options = StreamReadOptions::default()
            .group(broker::GROUP, &self.consumer)
            .count(READ_COUNT);
        if start_id == NEW_ENTRIES {
            options = options.block(self.block_ms as usize);
        }

        let reply: StreamReadReply = self
            .redis
            .xread_options(&[queue], &[start_id], &options)
            .await?;

        let mut handled = 0;
        for key in reply.keys {
            for entry in key.ids {
                self.handle_entry(queue, &entry).await;
                handled += 1;
            }
        }

        Ok(handled)
    }

    /// Process one entry and settle it with the broker: ack on any terminal
    /// outcome, dead-letter first when processing failed.
    async fn handle_entry(&mut self, queue: &str, entry: &StreamId) {
        let raw: String = entry.get(broker::PAYLOAD_FIELD).unwrap_or_default();

        match self.process_raw(&raw).await {
            Ok(outcome) => {
                if let Err(e) = broker::ack(&mut self.redis, queue, &entry.id).await {
                    // The entry stays pending and will be redelivered;
                    // at-least-once tolerates the duplicate push.
                    tracing::error!(entry_id = %entry.id, error = %e, "Ack failed");
                    return;
                }
                tracing::info!(
                    entry_id = %entry.id,
                    delivered = outcome.delivered,
                    deferred = outcome.deferred,
                    dropped = outcome.dropped,
                    "Routing message processed"
                );
            }
            Err(e) => {
                tracing::error!(
                    entry_id = %entry.id,
                    error = %e,
                    "Routing message failed, moving to dead-letter stream"
                );
                match broker::dead_letter(&mut self.redis, queue, &entry.id, &raw, &e.to_string())
                    .await
                {
                    Ok(()) => {
                        if let Err(e) = broker::ack(&mut self.redis, queue, &entry.id).await {
                            tracing::error!(entry_id = %entry.id, error = %e, "Ack after dead-letter failed");
                        }
                    }
                    Err(dl) => {
                        // Leave the entry pending; the drain pass will retry
                        // the dead-letter move.
                        tracing::error!(entry_id = %entry.id, error = %dl, "Dead-letter append failed");
                    }
                }
            }
        }
    }

    async fn process_raw(&mut self, raw: &str) -> anyhow::Result<MessageOutcome> {
        if raw.is_empty() {
            anyhow::bail!("routing message entry has no payload field");
        }
        let message: RoutingMessage = serde_json::from_str(raw)?;
        self.process(&message).await
    }

    /// Resolve a routing message and deliver each notification that still
    /// exists. Fails only on unexpected errors (store unavailable); an
    /// unreachable recipient or a vanished id is normal control flow.
    pub async fn process(&mut self, message: &RoutingMessage) -> anyhow::Result<MessageOutcome> {
        let notifications =
            NotificationStore::find_by_ids(&self.pool, &message.notification_ids).await?;

        let mut outcome = MessageOutcome {
            dropped: message.notification_ids.len() - notifications.len(),
            ..MessageOutcome::default()
        };
        if outcome.dropped > 0 {
            tracing::debug!(
                dropped = outcome.dropped,
                "Some notification ids no longer exist, skipping"
            );
        }

        for notification in &notifications {
            match deliver(&self.registry, notification).await {
                DeliveryOutcome::Delivered => {
                    outcome.delivered += 1;
                    tracing::info!(
                        notification_id = %notification.id,
                        recipient = %notification.recipient_id,
                        "Notification pushed"
                    );
                }
                DeliveryOutcome::Deferred => {
                    outcome.deferred += 1;
                    tracing::debug!(
                        notification_id = %notification.id,
                        recipient = %notification.recipient_id,
                        "Recipient not connected here, deferred to pull path"
                    );
                }
            }
        }

        if !notifications.is_empty() {
            let ids: Vec<_> = notifications.iter().map(|n| n.id).collect();
            if let Err(e) = NotificationStore::record_attempts(&self.pool, &ids).await {
                // Observability counter only; never fail the message over it.
                tracing::warn!(error = %e, "Failed to record delivery attempts");
            }
        }

        Ok(outcome)
    }
}

/// Attempt live delivery of one notification through the local registry.
///
/// A closed or timed-out channel is a race between disconnect and delivery:
/// the stale registration is dropped and the notification deferred, never
/// surfaced as a message failure.
pub async fn deliver(
    registry: &ConnectionRegistry,
    notification: &Notification,
) -> DeliveryOutcome {
    let Some(channel) = registry.lookup(notification.recipient_id) else {
        return DeliveryOutcome::Deferred;
    };

    match channel.send(EventPayload::build(notification)).await {
        Ok(()) => DeliveryOutcome::Delivered,
        Err(e @ (ChannelError::Closed | ChannelError::Timeout(_))) => {
            tracing::info!(
                recipient = %notification.recipient_id,
                channel_id = %channel.id(),
                error = %e,
                "Push channel unusable, unregistering and deferring"
            );
            registry.unregister_channel(notification.recipient_id, channel.id());
            DeliveryOutcome::Deferred
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;
    use uuid::Uuid;

    use teamup_common::types::{NotificationCategory, NotificationType};

    use crate::channel::PushChannel;

    fn make_notification(recipient_id: Uuid) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            recipient_id,
            notification_type: NotificationType::ParticipationAccepted,
            category: NotificationCategory::Project,
            team_id: Some(Uuid::new_v4()),
            message: "Your application was accepted".to_string(),
            is_read: false,
            delivery_attempts: 0,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_deliver_pushes_to_live_channel() {
        let registry = ConnectionRegistry::new();
        let recipient = Uuid::new_v4();
        let (channel, mut rx) = PushChannel::new(Duration::from_millis(100));
        registry.register(recipient, channel);

        let notification = make_notification(recipient);
        let outcome = deliver(&registry, &notification).await;

        assert_eq!(outcome, DeliveryOutcome::Delivered);
        let payload = rx.recv().await.unwrap();
        assert!(
            matches!(payload, EventPayload::TeamScoped(p) if p.user_id == recipient),
            "team-scoped notification must produce the team-scoped shape"
        );
    }

    #[tokio::test]
    async fn test_deliver_defers_when_recipient_not_connected() {
        let registry = ConnectionRegistry::new();
        let notification = make_notification(Uuid::new_v4());

        let outcome = deliver(&registry, &notification).await;

        assert_eq!(outcome, DeliveryOutcome::Deferred);
    }

    #[tokio::test]
    async fn test_deliver_unregisters_closed_channel_and_defers() {
        let registry = ConnectionRegistry::new();
        let recipient = Uuid::new_v4();
        let (channel, rx) = PushChannel::new(Duration::from_millis(100));
        registry.register(recipient, channel);
        // Client went away between registration and delivery.
        drop(rx);

        let notification = make_notification(recipient);
        let outcome = deliver(&registry, &notification).await;

        assert_eq!(outcome, DeliveryOutcome::Deferred);
        assert!(
            registry.lookup(recipient).is_none(),
            "stale registration must be dropped"
        );
    }

    #[tokio::test]
    async fn test_deliver_is_safe_to_repeat_after_unregister() {
        let registry = ConnectionRegistry::new();
        let recipient = Uuid::new_v4();
        let (channel, rx) = PushChannel::new(Duration::from_millis(100));
        registry.register(recipient, channel);
        drop(rx);

        let notification = make_notification(recipient);
        assert_eq!(deliver(&registry, &notification).await, DeliveryOutcome::Deferred);
        // Second attempt finds no registration at all; still just deferred.
        assert_eq!(deliver(&registry, &notification).await, DeliveryOutcome::Deferred);
    }
}

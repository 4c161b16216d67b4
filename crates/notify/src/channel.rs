//! Push channel — the sending half of one client's event stream.
//!
//! A channel is a bounded mpsc sender handed to the Connection Registry; the
//! receiving half feeds the client's SSE response. Closing a channel means
//! dropping its last sending half (the registry's entry), which terminates
//! the client stream once in-flight sends complete.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use uuid::Uuid;

use crate::payload::EventPayload;

/// Per-connection buffer of pending payloads. A client that cannot drain
/// this many events within the send timeout is treated as dead.
pub const CHANNEL_BUFFER: usize = 32;

/// Why a push write did not reach the client.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel closed by client")]
    Closed,

    #[error("send timed out after {0:?}")]
    Timeout(Duration),
}

/// Handle to one client's open push connection.
///
/// Cloning is cheap; clones share the same underlying connection. The
/// channel id distinguishes this connection from any replacement the same
/// user opens later.
#[derive(Debug, Clone)]
pub struct PushChannel {
    id: Uuid,
    sender: mpsc::Sender<EventPayload>,
    send_timeout: Duration,
}

impl PushChannel {
    /// Create a channel pair: the registry-side handle and the receiver that
    /// feeds the client's event stream.
    pub fn new(send_timeout: Duration) -> (Self, mpsc::Receiver<EventPayload>) {
        let (sender, receiver) = mpsc::channel(CHANNEL_BUFFER);
        let channel = Self {
            id: Uuid::new_v4(),
            sender,
            send_timeout,
        };
        (channel, receiver)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Push one payload to the client, bounded by the send timeout so a hung
    /// connection cannot stall a dispatcher worker.
    pub async fn send(&self, payload: EventPayload) -> Result<(), ChannelError> {
        self.sender
            .send_timeout(payload, self.send_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => ChannelError::Timeout(self.send_timeout),
                SendTimeoutError::Closed(_) => ChannelError::Closed,
            })
    }

    /// Whether the client side has gone away.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use teamup_common::types::{NotificationCategory, NotificationType};

    use crate::payload::{EventPayload, PlainEventPayload};

    fn test_payload() -> EventPayload {
        EventPayload::Plain(PlainEventPayload {
            user_id: Uuid::new_v4(),
            notification_type: NotificationType::PostCreated,
            category: NotificationCategory::Project,
            created_at: Utc::now(),
            message: "hello".to_string(),
            is_read: false,
        })
    }

    #[tokio::test]
    async fn test_send_and_receive() {
        let (channel, mut rx) = PushChannel::new(Duration::from_secs(1));
        channel.send(test_payload()).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, EventPayload::Plain(p) if p.message == "hello"));
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped_is_closed() {
        let (channel, rx) = PushChannel::new(Duration::from_secs(1));
        drop(rx);
        let result = channel.send(test_payload()).await;
        assert!(matches!(result, Err(ChannelError::Closed)));
        assert!(channel.is_closed());
    }

    #[tokio::test]
    async fn test_send_times_out_when_client_stalls() {
        let (channel, _rx) = PushChannel::new(Duration::from_millis(20));
        // Fill the buffer without draining it; the next send must expire
        // instead of blocking the caller.
        for _ in 0..CHANNEL_BUFFER {
            channel.send(test_payload()).await.unwrap();
        }
        let result = channel.send(test_payload()).await;
        assert!(matches!(result, Err(ChannelError::Timeout(_))));
    }
}

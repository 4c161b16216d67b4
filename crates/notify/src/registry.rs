//! Connection registry — which users hold an open push connection here.
//!
//! Strictly instance-local: entries are never replicated, and a user with no
//! entry is simply not reachable from this process. State is rebuilt from
//! zero on restart because clients reconnect and the durable store backs
//! at-least-once delivery.
//!
//! All mutation goes through this API; nothing else touches the map. Lock
//! poisoning is ignored deliberately — every critical section is a single
//! map operation, so a panicking writer cannot leave the map inconsistent.

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::channel::PushChannel;

/// Per-instance table mapping a user id to its currently open push channel.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<Uuid, PushChannel>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a user's push channel, replacing any previous one on this
    /// instance. Dropping the replaced entry closes the old client stream.
    pub fn register(&self, user_id: Uuid, channel: PushChannel) {
        let replaced = self
            .connections
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user_id, channel);

        if replaced.is_some() {
            tracing::debug!(user_id = %user_id, "Replaced existing push connection");
        }
    }

    /// Look up the user's channel, if one is open on this instance.
    pub fn lookup(&self, user_id: Uuid) -> Option<PushChannel> {
        self.connections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&user_id)
            .cloned()
    }

    /// Remove the user's registration. Safe to call when none exists.
    pub fn unregister(&self, user_id: Uuid) {
        self.connections
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&user_id);
    }

    /// Remove the user's registration only if it still refers to the given
    /// channel. Protects a replacement connection from the stale disconnect
    /// callback of the one it replaced. Returns whether an entry was removed.
    pub fn unregister_channel(&self, user_id: Uuid, channel_id: Uuid) -> bool {
        let mut connections = self.connections.write().unwrap_or_else(|e| e.into_inner());
        match connections.get(&user_id) {
            Some(current) if current.id() == channel_id => {
                connections.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// Number of open connections on this instance.
    pub fn len(&self) -> usize {
        self.connections
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every connection; called at graceful shutdown. Returns how many
    /// entries were dropped.
    pub fn shutdown(&self) -> usize {
        let mut connections = self.connections.write().unwrap_or_else(|e| e.into_inner());
        let closed = connections.len();
        connections.clear();
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_channel() -> (PushChannel, tokio::sync::mpsc::Receiver<crate::payload::EventPayload>)
    {
        PushChannel::new(Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();
        let (channel, _rx) = test_channel();
        let channel_id = channel.id();

        registry.register(user_id, channel);

        let found = registry.lookup(user_id).unwrap();
        assert_eq!(found.id(), channel_id);
        assert!(registry.lookup(Uuid::new_v4()).is_none());
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();
        let (channel, _rx) = test_channel();

        registry.register(user_id, channel);
        registry.unregister(user_id);
        registry.unregister(user_id);

        assert!(registry.lookup(user_id).is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_register_replaces_and_closes_previous_channel() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();

        let (first, mut first_rx) = test_channel();
        registry.register(user_id, first);

        let (second, _second_rx) = test_channel();
        let second_id = second.id();
        registry.register(user_id, second);

        // The replaced sender was dropped, so the old stream terminates.
        assert!(first_rx.recv().await.is_none());
        assert_eq!(registry.lookup(user_id).unwrap().id(), second_id);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_channel_ignores_stale_channel_id() {
        let registry = ConnectionRegistry::new();
        let user_id = Uuid::new_v4();
        let (channel, _rx) = test_channel();
        let channel_id = channel.id();

        registry.register(user_id, channel);

        assert!(!registry.unregister_channel(user_id, Uuid::new_v4()));
        assert!(registry.lookup(user_id).is_some());

        assert!(registry.unregister_channel(user_id, channel_id));
        assert!(registry.lookup(user_id).is_none());
        assert!(!registry.unregister_channel(user_id, channel_id));
    }

    #[tokio::test]
    async fn test_shutdown_closes_all_connections() {
        let registry = ConnectionRegistry::new();
        let (a, mut a_rx) = test_channel();
        let (b, mut b_rx) = test_channel();
        registry.register(Uuid::new_v4(), a);
        registry.register(Uuid::new_v4(), b);

        assert_eq!(registry.shutdown(), 2);
        assert!(registry.is_empty());
        assert!(a_rx.recv().await.is_none());
        assert!(b_rx.recv().await.is_none());
    }
}

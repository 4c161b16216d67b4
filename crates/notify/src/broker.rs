//! Broker plumbing on Redis Streams.
//!
//! One durable stream per running instance, one consumer group, manual
//! acknowledgment. A negative acknowledgment is an explicit append to the
//! dead-letter stream followed by an ack of the original entry — no requeue,
//! so a poison message cannot block the queue. Entries received but never
//! acked stay in the consumer's pending list and are redelivered when the
//! consumer restarts.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Consumer group shared by all dispatcher workers of an instance.
pub const GROUP: &str = "dispatchers";

/// Stream receiving negatively acknowledged routing messages.
pub const DEAD_LETTER_STREAM: &str = "notify:dead-letter";

/// Entry field holding the serialized routing message.
pub const PAYLOAD_FIELD: &str = "payload";

/// Durable queue key for one instance.
pub fn queue_key(instance_id: &str) -> String {
    format!("notify:queue:{}", instance_id)
}

/// Create the consumer group on an instance queue if it does not exist yet,
/// creating the stream itself as needed.
pub async fn ensure_group(redis: &mut ConnectionManager, queue: &str) -> anyhow::Result<()> {
    let created: Result<String, redis::RedisError> =
        redis.xgroup_create_mkstream(queue, GROUP, "$").await;

    match created {
        Ok(_) => {
            tracing::info!(queue, group = GROUP, "Consumer group created");
            Ok(())
        }
        Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Append a routing message to an instance queue. Returns the entry id.
pub async fn publish(
    redis: &mut ConnectionManager,
    queue: &str,
    payload: &str,
) -> anyhow::Result<String> {
    let entry_id: String = redis.xadd(queue, "*", &[(PAYLOAD_FIELD, payload)]).await?;
    Ok(entry_id)
}

/// Positively acknowledge an entry, removing it from the pending list.
pub async fn ack(redis: &mut ConnectionManager, queue: &str, entry_id: &str) -> anyhow::Result<()> {
    let _: i64 = redis.xack(queue, GROUP, &[entry_id]).await?;
    Ok(())
}

/// Move a poisoned entry to the dead-letter stream for operator inspection.
/// The caller acks the original entry only after this append succeeds;
/// otherwise the entry stays pending and the redelivery path retries it.
pub async fn dead_letter(
    redis: &mut ConnectionManager,
    source_queue: &str,
    entry_id: &str,
    payload: &str,
    error: &str,
) -> anyhow::Result<()> {
    let _: String = redis
        .xadd(
            DEAD_LETTER_STREAM,
            "*",
            &[
                ("source", source_queue),
                ("entry_id", entry_id),
                (PAYLOAD_FIELD, payload),
                ("error", error),
            ],
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_key_is_namespaced_per_instance() {
        assert_eq!(queue_key("node-1"), "notify:queue:node-1");
        assert_ne!(queue_key("node-1"), queue_key("node-2"));
    }
}

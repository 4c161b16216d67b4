//! Entry point for domain services raising notification events.

use sqlx::PgPool;

use teamup_common::error::AppError;
use teamup_common::types::{NewNotification, Notification};

use crate::publisher::EventPublisher;
use crate::store::NotificationStore;

/// Facade tying the store and the publisher together for domain callers.
pub struct NotificationService;

impl NotificationService {
    /// Create the durable record for a domain event and broadcast its
    /// routing message.
    ///
    /// A publish failure is logged as a delivery-pipeline failure and never
    /// propagated: the domain mutation that raised the event has already
    /// committed, and the unread row guarantees eventual visibility through
    /// the pull path.
    pub async fn notify(
        pool: &PgPool,
        publisher: &mut EventPublisher,
        new: &NewNotification,
    ) -> Result<Notification, AppError> {
        let notification = NotificationStore::create(pool, new).await?;

        if let Err(e) = publisher.publish(notification.id).await {
            tracing::error!(
                notification_id = %notification.id,
                recipient = %notification.recipient_id,
                error = %e,
                "Failed to publish routing message; notification stays unread for the pull path"
            );
        }

        Ok(notification)
    }
}

//! Notification store — durable records and their read state.
//!
//! The row is the source of truth for at-least-once delivery: a notification
//! that could not be pushed live stays unread here and surfaces through the
//! pull path. Creation supports joining a caller's transaction so the row is
//! atomic with the domain mutation that raised the event.

use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use teamup_common::error::AppError;
use teamup_common::types::{NewNotification, Notification};

const INSERT_SQL: &str = r#"
    INSERT INTO notifications
        (id, recipient_id, notification_type, category, team_id, message, is_read, delivery_attempts, created_at)
    VALUES ($1, $2, $3, $4, $5, $6, false, 0, $7)
    RETURNING *
    "#;

/// Service layer for notification persistence.
pub struct NotificationStore;

impl NotificationStore {
    /// Persist a new notification.
    pub async fn create(pool: &PgPool, new: &NewNotification) -> Result<Notification, AppError> {
        let notification = sqlx::query_as::<_, Notification>(INSERT_SQL)
            .bind(Uuid::new_v4())
            .bind(new.recipient_id)
            .bind(new.notification_type.to_string())
            .bind(new.category.to_string())
            .bind(new.team_id)
            .bind(&new.message)
            .bind(Utc::now())
            .fetch_one(pool)
            .await?;

        Ok(notification)
    }

    /// Persist a new notification inside the caller's transaction, so the
    /// row commits (or rolls back) together with the domain mutation that
    /// raised the event.
    pub async fn create_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        new: &NewNotification,
    ) -> Result<Notification, AppError> {
        let notification = sqlx::query_as::<_, Notification>(INSERT_SQL)
            .bind(Uuid::new_v4())
            .bind(new.recipient_id)
            .bind(new.notification_type.to_string())
            .bind(new.category.to_string())
            .bind(new.team_id)
            .bind(&new.message)
            .bind(Utc::now())
            .fetch_one(&mut **tx)
            .await?;

        Ok(notification)
    }

    /// Load notifications by id, order-independent. Ids with no matching row
    /// are silently omitted — they may have raced with a later cleanup.
    pub async fn find_by_ids(pool: &PgPool, ids: &[Uuid]) -> Result<Vec<Notification>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let notifications = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(pool)
        .await?;

        Ok(notifications)
    }

    /// Mark a notification as read. Idempotent — re-acking an already-read
    /// notification is a no-op. Scoped to the recipient so one user cannot
    /// ack another's notification.
    pub async fn mark_read(pool: &PgPool, id: Uuid, recipient_id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = true WHERE id = $1 AND recipient_id = $2",
        )
        .bind(id)
        .bind(recipient_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Notification {} not found", id)));
        }

        Ok(())
    }

    /// Bump the delivery-attempt counter for the given notifications.
    /// Observability only; callers must not treat a failure here as a
    /// delivery failure.
    pub async fn record_attempts(pool: &PgPool, ids: &[Uuid]) -> Result<(), AppError> {
        if ids.is_empty() {
            return Ok(());
        }

        sqlx::query(
            "UPDATE notifications SET delivery_attempts = delivery_attempts + 1 WHERE id = ANY($1)",
        )
        .bind(ids)
        .execute(pool)
        .await?;

        Ok(())
    }
}

//! Notification acknowledgment and smoke-test routes.

use axum::extract::{Path, State};
use axum::routing::{patch, post};
use axum::{Json, Router};
use uuid::Uuid;

use teamup_common::error::AppError;
use teamup_common::types::{NewNotification, Notification, NotificationCategory, NotificationType};
use teamup_notify::service::NotificationService;
use teamup_notify::store::NotificationStore;

use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/notifications/{id}/read", patch(mark_read))
        .route("/api/notifications/test", post(send_test))
}

/// PATCH /api/notifications/:id/read — acknowledge a notification as read.
/// Idempotent; scoped to the authenticated recipient.
async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    NotificationStore::mark_read(&state.pool, id, auth.user_id).await?;
    Ok(Json(serde_json::json!({"read": true})))
}

/// POST /api/notifications/test — push a test notification through the full
/// pipeline to the calling user.
async fn send_test(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Notification>, AppError> {
    let mut publisher = state.publisher.clone();
    let new = NewNotification {
        recipient_id: auth.user_id,
        notification_type: NotificationType::PostCreated,
        category: NotificationCategory::User,
        team_id: None,
        message: "Test notification".to_string(),
    };

    let notification = NotificationService::notify(&state.pool, &mut publisher, &new).await?;
    Ok(Json(notification))
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of domain events a user can be notified about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum NotificationType {
    // Team membership
    ParticipationRequest,
    ParticipationAccepted,
    ParticipationRejected,
    MemberExported,
    MemberQuit,

    // Boards
    PostCreated,
    TeamDeleted,

    // Moderation
    ReportReceived,
    WarningIssued,
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationType::ParticipationRequest => write!(f, "participation_request"),
            NotificationType::ParticipationAccepted => write!(f, "participation_accepted"),
            NotificationType::ParticipationRejected => write!(f, "participation_rejected"),
            NotificationType::MemberExported => write!(f, "member_exported"),
            NotificationType::MemberQuit => write!(f, "member_quit"),
            NotificationType::PostCreated => write!(f, "post_created"),
            NotificationType::TeamDeleted => write!(f, "team_deleted"),
            NotificationType::ReportReceived => write!(f, "report_received"),
            NotificationType::WarningIssued => write!(f, "warning_issued"),
        }
    }
}

/// Which area of the platform the event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum NotificationCategory {
    Project,
    Mentoring,
    User,
}

impl std::fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationCategory::Project => write!(f, "project"),
            NotificationCategory::Mentoring => write!(f, "mentoring"),
            NotificationCategory::User => write!(f, "user"),
        }
    }
}

/// A persisted notification awaiting (or past) delivery.
///
/// `id`, `recipient_id`, and `created_at` are immutable after creation.
/// `is_read` only ever transitions false → true; `delivery_attempts` is an
/// observability counter, not a correctness mechanism.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub notification_type: NotificationType,
    pub category: NotificationCategory,
    /// Present only for team-scoped events; selects the wire payload shape.
    pub team_id: Option<Uuid>,
    pub message: String,
    pub is_read: bool,
    pub delivery_attempts: i32,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a new notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
    pub recipient_id: Uuid,
    pub notification_type: NotificationType,
    pub category: NotificationCategory,
    pub team_id: Option<Uuid>,
    pub message: String,
}

/// Transient message carried by the broker from publisher to dispatcher.
///
/// The target instance is implied by the queue the message is published to.
/// The publisher sends one notification per message so the message-level ack
/// stays exact; the dispatcher tolerates multi-id batches regardless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingMessage {
    pub notification_ids: Vec<Uuid>,
}

impl RoutingMessage {
    pub fn single(notification_id: Uuid) -> Self {
        Self {
            notification_ids: vec![notification_id],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_type_display_matches_serde() {
        let json = serde_json::to_string(&NotificationType::ParticipationAccepted).unwrap();
        assert_eq!(json, "\"participation_accepted\"");
        assert_eq!(
            NotificationType::ParticipationAccepted.to_string(),
            "participation_accepted"
        );
    }

    #[test]
    fn test_routing_message_round_trip() {
        let message = RoutingMessage::single(Uuid::new_v4());
        let raw = serde_json::to_string(&message).unwrap();
        let parsed: RoutingMessage = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, message);
        assert_eq!(parsed.notification_ids.len(), 1);
    }
}

//! Wire payloads pushed to clients.
//!
//! A stored notification maps to one of two JSON shapes: team-scoped events
//! carry a `teamId` field, everything else omits it entirely. The shape is
//! decided once here, when the payload is built; downstream code never
//! re-inspects the notification to find out which kind it holds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use teamup_common::types::{Notification, NotificationCategory, NotificationType};

/// Payload for an event with no team context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlainEventPayload {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub category: NotificationCategory,
    pub created_at: DateTime<Utc>,
    pub message: String,
    pub is_read: bool,
}

/// Payload for a team-scoped event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamEventPayload {
    pub user_id: Uuid,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub category: NotificationCategory,
    pub team_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub message: String,
    pub is_read: bool,
}

/// One of the two wire shapes, fixed at construction.
///
/// Serialized untagged: clients see exactly the field contract, with no
/// discriminator. `TeamScoped` is listed first so deserialization prefers
/// the shape with the extra field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventPayload {
    TeamScoped(TeamEventPayload),
    Plain(PlainEventPayload),
}

impl EventPayload {
    /// Build the wire payload for a stored notification. Pure; the variant
    /// follows from whether the notification carries a team id.
    pub fn build(notification: &Notification) -> Self {
        match notification.team_id {
            Some(team_id) => EventPayload::TeamScoped(TeamEventPayload {
                user_id: notification.recipient_id,
                notification_type: notification.notification_type,
                category: notification.category,
                team_id,
                created_at: notification.created_at,
                message: notification.message.clone(),
                is_read: notification.is_read,
            }),
            None => EventPayload::Plain(PlainEventPayload {
                user_id: notification.recipient_id,
                notification_type: notification.notification_type,
                category: notification.category,
                created_at: notification.created_at,
                message: notification.message.clone(),
                is_read: notification.is_read,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_notification(team_id: Option<Uuid>) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            recipient_id: Uuid::new_v4(),
            notification_type: NotificationType::ParticipationAccepted,
            category: NotificationCategory::Project,
            team_id,
            message: "Your application was accepted".to_string(),
            is_read: false,
            delivery_attempts: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_plain_payload_omits_team_id() {
        let notification = make_notification(None);
        let payload = EventPayload::build(&notification);
        assert!(matches!(payload, EventPayload::Plain(_)));

        let json = serde_json::to_value(&payload).unwrap();
        let object = json.as_object().unwrap();
        assert!(!object.contains_key("teamId"));
        assert_eq!(json["userId"], notification.recipient_id.to_string());
        assert_eq!(json["type"], "participation_accepted");
        assert_eq!(json["category"], "project");
        assert_eq!(json["isRead"], false);
        assert_eq!(json["message"], "Your application was accepted");
        // createdAt is an ISO-8601 string, not a number
        assert!(json["createdAt"].is_string());
    }

    #[test]
    fn test_team_scoped_payload_carries_team_id_string() {
        let team_id = Uuid::new_v4();
        let notification = make_notification(Some(team_id));
        let payload = EventPayload::build(&notification);
        assert!(matches!(payload, EventPayload::TeamScoped(_)));

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["teamId"], team_id.to_string());
        assert_eq!(json["userId"], notification.recipient_id.to_string());
        assert_eq!(json["type"], "participation_accepted");
    }

    #[test]
    fn test_shapes_differ_only_by_team_id() {
        let plain = serde_json::to_value(EventPayload::build(&make_notification(None))).unwrap();
        let team =
            serde_json::to_value(EventPayload::build(&make_notification(Some(Uuid::new_v4()))))
                .unwrap();

        let mut plain_keys: Vec<_> = plain.as_object().unwrap().keys().cloned().collect();
        let mut team_keys: Vec<_> = team.as_object().unwrap().keys().cloned().collect();
        plain_keys.sort();
        team_keys.sort();

        assert_eq!(
            plain_keys,
            vec!["category", "createdAt", "isRead", "message", "type", "userId"]
        );
        assert_eq!(
            team_keys,
            vec![
                "category", "createdAt", "isRead", "message", "teamId", "type", "userId"
            ]
        );
    }
}

//! Typed notification payloads carried on private and conversation channels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::names;

/// A persisted direct message as published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDto {
    pub id: String,
    pub text: String,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub date_read: Option<DateTime<Utc>>,
    pub sender_id: String,
    pub sender_name: String,
    #[serde(default)]
    pub sender_image: Option<String>,
    pub recipient_id: String,
    pub recipient_name: String,
    #[serde(default)]
    pub recipient_image: Option<String>,
}

/// Someone liked the recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeNotification {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// A like completed a mutual match; names the other side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchNotification {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// Every application event, tagged by its event name.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    MessageNew(MessageDto),
    LikeNew(LikeNotification),
    MatchNew(MatchNotification),
    /// Ids of messages just marked read.
    MessagesRead(Vec<String>),
}

impl NotificationEvent {
    /// Decode an event by name. Unknown names yield `Ok(None)`.
    pub fn parse(event: &str, data: &serde_json::Value) -> Result<Option<Self>, serde_json::Error> {
        let parsed = match event {
            names::MESSAGE_NEW => Self::MessageNew(MessageDto::deserialize(data)?),
            names::LIKE_NEW => Self::LikeNew(LikeNotification::deserialize(data)?),
            names::MATCH_NEW => Self::MatchNew(MatchNotification::deserialize(data)?),
            names::MESSAGES_READ => Self::MessagesRead(Vec::<String>::deserialize(data)?),
            _ => return Ok(None),
        };
        Ok(Some(parsed))
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            Self::MessageNew(_) => names::MESSAGE_NEW,
            Self::LikeNew(_) => names::LIKE_NEW,
            Self::MatchNew(_) => names::MATCH_NEW,
            Self::MessagesRead(_) => names::MESSAGES_READ,
        }
    }

    /// Payload as published on the wire.
    pub fn payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::MessageNew(m) => serde_json::to_value(m),
            Self::LikeNew(l) => serde_json::to_value(l),
            Self::MatchNew(m) => serde_json::to_value(m),
            Self::MessagesRead(ids) => serde_json::to_value(ids),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_like_payload() {
        let data = json!({ "userId": "u1", "name": "Ann", "image": null });
        let ev = NotificationEvent::parse("like:new", &data).unwrap();
        assert_eq!(
            ev,
            Some(NotificationEvent::LikeNew(LikeNotification {
                user_id: "u1".into(),
                name: "Ann".into(),
                image: None,
            }))
        );
    }

    #[test]
    fn parse_read_receipts() {
        let ev = NotificationEvent::parse("messages:read", &json!(["m1", "m2"])).unwrap();
        assert_eq!(
            ev,
            Some(NotificationEvent::MessagesRead(vec!["m1".into(), "m2".into()]))
        );
    }

    #[test]
    fn unknown_event_is_none_and_bad_payload_is_error() {
        assert_eq!(NotificationEvent::parse("typing", &json!({})).unwrap(), None);
        assert!(NotificationEvent::parse("message:new", &json!({ "id": 3 })).is_err());
    }
}

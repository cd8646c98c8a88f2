use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::schema::{Notification, NotificationKind};
use crate::types::id::marker::{CommentMarker, NotificationMarker, PostMarker, UserMarker};
use crate::types::id::Id;

/// Notification the relay is asked to deliver, either read from the
/// outbox or received from a change data capture webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayNotification {
    /// Missing on records coming from sources that do not share our
    /// ids. Deliveries of those are not deduplicated.
    pub id: Option<Id<NotificationMarker>>,
    pub recipient_id: Id<UserMarker>,
    pub kind: NotificationKind,
    pub post_id: Option<Id<PostMarker>>,
    pub comment_id: Option<Id<CommentMarker>>,
    pub actor_line: Option<String>,
    pub content_preview: Option<String>,
}

impl From<&Notification> for RelayNotification {
    fn from(notification: &Notification) -> Self {
        Self {
            id: Some(notification.id),
            recipient_id: notification.recipient_id,
            kind: notification.kind,
            post_id: Some(notification.post_id),
            comment_id: notification.comment_id,
            actor_line: Some(notification.actor.line.to_string()),
            content_preview: notification.content_preview.clone(),
        }
    }
}

/// What to do with an incoming webhook body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Deliver(RelayNotification),
    Ignored(&'static str),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("event body must be a JSON object")]
    NotAnObject,
    #[error("event record is missing {0:?}")]
    MissingField(&'static str),
    #[error("unknown notification type {0:?}")]
    UnknownKind(String),
    #[error("malformed event record: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct RawDisplayAttr {
    line: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRecord {
    id: Option<Id<NotificationMarker>>,
    #[serde(alias = "user_id")]
    recipient_id: Option<Id<UserMarker>>,
    #[serde(rename = "type", alias = "kind")]
    kind: Option<String>,
    post_id: Option<Id<PostMarker>>,
    comment_id: Option<Id<CommentMarker>>,
    actor_display_attr: Option<RawDisplayAttr>,
    actor_line: Option<String>,
    content_preview: Option<String>,
}

const NOTIFICATIONS_TABLE: &str = "notifications";

/// Reads a webhook body.
///
/// Bodies carrying a `record` are change data capture envelopes
/// (`{type, table, record, ...}`) and are unwrapped first. Envelopes
/// describing anything but an insert into `notifications` are
/// ignored. Anything else is treated as the bare notification record.
pub fn parse(body: Value) -> Result<Event, EventError> {
    let Value::Object(mut object) = body else {
        return Err(EventError::NotAnObject);
    };

    let record = match object.remove("record") {
        Some(record) => {
            let operation = object.get("type").and_then(Value::as_str);
            if operation.is_some_and(|op| !op.eq_ignore_ascii_case("INSERT")) {
                return Ok(Event::Ignored("not an insert event"));
            }

            let table = object.get("table").and_then(Value::as_str);
            if table.is_some_and(|table| table != NOTIFICATIONS_TABLE) {
                return Ok(Event::Ignored("not a notifications event"));
            }
            record
        }
        None => Value::Object(object),
    };

    if !record.is_object() {
        return Err(EventError::NotAnObject);
    }

    let raw: RawRecord =
        serde_json::from_value(record).map_err(|e| EventError::Malformed(e.to_string()))?;

    let recipient_id = raw
        .recipient_id
        .ok_or(EventError::MissingField("recipient_id"))?;

    let kind = raw.kind.ok_or(EventError::MissingField("type"))?;
    let kind = kind
        .parse::<NotificationKind>()
        .map_err(|_| EventError::UnknownKind(kind))?;

    let actor_line = raw
        .actor_display_attr
        .and_then(|attr| attr.line)
        .or(raw.actor_line);

    Ok(Event::Deliver(RelayNotification {
        id: raw.id,
        recipient_id,
        kind,
        post_id: raw.post_id,
        comment_id: raw.comment_id,
        actor_line,
        content_preview: raw.content_preview.filter(|p| !p.is_empty()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unwraps_envelope() {
        let body = json!({
            "type": "INSERT",
            "table": "notifications",
            "schema": "public",
            "record": {
                "id": "15",
                "recipient_id": "3",
                "type": "reply_to_comment",
                "post_id": 7,
                "comment_id": "8",
                "actor_display_attr": { "line": "blue", "color": "#3490dc" },
                "content_preview": "same here",
            },
            "old_record": null,
        });

        let Event::Deliver(notification) = parse(body).unwrap() else {
            panic!("expected a deliverable event");
        };
        assert_eq!(notification.id, Some(Id::new(15)));
        assert_eq!(notification.recipient_id, Id::new(3));
        assert_eq!(notification.kind, NotificationKind::ReplyToComment);
        assert_eq!(notification.post_id, Some(Id::new(7)));
        assert_eq!(notification.comment_id, Some(Id::new(8)));
        assert_eq!(notification.actor_line.as_deref(), Some("blue"));
        assert_eq!(notification.content_preview.as_deref(), Some("same here"));
    }

    #[test]
    fn test_accepts_bare_record_with_aliases() {
        let body = json!({
            "user_id": 3,
            "kind": "milestone_10",
            "post_id": 7,
            "actor_line": "red",
        });

        let Event::Deliver(notification) = parse(body).unwrap() else {
            panic!("expected a deliverable event");
        };
        assert_eq!(notification.id, None);
        assert_eq!(notification.recipient_id, Id::new(3));
        assert_eq!(notification.kind, NotificationKind::Milestone(10));
        assert_eq!(notification.actor_line.as_deref(), Some("red"));
        assert_eq!(notification.content_preview, None);
    }

    #[test]
    fn test_ignores_other_events() {
        let update = json!({
            "type": "UPDATE",
            "table": "notifications",
            "record": { "recipient_id": 1, "type": "reply_to_post" },
        });
        assert_eq!(parse(update), Ok(Event::Ignored("not an insert event")));

        let other_table = json!({
            "type": "INSERT",
            "table": "posts",
            "record": { "id": 1 },
        });
        assert_eq!(
            parse(other_table),
            Ok(Event::Ignored("not a notifications event"))
        );
    }

    #[test]
    fn test_rejects_incomplete_records() {
        assert_eq!(
            parse(json!({ "type": "reply_to_post" })),
            Err(EventError::MissingField("recipient_id"))
        );
        assert_eq!(
            parse(json!({ "recipient_id": "1" })),
            Err(EventError::MissingField("type"))
        );
        assert_eq!(
            parse(json!({ "recipient_id": "1", "type": "poke" })),
            Err(EventError::UnknownKind("poke".into()))
        );
        assert_eq!(parse(json!([1, 2])), Err(EventError::NotAnObject));
        assert!(matches!(
            parse(json!({ "recipient_id": "zero", "type": "reply_to_post" })),
            Err(EventError::Malformed(..))
        ));
    }
}

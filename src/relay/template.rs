use heck::ToTitleCase;

use super::RelayNotification;
use crate::push::{Message, MessageData};
use crate::schema::NotificationKind;

const MILESTONE_BODY: &str = "People on the lines are loving it.";

/// Builds the push message shown for `notification`.
#[must_use]
pub fn message(notification: &RelayNotification) -> Message {
    let line = notification
        .actor_line
        .as_deref()
        .map_or_else(|| "Unknown".to_string(), |line| line.to_title_case());

    let preview = notification.content_preview.as_deref();
    let reply_body = || match preview {
        Some(preview) => format!("{line} line: {preview}"),
        None => format!("{line} line commented on your post"),
    };

    let (title, body) = match notification.kind {
        NotificationKind::ReplyToPost => ("New comment on your post".to_string(), reply_body()),
        NotificationKind::ReplyToComment => {
            ("New reply to your comment".to_string(), reply_body())
        }
        NotificationKind::Milestone(threshold) => (
            format!("Your post reached {threshold} upvotes"),
            preview.unwrap_or(MILESTONE_BODY).to_string(),
        ),
    };

    let url = match notification.post_id {
        Some(post_id) => format!("/posts/{post_id}"),
        None => "/notifications".to_string(),
    };

    Message {
        title,
        body,
        data: MessageData {
            notification_id: notification.id.map(|id| id.to_string()),
            post_id: notification.post_id.map(|id| id.to_string()),
            comment_id: notification.comment_id.map(|id| id.to_string()),
            kind: notification.kind.to_string(),
            url,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::id::Id;

    fn notification(kind: NotificationKind) -> RelayNotification {
        RelayNotification {
            id: Some(Id::new(4)),
            recipient_id: Id::new(1),
            kind,
            post_id: Some(Id::new(2)),
            comment_id: None,
            actor_line: Some("blue".into()),
            content_preview: Some("nice".into()),
        }
    }

    #[test]
    fn test_reply_messages() {
        let message = super::message(&notification(NotificationKind::ReplyToPost));
        assert_eq!(message.title, "New comment on your post");
        assert_eq!(message.body, "Blue line: nice");
        assert_eq!(message.data.kind, "reply_to_post");
        assert_eq!(message.data.url, "/posts/2");
        assert_eq!(message.data.notification_id.as_deref(), Some("4"));

        let mut reply = notification(NotificationKind::ReplyToComment);
        reply.content_preview = None;
        let message = super::message(&reply);
        assert_eq!(message.title, "New reply to your comment");
        assert_eq!(message.body, "Blue line commented on your post");
    }

    #[test]
    fn test_milestone_messages() {
        let mut milestone = notification(NotificationKind::Milestone(25));
        let message = super::message(&milestone);
        assert_eq!(message.title, "Your post reached 25 upvotes");
        assert_eq!(message.body, "nice");
        assert_eq!(message.data.kind, "milestone_25");

        milestone.content_preview = None;
        assert_eq!(super::message(&milestone).body, MILESTONE_BODY);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::borrow::Cow;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

use super::macros::text_column;
use super::DisplayAttr;
use crate::types::id::{
    marker::{CommentMarker, NotificationMarker, PostMarker, UserMarker},
    Id,
};

/// Closed set of reasons a notification exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// Someone commented on the recipient's post.
    ReplyToPost,
    /// Someone replied to the recipient's comment.
    ReplyToComment,
    /// The recipient's post reached this score.
    Milestone(u32),
}

impl NotificationKind {
    const MILESTONE_PREFIX: &'static str = "milestone_";

    #[must_use]
    pub fn as_str(&self) -> Cow<'static, str> {
        match self {
            NotificationKind::ReplyToPost => Cow::Borrowed("reply_to_post"),
            NotificationKind::ReplyToComment => Cow::Borrowed("reply_to_comment"),
            NotificationKind::Milestone(n) => Cow::Owned(format!("{}{n}", Self::MILESTONE_PREFIX)),
        }
    }

    #[must_use]
    pub const fn threshold(&self) -> Option<u32> {
        match self {
            NotificationKind::Milestone(n) => Some(*n),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown notification type {0:?}")]
pub struct UnknownKindError(pub String);

impl FromStr for NotificationKind {
    type Err = UnknownKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reply_to_post" => Ok(NotificationKind::ReplyToPost),
            "reply_to_comment" => Ok(NotificationKind::ReplyToComment),
            _ => s
                .strip_prefix(Self::MILESTONE_PREFIX)
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|n| *n > 0)
                .map(NotificationKind::Milestone)
                .ok_or_else(|| UnknownKindError(s.to_string())),
        }
    }
}

impl Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_str())
    }
}

impl Serialize for NotificationKind {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.as_str())
    }
}

impl<'de> Deserialize<'de> for NotificationKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Cow::<'de, str>::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

text_column!(NotificationKind);

/// Notification about to be inserted. Produced by the derivation
/// functions in [`crate::notify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub recipient_id: Id<UserMarker>,
    pub kind: NotificationKind,
    pub post_id: Id<PostMarker>,
    pub comment_id: Option<Id<CommentMarker>>,
    pub actor_id: Id<UserMarker>,
    /// Snapshot of the actor's display attribute when they acted.
    pub actor: DisplayAttr,
    pub content_preview: Option<String>,
}

impl NewNotification {
    /// Returns the key the database deduplicates notifications by.
    #[must_use]
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            recipient_id: self.recipient_id,
            kind: self.kind,
            post_id: self.post_id,
            comment_id: self.comment_id,
            actor_id: self.actor_id,
        }
    }
}

/// Two notifications with the same key are the same notification.
/// A missing comment reference matches another missing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub recipient_id: Id<UserMarker>,
    pub kind: NotificationKind,
    pub post_id: Id<PostMarker>,
    pub comment_id: Option<Id<CommentMarker>>,
    pub actor_id: Id<UserMarker>,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Notification {
    pub id: Id<NotificationMarker>,
    pub recipient_id: Id<UserMarker>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub post_id: Id<PostMarker>,
    pub comment_id: Option<Id<CommentMarker>>,
    pub actor_id: Id<UserMarker>,
    #[sqlx(flatten)]
    #[serde(rename = "actor_display_attr")]
    pub actor: DisplayAttr,
    pub content_preview: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    #[must_use]
    pub fn from_new(
        id: Id<NotificationMarker>,
        new: NewNotification,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            recipient_id: new.recipient_id,
            kind: new.kind,
            post_id: new.post_id,
            comment_id: new.comment_id,
            actor_id: new.actor_id,
            actor: new.actor,
            content_preview: new.content_preview,
            read_at: None,
            deleted_at: None,
            created_at,
        }
    }

    #[must_use]
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            recipient_id: self.recipient_id,
            kind: self.kind,
            post_id: self.post_id,
            comment_id: self.comment_id,
            actor_id: self.actor_id,
        }
    }
}

/// A notification as the recipient's feed shows it, enriched with
/// the current state of the content it points at.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct NotificationView {
    pub id: Id<NotificationMarker>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub post_id: Id<PostMarker>,
    pub comment_id: Option<Id<CommentMarker>>,
    pub actor_id: Id<UserMarker>,
    #[sqlx(flatten)]
    #[serde(rename = "actor_display_attr")]
    pub actor: DisplayAttr,
    pub content_preview: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub post_content: String,
    pub post_deleted: bool,
    pub comment_content: Option<String>,
    pub comment_deleted: Option<bool>,
}

/// Parameters of a feed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotificationQuery {
    pub limit: u32,
    pub cursor: Option<crate::types::Cursor>,
    pub unread_only: bool,
}

impl NotificationQuery {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;
}

impl Default for NotificationQuery {
    fn default() -> Self {
        Self {
            limit: Self::DEFAULT_LIMIT,
            cursor: None,
            unread_only: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            NotificationKind::ReplyToPost,
            NotificationKind::ReplyToComment,
            NotificationKind::Milestone(5),
            NotificationKind::Milestone(100),
        ] {
            assert_eq!(Ok(kind), kind.as_str().parse());
        }
    }

    #[test]
    fn test_kind_rejects_unknown() {
        assert!("milestone_".parse::<NotificationKind>().is_err());
        assert!("milestone_0".parse::<NotificationKind>().is_err());
        assert!("milestone_x".parse::<NotificationKind>().is_err());
        assert!("mention".parse::<NotificationKind>().is_err());
    }

    #[test]
    fn test_kind_serializes_as_string() {
        assert_eq!(
            serde_json::to_value(NotificationKind::Milestone(25)).unwrap(),
            serde_json::json!("milestone_25")
        );
        assert_eq!(
            serde_json::from_str::<NotificationKind>("\"reply_to_comment\"").unwrap(),
            NotificationKind::ReplyToComment
        );
    }
}

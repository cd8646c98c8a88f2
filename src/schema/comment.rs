use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::DisplayAttr;
use crate::types::id::{
    marker::{CommentMarker, PostMarker, UserMarker},
    Id,
};

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Comment {
    pub id: Id<CommentMarker>,
    pub post_id: Id<PostMarker>,
    /// Top-level comment this one replies to. Replies are only
    /// one level deep.
    pub parent_id: Option<Id<CommentMarker>>,
    pub author_id: Id<UserMarker>,
    #[sqlx(flatten)]
    #[serde(rename = "author_display_attr")]
    pub author: DisplayAttr,
    pub content: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Comment {
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    #[must_use]
    pub fn is_reply(&self) -> bool {
        self.parent_id.is_some()
    }
}

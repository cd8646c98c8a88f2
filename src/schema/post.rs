use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::DisplayAttr;
use crate::types::id::{
    marker::{PostMarker, UserMarker},
    Id,
};

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Post {
    pub id: Id<PostMarker>,
    pub author_id: Id<UserMarker>,
    /// Author's line at the time of posting. Written once.
    #[sqlx(flatten)]
    #[serde(rename = "author_display_attr")]
    pub author: DisplayAttr,
    pub content: String,
    pub score: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Post {
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::id::{
    marker::{NotificationMarker, OutboxMarker},
    Id,
};

/// A pending intent to deliver one notification through push.
///
/// Written in the same transaction as the notification itself.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct OutboxEntry {
    pub id: Id<OutboxMarker>,
    pub notification_id: Id<NotificationMarker>,
    pub attempts: i32,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use error_stack::Result;
use thiserror::Error;

use crate::config;
use crate::schema::notification::NotificationQuery;
use crate::schema::{
    Comment, NewPushSubscription, Notification, NotificationView, OutboxEntry, Post,
    PushSubscription, User, VoteOutcome, VoteTarget, VoteValue,
};
use crate::types::id::marker::{
    CommentMarker, NotificationMarker, OutboxMarker, PostMarker, PushSubscriptionMarker,
    UserMarker,
};
use crate::types::id::Id;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("requested resource does not exist")]
    NotFound,
    /// The write is well formed but breaks a rule of the feed.
    #[error("{0}")]
    Rejected(&'static str),
    #[error("could not access storage")]
    Backend,
}

/// Settings the stores need to derive notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rules {
    /// Strictly ascending post scores worth a milestone.
    pub milestones: Vec<u32>,
    pub preview_len: usize,
}

impl From<&config::Notifications> for Rules {
    fn from(cfg: &config::Notifications) -> Self {
        Self {
            milestones: cfg.milestones.clone(),
            preview_len: cfg.preview_len.get(),
        }
    }
}

impl Default for Rules {
    fn default() -> Self {
        Self::from(&config::Notifications::default())
    }
}

/// Result of writing a comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentOutcome {
    pub comment: Comment,
    /// Created notification, `None` when nobody is notified or an
    /// identical notification already exists.
    pub notification: Option<Notification>,
}

/// Every piece of persistent state whisperline touches.
///
/// Each method is atomic: the write and every notification it
/// derives are applied together or not at all. Methods receiving a
/// recipient only ever see or change that recipient's rows.
#[async_trait]
pub trait Store: std::fmt::Debug + Send + Sync + 'static {
    // users
    async fn get_or_create_user(&self, device_id: &str) -> Result<User, StoreError>;
    async fn user(&self, id: Id<UserMarker>) -> Result<Option<User>, StoreError>;

    // content
    async fn create_post(&self, author: &User, content: &str) -> Result<Post, StoreError>;
    async fn post(&self, id: Id<PostMarker>) -> Result<Option<Post>, StoreError>;

    /// Soft deletes a post written by `author_id`.
    async fn delete_post(
        &self,
        author_id: Id<UserMarker>,
        id: Id<PostMarker>,
    ) -> Result<(), StoreError>;

    async fn create_comment(
        &self,
        author: &User,
        post_id: Id<PostMarker>,
        parent_id: Option<Id<CommentMarker>>,
        content: &str,
    ) -> Result<CommentOutcome, StoreError>;

    /// Soft deletes a comment written by `author_id`.
    async fn delete_comment(
        &self,
        author_id: Id<UserMarker>,
        id: Id<CommentMarker>,
    ) -> Result<(), StoreError>;

    async fn cast_vote(
        &self,
        voter: &User,
        target: VoteTarget,
        value: VoteValue,
    ) -> Result<VoteOutcome, StoreError>;

    // notifications
    async fn notification(
        &self,
        id: Id<NotificationMarker>,
    ) -> Result<Option<Notification>, StoreError>;

    /// Newest first page of the recipient's feed.
    async fn notifications(
        &self,
        recipient_id: Id<UserMarker>,
        query: NotificationQuery,
    ) -> Result<Vec<NotificationView>, StoreError>;

    async fn unread_count(&self, recipient_id: Id<UserMarker>) -> Result<u64, StoreError>;

    /// Marks the given notifications as read, or every unread one
    /// when `ids` is `None`. Returns how many rows changed.
    async fn mark_read(
        &self,
        recipient_id: Id<UserMarker>,
        ids: Option<&[Id<NotificationMarker>]>,
    ) -> Result<u64, StoreError>;

    async fn soft_delete_notifications(
        &self,
        recipient_id: Id<UserMarker>,
        ids: &[Id<NotificationMarker>],
    ) -> Result<u64, StoreError>;

    /// Removes one batch of notifications created before `before`.
    async fn delete_expired_batch(
        &self,
        before: DateTime<Utc>,
        batch_size: u32,
    ) -> Result<u64, StoreError>;

    // push delivery
    /// Creates or replaces the subscription of `(user, device)`. A new
    /// endpoint forgets every delivery recorded for the old one.
    async fn upsert_push_subscription(
        &self,
        new: NewPushSubscription,
    ) -> Result<PushSubscription, StoreError>;

    async fn remove_push_subscription(
        &self,
        user_id: Id<UserMarker>,
        device_id: &str,
    ) -> Result<bool, StoreError>;

    async fn enabled_push_subscriptions(
        &self,
        user_id: Id<UserMarker>,
    ) -> Result<Vec<PushSubscription>, StoreError>;

    /// Removes the subscription only while it still points at
    /// `endpoint`. Returns whether a row was removed.
    async fn delete_push_subscription(
        &self,
        id: Id<PushSubscriptionMarker>,
        endpoint: &str,
    ) -> Result<bool, StoreError>;

    async fn delivered_subscriptions(
        &self,
        notification_id: Id<NotificationMarker>,
    ) -> Result<Vec<Id<PushSubscriptionMarker>>, StoreError>;

    async fn record_delivery(
        &self,
        notification_id: Id<NotificationMarker>,
        subscription_id: Id<PushSubscriptionMarker>,
    ) -> Result<(), StoreError>;

    // outbox
    /// Leases up to `limit` pending intents. Intents claimed before
    /// `stale_before` are considered abandoned and handed out again.
    async fn claim_outbox(
        &self,
        limit: u32,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<OutboxEntry>, StoreError>;

    async fn complete_outbox(&self, id: Id<OutboxMarker>) -> Result<(), StoreError>;
    async fn release_outbox(&self, id: Id<OutboxMarker>) -> Result<(), StoreError>;
}

/// Hard deletes every notification older than `retention`, one
/// batch per statement. Returns the number of deleted rows.
#[tracing::instrument(skip(store), name = "db.query.notifications.cleanup_expired")]
pub async fn cleanup_expired(
    store: &dyn Store,
    retention: chrono::Duration,
    batch_size: u32,
) -> Result<u64, StoreError> {
    let before = crate::util::time::now() - retention;
    let mut total = 0;
    loop {
        let deleted = store.delete_expired_batch(before, batch_size).await?;
        total += deleted;
        if deleted < u64::from(batch_size) {
            break;
        }
    }
    Ok(total)
}

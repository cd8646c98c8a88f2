use async_trait::async_trait;
use chrono::{DateTime, Utc};
use error_stack::{Report, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{CommentOutcome, Rules, Store, StoreError};
use crate::notify;
use crate::schema::notification::{DedupKey, NotificationQuery};
use crate::schema::{
    Comment, Line, NewNotification, NewPushSubscription, Notification, NotificationView,
    OutboxEntry, Post, PushSubscription, User, VoteOutcome, VoteTarget, VoteValue,
};
use crate::types::id::marker::{
    CommentMarker, Marker, NotificationMarker, OutboxMarker, PostMarker, PushSubscriptionMarker,
    UserMarker,
};
use crate::types::id::Id;
use crate::util::time;

/// Keeps everything in process memory.
///
/// Used by tests and when no database is configured. All tables sit
/// behind one lock held for the whole operation, which makes every
/// operation atomic the same way a Postgres transaction does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rules: Rules,
    tables: Mutex<Tables>,
}

#[derive(Debug, Default)]
struct Tables {
    sequence: u64,
    last_timestamp: Option<DateTime<Utc>>,

    users: BTreeMap<Id<UserMarker>, User>,
    devices: HashMap<String, Id<UserMarker>>,
    posts: BTreeMap<Id<PostMarker>, Post>,
    comments: BTreeMap<Id<CommentMarker>, Comment>,
    votes: HashMap<(Id<UserMarker>, VoteTarget), i16>,

    notifications: BTreeMap<Id<NotificationMarker>, Notification>,
    dedup: HashSet<DedupKey>,
    milestones: HashSet<(Id<PostMarker>, u32)>,

    subscriptions: BTreeMap<Id<PushSubscriptionMarker>, PushSubscription>,
    deliveries: HashSet<(Id<NotificationMarker>, Id<PushSubscriptionMarker>)>,
    outbox: BTreeMap<Id<OutboxMarker>, OutboxEntry>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(rules: Rules) -> Self {
        Self {
            rules,
            tables: Mutex::default(),
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        // every operation validates before it mutates, so a panicking
        // holder cannot leave half-applied writes behind
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Tables {
    fn next_id<M: Marker>(&mut self) -> Id<M> {
        self.sequence += 1;
        Id::new(self.sequence)
    }

    /// Timestamps never go backwards, like `BIGSERIAL` ids.
    fn now(&mut self) -> DateTime<Utc> {
        let now = time::now();
        let now = match self.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_timestamp = Some(now);
        now
    }

    /// Inserts a notification unless it already exists, returning
    /// the created row. Creating it also enqueues its delivery.
    fn insert_notification(&mut self, new: NewNotification) -> Option<Notification> {
        if new.recipient_id == new.actor_id {
            return None;
        }

        let key = new.dedup_key();
        if self.dedup.contains(&key) {
            return None;
        }

        let milestone = new.kind.threshold().map(|t| (new.post_id, t));
        if let Some(milestone) = milestone {
            if self.milestones.contains(&milestone) {
                return None;
            }
            self.milestones.insert(milestone);
        }
        self.dedup.insert(key);

        let id = self.next_id();
        let created_at = self.now();
        let notification = Notification::from_new(id, new, created_at);
        self.notifications.insert(id, notification.clone());

        let outbox_id = self.next_id();
        self.outbox.insert(
            outbox_id,
            OutboxEntry {
                id: outbox_id,
                notification_id: id,
                attempts: 0,
                created_at,
                claimed_at: None,
            },
        );

        Some(notification)
    }

    fn remove_notification(&mut self, id: Id<NotificationMarker>) -> bool {
        let Some(notification) = self.notifications.remove(&id) else {
            return false;
        };
        self.dedup.remove(&notification.dedup_key());
        if let Some(threshold) = notification.kind.threshold() {
            self.milestones.remove(&(notification.post_id, threshold));
        }
        self.deliveries.retain(|(nid, ..)| *nid != id);
        self.outbox.retain(|_, entry| entry.notification_id != id);
        true
    }

    fn score_of(&self, target: VoteTarget) -> i64 {
        self.votes
            .iter()
            .filter(|((_, t), _)| *t == target)
            .map(|(_, value)| i64::from(*value))
            .sum()
    }

    fn active_comments(&self, post_id: Id<PostMarker>) -> i64 {
        let count = self
            .comments
            .values()
            .filter(|c| c.post_id == post_id && !c.is_deleted())
            .count();
        i64::try_from(count).unwrap_or(i64::MAX)
    }

    fn view(&self, notification: &Notification) -> Option<NotificationView> {
        let post = self.posts.get(&notification.post_id)?;
        let comment = notification
            .comment_id
            .and_then(|id| self.comments.get(&id));

        Some(NotificationView {
            id: notification.id,
            kind: notification.kind,
            post_id: notification.post_id,
            comment_id: notification.comment_id,
            actor_id: notification.actor_id,
            actor: notification.actor.clone(),
            content_preview: notification.content_preview.clone(),
            read_at: notification.read_at,
            created_at: notification.created_at,
            post_content: post.content.clone(),
            post_deleted: post.is_deleted(),
            comment_content: comment.map(|c| c.content.clone()),
            comment_deleted: comment.map(Comment::is_deleted),
        })
    }
}

fn not_found() -> Report<StoreError> {
    Report::new(StoreError::NotFound)
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_or_create_user(&self, device_id: &str) -> Result<User, StoreError> {
        let mut tables = self.tables();
        if let Some(id) = tables.devices.get(device_id).copied() {
            if let Some(user) = tables.users.get(&id) {
                return Ok(user.clone());
            }
        }

        let id = tables.next_id();
        let created_at = tables.now();
        let user = User {
            id,
            device_id: device_id.into(),
            display: Line::from_device(device_id).display_attr(),
            created_at,
            disabled_at: None,
        };
        tables.devices.insert(device_id.to_string(), id);
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn user(&self, id: Id<UserMarker>) -> Result<Option<User>, StoreError> {
        Ok(self.tables().users.get(&id).cloned())
    }

    async fn create_post(&self, author: &User, content: &str) -> Result<Post, StoreError> {
        let mut tables = self.tables();
        let id = tables.next_id();
        let created_at = tables.now();
        let post = Post {
            id,
            author_id: author.id,
            author: author.display.clone(),
            content: content.to_string(),
            score: 0,
            comment_count: 0,
            created_at,
            deleted_at: None,
        };
        tables.posts.insert(id, post.clone());
        Ok(post)
    }

    async fn post(&self, id: Id<PostMarker>) -> Result<Option<Post>, StoreError> {
        Ok(self.tables().posts.get(&id).cloned())
    }

    async fn delete_post(
        &self,
        author_id: Id<UserMarker>,
        id: Id<PostMarker>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables();
        let now = tables.now();
        let post = tables
            .posts
            .get_mut(&id)
            .filter(|post| post.author_id == author_id)
            .ok_or_else(not_found)?;

        post.deleted_at.get_or_insert(now);
        Ok(())
    }

    async fn create_comment(
        &self,
        author: &User,
        post_id: Id<PostMarker>,
        parent_id: Option<Id<CommentMarker>>,
        content: &str,
    ) -> Result<CommentOutcome, StoreError> {
        let mut tables = self.tables();
        let post = tables
            .posts
            .get(&post_id)
            .filter(|post| !post.is_deleted())
            .cloned()
            .ok_or_else(not_found)?;

        let parent = match parent_id {
            Some(parent_id) => {
                let parent = tables
                    .comments
                    .get(&parent_id)
                    .cloned()
                    .ok_or_else(not_found)?;

                if parent.post_id != post_id {
                    return Err(Report::new(StoreError::Rejected(
                        "parent comment belongs to another post",
                    )));
                }
                if parent.is_reply() {
                    return Err(Report::new(StoreError::Rejected(
                        "replies can only be one level deep",
                    )));
                }
                Some(parent)
            }
            None => None,
        };

        let id = tables.next_id();
        let created_at = tables.now();
        let comment = Comment {
            id,
            post_id,
            parent_id,
            author_id: author.id,
            author: author.display.clone(),
            content: content.to_string(),
            score: 0,
            created_at,
            deleted_at: None,
        };
        tables.comments.insert(id, comment.clone());

        let comment_count = tables.active_comments(post_id);
        if let Some(post) = tables.posts.get_mut(&post_id) {
            post.comment_count = comment_count;
        }

        let notification = notify::reply_notification(
            &post,
            parent.as_ref(),
            &comment,
            author,
            self.rules.preview_len,
        )
        .and_then(|new| tables.insert_notification(new));

        Ok(CommentOutcome {
            comment,
            notification,
        })
    }

    async fn delete_comment(
        &self,
        author_id: Id<UserMarker>,
        id: Id<CommentMarker>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables();
        let now = tables.now();
        let comment = tables
            .comments
            .get_mut(&id)
            .filter(|comment| comment.author_id == author_id)
            .ok_or_else(not_found)?;

        comment.deleted_at.get_or_insert(now);
        let post_id = comment.post_id;

        let comment_count = tables.active_comments(post_id);
        if let Some(post) = tables.posts.get_mut(&post_id) {
            post.comment_count = comment_count;
        }
        Ok(())
    }

    async fn cast_vote(
        &self,
        voter: &User,
        target: VoteTarget,
        value: VoteValue,
    ) -> Result<VoteOutcome, StoreError> {
        let mut tables = self.tables();
        let exists = match target {
            VoteTarget::Post(id) => tables.posts.get(&id).is_some_and(|p| !p.is_deleted()),
            VoteTarget::Comment(id) => tables.comments.get(&id).is_some_and(|c| !c.is_deleted()),
        };
        if !exists {
            return Err(not_found());
        }

        let key = (voter.id, target);
        match value.stored() {
            Some(stored) => tables.votes.insert(key, stored),
            None => tables.votes.remove(&key),
        };

        let score = tables.score_of(target);
        let mut milestones = Vec::new();
        match target {
            VoteTarget::Post(id) => {
                let Some(post) = tables.posts.get_mut(&id) else {
                    return Err(not_found());
                };
                let old = post.score;
                post.score = score;
                let post = post.clone();

                for threshold in notify::crossed_milestones(old, score, &self.rules.milestones) {
                    let created =
                        notify::milestone_notification(&post, threshold, voter, self.rules.preview_len)
                            .and_then(|new| tables.insert_notification(new));

                    milestones.extend(created);
                }
            }
            VoteTarget::Comment(id) => {
                if let Some(comment) = tables.comments.get_mut(&id) {
                    comment.score = score;
                }
            }
        }

        Ok(VoteOutcome { score, milestones })
    }

    async fn notification(
        &self,
        id: Id<NotificationMarker>,
    ) -> Result<Option<Notification>, StoreError> {
        Ok(self.tables().notifications.get(&id).cloned())
    }

    async fn notifications(
        &self,
        recipient_id: Id<UserMarker>,
        query: NotificationQuery,
    ) -> Result<Vec<NotificationView>, StoreError> {
        let tables = self.tables();
        let mut rows = tables
            .notifications
            .values()
            .filter(|n| n.recipient_id == recipient_id && n.deleted_at.is_none())
            .filter(|n| !query.unread_only || n.read_at.is_none())
            .filter(|n| {
                query
                    .cursor
                    .map_or(true, |cursor| cursor.is_before(n.created_at, n.id))
            })
            .collect::<Vec<_>>();

        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        let limit = usize::try_from(query.limit).unwrap_or(usize::MAX);

        Ok(rows
            .into_iter()
            .take(limit)
            .filter_map(|n| tables.view(n))
            .collect())
    }

    async fn unread_count(&self, recipient_id: Id<UserMarker>) -> Result<u64, StoreError> {
        let count = self
            .tables()
            .notifications
            .values()
            .filter(|n| n.recipient_id == recipient_id)
            .filter(|n| n.read_at.is_none() && n.deleted_at.is_none())
            .count();

        Ok(count as u64)
    }

    async fn mark_read(
        &self,
        recipient_id: Id<UserMarker>,
        ids: Option<&[Id<NotificationMarker>]>,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables();
        let now = tables.now();
        let mut updated = 0;
        for notification in tables.notifications.values_mut() {
            let selected = ids.map_or(true, |ids| ids.contains(&notification.id));
            if selected
                && notification.recipient_id == recipient_id
                && notification.read_at.is_none()
                && notification.deleted_at.is_none()
            {
                notification.read_at = Some(now);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn soft_delete_notifications(
        &self,
        recipient_id: Id<UserMarker>,
        ids: &[Id<NotificationMarker>],
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables();
        let now = tables.now();
        let mut deleted = 0;
        for id in ids {
            if let Some(notification) = tables.notifications.get_mut(id) {
                if notification.recipient_id == recipient_id && notification.deleted_at.is_none() {
                    notification.deleted_at = Some(now);
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    async fn delete_expired_batch(
        &self,
        before: DateTime<Utc>,
        batch_size: u32,
    ) -> Result<u64, StoreError> {
        let mut tables = self.tables();
        let mut expired = tables
            .notifications
            .values()
            .filter(|n| n.created_at < before)
            .map(|n| (n.created_at, n.id))
            .collect::<Vec<_>>();

        expired.sort();
        expired.truncate(usize::try_from(batch_size).unwrap_or(usize::MAX));

        let mut deleted = 0;
        for (_, id) in expired {
            if tables.remove_notification(id) {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn upsert_push_subscription(
        &self,
        new: NewPushSubscription,
    ) -> Result<PushSubscription, StoreError> {
        let mut tables = self.tables();
        let now = tables.now();
        let existing = tables
            .subscriptions
            .values_mut()
            .find(|s| s.user_id == new.user_id && s.device_id == new.device_id);

        if let Some(subscription) = existing {
            let id = subscription.id;
            let moved = subscription.endpoint.as_str() != new.endpoint.as_str();
            subscription.endpoint = new.endpoint;
            subscription.key_p256dh = new.key_p256dh;
            subscription.key_auth = new.key_auth;
            subscription.enabled = true;
            subscription.updated_at = now;
            let subscription = subscription.clone();
            if moved {
                tables.deliveries.retain(|(_, sid)| *sid != id);
            }
            return Ok(subscription);
        }

        let id = tables.next_id();
        let subscription = PushSubscription {
            id,
            user_id: new.user_id,
            device_id: new.device_id,
            endpoint: new.endpoint,
            key_p256dh: new.key_p256dh,
            key_auth: new.key_auth,
            enabled: true,
            created_at: now,
            updated_at: now,
        };
        tables.subscriptions.insert(id, subscription.clone());
        Ok(subscription)
    }

    async fn remove_push_subscription(
        &self,
        user_id: Id<UserMarker>,
        device_id: &str,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        let found = tables
            .subscriptions
            .values()
            .find(|s| s.user_id == user_id && s.device_id == device_id)
            .map(|s| s.id);

        if let Some(id) = found {
            tables.subscriptions.remove(&id);
            tables.deliveries.retain(|(_, sid)| *sid != id);
        }
        Ok(found.is_some())
    }

    async fn enabled_push_subscriptions(
        &self,
        user_id: Id<UserMarker>,
    ) -> Result<Vec<PushSubscription>, StoreError> {
        Ok(self
            .tables()
            .subscriptions
            .values()
            .filter(|s| s.user_id == user_id && s.enabled)
            .cloned()
            .collect())
    }

    async fn delete_push_subscription(
        &self,
        id: Id<PushSubscriptionMarker>,
        endpoint: &str,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables();
        let matches = tables
            .subscriptions
            .get(&id)
            .is_some_and(|s| s.endpoint.as_str() == endpoint);

        if matches {
            tables.subscriptions.remove(&id);
            tables.deliveries.retain(|(_, sid)| *sid != id);
        }
        Ok(matches)
    }

    async fn delivered_subscriptions(
        &self,
        notification_id: Id<NotificationMarker>,
    ) -> Result<Vec<Id<PushSubscriptionMarker>>, StoreError> {
        Ok(self
            .tables()
            .deliveries
            .iter()
            .filter(|(nid, _)| *nid == notification_id)
            .map(|(_, sid)| *sid)
            .collect())
    }

    async fn record_delivery(
        &self,
        notification_id: Id<NotificationMarker>,
        subscription_id: Id<PushSubscriptionMarker>,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables();
        if tables.notifications.contains_key(&notification_id)
            && tables.subscriptions.contains_key(&subscription_id)
        {
            tables.deliveries.insert((notification_id, subscription_id));
        }
        Ok(())
    }

    async fn claim_outbox(
        &self,
        limit: u32,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        let mut tables = self.tables();
        let now = tables.now();
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);

        let mut claimed = Vec::new();
        for entry in tables.outbox.values_mut() {
            if claimed.len() >= limit {
                break;
            }
            if entry.claimed_at.map_or(true, |at| at < stale_before) {
                entry.claimed_at = Some(now);
                entry.attempts += 1;
                claimed.push(entry.clone());
            }
        }
        Ok(claimed)
    }

    async fn complete_outbox(&self, id: Id<OutboxMarker>) -> Result<(), StoreError> {
        self.tables().outbox.remove(&id);
        Ok(())
    }

    async fn release_outbox(&self, id: Id<OutboxMarker>) -> Result<(), StoreError> {
        if let Some(entry) = self.tables().outbox.get_mut(&id) {
            entry.claimed_at = None;
        }
        Ok(())
    }
}

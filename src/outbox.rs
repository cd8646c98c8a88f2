//! Background worker that pushes newly created notifications.
//!
//! Every notification insert also writes a delivery intent to the
//! outbox in the same transaction. The worker leases intents, runs
//! the relay for each and removes the intent once every subscription
//! has been served.
use error_stack::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config;
use crate::relay::{Relay, RelayNotification};
use crate::schema::OutboxEntry;
use crate::store::{Store, StoreError};
use crate::util::signal::Shutdown;

/// Leases older than this belong to a worker that died and are
/// handed out again.
pub const LEASE_TIMEOUT_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct OutboxWorker {
    store: Arc<dyn Store>,
    relay: Relay,
    interval: Duration,
    batch_size: u32,
    max_attempts: u32,
}

impl OutboxWorker {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, relay: Relay, cfg: &config::Relay) -> Self {
        Self {
            store,
            relay,
            interval: cfg.outbox_interval(),
            batch_size: cfg.outbox_batch_size.get(),
            max_attempts: cfg.outbox_max_attempts.get(),
        }
    }

    pub async fn run(self, mut shutdown: Shutdown) {
        info!(interval = ?self.interval, "outbox worker started");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.wait() => break,
                _ = interval.tick() => {}
            }

            if let Err(error) = self.run_once().await {
                warn!(?error, "could not process the outbox");
            }
        }

        info!("outbox worker stopped");
    }

    /// Processes one batch of intents. Returns how many were leased.
    ///
    /// An intent that hits a storage error keeps its lease and is
    /// retried once the lease goes stale. The rest of the batch is
    /// still processed.
    #[tracing::instrument(skip(self), name = "outbox.run_once")]
    pub async fn run_once(&self) -> Result<usize, StoreError> {
        let stale_before =
            crate::util::time::now() - chrono::Duration::seconds(LEASE_TIMEOUT_SECS);

        let entries = self.store.claim_outbox(self.batch_size, stale_before).await?;
        if !entries.is_empty() {
            debug!(count = entries.len(), "leased outbox entries");
        }

        for entry in &entries {
            if let Err(error) = self.process(entry).await {
                warn!(?error, notification.id = %entry.notification_id, "could not process outbox entry");
            }
        }
        Ok(entries.len())
    }

    async fn process(&self, entry: &OutboxEntry) -> Result<(), StoreError> {
        let attempts = u32::try_from(entry.attempts).unwrap_or(u32::MAX);
        if attempts > self.max_attempts {
            error!(
                notification.id = %entry.notification_id,
                attempts,
                "giving up on delivering notification"
            );
            return self.store.complete_outbox(entry.id).await;
        }

        let notification = match self.store.notification(entry.notification_id).await? {
            Some(notification) if notification.deleted_at.is_none() => notification,
            _ => {
                debug!(notification.id = %entry.notification_id, "notification is gone, dropping intent");
                return self.store.complete_outbox(entry.id).await;
            }
        };

        match self.relay.deliver(&RelayNotification::from(&notification)).await {
            Ok(report) if report.failed == 0 => self.store.complete_outbox(entry.id).await,
            Ok(report) => {
                debug!(?report, notification.id = %notification.id, "retrying failed deliveries later");
                self.store.release_outbox(entry.id).await
            }
            Err(error) => {
                warn!(?error, notification.id = %notification.id, "relay failed");
                self.store.release_outbox(entry.id).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use error_stack::Report;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::push::{Message, PushError, Pusher};
    use crate::schema::notification::NotificationQuery;
    use crate::schema::{
        NewPushSubscription, Notification, NotificationView, Post, PushSubscription, User,
        VoteOutcome, VoteTarget, VoteValue,
    };
    use crate::store::{CommentOutcome, MemoryStore};
    use crate::types::id::marker::{
        CommentMarker, NotificationMarker, OutboxMarker, PostMarker, PushSubscriptionMarker,
        UserMarker,
    };
    use crate::types::id::Id;
    use chrono::{DateTime, Utc};

    #[derive(Debug, Default)]
    struct CountingPusher {
        calls: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait]
    impl Pusher for CountingPusher {
        async fn push(
            &self,
            _subscription: &PushSubscription,
            _message: &Message,
        ) -> error_stack::Result<(), PushError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                Err(Report::new(PushError::Transport))
            } else {
                Ok(())
            }
        }
    }

    /// Memory store whose lookup of one notification always fails.
    #[derive(Debug)]
    struct BrokenLookup {
        inner: Arc<MemoryStore>,
        broken: Id<NotificationMarker>,
    }

    #[async_trait]
    impl Store for BrokenLookup {
        async fn get_or_create_user(&self, device_id: &str) -> Result<User, StoreError> {
            self.inner.get_or_create_user(device_id).await
        }

        async fn user(&self, id: Id<UserMarker>) -> Result<Option<User>, StoreError> {
            self.inner.user(id).await
        }

        async fn create_post(&self, author: &User, content: &str) -> Result<Post, StoreError> {
            self.inner.create_post(author, content).await
        }

        async fn post(&self, id: Id<PostMarker>) -> Result<Option<Post>, StoreError> {
            self.inner.post(id).await
        }

        async fn delete_post(
            &self,
            author_id: Id<UserMarker>,
            id: Id<PostMarker>,
        ) -> Result<(), StoreError> {
            self.inner.delete_post(author_id, id).await
        }

        async fn create_comment(
            &self,
            author: &User,
            post_id: Id<PostMarker>,
            parent_id: Option<Id<CommentMarker>>,
            content: &str,
        ) -> Result<CommentOutcome, StoreError> {
            self.inner
                .create_comment(author, post_id, parent_id, content)
                .await
        }

        async fn delete_comment(
            &self,
            author_id: Id<UserMarker>,
            id: Id<CommentMarker>,
        ) -> Result<(), StoreError> {
            self.inner.delete_comment(author_id, id).await
        }

        async fn cast_vote(
            &self,
            voter: &User,
            target: VoteTarget,
            value: VoteValue,
        ) -> Result<VoteOutcome, StoreError> {
            self.inner.cast_vote(voter, target, value).await
        }

        async fn notification(
            &self,
            id: Id<NotificationMarker>,
        ) -> Result<Option<Notification>, StoreError> {
            if id == self.broken {
                return Err(Report::new(StoreError::Backend));
            }
            self.inner.notification(id).await
        }

        async fn notifications(
            &self,
            recipient_id: Id<UserMarker>,
            query: NotificationQuery,
        ) -> Result<Vec<NotificationView>, StoreError> {
            self.inner.notifications(recipient_id, query).await
        }

        async fn unread_count(&self, recipient_id: Id<UserMarker>) -> Result<u64, StoreError> {
            self.inner.unread_count(recipient_id).await
        }

        async fn mark_read(
            &self,
            recipient_id: Id<UserMarker>,
            ids: Option<&[Id<NotificationMarker>]>,
        ) -> Result<u64, StoreError> {
            self.inner.mark_read(recipient_id, ids).await
        }

        async fn soft_delete_notifications(
            &self,
            recipient_id: Id<UserMarker>,
            ids: &[Id<NotificationMarker>],
        ) -> Result<u64, StoreError> {
            self.inner.soft_delete_notifications(recipient_id, ids).await
        }

        async fn delete_expired_batch(
            &self,
            before: DateTime<Utc>,
            batch_size: u32,
        ) -> Result<u64, StoreError> {
            self.inner.delete_expired_batch(before, batch_size).await
        }

        async fn upsert_push_subscription(
            &self,
            new: NewPushSubscription,
        ) -> Result<PushSubscription, StoreError> {
            self.inner.upsert_push_subscription(new).await
        }

        async fn remove_push_subscription(
            &self,
            user_id: Id<UserMarker>,
            device_id: &str,
        ) -> Result<bool, StoreError> {
            self.inner.remove_push_subscription(user_id, device_id).await
        }

        async fn enabled_push_subscriptions(
            &self,
            user_id: Id<UserMarker>,
        ) -> Result<Vec<PushSubscription>, StoreError> {
            self.inner.enabled_push_subscriptions(user_id).await
        }

        async fn delete_push_subscription(
            &self,
            id: Id<PushSubscriptionMarker>,
            endpoint: &str,
        ) -> Result<bool, StoreError> {
            self.inner.delete_push_subscription(id, endpoint).await
        }

        async fn delivered_subscriptions(
            &self,
            notification_id: Id<NotificationMarker>,
        ) -> Result<Vec<Id<PushSubscriptionMarker>>, StoreError> {
            self.inner.delivered_subscriptions(notification_id).await
        }

        async fn record_delivery(
            &self,
            notification_id: Id<NotificationMarker>,
            subscription_id: Id<PushSubscriptionMarker>,
        ) -> Result<(), StoreError> {
            self.inner
                .record_delivery(notification_id, subscription_id)
                .await
        }

        async fn claim_outbox(
            &self,
            limit: u32,
            stale_before: DateTime<Utc>,
        ) -> Result<Vec<OutboxEntry>, StoreError> {
            self.inner.claim_outbox(limit, stale_before).await
        }

        async fn complete_outbox(&self, id: Id<OutboxMarker>) -> Result<(), StoreError> {
            self.inner.complete_outbox(id).await
        }

        async fn release_outbox(&self, id: Id<OutboxMarker>) -> Result<(), StoreError> {
            self.inner.release_outbox(id).await
        }
    }

    async fn setup() -> (Arc<MemoryStore>, Arc<CountingPusher>, OutboxWorker, User) {
        let store = Arc::new(MemoryStore::default());
        let pusher = Arc::new(CountingPusher::default());
        let relay = Relay::new(store.clone(), pusher.clone(), Relay::DEFAULT_TIMEOUT);
        let worker = OutboxWorker::new(store.clone(), relay, &config::Relay::default());

        let alice = store.get_or_create_user("alice-device").await.unwrap();
        store
            .upsert_push_subscription(NewPushSubscription {
                user_id: alice.id,
                device_id: "phone".into(),
                endpoint: "https://push.example/phone".into(),
                key_p256dh: "p256dh".into(),
                key_auth: "auth".into(),
            })
            .await
            .unwrap();

        (store, pusher, worker, alice)
    }

    async fn comment_on_post_of(store: &MemoryStore, author: &User) {
        let bob = store.get_or_create_user("bob-device-1").await.unwrap();
        let post = store.create_post(author, "hello").await.unwrap();
        store
            .create_comment(&bob, post.id, None, "nice")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delivers_and_completes() {
        let (store, pusher, worker, alice) = setup().await;
        comment_on_post_of(&store, &alice).await;

        assert_eq!(worker.run_once().await.unwrap(), 1);
        assert_eq!(pusher.calls.load(Ordering::SeqCst), 1);

        // nothing left to deliver
        assert_eq!(worker.run_once().await.unwrap(), 0);
        assert_eq!(pusher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_rounds_are_retried_then_dropped() {
        let (store, pusher, worker, alice) = setup().await;
        pusher.failing.store(true, Ordering::SeqCst);
        comment_on_post_of(&store, &alice).await;

        let max_attempts = config::Relay::default().outbox_max_attempts.get();
        for _ in 0..max_attempts {
            assert_eq!(worker.run_once().await.unwrap(), 1);
        }
        assert_eq!(pusher.calls.load(Ordering::SeqCst), max_attempts as usize);

        // one more lease which exceeds the limit and drops the intent
        assert_eq!(worker.run_once().await.unwrap(), 1);
        assert_eq!(pusher.calls.load(Ordering::SeqCst), max_attempts as usize);
        assert_eq!(worker.run_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_deleted_notifications_are_not_pushed() {
        let (store, pusher, worker, alice) = setup().await;
        comment_on_post_of(&store, &alice).await;

        let page = store
            .notifications(alice.id, Default::default())
            .await
            .unwrap();
        let ids = page.iter().map(|n| n.id).collect::<Vec<_>>();
        store.soft_delete_notifications(alice.id, &ids).await.unwrap();

        assert_eq!(worker.run_once().await.unwrap(), 1);
        assert_eq!(pusher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(worker.run_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_storage_error_does_not_abort_batch() {
        let (store, pusher, _, alice) = setup().await;
        let bob = store.get_or_create_user("bob-device-1").await.unwrap();

        let first = store.create_post(&alice, "first").await.unwrap();
        let broken = store
            .create_comment(&bob, first.id, None, "one")
            .await
            .unwrap()
            .notification
            .unwrap();
        let second = store.create_post(&alice, "second").await.unwrap();
        store
            .create_comment(&bob, second.id, None, "two")
            .await
            .unwrap();

        let failing = Arc::new(BrokenLookup {
            inner: store.clone(),
            broken: broken.id,
        });
        let relay = Relay::new(store.clone(), pusher.clone(), Relay::DEFAULT_TIMEOUT);
        let worker = OutboxWorker::new(failing, relay, &config::Relay::default());

        assert_eq!(worker.run_once().await.unwrap(), 2);
        assert_eq!(pusher.calls.load(Ordering::SeqCst), 1);

        // the broken intent stays leased until the lease goes stale
        assert_eq!(worker.run_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stops_on_shutdown() {
        let (_store, _pusher, worker, _alice) = setup().await;
        let (trigger, shutdown) = Shutdown::channel();

        let handle = tokio::spawn(worker.run(shutdown));
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}

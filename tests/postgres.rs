//! Runs the store against a real PostgreSQL database.
//!
//! Needs `DATABASE_URL` pointing at a PostgreSQL 15 server the tests
//! may create databases on:
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/whisperline cargo test -- --ignored
//! ```
use sqlx::PgPool;
use whisperline::database::Pool;
use whisperline::schema::notification::NotificationQuery;
use whisperline::schema::{NewPushSubscription, NotificationKind, VoteTarget, VoteValue};
use whisperline::store::{self, PgStore, Rules, Store};

fn store(pool: PgPool) -> PgStore {
    PgStore::new(Pool::from_pool(pool), Rules::default())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a PostgreSQL database"]
async fn reply_scenario(pool: PgPool) {
    let store = store(pool);
    let alice = store.get_or_create_user("alice-device").await.unwrap();
    let bob = store.get_or_create_user("bob-device-1").await.unwrap();
    assert_eq!(store.get_or_create_user("alice-device").await.unwrap().id, alice.id);

    let post = store.create_post(&alice, "hello").await.unwrap();
    let first = store.create_comment(&bob, post.id, None, "nice").await.unwrap();
    let notification = first.notification.unwrap();
    assert_eq!(notification.recipient_id, alice.id);
    assert_eq!(notification.kind, NotificationKind::ReplyToPost);
    assert_eq!(notification.comment_id, None);
    assert_eq!(notification.content_preview.as_deref(), Some("nice"));

    // same actor, same post: deduplicated even though comment_id is NULL
    let second = store.create_comment(&bob, post.id, None, "again").await.unwrap();
    assert!(second.notification.is_none());

    let reply = store
        .create_comment(&alice, post.id, Some(first.comment.id), "thanks")
        .await
        .unwrap();
    let notification = reply.notification.unwrap();
    assert_eq!(notification.recipient_id, bob.id);
    assert_eq!(notification.kind, NotificationKind::ReplyToComment);
    assert_eq!(notification.comment_id, Some(first.comment.id));

    assert_eq!(store.unread_count(alice.id).await.unwrap(), 1);
    assert_eq!(store.unread_count(bob.id).await.unwrap(), 1);

    let post = store.post(post.id).await.unwrap().unwrap();
    assert_eq!(post.comment_count, 3);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a PostgreSQL database"]
async fn milestones_fire_once(pool: PgPool) {
    let store = store(pool);
    let alice = store.get_or_create_user("alice-device").await.unwrap();
    let post = store.create_post(&alice, "vote for me").await.unwrap();

    let mut voters = Vec::new();
    for n in 0..5 {
        voters.push(store.get_or_create_user(&format!("voter-device-{n}")).await.unwrap());
    }

    let mut created = 0;
    for voter in &voters {
        let outcome = store
            .cast_vote(voter, VoteTarget::Post(post.id), VoteValue::Up)
            .await
            .unwrap();
        created += outcome.milestones.len();
    }
    assert_eq!(created, 1);

    // drop below and climb back over the threshold
    let last = &voters[4];
    let outcome = store
        .cast_vote(last, VoteTarget::Post(post.id), VoteValue::Down)
        .await
        .unwrap();
    assert_eq!(outcome.score, 3);
    let outcome = store
        .cast_vote(last, VoteTarget::Post(post.id), VoteValue::Up)
        .await
        .unwrap();
    assert_eq!(outcome.score, 5);
    assert!(outcome.milestones.is_empty());

    let feed = store
        .notifications(alice.id, NotificationQuery::default())
        .await
        .unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].kind, NotificationKind::Milestone(5));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a PostgreSQL database"]
async fn read_state_and_ownership(pool: PgPool) {
    let store = store(pool);
    let alice = store.get_or_create_user("alice-device").await.unwrap();
    let bob = store.get_or_create_user("bob-device-1").await.unwrap();
    let post = store.create_post(&alice, "hello").await.unwrap();
    let id = store
        .create_comment(&bob, post.id, None, "nice")
        .await
        .unwrap()
        .notification
        .unwrap()
        .id;

    assert_eq!(store.mark_read(bob.id, Some(&[id][..])).await.unwrap(), 0);
    assert_eq!(store.soft_delete_notifications(bob.id, &[id]).await.unwrap(), 0);
    assert_eq!(store.mark_read(alice.id, None).await.unwrap(), 1);
    assert_eq!(store.mark_read(alice.id, None).await.unwrap(), 0);
    assert_eq!(store.unread_count(alice.id).await.unwrap(), 0);

    assert_eq!(store.soft_delete_notifications(alice.id, &[id]).await.unwrap(), 1);
    assert_eq!(store.soft_delete_notifications(alice.id, &[id]).await.unwrap(), 0);
    assert!(store
        .notifications(alice.id, NotificationQuery::default())
        .await
        .unwrap()
        .is_empty());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a PostgreSQL database"]
async fn pagination_and_cleanup(pool: PgPool) {
    let store = store(pool);
    let alice = store.get_or_create_user("alice-device").await.unwrap();
    let post = store.create_post(&alice, "hello").await.unwrap();
    for n in 0..5 {
        let user = store.get_or_create_user(&format!("commenter-{n}")).await.unwrap();
        store.create_comment(&user, post.id, None, "nice").await.unwrap();
    }

    let mut seen = Vec::new();
    let mut query = NotificationQuery {
        limit: 2,
        ..NotificationQuery::default()
    };
    loop {
        let page = store.notifications(alice.id, query).await.unwrap();
        let Some(last) = page.last() else { break };
        query.cursor = Some(whisperline::types::Cursor::new(last.created_at, last.id));
        seen.extend(page.iter().map(|row| row.id));
    }
    assert_eq!(seen.len(), 5);
    let mut sorted = seen.clone();
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted.dedup();
    assert_eq!(sorted.len(), 5);

    let deleted = store::cleanup_expired(&store, chrono::Duration::days(30), 2)
        .await
        .unwrap();
    assert_eq!(deleted, 0);

    let deleted = store::cleanup_expired(&store, chrono::Duration::seconds(-1), 2)
        .await
        .unwrap();
    assert_eq!(deleted, 5);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "needs a PostgreSQL database"]
async fn outbox_and_delivery_markers(pool: PgPool) {
    let store = store(pool);
    let alice = store.get_or_create_user("alice-device").await.unwrap();
    let bob = store.get_or_create_user("bob-device-1").await.unwrap();
    let post = store.create_post(&alice, "hello").await.unwrap();
    let notification = store
        .create_comment(&bob, post.id, None, "nice")
        .await
        .unwrap()
        .notification
        .unwrap();

    let subscription = store
        .upsert_push_subscription(NewPushSubscription {
            user_id: alice.id,
            device_id: "phone".into(),
            endpoint: "https://push.example/phone".into(),
            key_p256dh: "p256dh".into(),
            key_auth: "auth".into(),
        })
        .await
        .unwrap();

    let long_ago = chrono::Utc::now() - chrono::Duration::hours(1);
    let claimed = store.claim_outbox(10, long_ago).await.unwrap();
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].notification_id, notification.id);
    assert!(store.claim_outbox(10, long_ago).await.unwrap().is_empty());

    store.record_delivery(notification.id, subscription.id).await.unwrap();
    store.record_delivery(notification.id, subscription.id).await.unwrap();
    assert_eq!(
        store.delivered_subscriptions(notification.id).await.unwrap(),
        vec![subscription.id]
    );

    store.complete_outbox(claimed[0].id).await.unwrap();
    let future = chrono::Utc::now() + chrono::Duration::hours(1);
    assert!(store.claim_outbox(10, future).await.unwrap().is_empty());

    // moving the device to a new endpoint forgets its deliveries and
    // protects it from removal through the old endpoint
    let moved = store
        .upsert_push_subscription(NewPushSubscription {
            user_id: alice.id,
            device_id: "phone".into(),
            endpoint: "https://push.example/phone-2".into(),
            key_p256dh: "p256dh".into(),
            key_auth: "auth".into(),
        })
        .await
        .unwrap();
    assert_eq!(moved.id, subscription.id);
    assert!(store.delivered_subscriptions(notification.id).await.unwrap().is_empty());
    assert!(!store
        .delete_push_subscription(moved.id, "https://push.example/phone")
        .await
        .unwrap());
    assert_eq!(store.enabled_push_subscriptions(alice.id).await.unwrap().len(), 1);

    assert!(store.remove_push_subscription(alice.id, "phone").await.unwrap());
    assert!(store.enabled_push_subscriptions(alice.id).await.unwrap().is_empty());
}

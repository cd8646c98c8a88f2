use async_trait::async_trait;
use chrono::{DateTime, Utc};
use error_stack::{Report, Result, ResultExt};
use sqlx::{PgConnection, QueryBuilder};

use super::{CommentOutcome, Rules, Store, StoreError};
use crate::database::{self, ErrorExt};
use crate::notify;
use crate::schema::notification::NotificationQuery;
use crate::schema::{
    Comment, Line, NewNotification, NewPushSubscription, Notification, NotificationView,
    OutboxEntry, Post, PushSubscription, User, VoteOutcome, VoteTarget, VoteValue,
};
use crate::types::id::marker::{
    CommentMarker, NotificationMarker, OutboxMarker, PostMarker, PushSubscriptionMarker,
    UserMarker,
};
use crate::types::id::Id;

const USER_COLUMNS: &str = "id, device_id, line, color, created_at, disabled_at";

const POST_COLUMNS: &str = "id, author_id, author_line AS line, author_color AS color, \
    content, score, comment_count, created_at, deleted_at";

const COMMENT_COLUMNS: &str = "id, post_id, parent_id, author_id, author_line AS line, \
    author_color AS color, content, score, created_at, deleted_at";

const NOTIFICATION_COLUMNS: &str = "id, recipient_id, kind, post_id, comment_id, actor_id, \
    actor_line AS line, actor_color AS color, content_preview, read_at, deleted_at, created_at";

const OUTBOX_COLUMNS: &str = "id, notification_id, attempts, created_at, claimed_at";

/// Stores everything in Postgres.
///
/// Writes that derive notifications lock the row they change with
/// `FOR UPDATE` first, so concurrent votes on the same post observe
/// each other's score and a milestone is crossed by exactly one of
/// them.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: database::Pool,
    rules: Rules,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: database::Pool, rules: Rules) -> Self {
        Self { pool, rules }
    }

    #[must_use]
    pub fn pool(&self) -> &database::Pool {
        &self.pool
    }

    async fn conn(&self) -> Result<database::PoolConnection, StoreError> {
        self.pool.get().await.change_context(StoreError::Backend)
    }

    async fn begin(&self) -> Result<database::Transaction<'static>, StoreError> {
        self.pool.begin().await.change_context(StoreError::Backend)
    }
}

trait QueryResultExt<T> {
    fn store_error(self) -> Result<T, StoreError>;
}

impl<T> QueryResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn store_error(self) -> Result<T, StoreError> {
        self.into_db_error().change_context(StoreError::Backend)
    }
}

fn to_i64s<M: crate::types::id::marker::Marker + Copy>(ids: &[Id<M>]) -> Vec<i64> {
    ids.iter().map(|id| id.as_i64()).collect()
}

/// Inserts `new` unless it duplicates an existing notification and
/// queues its delivery in the same statement.
async fn insert_notification(
    conn: &mut PgConnection,
    new: &NewNotification,
) -> Result<Option<Notification>, StoreError> {
    let threshold = new.kind.threshold().and_then(|t| i32::try_from(t).ok());
    let sql = format!(
        "WITH inserted AS (
            INSERT INTO notifications (recipient_id, kind, threshold, post_id, comment_id,
                actor_id, actor_line, actor_color, content_preview)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT DO NOTHING
            RETURNING {NOTIFICATION_COLUMNS}
        ), queued AS (
            INSERT INTO delivery_outbox (notification_id)
            SELECT id FROM inserted
        )
        SELECT * FROM inserted"
    );

    sqlx::query_as::<_, Notification>(&sql)
        .bind(new.recipient_id)
        .bind(new.kind)
        .bind(threshold)
        .bind(new.post_id)
        .bind(new.comment_id)
        .bind(new.actor_id)
        .bind(new.actor.line)
        .bind(&new.actor.color)
        .bind(new.content_preview.as_deref())
        .fetch_optional(conn)
        .await
        .store_error()
}

async fn refresh_comment_count(
    conn: &mut PgConnection,
    post_id: Id<PostMarker>,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE posts SET comment_count = (
            SELECT count(*) FROM comments WHERE post_id = $1 AND deleted_at IS NULL
        ) WHERE id = $1",
    )
    .bind(post_id)
    .execute(conn)
    .await
    .store_error()?;
    Ok(())
}

#[async_trait]
impl Store for PgStore {
    #[tracing::instrument(skip_all, name = "db.query.users.get_or_create")]
    async fn get_or_create_user(&self, device_id: &str) -> Result<User, StoreError> {
        let display = Line::from_device(device_id).display_attr();
        let sql = format!(
            "INSERT INTO users (device_id, line, color) VALUES ($1, $2, $3)
             ON CONFLICT (device_id) DO UPDATE SET device_id = EXCLUDED.device_id
             RETURNING {USER_COLUMNS}"
        );

        let mut conn = self.conn().await?;
        sqlx::query_as::<_, User>(&sql)
            .bind(device_id)
            .bind(display.line)
            .bind(&display.color)
            .fetch_one(&mut *conn)
            .await
            .store_error()
    }

    #[tracing::instrument(skip(self), name = "db.query.users.find")]
    async fn user(&self, id: Id<UserMarker>) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let mut conn = self.conn().await?;
        sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .store_error()
    }

    #[tracing::instrument(skip_all, name = "db.query.posts.create")]
    async fn create_post(&self, author: &User, content: &str) -> Result<Post, StoreError> {
        let sql = format!(
            "INSERT INTO posts (author_id, author_line, author_color, content)
             VALUES ($1, $2, $3, $4)
             RETURNING {POST_COLUMNS}"
        );

        let mut conn = self.conn().await?;
        sqlx::query_as::<_, Post>(&sql)
            .bind(author.id)
            .bind(author.display.line)
            .bind(&author.display.color)
            .bind(content)
            .fetch_one(&mut *conn)
            .await
            .store_error()
    }

    #[tracing::instrument(skip(self), name = "db.query.posts.find")]
    async fn post(&self, id: Id<PostMarker>) -> Result<Option<Post>, StoreError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1");
        let mut conn = self.conn().await?;
        sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .store_error()
    }

    #[tracing::instrument(skip(self), name = "db.query.posts.delete")]
    async fn delete_post(
        &self,
        author_id: Id<UserMarker>,
        id: Id<PostMarker>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let found = sqlx::query_scalar::<_, bool>(
            "UPDATE posts SET deleted_at = COALESCE(deleted_at, now())
             WHERE id = $1 AND author_id = $2
             RETURNING TRUE",
        )
        .bind(id)
        .bind(author_id)
        .fetch_optional(&mut *conn)
        .await
        .store_error()?;

        match found {
            Some(..) => Ok(()),
            None => Err(Report::new(StoreError::NotFound)),
        }
    }

    #[tracing::instrument(skip(self, author, content), name = "db.query.comments.create")]
    async fn create_comment(
        &self,
        author: &User,
        post_id: Id<PostMarker>,
        parent_id: Option<Id<CommentMarker>>,
        content: &str,
    ) -> Result<CommentOutcome, StoreError> {
        let mut tx = self.begin().await?;

        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1 FOR UPDATE");
        let post = sqlx::query_as::<_, Post>(&sql)
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await
            .store_error()?
            .filter(|post| !post.is_deleted())
            .ok_or_else(|| Report::new(StoreError::NotFound))?;

        let parent = match parent_id {
            Some(parent_id) => {
                let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1 FOR SHARE");
                let parent = sqlx::query_as::<_, Comment>(&sql)
                    .bind(parent_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .store_error()?
                    .ok_or_else(|| Report::new(StoreError::NotFound))?;

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

        let sql = format!(
            "INSERT INTO comments (post_id, parent_id, author_id, author_line, author_color, content)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COMMENT_COLUMNS}"
        );
        let comment = sqlx::query_as::<_, Comment>(&sql)
            .bind(post_id)
            .bind(parent_id)
            .bind(author.id)
            .bind(author.display.line)
            .bind(&author.display.color)
            .bind(content)
            .fetch_one(&mut *tx)
            .await
            .store_error()?;

        refresh_comment_count(&mut tx, post_id).await?;

        let notification = match notify::reply_notification(
            &post,
            parent.as_ref(),
            &comment,
            author,
            self.rules.preview_len,
        ) {
            Some(new) => insert_notification(&mut tx, &new).await?,
            None => None,
        };

        tx.commit().await.store_error()?;
        Ok(CommentOutcome {
            comment,
            notification,
        })
    }

    #[tracing::instrument(skip(self), name = "db.query.comments.delete")]
    async fn delete_comment(
        &self,
        author_id: Id<UserMarker>,
        id: Id<CommentMarker>,
    ) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;
        let post_id = sqlx::query_scalar::<_, Id<PostMarker>>(
            "UPDATE comments SET deleted_at = COALESCE(deleted_at, now())
             WHERE id = $1 AND author_id = $2
             RETURNING post_id",
        )
        .bind(id)
        .bind(author_id)
        .fetch_optional(&mut *tx)
        .await
        .store_error()?
        .ok_or_else(|| Report::new(StoreError::NotFound))?;

        refresh_comment_count(&mut tx, post_id).await?;
        tx.commit().await.store_error()?;
        Ok(())
    }

    #[tracing::instrument(skip(self, voter), name = "db.query.votes.cast")]
    async fn cast_vote(
        &self,
        voter: &User,
        target: VoteTarget,
        value: VoteValue,
    ) -> Result<VoteOutcome, StoreError> {
        let mut tx = self.begin().await?;

        // lock the target before touching votes so score recomputes
        // on the same target are serialized
        let post = match target {
            VoteTarget::Post(id) => {
                let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1 FOR UPDATE");
                let post = sqlx::query_as::<_, Post>(&sql)
                    .bind(id)
                    .fetch_optional(&mut *tx)
                    .await
                    .store_error()?
                    .filter(|post| !post.is_deleted())
                    .ok_or_else(|| Report::new(StoreError::NotFound))?;
                Some(post)
            }
            VoteTarget::Comment(id) => {
                let exists = sqlx::query_scalar::<_, bool>(
                    "SELECT TRUE FROM comments WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
                )
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .store_error()?;

                if exists.is_none() {
                    return Err(Report::new(StoreError::NotFound));
                }
                None
            }
        };

        let (column, table, target_id) = match target {
            VoteTarget::Post(id) => ("post_id", "posts", id.as_i64()),
            VoteTarget::Comment(id) => ("comment_id", "comments", id.as_i64()),
        };

        match value.stored() {
            Some(stored) => {
                let sql = format!(
                    "INSERT INTO votes (voter_id, {column}, value) VALUES ($1, $2, $3)
                     ON CONFLICT (voter_id, {column}) WHERE {column} IS NOT NULL
                     DO UPDATE SET value = EXCLUDED.value"
                );
                sqlx::query(&sql)
                    .bind(voter.id)
                    .bind(target_id)
                    .bind(stored)
                    .execute(&mut *tx)
                    .await
                    .store_error()?;
            }
            None => {
                let sql = format!("DELETE FROM votes WHERE voter_id = $1 AND {column} = $2");
                sqlx::query(&sql)
                    .bind(voter.id)
                    .bind(target_id)
                    .execute(&mut *tx)
                    .await
                    .store_error()?;
            }
        }

        let sql = format!(
            "UPDATE {table} SET score = (
                SELECT COALESCE(SUM(value), 0) FROM votes WHERE {column} = $1
            ) WHERE id = $1
            RETURNING score"
        );
        let score = sqlx::query_scalar::<_, i64>(&sql)
            .bind(target_id)
            .fetch_one(&mut *tx)
            .await
            .store_error()?;

        let mut milestones = Vec::new();
        if let Some(post) = post {
            for threshold in notify::crossed_milestones(post.score, score, &self.rules.milestones) {
                let Some(new) =
                    notify::milestone_notification(&post, threshold, voter, self.rules.preview_len)
                else {
                    continue;
                };
                milestones.extend(insert_notification(&mut tx, &new).await?);
            }
        }

        tx.commit().await.store_error()?;
        Ok(VoteOutcome { score, milestones })
    }

    #[tracing::instrument(skip(self), name = "db.query.notifications.find")]
    async fn notification(
        &self,
        id: Id<NotificationMarker>,
    ) -> Result<Option<Notification>, StoreError> {
        let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1");
        let mut conn = self.conn().await?;
        sqlx::query_as::<_, Notification>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .store_error()
    }

    #[tracing::instrument(skip(self), name = "db.query.notifications.list")]
    async fn notifications(
        &self,
        recipient_id: Id<UserMarker>,
        query: NotificationQuery,
    ) -> Result<Vec<NotificationView>, StoreError> {
        let mut builder = QueryBuilder::<sqlx::Postgres>::new(
            "SELECT n.id, n.kind, n.post_id, n.comment_id, n.actor_id,
                n.actor_line AS line, n.actor_color AS color, n.content_preview,
                n.read_at, n.created_at,
                p.content AS post_content, (p.deleted_at IS NOT NULL) AS post_deleted,
                c.content AS comment_content,
                CASE WHEN c.id IS NULL THEN NULL ELSE (c.deleted_at IS NOT NULL) END AS comment_deleted
            FROM notifications n
            JOIN posts p ON p.id = n.post_id
            LEFT JOIN comments c ON c.id = n.comment_id
            WHERE n.deleted_at IS NULL AND n.recipient_id = ",
        );
        builder.push_bind(recipient_id);

        if query.unread_only {
            builder.push(" AND n.read_at IS NULL");
        }

        if let Some(cursor) = query.cursor {
            builder
                .push(" AND (n.created_at, n.id) < (")
                .push_bind(cursor.created_at)
                .push(", ")
                .push_bind(cursor.id)
                .push(")");
        }

        builder
            .push(" ORDER BY n.created_at DESC, n.id DESC LIMIT ")
            .push_bind(i64::from(query.limit));

        let mut conn = self.conn().await?;
        builder
            .build_query_as::<NotificationView>()
            .fetch_all(&mut *conn)
            .await
            .store_error()
    }

    #[tracing::instrument(skip(self), name = "db.query.notifications.unread_count")]
    async fn unread_count(&self, recipient_id: Id<UserMarker>) -> Result<u64, StoreError> {
        let mut conn = self.conn().await?;
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT count(*) FROM notifications
             WHERE recipient_id = $1 AND read_at IS NULL AND deleted_at IS NULL",
        )
        .bind(recipient_id)
        .fetch_one(&mut *conn)
        .await
        .store_error()?;

        Ok(u64::try_from(count).unwrap_or_default())
    }

    #[tracing::instrument(skip(self), name = "db.query.notifications.mark_read")]
    async fn mark_read(
        &self,
        recipient_id: Id<UserMarker>,
        ids: Option<&[Id<NotificationMarker>]>,
    ) -> Result<u64, StoreError> {
        let mut builder = QueryBuilder::<sqlx::Postgres>::new(
            "UPDATE notifications SET read_at = now()
             WHERE read_at IS NULL AND deleted_at IS NULL AND recipient_id = ",
        );
        builder.push_bind(recipient_id);
        if let Some(ids) = ids {
            builder.push(" AND id = ANY(").push_bind(to_i64s(ids)).push(")");
        }

        let mut conn = self.conn().await?;
        let result = builder.build().execute(&mut *conn).await.store_error()?;
        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self), name = "db.query.notifications.soft_delete")]
    async fn soft_delete_notifications(
        &self,
        recipient_id: Id<UserMarker>,
        ids: &[Id<NotificationMarker>],
    ) -> Result<u64, StoreError> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(
            "UPDATE notifications SET deleted_at = now()
             WHERE recipient_id = $1 AND deleted_at IS NULL AND id = ANY($2)",
        )
        .bind(recipient_id)
        .bind(to_i64s(ids))
        .execute(&mut *conn)
        .await
        .store_error()?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip(self), name = "db.query.notifications.delete_expired")]
    async fn delete_expired_batch(
        &self,
        before: DateTime<Utc>,
        batch_size: u32,
    ) -> Result<u64, StoreError> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(
            "DELETE FROM notifications WHERE id IN (
                SELECT id FROM notifications WHERE created_at < $1
                ORDER BY created_at LIMIT $2
            )",
        )
        .bind(before)
        .bind(i64::from(batch_size))
        .execute(&mut *conn)
        .await
        .store_error()?;

        Ok(result.rows_affected())
    }

    #[tracing::instrument(skip_all, name = "db.query.push_subscriptions.upsert")]
    async fn upsert_push_subscription(
        &self,
        new: NewPushSubscription,
    ) -> Result<PushSubscription, StoreError> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<_, PushSubscription>(
            "WITH previous AS (
                SELECT id, endpoint FROM push_subscriptions
                WHERE user_id = $1 AND device_id = $2
                FOR UPDATE
             ),
             forgotten AS (
                DELETE FROM delivery_attempts d
                USING previous p
                WHERE d.subscription_id = p.id AND p.endpoint <> $3
             )
             INSERT INTO push_subscriptions (user_id, device_id, endpoint, key_p256dh, key_auth)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (user_id, device_id) DO UPDATE SET
                endpoint = EXCLUDED.endpoint,
                key_p256dh = EXCLUDED.key_p256dh,
                key_auth = EXCLUDED.key_auth,
                enabled = TRUE,
                updated_at = now()
             RETURNING *",
        )
        .bind(new.user_id)
        .bind(&new.device_id)
        .bind(&new.endpoint)
        .bind(&new.key_p256dh)
        .bind(&new.key_auth)
        .fetch_one(&mut *conn)
        .await
        .store_error()
    }

    #[tracing::instrument(skip(self), name = "db.query.push_subscriptions.remove")]
    async fn remove_push_subscription(
        &self,
        user_id: Id<UserMarker>,
        device_id: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let result = sqlx::query(
            "DELETE FROM push_subscriptions WHERE user_id = $1 AND device_id = $2",
        )
        .bind(user_id)
        .bind(device_id)
        .execute(&mut *conn)
        .await
        .store_error()?;

        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), name = "db.query.push_subscriptions.enabled")]
    async fn enabled_push_subscriptions(
        &self,
        user_id: Id<UserMarker>,
    ) -> Result<Vec<PushSubscription>, StoreError> {
        let mut conn = self.conn().await?;
        sqlx::query_as::<_, PushSubscription>(
            "SELECT * FROM push_subscriptions WHERE user_id = $1 AND enabled ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
        .store_error()
    }

    #[tracing::instrument(skip(self, endpoint), name = "db.query.push_subscriptions.delete")]
    async fn delete_push_subscription(
        &self,
        id: Id<PushSubscriptionMarker>,
        endpoint: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let result = sqlx::query("DELETE FROM push_subscriptions WHERE id = $1 AND endpoint = $2")
            .bind(id)
            .bind(endpoint)
            .execute(&mut *conn)
            .await
            .store_error()?;
        Ok(result.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self), name = "db.query.delivery_attempts.list")]
    async fn delivered_subscriptions(
        &self,
        notification_id: Id<NotificationMarker>,
    ) -> Result<Vec<Id<PushSubscriptionMarker>>, StoreError> {
        let mut conn = self.conn().await?;
        sqlx::query_scalar::<_, Id<PushSubscriptionMarker>>(
            "SELECT subscription_id FROM delivery_attempts WHERE notification_id = $1",
        )
        .bind(notification_id)
        .fetch_all(&mut *conn)
        .await
        .store_error()
    }

    #[tracing::instrument(skip(self), name = "db.query.delivery_attempts.record")]
    async fn record_delivery(
        &self,
        notification_id: Id<NotificationMarker>,
        subscription_id: Id<PushSubscriptionMarker>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        sqlx::query(
            "INSERT INTO delivery_attempts (notification_id, subscription_id)
             SELECT $1, $2
             WHERE EXISTS (SELECT 1 FROM notifications WHERE id = $1)
               AND EXISTS (SELECT 1 FROM push_subscriptions WHERE id = $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(notification_id)
        .bind(subscription_id)
        .execute(&mut *conn)
        .await
        .store_error()?;
        Ok(())
    }

    #[tracing::instrument(skip(self), name = "db.query.outbox.claim")]
    async fn claim_outbox(
        &self,
        limit: u32,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        let sql = format!(
            "UPDATE delivery_outbox SET claimed_at = now(), attempts = attempts + 1
             WHERE id IN (
                SELECT id FROM delivery_outbox
                WHERE claimed_at IS NULL OR claimed_at < $1
                ORDER BY id
                LIMIT $2
                FOR UPDATE SKIP LOCKED
             )
             RETURNING {OUTBOX_COLUMNS}"
        );

        let mut conn = self.conn().await?;
        let mut entries = sqlx::query_as::<_, OutboxEntry>(&sql)
            .bind(stale_before)
            .bind(i64::from(limit))
            .fetch_all(&mut *conn)
            .await
            .store_error()?;

        entries.sort_by_key(|entry| entry.id);
        Ok(entries)
    }

    #[tracing::instrument(skip(self), name = "db.query.outbox.complete")]
    async fn complete_outbox(&self, id: Id<OutboxMarker>) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        sqlx::query("DELETE FROM delivery_outbox WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .store_error()?;
        Ok(())
    }

    #[tracing::instrument(skip(self), name = "db.query.outbox.release")]
    async fn release_outbox(&self, id: Id<OutboxMarker>) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        sqlx::query("UPDATE delivery_outbox SET claimed_at = NULL WHERE id = $1")
            .bind(id)
            .execute(&mut *conn)
            .await
            .store_error()?;
        Ok(())
    }
}

//! Decides which notifications a write produces.
//!
//! Every function here is pure. The stores call them while holding
//! the write transaction (or lock) of the action that caused them,
//! so the decision and the insert happen atomically.
use crate::schema::{Comment, NewNotification, NotificationKind, Post, User};

/// Cuts `content` down to at most `max_chars` characters, never
/// splitting a character in half.
#[must_use]
pub fn preview(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((end, ..)) => content[..end].to_string(),
        None => content.to_string(),
    }
}

/// Notification caused by `comment` being written on `post`.
///
/// The recipient is the author of `parent` when the comment is a
/// reply, otherwise the author of the post. Returns `None` when the
/// actor would notify themselves or the content replied to is
/// already deleted.
#[must_use]
pub fn reply_notification(
    post: &Post,
    parent: Option<&Comment>,
    comment: &Comment,
    actor: &User,
    preview_len: usize,
) -> Option<NewNotification> {
    if post.is_deleted() {
        return None;
    }

    let (recipient_id, kind, comment_id) = match parent {
        Some(parent) if parent.is_deleted() => return None,
        Some(parent) => (
            parent.author_id,
            NotificationKind::ReplyToComment,
            Some(parent.id),
        ),
        None => (post.author_id, NotificationKind::ReplyToPost, None),
    };

    if recipient_id == actor.id {
        return None;
    }

    Some(NewNotification {
        recipient_id,
        kind,
        post_id: post.id,
        comment_id,
        actor_id: actor.id,
        actor: actor.display.clone(),
        content_preview: Some(preview(&comment.content, preview_len)),
    })
}

/// Thresholds `T` with `old < T <= new`, in ascending order.
///
/// Nothing is crossed when the score goes down or stays the same.
#[must_use]
pub fn crossed_milestones(old: i64, new: i64, thresholds: &[u32]) -> Vec<u32> {
    thresholds
        .iter()
        .copied()
        .filter(|t| old < i64::from(*t) && i64::from(*t) <= new)
        .collect()
}

/// Notification telling the author of `post` that it reached
/// `threshold`, credited to the voter who pushed it over.
#[must_use]
pub fn milestone_notification(
    post: &Post,
    threshold: u32,
    actor: &User,
    preview_len: usize,
) -> Option<NewNotification> {
    if post.is_deleted() || post.author_id == actor.id {
        return None;
    }

    Some(NewNotification {
        recipient_id: post.author_id,
        kind: NotificationKind::Milestone(threshold),
        post_id: post.id,
        comment_id: None,
        actor_id: actor.id,
        actor: actor.display.clone(),
        content_preview: Some(preview(&post.content, preview_len)),
    })
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;

    use crate::schema::{Comment, Line, Post, User};
    use crate::types::id::Id;

    pub fn user(id: u64, line: Line) -> User {
        User {
            id: Id::new(id),
            device_id: format!("device-{id:08}").into(),
            display: line.display_attr(),
            created_at: Utc::now(),
            disabled_at: None,
        }
    }

    pub fn post(id: u64, author: &User, content: &str) -> Post {
        Post {
            id: Id::new(id),
            author_id: author.id,
            author: author.display.clone(),
            content: content.to_string(),
            score: 0,
            comment_count: 0,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }

    pub fn comment(id: u64, post: &Post, parent: Option<&Comment>, author: &User, content: &str) -> Comment {
        Comment {
            id: Id::new(id),
            post_id: post.id,
            parent_id: parent.map(|p| p.id),
            author_id: author.id,
            author: author.display.clone(),
            content: content.to_string(),
            score: 0,
            created_at: Utc::now(),
            deleted_at: None,
        }
    }
}

//! Rows of whisperline's database and the domain types stored in them.
mod macros;

pub mod comment;
pub mod notification;
pub mod outbox;
pub mod post;
pub mod push_subscription;
pub mod user;
pub mod vote;

pub use comment::Comment;
pub use notification::{NewNotification, Notification, NotificationKind, NotificationView};
pub use outbox::OutboxEntry;
pub use post::Post;
pub use push_subscription::{NewPushSubscription, PushSubscription};
pub use user::{DisplayAttr, Line, User};
pub use vote::{VoteOutcome, VoteTarget, VoteValue};

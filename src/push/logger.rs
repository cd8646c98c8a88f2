use async_trait::async_trait;
use error_stack::Result;
use tracing::info;

use super::{Message, PushError, Pusher};
use crate::schema::PushSubscription;

/// Used when no push gateway is configured. Every message counts as
/// delivered and is only written to the logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPusher;

#[async_trait]
impl Pusher for LogPusher {
    async fn push(
        &self,
        subscription: &PushSubscription,
        message: &Message,
    ) -> Result<(), PushError> {
        info!(
            subscription.id = %subscription.id,
            user.id = %subscription.user_id,
            title = %message.title,
            "push gateway is not configured; logging message instead"
        );
        Ok(())
    }
}

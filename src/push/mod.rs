//! Hands messages to the devices of a user.
use async_trait::async_trait;
use error_stack::Result;
use serde::Serialize;
use thiserror::Error;

use crate::schema::PushSubscription;

mod gateway;
mod logger;

pub use gateway::GatewayPusher;
pub use logger::LogPusher;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PushError {
    /// The provider no longer knows this endpoint. The subscription
    /// should be removed.
    #[error("push endpoint is gone")]
    Gone,
    #[error("push provider rejected the message with status {0}")]
    Rejected(u16),
    #[error("could not reach the push provider")]
    Transport,
}

/// What a device shows for a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub title: String,
    pub body: String,
    pub data: MessageData,
}

/// Data the client uses to open the right screen when the message
/// is tapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageData {
    pub notification_id: Option<String>,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
}

#[async_trait]
pub trait Pusher: std::fmt::Debug + Send + Sync + 'static {
    async fn push(
        &self,
        subscription: &PushSubscription,
        message: &Message,
    ) -> Result<(), PushError>;
}

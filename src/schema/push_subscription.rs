use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::id::{
    marker::{PushSubscriptionMarker, UserMarker},
    Id,
};
use crate::util::Sensitive;

/// A device of a user able to receive push messages.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct PushSubscription {
    pub id: Id<PushSubscriptionMarker>,
    pub user_id: Id<UserMarker>,
    pub device_id: String,
    /// Opaque, provider-issued address of the device.
    #[serde(skip)]
    pub endpoint: Sensitive<String>,
    #[serde(skip)]
    pub key_p256dh: Sensitive<String>,
    #[serde(skip)]
    pub key_auth: Sensitive<String>,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewPushSubscription {
    pub user_id: Id<UserMarker>,
    pub device_id: String,
    pub endpoint: Sensitive<String>,
    pub key_p256dh: Sensitive<String>,
    pub key_auth: Sensitive<String>,
}

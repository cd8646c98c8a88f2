//! Fans a notification out to every push subscription of its
//! recipient.
use error_stack::{Result, ResultExt};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::push::{Message, PushError, Pusher};
use crate::schema::PushSubscription;
use crate::store::Store;
use crate::types::id::marker::{NotificationMarker, PushSubscriptionMarker};
use crate::types::id::Id;

pub mod event;
pub mod template;

pub use event::{Event, EventError, RelayNotification};

#[derive(Debug, Error)]
#[error("Failed to relay notification")]
pub struct RelayError;

/// Counters of one relay round.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Report {
    pub sent: u32,
    pub failed: u32,
    pub total: u32,
    #[serde(skip_serializing_if = "is_zero")]
    pub skipped: u32,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(value: &u32) -> bool {
    *value == 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Sent,
    Failed,
    Removed,
    Skipped,
}

#[derive(Debug, Clone)]
pub struct Relay {
    store: Arc<dyn Store>,
    pusher: Arc<dyn Pusher>,
    timeout: Duration,
}

impl Relay {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    #[must_use]
    pub fn new(store: Arc<dyn Store>, pusher: Arc<dyn Pusher>, timeout: Duration) -> Self {
        Self {
            store,
            pusher,
            timeout,
        }
    }

    /// Pushes `notification` to every enabled subscription of its
    /// recipient. Subscriptions that already received it are skipped
    /// and expired ones are removed.
    ///
    /// Only failing to read the subscriptions fails the round. Every
    /// other problem is logged and counted.
    #[tracing::instrument(skip_all, name = "relay.deliver", fields(
        notification.id = ?notification.id,
        recipient.id = %notification.recipient_id,
        kind = %notification.kind,
    ))]
    pub async fn deliver(&self, notification: &RelayNotification) -> Result<Report, RelayError> {
        let subscriptions = self
            .store
            .enabled_push_subscriptions(notification.recipient_id)
            .await
            .change_context(RelayError)
            .attach_printable("could not load push subscriptions")?;

        if subscriptions.is_empty() {
            debug!("recipient has no push subscriptions");
            return Ok(Report::default());
        }

        let delivered = match notification.id {
            Some(id) => self
                .store
                .delivered_subscriptions(id)
                .await
                .change_context(RelayError)
                .attach_printable("could not load delivery markers")?
                .into_iter()
                .collect(),
            None => HashSet::new(),
        };

        let message = template::message(notification);
        let outcomes = join_all(subscriptions.iter().map(|subscription| {
            self.deliver_one(notification.id, subscription, &message, &delivered)
        }))
        .await;

        let mut report = Report {
            total: u32::try_from(subscriptions.len()).unwrap_or(u32::MAX),
            ..Report::default()
        };
        for outcome in outcomes {
            match outcome {
                Outcome::Sent => report.sent += 1,
                Outcome::Failed => report.failed += 1,
                Outcome::Skipped => report.skipped += 1,
                Outcome::Removed => {}
            }
        }

        debug!(?report, "relay round finished");
        Ok(report)
    }

    async fn deliver_one(
        &self,
        notification_id: Option<Id<NotificationMarker>>,
        subscription: &PushSubscription,
        message: &Message,
        delivered: &HashSet<Id<PushSubscriptionMarker>>,
    ) -> Outcome {
        if delivered.contains(&subscription.id) {
            return Outcome::Skipped;
        }

        let result = tokio::time::timeout(self.timeout, self.pusher.push(subscription, message)).await;
        match result {
            Ok(Ok(())) => {
                if let Some(id) = notification_id {
                    if let Err(error) = self.store.record_delivery(id, subscription.id).await {
                        warn!(subscription.id = %subscription.id, ?error, "could not record delivery");
                    }
                }
                Outcome::Sent
            }
            Ok(Err(report)) if matches!(report.current_context(), PushError::Gone) => {
                debug!(subscription.id = %subscription.id, "removing expired push subscription");
                match self
                    .store
                    .delete_push_subscription(subscription.id, subscription.endpoint.as_str())
                    .await
                {
                    Ok(true) => Outcome::Removed,
                    // re-subscribed meanwhile, the new endpoint still needs this push
                    Ok(false) => {
                        debug!(subscription.id = %subscription.id, "push subscription moved to a new endpoint");
                        Outcome::Failed
                    }
                    Err(error) => {
                        warn!(subscription.id = %subscription.id, ?error, "could not remove expired push subscription");
                        Outcome::Removed
                    }
                }
            }
            Ok(Err(error)) => {
                warn!(subscription.id = %subscription.id, ?error, "push delivery failed");
                Outcome::Failed
            }
            Err(..) => {
                warn!(subscription.id = %subscription.id, timeout = ?self.timeout, "push delivery timed out");
                Outcome::Failed
            }
        }
    }
}

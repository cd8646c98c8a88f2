use serde::Deserialize;
use std::num::{NonZeroU32, NonZeroU64};
use std::time::Duration;
use validator::{Validate, ValidationErrors};

use super::non_zero;
use crate::util::validator::{field_error, into_result};
use crate::util::Sensitive;

#[derive(Debug, Deserialize)]
pub struct Relay {
    /// Bearer secret guarding `POST /v1/relay/notifications`. The
    /// route is not mounted without it.
    ///
    /// **Environment variables**:
    /// - `WHISPERLINE_RELAY_WEBHOOK_SECRET`
    pub webhook_secret: Option<Sensitive<String>>,
    /// **Environment variables**:
    /// - `WHISPERLINE_RELAY_OUTBOX_ENABLED`
    #[serde(default = "Relay::default_outbox_enabled")]
    pub outbox_enabled: bool,
    /// **Environment variables**:
    /// - `WHISPERLINE_RELAY_OUTBOX_INTERVAL_MS`
    #[serde(default = "Relay::default_outbox_interval_ms")]
    pub outbox_interval_ms: NonZeroU64,
    /// **Environment variables**:
    /// - `WHISPERLINE_RELAY_OUTBOX_BATCH_SIZE`
    #[serde(default = "Relay::default_outbox_batch_size")]
    pub outbox_batch_size: NonZeroU32,
    /// Deliveries of a notification are given up after this many
    /// failed rounds.
    ///
    /// **Environment variables**:
    /// - `WHISPERLINE_RELAY_OUTBOX_MAX_ATTEMPTS`
    #[serde(default = "Relay::default_outbox_max_attempts")]
    pub outbox_max_attempts: NonZeroU32,
}

impl Relay {
    const MIN_SECRET_LEN: usize = 12;

    #[must_use]
    pub fn outbox_interval(&self) -> Duration {
        Duration::from_millis(self.outbox_interval_ms.get())
    }

    const fn default_outbox_enabled() -> bool {
        true
    }

    const fn default_outbox_interval_ms() -> NonZeroU64 {
        non_zero!(NonZeroU64, 1000)
    }

    const fn default_outbox_batch_size() -> NonZeroU32 {
        non_zero!(NonZeroU32, 50)
    }

    const fn default_outbox_max_attempts() -> NonZeroU32 {
        non_zero!(NonZeroU32, 5)
    }
}

impl Default for Relay {
    fn default() -> Self {
        Self {
            webhook_secret: None,
            outbox_enabled: Self::default_outbox_enabled(),
            outbox_interval_ms: Self::default_outbox_interval_ms(),
            outbox_batch_size: Self::default_outbox_batch_size(),
            outbox_max_attempts: Self::default_outbox_max_attempts(),
        }
    }
}

impl Validate for Relay {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(secret) = self.webhook_secret.as_ref() {
            if secret.as_str().chars().count() < Self::MIN_SECRET_LEN {
                errors.add(
                    "webhook_secret",
                    field_error("length", "Webhook secret is too short"),
                );
            }
        }
        into_result(errors)
    }
}

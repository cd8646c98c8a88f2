use serde::Deserialize;
use std::num::NonZeroU64;
use std::time::Duration;
use validator::{Validate, ValidationErrors};

use super::non_zero;
use crate::util::validator::{field_error, into_result};
use crate::util::Sensitive;

/// Push gateway settings. Without them, notifications are only
/// logged instead of pushed to devices.
#[derive(Debug, Deserialize)]
pub struct Push {
    /// **Environment variables**:
    /// - `WHISPERLINE_PUSH_GATEWAY_URL`
    pub gateway_url: String,
    /// **Environment variables**:
    /// - `WHISPERLINE_PUSH_API_KEY`
    pub api_key: Sensitive<String>,
    /// How long the provider keeps an undelivered message.
    ///
    /// **Environment variables**:
    /// - `WHISPERLINE_PUSH_TTL_SECS`
    #[serde(default = "Push::default_ttl_secs")]
    pub ttl_secs: NonZeroU64,
    /// Time limit of a single push request.
    ///
    /// **Environment variables**:
    /// - `WHISPERLINE_PUSH_TIMEOUT_SECS`
    #[serde(default = "Push::default_timeout_secs")]
    pub timeout_secs: NonZeroU64,
}

impl Push {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.get())
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.get())
    }

    const fn default_ttl_secs() -> NonZeroU64 {
        non_zero!(NonZeroU64, 60 * 60 * 24)
    }

    const fn default_timeout_secs() -> NonZeroU64 {
        non_zero!(NonZeroU64, 5)
    }
}

impl Validate for Push {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let valid_url = url::Url::parse(&self.gateway_url)
            .map(|url| matches!(url.scheme(), "http" | "https"))
            .unwrap_or_default();

        if !valid_url {
            errors.add("gateway_url", field_error("url", "Invalid push gateway URL"));
        }
        if self.api_key.as_str().is_empty() {
            errors.add("api_key", field_error("length", "Push gateway API key is empty"));
        }
        into_result(errors)
    }
}

use serde::Deserialize;
use std::num::{NonZeroU32, NonZeroU64, NonZeroUsize};
use std::time::Duration;
use validator::{Validate, ValidationErrors};

use super::non_zero;
use crate::util::validator::{field_error, into_result};

#[derive(Debug, Clone, Deserialize)]
pub struct Notifications {
    /// Notifications older than this are physically deleted.
    ///
    /// **Environment variables**:
    /// - `WHISPERLINE_NOTIFICATIONS_RETENTION_DAYS`
    #[serde(default = "Notifications::default_retention_days")]
    pub retention_days: NonZeroU32,
    /// Post scores that notify the author once reached.
    ///
    /// **Environment variables**:
    /// - `WHISPERLINE_NOTIFICATIONS_MILESTONES`
    #[serde(default = "Notifications::default_milestones")]
    pub milestones: Vec<u32>,
    /// Maximum characters of content copied into a notification.
    ///
    /// **Environment variables**:
    /// - `WHISPERLINE_NOTIFICATIONS_PREVIEW_LEN`
    #[serde(default = "Notifications::default_preview_len")]
    pub preview_len: NonZeroUsize,
    /// **Environment variables**:
    /// - `WHISPERLINE_NOTIFICATIONS_CLEANUP_INTERVAL_SECS`
    #[serde(default = "Notifications::default_cleanup_interval_secs")]
    pub cleanup_interval_secs: NonZeroU64,
    /// Rows removed per cleanup statement.
    ///
    /// **Environment variables**:
    /// - `WHISPERLINE_NOTIFICATIONS_CLEANUP_BATCH_SIZE`
    #[serde(default = "Notifications::default_cleanup_batch_size")]
    pub cleanup_batch_size: NonZeroU32,
}

impl Notifications {
    /// Limit enforced by the `notifications.content_preview` column.
    pub const MAX_PREVIEW_LEN: usize = 500;

    #[must_use]
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days.get()))
    }

    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.get())
    }

    const fn default_retention_days() -> NonZeroU32 {
        non_zero!(NonZeroU32, 30)
    }

    fn default_milestones() -> Vec<u32> {
        vec![5, 10, 25, 50, 100]
    }

    const fn default_preview_len() -> NonZeroUsize {
        non_zero!(NonZeroUsize, 100)
    }

    const fn default_cleanup_interval_secs() -> NonZeroU64 {
        non_zero!(NonZeroU64, 60 * 60)
    }

    const fn default_cleanup_batch_size() -> NonZeroU32 {
        non_zero!(NonZeroU32, 500)
    }
}

impl Default for Notifications {
    fn default() -> Self {
        Self {
            retention_days: Self::default_retention_days(),
            milestones: Self::default_milestones(),
            preview_len: Self::default_preview_len(),
            cleanup_interval_secs: Self::default_cleanup_interval_secs(),
            cleanup_batch_size: Self::default_cleanup_batch_size(),
        }
    }
}

impl Validate for Notifications {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let ascending = self.milestones.windows(2).all(|pair| pair[0] < pair[1]);
        if !ascending || self.milestones.contains(&0) {
            errors.add(
                "milestones",
                field_error("milestones", "Milestones must be positive and strictly ascending"),
            );
        }
        if self.preview_len.get() > Self::MAX_PREVIEW_LEN {
            errors.add(
                "preview_len",
                field_error("range", "Preview length must not exceed 500 characters"),
            );
        }
        into_result(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Notifications::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_unordered_milestones() {
        let mut config = Notifications::default();
        config.milestones = vec![10, 5];
        assert!(config.validate().is_err());

        config.milestones = vec![0, 5];
        assert!(config.validate().is_err());

        config.milestones = vec![5, 5];
        assert!(config.validate().is_err());

        config.milestones = Vec::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_oversized_previews() {
        let mut config = Notifications::default();
        config.preview_len = NonZeroUsize::new(501).unwrap();
        assert!(config.validate().is_err());

        config.preview_len = NonZeroUsize::new(500).unwrap();
        assert!(config.validate().is_ok());
    }
}

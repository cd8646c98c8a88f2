use error_stack::{Result, ResultExt};
use thiserror::Error;
use tracing::info;

use whisperline::App;

#[derive(Debug, Error)]
#[error("Failed to clean up expired notifications")]
pub struct CleanupError;

pub fn run() -> Result<(), CleanupError> {
    let (config, runtime) = super::setup(Some(1)).change_context(CleanupError)?;
    runtime.block_on(async move {
        let retention_days = config.notifications.retention_days;
        let app = App::new(config).await.change_context(CleanupError)?;
        let deleted = app
            .cleanup_expired_notifications()
            .await
            .change_context(CleanupError)?;

        info!(deleted, %retention_days, "removed expired notifications");
        println!("deleted {deleted} notifications older than {retention_days} days");
        Ok(())
    })
}

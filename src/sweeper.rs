//! Periodically removes notifications past their retention period.
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config;
use crate::store::{self, Store};
use crate::util::signal::Shutdown;

#[derive(Debug, Clone)]
pub struct Sweeper {
    store: Arc<dyn Store>,
    retention: chrono::Duration,
    interval: Duration,
    batch_size: u32,
}

impl Sweeper {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, cfg: &config::Notifications) -> Self {
        Self {
            store,
            retention: cfg.retention(),
            interval: cfg.cleanup_interval(),
            batch_size: cfg.cleanup_batch_size.get(),
        }
    }

    /// Sweeps right away and then once every cleanup interval until
    /// `shutdown` fires.
    pub async fn run(self, mut shutdown: Shutdown) {
        info!(interval = ?self.interval, "notification sweeper started");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = shutdown.wait() => break,
                _ = interval.tick() => {}
            }

            match store::cleanup_expired(self.store.as_ref(), self.retention, self.batch_size).await {
                Ok(0) => {}
                Ok(deleted) => info!(deleted, "removed expired notifications"),
                Err(error) => warn!(?error, "could not remove expired notifications"),
            }
        }

        info!("notification sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_sweeps_on_start_and_stops_on_shutdown() {
        let store = Arc::new(MemoryStore::default());
        let alice = store.get_or_create_user("alice-device").await.unwrap();
        let bob = store.get_or_create_user("bob-device-1").await.unwrap();
        let post = store.create_post(&alice, "hello").await.unwrap();
        store.create_comment(&bob, post.id, None, "nice").await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;

        let sweeper = Sweeper {
            store: store.clone(),
            retention: chrono::Duration::zero(),
            interval: Duration::from_secs(3600),
            batch_size: 10,
        };

        let (trigger, shutdown) = Shutdown::channel();
        let handle = tokio::spawn(sweeper.run(shutdown));

        let mut remaining = 1;
        for _ in 0..100 {
            remaining = store.unread_count(alice.id).await.unwrap();
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(remaining, 0);

        trigger.trigger();
        handle.await.unwrap();
    }
}

use error_stack::{Result, ResultExt};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::push::{GatewayPusher, LogPusher, Pusher};
use crate::relay::Relay;
use crate::store::{self, MemoryStore, PgStore, Rules, Store, StoreError};
use crate::{config, database};

#[derive(Debug, Clone)]
pub struct App {
    pub config: Arc<config::Server>,
    pub store: Arc<dyn Store>,
    pub relay: Relay,
}

#[derive(Debug, Error)]
#[error("Failed to initialize App struct")]
pub struct AppError;

impl App {
    #[tracing::instrument(skip_all)]
    pub async fn new(cfg: config::Server) -> Result<Self, AppError> {
        let rules = Rules::from(&cfg.notifications);
        let store: Arc<dyn Store> = if let Some(db) = cfg.db.as_ref() {
            let pool = database::Pool::new(db).await.change_context(AppError)?;
            if db.run_migrations {
                pool.run_migrations().await.change_context(AppError)?;
            }
            Arc::new(PgStore::new(pool, rules))
        } else {
            warn!("no database configured, notifications are kept in memory only");
            Arc::new(MemoryStore::new(rules))
        };

        let pusher: Arc<dyn Pusher> = if let Some(push) = cfg.push.as_ref() {
            Arc::new(GatewayPusher::new(push).change_context(AppError)?)
        } else {
            info!("no push gateway configured, push messages are only logged");
            Arc::new(LogPusher)
        };

        Ok(Self::with_parts(cfg, store, pusher))
    }

    /// Builds an app on top of already initialized parts.
    #[must_use]
    pub fn with_parts(cfg: config::Server, store: Arc<dyn Store>, pusher: Arc<dyn Pusher>) -> Self {
        let timeout = cfg
            .push
            .as_ref()
            .map_or(Relay::DEFAULT_TIMEOUT, config::Push::timeout);

        Self {
            config: Arc::new(cfg),
            relay: Relay::new(store.clone(), pusher, timeout),
            store,
        }
    }

    /// Hard deletes every notification past the retention period.
    pub async fn cleanup_expired_notifications(&self) -> Result<u64, StoreError> {
        let cfg = &self.config.notifications;
        store::cleanup_expired(
            self.store.as_ref(),
            cfg.retention(),
            cfg.cleanup_batch_size.get(),
        )
        .await
    }
}

#[cfg(test)]
impl App {
    /// In-memory app with default settings and the given relay secret.
    pub(crate) fn for_tests(webhook_secret: Option<&str>) -> Self {
        use crate::config::{Auth, Logging, Notifications, Relay as RelayConfig, Server};

        let cfg = Server {
            ip: std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
            port: 8080,
            workers: 1,
            db: None,
            auth: Auth {
                jwt_secret: "a-long-enough-test-secret".into(),
                token_ttl_days: std::num::NonZeroU32::new(30).unwrap(),
            },
            push: None,
            notifications: Notifications::default(),
            relay: RelayConfig {
                webhook_secret: webhook_secret.map(Into::into),
                ..RelayConfig::default()
            },
            logging: Logging::default(),
        };

        let store = Arc::new(MemoryStore::new(Rules::from(&cfg.notifications)));
        Self::with_parts(cfg, store, Arc::new(LogPusher))
    }
}

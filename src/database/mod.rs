use error_stack::{Report, ResultExt};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use std::{str::FromStr, time::Duration};
use tracing::info;

use crate::config;

mod error;
pub use error::*;

pub type Transaction<'a> = sqlx::Transaction<'a, sqlx::Postgres>;
pub type PoolConnection = sqlx::pool::PoolConnection<sqlx::Postgres>;

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[derive(Clone)]
pub struct Pool {
    pool: sqlx::PgPool,
}

impl Pool {
    #[tracing::instrument(skip_all, name = "db.pool.new")]
    pub async fn new(cfg: &config::Database) -> Result<Self> {
        let mut pool_opts = PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(cfg.timeout_secs.get()))
            .max_connections(cfg.pool_size.get());

        if let Some(min_idle) = cfg.min_idle {
            pool_opts = pool_opts.min_connections(min_idle.get());
        }

        let mut connect_opts =
            PgConnectOptions::from_str(cfg.url.as_str()).change_context(Error::InvalidUrl)?;

        if cfg.enforce_tls {
            connect_opts = connect_opts.ssl_mode(PgSslMode::Prefer);
        }

        let pool = Self {
            pool: pool_opts.connect_lazy_with(connect_opts),
        };

        match pool.wait_until_healthy().await {
            Ok(..) => {}
            Err(err) if err.is_unhealthy() => {}
            Err(err) => return Err(err),
        }

        Ok(pool)
    }

    /// Wraps an already connected pool. Used by tests that receive
    /// their pool from `sqlx::test`.
    #[must_use]
    pub fn from_pool(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.pool.fmt(f)
    }
}

impl Pool {
    #[inline]
    #[must_use]
    pub fn connections(&self) -> u32 {
        self.pool.size()
    }

    #[inline]
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.connections() > 0
    }

    #[tracing::instrument(name = "db.transaction", skip(self))]
    pub async fn begin(&self) -> Result<Transaction<'static>> {
        if let Some(inner) = self.pool.try_begin().await.into_db_error()? {
            Ok(inner)
        } else if !self.is_healthy() {
            Err(Error::UnhealthyPool.into())
        } else {
            self.pool.begin().await.into_db_error()
        }
    }

    #[tracing::instrument(name = "db.connect", skip(self))]
    pub async fn get(&self) -> Result<PoolConnection> {
        if let Some(inner) = self.pool.try_acquire() {
            Ok(inner)
        } else if !self.is_healthy() {
            Err(Error::UnhealthyPool.into())
        } else {
            self.pool.acquire().await.into_db_error()
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn wait_until_healthy(&self) -> Result<()> {
        match self.pool.acquire().await {
            Ok(..) => Ok(()),
            Err(e) if !self.is_healthy() => Err(e).change_context(Error::UnhealthyPool),
            Err(err) => Err(Report::new(Error::Internal(err))),
        }
    }

    #[tracing::instrument(skip_all, name = "db.migrations.run_pending")]
    pub async fn run_migrations(&self) -> Result<()> {
        let now = std::time::Instant::now();
        info!("Performing database migrations... (this may take a while)");

        MIGRATOR
            .run(&self.pool)
            .await
            .change_context(Error::Migration)?;

        let elapsed = now.elapsed();
        info!("Successfully performed database migrations! took {elapsed:.2?}");
        Ok(())
    }
}

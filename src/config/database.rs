use serde::Deserialize;
use std::num::{NonZeroU32, NonZeroU64};
use validator::{Validate, ValidationErrors};

use super::non_zero;
use crate::util::validator::{field_error, into_result};
use crate::util::Sensitive;

/// Configuration for connecting to the Postgres database.
///
/// whisperline falls back to an in-memory store when this section
/// is missing entirely.
#[derive(Debug, Deserialize)]
pub struct Database {
    /// Connection URL connecting to the Postgres database.
    ///
    /// **Environment variables**:
    /// - `WHISPERLINE_DB_URL` or `DATABASE_URL`
    pub url: Sensitive<String>,
    /// Maximum amount of pool size that database can handle
    ///
    /// **Environment variables**:
    /// - `WHISPERLINE_DB_POOL_SIZE`
    #[serde(default = "Database::default_pool_size")]
    pub pool_size: NonZeroU32,
    /// Minimum idle database connections just to avoid wasting
    /// hardware resources from the database server.
    ///
    /// **Environment variables**:
    /// - `WHISPERLINE_DB_MIN_IDLE`
    pub min_idle: Option<NonZeroU32>,
    /// How long this server can wait until a database connection
    /// is successfully established.
    ///
    /// **Environment variables**:
    /// - `WHISPERLINE_DB_TIMEOUT_SECS`
    #[serde(default = "Database::default_timeout_secs")]
    pub timeout_secs: NonZeroU64,
    /// Forces all database connections are encrypted with TLS
    /// (if possible).
    ///
    /// **Environment variables**:
    /// - `WHISPERLINE_DB_ENFORCE_TLS`
    #[serde(default = "Database::default_enforce_tls")]
    pub enforce_tls: bool,
    /// Applies pending migrations when the server starts.
    ///
    /// **Environment variables**:
    /// - `WHISPERLINE_DB_RUN_MIGRATIONS`
    #[serde(default = "Database::default_run_migrations")]
    pub run_migrations: bool,
}

impl Database {
    const fn default_pool_size() -> NonZeroU32 {
        non_zero!(NonZeroU32, 5)
    }

    const fn default_timeout_secs() -> NonZeroU64 {
        non_zero!(NonZeroU64, 5)
    }

    const fn default_enforce_tls() -> bool {
        true
    }

    const fn default_run_migrations() -> bool {
        true
    }
}

impl Validate for Database {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let valid_url = url::Url::parse(self.url.as_str())
            .map(|url| matches!(url.scheme(), "postgres" | "postgresql"))
            .unwrap_or_default();

        if !valid_url {
            errors.add("url", field_error("url", "Invalid Postgres connection URL"));
        }

        if let Some(min_idle) = self.min_idle {
            if min_idle > self.pool_size {
                errors.add(
                    "min_idle",
                    field_error("range", "Minimum idle connections exceed the pool size"),
                );
            }
        }

        into_result(errors)
    }
}

use error_stack::{Report, Result, ResultExt};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use validator::{Validate, ValidationErrors};

use super::ParseError;
use crate::util::figment::FigmentErrorAttachable;
use crate::util::validator::{into_result, merge_nested, IntoValidatorReport};

#[derive(Debug, Deserialize)]
pub struct Server {
    /// **Environment variables**:
    /// - `WHISPERLINE_IP`
    #[serde(default = "Server::default_ip")]
    pub ip: IpAddr,
    /// **Environment variables**:
    /// - `WHISPERLINE_PORT`
    #[serde(default = "Server::default_port")]
    pub port: u16,
    /// **Environment variables**:
    /// - `WHISPERLINE_WORKERS`
    #[serde(default = "Server::default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub db: Option<super::Database>,
    pub auth: super::Auth,
    #[serde(default)]
    pub push: Option<super::Push>,
    #[serde(default)]
    pub notifications: super::Notifications,
    #[serde(default)]
    pub relay: super::Relay,
    #[serde(default)]
    pub logging: super::Logging,
}

impl Server {
    pub fn load() -> Result<Self, ParseError> {
        dotenvy::dotenv().ok();

        let config = Self::figment()
            .extract::<Self>()
            .map_err(|e| Report::new(ParseError).attach_figment_error(e))?;

        config
            .validate()
            .into_validator_report()
            .change_context(ParseError)?;

        Ok(config)
    }
}

impl Server {
    const DEFAULT_CONFIG_FILE: &'static str = "whisperline.toml";
    const CONFIG_FILE_ENV: &'static str = "WHISPERLINE_CONFIG";

    fn default_ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    }

    const fn default_port() -> u16 {
        8080
    }

    fn default_workers() -> usize {
        std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1)
    }

    /// Creates a default [`Figment`] object to load server
    /// configuration. This function is there for testing.
    ///
    /// [`Figment`]: figment::Figment
    pub(crate) fn figment() -> figment::Figment {
        use figment::{
            providers::{Env, Format, Toml},
            Figment,
        };

        let file = Env::var(Self::CONFIG_FILE_ENV)
            .unwrap_or_else(|| Self::DEFAULT_CONFIG_FILE.to_string());

        Figment::new()
            .merge(Toml::file(file))
            // One big con about figment (env provider to be specific) especially
            // these fields with underscore in it.
            .merge(
                Env::prefixed("WHISPERLINE_")
                    .ignore(&["CONFIG"])
                    .map(|v| match v.as_str().to_ascii_lowercase().as_str() {
                        "db_pool_size" => "db.pool_size".into(),
                        "db_min_idle" => "db.min_idle".into(),
                        "db_timeout_secs" => "db.timeout_secs".into(),
                        "db_enforce_tls" => "db.enforce_tls".into(),
                        "db_run_migrations" => "db.run_migrations".into(),

                        "auth_jwt_secret" => "auth.jwt_secret".into(),
                        "auth_token_ttl_days" => "auth.token_ttl_days".into(),

                        "push_gateway_url" => "push.gateway_url".into(),
                        "push_api_key" => "push.api_key".into(),
                        "push_ttl_secs" => "push.ttl_secs".into(),
                        "push_timeout_secs" => "push.timeout_secs".into(),

                        "notifications_retention_days" => "notifications.retention_days".into(),
                        "notifications_preview_len" => "notifications.preview_len".into(),
                        "notifications_cleanup_interval_secs" => {
                            "notifications.cleanup_interval_secs".into()
                        }
                        "notifications_cleanup_batch_size" => {
                            "notifications.cleanup_batch_size".into()
                        }

                        "relay_webhook_secret" => "relay.webhook_secret".into(),
                        "relay_outbox_enabled" => "relay.outbox_enabled".into(),
                        "relay_outbox_interval_ms" => "relay.outbox_interval_ms".into(),
                        "relay_outbox_batch_size" => "relay.outbox_batch_size".into(),
                        "relay_outbox_max_attempts" => "relay.outbox_max_attempts".into(),

                        other => other.replace('_', ".").into(),
                    }),
            )
            // Environment variable aliases
            .merge(
                Env::raw()
                    .only(&["DATABASE_URL"])
                    .map(|_| "db.url".into()),
            )
    }
}

impl Validate for Server {
    fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(db) = self.db.as_ref() {
            merge_nested(&mut errors, "db", db.validate());
        }
        merge_nested(&mut errors, "auth", self.auth.validate());
        if let Some(push) = self.push.as_ref() {
            merge_nested(&mut errors, "push", push.validate());
        }
        merge_nested(&mut errors, "notifications", self.notifications.validate());
        merge_nested(&mut errors, "relay", self.relay.validate());
        into_result(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoggingStyle;
    use figment::Jail;
    use std::num::{NonZeroU32, NonZeroU64};

    #[test]
    fn env_aliases() {
        Jail::expect_with(|jail| {
            jail.set_env("DATABASE_URL", "postgres://localhost/whisperline");
            jail.set_env("WHISPERLINE_DB_POOL_SIZE", "100");
            jail.set_env("WHISPERLINE_DB_MIN_IDLE", "10");
            jail.set_env("WHISPERLINE_DB_ENFORCE_TLS", "false");
            jail.set_env("WHISPERLINE_DB_TIMEOUT_SECS", "3030");

            jail.set_env("WHISPERLINE_AUTH_JWT_SECRET", "a-long-enough-secret");
            jail.set_env("WHISPERLINE_NOTIFICATIONS_RETENTION_DAYS", "7");
            jail.set_env("WHISPERLINE_NOTIFICATIONS_MILESTONES", "[3, 30]");
            jail.set_env("WHISPERLINE_RELAY_OUTBOX_ENABLED", "false");
            jail.set_env("WHISPERLINE_LOGGING_STYLE", "json");
            jail.set_env("WHISPERLINE_PORT", "9000");

            let config: Server = Server::figment().extract()?;
            let db = config.db.as_ref().unwrap();
            assert_eq!(db.url.as_str(), "postgres://localhost/whisperline");
            assert_eq!(db.pool_size, NonZeroU32::new(100).unwrap());
            assert_eq!(db.min_idle, NonZeroU32::new(10));
            assert!(!db.enforce_tls);
            assert_eq!(db.timeout_secs, NonZeroU64::new(3030).unwrap());

            assert_eq!(config.auth.jwt_secret.as_str(), "a-long-enough-secret");
            assert_eq!(config.notifications.retention_days.get(), 7);
            assert_eq!(config.notifications.milestones, vec![3, 30]);
            assert!(!config.relay.outbox_enabled);
            assert_eq!(config.logging.style, LoggingStyle::Json);
            assert_eq!(config.port, 9000);
            assert!(config.validate().is_ok());

            Ok(())
        });
    }

    #[test]
    fn defaults_without_database() {
        Jail::expect_with(|jail| {
            jail.set_env("WHISPERLINE_AUTH_JWT_SECRET", "a-long-enough-secret");

            let config: Server = Server::figment().extract()?;
            assert!(config.db.is_none());
            assert!(config.push.is_none());
            assert!(config.relay.webhook_secret.is_none());
            assert_eq!(config.notifications.milestones, vec![5, 10, 25, 50, 100]);
            assert_eq!(config.notifications.preview_len.get(), 100);
            assert_eq!(config.notifications.cleanup_batch_size.get(), 500);
            assert_eq!(config.relay.outbox_max_attempts.get(), 5);
            assert_eq!(config.auth.token_ttl_days.get(), 30);
            Ok(())
        });
    }

    #[test]
    fn reads_config_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "custom.toml",
                r#"
                port = 7070

                [auth]
                jwt_secret = "from-the-config-file"

                [push]
                gateway_url = "https://push.example.com/send"
                api_key = "key"
                timeout_secs = 2
                "#,
            )?;
            jail.set_env("WHISPERLINE_CONFIG", "custom.toml");

            let config: Server = Server::figment().extract()?;
            assert_eq!(config.port, 7070);
            assert_eq!(config.auth.jwt_secret.as_str(), "from-the-config-file");

            let push = config.push.as_ref().unwrap();
            assert_eq!(push.timeout_secs.get(), 2);
            assert_eq!(push.ttl_secs.get(), 86400);
            assert!(config.validate().is_ok());
            Ok(())
        });
    }

    #[test]
    fn rejects_weak_settings() {
        Jail::expect_with(|jail| {
            jail.set_env("WHISPERLINE_AUTH_JWT_SECRET", "short");
            jail.set_env("DATABASE_URL", "mysql://localhost/db");

            let config: Server = Server::figment().extract()?;
            let errors = config.validate().unwrap_err();
            assert!(errors.errors().contains_key("auth"));
            assert!(errors.errors().contains_key("db"));
            Ok(())
        });
    }
}

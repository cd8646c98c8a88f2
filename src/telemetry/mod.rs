use error_stack::{Result, ResultExt};
use std::io::IsTerminal;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing::Subscriber;
use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{self, LoggingStyle};

mod formatter;

use self::formatter::Formatter;

#[derive(Debug, Error)]
#[error("Failed to initialize tracing")]
pub struct TracingInitError;

pub fn init(config: &config::Logging) -> Result<(), TracingInitError> {
    let ansi = std::io::stderr().is_terminal();
    let targets = config
        .targets
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_default();

    let registry = tracing_subscriber::Registry::default()
        .with(console_layer(ansi, config.style, &targets))
        .with(ErrorLayer::default());

    tracing::subscriber::set_global_default(registry)
        .change_context(TracingInitError)
        .attach_printable("already initialized tracing")?;

    if config.targets.is_some() && std::env::var("RUST_LOG").is_ok() {
        tracing::warn!("Both `RUST_LOG` and `logging.targets` are set, `logging.targets` wins");
    }

    Ok(())
}

fn console_layer<S>(ansi: bool, style: LoggingStyle, targets: &str) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    if let Some(formatter) = Formatter::from_style(style, ansi) {
        tracing_subscriber::fmt::layer()
            .with_ansi(ansi)
            .event_format(formatter)
            .with_writer(std::io::stderr)
            .with_filter(make_env_filter(targets))
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .with_filter(make_env_filter(targets))
            .boxed()
    }
}

fn make_env_filter(targets: &str) -> EnvFilter {
    let default_level = if cfg!(debug_assertions) {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .parse_lossy(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_keeps_explicit_directives() {
        let filter = make_env_filter("whisperline=trace,sqlx=warn");
        let rendered = filter.to_string();
        assert!(rendered.contains("whisperline=trace"));
        assert!(rendered.contains("sqlx=warn"));
    }

    #[test]
    fn test_json_style_has_no_formatter() {
        assert!(Formatter::from_style(LoggingStyle::Json, false).is_none());
        assert!(Formatter::from_style(LoggingStyle::Pretty, false).is_some());
    }
}

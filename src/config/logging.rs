use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingStyle {
    #[default]
    Compact,
    Full,
    Pretty,
    #[serde(alias = "JSON")]
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Logging {
    /// **Environment variables**:
    /// - `WHISPERLINE_LOGGING_STYLE`
    #[serde(default)]
    pub style: LoggingStyle,
    /// Filter directives in `RUST_LOG` syntax. `RUST_LOG` is used
    /// when this is not set.
    ///
    /// **Environment variables**:
    /// - `WHISPERLINE_LOGGING_TARGETS`
    pub targets: Option<String>,
}

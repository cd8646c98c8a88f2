use error_stack::{Context, Report};
use tracing_error::SpanTrace;

use crate::types;

mod impls;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
#[error("Failed to handle request")]
pub struct RequestError;

/// Error of an HTTP handler: what the client is told plus the full
/// report and span trace for the logs.
pub struct Error {
    error_type: types::Error,
    report: Report<RequestError>,
    trace: SpanTrace,
}

impl Error {
    #[must_use]
    pub fn from_context(error_type: types::Error, context: impl Context) -> Self {
        Self::from_report(error_type, Report::new(context))
    }

    #[must_use]
    pub fn from_report(error_type: types::Error, report: Report<impl Context>) -> Self {
        Self {
            error_type,
            report: report.change_context(RequestError),
            trace: SpanTrace::capture(),
        }
    }

    #[must_use]
    pub fn unauthorized(reason: &'static str) -> Self {
        #[derive(Debug, thiserror::Error)]
        #[error("Unauthorized: {0}")]
        struct Unauthorized(&'static str);

        Self::from_context(types::Error::Unauthorized, Unauthorized(reason))
    }

    #[must_use]
    pub fn not_found() -> Self {
        #[derive(Debug, thiserror::Error)]
        #[error("Resource not found")]
        struct NotFound;

        Self::from_context(types::Error::NotFound, NotFound)
    }
}

impl Error {
    #[must_use]
    pub fn as_type(&self) -> &types::Error {
        &self.error_type
    }

    #[must_use]
    pub fn downcast_ref<F: Context>(&self) -> Option<&F> {
        self.report.downcast_ref::<F>()
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Error")
            .field("type", &self.error_type)
            .field("report", &self.report)
            .field("trace", &self.trace)
            .finish()
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: ", &self.error_type)?;
        writeln!(f, "{:?}", self.report)?;
        std::fmt::Display::fmt(&self.trace, f)
    }
}

use actix_web::{body::BoxBody, http::StatusCode, HttpResponse};
use error_stack::Report;
use validator::ValidationErrors;

use super::Error;
use crate::relay::{EventError, RelayError};
use crate::store::StoreError;
use crate::types::cursor::ParseCursorError;
use crate::{database, types::Error as ErrorType};

impl actix_web::ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self.error_type {
            ErrorType::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorType::NotFound => StatusCode::NOT_FOUND,
            ErrorType::ReadonlyMode => StatusCode::SERVICE_UNAVAILABLE,
            ErrorType::InvalidFormBody { .. } | ErrorType::InvalidRequest { .. } => {
                StatusCode::BAD_REQUEST
            }
            ErrorType::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_response(&self) -> HttpResponse<BoxBody> {
        if matches!(self.error_type, ErrorType::Internal | ErrorType::ReadonlyMode) {
            tracing::error!(error = %self, "request failed");
        }
        HttpResponse::build(self.status_code()).json(&self.error_type)
    }
}

impl From<Report<StoreError>> for Error {
    fn from(report: Report<StoreError>) -> Self {
        if let Some(database::Error::Readonly) = report.downcast_ref::<database::Error>() {
            return Error::from_report(ErrorType::ReadonlyMode, report);
        }

        match report.current_context() {
            StoreError::NotFound => Error::from_report(ErrorType::NotFound, report),
            StoreError::Rejected(message) => {
                let message = *message;
                Error::from_report(
                    ErrorType::InvalidRequest {
                        message: message.into(),
                    },
                    report,
                )
            }
            StoreError::Backend => Error::from_report(ErrorType::Internal, report),
        }
    }
}

impl From<Report<RelayError>> for Error {
    fn from(report: Report<RelayError>) -> Self {
        Error::from_report(ErrorType::Internal, report)
    }
}

impl From<EventError> for Error {
    fn from(error: EventError) -> Self {
        let message = error.to_string();
        Error::from_context(
            ErrorType::InvalidRequest {
                message: message.into(),
            },
            error,
        )
    }
}

impl From<ParseCursorError> for Error {
    fn from(error: ParseCursorError) -> Self {
        Error::from_context(
            ErrorType::InvalidRequest {
                message: "Invalid pagination cursor".into(),
            },
            error,
        )
    }
}

impl From<ValidationErrors> for Error {
    fn from(errors: ValidationErrors) -> Self {
        #[derive(Debug, thiserror::Error)]
        #[error("Validation error occurred")]
        struct ValidateError;
        Error::from_context(ErrorType::InvalidFormBody { errors }, ValidateError)
    }
}

use serde::Serialize;
use std::borrow::Cow;
use std::fmt::Display;
use validator::ValidationErrors;

/// Error body returned by every failing whisperline endpoint.
#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Error {
    Internal,
    InvalidFormBody { errors: ValidationErrors },
    InvalidRequest { message: Cow<'static, str> },
    NotFound,
    ReadonlyMode,
    Unauthorized,
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Internal => f.write_str("Failed to perform request"),
            Error::InvalidFormBody { .. } => f.write_str("User performed request with invalid body"),
            Error::InvalidRequest { message } => write!(f, "Invalid request: {message}"),
            Error::NotFound => f.write_str("Requested resource does not exist"),
            Error::ReadonlyMode => f.write_str("Attempt to write read-only database"),
            Error::Unauthorized => f.write_str("Attempt to access user-only route"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_test::Token;

    #[track_caller]
    fn assert_unit_variant(value: Error, variant: &'static str) {
        serde_test::assert_ser_tokens(
            &value,
            &[
                Token::Struct {
                    name: "Error",
                    len: 1,
                },
                Token::Str("type"),
                Token::Str(variant),
                Token::StructEnd,
            ],
        );
    }

    #[test]
    fn test_serde_impl() {
        assert_unit_variant(Error::Internal, "internal");
        assert_unit_variant(Error::NotFound, "not_found");
        assert_unit_variant(Error::ReadonlyMode, "readonly_mode");
        assert_unit_variant(Error::Unauthorized, "unauthorized");
    }

    #[test]
    fn test_invalid_request_json() {
        let value = serde_json::to_value(Error::InvalidRequest {
            message: "bad cursor".into(),
        })
        .unwrap();

        assert_eq!(
            value,
            serde_json::json!({ "type": "invalid_request", "message": "bad cursor" })
        );
    }
}

use error_stack::Report;
use thiserror::Error;
use validator::{ValidationErrors, ValidationErrorsKind};

#[derive(Debug, Error)]
#[error("Invalid given data occurred")]
pub struct Wrapper;

pub trait IntoValidatorReport<T> {
    fn into_validator_report(self) -> error_stack::Result<T, Wrapper>;
}

impl<T> IntoValidatorReport<T> for Result<T, ValidationErrors> {
    fn into_validator_report(self) -> error_stack::Result<T, Wrapper> {
        self.map_err(|errors| {
            fn read_errors(
                errors: &ValidationErrors,
                path: &mut Vec<String>,
                mut report: Report<Wrapper>,
            ) -> Report<Wrapper> {
                let mut fields = errors.errors().iter().collect::<Vec<_>>();
                fields.sort_by_key(|(field, ..)| *field);

                for (field, kind) in fields {
                    path.push((*field).to_string());
                    match kind {
                        ValidationErrorsKind::Struct(inner) => {
                            report = read_errors(inner, path, report);
                        }
                        ValidationErrorsKind::List(list) => {
                            for (index, inner) in list {
                                path.push(index.to_string());
                                report = read_errors(inner, path, report);
                                path.pop();
                            }
                        }
                        ValidationErrorsKind::Field(messages) => {
                            let field_str = path.join(".");
                            for error in messages {
                                let message = error.message.as_ref().unwrap_or(&error.code);
                                report = report.attach_printable(format!("{field_str}: {message}"));
                            }
                        }
                    }
                    path.pop();
                }
                report
            }

            let mut path = Vec::new();
            read_errors(&errors, &mut path, Report::new(Wrapper))
        })
    }
}

/// Builds a single field error with a human readable message.
#[must_use]
pub fn field_error(code: &'static str, message: &'static str) -> validator::ValidationError {
    let mut error = validator::ValidationError::new(code);
    error.message = Some(message.into());
    error
}

/// Nests the errors of a child struct under `field`.
pub fn merge_nested(
    errors: &mut ValidationErrors,
    field: &'static str,
    result: Result<(), ValidationErrors>,
) {
    if let Err(inner) = result {
        errors
            .errors_mut()
            .insert(field, ValidationErrorsKind::Struct(Box::new(inner)));
    }
}

/// Converts an accumulated set of errors into a result.
pub fn into_result(errors: ValidationErrors) -> Result<(), ValidationErrors> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_lists_nested_fields() {
        let mut child = ValidationErrors::new();
        child.add("url", field_error("url", "Invalid Postgres connection URL"));

        let mut parent = ValidationErrors::new();
        merge_nested(&mut parent, "db", Err(child));
        merge_nested(&mut parent, "auth", Ok(()));

        let report = into_result(parent).into_validator_report().unwrap_err();
        let printed = format!("{report:?}");
        assert!(printed.contains("db.url: Invalid Postgres connection URL"));
        assert!(!printed.contains("auth"));
    }

    #[test]
    fn test_into_result() {
        assert!(into_result(ValidationErrors::new()).is_ok());
    }
}

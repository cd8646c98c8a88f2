//! Bodies and queries accepted by the HTTP API and what it answers.
pub mod comments;
pub mod devices;
pub mod notifications;
pub mod posts;
pub mod push;
pub mod votes;

use validator::ValidationErrors;

use crate::util::validator::field_error;

/// Rejects text which is empty after trimming or longer than `max`
/// characters.
pub(crate) fn check_content(errors: &mut ValidationErrors, field: &'static str, content: &str, max: usize) {
    if content.trim().is_empty() {
        errors.add(field, field_error("length", "Content must not be empty"));
    } else if content.chars().count() > max {
        errors.add(field, field_error("length", "Content is too long"));
    }
}

#[cfg(test)]
#[track_caller]
pub(crate) fn must_fail<T: validator::Validate>(value: &T, args: std::fmt::Arguments<'_>) {
    assert!(
        value.validate().is_err(),
        "expected to fail but passed (entry = {args})"
    );
}

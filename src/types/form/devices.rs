use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::schema::User;
use crate::util::validator::{field_error, into_result};
use crate::util::Sensitive;

static DEVICE_ID: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"^[A-Za-z0-9_-]{8,128}$").unwrap()
});

/// Device ids are 8 to 128 characters of `[A-Za-z0-9_-]`.
#[must_use]
pub fn is_valid_device_id(value: &str) -> bool {
    DEVICE_ID.is_match(value)
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Request {
    pub device_id: Sensitive<String>,
}

impl Validate for Request {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if !is_valid_device_id(&self.device_id) {
            errors.add("device_id", field_error("device_id", "Invalid device id"));
        }
        into_result(errors)
    }
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub token: Sensitive<String>,
    pub user: User,
}

#[cfg(test)]
mod tests {
    use super::super::must_fail;
    use super::*;

    #[test]
    fn test_device_ids() {
        static INVALID: &[&str] = &[
            "",
            "short",
            "has spaces in it",
            "emoji-🚇-device",
            "slashes/are/not/allowed",
        ];

        for device_id in INVALID {
            let form = Request {
                device_id: (*device_id).into(),
            };
            must_fail(&form, format_args!("{device_id:?}"));
        }

        let too_long = "a".repeat(129);
        assert!(!is_valid_device_id(&too_long));
        assert!(is_valid_device_id(&"a".repeat(128)));
        assert!(is_valid_device_id("3F2504E0-4F89_11D3"));
    }
}

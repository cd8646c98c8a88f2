use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::util::validator::into_result;

pub const CONTENT_MAX: usize = 500;

#[derive(Debug, Deserialize, Serialize)]
pub struct Request {
    pub content: String,
}

impl Validate for Request {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        super::check_content(&mut errors, "content", &self.content, CONTENT_MAX);
        into_result(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::super::must_fail;
    use super::*;

    #[test]
    fn test_content_length() {
        let too_long = "x".repeat(CONTENT_MAX + 1);
        for content in ["", "   \n\t", too_long.as_str()] {
            let form = Request {
                content: content.to_string(),
            };
            must_fail(&form, format_args!("{content:?}"));
        }

        let form = Request {
            content: "🚇".repeat(CONTENT_MAX),
        };
        assert!(form.validate().is_ok());
    }
}

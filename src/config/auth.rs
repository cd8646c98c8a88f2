use serde::Deserialize;
use std::num::NonZeroU32;
use validator::{Validate, ValidationErrors};

use super::non_zero;
use crate::util::validator::{field_error, into_result};
use crate::util::Sensitive;

#[derive(Debug, Deserialize)]
pub struct Auth {
    /// Secret signing every issued device token (HS512).
    ///
    /// **Environment variables**:
    /// - `WHISPERLINE_AUTH_JWT_SECRET`
    pub jwt_secret: Sensitive<String>,
    /// How many days an issued token stays valid.
    ///
    /// **Environment variables**:
    /// - `WHISPERLINE_AUTH_TOKEN_TTL_DAYS`
    #[serde(default = "Auth::default_token_ttl_days")]
    pub token_ttl_days: NonZeroU32,
}

impl Auth {
    const MIN_SECRET_LEN: usize = 12;
    const MAX_SECRET_LEN: usize = 1024;

    const fn default_token_ttl_days() -> NonZeroU32 {
        non_zero!(NonZeroU32, 30)
    }
}

impl Validate for Auth {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let len = self.jwt_secret.as_str().chars().count();
        if !(Self::MIN_SECRET_LEN..=Self::MAX_SECRET_LEN).contains(&len) {
            errors.add("jwt_secret", field_error("length", "Invalid JWT secret key"));
        }
        into_result(errors)
    }
}

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use super::devices::is_valid_device_id;
use crate::util::validator::{field_error, into_result};
use crate::util::Sensitive;

const KEY_MAX: usize = 256;
const ENDPOINT_MAX: usize = 2048;

#[derive(Debug, Deserialize, Serialize)]
pub struct Keys {
    pub p256dh: Sensitive<String>,
    pub auth: Sensitive<String>,
}

/// Web Push subscription of a device, as produced by the browser.
#[derive(Debug, Deserialize, Serialize)]
pub struct SubscribeRequest {
    pub device_id: String,
    pub endpoint: Sensitive<String>,
    pub keys: Keys,
}

impl Validate for SubscribeRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if !is_valid_device_id(&self.device_id) {
            errors.add("device_id", field_error("device_id", "Invalid device id"));
        }

        let endpoint_ok = self.endpoint.len() <= ENDPOINT_MAX
            && url::Url::parse(self.endpoint.as_str())
                .map(|url| url.scheme() == "https")
                .unwrap_or_default();

        if !endpoint_ok {
            errors.add("endpoint", field_error("url", "Invalid push endpoint"));
        }

        for (field, key) in [("keys.p256dh", &self.keys.p256dh), ("keys.auth", &self.keys.auth)] {
            if key.is_empty() || key.len() > KEY_MAX {
                errors.add(field, field_error("length", "Invalid subscription key"));
            }
        }
        into_result(errors)
    }
}

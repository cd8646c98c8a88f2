use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::types::id::{marker::CommentMarker, Id};
use crate::util::validator::into_result;

pub const CONTENT_MAX: usize = 300;

#[derive(Debug, Deserialize, Serialize)]
pub struct Request {
    pub content: String,
    /// Top-level comment being replied to.
    #[serde(default)]
    pub parent_id: Option<Id<CommentMarker>>,
}

impl Validate for Request {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        super::check_content(&mut errors, "content", &self.content, CONTENT_MAX);
        into_result(errors)
    }
}

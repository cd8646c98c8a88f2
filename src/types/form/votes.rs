use serde::{Deserialize, Serialize};

use crate::schema::VoteValue;

/// `value` is `1`, `-1` or `0` to take the vote back.
#[derive(Debug, Deserialize, Serialize)]
pub struct Request {
    pub value: VoteValue,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub score: i64,
}

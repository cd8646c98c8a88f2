use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Notification;
use crate::types::id::{
    marker::{CommentMarker, PostMarker},
    Id,
};

/// What a vote is cast on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteTarget {
    Post(Id<PostMarker>),
    Comment(Id<CommentMarker>),
}

/// Value of a vote. Casting [`VoteValue::Clear`] removes the
/// voter's previous vote on the target, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "i8", into = "i8")]
pub enum VoteValue {
    Up,
    Down,
    Clear,
}

impl VoteValue {
    /// Signed value stored in the `votes` table, `None` if no row
    /// should exist.
    #[must_use]
    pub const fn stored(self) -> Option<i16> {
        match self {
            VoteValue::Up => Some(1),
            VoteValue::Down => Some(-1),
            VoteValue::Clear => None,
        }
    }
}

#[derive(Debug, Error)]
#[error("vote value must be 1, -1 or 0")]
pub struct InvalidVoteValue;

impl TryFrom<i8> for VoteValue {
    type Error = InvalidVoteValue;

    fn try_from(value: i8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VoteValue::Up),
            -1 => Ok(VoteValue::Down),
            0 => Ok(VoteValue::Clear),
            _ => Err(InvalidVoteValue),
        }
    }
}

impl From<VoteValue> for i8 {
    fn from(value: VoteValue) -> Self {
        match value {
            VoteValue::Up => 1,
            VoteValue::Down => -1,
            VoteValue::Clear => 0,
        }
    }
}

/// Result of casting a vote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteOutcome {
    /// Target's score after recomputing it from every active vote.
    pub score: i64,
    /// Milestone notifications created by this vote.
    #[serde(skip)]
    pub milestones: Vec<Notification>,
}

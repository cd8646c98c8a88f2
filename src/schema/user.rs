use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

use super::macros::text_column;
use crate::types::id::{marker::UserMarker, Id};
use crate::util::Sensitive;

/// The transit line an anonymous user rides on. It is the only
/// identity other users ever see and it never changes after the
/// account is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Line {
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
    Purple,
    Pink,
    Brown,
    Silver,
    Teal,
}

impl Line {
    pub const ALL: [Line; 10] = [
        Line::Red,
        Line::Orange,
        Line::Yellow,
        Line::Green,
        Line::Blue,
        Line::Purple,
        Line::Pink,
        Line::Brown,
        Line::Silver,
        Line::Teal,
    ];

    /// Picks the line of a device. The same device always lands
    /// on the same line.
    #[must_use]
    pub fn from_device(device_id: &str) -> Self {
        let digest = Sha256::digest(device_id.as_bytes());
        let index = usize::from(digest[0]) % Self::ALL.len();
        Self::ALL[index]
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Line::Red => "red",
            Line::Orange => "orange",
            Line::Yellow => "yellow",
            Line::Green => "green",
            Line::Blue => "blue",
            Line::Purple => "purple",
            Line::Pink => "pink",
            Line::Brown => "brown",
            Line::Silver => "silver",
            Line::Teal => "teal",
        }
    }

    /// Human readable name used in push messages.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Line::Red => "Red",
            Line::Orange => "Orange",
            Line::Yellow => "Yellow",
            Line::Green => "Green",
            Line::Blue => "Blue",
            Line::Purple => "Purple",
            Line::Pink => "Pink",
            Line::Brown => "Brown",
            Line::Silver => "Silver",
            Line::Teal => "Teal",
        }
    }

    #[must_use]
    pub const fn color(&self) -> &'static str {
        match self {
            Line::Red => "#e3342f",
            Line::Orange => "#f6993f",
            Line::Yellow => "#ffed4a",
            Line::Green => "#38c172",
            Line::Blue => "#3490dc",
            Line::Purple => "#9561e2",
            Line::Pink => "#f66d9b",
            Line::Brown => "#8d6e63",
            Line::Silver => "#a0aec0",
            Line::Teal => "#4dc0b5",
        }
    }

    #[must_use]
    pub fn display_attr(self) -> DisplayAttr {
        DisplayAttr {
            line: self,
            color: self.color().to_string(),
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown line {0:?}")]
pub struct UnknownLineError(String);

impl FromStr for Line {
    type Err = UnknownLineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|line| line.as_str() == s)
            .ok_or_else(|| UnknownLineError(s.to_string()))
    }
}

impl Display for Line {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

text_column!(Line);

/// Public face of a user: copied onto every post, comment and
/// notification they cause so feeds never join the users table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Deserialize, Serialize)]
pub struct DisplayAttr {
    pub line: Line,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct User {
    pub id: Id<UserMarker>,
    #[serde(skip)]
    pub device_id: Sensitive<String>,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub display: DisplayAttr,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub disabled_at: Option<DateTime<Utc>>,
}

impl User {
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_device_is_stable() {
        let first = Line::from_device("device-abcdefgh");
        for _ in 0..10 {
            assert_eq!(first, Line::from_device("device-abcdefgh"));
        }
    }

    #[test]
    fn test_lines_round_trip_through_text() {
        for line in Line::ALL {
            assert_eq!(line, line.as_str().parse::<Line>().unwrap());
        }
        assert!("magenta".parse::<Line>().is_err());
    }

    #[test]
    fn test_display_attr_uses_line_color() {
        let attr = Line::Teal.display_attr();
        assert_eq!(attr.color, "#4dc0b5");
        assert_eq!(
            serde_json::to_value(&attr).unwrap(),
            serde_json::json!({ "line": "teal", "color": "#4dc0b5" })
        );
    }
}

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

use super::id::{marker::NotificationMarker, Id};

/// Keyset position inside a recipient's notification feed.
///
/// Clients treat it as an opaque string. It encodes the creation
/// timestamp of the last row they received plus that row's id, so
/// rows sharing a timestamp are never skipped nor repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub created_at: DateTime<Utc>,
    pub id: Id<NotificationMarker>,
}

impl Cursor {
    #[must_use]
    pub fn new(created_at: DateTime<Utc>, id: Id<NotificationMarker>) -> Self {
        Self { created_at, id }
    }

    /// Whether a row at `(created_at, id)` comes strictly after
    /// this cursor in newest-first order.
    #[must_use]
    pub fn is_before(&self, created_at: DateTime<Utc>, id: Id<NotificationMarker>) -> bool {
        (created_at, id) < (self.created_at, self.id)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid pagination cursor")]
pub struct ParseCursorError;

impl Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.created_at.timestamp_micros(), self.id)
    }
}

impl FromStr for Cursor {
    type Err = ParseCursorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (micros, id) = s.split_once('_').ok_or(ParseCursorError)?;
        let micros = micros.parse::<i64>().map_err(|_| ParseCursorError)?;
        let created_at = Utc
            .timestamp_micros(micros)
            .single()
            .ok_or(ParseCursorError)?;

        let id = id.parse().map_err(|_| ParseCursorError)?;
        Ok(Self { created_at, id })
    }
}

impl Serialize for Cursor {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Cursor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_keeps_microseconds() {
        let created_at = Utc.timestamp_micros(1_700_000_000_123_456).unwrap();
        let cursor = Cursor::new(created_at, Id::new(99));

        assert_eq!(cursor.to_string(), "1700000000123456_99");
        assert_eq!(Ok(cursor), cursor.to_string().parse());
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(Err(ParseCursorError), "".parse::<Cursor>());
        assert_eq!(Err(ParseCursorError), "123".parse::<Cursor>());
        assert_eq!(Err(ParseCursorError), "abc_1".parse::<Cursor>());
        assert_eq!(Err(ParseCursorError), "123_0".parse::<Cursor>());
    }

    #[test]
    fn test_is_before_breaks_ties_by_id() {
        let at = Utc.timestamp_micros(1_000).unwrap();
        let cursor = Cursor::new(at, Id::new(10));

        assert!(cursor.is_before(at, Id::new(9)));
        assert!(!cursor.is_before(at, Id::new(10)));
        assert!(!cursor.is_before(at, Id::new(11)));
        assert!(cursor.is_before(Utc.timestamp_micros(999).unwrap(), Id::new(50)));
    }
}

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationErrors};

use crate::schema::notification::{NotificationQuery, NotificationView};
use crate::types::cursor::{Cursor, ParseCursorError};
use crate::types::id::{marker::NotificationMarker, Id};
use crate::util::validator::{field_error, into_result};

/// Most ids accepted by a single read or delete request.
pub const MAX_IDS: usize = 500;

/// Query of `GET /v1/notifications`.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
    pub cursor: Option<String>,
    #[serde(default)]
    pub unread_only: bool,
}

impl Validate for ListQuery {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(limit) = self.limit {
            if !(1..=NotificationQuery::MAX_LIMIT).contains(&limit) {
                errors.add("limit", field_error("range", "Limit must be between 1 and 100"));
            }
        }
        into_result(errors)
    }
}

impl ListQuery {
    pub fn to_query(&self) -> Result<NotificationQuery, ParseCursorError> {
        let cursor = self.cursor.as_deref().map(str::parse::<Cursor>).transpose()?;
        Ok(NotificationQuery {
            limit: self.limit.unwrap_or(NotificationQuery::DEFAULT_LIMIT),
            cursor,
            unread_only: self.unread_only,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub notifications: Vec<NotificationView>,
    /// Present when a full page was returned. Pass it back as
    /// `cursor` to fetch the next page.
    pub next_cursor: Option<Cursor>,
}

impl ListResponse {
    #[must_use]
    pub fn new(notifications: Vec<NotificationView>, limit: u32) -> Self {
        let full_page = notifications.len() >= usize::try_from(limit).unwrap_or(usize::MAX);
        let next_cursor = notifications
            .last()
            .filter(|_| full_page)
            .map(|last| Cursor::new(last.created_at, last.id));

        Self {
            notifications,
            next_cursor,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub count: u64,
}

/// Body of `POST /v1/notifications/read`. Without `ids` every unread
/// notification is marked.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ReadRequest {
    #[serde(default)]
    pub ids: Option<Vec<Id<NotificationMarker>>>,
}

impl Validate for ReadRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.ids.as_ref().is_some_and(|ids| ids.len() > MAX_IDS) {
            errors.add("ids", field_error("length", "Too many notification ids"));
        }
        into_result(errors)
    }
}

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    pub updated: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DeleteRequest {
    pub ids: Vec<Id<NotificationMarker>>,
}

impl Validate for DeleteRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.ids.len() > MAX_IDS {
            errors.add("ids", field_error("length", "Too many notification ids"));
        }
        into_result(errors)
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_defaults() {
        let query = ListQuery::default();
        assert!(query.validate().is_ok());

        let query = query.to_query().unwrap();
        assert_eq!(query.limit, NotificationQuery::DEFAULT_LIMIT);
        assert_eq!(query.cursor, None);
        assert!(!query.unread_only);
    }

    #[test]
    fn test_list_query_bounds() {
        for limit in [0, 101] {
            let query = ListQuery {
                limit: Some(limit),
                ..Default::default()
            };
            assert!(query.validate().is_err(), "limit {limit} passed");
        }

        let query = ListQuery {
            limit: Some(100),
            cursor: Some("1700000000000000_7".into()),
            unread_only: true,
        };
        assert!(query.validate().is_ok());

        let parsed = query.to_query().unwrap();
        assert_eq!(parsed.cursor.map(|c| c.id), Some(Id::new(7)));

        let query = ListQuery {
            cursor: Some("yesterday".into()),
            ..Default::default()
        };
        assert_eq!(query.to_query().unwrap_err(), ParseCursorError);
    }

    #[test]
    fn test_read_request_ids_are_optional() {
        let form: ReadRequest = serde_json::from_str("{}").unwrap();
        assert!(form.ids.is_none());

        let form: ReadRequest = serde_json::from_str(r#"{"ids":["1","2"]}"#).unwrap();
        assert_eq!(form.ids, Some(vec![Id::new(1), Id::new(2)]));

        let form = DeleteRequest {
            ids: (1..=(MAX_IDS as u64 + 1)).map(Id::new).collect(),
        };
        assert!(form.validate().is_err());
    }
}

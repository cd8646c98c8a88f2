use error_stack::{Result, ResultExt};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::id::{marker::UserMarker, Id};

/// Claims of a device token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Jwt {
    pub sub: Id<UserMarker>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("could not sign device token")]
    Encode,
    #[error("invalid device token")]
    Decode,
}

impl Jwt {
    #[must_use]
    pub fn new(user_id: Id<UserMarker>, ttl: chrono::Duration) -> Self {
        let now = chrono::Utc::now();
        Self {
            sub: user_id,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }

    #[tracing::instrument(skip_all, name = "jwt.encode")]
    pub fn encode(&self, secret: &str) -> Result<String, JwtError> {
        let header = Header::new(Algorithm::HS512);
        let key = EncodingKey::from_secret(secret.as_bytes());
        jsonwebtoken::encode(&header, self, &key).change_context(JwtError::Encode)
    }

    #[tracing::instrument(skip_all, name = "jwt.decode")]
    pub fn decode(token: &str, secret: &str) -> Result<Self, JwtError> {
        let key = DecodingKey::from_secret(secret.as_bytes());
        let validation = Validation::new(Algorithm::HS512);
        jsonwebtoken::decode::<Self>(token, &key, &validation)
            .map(|data| data.claims)
            .change_context(JwtError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "a-long-enough-test-secret";

    #[test]
    fn test_token_round_trip() {
        let jwt = Jwt::new(Id::new(42), chrono::Duration::days(1));
        let token = jwt.encode(SECRET).unwrap();
        assert_eq!(Jwt::decode(&token, SECRET).unwrap(), jwt);
        assert!(Jwt::decode(&token, "another-long-secret").is_err());
    }

    #[test]
    fn test_rejects_expired_tokens() {
        let jwt = Jwt::new(Id::new(42), chrono::Duration::days(-1));
        let token = jwt.encode(SECRET).unwrap();
        assert!(Jwt::decode(&token, SECRET).is_err());
    }

    #[test]
    fn test_subject_is_a_string() {
        let jwt = Jwt {
            sub: Id::new(7),
            iat: 1,
            exp: 2,
        };
        assert_eq!(
            serde_json::to_value(jwt).unwrap(),
            serde_json::json!({ "sub": "7", "iat": 1, "exp": 2 })
        );
    }
}

use actix_web::{http::header, web, FromRequest};
use futures::future::{ready, LocalBoxFuture};
use thiserror::Error;

use super::{Error, Jwt};
use crate::{schema::User, App};

/// User behind the bearer token of a request. Extracting it fails
/// with 401 when the token is missing, invalid or belongs to a
/// disabled user.
#[derive(Debug)]
pub struct Actor(pub User);

impl Actor {
    #[must_use]
    pub fn user(&self) -> &User {
        &self.0
    }
}

impl FromRequest for Actor {
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        let Some(app) = req.app_data::<web::Data<App>>() else {
            #[derive(Debug, Error)]
            #[error("The web app has no available configuration")]
            struct NoConfig;
            return Box::pin(ready(Err(Error::from_context(
                crate::types::Error::Internal,
                NoConfig,
            ))));
        };

        let token = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        let Some(token) = token else {
            return Box::pin(ready(Err(Error::unauthorized("missing bearer token"))));
        };

        let jwt = match Jwt::decode(token, app.config.auth.jwt_secret.as_str()) {
            Ok(jwt) => jwt,
            Err(report) => {
                return Box::pin(ready(Err(Error::from_report(
                    crate::types::Error::Unauthorized,
                    report,
                ))))
            }
        };

        let app = app.clone();
        Box::pin(async move {
            match app.store.user(jwt.sub).await? {
                Some(user) if !user.is_disabled() => Ok(Actor(user)),
                Some(..) => Err(Error::unauthorized("user is disabled")),
                None => Err(Error::unauthorized("user does not exist")),
            }
        })
    }
}

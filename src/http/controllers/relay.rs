use actix_web::{
    http::header,
    web::{self, Json},
    HttpRequest, HttpResponse,
};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::{
    http::Error,
    relay::{event, Event},
    App,
};

/// Compares digests so the comparison time does not depend on how
/// much of the secret matched.
fn secret_matches(given: &str, expected: &str) -> bool {
    Sha256::digest(given.as_bytes()) == Sha256::digest(expected.as_bytes())
}

/// Webhook for change data capture events of the `notifications`
/// table.
#[tracing::instrument(skip_all, name = "http.relay.notifications")]
pub async fn notifications(
    app: web::Data<App>,
    req: HttpRequest,
    body: Json<Value>,
) -> Result<HttpResponse, Error> {
    let Some(secret) = app.config.relay.webhook_secret.as_ref() else {
        return Err(Error::not_found());
    };

    let authorized = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| secret_matches(token, secret.as_str()));

    if !authorized {
        return Err(Error::unauthorized("invalid relay secret"));
    }

    match event::parse(body.into_inner())? {
        Event::Ignored(reason) => Ok(HttpResponse::Ok().json(json!({
            "ignored": true,
            "reason": reason,
        }))),
        Event::Deliver(notification) => {
            let report = app.relay.deliver(&notification).await?;
            Ok(HttpResponse::Ok().json(report))
        }
    }
}

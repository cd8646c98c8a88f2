use actix_web::{web, HttpRequest};
use std::fmt::Display;

use crate::http::Error;
use crate::types::id::{marker::Marker, Id};

pub mod comments;
pub mod devices;
pub mod notifications;
pub mod posts;
pub mod push;
pub mod relay;
pub mod users;

/// Mounts every route under `/v1`. The relay webhook is only
/// mounted when `relay_enabled` is set.
pub fn configure(cfg: &mut web::ServiceConfig, relay_enabled: bool) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error));

    let mut scope = web::scope("/v1")
        .route("/devices", web::post().to(devices::register))
        .route("/users/@me", web::get().to(users::me))
        .service(
            web::scope("/posts")
                .route("", web::post().to(posts::create))
                .route("/{id}", web::delete().to(posts::delete))
                .route("/{id}/comments", web::post().to(posts::comment))
                .route("/{id}/vote", web::post().to(posts::vote)),
        )
        .service(
            web::scope("/comments")
                .route("/{id}", web::delete().to(comments::delete))
                .route("/{id}/vote", web::post().to(comments::vote)),
        )
        .service(
            web::scope("/notifications")
                .route("", web::get().to(notifications::list))
                .route("/unread-count", web::get().to(notifications::unread_count))
                .route("/read", web::post().to(notifications::read))
                .route("/delete", web::post().to(notifications::delete)),
        )
        .service(
            web::scope("/push/subscriptions")
                .route("", web::put().to(push::subscribe))
                .route("/{device_id}", web::delete().to(push::unsubscribe)),
        );

    if relay_enabled {
        scope = scope.route("/relay/notifications", web::post().to(relay::notifications));
    }
    cfg.service(scope);
}

/// Ids in paths which do not parse cannot point at anything.
pub(crate) fn parse_id<M: Marker>(value: &str) -> Result<Id<M>, Error> {
    value.parse().map_err(|_| Error::not_found())
}

pub(crate) fn invalid_body(error: impl Display) -> Error {
    #[derive(Debug, thiserror::Error)]
    #[error("Invalid request body: {0}")]
    struct InvalidBody(String);

    let message = error.to_string();
    Error::from_context(
        crate::types::Error::InvalidRequest {
            message: message.clone().into(),
        },
        InvalidBody(message),
    )
}

fn json_error(error: actix_web::error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    invalid_body(error).into()
}

fn query_error(error: actix_web::error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    invalid_body(error).into()
}

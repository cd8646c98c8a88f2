use actix_web::HttpResponse;

use crate::http::Actor;

#[tracing::instrument(skip_all, name = "http.users.me")]
pub async fn me(actor: Actor) -> HttpResponse {
    HttpResponse::Ok().json(actor.user())
}

use actix_web::{
    web::{self, Json},
    HttpResponse,
};

use super::parse_id;
use crate::{
    http::{Actor, Error},
    schema::VoteTarget,
    types::form::votes,
    App,
};

#[tracing::instrument(skip_all, name = "http.comments.delete")]
pub async fn delete(
    app: web::Data<App>,
    actor: Actor,
    path: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let id = parse_id(&path)?;
    app.store.delete_comment(actor.user().id, id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[tracing::instrument(skip_all, name = "http.comments.vote")]
pub async fn vote(
    app: web::Data<App>,
    actor: Actor,
    path: web::Path<String>,
    form: Json<votes::Request>,
) -> Result<HttpResponse, Error> {
    let target = VoteTarget::Comment(parse_id(&path)?);
    let outcome = app.store.cast_vote(actor.user(), target, form.value).await?;
    Ok(HttpResponse::Ok().json(votes::Response {
        score: outcome.score,
    }))
}

use actix_web::{
    web::{self, Json},
    HttpResponse,
};
use validator::Validate;

use super::parse_id;
use crate::{
    http::{Actor, Error},
    schema::VoteTarget,
    types::form::{comments, posts, votes},
    App,
};

#[tracing::instrument(skip_all, name = "http.posts.create")]
pub async fn create(
    app: web::Data<App>,
    actor: Actor,
    form: Json<posts::Request>,
) -> Result<HttpResponse, Error> {
    form.validate()?;
    let post = app.store.create_post(actor.user(), &form.content).await?;
    Ok(HttpResponse::Created().json(post))
}

#[tracing::instrument(skip_all, name = "http.posts.delete")]
pub async fn delete(
    app: web::Data<App>,
    actor: Actor,
    path: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let id = parse_id(&path)?;
    app.store.delete_post(actor.user().id, id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[tracing::instrument(skip_all, name = "http.posts.comment")]
pub async fn comment(
    app: web::Data<App>,
    actor: Actor,
    path: web::Path<String>,
    form: Json<comments::Request>,
) -> Result<HttpResponse, Error> {
    form.validate()?;

    let post_id = parse_id(&path)?;
    let outcome = app
        .store
        .create_comment(actor.user(), post_id, form.parent_id, &form.content)
        .await?;

    Ok(HttpResponse::Created().json(outcome.comment))
}

#[tracing::instrument(skip_all, name = "http.posts.vote")]
pub async fn vote(
    app: web::Data<App>,
    actor: Actor,
    path: web::Path<String>,
    form: Json<votes::Request>,
) -> Result<HttpResponse, Error> {
    let target = VoteTarget::Post(parse_id(&path)?);
    let outcome = app.store.cast_vote(actor.user(), target, form.value).await?;
    Ok(HttpResponse::Ok().json(votes::Response {
        score: outcome.score,
    }))
}

use actix_web::{
    web::{self, Json, Query},
    HttpResponse,
};
use validator::Validate;

use crate::{
    http::{Actor, Error},
    types::form::notifications::{
        DeleteRequest, DeleteResponse, ListQuery, ListResponse, ReadRequest, ReadResponse,
        UnreadCountResponse,
    },
    App,
};

#[tracing::instrument(skip_all, name = "http.notifications.list")]
pub async fn list(
    app: web::Data<App>,
    actor: Actor,
    query: Query<ListQuery>,
) -> Result<HttpResponse, Error> {
    query.validate()?;

    let query = query.to_query()?;
    let rows = app.store.notifications(actor.user().id, query).await?;
    Ok(HttpResponse::Ok().json(ListResponse::new(rows, query.limit)))
}

#[tracing::instrument(skip_all, name = "http.notifications.unread_count")]
pub async fn unread_count(app: web::Data<App>, actor: Actor) -> Result<HttpResponse, Error> {
    let count = app.store.unread_count(actor.user().id).await?;
    Ok(HttpResponse::Ok().json(UnreadCountResponse { count }))
}

#[tracing::instrument(skip_all, name = "http.notifications.read")]
pub async fn read(
    app: web::Data<App>,
    actor: Actor,
    body: web::Bytes,
) -> Result<HttpResponse, Error> {
    // an empty body marks everything as read
    let form = if body.iter().all(u8::is_ascii_whitespace) {
        ReadRequest::default()
    } else {
        serde_json::from_slice::<ReadRequest>(&body).map_err(super::invalid_body)?
    };
    form.validate()?;

    let updated = app
        .store
        .mark_read(actor.user().id, form.ids.as_deref())
        .await?;

    Ok(HttpResponse::Ok().json(ReadResponse { updated }))
}

#[tracing::instrument(skip_all, name = "http.notifications.delete")]
pub async fn delete(
    app: web::Data<App>,
    actor: Actor,
    form: Json<DeleteRequest>,
) -> Result<HttpResponse, Error> {
    form.validate()?;

    let deleted = app
        .store
        .soft_delete_notifications(actor.user().id, &form.ids)
        .await?;

    Ok(HttpResponse::Ok().json(DeleteResponse { deleted }))
}

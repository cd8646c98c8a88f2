use actix_web::{
    web::{self, Json},
    HttpResponse,
};
use tracing::debug;
use validator::Validate;

use crate::{
    http::{Actor, Error},
    schema::NewPushSubscription,
    types::form::push::SubscribeRequest,
    App,
};

#[tracing::instrument(skip_all, name = "http.push.subscribe")]
pub async fn subscribe(
    app: web::Data<App>,
    actor: Actor,
    form: Json<SubscribeRequest>,
) -> Result<HttpResponse, Error> {
    form.validate()?;

    let form = form.into_inner();
    let subscription = app
        .store
        .upsert_push_subscription(NewPushSubscription {
            user_id: actor.user().id,
            device_id: form.device_id,
            endpoint: form.endpoint,
            key_p256dh: form.keys.p256dh,
            key_auth: form.keys.auth,
        })
        .await?;

    Ok(HttpResponse::Ok().json(subscription))
}

#[tracing::instrument(skip_all, name = "http.push.unsubscribe")]
pub async fn unsubscribe(
    app: web::Data<App>,
    actor: Actor,
    path: web::Path<String>,
) -> Result<HttpResponse, Error> {
    let removed = app
        .store
        .remove_push_subscription(actor.user().id, path.as_str())
        .await?;

    debug!(removed, "push subscription removal");
    Ok(HttpResponse::NoContent().finish())
}

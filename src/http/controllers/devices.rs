use actix_web::{
    web::{self, Json},
    HttpResponse,
};
use validator::Validate;

use crate::{
    http::{Error, Jwt},
    types::form::devices,
    App,
};

/// Signs a device in, creating its anonymous user on first contact.
#[tracing::instrument(skip_all, name = "http.devices.register")]
pub async fn register(
    app: web::Data<App>,
    form: Json<devices::Request>,
) -> Result<HttpResponse, Error> {
    form.validate()?;

    let user = app.store.get_or_create_user(form.device_id.as_str()).await?;
    if user.is_disabled() {
        return Err(Error::unauthorized("user is disabled"));
    }

    let auth = &app.config.auth;
    let ttl = chrono::Duration::days(i64::from(auth.token_ttl_days.get()));
    let token = Jwt::new(user.id, ttl)
        .encode(auth.jwt_secret.as_str())
        .map_err(|report| Error::from_report(crate::types::Error::Internal, report))?;

    Ok(HttpResponse::Ok().json(devices::Response {
        token: token.into(),
        user,
    }))
}

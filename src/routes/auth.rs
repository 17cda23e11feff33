use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;

use crate::{
    auth::{authenticate_credentials, basic_validator, AuthUser},
    error::AppError,
    response,
    state::AppState,
};

#[derive(Deserialize)]
struct LoginForm {
    email: String,
    password: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/auth/login").route(web::post().to(login)))
        .service(
            web::resource("/auth/me")
                .wrap(HttpAuthentication::basic(basic_validator))
                .route(web::get().to(me)),
        );
}

/// Checks credentials without starting a session; clients keep sending Basic auth.
async fn login(state: web::Data<AppState>, form: web::Json<LoginForm>) -> Result<HttpResponse, AppError> {
    let form = form.into_inner();
    match authenticate_credentials(&state, &form.email, &form.password).await? {
        Some(user) => {
            log::info!("Login succeeded for {}", user.email);
            Ok(response::ok_with_message(user, "Login successful"))
        }
        None => {
            log::info!("Login failed for {}", form.email);
            Err(AppError::Unauthorized)
        }
    }
}

async fn me(auth: web::ReqData<AuthUser>) -> HttpResponse {
    response::ok(auth.into_inner())
}

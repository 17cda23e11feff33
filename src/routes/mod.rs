pub mod auth;
pub mod bookings;
pub mod events;
pub mod services;
pub mod stats;
pub mod time_slots;
pub mod users;
pub mod venues;

use actix_web::{web, HttpResponse};
use actix_web_httpauth::extractors::basic;

use crate::{auth::AUTH_REALM, error::AppError};

/// Mounts `/health` and the `/api/v1` surface, with extractor failures
/// rendered in the same JSON envelope as every other error.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(basic::Config::default().realm(AUTH_REALM))
        .app_data(web::JsonConfig::default().error_handler(|err, _req| {
            AppError::BadRequest(format!("Invalid JSON body: {err}")).into()
        }))
        .app_data(web::QueryConfig::default().error_handler(|err, _req| {
            AppError::BadRequest(format!("Invalid query string: {err}")).into()
        }))
        .app_data(web::PathConfig::default().error_handler(|err, _req| {
            AppError::BadRequest(format!("Invalid path parameter: {err}")).into()
        }))
        .service(web::resource("/health").route(web::get().to(health)))
        .service(
            web::scope("/api/v1")
                .configure(auth::configure)
                .configure(venues::configure)
                .configure(time_slots::configure)
                .configure(services::configure)
                .configure(bookings::configure)
                .configure(users::configure)
                .configure(stats::configure)
                .configure(events::configure),
        );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

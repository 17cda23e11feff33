use actix_web::{guard, web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;

use crate::{
    auth::staff_validator,
    catalog::{self, TimeSlotChanges, TimeSlotInput},
    error::AppError,
    pagination::PageQuery,
    response,
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/time-slots")
            .guard(guard::Get())
            .route(web::get().to(list)),
    )
    .service(
        web::resource("/time-slots")
            .wrap(HttpAuthentication::basic(staff_validator))
            .route(web::post().to(create)),
    )
    .service(
        web::resource("/time-slots/{id}")
            .guard(guard::Get())
            .route(web::get().to(get)),
    )
    .service(
        web::resource("/time-slots/{id}")
            .wrap(HttpAuthentication::basic(staff_validator))
            .route(web::put().to(update))
            .route(web::delete().to(delete)),
    );
}

async fn list(state: web::Data<AppState>, page: web::Query<PageQuery>) -> Result<HttpResponse, AppError> {
    Ok(response::page(catalog::list_time_slots(&state.db, &page).await?))
}

async fn get(state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse, AppError> {
    Ok(response::ok(catalog::get_time_slot(&state.db, path.into_inner()).await?))
}

async fn create(state: web::Data<AppState>, body: web::Json<TimeSlotInput>) -> Result<HttpResponse, AppError> {
    let slot = catalog::create_time_slot(&state.db, body.into_inner()).await?;
    Ok(response::created(slot, "Time slot created"))
}

async fn update(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<TimeSlotChanges>,
) -> Result<HttpResponse, AppError> {
    let slot = catalog::update_time_slot(&state.db, path.into_inner(), body.into_inner()).await?;
    Ok(response::ok_with_message(slot, "Time slot updated"))
}

async fn delete(state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse, AppError> {
    let slot = catalog::delete_time_slot(&state.db, path.into_inner()).await?;
    Ok(response::ok_with_message(slot, "Time slot deleted"))
}

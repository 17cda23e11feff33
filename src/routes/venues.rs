use actix_web::{guard, web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;

use crate::{
    auth::staff_validator,
    catalog::{self, SearchQuery, VenueChanges, VenueInput},
    error::AppError,
    pagination::PageQuery,
    response,
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/venues")
            .guard(guard::Get())
            .route(web::get().to(list)),
    )
    .service(
        web::resource("/venues")
            .wrap(HttpAuthentication::basic(staff_validator))
            .route(web::post().to(create)),
    )
    .service(
        web::resource("/venues/{id}")
            .guard(guard::Get())
            .route(web::get().to(get)),
    )
    .service(
        web::resource("/venues/{id}")
            .wrap(HttpAuthentication::basic(staff_validator))
            .route(web::put().to(update))
            .route(web::delete().to(delete)),
    );
}

async fn list(
    state: web::Data<AppState>,
    page: web::Query<PageQuery>,
    search: web::Query<SearchQuery>,
) -> Result<HttpResponse, AppError> {
    let venues = catalog::list_venues(&state.db, &page, &search).await?;
    Ok(response::page(venues))
}

async fn get(state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse, AppError> {
    let venue = catalog::get_venue(&state.db, path.into_inner()).await?;
    Ok(response::ok(venue))
}

async fn create(state: web::Data<AppState>, body: web::Json<VenueInput>) -> Result<HttpResponse, AppError> {
    let venue = catalog::create_venue(&state.db, body.into_inner()).await?;
    Ok(response::created(venue, "Venue created"))
}

async fn update(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<VenueChanges>,
) -> Result<HttpResponse, AppError> {
    let venue = catalog::update_venue(&state.db, path.into_inner(), body.into_inner()).await?;
    Ok(response::ok_with_message(venue, "Venue updated"))
}

async fn delete(state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse, AppError> {
    let venue = catalog::delete_venue(&state.db, path.into_inner()).await?;
    Ok(response::ok_with_message(venue, "Venue deleted"))
}

use actix_web::{guard, web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;

use crate::{
    auth::staff_validator,
    catalog::{self, SearchQuery, ServiceChanges, ServiceInput},
    error::AppError,
    pagination::PageQuery,
    response,
    state::AppState,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/services")
            .guard(guard::Get())
            .route(web::get().to(list)),
    )
    .service(
        web::resource("/services")
            .wrap(HttpAuthentication::basic(staff_validator))
            .route(web::post().to(create)),
    )
    .service(
        web::resource("/services/{id}")
            .guard(guard::Get())
            .route(web::get().to(get)),
    )
    .service(
        web::resource("/services/{id}")
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
    Ok(response::page(
        catalog::list_services(&state.db, &page, &search).await?,
    ))
}

async fn get(state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse, AppError> {
    Ok(response::ok(catalog::get_service(&state.db, path.into_inner()).await?))
}

async fn create(state: web::Data<AppState>, body: web::Json<ServiceInput>) -> Result<HttpResponse, AppError> {
    let service = catalog::create_service(&state.db, body.into_inner()).await?;
    Ok(response::created(service, "Service created"))
}

async fn update(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<ServiceChanges>,
) -> Result<HttpResponse, AppError> {
    let service = catalog::update_service(&state.db, path.into_inner(), body.into_inner()).await?;
    Ok(response::ok_with_message(service, "Service updated"))
}

async fn delete(state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse, AppError> {
    let service = catalog::delete_service(&state.db, path.into_inner()).await?;
    Ok(response::ok_with_message(service, "Service deleted"))
}

use actix_web::{web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use serde::Deserialize;

use crate::{
    auth::{admin_validator, staff_validator},
    catalog::SearchQuery,
    error::AppError,
    models::Role,
    pagination::PageQuery,
    response,
    state::AppState,
    users::{self, UserChanges, UserInput},
};

#[derive(Deserialize)]
struct RoleQuery {
    role: Option<Role>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    // Registered ahead of the admin scope so staff can look up customers.
    cfg.service(
        web::resource("/users/customers")
            .wrap(HttpAuthentication::basic(staff_validator))
            .route(web::get().to(customers)),
    )
    .service(
        web::scope("/users")
            .wrap(HttpAuthentication::basic(admin_validator))
            .route("", web::get().to(list))
            .route("", web::post().to(create))
            .route("/{id}", web::get().to(get))
            .route("/{id}", web::put().to(update))
            .route("/{id}", web::delete().to(delete)),
    );
}

async fn customers(
    state: web::Data<AppState>,
    page: web::Query<PageQuery>,
    search: web::Query<SearchQuery>,
) -> Result<HttpResponse, AppError> {
    let users = users::list(&state.db, &page, &search, Some(Role::Customer)).await?;
    Ok(response::page(users))
}

async fn list(
    state: web::Data<AppState>,
    page: web::Query<PageQuery>,
    search: web::Query<SearchQuery>,
    role: web::Query<RoleQuery>,
) -> Result<HttpResponse, AppError> {
    let users = users::list(&state.db, &page, &search, role.role).await?;
    Ok(response::page(users))
}

async fn get(state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse, AppError> {
    Ok(response::ok(users::get(&state.db, path.into_inner()).await?))
}

async fn create(state: web::Data<AppState>, body: web::Json<UserInput>) -> Result<HttpResponse, AppError> {
    let user = users::create(&state.db, body.into_inner()).await?;
    Ok(response::created(user, "User created"))
}

async fn update(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<UserChanges>,
) -> Result<HttpResponse, AppError> {
    let user = users::update(&state.db, path.into_inner(), body.into_inner()).await?;
    Ok(response::ok_with_message(user, "User updated"))
}

async fn delete(state: web::Data<AppState>, path: web::Path<i64>) -> Result<HttpResponse, AppError> {
    let user = users::delete(&state.db, path.into_inner()).await?;
    Ok(response::ok_with_message(user, "User deleted"))
}

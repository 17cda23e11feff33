use actix_web::{guard, web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;

use crate::{
    auth::{admin_validator, basic_validator, booking_validator, AuthUser},
    bookings::{self, BookingFilter, BookingUpdate, NewBooking, NewLineItem},
    error::AppError,
    pagination::PageQuery,
    response,
    state::AppState,
};

/// Role checks sit in the middleware so they run before the body is read.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/bookings")
            .guard(guard::Get())
            .wrap(HttpAuthentication::basic(basic_validator))
            .route(web::get().to(list)),
    )
    .service(
        web::resource("/bookings")
            .wrap(HttpAuthentication::basic(booking_validator))
            .route(web::post().to(create)),
    )
    .service(
        web::resource("/bookings/{id}")
            .guard(guard::Get())
            .wrap(HttpAuthentication::basic(basic_validator))
            .route(web::get().to(get)),
    )
    .service(
        web::resource("/bookings/{id}")
            .wrap(HttpAuthentication::basic(admin_validator))
            .route(web::put().to(update))
            .route(web::delete().to(delete)),
    )
    .service(
        web::resource("/bookings/{id}/services")
            .wrap(HttpAuthentication::basic(admin_validator))
            .route(web::post().to(add_service)),
    )
    .service(
        web::resource("/bookings/{id}/services/{item_id}")
            .wrap(HttpAuthentication::basic(admin_validator))
            .route(web::delete().to(remove_service)),
    );
}

async fn list(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    page: web::Query<PageQuery>,
    filter: web::Query<BookingFilter>,
) -> Result<HttpResponse, AppError> {
    let bookings = bookings::list(&state, &auth, &page, &filter).await?;
    Ok(response::page(bookings))
}

async fn create(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    body: web::Json<NewBooking>,
) -> Result<HttpResponse, AppError> {
    let booking = bookings::create(&state, &auth, body.into_inner()).await?;
    Ok(response::created(booking, "Booking created"))
}

async fn get(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let booking = bookings::get(&state, &auth, path.into_inner()).await?;
    Ok(response::ok(booking))
}

async fn update(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<i64>,
    body: web::Json<BookingUpdate>,
) -> Result<HttpResponse, AppError> {
    let booking = bookings::update(&state, &auth, path.into_inner(), body.into_inner()).await?;
    Ok(response::ok_with_message(booking, "Booking updated"))
}

async fn delete(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<i64>,
) -> Result<HttpResponse, AppError> {
    let booking = bookings::soft_delete(&state, &auth, path.into_inner()).await?;
    Ok(response::ok_with_message(booking, "Booking deleted"))
}

async fn add_service(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<i64>,
    body: web::Json<NewLineItem>,
) -> Result<HttpResponse, AppError> {
    let booking = bookings::add_line_item(&state, &auth, path.into_inner(), body.into_inner()).await?;
    Ok(response::ok_with_message(booking, "Service added to booking"))
}

async fn remove_service(
    state: web::Data<AppState>,
    auth: web::ReqData<AuthUser>,
    path: web::Path<(i64, i64)>,
) -> Result<HttpResponse, AppError> {
    let (id, item_id) = path.into_inner();
    let booking = bookings::remove_line_item(&state, &auth, id, item_id).await?;
    Ok(response::ok_with_message(booking, "Service removed from booking"))
}

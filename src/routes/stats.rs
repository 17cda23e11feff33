use actix_web::{http::header, web, HttpResponse};
use actix_web_httpauth::middleware::HttpAuthentication;
use chrono::Utc;

use crate::{
    auth::admin_validator,
    error::AppError,
    reports::{self, ReportFormat, ReportQuery},
    response,
    state::AppState,
    stats::{self, StatsQuery},
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/statistics")
            .wrap(HttpAuthentication::basic(admin_validator))
            .route(web::get().to(statistics)),
    )
    .service(
        web::resource("/reports")
            .wrap(HttpAuthentication::basic(admin_validator))
            .route(web::get().to(report)),
    );
}

async fn statistics(
    state: web::Data<AppState>,
    query: web::Query<StatsQuery>,
) -> Result<HttpResponse, AppError> {
    let today = Utc::now().date_naive();
    let statistics = stats::collect(&state.db, query.kind, today).await?;
    Ok(response::ok(statistics))
}

async fn report(
    state: web::Data<AppState>,
    query: web::Query<ReportQuery>,
) -> Result<HttpResponse, AppError> {
    let bookings = reports::load(&state.db).await?;
    match query.format {
        ReportFormat::Json => Ok(response::ok(bookings)),
        ReportFormat::Csv => {
            let body = reports::to_csv(&bookings)?;
            Ok(HttpResponse::Ok()
                .insert_header((header::CONTENT_TYPE, "text/csv; charset=utf-8"))
                .insert_header((
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"bookings.csv\"",
                ))
                .body(body))
        }
    }
}

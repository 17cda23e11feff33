//! Venues, time slots and services. Deletes only deactivate rows so bookings
//! keep pointing at something.

use chrono::{NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{sqlite::SqliteRow, QueryBuilder, Sqlite, SqlitePool};

use crate::{
    error::{AppError, FieldError},
    models::{clock, Service, ServiceRow, TimeSlot, Venue, VenueRow},
    pagination::{Page, PageMeta, PageQuery, PageRequest},
    pricing::{from_cents, to_cents},
};

pub const SEARCH_MAX_LEN: usize = 255;
const TEXT_MAX_LEN: usize = 255;

pub const VENUE_SORTABLE: &[(&str, &str)] = &[
    ("id", "id"),
    ("title", "title"),
    ("price", "price_cents"),
    ("capacity", "capacity"),
    ("createdAt", "created_at"),
    ("modifiedAt", "modified_at"),
];

pub const TIME_SLOT_SORTABLE: &[(&str, &str)] = &[
    ("position", "position"),
    ("id", "id"),
    ("startsAt", "starts_at"),
    ("endsAt", "ends_at"),
    ("createdAt", "created_at"),
    ("modifiedAt", "modified_at"),
];

pub const SERVICE_SORTABLE: &[(&str, &str)] = &[
    ("id", "id"),
    ("description", "description"),
    ("price", "price_cents"),
    ("createdAt", "created_at"),
    ("modifiedAt", "modified_at"),
];

const VENUE_COLUMNS: &str =
    "id, title, address, latitude, longitude, capacity, price_cents, active, created_at, modified_at";
const TIME_SLOT_COLUMNS: &str = "id, position, starts_at, ends_at, active, created_at, modified_at";
const SERVICE_COLUMNS: &str = "id, description, price_cents, active, created_at, modified_at";

/// Free-text `q` filter for catalog lists.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

impl SearchQuery {
    fn pattern(&self) -> Result<Option<String>, AppError> {
        let Some(text) = self.q.as_deref().map(str::trim).filter(|text| !text.is_empty()) else {
            return Ok(None);
        };
        if text.chars().count() > SEARCH_MAX_LEN {
            return Err(AppError::Validation(vec![FieldError::new(
                "q",
                format!("q cannot exceed {SEARCH_MAX_LEN} characters"),
            )]));
        }
        Ok(Some(format!("%{text}%")))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VenueInput {
    pub title: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub capacity: Option<i64>,
    pub price: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VenueChanges {
    pub title: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub capacity: Option<i64>,
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TimeSlotInput {
    pub position: i64,
    #[serde(with = "clock")]
    pub starts_at: NaiveTime,
    #[serde(with = "clock")]
    pub ends_at: NaiveTime,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TimeSlotChanges {
    pub position: Option<i64>,
    #[serde(default, with = "clock::optional")]
    pub starts_at: Option<NaiveTime>,
    #[serde(default, with = "clock::optional")]
    pub ends_at: Option<NaiveTime>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceInput {
    pub description: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceChanges {
    pub description: Option<String>,
    pub price: Option<Decimal>,
}

/// Trims and upper-cases the first letter.
fn capitalize(text: &str) -> String {
    let text = text.trim();
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn check_text(errors: &mut Vec<FieldError>, field: &'static str, value: &str, min: usize) {
    let len = value.trim().chars().count();
    if len < min || len > TEXT_MAX_LEN {
        errors.push(FieldError::new(
            field,
            format!("{field} must be between {min} and {TEXT_MAX_LEN} characters"),
        ));
    }
}

fn price_cents(errors: &mut Vec<FieldError>, price: Decimal) -> i64 {
    match to_cents(price) {
        Some(cents) if cents >= 0 => cents,
        _ => {
            errors.push(FieldError::new("price", "price must be a non-negative amount"));
            0
        }
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// `search` pairs the columns to match with a `LIKE` pattern.
async fn paged<T>(
    db: &SqlitePool,
    table: &str,
    columns: &str,
    request: &PageRequest,
    search: Option<(&[&str], String)>,
) -> Result<(Vec<T>, PageMeta), AppError>
where
    T: for<'r> sqlx::FromRow<'r, SqliteRow> + Send + Unpin,
{
    let mut count = QueryBuilder::<Sqlite>::new(format!("SELECT COUNT(*) FROM {table} WHERE active = 1"));
    let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {columns} FROM {table} WHERE active = 1"));
    if let Some((fields, pattern)) = &search {
        for builder in [&mut count, &mut select] {
            builder.push(" AND (");
            for (index, field) in fields.iter().enumerate() {
                if index > 0 {
                    builder.push(" OR ");
                }
                builder.push(*field).push(" LIKE ").push_bind(pattern.clone());
            }
            builder.push(")");
        }
    }

    let total = count.build_query_scalar::<i64>().fetch_one(db).await?;
    select.push(request.order_clause());
    let items = select.build_query_as::<T>().fetch_all(db).await?;
    Ok((items, PageMeta::new(request, total)))
}

// Venues

pub async fn list_venues(db: &SqlitePool, query: &PageQuery, search: &SearchQuery) -> Result<Page<Venue>, AppError> {
    let request = query.validate(VENUE_SORTABLE)?;
    let filter = search.pattern()?.map(|pattern| (&["title", "address"][..], pattern));
    let (rows, meta) = paged::<VenueRow>(db, "venues", VENUE_COLUMNS, &request, filter).await?;
    Ok(Page {
        items: rows.into_iter().map(Venue::from).collect(),
        meta,
    })
}

async fn venue_row(db: &SqlitePool, id: i64, active_only: bool) -> Result<VenueRow, AppError> {
    let sql = format!(
        "SELECT {VENUE_COLUMNS} FROM venues WHERE id = ?{}",
        if active_only { " AND active = 1" } else { "" }
    );
    sqlx::query_as::<_, VenueRow>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found("Venue"))
}

pub async fn get_venue(db: &SqlitePool, id: i64) -> Result<Venue, AppError> {
    venue_row(db, id, true).await.map(Venue::from)
}

fn validate_venue(
    title: &str,
    address: &str,
    latitude: Option<f64>,
    longitude: Option<f64>,
    capacity: Option<i64>,
    price: Decimal,
) -> Result<i64, AppError> {
    let mut errors = Vec::new();
    check_text(&mut errors, "title", title, 3);
    check_text(&mut errors, "address", address, 1);
    if latitude.is_some_and(|lat| !(-90.0..=90.0).contains(&lat)) {
        errors.push(FieldError::new("latitude", "latitude must be between -90 and 90"));
    }
    if longitude.is_some_and(|lng| !(-180.0..=180.0).contains(&lng)) {
        errors.push(FieldError::new("longitude", "longitude must be between -180 and 180"));
    }
    if capacity.is_some_and(|capacity| capacity < 1) {
        errors.push(FieldError::new("capacity", "capacity must be at least 1"));
    }
    let cents = price_cents(&mut errors, price);
    AppError::check(errors)?;
    Ok(cents)
}

pub async fn create_venue(db: &SqlitePool, input: VenueInput) -> Result<Venue, AppError> {
    let cents = validate_venue(
        &input.title,
        &input.address,
        input.latitude,
        input.longitude,
        input.capacity,
        input.price,
    )?;
    let now = now();
    let id = sqlx::query(
        r#"INSERT INTO venues (title, address, latitude, longitude, capacity, price_cents, active, created_at, modified_at)
           VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)"#,
    )
    .bind(capitalize(&input.title))
    .bind(input.address.trim())
    .bind(input.latitude)
    .bind(input.longitude)
    .bind(input.capacity)
    .bind(cents)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?
    .last_insert_rowid();

    log::info!("Venue {id} created");
    get_venue(db, id).await
}

pub async fn update_venue(db: &SqlitePool, id: i64, changes: VenueChanges) -> Result<Venue, AppError> {
    let current = venue_row(db, id, true).await?;
    let title = changes.title.unwrap_or(current.title);
    let address = changes.address.unwrap_or(current.address);
    let latitude = changes.latitude.or(current.latitude);
    let longitude = changes.longitude.or(current.longitude);
    let capacity = changes.capacity.or(current.capacity);
    let price = changes
        .price
        .unwrap_or_else(|| from_cents(current.price_cents));
    let cents = validate_venue(&title, &address, latitude, longitude, capacity, price)?;

    sqlx::query(
        r#"UPDATE venues
           SET title = ?, address = ?, latitude = ?, longitude = ?, capacity = ?, price_cents = ?, modified_at = ?
           WHERE id = ? AND active = 1"#,
    )
    .bind(capitalize(&title))
    .bind(address.trim())
    .bind(latitude)
    .bind(longitude)
    .bind(capacity)
    .bind(cents)
    .bind(now())
    .bind(id)
    .execute(db)
    .await?;

    get_venue(db, id).await
}

pub async fn delete_venue(db: &SqlitePool, id: i64) -> Result<Venue, AppError> {
    let result = sqlx::query("UPDATE venues SET active = 0, modified_at = ? WHERE id = ? AND active = 1")
        .bind(now())
        .bind(id)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Venue"));
    }
    log::info!("Venue {id} deactivated");
    venue_row(db, id, false).await.map(Venue::from)
}

// Time slots

pub async fn list_time_slots(db: &SqlitePool, query: &PageQuery) -> Result<Page<TimeSlot>, AppError> {
    let request = query.validate(TIME_SLOT_SORTABLE)?;
    let (items, meta) = paged::<TimeSlot>(db, "time_slots", TIME_SLOT_COLUMNS, &request, None).await?;
    Ok(Page { items, meta })
}

async fn time_slot_row(db: &SqlitePool, id: i64, active_only: bool) -> Result<TimeSlot, AppError> {
    let sql = format!(
        "SELECT {TIME_SLOT_COLUMNS} FROM time_slots WHERE id = ?{}",
        if active_only { " AND active = 1" } else { "" }
    );
    sqlx::query_as::<_, TimeSlot>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found("Time slot"))
}

pub async fn get_time_slot(db: &SqlitePool, id: i64) -> Result<TimeSlot, AppError> {
    time_slot_row(db, id, true).await
}

fn validate_time_slot(position: i64, starts_at: NaiveTime, ends_at: NaiveTime) -> Result<(), AppError> {
    let mut errors = Vec::new();
    if position <= 0 {
        errors.push(FieldError::new("position", "position must be a positive integer"));
    }
    if starts_at >= ends_at {
        errors.push(FieldError::new("endsAt", "endsAt must be later than startsAt"));
    }
    AppError::check(errors)
}

pub async fn create_time_slot(db: &SqlitePool, input: TimeSlotInput) -> Result<TimeSlot, AppError> {
    validate_time_slot(input.position, input.starts_at, input.ends_at)?;
    let now = now();
    let id = sqlx::query(
        r#"INSERT INTO time_slots (position, starts_at, ends_at, active, created_at, modified_at)
           VALUES (?, ?, ?, 1, ?, ?)"#,
    )
    .bind(input.position)
    .bind(input.starts_at)
    .bind(input.ends_at)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?
    .last_insert_rowid();

    log::info!("Time slot {id} created");
    get_time_slot(db, id).await
}

pub async fn update_time_slot(db: &SqlitePool, id: i64, changes: TimeSlotChanges) -> Result<TimeSlot, AppError> {
    let current = time_slot_row(db, id, true).await?;
    let position = changes.position.unwrap_or(current.position);
    let starts_at = changes.starts_at.unwrap_or(current.starts_at);
    let ends_at = changes.ends_at.unwrap_or(current.ends_at);
    validate_time_slot(position, starts_at, ends_at)?;

    sqlx::query(
        r#"UPDATE time_slots SET position = ?, starts_at = ?, ends_at = ?, modified_at = ?
           WHERE id = ? AND active = 1"#,
    )
    .bind(position)
    .bind(starts_at)
    .bind(ends_at)
    .bind(now())
    .bind(id)
    .execute(db)
    .await?;

    get_time_slot(db, id).await
}

pub async fn delete_time_slot(db: &SqlitePool, id: i64) -> Result<TimeSlot, AppError> {
    let result = sqlx::query("UPDATE time_slots SET active = 0, modified_at = ? WHERE id = ? AND active = 1")
        .bind(now())
        .bind(id)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Time slot"));
    }
    log::info!("Time slot {id} deactivated");
    time_slot_row(db, id, false).await
}

// Services

pub async fn list_services(db: &SqlitePool, query: &PageQuery, search: &SearchQuery) -> Result<Page<Service>, AppError> {
    let request = query.validate(SERVICE_SORTABLE)?;
    let filter = search.pattern()?.map(|pattern| (&["description"][..], pattern));
    let (rows, meta) = paged::<ServiceRow>(db, "services", SERVICE_COLUMNS, &request, filter).await?;
    Ok(Page {
        items: rows.into_iter().map(Service::from).collect(),
        meta,
    })
}

async fn service_row(db: &SqlitePool, id: i64, active_only: bool) -> Result<ServiceRow, AppError> {
    let sql = format!(
        "SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?{}",
        if active_only { " AND active = 1" } else { "" }
    );
    sqlx::query_as::<_, ServiceRow>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found("Service"))
}

pub async fn get_service(db: &SqlitePool, id: i64) -> Result<Service, AppError> {
    service_row(db, id, true).await.map(Service::from)
}

fn validate_service(description: &str, price: Decimal) -> Result<i64, AppError> {
    let mut errors = Vec::new();
    check_text(&mut errors, "description", description, 3);
    let cents = price_cents(&mut errors, price);
    AppError::check(errors)?;
    Ok(cents)
}

pub async fn create_service(db: &SqlitePool, input: ServiceInput) -> Result<Service, AppError> {
    let cents = validate_service(&input.description, input.price)?;
    let now = now();
    let id = sqlx::query(
        r#"INSERT INTO services (description, price_cents, active, created_at, modified_at)
           VALUES (?, ?, 1, ?, ?)"#,
    )
    .bind(input.description.trim())
    .bind(cents)
    .bind(&now)
    .bind(&now)
    .execute(db)
    .await?
    .last_insert_rowid();

    log::info!("Service {id} created");
    get_service(db, id).await
}

pub async fn update_service(db: &SqlitePool, id: i64, changes: ServiceChanges) -> Result<Service, AppError> {
    let current = service_row(db, id, true).await?;
    let description = changes.description.unwrap_or(current.description);
    let price = changes
        .price
        .unwrap_or_else(|| from_cents(current.price_cents));
    let cents = validate_service(&description, price)?;

    sqlx::query(
        "UPDATE services SET description = ?, price_cents = ?, modified_at = ? WHERE id = ? AND active = 1",
    )
    .bind(description.trim())
    .bind(cents)
    .bind(now())
    .bind(id)
    .execute(db)
    .await?;

    get_service(db, id).await
}

pub async fn delete_service(db: &SqlitePool, id: i64) -> Result<Service, AppError> {
    let result = sqlx::query("UPDATE services SET active = 0, modified_at = ? WHERE id = ? AND active = 1")
        .bind(now())
        .bind(id)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Service"));
    }
    log::info!("Service {id} deactivated");
    service_row(db, id, false).await.map(Service::from)
}

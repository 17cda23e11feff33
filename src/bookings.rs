//! Booking lifecycle: availability, totals and line items kept consistent
//! inside one transaction per write.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::{
    auth::AuthUser,
    error::{AppError, FieldError},
    models::{BookingRow, BookingSummary, BookingView, LineItem, LineItemRow, Role},
    notify,
    pagination::{Page, PageMeta, PageQuery},
    pricing::{self, compute_total, from_cents, to_cents},
    state::{AppState, ServerEvent},
};

pub const THEME_MAX_LEN: usize = 255;

/// Public sort names mapped to columns. The first entry is the default.
pub const SORTABLE: &[(&str, &str)] = &[
    ("id", "b.id"),
    ("date", "b.date"),
    ("totalCharge", "b.total_charge_cents"),
    ("createdAt", "b.created_at"),
    ("modifiedAt", "b.modified_at"),
];

const BOOKING_SELECT: &str = r#"SELECT b.id, b.date, b.venue_id, b.time_slot_id, b.customer_id,
          b.theme, b.photo, b.venue_charge_cents, b.total_charge_cents, b.active,
          b.created_at, b.modified_at,
          v.title AS venue_title, t.starts_at, t.ends_at,
          u.first_name || ' ' || u.last_name AS customer_name
   FROM bookings b
   LEFT JOIN venues v ON b.venue_id = v.id
   LEFT JOIN time_slots t ON b.time_slot_id = t.id
   LEFT JOIN users u ON b.customer_id = u.id"#;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewLineItem {
    pub service_id: i64,
    pub charge: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewBooking {
    pub date: NaiveDate,
    pub venue_id: i64,
    pub time_slot_id: i64,
    pub theme: Option<String>,
    pub photo: Option<String>,
    #[serde(default)]
    pub services: Vec<NewLineItem>,
}

/// Fields an administrator may change. Anything else in the body is rejected.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BookingUpdate {
    pub date: Option<NaiveDate>,
    pub venue_id: Option<i64>,
    pub time_slot_id: Option<i64>,
    pub theme: Option<String>,
    pub photo: Option<String>,
    pub services: Option<Vec<NewLineItem>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingFilter {
    pub active: Option<bool>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub venue_id: Option<i64>,
}

fn check_id(errors: &mut Vec<FieldError>, field: &'static str, value: i64) {
    if value <= 0 {
        errors.push(FieldError::new(field, format!("{field} must be a positive integer")));
    }
}

fn check_theme(errors: &mut Vec<FieldError>, theme: Option<&str>) {
    if theme.is_some_and(|theme| theme.trim().chars().count() > THEME_MAX_LEN) {
        errors.push(FieldError::new(
            "theme",
            format!("theme cannot exceed {THEME_MAX_LEN} characters"),
        ));
    }
}

fn check_items(errors: &mut Vec<FieldError>, items: &[NewLineItem]) {
    for item in items {
        if item.service_id <= 0 {
            errors.push(FieldError::new(
                "services",
                "every service needs a positive serviceId",
            ));
        }
        if item.charge.is_sign_negative() || to_cents(item.charge).is_none() {
            errors.push(FieldError::new(
                "services",
                "every service charge must be a non-negative amount",
            ));
        }
    }
}

impl NewLineItem {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();
        check_items(&mut errors, std::slice::from_ref(self));
        AppError::check(errors)
    }
}

impl NewBooking {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();
        check_id(&mut errors, "venueId", self.venue_id);
        check_id(&mut errors, "timeSlotId", self.time_slot_id);
        check_theme(&mut errors, self.theme.as_deref());
        check_items(&mut errors, &self.services);
        AppError::check(errors)
    }
}

impl BookingUpdate {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();
        if let Some(venue_id) = self.venue_id {
            check_id(&mut errors, "venueId", venue_id);
        }
        if let Some(time_slot_id) = self.time_slot_id {
            check_id(&mut errors, "timeSlotId", time_slot_id);
        }
        check_theme(&mut errors, self.theme.as_deref());
        if let Some(items) = &self.services {
            check_items(&mut errors, items);
        }
        AppError::check(errors)
    }

    fn moves_slot(&self) -> bool {
        self.date.is_some() || self.venue_id.is_some() || self.time_slot_id.is_some()
    }
}

fn normalize(text: Option<String>) -> Option<String> {
    text.map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

fn cents(amount: Decimal, field: &'static str) -> Result<i64, AppError> {
    to_cents(amount).ok_or_else(|| {
        AppError::Validation(vec![FieldError::new(field, "amount is out of range")])
    })
}

fn conflict_on_unique(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::slot_taken(),
        _ => AppError::Database(err),
    }
}

fn require_admin(caller: &AuthUser, message: &str) -> Result<(), AppError> {
    if caller.role.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden(message.to_string()))
    }
}

/// True when no active booking other than `exclude` holds the venue, slot and date.
pub async fn is_available(
    conn: &mut SqliteConnection,
    venue_id: i64,
    time_slot_id: i64,
    date: NaiveDate,
    exclude: Option<i64>,
) -> Result<bool, sqlx::Error> {
    let taken = sqlx::query_scalar::<_, i64>(
        r#"SELECT COUNT(*) FROM bookings
           WHERE venue_id = ? AND time_slot_id = ? AND date = ? AND active = 1
             AND (? IS NULL OR id <> ?)"#,
    )
    .bind(venue_id)
    .bind(time_slot_id)
    .bind(date)
    .bind(exclude)
    .bind(exclude)
    .fetch_one(&mut *conn)
    .await?;
    Ok(taken == 0)
}

async fn venue_price(conn: &mut SqliteConnection, venue_id: i64) -> Result<i64, AppError> {
    sqlx::query_scalar::<_, i64>("SELECT price_cents FROM venues WHERE id = ? AND active = 1")
        .bind(venue_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| AppError::not_found("Venue"))
}

/// Current price of the booked venue, even if it has since left the catalog.
async fn booked_venue_price(
    conn: &mut SqliteConnection,
    venue_id: i64,
    fallback_cents: i64,
) -> Result<i64, AppError> {
    let price = sqlx::query_scalar::<_, i64>("SELECT price_cents FROM venues WHERE id = ?")
        .bind(venue_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(price.unwrap_or(fallback_cents))
}

async fn ensure_time_slot(conn: &mut SqliteConnection, time_slot_id: i64) -> Result<(), AppError> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM time_slots WHERE id = ? AND active = 1")
        .bind(time_slot_id)
        .fetch_optional(&mut *conn)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::not_found("Time slot"))
}

async fn ensure_services(conn: &mut SqliteConnection, items: &[NewLineItem]) -> Result<(), AppError> {
    for item in items {
        let found = sqlx::query_scalar::<_, i64>("SELECT id FROM services WHERE id = ? AND active = 1")
            .bind(item.service_id)
            .fetch_optional(&mut *conn)
            .await?;
        if found.is_none() {
            return Err(AppError::NotFound(format!(
                "Service {} not found",
                item.service_id
            )));
        }
    }
    Ok(())
}

async fn insert_line_items(
    conn: &mut SqliteConnection,
    booking_id: i64,
    items: &[NewLineItem],
    now: &str,
) -> Result<(), AppError> {
    for item in items {
        sqlx::query(
            r#"INSERT INTO booking_services (booking_id, service_id, charge_cents, created_at, modified_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(booking_id)
        .bind(item.service_id)
        .bind(cents(item.charge, "services")?)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn line_item_charges(conn: &mut SqliteConnection, booking_id: i64) -> Result<Vec<Decimal>, sqlx::Error> {
    let charges = sqlx::query_scalar::<_, i64>(
        "SELECT charge_cents FROM booking_services WHERE booking_id = ? ORDER BY id",
    )
    .bind(booking_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(charges.into_iter().map(from_cents).collect())
}

#[derive(sqlx::FromRow)]
struct CurrentBooking {
    date: NaiveDate,
    venue_id: i64,
    time_slot_id: i64,
    theme: Option<String>,
    photo: Option<String>,
    venue_charge_cents: i64,
    total_charge_cents: i64,
}

async fn active_booking(conn: &mut SqliteConnection, id: i64) -> Result<CurrentBooking, AppError> {
    sqlx::query_as::<_, CurrentBooking>(
        r#"SELECT date, venue_id, time_slot_id, theme, photo, venue_charge_cents, total_charge_cents
           FROM bookings
           WHERE id = ? AND active = 1"#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::not_found("Booking"))
}

/// Re-derives the total from the stored base charge and line items.
async fn refresh_total(
    conn: &mut SqliteConnection,
    booking_id: i64,
    venue_charge_cents: i64,
    now: &str,
) -> Result<(), AppError> {
    let charges = line_item_charges(conn, booking_id).await?;
    let total = compute_total(from_cents(venue_charge_cents), &charges);
    sqlx::query("UPDATE bookings SET total_charge_cents = ?, modified_at = ? WHERE id = ?")
        .bind(cents(total, "totalCharge")?)
        .bind(now)
        .bind(booking_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Booking with its line items, active or not.
pub async fn fetch(conn: &mut SqliteConnection, id: i64) -> Result<Option<BookingView>, sqlx::Error> {
    let row = sqlx::query_as::<_, BookingRow>(&format!("{BOOKING_SELECT} WHERE b.id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };

    let services = sqlx::query_as::<_, LineItemRow>(
        r#"SELECT bs.id, bs.booking_id, bs.service_id, s.description, bs.charge_cents,
                  bs.created_at, bs.modified_at
           FROM booking_services bs
           LEFT JOIN services s ON bs.service_id = s.id
           WHERE bs.booking_id = ?
           ORDER BY bs.id"#,
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(LineItem::from)
    .collect();

    Ok(Some(BookingView {
        booking: BookingSummary::from(row),
        services,
    }))
}

async fn reload(state: &AppState, id: i64) -> Result<BookingView, AppError> {
    let mut conn = state.db.acquire().await?;
    fetch(&mut conn, id)
        .await?
        .ok_or_else(|| AppError::not_found("Booking"))
}

async fn reload_and_publish(state: &AppState, id: i64, kind: &str) -> Result<BookingView, AppError> {
    let view = reload(state, id).await?;
    state.publish(ServerEvent::from_booking(kind, &view));
    Ok(view)
}

pub async fn create(state: &AppState, caller: &AuthUser, input: NewBooking) -> Result<BookingView, AppError> {
    if !matches!(caller.role, Role::Admin | Role::Customer) {
        return Err(AppError::Forbidden(
            "Only administrators and customers can create bookings".to_string(),
        ));
    }
    input.validate()?;

    let mut tx = state.db.begin().await?;

    let venue_charge_cents = venue_price(&mut tx, input.venue_id).await?;
    ensure_time_slot(&mut tx, input.time_slot_id).await?;
    ensure_services(&mut tx, &input.services).await?;

    if !is_available(&mut tx, input.venue_id, input.time_slot_id, input.date, None).await? {
        return Err(AppError::slot_taken());
    }

    let charges: Vec<Decimal> = input.services.iter().map(|item| pricing::round(item.charge)).collect();
    let total = compute_total(from_cents(venue_charge_cents), &charges);
    let now = Utc::now().to_rfc3339();

    let booking_id = sqlx::query(
        r#"INSERT INTO bookings (date, venue_id, time_slot_id, customer_id, theme, photo,
                                 venue_charge_cents, total_charge_cents, active, created_at, modified_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)"#,
    )
    .bind(input.date)
    .bind(input.venue_id)
    .bind(input.time_slot_id)
    .bind(caller.id)
    .bind(normalize(input.theme))
    .bind(normalize(input.photo))
    .bind(venue_charge_cents)
    .bind(cents(total, "totalCharge")?)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await
    .map_err(conflict_on_unique)?
    .last_insert_rowid();

    insert_line_items(&mut tx, booking_id, &input.services, &now).await?;
    tx.commit().await?;

    log::info!(
        "Booking {booking_id} created by {} for venue {} on {}",
        caller.email,
        input.venue_id,
        input.date
    );

    notify::dispatch_booking_created(state, booking_id).await;
    reload_and_publish(state, booking_id, "booking_created").await
}

pub async fn update(
    state: &AppState,
    caller: &AuthUser,
    id: i64,
    changes: BookingUpdate,
) -> Result<BookingView, AppError> {
    require_admin(caller, "Only administrators can modify bookings")?;
    changes.validate()?;

    let mut tx = state.db.begin().await?;
    let current = active_booking(&mut tx, id).await?;

    let date = changes.date.unwrap_or(current.date);
    let venue_id = changes.venue_id.unwrap_or(current.venue_id);
    let time_slot_id = changes.time_slot_id.unwrap_or(current.time_slot_id);
    let venue_changed = venue_id != current.venue_id;

    let new_venue_price = if venue_changed {
        Some(venue_price(&mut tx, venue_id).await?)
    } else {
        None
    };
    if changes.time_slot_id.is_some_and(|slot| slot != current.time_slot_id) {
        ensure_time_slot(&mut tx, time_slot_id).await?;
    }
    if changes.moves_slot() && !is_available(&mut tx, venue_id, time_slot_id, date, Some(id)).await? {
        return Err(AppError::slot_taken());
    }

    let now = Utc::now().to_rfc3339();
    let (venue_charge_cents, total_charge_cents) = match &changes.services {
        Some(items) => {
            ensure_services(&mut tx, items).await?;
            let base = match new_venue_price {
                Some(price) => price,
                None => booked_venue_price(&mut tx, venue_id, current.venue_charge_cents).await?,
            };
            sqlx::query("DELETE FROM booking_services WHERE booking_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            insert_line_items(&mut tx, id, items, &now).await?;
            let charges: Vec<Decimal> = items.iter().map(|item| pricing::round(item.charge)).collect();
            let total = compute_total(from_cents(base), &charges);
            (base, cents(total, "totalCharge")?)
        }
        None => match new_venue_price {
            Some(base) => {
                let charges = line_item_charges(&mut tx, id).await?;
                let total = compute_total(from_cents(base), &charges);
                (base, cents(total, "totalCharge")?)
            }
            None => (current.venue_charge_cents, current.total_charge_cents),
        },
    };

    let theme = match changes.theme {
        Some(theme) => normalize(Some(theme)),
        None => current.theme,
    };
    let photo = match changes.photo {
        Some(photo) => normalize(Some(photo)),
        None => current.photo,
    };

    let updated = sqlx::query(
        r#"UPDATE bookings
           SET date = ?, venue_id = ?, time_slot_id = ?, theme = ?, photo = ?,
               venue_charge_cents = ?, total_charge_cents = ?, modified_at = ?
           WHERE id = ? AND active = 1"#,
    )
    .bind(date)
    .bind(venue_id)
    .bind(time_slot_id)
    .bind(theme)
    .bind(photo)
    .bind(venue_charge_cents)
    .bind(total_charge_cents)
    .bind(&now)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(conflict_on_unique)?;

    if updated.rows_affected() == 0 {
        return Err(AppError::not_found("Booking"));
    }
    tx.commit().await?;

    log::info!("Booking {id} updated by {}", caller.email);
    reload_and_publish(state, id, "booking_updated").await
}

pub async fn soft_delete(state: &AppState, caller: &AuthUser, id: i64) -> Result<BookingView, AppError> {
    require_admin(caller, "Only administrators can delete bookings")?;

    let now = Utc::now().to_rfc3339();
    let deleted = sqlx::query("UPDATE bookings SET active = 0, modified_at = ? WHERE id = ? AND active = 1")
        .bind(&now)
        .bind(id)
        .execute(&state.db)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(AppError::not_found("Booking"));
    }

    log::info!("Booking {id} deactivated by {}", caller.email);
    reload_and_publish(state, id, "booking_deleted").await
}

pub async fn add_line_item(
    state: &AppState,
    caller: &AuthUser,
    booking_id: i64,
    item: NewLineItem,
) -> Result<BookingView, AppError> {
    require_admin(caller, "Only administrators can modify bookings")?;
    item.validate()?;

    let mut tx = state.db.begin().await?;
    let current = active_booking(&mut tx, booking_id).await?;
    ensure_services(&mut tx, std::slice::from_ref(&item)).await?;

    let now = Utc::now().to_rfc3339();
    insert_line_items(&mut tx, booking_id, std::slice::from_ref(&item), &now).await?;
    refresh_total(&mut tx, booking_id, current.venue_charge_cents, &now).await?;
    tx.commit().await?;

    reload_and_publish(state, booking_id, "booking_updated").await
}

pub async fn remove_line_item(
    state: &AppState,
    caller: &AuthUser,
    booking_id: i64,
    item_id: i64,
) -> Result<BookingView, AppError> {
    require_admin(caller, "Only administrators can modify bookings")?;

    let mut tx = state.db.begin().await?;
    let current = active_booking(&mut tx, booking_id).await?;

    let removed = sqlx::query("DELETE FROM booking_services WHERE id = ? AND booking_id = ?")
        .bind(item_id)
        .bind(booking_id)
        .execute(&mut *tx)
        .await?;
    if removed.rows_affected() == 0 {
        return Err(AppError::not_found("Booking service"));
    }

    let now = Utc::now().to_rfc3339();
    refresh_total(&mut tx, booking_id, current.venue_charge_cents, &now).await?;
    tx.commit().await?;

    reload_and_publish(state, booking_id, "booking_updated").await
}

pub async fn get(state: &AppState, caller: &AuthUser, id: i64) -> Result<BookingView, AppError> {
    let view = reload(state, id).await?;
    if caller.role == Role::Customer && view.booking.customer_id != caller.id {
        return Err(AppError::Forbidden(
            "You can only view your own bookings".to_string(),
        ));
    }
    Ok(view)
}

fn push_filters<'a>(builder: &mut QueryBuilder<'a, Sqlite>, caller: &AuthUser, filter: &BookingFilter) {
    builder.push(" WHERE b.active = ");
    builder.push_bind(filter.active.unwrap_or(true));
    if caller.role == Role::Customer {
        builder.push(" AND b.customer_id = ");
        builder.push_bind(caller.id);
    }
    if let Some(from) = filter.from {
        builder.push(" AND b.date >= ");
        builder.push_bind(from);
    }
    if let Some(to) = filter.to {
        builder.push(" AND b.date <= ");
        builder.push_bind(to);
    }
    if let Some(venue_id) = filter.venue_id {
        builder.push(" AND b.venue_id = ");
        builder.push_bind(venue_id);
    }
}

/// Customers only ever see their own bookings.
pub async fn list(
    state: &AppState,
    caller: &AuthUser,
    query: &PageQuery,
    filter: &BookingFilter,
) -> Result<Page<BookingSummary>, AppError> {
    let request = query.validate(SORTABLE)?;
    if let (Some(from), Some(to)) = (filter.from, filter.to) {
        if from > to {
            return Err(AppError::Validation(vec![FieldError::new(
                "from",
                "from must not be after to",
            )]));
        }
    }

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM bookings b");
    push_filters(&mut count, caller, filter);
    let total = count
        .build_query_scalar::<i64>()
        .fetch_one(&state.db)
        .await?;

    let mut select = QueryBuilder::<Sqlite>::new(BOOKING_SELECT);
    push_filters(&mut select, caller, filter);
    select.push(request.order_clause());
    let items = select
        .build_query_as::<BookingRow>()
        .fetch_all(&state.db)
        .await?
        .into_iter()
        .map(BookingSummary::from)
        .collect();

    Ok(Page {
        items,
        meta: PageMeta::new(&request, total),
    })
}

#[cfg(test)]
mod tests {
    use std::{
        str::FromStr,
        sync::{Arc, Mutex},
    };

    use async_trait::async_trait;
    use sqlx::SqlitePool;

    use super::*;
    use crate::{
        db::{connect, run_migrations},
        notify::{BookingNotice, Notifier, NotifyError},
    };

    #[derive(Default)]
    struct RecordingNotifier {
        customers: Mutex<Vec<i64>>,
        admins: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify_customer(&self, notice: &BookingNotice) -> Result<(), NotifyError> {
            self.customers.lock().unwrap().push(notice.booking_id);
            Ok(())
        }

        async fn notify_admins(
            &self,
            _notice: &BookingNotice,
            recipients: &[String],
        ) -> Result<(), NotifyError> {
            self.admins.lock().unwrap().push(recipients.to_vec());
            Ok(())
        }
    }

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify_customer(&self, _notice: &BookingNotice) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("smtp down".into()))
        }

        async fn notify_admins(
            &self,
            _notice: &BookingNotice,
            _recipients: &[String],
        ) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery("smtp down".into()))
        }
    }

    struct Fixture {
        state: AppState,
        admin: AuthUser,
        customer: AuthUser,
        other_customer: AuthUser,
        staff: AuthUser,
        hall: i64,
        garden: i64,
        noon: i64,
        evening: i64,
        catering: i64,
        music: i64,
    }

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    async fn insert_user(pool: &SqlitePool, email: &str, role: Role) -> AuthUser {
        let id = sqlx::query(
            r#"INSERT INTO users (first_name, last_name, email, password_hash, role, active, created_at, modified_at)
               VALUES ('Test', 'User', ?, 'unused', ?, 1, 'now', 'now')"#,
        )
        .bind(email)
        .bind(i64::from(role))
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid();
        AuthUser {
            id,
            display_name: "Test User".into(),
            email: email.into(),
            role,
        }
    }

    async fn insert_venue(pool: &SqlitePool, title: &str, price_cents: i64) -> i64 {
        sqlx::query(
            r#"INSERT INTO venues (title, address, price_cents, active, created_at, modified_at)
               VALUES (?, 'Main St 123', ?, 1, 'now', 'now')"#,
        )
        .bind(title)
        .bind(price_cents)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    async fn insert_slot(pool: &SqlitePool, position: i64, starts: &str, ends: &str) -> i64 {
        sqlx::query(
            r#"INSERT INTO time_slots (position, starts_at, ends_at, active, created_at, modified_at)
               VALUES (?, ?, ?, 1, 'now', 'now')"#,
        )
        .bind(position)
        .bind(starts)
        .bind(ends)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    async fn insert_service(pool: &SqlitePool, description: &str, price_cents: i64) -> i64 {
        sqlx::query(
            r#"INSERT INTO services (description, price_cents, active, created_at, modified_at)
               VALUES (?, ?, 1, 'now', 'now')"#,
        )
        .bind(description)
        .bind(price_cents)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    async fn fixture(notifier: Arc<dyn Notifier>) -> Fixture {
        let pool = connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();

        let admin = insert_user(&pool, "admin@venues.local", Role::Admin).await;
        let customer = insert_user(&pool, "ana@example.com", Role::Customer).await;
        let other_customer = insert_user(&pool, "bob@example.com", Role::Customer).await;
        let staff = insert_user(&pool, "staff@venues.local", Role::Staff).await;
        let hall = insert_venue(&pool, "Sunny Hall", 50_000).await;
        let garden = insert_venue(&pool, "Green Garden", 80_000).await;
        let noon = insert_slot(&pool, 1, "12:00:00", "14:00:00").await;
        let evening = insert_slot(&pool, 2, "18:00:00", "20:00:00").await;
        let catering = insert_service(&pool, "Catering", 10_000).await;
        let music = insert_service(&pool, "Music", 5_000).await;

        Fixture {
            state: AppState::new(pool, notifier, 16),
            admin,
            customer,
            other_customer,
            staff,
            hall,
            garden,
            noon,
            evening,
            catering,
            music,
        }
    }

    impl Fixture {
        fn booking(&self, on: &str) -> NewBooking {
            NewBooking {
                date: date(on),
                venue_id: self.hall,
                time_slot_id: self.noon,
                theme: Some("Superheroes".into()),
                photo: None,
                services: vec![
                    NewLineItem {
                        service_id: self.catering,
                        charge: dec("100.00"),
                    },
                    NewLineItem {
                        service_id: self.music,
                        charge: dec("50.00"),
                    },
                ],
            }
        }
    }

    async fn active_count(state: &AppState) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE active = 1")
            .fetch_one(&state.db)
            .await
            .unwrap()
    }

    #[actix_web::test]
    async fn test_create_computes_total_and_notifies() {
        let notifier = Arc::new(RecordingNotifier::default());
        let fx = fixture(notifier.clone()).await;

        let view = create(&fx.state, &fx.customer, fx.booking("2025-11-15"))
            .await
            .unwrap();

        assert_eq!(view.booking.venue_charge.to_string(), "500.00");
        assert_eq!(view.booking.total_charge.to_string(), "650.00");
        assert_eq!(view.booking.customer_id, fx.customer.id);
        assert_eq!(view.booking.venue_title.as_deref(), Some("Sunny Hall"));
        assert_eq!(view.services.len(), 2);
        assert_eq!(view.services[0].description.as_deref(), Some("Catering"));
        assert!(view.booking.active);

        assert_eq!(*notifier.customers.lock().unwrap(), vec![view.booking.id]);
        assert_eq!(
            *notifier.admins.lock().unwrap(),
            vec![vec!["admin@venues.local".to_string()]]
        );
    }

    #[actix_web::test]
    async fn test_create_without_services_charges_venue_only() {
        let fx = fixture(Arc::new(RecordingNotifier::default())).await;
        let mut input = fx.booking("2025-11-15");
        input.services.clear();
        input.theme = Some("   ".into());

        let view = create(&fx.state, &fx.admin, input).await.unwrap();
        assert_eq!(view.booking.total_charge.to_string(), "500.00");
        assert!(view.services.is_empty());
        assert_eq!(view.booking.theme, None);
    }

    #[actix_web::test]
    async fn test_double_booking_is_rejected() {
        let fx = fixture(Arc::new(RecordingNotifier::default())).await;
        create(&fx.state, &fx.customer, fx.booking("2025-11-15"))
            .await
            .unwrap();

        let err = create(&fx.state, &fx.other_customer, fx.booking("2025-11-15"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(active_count(&fx.state).await, 1);

        let mut other_slot = fx.booking("2025-11-15");
        other_slot.time_slot_id = fx.evening;
        assert!(create(&fx.state, &fx.other_customer, other_slot).await.is_ok());
    }

    #[actix_web::test]
    async fn test_unique_index_backs_the_availability_check() {
        let fx = fixture(Arc::new(RecordingNotifier::default())).await;
        create(&fx.state, &fx.customer, fx.booking("2025-11-15"))
            .await
            .unwrap();

        let err = sqlx::query(
            r#"INSERT INTO bookings (date, venue_id, time_slot_id, customer_id, venue_charge_cents,
                                     total_charge_cents, active, created_at, modified_at)
               VALUES (?, ?, ?, ?, 0, 0, 1, 'now', 'now')"#,
        )
        .bind(date("2025-11-15"))
        .bind(fx.hall)
        .bind(fx.noon)
        .bind(fx.customer.id)
        .execute(&fx.state.db)
        .await
        .unwrap_err();
        assert!(matches!(conflict_on_unique(err), AppError::Conflict(_)));
    }

    #[actix_web::test]
    async fn test_availability_excludes_given_booking() {
        let fx = fixture(Arc::new(RecordingNotifier::default())).await;
        let view = create(&fx.state, &fx.customer, fx.booking("2025-11-15"))
            .await
            .unwrap();
        let id = view.booking.id;

        let mut conn = fx.state.db.acquire().await.unwrap();
        let day = date("2025-11-15");
        assert!(!is_available(&mut conn, fx.hall, fx.noon, day, None).await.unwrap());
        assert!(is_available(&mut conn, fx.hall, fx.noon, day, Some(id)).await.unwrap());
        assert!(is_available(&mut conn, fx.garden, fx.noon, day, None).await.unwrap());
    }

    #[actix_web::test]
    async fn test_missing_references_are_not_found() {
        let fx = fixture(Arc::new(RecordingNotifier::default())).await;

        let mut input = fx.booking("2025-11-15");
        input.venue_id = 999;
        let err = create(&fx.state, &fx.customer, input).await.unwrap_err();
        assert_eq!(err.to_string(), "Venue not found");

        let mut input = fx.booking("2025-11-15");
        input.time_slot_id = 999;
        let err = create(&fx.state, &fx.customer, input).await.unwrap_err();
        assert_eq!(err.to_string(), "Time slot not found");

        let mut input = fx.booking("2025-11-15");
        input.services[1].service_id = 999;
        let err = create(&fx.state, &fx.customer, input).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(active_count(&fx.state).await, 0);
    }

    #[actix_web::test]
    async fn test_create_validates_payload() {
        let fx = fixture(Arc::new(RecordingNotifier::default())).await;
        let mut input = fx.booking("2025-11-15");
        input.venue_id = 0;
        input.theme = Some("x".repeat(THEME_MAX_LEN + 1));
        input.services[0].charge = dec("-1");

        match create(&fx.state, &fx.customer, input).await {
            Err(AppError::Validation(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
                assert_eq!(fields, vec!["venueId", "theme", "services"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[actix_web::test]
    async fn test_role_guards() {
        let fx = fixture(Arc::new(RecordingNotifier::default())).await;
        let err = create(&fx.state, &fx.staff, fx.booking("2025-11-15"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let view = create(&fx.state, &fx.customer, fx.booking("2025-11-15"))
            .await
            .unwrap();
        let id = view.booking.id;

        let err = update(&fx.state, &fx.customer, id, BookingUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = soft_delete(&fx.state, &fx.customer, id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = remove_line_item(&fx.state, &fx.staff, id, view.services[0].id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        // Forbidden wins over NotFound.
        let err = soft_delete(&fx.state, &fx.staff, 999).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[actix_web::test]
    async fn test_notification_failure_keeps_booking() {
        let fx = fixture(Arc::new(FailingNotifier)).await;
        let view = create(&fx.state, &fx.customer, fx.booking("2025-11-15"))
            .await
            .unwrap();
        assert_eq!(view.booking.total_charge.to_string(), "650.00");
        assert_eq!(active_count(&fx.state).await, 1);
    }

    #[actix_web::test]
    async fn test_update_in_place_excludes_itself() {
        let fx = fixture(Arc::new(RecordingNotifier::default())).await;
        let view = create(&fx.state, &fx.customer, fx.booking("2025-11-15"))
            .await
            .unwrap();

        let changes = BookingUpdate {
            date: Some(date("2025-11-15")),
            theme: Some("Pirates".into()),
            ..BookingUpdate::default()
        };
        let updated = update(&fx.state, &fx.admin, view.booking.id, changes)
            .await
            .unwrap();
        assert_eq!(updated.booking.theme.as_deref(), Some("Pirates"));
        assert_eq!(updated.booking.total_charge.to_string(), "650.00");
        assert_eq!(updated.services.len(), 2);
    }

    #[actix_web::test]
    async fn test_update_into_taken_slot_conflicts() {
        let fx = fixture(Arc::new(RecordingNotifier::default())).await;
        create(&fx.state, &fx.customer, fx.booking("2025-11-15"))
            .await
            .unwrap();
        let second = create(&fx.state, &fx.customer, fx.booking("2025-11-16"))
            .await
            .unwrap();

        let changes = BookingUpdate {
            date: Some(date("2025-11-15")),
            ..BookingUpdate::default()
        };
        let err = update(&fx.state, &fx.admin, second.booking.id, changes)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let unchanged = get(&fx.state, &fx.admin, second.booking.id).await.unwrap();
        assert_eq!(unchanged.booking.date, date("2025-11-16"));
    }

    #[actix_web::test]
    async fn test_update_replaces_line_items() {
        let fx = fixture(Arc::new(RecordingNotifier::default())).await;
        let view = create(&fx.state, &fx.customer, fx.booking("2025-11-15"))
            .await
            .unwrap();

        let changes = BookingUpdate {
            services: Some(vec![NewLineItem {
                service_id: fx.music,
                charge: dec("75.00"),
            }]),
            ..BookingUpdate::default()
        };
        let updated = update(&fx.state, &fx.admin, view.booking.id, changes)
            .await
            .unwrap();
        assert_eq!(updated.services.len(), 1);
        assert_eq!(updated.services[0].service_id, fx.music);
        assert_eq!(updated.booking.total_charge.to_string(), "575.00");

        let cleared = update(
            &fx.state,
            &fx.admin,
            view.booking.id,
            BookingUpdate {
                services: Some(Vec::new()),
                ..BookingUpdate::default()
            },
        )
        .await
        .unwrap();
        assert!(cleared.services.is_empty());
        assert_eq!(cleared.booking.total_charge.to_string(), "500.00");
    }

    #[actix_web::test]
    async fn test_replacing_items_survives_venue_leaving_catalog() {
        let fx = fixture(Arc::new(RecordingNotifier::default())).await;
        let view = create(&fx.state, &fx.customer, fx.booking("2025-11-15"))
            .await
            .unwrap();
        sqlx::query("UPDATE venues SET active = 0 WHERE id = ?")
            .bind(fx.hall)
            .execute(&fx.state.db)
            .await
            .unwrap();

        let changes = BookingUpdate {
            services: Some(vec![NewLineItem {
                service_id: fx.catering,
                charge: dec("120.00"),
            }]),
            ..BookingUpdate::default()
        };
        let updated = update(&fx.state, &fx.admin, view.booking.id, changes)
            .await
            .unwrap();
        assert_eq!(updated.booking.venue_charge.to_string(), "500.00");
        assert_eq!(updated.booking.total_charge.to_string(), "620.00");

        // Moving another booking onto the inactive venue is still refused.
        let other = create(&fx.state, &fx.customer, NewBooking {
            venue_id: fx.garden,
            ..fx.booking("2025-11-20")
        })
        .await
        .unwrap();
        let refused = update(
            &fx.state,
            &fx.admin,
            other.booking.id,
            BookingUpdate {
                venue_id: Some(fx.hall),
                ..BookingUpdate::default()
            },
        )
        .await;
        assert!(matches!(refused, Err(AppError::NotFound(_))));
    }

    #[actix_web::test]
    async fn test_venue_change_rederives_charges() {
        let fx = fixture(Arc::new(RecordingNotifier::default())).await;
        let view = create(&fx.state, &fx.customer, fx.booking("2025-11-15"))
            .await
            .unwrap();

        let changes = BookingUpdate {
            venue_id: Some(fx.garden),
            ..BookingUpdate::default()
        };
        let updated = update(&fx.state, &fx.admin, view.booking.id, changes)
            .await
            .unwrap();
        assert_eq!(updated.booking.venue_charge.to_string(), "800.00");
        assert_eq!(updated.booking.total_charge.to_string(), "950.00");
        assert_eq!(updated.services.len(), 2);
    }

    #[actix_web::test]
    async fn test_update_missing_booking() {
        let fx = fixture(Arc::new(RecordingNotifier::default())).await;
        let err = update(&fx.state, &fx.admin, 42, BookingUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[actix_web::test]
    async fn test_soft_delete_twice() {
        let fx = fixture(Arc::new(RecordingNotifier::default())).await;
        let view = create(&fx.state, &fx.customer, fx.booking("2025-11-15"))
            .await
            .unwrap();
        let mut events = fx.state.events.subscribe();

        let deleted = soft_delete(&fx.state, &fx.admin, view.booking.id)
            .await
            .unwrap();
        assert!(!deleted.booking.active);
        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, "booking_deleted");
        assert_eq!(event.booking_id, view.booking.id);

        let err = soft_delete(&fx.state, &fx.admin, view.booking.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        // The slot frees up once the booking is inactive.
        assert!(create(&fx.state, &fx.other_customer, fx.booking("2025-11-15"))
            .await
            .is_ok());
    }

    #[actix_web::test]
    async fn test_inactive_booking_cannot_be_updated() {
        let fx = fixture(Arc::new(RecordingNotifier::default())).await;
        let view = create(&fx.state, &fx.customer, fx.booking("2025-11-15"))
            .await
            .unwrap();
        soft_delete(&fx.state, &fx.admin, view.booking.id)
            .await
            .unwrap();

        let err = update(&fx.state, &fx.admin, view.booking.id, BookingUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[actix_web::test]
    async fn test_incremental_line_items() {
        let fx = fixture(Arc::new(RecordingNotifier::default())).await;
        let mut input = fx.booking("2025-11-15");
        input.services.truncate(1);
        let view = create(&fx.state, &fx.customer, input).await.unwrap();
        assert_eq!(view.booking.total_charge.to_string(), "600.00");

        let added = add_line_item(
            &fx.state,
            &fx.admin,
            view.booking.id,
            NewLineItem {
                service_id: fx.music,
                charge: dec("49.99"),
            },
        )
        .await
        .unwrap();
        assert_eq!(added.services.len(), 2);
        assert_eq!(added.booking.total_charge.to_string(), "649.99");

        let removed = remove_line_item(&fx.state, &fx.admin, view.booking.id, added.services[0].id)
            .await
            .unwrap();
        assert_eq!(removed.services.len(), 1);
        assert_eq!(removed.booking.total_charge.to_string(), "549.99");

        let err = remove_line_item(&fx.state, &fx.admin, view.booking.id, added.services[0].id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[actix_web::test]
    async fn test_customers_only_read_their_own() {
        let fx = fixture(Arc::new(RecordingNotifier::default())).await;
        let mine = create(&fx.state, &fx.customer, fx.booking("2025-11-15"))
            .await
            .unwrap();
        create(&fx.state, &fx.other_customer, fx.booking("2025-11-16"))
            .await
            .unwrap();

        let err = get(&fx.state, &fx.other_customer, mine.booking.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert!(get(&fx.state, &fx.staff, mine.booking.id).await.is_ok());

        let page = list(&fx.state, &fx.customer, &PageQuery::default(), &BookingFilter::default())
            .await
            .unwrap();
        assert_eq!(page.meta.total, 1);
        assert_eq!(page.items[0].id, mine.booking.id);

        let page = list(&fx.state, &fx.admin, &PageQuery::default(), &BookingFilter::default())
            .await
            .unwrap();
        assert_eq!(page.meta.total, 2);
    }

    #[actix_web::test]
    async fn test_list_filters_and_sorting() {
        let fx = fixture(Arc::new(RecordingNotifier::default())).await;
        let first = create(&fx.state, &fx.customer, fx.booking("2025-11-15"))
            .await
            .unwrap();
        let mut garden = fx.booking("2025-12-01");
        garden.venue_id = fx.garden;
        create(&fx.state, &fx.customer, garden).await.unwrap();
        soft_delete(&fx.state, &fx.admin, first.booking.id)
            .await
            .unwrap();

        let active = list(&fx.state, &fx.admin, &PageQuery::default(), &BookingFilter::default())
            .await
            .unwrap();
        assert_eq!(active.meta.total, 1);
        assert_eq!(active.items[0].venue_id, fx.garden);

        let inactive = BookingFilter {
            active: Some(false),
            ..BookingFilter::default()
        };
        let page = list(&fx.state, &fx.admin, &PageQuery::default(), &inactive)
            .await
            .unwrap();
        assert_eq!(page.items[0].id, first.booking.id);

        let december = BookingFilter {
            from: Some(date("2025-12-01")),
            to: Some(date("2025-12-31")),
            venue_id: Some(fx.hall),
            ..BookingFilter::default()
        };
        let page = list(&fx.state, &fx.admin, &PageQuery::default(), &december)
            .await
            .unwrap();
        assert_eq!(page.meta.total, 0);

        let backwards = BookingFilter {
            from: Some(date("2025-12-31")),
            to: Some(date("2025-12-01")),
            ..BookingFilter::default()
        };
        assert!(matches!(
            list(&fx.state, &fx.admin, &PageQuery::default(), &backwards).await,
            Err(AppError::Validation(_))
        ));
    }
}

//! Best-effort booking notifications.
//!
//! Delivery goes through a [`Notifier`]; the shipped [`LogNotifier`] renders the
//! message bodies and writes them to the log. Nothing here can fail a booking.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use sqlx::{SqliteConnection, SqlitePool};
use thiserror::Error;

use crate::{
    db::admin_emails,
    pricing::{from_cents, subtotal},
    state::AppState,
    templates::{render, AdminNoticeTemplate, CustomerNoticeTemplate},
};

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("render failed: {0}")]
    Render(#[from] askama::Error),

    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone)]
pub struct NoticeItem {
    pub description: String,
    pub charge: Decimal,
}

/// Everything a confirmation message shows, already formatted for people.
#[derive(Debug, Clone)]
pub struct BookingNotice {
    pub booking_id: i64,
    pub date: String,
    pub venue_title: String,
    pub venue_address: String,
    pub time_range: String,
    pub theme: String,
    pub venue_charge: Decimal,
    pub services: Vec<NoticeItem>,
    pub services_subtotal: Decimal,
    pub total: Decimal,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_customer(&self, notice: &BookingNotice) -> Result<(), NotifyError>;

    async fn notify_admins(
        &self,
        notice: &BookingNotice,
        recipients: &[String],
    ) -> Result<(), NotifyError>;
}

/// Renders notifications and logs them instead of sending mail.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_customer(&self, notice: &BookingNotice) -> Result<(), NotifyError> {
        let body = render(CustomerNoticeTemplate { notice })?;
        log::info!(
            "Booking confirmation for {} (booking {}):\n{body}",
            notice.customer_email,
            notice.booking_id
        );
        Ok(())
    }

    async fn notify_admins(
        &self,
        notice: &BookingNotice,
        recipients: &[String],
    ) -> Result<(), NotifyError> {
        let body = render(AdminNoticeTemplate { notice })?;
        log::info!(
            "New booking notice for {} (booking {}):\n{body}",
            recipients.join(", "),
            notice.booking_id
        );
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct NoticeRow {
    id: i64,
    date: NaiveDate,
    theme: Option<String>,
    venue_charge_cents: i64,
    total_charge_cents: i64,
    venue_title: Option<String>,
    venue_address: Option<String>,
    starts_at: Option<NaiveTime>,
    ends_at: Option<NaiveTime>,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
}

pub async fn load_notice(
    conn: &mut SqliteConnection,
    booking_id: i64,
) -> Result<Option<BookingNotice>, sqlx::Error> {
    let row = sqlx::query_as::<_, NoticeRow>(
        r#"SELECT b.id, b.date, b.theme, b.venue_charge_cents, b.total_charge_cents,
                  v.title AS venue_title, v.address AS venue_address,
                  t.starts_at, t.ends_at,
                  u.first_name, u.last_name, u.email, u.phone
           FROM bookings b
           LEFT JOIN venues v ON b.venue_id = v.id
           LEFT JOIN time_slots t ON b.time_slot_id = t.id
           LEFT JOIN users u ON b.customer_id = u.id
           WHERE b.id = ? AND b.active = 1"#,
    )
    .bind(booking_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let services = sqlx::query_as::<_, (Option<String>, i64)>(
        r#"SELECT s.description, bs.charge_cents
           FROM booking_services bs
           LEFT JOIN services s ON bs.service_id = s.id
           WHERE bs.booking_id = ?
           ORDER BY bs.id"#,
    )
    .bind(booking_id)
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .map(|(description, charge_cents)| NoticeItem {
        description: description.unwrap_or_else(|| "Service".to_string()),
        charge: from_cents(charge_cents),
    })
    .collect::<Vec<_>>();

    let charges: Vec<Decimal> = services.iter().map(|item| item.charge).collect();
    let time_range = match (row.starts_at, row.ends_at) {
        (Some(starts), Some(ends)) => format!("{} - {}", starts.format("%H:%M"), ends.format("%H:%M")),
        _ => "Not available".to_string(),
    };
    let customer_name = format!(
        "{} {}",
        row.first_name.unwrap_or_default(),
        row.last_name.unwrap_or_default()
    )
    .trim()
    .to_string();

    Ok(Some(BookingNotice {
        booking_id: row.id,
        date: row.date.format("%d/%m/%Y").to_string(),
        venue_title: row.venue_title.unwrap_or_default(),
        venue_address: row.venue_address.unwrap_or_default(),
        time_range,
        theme: row
            .theme
            .filter(|theme| !theme.trim().is_empty())
            .unwrap_or_else(|| "Not specified".to_string()),
        venue_charge: from_cents(row.venue_charge_cents),
        services_subtotal: subtotal(&charges),
        services,
        total: from_cents(row.total_charge_cents),
        customer_name,
        customer_email: row.email.unwrap_or_default(),
        customer_phone: row.phone.unwrap_or_else(|| "Not provided".to_string()),
    }))
}

async fn gather(pool: &SqlitePool, booking_id: i64) -> Result<Option<(BookingNotice, Vec<String>)>, sqlx::Error> {
    let mut conn = pool.acquire().await?;
    let Some(notice) = load_notice(&mut conn, booking_id).await? else {
        return Ok(None);
    };
    let admins = admin_emails(&mut conn).await?;
    Ok(Some((notice, admins)))
}

/// Tells the customer and every active administrator about a new booking.
/// Failures are logged and swallowed.
pub async fn dispatch_booking_created(state: &AppState, booking_id: i64) {
    let (notice, admins) = match gather(&state.db, booking_id).await {
        Ok(Some(found)) => found,
        Ok(None) => {
            log::warn!("Booking {booking_id} vanished before notifications were sent");
            return;
        }
        Err(err) => {
            log::warn!("Could not load booking {booking_id} for notifications: {err}");
            return;
        }
    };

    if let Err(err) = state.notifier.notify_customer(&notice).await {
        log::warn!("Customer notification for booking {booking_id} failed: {err}");
    }

    if admins.is_empty() {
        return;
    }
    if let Err(err) = state.notifier.notify_admins(&notice, &admins).await {
        log::warn!("Administrator notification for booking {booking_id} failed: {err}");
    }
}

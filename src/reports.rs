//! Booking report as JSON or as a flat CSV export.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{error::AppError, pricing::from_cents};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReportQuery {
    #[serde(default)]
    pub format: ReportFormat,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportService {
    pub description: String,
    pub charge: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBooking {
    pub booking_id: i64,
    pub date: NaiveDate,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub venue_title: String,
    pub venue_address: Option<String>,
    pub time_slot: String,
    pub time_slot_position: Option<i64>,
    pub theme: Option<String>,
    pub venue_charge: Decimal,
    pub total_charge: Decimal,
    pub services: Vec<ReportService>,
}

/// One CSV line. Bookings with several services span several lines.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    booking_id: i64,
    date: NaiveDate,
    customer_name: &'a str,
    customer_email: &'a str,
    customer_phone: &'a str,
    venue_title: &'a str,
    venue_address: &'a str,
    time_slot: &'a str,
    time_slot_position: &'a str,
    theme: &'a str,
    service_description: &'a str,
    service_charge: Decimal,
    venue_charge: Decimal,
    total_charge: Decimal,
    primary: &'a str,
}

#[derive(sqlx::FromRow)]
struct ReportRow {
    id: i64,
    date: NaiveDate,
    customer_name: Option<String>,
    customer_email: Option<String>,
    customer_phone: Option<String>,
    venue_title: Option<String>,
    venue_address: Option<String>,
    starts_at: Option<NaiveTime>,
    ends_at: Option<NaiveTime>,
    position: Option<i64>,
    theme: Option<String>,
    venue_charge_cents: i64,
    total_charge_cents: i64,
}

/// Every active booking with its services. An empty report is a 404.
pub async fn load(db: &SqlitePool) -> Result<Vec<ReportBooking>, AppError> {
    let rows = sqlx::query_as::<_, ReportRow>(
        r#"SELECT b.id, b.date,
                  u.first_name || ' ' || u.last_name AS customer_name,
                  u.email AS customer_email, u.phone AS customer_phone,
                  v.title AS venue_title, v.address AS venue_address,
                  t.starts_at, t.ends_at, t.position,
                  b.theme, b.venue_charge_cents, b.total_charge_cents
           FROM bookings b
           LEFT JOIN users u ON b.customer_id = u.id
           LEFT JOIN venues v ON b.venue_id = v.id
           LEFT JOIN time_slots t ON b.time_slot_id = t.id
           WHERE b.active = 1
           ORDER BY b.date, t.position, b.id"#,
    )
    .fetch_all(db)
    .await?;

    if rows.is_empty() {
        return Err(AppError::NotFound("No bookings to report".to_string()));
    }

    let items = sqlx::query_as::<_, (i64, Option<String>, i64)>(
        r#"SELECT bs.booking_id, s.description, bs.charge_cents
           FROM booking_services bs
           JOIN bookings b ON b.id = bs.booking_id AND b.active = 1
           LEFT JOIN services s ON s.id = bs.service_id
           ORDER BY bs.booking_id, bs.id"#,
    )
    .fetch_all(db)
    .await?;

    let mut services_by_booking: HashMap<i64, Vec<ReportService>> = HashMap::new();
    for (booking_id, description, charge) in items {
        services_by_booking
            .entry(booking_id)
            .or_default()
            .push(ReportService {
                description: description.unwrap_or_else(|| "Service".to_string()),
                charge: from_cents(charge),
            });
    }

    let report = rows
        .into_iter()
        .map(|row| {
            let services = services_by_booking.remove(&row.id).unwrap_or_default();
            let time_slot = match (row.starts_at, row.ends_at) {
                (Some(starts), Some(ends)) => {
                    format!("{} - {}", starts.format("%H:%M"), ends.format("%H:%M"))
                }
                _ => String::new(),
            };
            ReportBooking {
                booking_id: row.id,
                date: row.date,
                customer_name: row.customer_name.unwrap_or_default(),
                customer_email: row.customer_email.unwrap_or_default(),
                customer_phone: row.customer_phone,
                venue_title: row.venue_title.unwrap_or_default(),
                venue_address: row.venue_address,
                time_slot,
                time_slot_position: row.position,
                theme: row.theme,
                venue_charge: from_cents(row.venue_charge_cents),
                total_charge: from_cents(row.total_charge_cents),
                services,
            }
        })
        .collect();

    Ok(report)
}

fn csv_row<'a>(
    booking: &'a ReportBooking,
    position: &'a str,
    description: &'a str,
    charge: Decimal,
    primary: bool,
) -> CsvRow<'a> {
    CsvRow {
        booking_id: booking.booking_id,
        date: booking.date,
        customer_name: &booking.customer_name,
        customer_email: &booking.customer_email,
        customer_phone: booking.customer_phone.as_deref().unwrap_or("N/A"),
        venue_title: &booking.venue_title,
        venue_address: booking.venue_address.as_deref().unwrap_or("N/A"),
        time_slot: &booking.time_slot,
        time_slot_position: position,
        theme: booking.theme.as_deref().unwrap_or("Not specified"),
        service_description: description,
        service_charge: charge,
        venue_charge: booking.venue_charge,
        total_charge: booking.total_charge,
        primary: if primary { "Primary" } else { "" },
    }
}

pub fn to_csv(bookings: &[ReportBooking]) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    for booking in bookings {
        let position = booking
            .time_slot_position
            .map(|position| position.to_string())
            .unwrap_or_else(|| "N/A".to_string());

        if booking.services.is_empty() {
            writer.serialize(csv_row(booking, &position, "No services", Decimal::new(0, 2), true))?;
            continue;
        }
        for (index, service) in booking.services.iter().enumerate() {
            writer.serialize(csv_row(
                booking,
                &position,
                &service.description,
                service.charge,
                index == 0,
            ))?;
        }
    }

    writer
        .into_inner()
        .map_err(|err| AppError::Internal(format!("csv flush failed: {err}")))
}

//! Aggregates over active bookings for the administrator dashboard.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    pricing::{self, from_cents},
};

const TOP_CUSTOMERS: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatKind {
    General,
    Venues,
    Periods,
    Services,
    Customers,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsQuery {
    pub kind: Option<StatKind>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneralStats {
    pub total_bookings: i64,
    pub total_revenue: Decimal,
    pub monthly_average: Option<Decimal>,
    pub active_customers: i64,
    pub booked_venues: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueStats {
    pub venue_id: i64,
    pub title: String,
    pub bookings: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodStats {
    pub period: String,
    pub bookings: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub service_id: i64,
    pub description: String,
    pub times_booked: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerStats {
    pub customer_id: i64,
    pub name: String,
    pub email: String,
    pub bookings: i64,
    pub total_spent: Decimal,
    pub last_booking: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllStats {
    pub general: GeneralStats,
    pub venues: Vec<VenueStats>,
    pub periods: Vec<PeriodStats>,
    pub services: Vec<ServiceStats>,
    pub customers: Vec<CustomerStats>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Statistics {
    General(GeneralStats),
    Venues(Vec<VenueStats>),
    Periods(Vec<PeriodStats>),
    Services(Vec<ServiceStats>),
    Customers(Vec<CustomerStats>),
    All(Box<AllStats>),
}

/// Whole months from `since` to `today`, never less than one.
fn months_between(since: NaiveDate, today: NaiveDate) -> i64 {
    let mut months = i64::from(today.year() - since.year()) * 12 + i64::from(today.month())
        - i64::from(since.month());
    if today.day() < since.day() {
        months -= 1;
    }
    months.max(1)
}

pub async fn general(db: &SqlitePool, today: NaiveDate) -> Result<GeneralStats, AppError> {
    let (total_bookings, revenue_cents, first_date, active_customers, booked_venues) =
        sqlx::query_as::<_, (i64, i64, Option<NaiveDate>, i64, i64)>(
            r#"SELECT COUNT(*), COALESCE(SUM(total_charge_cents), 0), MIN(date),
                      COUNT(DISTINCT customer_id), COUNT(DISTINCT venue_id)
               FROM bookings
               WHERE active = 1"#,
        )
        .fetch_one(db)
        .await?;

    let monthly_average = first_date.map(|since| {
        let months = months_between(since, today);
        pricing::round(Decimal::from(total_bookings) / Decimal::from(months))
    });

    Ok(GeneralStats {
        total_bookings,
        total_revenue: from_cents(revenue_cents),
        monthly_average,
        active_customers,
        booked_venues,
    })
}

pub async fn by_venue(db: &SqlitePool) -> Result<Vec<VenueStats>, AppError> {
    let rows = sqlx::query_as::<_, (i64, String, i64, i64)>(
        r#"SELECT v.id, v.title, COUNT(b.id), COALESCE(SUM(b.total_charge_cents), 0)
           FROM venues v
           LEFT JOIN bookings b ON b.venue_id = v.id AND b.active = 1
           WHERE v.active = 1
           GROUP BY v.id, v.title
           ORDER BY COUNT(b.id) DESC, v.id"#,
    )
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(venue_id, title, bookings, revenue)| VenueStats {
            venue_id,
            title,
            bookings,
            revenue: from_cents(revenue),
        })
        .collect())
}

pub async fn by_period(db: &SqlitePool) -> Result<Vec<PeriodStats>, AppError> {
    let rows = sqlx::query_as::<_, (String, i64, i64)>(
        r#"SELECT strftime('%Y-%m', date) AS period, COUNT(*), COALESCE(SUM(total_charge_cents), 0)
           FROM bookings
           WHERE active = 1
           GROUP BY period
           ORDER BY period"#,
    )
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(period, bookings, revenue)| PeriodStats {
            period,
            bookings,
            revenue: from_cents(revenue),
        })
        .collect())
}

pub async fn services(db: &SqlitePool) -> Result<Vec<ServiceStats>, AppError> {
    let rows = sqlx::query_as::<_, (i64, String, i64, i64)>(
        r#"SELECT s.id, s.description, COUNT(bs.id), COALESCE(SUM(bs.charge_cents), 0)
           FROM booking_services bs
           JOIN bookings b ON b.id = bs.booking_id AND b.active = 1
           JOIN services s ON s.id = bs.service_id
           GROUP BY s.id, s.description
           ORDER BY COUNT(bs.id) DESC, s.id"#,
    )
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(service_id, description, times_booked, revenue)| ServiceStats {
            service_id,
            description,
            times_booked,
            revenue: from_cents(revenue),
        })
        .collect())
}

pub async fn top_customers(db: &SqlitePool) -> Result<Vec<CustomerStats>, AppError> {
    let rows = sqlx::query_as::<_, (i64, String, String, i64, i64, NaiveDate)>(
        r#"SELECT u.id, u.first_name || ' ' || u.last_name, u.email,
                  COUNT(b.id), COALESCE(SUM(b.total_charge_cents), 0), MAX(b.date)
           FROM bookings b
           JOIN users u ON u.id = b.customer_id
           WHERE b.active = 1
           GROUP BY u.id, u.first_name, u.last_name, u.email
           ORDER BY COUNT(b.id) DESC, SUM(b.total_charge_cents) DESC, u.id
           LIMIT ?"#,
    )
    .bind(TOP_CUSTOMERS)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(customer_id, name, email, bookings, spent, last_booking)| CustomerStats {
                customer_id,
                name,
                email,
                bookings,
                total_spent: from_cents(spent),
                last_booking,
            },
        )
        .collect())
}

pub async fn collect(db: &SqlitePool, kind: Option<StatKind>, today: NaiveDate) -> Result<Statistics, AppError> {
    let stats = match kind {
        Some(StatKind::General) => Statistics::General(general(db, today).await?),
        Some(StatKind::Venues) => Statistics::Venues(by_venue(db).await?),
        Some(StatKind::Periods) => Statistics::Periods(by_period(db).await?),
        Some(StatKind::Services) => Statistics::Services(services(db).await?),
        Some(StatKind::Customers) => Statistics::Customers(top_customers(db).await?),
        None => Statistics::All(Box::new(AllStats {
            general: general(db, today).await?,
            venues: by_venue(db).await?,
            periods: by_period(db).await?,
            services: services(db).await?,
            customers: top_customers(db).await?,
        })),
    };
    Ok(stats)
}

use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::pricing::from_cents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Role {
    Admin,
    Staff,
    Customer,
}

impl Role {
    pub fn is_admin(self) -> bool {
        self == Role::Admin
    }

    pub fn is_staff_or_admin(self) -> bool {
        matches!(self, Role::Admin | Role::Staff)
    }

    pub fn can_book(self) -> bool {
        matches!(self, Role::Admin | Role::Customer)
    }
}

impl From<Role> for i64 {
    fn from(role: Role) -> Self {
        match role {
            Role::Admin => 1,
            Role::Staff => 2,
            Role::Customer => 3,
        }
    }
}

impl TryFrom<i64> for Role {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Role::Admin),
            2 => Ok(Role::Staff),
            3 => Ok(Role::Customer),
            other => Err(format!("unknown role {other}, expected 1 (admin), 2 (staff) or 3 (customer)")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::Customer => "customer",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: i64,
    pub phone: Option<String>,
    pub photo: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub modified_at: String,
}

/// Public view of an account. Never carries the password hash.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: Role,
    pub phone: Option<String>,
    pub photo: Option<String>,
    pub active: bool,
    pub created_at: String,
    pub modified_at: String,
}

impl TryFrom<UserRow> for User {
    type Error = String;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            role: Role::try_from(row.role)?,
            phone: row.phone,
            photo: row.photo,
            active: row.active,
            created_at: row.created_at,
            modified_at: row.modified_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VenueRow {
    pub id: i64,
    pub title: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub capacity: Option<i64>,
    pub price_cents: i64,
    pub active: bool,
    pub created_at: String,
    pub modified_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Venue {
    pub id: i64,
    pub title: String,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub capacity: Option<i64>,
    pub price: Decimal,
    pub active: bool,
    pub created_at: String,
    pub modified_at: String,
}

impl From<VenueRow> for Venue {
    fn from(row: VenueRow) -> Self {
        Venue {
            id: row.id,
            title: row.title,
            address: row.address,
            latitude: row.latitude,
            longitude: row.longitude,
            capacity: row.capacity,
            price: from_cents(row.price_cents),
            active: row.active,
            created_at: row.created_at,
            modified_at: row.modified_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct TimeSlot {
    pub id: i64,
    pub position: i64,
    #[serde(with = "clock")]
    pub starts_at: NaiveTime,
    #[serde(with = "clock")]
    pub ends_at: NaiveTime,
    pub active: bool,
    pub created_at: String,
    pub modified_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServiceRow {
    pub id: i64,
    pub description: String,
    pub price_cents: i64,
    pub active: bool,
    pub created_at: String,
    pub modified_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub id: i64,
    pub description: String,
    pub price: Decimal,
    pub active: bool,
    pub created_at: String,
    pub modified_at: String,
}

impl From<ServiceRow> for Service {
    fn from(row: ServiceRow) -> Self {
        Service {
            id: row.id,
            description: row.description,
            price: from_cents(row.price_cents),
            active: row.active,
            created_at: row.created_at,
            modified_at: row.modified_at,
        }
    }
}

/// Booking joined with venue, time slot and customer names.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookingRow {
    pub id: i64,
    pub date: NaiveDate,
    pub venue_id: i64,
    pub time_slot_id: i64,
    pub customer_id: i64,
    pub theme: Option<String>,
    pub photo: Option<String>,
    pub venue_charge_cents: i64,
    pub total_charge_cents: i64,
    pub active: bool,
    pub created_at: String,
    pub modified_at: String,
    pub venue_title: Option<String>,
    pub starts_at: Option<NaiveTime>,
    pub ends_at: Option<NaiveTime>,
    pub customer_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingSummary {
    pub id: i64,
    pub date: NaiveDate,
    pub venue_id: i64,
    pub venue_title: Option<String>,
    pub time_slot_id: i64,
    #[serde(with = "clock::optional")]
    pub starts_at: Option<NaiveTime>,
    #[serde(with = "clock::optional")]
    pub ends_at: Option<NaiveTime>,
    pub customer_id: i64,
    pub customer_name: Option<String>,
    pub theme: Option<String>,
    pub photo: Option<String>,
    pub venue_charge: Decimal,
    pub total_charge: Decimal,
    pub active: bool,
    pub created_at: String,
    pub modified_at: String,
}

impl From<BookingRow> for BookingSummary {
    fn from(row: BookingRow) -> Self {
        BookingSummary {
            id: row.id,
            date: row.date,
            venue_id: row.venue_id,
            venue_title: row.venue_title,
            time_slot_id: row.time_slot_id,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            customer_id: row.customer_id,
            customer_name: row.customer_name,
            theme: row.theme,
            photo: row.photo,
            venue_charge: from_cents(row.venue_charge_cents),
            total_charge: from_cents(row.total_charge_cents),
            active: row.active,
            created_at: row.created_at,
            modified_at: row.modified_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LineItemRow {
    pub id: i64,
    pub booking_id: i64,
    pub service_id: i64,
    pub description: Option<String>,
    pub charge_cents: i64,
    pub created_at: String,
    pub modified_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: i64,
    pub booking_id: i64,
    pub service_id: i64,
    pub description: Option<String>,
    pub charge: Decimal,
    pub created_at: String,
    pub modified_at: String,
}

impl From<LineItemRow> for LineItem {
    fn from(row: LineItemRow) -> Self {
        LineItem {
            id: row.id,
            booking_id: row.booking_id,
            service_id: row.service_id,
            description: row.description,
            charge: from_cents(row.charge_cents),
            created_at: row.created_at,
            modified_at: row.modified_at,
        }
    }
}

/// A booking together with its service line items.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: BookingSummary,
    pub services: Vec<LineItem>,
}

/// `HH:MM` on the wire, `HH:MM` or `HH:MM:SS` accepted on input.
pub mod clock {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(value: &str) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(value, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
            .ok()
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format("%H:%M"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(raw.trim()).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid time '{raw}', expected HH:MM or HH:MM:SS"))
        })
    }

    pub mod optional {
        use chrono::NaiveTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            time: &Option<NaiveTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match time {
                Some(time) => super::serialize(time, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveTime>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            raw.map(|raw| {
                super::parse(raw.trim()).ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        "invalid time '{raw}', expected HH:MM or HH:MM:SS"
                    ))
                })
            })
            .transpose()
        }
    }
}

#![allow(dead_code)]

use std::{str::FromStr, sync::Arc};

use actix_web::http::header;
use actix_web_httpauth::headers::authorization::Basic;
use rust_decimal::Decimal;
use venue_booking::{
    catalog::{self, ServiceInput, TimeSlotInput, VenueInput},
    db,
    models::{clock, Role},
    notify::LogNotifier,
    state::AppState,
    users::{self, UserInput},
};

pub const PASSWORD: &str = "secret123";
pub const ADMIN: &str = "admin@venues.local";
pub const STAFF: &str = "staff@venues.local";
pub const CUSTOMER: &str = "ana@example.com";
pub const OTHER_CUSTOMER: &str = "marko@example.com";

/// Builds the service under test from a prepared [`AppState`].
macro_rules! app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .app_data(actix_web::web::Data::new($state.clone()))
                .configure(venue_booking::routes::configure),
        )
        .await
    };
}

pub struct Seeded {
    pub state: AppState,
    pub customer_id: i64,
    pub hall: i64,
    pub slot: i64,
    pub catering: i64,
    pub music: i64,
}

pub fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

pub fn basic(email: &str) -> (header::HeaderName, Basic) {
    (
        header::AUTHORIZATION,
        Basic::new(email.to_string(), Some(PASSWORD.to_string())),
    )
}

async fn user(state: &AppState, email: &str, first_name: &str, role: Role) -> i64 {
    users::create(
        &state.db,
        UserInput {
            first_name: first_name.to_string(),
            last_name: "Tester".to_string(),
            email: email.to_string(),
            password: PASSWORD.to_string(),
            role,
            phone: None,
            photo: None,
        },
    )
    .await
    .unwrap()
    .id
}

/// In-memory database with one account per role and a small catalog:
/// a hall priced 500.00, one evening slot and two services.
pub async fn seed() -> Seeded {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    let state = AppState::new(pool, Arc::new(LogNotifier), 16);

    user(&state, ADMIN, "Admin", Role::Admin).await;
    user(&state, STAFF, "Stella", Role::Staff).await;
    let customer_id = user(&state, CUSTOMER, "Ana", Role::Customer).await;
    user(&state, OTHER_CUSTOMER, "Marko", Role::Customer).await;

    let hall = catalog::create_venue(
        &state.db,
        VenueInput {
            title: "grand hall".to_string(),
            address: "Main St 1".to_string(),
            latitude: None,
            longitude: None,
            capacity: Some(120),
            price: dec("500.00"),
        },
    )
    .await
    .unwrap()
    .id;

    let slot = catalog::create_time_slot(
        &state.db,
        TimeSlotInput {
            position: 1,
            starts_at: clock::parse("18:00").unwrap(),
            ends_at: clock::parse("22:00").unwrap(),
        },
    )
    .await
    .unwrap()
    .id;

    let catering = catalog::create_service(
        &state.db,
        ServiceInput {
            description: "Catering".to_string(),
            price: dec("100.00"),
        },
    )
    .await
    .unwrap()
    .id;

    let music = catalog::create_service(
        &state.db,
        ServiceInput {
            description: "Live music".to_string(),
            price: dec("50.00"),
        },
    )
    .await
    .unwrap()
    .id;

    Seeded {
        state,
        customer_id,
        hall,
        slot,
        catering,
        music,
    }
}

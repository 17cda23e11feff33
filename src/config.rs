use std::{env, fmt::Display, str::FromStr};

#[derive(Clone, Debug)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub event_buffer: usize,
    pub admin: AdminSeed,
}

impl Config {
    /// Reads the process environment. Call after `.env` has been loaded.
    pub fn load() -> Self {
        let admin = AdminSeed {
            email: var_or("ADMIN_EMAIL", "admin@venues.local"),
            password: var_or("ADMIN_PASSWORD", "admin123"),
            first_name: var_or("ADMIN_FIRST_NAME", "Admin"),
            last_name: var_or("ADMIN_LAST_NAME", "System"),
        };
        if admin.password == "admin123" {
            log::warn!("ADMIN_PASSWORD not set. Using default password 'admin123'. Set ADMIN_PASSWORD in production.");
        }

        Self {
            database_url: var_or("DATABASE_URL", "sqlite://./data/venue-booking.db"),
            port: parse_or("PORT", 8080),
            event_buffer: parse_or("EVENT_BUFFER", 100),
            admin,
        }
    }
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| {
        log::info!("{key} not set, using default");
        default.to_string()
    })
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|err| {
            log::warn!("Invalid {key} value '{raw}': {err}. Using {default}");
            default
        }),
        Err(_) => default,
    }
}

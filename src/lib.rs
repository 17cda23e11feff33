pub mod auth;
pub mod bookings;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod notify;
pub mod pagination;
pub mod pricing;
pub mod reports;
pub mod response;
pub mod routes;
pub mod state;
pub mod stats;
pub mod templates;
pub mod users;

use std::sync::Arc;

use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::{models::BookingView, notify::Notifier};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: broadcast::Sender<ServerEvent>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(db: SqlitePool, notifier: Arc<dyn Notifier>, event_buffer: usize) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            db,
            events,
            notifier,
        }
    }

    /// Nobody listening is not an error.
    pub fn publish(&self, event: ServerEvent) {
        let _ = self.events.send(event);
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEvent {
    pub kind: String,
    pub booking_id: i64,
    pub date: String,
    pub venue_id: i64,
    pub venue_title: Option<String>,
    pub time_slot_id: i64,
    pub customer_id: i64,
    pub customer_name: Option<String>,
    pub total_charge: String,
    pub active: bool,
}

impl ServerEvent {
    pub fn from_booking(kind: &str, view: &BookingView) -> Self {
        let booking = &view.booking;
        Self {
            kind: kind.to_string(),
            booking_id: booking.id,
            date: booking.date.to_string(),
            venue_id: booking.venue_id,
            venue_title: booking.venue_title.clone(),
            time_slot_id: booking.time_slot_id,
            customer_id: booking.customer_id,
            customer_name: booking.customer_name.clone(),
            total_charge: booking.total_charge.to_string(),
            active: booking.active,
        }
    }
}

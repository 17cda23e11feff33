//! Money handling for bookings.
//!
//! Amounts are stored as integer cents and handled as [`Decimal`] with two
//! fractional digits everywhere else.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

pub const CURRENCY_SCALE: u32 = 2;

/// Venue base charge plus every line item charge, rounded to cents.
pub fn compute_total(venue_charge: Decimal, line_items: &[Decimal]) -> Decimal {
    let total = line_items
        .iter()
        .fold(venue_charge, |sum, charge| sum + *charge);
    round(total)
}

pub fn subtotal(line_items: &[Decimal]) -> Decimal {
    compute_total(Decimal::ZERO, line_items)
}

pub fn round(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(CURRENCY_SCALE);
    rounded
}

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, CURRENCY_SCALE)
}

/// Returns `None` when the amount does not fit the storage column.
pub fn to_cents(amount: Decimal) -> Option<i64> {
    round(amount).checked_mul(Decimal::ONE_HUNDRED)?.to_i64()
}

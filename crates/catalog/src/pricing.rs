//! Pricing resolver: effective price of a product or variant at an instant.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::discount::{Discount, DiscountSchedule};

/// Effective unit price at wall-clock time `at`.
///
/// The discount is only applied when a schedule is present, active, and `at`
/// falls inside both its date range and its time-of-day window; otherwise the
/// base price is returned unchanged. Pure: same inputs, same output.
pub fn resolve_price(
    base_price: u64,
    discount: &Discount,
    schedule: Option<&DiscountSchedule>,
    at: NaiveDateTime,
) -> u64 {
    if discount.is_none() {
        return base_price;
    }
    match schedule {
        Some(schedule) if schedule.covers(&at) => discount.apply(base_price),
        _ => base_price,
    }
}

/// Unit price snapshot recorded on order lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub original: u64,
    pub effective: u64,
    /// `original - effective`, per unit.
    pub discount_per_unit: u64,
}

pub fn price_breakdown(
    base_price: u64,
    discount: &Discount,
    schedule: Option<&DiscountSchedule>,
    at: NaiveDateTime,
) -> PriceBreakdown {
    let effective = resolve_price(base_price, discount, schedule, at);
    PriceBreakdown {
        original: base_price,
        effective,
        discount_per_unit: base_price - effective,
    }
}

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use fulfil_core::{DomainError, ValueObject};

/// Discount configuration of a product or variant.
///
/// `Flat` is an amount in the smallest currency unit; `Percent` is a whole
/// percentage of the base price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "amount", rename_all = "snake_case")]
pub enum Discount {
    #[default]
    NoDiscount,
    Flat(u64),
    Percent(u32),
}

impl ValueObject for Discount {}

impl Discount {
    pub fn is_none(&self) -> bool {
        matches!(self, Discount::NoDiscount)
    }

    /// Effective price once this discount is in force. Never below zero.
    pub fn apply(&self, base_price: u64) -> u64 {
        match *self {
            Discount::NoDiscount => base_price,
            Discount::Flat(amount) => base_price.saturating_sub(amount),
            Discount::Percent(pct) => {
                let off = (base_price as u128 * pct as u128) / 100;
                base_price.saturating_sub(off.min(u64::MAX as u128) as u64)
            }
        }
    }
}

/// Time of day with minute precision, written as 24h `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub fn from_hm(hour: u16, minute: u16) -> Result<Self, DomainError> {
        if hour > 23 || minute > 59 {
            return Err(DomainError::validation(format!(
                "time of day out of range: {hour:02}:{minute:02}"
            )));
        }
        Ok(Self(hour * 60 + minute))
    }

    pub fn minutes_since_midnight(&self) -> u16 {
        self.0
    }

    pub fn of(at: &NaiveDateTime) -> Self {
        Self((at.hour() * 60 + at.minute()) as u16)
    }
}

impl core::str::FromStr for TimeOfDay {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || DomainError::validation(format!("time of day must be HH:MM, got {s:?}"));
        let (h, m) = s.trim().split_once(':').ok_or_else(malformed)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(malformed());
        }
        let hour: u16 = h.parse().map_err(|_| malformed())?;
        let minute: u16 = m.parse().map_err(|_| malformed())?;
        Self::from_hm(hour, minute)
    }
}

impl core::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// When a discount is in force.
///
/// Date bounds are inclusive; a missing bound is unbounded on that side. The
/// time-of-day window may wrap past midnight (`22:00`–`02:00`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiscountSchedule {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub start_time: Option<TimeOfDay>,
    pub end_time: Option<TimeOfDay>,
    pub is_active: bool,
}

impl ValueObject for DiscountSchedule {}

impl DiscountSchedule {
    /// Active schedule without any bounds: always in force.
    pub fn always() -> Self {
        Self {
            is_active: true,
            ..Self::default()
        }
    }

    pub fn between_dates(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start_date: Some(start),
            end_date: Some(end),
            is_active: true,
            ..Self::default()
        }
    }

    pub fn with_times(mut self, start: TimeOfDay, end: TimeOfDay) -> Self {
        self.start_time = Some(start);
        self.end_time = Some(end);
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn covers_date(&self, date: NaiveDate) -> bool {
        self.start_date.is_none_or(|start| date >= start)
            && self.end_date.is_none_or(|end| date <= end)
    }

    pub fn covers_time(&self, time: TimeOfDay) -> bool {
        match (self.start_time, self.end_time) {
            (None, None) => true,
            (Some(start), None) => time >= start,
            (None, Some(end)) => time <= end,
            (Some(start), Some(end)) if start <= end => time >= start && time <= end,
            // Window wraps past midnight.
            (Some(start), Some(end)) => time >= start || time <= end,
        }
    }

    /// True when the schedule is active and `at` falls inside both windows.
    pub fn covers(&self, at: &NaiveDateTime) -> bool {
        self.is_active && self.covers_date(at.date()) && self.covers_time(TimeOfDay::of(at))
    }

    pub fn violations(&self, field: &str) -> Vec<String> {
        let mut violations = Vec::new();
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                violations.push(format!("{field}.start_date must not be after end_date"));
            }
        }
        violations
    }
}

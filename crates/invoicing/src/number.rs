//! Invoice numbering: `{prefix}-{YYYY}-{MM}-{sequence}`.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use fulfil_core::DomainResult;

/// Per-period counter. `next` must be an atomic increment-and-fetch: two
/// concurrent callers never observe the same value for a period.
pub trait InvoiceSequence: Send + Sync {
    /// Next value for `period` (a `YYYY-MM` key), starting at 1.
    fn next(&self, period: &str) -> DomainResult<u64>;
}

impl<S> InvoiceSequence for Arc<S>
where
    S: InvoiceSequence + ?Sized,
{
    fn next(&self, period: &str) -> DomainResult<u64> {
        (**self).next(period)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceNumberFormat {
    pub prefix: String,
    /// Minimum digits of the sequence part, zero padded.
    pub width: usize,
}

impl Default for InvoiceNumberFormat {
    fn default() -> Self {
        Self {
            prefix: "INV".to_string(),
            width: 4,
        }
    }
}

impl InvoiceNumberFormat {
    pub fn new(prefix: impl Into<String>, width: usize) -> Self {
        Self {
            prefix: prefix.into(),
            width,
        }
    }

    /// Counter key for the calendar month of `date`.
    pub fn period_key(date: NaiveDate) -> String {
        format!("{:04}-{:02}", date.year(), date.month())
    }

    pub fn format(&self, date: NaiveDate, sequence: u64) -> String {
        format!(
            "{}-{:04}-{:02}-{:0width$}",
            self.prefix,
            date.year(),
            date.month(),
            sequence,
            width = self.width
        )
    }
}

//! Engine configuration, read from the environment.

use std::str::FromStr;

use anyhow::Context;
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use fulfil_invoicing::InvoiceNumberFormat;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Days between issue and due date when the caller gives no due date.
    pub invoice_due_days: u32,
    pub invoice_number_prefix: String,
    pub invoice_sequence_width: usize,
    pub default_payment_method: String,
    /// Shipping charge applied when an order request does not carry one.
    pub default_shipping_price: u64,
    /// Wall clock that discount windows are evaluated in, as minutes east of UTC.
    pub pricing_utc_offset_minutes: i32,
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            invoice_due_days: 30,
            invoice_number_prefix: "INV".to_string(),
            invoice_sequence_width: 4,
            default_payment_method: "cash_on_delivery".to_string(),
            default_shipping_price: 0,
            pricing_utc_offset_minutes: 0,
            database_url: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            invoice_due_days: env_or(&lookup, "FULFIL_INVOICE_DUE_DAYS", defaults.invoice_due_days)?,
            invoice_number_prefix: env_or(
                &lookup,
                "FULFIL_INVOICE_PREFIX",
                defaults.invoice_number_prefix,
            )?,
            invoice_sequence_width: env_or(
                &lookup,
                "FULFIL_INVOICE_SEQUENCE_WIDTH",
                defaults.invoice_sequence_width,
            )?,
            default_payment_method: env_or(
                &lookup,
                "FULFIL_DEFAULT_PAYMENT_METHOD",
                defaults.default_payment_method,
            )?,
            default_shipping_price: env_or(
                &lookup,
                "FULFIL_DEFAULT_SHIPPING_PRICE",
                defaults.default_shipping_price,
            )?,
            pricing_utc_offset_minutes: env_or(
                &lookup,
                "FULFIL_PRICING_UTC_OFFSET_MINUTES",
                defaults.pricing_utc_offset_minutes,
            )?,
            database_url: lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()),
        })
    }

    pub fn invoice_number_format(&self) -> InvoiceNumberFormat {
        InvoiceNumberFormat::new(self.invoice_number_prefix.clone(), self.invoice_sequence_width)
    }

    /// Out-of-range offsets fall back to UTC.
    pub fn pricing_offset(&self) -> FixedOffset {
        self.pricing_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }
}

fn env_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + core::fmt::Debug,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => {
            tracing::warn!(key, default = ?default, "config variable not set; using default");
            Ok(default)
        }
    }
}

use sqlx::{PgPool, Row};
use tracing::instrument;

use fulfil_core::{DomainError, DomainResult};
use fulfil_invoicing::InvoiceSequence;

use super::{block_on, map_sqlx_error};

/// Per-period counters in `invoice_sequences`.
///
/// `INSERT .. ON CONFLICT DO UPDATE .. RETURNING` takes the row lock, so two
/// concurrent callers always see different values.
#[derive(Debug, Clone)]
pub struct PgInvoiceSequence {
    pool: PgPool,
}

impl PgInvoiceSequence {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self), err)]
    pub async fn next_async(&self, period: &str) -> DomainResult<u64> {
        let row = sqlx::query(
            r#"
            INSERT INTO invoice_sequences (period, last_value)
            VALUES ($1, 1)
            ON CONFLICT (period)
            DO UPDATE SET last_value = invoice_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(period)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("next_invoice_sequence", e))?;

        let value: i64 = row
            .try_get("last_value")
            .map_err(|e| map_sqlx_error("read_invoice_sequence", e))?;
        u64::try_from(value)
            .map_err(|_| DomainError::invariant(format!("negative invoice sequence {value}")))
    }
}

impl InvoiceSequence for PgInvoiceSequence {
    fn next(&self, period: &str) -> DomainResult<u64> {
        block_on(self.next_async(period))?
    }
}

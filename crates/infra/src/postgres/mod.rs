//! Postgres-backed adapters for the stock ledger and invoice numbering.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | DomainError | Scenario |
//! |------------|----------------------|-------------|----------|
//! | Database (unique violation) | `23505` | `Conflict` | Reservation id reused |
//! | Database (other) | Any other | `InvariantViolation` | Schema or data problems |
//! | PoolClosed | N/A | `InvariantViolation` | Connection pool was closed |
//! | Other | N/A | `InvariantViolation` | Network errors, connection failures, etc. |
//!
//! ## Runtime
//!
//! The ports (`InventoryLedger`, `InvoiceSequence`) are synchronous. The
//! adapters bridge into async SQLx with `block_in_place`, so they must be
//! called from a multi-threaded tokio runtime. Async callers can use the
//! inherent `*_async` methods directly.

use std::future::Future;
use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use fulfil_core::{DomainError, DomainResult};

pub mod invoice_sequence;
pub mod stock_ledger;

pub use invoice_sequence::PgInvoiceSequence;
pub use stock_ledger::PgStockLedger;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS product_stock (
        product_id UUID PRIMARY KEY,
        total_stock BIGINT NOT NULL DEFAULT 0 CHECK (total_stock >= 0),
        sales_count BIGINT NOT NULL DEFAULT 0 CHECK (sales_count >= 0),
        total_overridden BOOLEAN NOT NULL DEFAULT FALSE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS variant_stock (
        product_id UUID NOT NULL REFERENCES product_stock (product_id),
        sku TEXT NOT NULL,
        stock BIGINT NOT NULL DEFAULT 0 CHECK (stock >= 0),
        PRIMARY KEY (product_id, sku)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stock_reservations (
        reservation_id UUID PRIMARY KEY,
        lines JSONB NOT NULL,
        reserved_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        restored_at TIMESTAMPTZ
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS invoice_sequences (
        period TEXT PRIMARY KEY,
        last_value BIGINT NOT NULL
    )
    "#,
];

/// Create the tables used by the Postgres adapters if they do not exist.
pub async fn ensure_schema(pool: &PgPool) -> DomainResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
    }
    Ok(())
}

/// Stock and numbering adapters sharing one pool.
#[derive(Debug, Clone)]
pub struct PgStores {
    pub ledger: Arc<PgStockLedger>,
    pub sequence: Arc<PgInvoiceSequence>,
}

impl PgStores {
    pub fn new(pool: PgPool) -> Self {
        Self {
            ledger: Arc::new(PgStockLedger::new(pool.clone())),
            sequence: Arc::new(PgInvoiceSequence::new(pool)),
        }
    }

    /// Connect to `database_url` and create the tables if needed.
    pub async fn connect(database_url: &str) -> DomainResult<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        ensure_schema(&pool).await?;
        info!("postgres stock ledger and invoice sequence ready");
        Ok(Self::new(pool))
    }
}

/// Run an async adapter call from a synchronous port method.
fn block_on<F>(fut: F) -> DomainResult<F::Output>
where
    F: Future,
{
    let handle = tokio::runtime::Handle::try_current().map_err(|_| {
        DomainError::invariant(
            "Postgres adapters require a tokio runtime; call them from within one",
        )
    })?;
    Ok(tokio::task::block_in_place(|| handle.block_on(fut)))
}

/// Map SQLx errors to DomainError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DomainError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                // Unique violation
                Some("23505") => DomainError::conflict(msg),
                _ => DomainError::invariant(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            DomainError::invariant(format!("connection pool closed in {operation}"))
        }
        other => DomainError::invariant(format!("sqlx error in {operation}: {other}")),
    }
}

#[cfg(test)]
pub(crate) async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for Postgres tests");
    let stores = PgStores::connect(&url).await.expect("failed to connect to Postgres");
    stores.ledger.pool().clone()
}

//! Postgres-backed inventory ledger.
//!
//! ## Reservation Protocol
//!
//! One transaction per batch:
//!
//! 1. Insert the reservation row (primary key rejects a reused id)
//! 2. `SELECT .. FOR UPDATE` every touched `product_stock` row in id order
//! 3. Decrement each line with a guarded `UPDATE .. WHERE stock >= $qty`
//! 4. Commit, or roll back at the first line whose guard matched no row
//!
//! Every line touches its product row, so step 2 serializes batches over the
//! same product and the variant updates in step 3 cannot interleave.
//!
//! Restores flip `restored_at` from NULL first and give back the lines stored
//! with the reservation, so a second restore is a no-op.

use std::collections::BTreeMap;

use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{instrument, warn};
use uuid::Uuid;

use fulfil_catalog::ProductId;
use fulfil_core::{DomainError, DomainResult, StockShortfall};
use fulfil_inventory::{InventoryLedger, ReservationId, StockAdmin, StockLine, StockRecord};

use super::{block_on, map_sqlx_error};

#[derive(Debug, Clone)]
pub struct PgStockLedger {
    pool: PgPool,
}

fn to_u32(value: i64, column: &str) -> DomainResult<u32> {
    u32::try_from(value)
        .map_err(|_| DomainError::invariant(format!("{column} out of range: {value}")))
}

impl PgStockLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    #[instrument(skip(self, lines), fields(reservation_id = %reservation, lines = lines.len()), err)]
    pub async fn reserve_async(
        &self,
        reservation: ReservationId,
        lines: &[StockLine],
    ) -> DomainResult<()> {
        if lines.is_empty() {
            return Err(DomainError::validation(
                "reservation must contain at least one line",
            ));
        }
        let payload = serde_json::to_value(lines)
            .map_err(|e| DomainError::invariant(format!("failed to encode stock lines: {e}")))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query("INSERT INTO stock_reservations (reservation_id, lines) VALUES ($1, $2)")
            .bind(*reservation.0.as_uuid())
            .bind(&payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| match map_sqlx_error("insert_reservation", e) {
                DomainError::Conflict(_) => {
                    DomainError::conflict(format!("reservation {reservation} already exists"))
                }
                other => other,
            })?;

        let mut product_ids: Vec<Uuid> = lines.iter().map(|l| *l.product_id.0.as_uuid()).collect();
        product_ids.sort();
        product_ids.dedup();
        sqlx::query(
            "SELECT product_id FROM product_stock WHERE product_id = ANY($1) ORDER BY product_id FOR UPDATE",
        )
        .bind(&product_ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("lock_product_stock", e))?;

        for line in lines {
            if !take_line(&mut tx, line).await? {
                let available = available_in(&mut *tx, &line.product_id, line.variant_sku.as_deref())
                    .await?;
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                return Err(DomainError::insufficient_stock(StockShortfall {
                    product_id: line.product_id.to_string(),
                    variant_sku: line.variant_sku.clone(),
                    requested: line.quantity,
                    available,
                }));
            }
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    /// Returns `false` when the reservation is unknown or already restored.
    #[instrument(skip(self), fields(reservation_id = %reservation), err)]
    pub async fn restore_async(&self, reservation: ReservationId) -> DomainResult<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(
            r#"
            UPDATE stock_reservations
            SET restored_at = NOW()
            WHERE reservation_id = $1 AND restored_at IS NULL
            RETURNING lines
            "#,
        )
        .bind(*reservation.0.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("mark_reservation_restored", e))?;

        let Some(row) = row else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(false);
        };

        let payload: serde_json::Value = row
            .try_get("lines")
            .map_err(|e| map_sqlx_error("read_reservation_lines", e))?;
        let lines: Vec<StockLine> = serde_json::from_value(payload)
            .map_err(|e| DomainError::invariant(format!("corrupt reservation lines: {e}")))?;

        for line in &lines {
            give_back_line(&mut tx, line).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(true)
    }

    pub async fn available_async(
        &self,
        product_id: &ProductId,
        variant_sku: Option<&str>,
    ) -> DomainResult<u32> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire_connection", e))?;
        available_in(&mut *conn, product_id, variant_sku).await
    }

    pub async fn stock_async(&self, product_id: &ProductId) -> DomainResult<Option<StockRecord>> {
        let row = sqlx::query(
            "SELECT total_stock, sales_count, total_overridden FROM product_stock WHERE product_id = $1",
        )
        .bind(*product_id.0.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_product_stock", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let total: i64 = row
            .try_get("total_stock")
            .map_err(|e| map_sqlx_error("read_total_stock", e))?;
        let sales: i64 = row
            .try_get("sales_count")
            .map_err(|e| map_sqlx_error("read_sales_count", e))?;
        let overridden: bool = row
            .try_get("total_overridden")
            .map_err(|e| map_sqlx_error("read_total_overridden", e))?;

        let rows = sqlx::query("SELECT sku, stock FROM variant_stock WHERE product_id = $1")
            .bind(*product_id.0.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_variant_stock", e))?;

        let mut variants = BTreeMap::new();
        for row in rows {
            let sku: String = row
                .try_get("sku")
                .map_err(|e| map_sqlx_error("read_sku", e))?;
            let stock: i64 = row
                .try_get("stock")
                .map_err(|e| map_sqlx_error("read_variant_stock", e))?;
            variants.insert(sku, to_u32(stock, "variant_stock.stock")?);
        }

        Ok(Some(StockRecord::from_parts(
            *product_id,
            to_u32(total, "product_stock.total_stock")?,
            variants,
            u64::try_from(sales).unwrap_or(0),
            overridden,
        )))
    }

    /// Explicit override of the product total.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn set_total_stock(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> DomainResult<StockRecord> {
        sqlx::query(
            r#"
            INSERT INTO product_stock (product_id, total_stock, total_overridden)
            VALUES ($1, $2, TRUE)
            ON CONFLICT (product_id)
            DO UPDATE SET total_stock = EXCLUDED.total_stock, total_overridden = TRUE
            "#,
        )
        .bind(*product_id.0.as_uuid())
        .bind(i64::from(quantity))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_total_stock", e))?;

        self.reload(product_id).await
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn set_variant_stock(
        &self,
        product_id: ProductId,
        sku: &str,
        quantity: u32,
    ) -> DomainResult<StockRecord> {
        if sku.trim().is_empty() {
            return Err(DomainError::validation("variant_sku cannot be blank"));
        }
        let id = *product_id.0.as_uuid();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        ensure_product_row(&mut tx, id).await?;
        sqlx::query(
            r#"
            INSERT INTO variant_stock (product_id, sku, stock)
            VALUES ($1, $2, $3)
            ON CONFLICT (product_id, sku) DO UPDATE SET stock = EXCLUDED.stock
            "#,
        )
        .bind(id)
        .bind(sku)
        .bind(i64::from(quantity))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("set_variant_stock", e))?;

        sqlx::query(
            r#"
            UPDATE product_stock
            SET total_stock = (
                SELECT COALESCE(SUM(stock), 0)::BIGINT FROM variant_stock WHERE product_id = $1
            )
            WHERE product_id = $1 AND NOT total_overridden
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("recompute_total_stock", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        self.reload(product_id).await
    }

    /// Drop the override and recompute the total from variant stock.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn reconcile_total(&self, product_id: ProductId) -> DomainResult<StockRecord> {
        let id = *product_id.0.as_uuid();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        ensure_product_row(&mut tx, id).await?;
        sqlx::query(
            r#"
            UPDATE product_stock
            SET total_overridden = FALSE,
                total_stock = COALESCE(
                    (SELECT SUM(stock)::BIGINT FROM variant_stock WHERE product_id = $1),
                    total_stock
                )
            WHERE product_id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("reconcile_total", e))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        self.reload(product_id).await
    }

    async fn reload(&self, product_id: ProductId) -> DomainResult<StockRecord> {
        self.stock_async(&product_id)
            .await?
            .ok_or_else(|| DomainError::invariant(format!("stock row for {product_id} vanished")))
    }
}

async fn ensure_product_row(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> DomainResult<()> {
    sqlx::query("INSERT INTO product_stock (product_id) VALUES ($1) ON CONFLICT DO NOTHING")
        .bind(id)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("ensure_product_row", e))?;
    Ok(())
}

/// Guarded decrement of one line. `false` means some pool was short.
async fn take_line(tx: &mut Transaction<'_, Postgres>, line: &StockLine) -> DomainResult<bool> {
    let id = *line.product_id.0.as_uuid();
    let qty = i64::from(line.quantity);

    if let Some(sku) = line.variant_sku.as_deref() {
        let updated = sqlx::query(
            "UPDATE variant_stock SET stock = stock - $3 WHERE product_id = $1 AND sku = $2 AND stock >= $3",
        )
        .bind(id)
        .bind(sku)
        .bind(qty)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("take_variant_stock", e))?;
        if updated.rows_affected() == 0 {
            return Ok(false);
        }
    }

    let updated = sqlx::query(
        r#"
        UPDATE product_stock
        SET total_stock = total_stock - $2, sales_count = sales_count + $2
        WHERE product_id = $1 AND total_stock >= $2
        "#,
    )
    .bind(id)
    .bind(qty)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("take_total_stock", e))?;
    Ok(updated.rows_affected() > 0)
}

async fn give_back_line(tx: &mut Transaction<'_, Postgres>, line: &StockLine) -> DomainResult<()> {
    let id = *line.product_id.0.as_uuid();
    let qty = i64::from(line.quantity);

    ensure_product_row(tx, id).await?;
    if let Some(sku) = line.variant_sku.as_deref() {
        sqlx::query(
            r#"
            INSERT INTO variant_stock (product_id, sku, stock)
            VALUES ($1, $2, $3)
            ON CONFLICT (product_id, sku) DO UPDATE SET stock = variant_stock.stock + EXCLUDED.stock
            "#,
        )
        .bind(id)
        .bind(sku)
        .bind(qty)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("restore_variant_stock", e))?;
    }

    sqlx::query(
        r#"
        UPDATE product_stock
        SET total_stock = total_stock + $2, sales_count = GREATEST(sales_count - $2, 0)
        WHERE product_id = $1
        "#,
    )
    .bind(id)
    .bind(qty)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("restore_total_stock", e))?;
    Ok(())
}

/// Variant availability is capped by the product total; missing rows count as zero.
async fn available_in(
    conn: &mut sqlx::PgConnection,
    product_id: &ProductId,
    variant_sku: Option<&str>,
) -> DomainResult<u32> {
    let row = sqlx::query(
        r#"
        SELECT p.total_stock, v.stock AS variant_stock
        FROM product_stock p
        LEFT JOIN variant_stock v ON v.product_id = p.product_id AND v.sku = $2
        WHERE p.product_id = $1
        "#,
    )
    .bind(*product_id.0.as_uuid())
    .bind(variant_sku)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_sqlx_error("load_available_stock", e))?;

    let Some(row) = row else {
        return Ok(0);
    };
    let total: i64 = row
        .try_get("total_stock")
        .map_err(|e| map_sqlx_error("read_total_stock", e))?;
    let total = to_u32(total, "product_stock.total_stock")?;
    match variant_sku {
        Some(_) => {
            let variant: Option<i64> = row
                .try_get("variant_stock")
                .map_err(|e| map_sqlx_error("read_variant_stock", e))?;
            let variant = to_u32(variant.unwrap_or(0), "variant_stock.stock")?;
            Ok(variant.min(total))
        }
        None => Ok(total),
    }
}

impl StockAdmin for PgStockLedger {
    fn set_total_stock(&self, product_id: ProductId, quantity: u32) -> DomainResult<StockRecord> {
        block_on(PgStockLedger::set_total_stock(self, product_id, quantity))?
    }

    fn set_variant_stock(
        &self,
        product_id: ProductId,
        sku: &str,
        quantity: u32,
    ) -> DomainResult<StockRecord> {
        block_on(PgStockLedger::set_variant_stock(self, product_id, sku, quantity))?
    }

    fn reconcile_total(&self, product_id: ProductId) -> DomainResult<StockRecord> {
        block_on(PgStockLedger::reconcile_total(self, product_id))?
    }
}

impl InventoryLedger for PgStockLedger {
    fn available(&self, product_id: &ProductId, variant_sku: Option<&str>) -> DomainResult<u32> {
        block_on(self.available_async(product_id, variant_sku))?
    }

    fn reserve(&self, reservation: ReservationId, lines: &[StockLine]) -> DomainResult<()> {
        block_on(self.reserve_async(reservation, lines))?
    }

    /// The lines given back are the ones stored with the reservation.
    fn restore(&self, reservation: ReservationId, _lines: &[StockLine]) -> DomainResult<bool> {
        block_on(self.restore_async(reservation))?
    }

    fn stock(&self, product_id: &ProductId) -> Option<StockRecord> {
        match block_on(self.stock_async(product_id)) {
            Ok(Ok(record)) => record,
            Ok(Err(err)) | Err(err) => {
                warn!(product_id = %product_id, error = %err, "failed to load stock record");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulfil_core::AggregateId;

    use crate::postgres::test_pool;

    fn test_product() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_reservation() -> ReservationId {
        ReservationId::new(AggregateId::new())
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires DATABASE_URL"]
    async fn reserve_and_restore_round_trip() {
        let ledger = PgStockLedger::new(test_pool().await);
        let pid = test_product();
        ledger.set_variant_stock(pid, "RED-M", 1).await.unwrap();
        ledger.set_variant_stock(pid, "BLU-L", 4).await.unwrap();

        let reservation = test_reservation();
        let lines = vec![StockLine::variant(pid, "BLU-L", 2)];
        ledger.reserve_async(reservation, &lines).await.unwrap();

        let rec = ledger.stock_async(&pid).await.unwrap().unwrap();
        assert_eq!(rec.variant_stock("BLU-L"), 2);
        assert_eq!(rec.total_stock(), 3);
        assert_eq!(rec.sales_count(), 2);

        assert!(ledger.restore_async(reservation).await.unwrap());
        assert!(!ledger.restore_async(reservation).await.unwrap());
        let rec = ledger.stock_async(&pid).await.unwrap().unwrap();
        assert_eq!(rec.variant_stock("BLU-L"), 4);
        assert_eq!(rec.total_stock(), 5);
        assert_eq!(rec.sales_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires DATABASE_URL"]
    async fn failing_line_rolls_back_whole_batch() {
        let ledger = PgStockLedger::new(test_pool().await);
        let mug = test_product();
        let cup = test_product();
        ledger.set_total_stock(mug, 5).await.unwrap();
        ledger.set_total_stock(cup, 1).await.unwrap();

        let lines = vec![StockLine::product(mug, 2), StockLine::product(cup, 2)];
        let err = ledger.reserve_async(test_reservation(), &lines).await.unwrap_err();
        match err {
            DomainError::InsufficientStock(s) => {
                assert_eq!(s.product_id, cup.to_string());
                assert_eq!((s.requested, s.available), (2, 1));
            }
            other => panic!("Expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(ledger.available_async(&mug, None).await.unwrap(), 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires DATABASE_URL"]
    async fn reused_reservation_id_is_a_conflict() {
        let ledger = PgStockLedger::new(test_pool().await);
        let pid = test_product();
        ledger.set_total_stock(pid, 10).await.unwrap();

        let reservation = test_reservation();
        let lines = vec![StockLine::product(pid, 1)];
        ledger.reserve_async(reservation, &lines).await.unwrap();
        let err = ledger.reserve_async(reservation, &lines).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(ledger.available(&pid, None).unwrap(), 9);
    }

    #[tokio::test(flavor = "multi_thread")]
    #[ignore = "requires DATABASE_URL"]
    async fn override_holds_until_reconciled() {
        let ledger = PgStockLedger::new(test_pool().await);
        let pid = test_product();
        ledger.set_variant_stock(pid, "A", 3).await.unwrap();
        ledger.set_total_stock(pid, 10).await.unwrap();
        let rec = ledger.set_variant_stock(pid, "B", 2).await.unwrap();
        assert_eq!(rec.total_stock(), 10);

        let rec = ledger.reconcile_total(pid).await.unwrap();
        assert_eq!(rec.total_stock(), 5);
        assert!(!rec.is_total_overridden());
    }
}

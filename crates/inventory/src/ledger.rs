use std::sync::Arc;

use serde::{Deserialize, Serialize};

use fulfil_catalog::ProductId;
use fulfil_core::{AggregateId, DomainResult};

use crate::stock::{StockLine, StockRecord};

/// Key under which a reserved batch is remembered (the order id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(pub AggregateId);

impl ReservationId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The only entry points that move stock.
///
/// Implementations must make `reserve` atomic with respect to every other
/// `reserve`/`restore` touching the same product: either every line is taken
/// or nothing is.
pub trait InventoryLedger: Send + Sync {
    /// Quantity a single line could take right now (advisory).
    fn available(&self, product_id: &ProductId, variant_sku: Option<&str>) -> DomainResult<u32>;

    /// Take every line or none. Fails with `InsufficientStock` naming the first
    /// line that cannot be covered, or `Conflict` if `reservation` is reused.
    fn reserve(&self, reservation: ReservationId, lines: &[StockLine]) -> DomainResult<()>;

    /// Give back a committed reservation. Returns `Ok(false)` without touching
    /// stock when `reservation` was already restored or never committed.
    fn restore(&self, reservation: ReservationId, lines: &[StockLine]) -> DomainResult<bool>;

    /// Snapshot of a product's counters.
    fn stock(&self, product_id: &ProductId) -> Option<StockRecord>;
}

/// Administrative stock writes, kept apart from the order path.
pub trait StockAdmin: InventoryLedger {
    /// Explicit override of the product total.
    fn set_total_stock(&self, product_id: ProductId, quantity: u32) -> DomainResult<StockRecord>;

    fn set_variant_stock(
        &self,
        product_id: ProductId,
        sku: &str,
        quantity: u32,
    ) -> DomainResult<StockRecord>;

    /// Drop the override and recompute the total from variant stock.
    fn reconcile_total(&self, product_id: ProductId) -> DomainResult<StockRecord>;
}

impl<S> InventoryLedger for Arc<S>
where
    S: InventoryLedger + ?Sized,
{
    fn available(&self, product_id: &ProductId, variant_sku: Option<&str>) -> DomainResult<u32> {
        (**self).available(product_id, variant_sku)
    }

    fn reserve(&self, reservation: ReservationId, lines: &[StockLine]) -> DomainResult<()> {
        (**self).reserve(reservation, lines)
    }

    fn restore(&self, reservation: ReservationId, lines: &[StockLine]) -> DomainResult<bool> {
        (**self).restore(reservation, lines)
    }

    fn stock(&self, product_id: &ProductId) -> Option<StockRecord> {
        (**self).stock(product_id)
    }
}

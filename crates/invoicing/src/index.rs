//! One invoice per order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use fulfil_core::DomainResult;
use fulfil_sales::OrderId;

use crate::invoice::InvoiceId;

/// Outcome of trying to reserve an order's invoice slot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Claim {
    /// The slot was free and now belongs to the caller's invoice.
    Claimed,
    /// Another invoice already holds the slot.
    Taken(InvoiceId),
}

/// Order → invoice uniqueness index.
///
/// `claim` must be an atomic insert-if-absent so that two concurrent
/// generators for the same order cannot both proceed.
pub trait InvoiceIndex: Send + Sync {
    fn claim(&self, order_id: OrderId, invoice_id: InvoiceId) -> DomainResult<Claim>;

    /// Free the slot, but only if `invoice_id` still holds it.
    fn release(&self, order_id: OrderId, invoice_id: InvoiceId) -> DomainResult<()>;

    fn lookup(&self, order_id: OrderId) -> DomainResult<Option<InvoiceId>>;
}

impl<S> InvoiceIndex for Arc<S>
where
    S: InvoiceIndex + ?Sized,
{
    fn claim(&self, order_id: OrderId, invoice_id: InvoiceId) -> DomainResult<Claim> {
        (**self).claim(order_id, invoice_id)
    }

    fn release(&self, order_id: OrderId, invoice_id: InvoiceId) -> DomainResult<()> {
        (**self).release(order_id, invoice_id)
    }

    fn lookup(&self, order_id: OrderId) -> DomainResult<Option<InvoiceId>> {
        (**self).lookup(order_id)
    }
}

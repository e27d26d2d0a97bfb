use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Mutex;

use fulfil_core::{DomainError, DomainResult};
use fulfil_invoicing::{Claim, InvoiceId, InvoiceIndex};
use fulfil_sales::OrderId;

#[derive(Debug, Default)]
pub struct InMemoryInvoiceIndex {
    by_order: Mutex<HashMap<OrderId, InvoiceId>>,
}

impl InMemoryInvoiceIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> DomainError {
    DomainError::invariant("invoice index lock poisoned")
}

impl InvoiceIndex for InMemoryInvoiceIndex {
    fn claim(&self, order_id: OrderId, invoice_id: InvoiceId) -> DomainResult<Claim> {
        let mut map = self.by_order.lock().map_err(|_| poisoned())?;
        match map.entry(order_id) {
            Entry::Occupied(e) => Ok(Claim::Taken(*e.get())),
            Entry::Vacant(e) => {
                e.insert(invoice_id);
                Ok(Claim::Claimed)
            }
        }
    }

    fn release(&self, order_id: OrderId, invoice_id: InvoiceId) -> DomainResult<()> {
        let mut map = self.by_order.lock().map_err(|_| poisoned())?;
        if map.get(&order_id) == Some(&invoice_id) {
            map.remove(&order_id);
        }
        Ok(())
    }

    fn lookup(&self, order_id: OrderId) -> DomainResult<Option<InvoiceId>> {
        let map = self.by_order.lock().map_err(|_| poisoned())?;
        Ok(map.get(&order_id).copied())
    }
}

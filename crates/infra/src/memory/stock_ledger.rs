//! In-memory inventory ledger.
//!
//! Each product's counters live in their own `Arc<Mutex<StockRecord>>`. A
//! batch locks the distinct products it touches in ascending id order, so two
//! batches over overlapping products cannot deadlock, validates every line
//! while holding all of those locks, and only then commits.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use fulfil_catalog::ProductId;
use fulfil_core::{DomainError, DomainResult, StockShortfall};
use fulfil_inventory::{InventoryLedger, ReservationId, StockAdmin, StockLine, StockRecord};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ReservationState {
    /// Claimed by an in-flight `reserve`.
    Pending,
    Committed,
    Restored,
}

#[derive(Debug, Default)]
pub struct InMemoryStockLedger {
    records: RwLock<HashMap<ProductId, Arc<Mutex<StockRecord>>>>,
    reservations: Mutex<HashMap<ReservationId, ReservationState>>,
}

type Group<'a> = Vec<(usize, &'a StockLine)>;

fn poisoned(what: &str) -> DomainError {
    DomainError::invariant(format!("stock ledger {what} lock poisoned"))
}

fn group_by_product(lines: &[StockLine]) -> BTreeMap<ProductId, Group<'_>> {
    let mut groups: BTreeMap<ProductId, Group<'_>> = BTreeMap::new();
    for (idx, line) in lines.iter().enumerate() {
        groups.entry(line.product_id).or_default().push((idx, line));
    }
    groups
}

impl InMemoryStockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, product_id: &ProductId) -> DomainResult<Option<Arc<Mutex<StockRecord>>>> {
        let map = self.records.read().map_err(|_| poisoned("records"))?;
        Ok(map.get(product_id).cloned())
    }

    fn record_or_create(&self, product_id: ProductId) -> DomainResult<Arc<Mutex<StockRecord>>> {
        if let Some(rec) = self.record(&product_id)? {
            return Ok(rec);
        }
        let mut map = self.records.write().map_err(|_| poisoned("records"))?;
        Ok(Arc::clone(map.entry(product_id).or_insert_with(|| {
            Arc::new(Mutex::new(StockRecord::new(product_id)))
        })))
    }

    fn update<F>(&self, product_id: ProductId, f: F) -> DomainResult<StockRecord>
    where
        F: FnOnce(&mut StockRecord),
    {
        let rec = self.record_or_create(product_id)?;
        let mut guard = rec.lock().map_err(|_| poisoned("record"))?;
        f(&mut guard);
        Ok(guard.clone())
    }

    /// Explicit override of the product total.
    pub fn set_total_stock(&self, product_id: ProductId, quantity: u32) -> DomainResult<StockRecord> {
        self.update(product_id, |r| r.set_total_stock(quantity))
    }

    pub fn set_variant_stock(
        &self,
        product_id: ProductId,
        sku: &str,
        quantity: u32,
    ) -> DomainResult<StockRecord> {
        if sku.trim().is_empty() {
            return Err(DomainError::validation("variant_sku cannot be blank"));
        }
        self.update(product_id, |r| r.set_variant_stock(sku, quantity))
    }

    /// Drop the override and recompute the total from variant stock.
    pub fn reconcile_total(&self, product_id: ProductId) -> DomainResult<StockRecord> {
        self.update(product_id, |r| r.reconcile_total())
    }

    fn claim_reservation(&self, reservation: ReservationId) -> DomainResult<()> {
        let mut map = self.reservations.lock().map_err(|_| poisoned("reservations"))?;
        if map.contains_key(&reservation) {
            return Err(DomainError::conflict(format!(
                "reservation {reservation} already exists"
            )));
        }
        map.insert(reservation, ReservationState::Pending);
        Ok(())
    }

    fn settle_reservation(&self, reservation: ReservationId, committed: bool) -> DomainResult<()> {
        let mut map = self.reservations.lock().map_err(|_| poisoned("reservations"))?;
        if committed {
            map.insert(reservation, ReservationState::Committed);
        } else {
            map.remove(&reservation);
        }
        Ok(())
    }

    fn reserve_groups(&self, groups: &BTreeMap<ProductId, Group<'_>>) -> DomainResult<()> {
        // BTreeMap iteration order is the lock order.
        let mut records = Vec::with_capacity(groups.len());
        for product_id in groups.keys() {
            records.push(self.record(product_id)?);
        }

        let mut guards: Vec<Option<MutexGuard<'_, StockRecord>>> = Vec::with_capacity(records.len());
        for rec in &records {
            match rec {
                Some(rec) => guards.push(Some(rec.lock().map_err(|_| poisoned("record"))?)),
                None => guards.push(None),
            }
        }

        let mut first: Option<(usize, StockShortfall)> = None;
        for ((product_id, lines), guard) in groups.iter().zip(guards.iter()) {
            let shortfall = match guard {
                Some(rec) => rec.first_shortfall(lines.iter().copied()),
                // No stock record: nothing is available.
                None => lines.first().map(|(idx, line)| {
                    (
                        *idx,
                        StockShortfall {
                            product_id: product_id.to_string(),
                            variant_sku: line.variant_sku.clone(),
                            requested: line.quantity,
                            available: 0,
                        },
                    )
                }),
            };
            if let Some((idx, s)) = shortfall {
                if first.as_ref().is_none_or(|(best, _)| idx < *best) {
                    first = Some((idx, s));
                }
            }
        }

        if let Some((_, shortfall)) = first {
            return Err(DomainError::insufficient_stock(shortfall));
        }

        for ((_, lines), guard) in groups.iter().zip(guards.iter_mut()) {
            if let Some(rec) = guard {
                rec.commit_reservation(lines.iter().map(|(_, l)| *l));
            }
        }
        Ok(())
    }
}

impl StockAdmin for InMemoryStockLedger {
    fn set_total_stock(&self, product_id: ProductId, quantity: u32) -> DomainResult<StockRecord> {
        InMemoryStockLedger::set_total_stock(self, product_id, quantity)
    }

    fn set_variant_stock(
        &self,
        product_id: ProductId,
        sku: &str,
        quantity: u32,
    ) -> DomainResult<StockRecord> {
        InMemoryStockLedger::set_variant_stock(self, product_id, sku, quantity)
    }

    fn reconcile_total(&self, product_id: ProductId) -> DomainResult<StockRecord> {
        InMemoryStockLedger::reconcile_total(self, product_id)
    }
}

impl InventoryLedger for InMemoryStockLedger {
    fn available(&self, product_id: &ProductId, variant_sku: Option<&str>) -> DomainResult<u32> {
        match self.record(product_id)? {
            Some(rec) => {
                let guard = rec.lock().map_err(|_| poisoned("record"))?;
                Ok(guard.available(variant_sku))
            }
            None => Ok(0),
        }
    }

    fn reserve(&self, reservation: ReservationId, lines: &[StockLine]) -> DomainResult<()> {
        if lines.is_empty() {
            return Err(DomainError::validation("reservation must contain at least one line"));
        }
        self.claim_reservation(reservation)?;

        let groups = group_by_product(lines);
        let result = self.reserve_groups(&groups);
        self.settle_reservation(reservation, result.is_ok())?;
        result
    }

    fn restore(&self, reservation: ReservationId, lines: &[StockLine]) -> DomainResult<bool> {
        {
            let mut map = self.reservations.lock().map_err(|_| poisoned("reservations"))?;
            match map.get(&reservation) {
                Some(ReservationState::Committed) => {
                    map.insert(reservation, ReservationState::Restored);
                }
                _ => return Ok(false),
            }
        }

        for (product_id, group) in group_by_product(lines) {
            let rec = self.record_or_create(product_id)?;
            let mut guard = rec.lock().map_err(|_| poisoned("record"))?;
            guard.restore(group.into_iter().map(|(_, l)| l));
        }
        Ok(true)
    }

    fn stock(&self, product_id: &ProductId) -> Option<StockRecord> {
        let rec = self.record(product_id).ok()??;
        let guard = rec.lock().ok()?;
        Some(guard.clone())
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use fulfil_catalog::ProductId;
use fulfil_core::{DomainError, DomainResult, StockShortfall};

/// One requested movement against a stock pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockLine {
    pub product_id: ProductId,
    pub variant_sku: Option<String>,
    pub quantity: u32,
}

impl StockLine {
    pub fn product(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            variant_sku: None,
            quantity,
        }
    }

    pub fn variant(product_id: ProductId, sku: impl Into<String>, quantity: u32) -> Self {
        Self {
            product_id,
            variant_sku: Some(sku.into()),
            quantity,
        }
    }
}

/// Stock counters of one product, keyed by product id in the ledger arena.
///
/// A variant line draws from both the variant pool and the product total, so
/// the two move together. `total_stock` tracks the sum of variant stock unless
/// an administrator has explicitly overridden it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    product_id: ProductId,
    total_stock: u32,
    variant_stock: BTreeMap<String, u32>,
    sales_count: u64,
    total_overridden: bool,
}

impl StockRecord {
    pub fn new(product_id: ProductId) -> Self {
        Self {
            product_id,
            total_stock: 0,
            variant_stock: BTreeMap::new(),
            sales_count: 0,
            total_overridden: false,
        }
    }

    /// Rebuild a record from persisted counters.
    pub fn from_parts(
        product_id: ProductId,
        total_stock: u32,
        variant_stock: BTreeMap<String, u32>,
        sales_count: u64,
        total_overridden: bool,
    ) -> Self {
        Self {
            product_id,
            total_stock,
            variant_stock,
            sales_count,
            total_overridden,
        }
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn total_stock(&self) -> u32 {
        self.total_stock
    }

    /// Unknown variants hold no stock.
    pub fn variant_stock(&self, sku: &str) -> u32 {
        self.variant_stock.get(sku).copied().unwrap_or(0)
    }

    pub fn variants(&self) -> impl Iterator<Item = (&str, u32)> {
        self.variant_stock.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn sales_count(&self) -> u64 {
        self.sales_count
    }

    pub fn is_total_overridden(&self) -> bool {
        self.total_overridden
    }

    /// Quantity a single line could take right now.
    pub fn available(&self, variant_sku: Option<&str>) -> u32 {
        match variant_sku {
            Some(sku) => self.variant_stock(sku).min(self.total_stock),
            None => self.total_stock,
        }
    }

    /// True when the total equals the sum of variant stock, or the relation
    /// does not apply (no variants, or an explicit override).
    pub fn is_consistent(&self) -> bool {
        self.variant_stock.is_empty()
            || self.total_overridden
            || u64::from(self.total_stock) == self.variant_sum()
    }

    fn variant_sum(&self) -> u64 {
        self.variant_stock.values().map(|v| u64::from(*v)).sum()
    }

    /// Administrative stock-set of the product total. Marks the total as
    /// deliberately overridden, so variant edits no longer recompute it.
    pub fn set_total_stock(&mut self, quantity: u32) {
        self.total_stock = quantity;
        self.total_overridden = true;
    }

    /// Administrative stock-set of one variant.
    pub fn set_variant_stock(&mut self, sku: impl Into<String>, quantity: u32) {
        self.variant_stock.insert(sku.into(), quantity);
        if !self.total_overridden {
            self.recompute_total();
        }
    }

    /// Drop an override and bring the total back in line with variant stock.
    pub fn reconcile_total(&mut self) {
        self.total_overridden = false;
        if !self.variant_stock.is_empty() {
            self.recompute_total();
        }
    }

    fn recompute_total(&mut self) {
        self.total_stock = u32::try_from(self.variant_sum()).unwrap_or(u32::MAX);
    }

    /// First line (by the caller's index) that this record cannot cover.
    ///
    /// Lines against the same pool are summed in iteration order; the
    /// reported `available` is what was left for the failing line.
    pub fn first_shortfall<'a, I>(&self, lines: I) -> Option<(usize, StockShortfall)>
    where
        I: IntoIterator<Item = (usize, &'a StockLine)>,
    {
        let mut total_demand: u64 = 0;
        let mut variant_demand: BTreeMap<&str, u64> = BTreeMap::new();

        for (idx, line) in lines {
            let total_left = u64::from(self.total_stock).saturating_sub(total_demand);
            let available = match line.variant_sku.as_deref() {
                Some(sku) => {
                    let used = variant_demand.get(sku).copied().unwrap_or(0);
                    u64::from(self.variant_stock(sku))
                        .saturating_sub(used)
                        .min(total_left)
                }
                None => total_left,
            };

            let requested = u64::from(line.quantity);
            if requested > available {
                return Some((
                    idx,
                    StockShortfall {
                        product_id: self.product_id.to_string(),
                        variant_sku: line.variant_sku.clone(),
                        requested: line.quantity,
                        // `available` <= total_stock, which is a u32.
                        available: available as u32,
                    },
                ));
            }

            total_demand += requested;
            if let Some(sku) = line.variant_sku.as_deref() {
                *variant_demand.entry(sku).or_default() += requested;
            }
        }
        None
    }

    /// Validate and take a batch of lines for this product, all or nothing.
    pub fn reserve(&mut self, lines: &[StockLine]) -> DomainResult<()> {
        self.ensure_lines_match(lines)?;
        if let Some((_, shortfall)) = self.first_shortfall(lines.iter().enumerate()) {
            return Err(DomainError::insufficient_stock(shortfall));
        }
        self.commit_reservation(lines);
        Ok(())
    }

    /// Take lines already validated with `first_shortfall` under the same lock.
    pub fn commit_reservation<'a, I>(&mut self, lines: I)
    where
        I: IntoIterator<Item = &'a StockLine>,
    {
        for line in lines {
            if let Some(sku) = line.variant_sku.as_deref() {
                if let Some(pool) = self.variant_stock.get_mut(sku) {
                    *pool = pool.saturating_sub(line.quantity);
                }
            }
            self.total_stock = self.total_stock.saturating_sub(line.quantity);
            self.sales_count += u64::from(line.quantity);
        }
    }

    /// Inverse of `commit_reservation`. `sales_count` is floored at zero.
    pub fn restore<'a, I>(&mut self, lines: I)
    where
        I: IntoIterator<Item = &'a StockLine>,
    {
        for line in lines {
            if let Some(sku) = line.variant_sku.as_deref() {
                let pool = self.variant_stock.entry(sku.to_string()).or_insert(0);
                *pool = pool.saturating_add(line.quantity);
            }
            self.total_stock = self.total_stock.saturating_add(line.quantity);
            self.sales_count = self.sales_count.saturating_sub(u64::from(line.quantity));
        }
    }

    fn ensure_lines_match(&self, lines: &[StockLine]) -> DomainResult<()> {
        if lines.iter().any(|l| l.product_id != self.product_id) {
            return Err(DomainError::invariant(format!(
                "stock lines for another product passed to record {}",
                self.product_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulfil_core::{AggregateId, ErrorKind};

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn shirt_stock(pid: ProductId) -> StockRecord {
        let mut rec = StockRecord::new(pid);
        rec.set_variant_stock("RED-M", 3);
        rec.set_variant_stock("BLU-L", 5);
        rec
    }

    #[test]
    fn total_follows_variant_stock() {
        let rec = shirt_stock(test_product_id());
        assert_eq!(rec.total_stock(), 8);
        assert!(rec.is_consistent());
    }

    #[test]
    fn override_stops_recomputation_until_reconciled() {
        let mut rec = shirt_stock(test_product_id());
        rec.set_total_stock(100);
        rec.set_variant_stock("RED-M", 10);
        assert_eq!(rec.total_stock(), 100);
        assert!(rec.is_total_overridden());

        rec.reconcile_total();
        assert_eq!(rec.total_stock(), 15);
        assert!(!rec.is_total_overridden());
    }

    #[test]
    fn reserve_moves_variant_total_and_sales_together() {
        let pid = test_product_id();
        let mut rec = shirt_stock(pid);
        rec.reserve(&[StockLine::variant(pid, "RED-M", 2), StockLine::product(pid, 1)])
            .unwrap();

        assert_eq!(rec.variant_stock("RED-M"), 1);
        assert_eq!(rec.total_stock(), 5);
        assert_eq!(rec.sales_count(), 3);
    }

    #[test]
    fn failing_line_commits_nothing() {
        let pid = test_product_id();
        let mut rec = shirt_stock(pid);
        let before = rec.clone();

        let err = rec
            .reserve(&[
                StockLine::variant(pid, "BLU-L", 2),
                StockLine::variant(pid, "RED-M", 4),
            ])
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        let s = err.shortfall().unwrap();
        assert_eq!(s.variant_sku.as_deref(), Some("RED-M"));
        assert_eq!((s.requested, s.available), (4, 3));
        assert_eq!(rec, before);
    }

    #[test]
    fn lines_against_same_pool_are_summed() {
        let pid = test_product_id();
        let rec = shirt_stock(pid);
        let lines = [
            StockLine::variant(pid, "RED-M", 2),
            StockLine::variant(pid, "RED-M", 2),
        ];
        let (idx, s) = rec.first_shortfall(lines.iter().enumerate()).unwrap();
        assert_eq!(idx, 1);
        assert_eq!((s.requested, s.available), (2, 1));
    }

    #[test]
    fn variant_availability_is_capped_by_total() {
        let pid = test_product_id();
        let mut rec = shirt_stock(pid);
        rec.set_total_stock(2);
        assert_eq!(rec.available(Some("BLU-L")), 2);
        assert!(rec.reserve(&[StockLine::variant(pid, "BLU-L", 3)]).is_err());
    }

    #[test]
    fn unknown_variant_has_nothing_available() {
        let pid = test_product_id();
        let mut rec = shirt_stock(pid);
        assert_eq!(rec.available(Some("GRN-S")), 0);
        assert!(rec.reserve(&[StockLine::variant(pid, "GRN-S", 1)]).is_err());
    }

    #[test]
    fn restore_is_inverse_and_floors_sales() {
        let pid = test_product_id();
        let mut rec = shirt_stock(pid);
        let before = rec.clone();
        let lines = [StockLine::variant(pid, "RED-M", 3)];

        rec.reserve(&lines).unwrap();
        rec.restore(&lines);
        assert_eq!(rec, before);

        rec.restore(&lines);
        assert_eq!(rec.sales_count(), 0);
    }

    #[test]
    fn foreign_lines_are_rejected() {
        let mut rec = shirt_stock(test_product_id());
        let err = rec.reserve(&[StockLine::product(test_product_id(), 1)]).unwrap_err();
        match err {
            DomainError::InvariantViolation(_) => {}
            _ => panic!("Expected InvariantViolation"),
        }
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        const SKUS: [&str; 3] = ["A", "B", "C"];

        fn line_strategy() -> impl Strategy<Value = (Option<usize>, u32)> {
            (prop::option::of(0usize..SKUS.len()), 1u32..5)
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: successful reservations never take more than was stocked.
            #[test]
            fn no_oversell(
                stock in prop::collection::vec(0u32..10, SKUS.len()),
                batches in prop::collection::vec(prop::collection::vec(line_strategy(), 1..4), 1..30),
            ) {
                let pid = ProductId::new(AggregateId::new());
                let mut rec = StockRecord::new(pid);
                for (sku, qty) in SKUS.iter().zip(&stock) {
                    rec.set_variant_stock(*sku, *qty);
                }
                let initial_total = rec.total_stock();

                let mut reserved: Vec<Vec<StockLine>> = Vec::new();
                for batch in batches {
                    let lines: Vec<StockLine> = batch
                        .into_iter()
                        .map(|(sku, qty)| match sku {
                            Some(i) => StockLine::variant(pid, SKUS[i], qty),
                            None => StockLine::product(pid, qty),
                        })
                        .collect();
                    if rec.reserve(&lines).is_ok() {
                        reserved.push(lines);
                    }
                }

                let taken: u64 = reserved.iter().flatten().map(|l| u64::from(l.quantity)).sum();
                prop_assert!(taken <= u64::from(initial_total));
                prop_assert_eq!(rec.sales_count(), taken);
                prop_assert_eq!(u64::from(rec.total_stock()), u64::from(initial_total) - taken);

                for lines in reserved.iter().rev() {
                    rec.restore(lines);
                }
                prop_assert_eq!(rec.total_stock(), initial_total);
                for (sku, qty) in SKUS.iter().zip(&stock) {
                    prop_assert_eq!(rec.variant_stock(sku), *qty);
                }
                prop_assert_eq!(rec.sales_count(), 0);
            }
        }
    }
}

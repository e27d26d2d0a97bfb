//! Wiring shared by the service tests.

use std::sync::Arc;

use chrono::Utc;

use fulfil_catalog::{Discount, DiscountSchedule, Product, ProductId, Variant};
use fulfil_core::{AggregateId, UserId};
use fulfil_events::InMemoryAuditSink;
use fulfil_sales::Order;

use crate::config::EngineConfig;
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::memory::{
    InMemoryCatalog, InMemoryInvoiceIndex, InMemoryInvoiceSequence, InMemoryStockLedger,
    InMemoryUserProfiles,
};
use crate::services::{
    shared_dispatcher, BuildOrderRequest, InvoiceGenerator, OrderBuilder, OrderLifecycle,
    RequestedLine, SharedDispatcher,
};

pub(crate) struct Harness {
    pub catalog: Arc<InMemoryCatalog>,
    pub ledger: Arc<InMemoryStockLedger>,
    pub profiles: Arc<InMemoryUserProfiles>,
    pub sequence: Arc<InMemoryInvoiceSequence>,
    pub index: Arc<InMemoryInvoiceIndex>,
    pub audit: Arc<InMemoryAuditSink>,
    pub dispatcher: SharedDispatcher,
    pub config: EngineConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::build(Arc::new(InMemoryEventStore::new()), config)
    }

    pub fn with_store(store: Arc<dyn EventStore>) -> Self {
        Self::build(store, EngineConfig::default())
    }

    fn build(store: Arc<dyn EventStore>, config: EngineConfig) -> Self {
        Self {
            catalog: Arc::new(InMemoryCatalog::new()),
            ledger: Arc::new(InMemoryStockLedger::new()),
            profiles: Arc::new(InMemoryUserProfiles::new()),
            sequence: Arc::new(InMemoryInvoiceSequence::new()),
            index: Arc::new(InMemoryInvoiceIndex::new()),
            audit: Arc::new(InMemoryAuditSink::new()),
            dispatcher: shared_dispatcher(store),
            config,
        }
    }

    pub fn builder(&self) -> OrderBuilder {
        OrderBuilder::new(
            self.catalog.clone(),
            self.ledger.clone(),
            self.profiles.clone(),
            self.dispatcher.clone(),
            self.audit.clone(),
            &self.config,
        )
    }

    pub fn lifecycle(&self) -> OrderLifecycle {
        OrderLifecycle::new(self.ledger.clone(), self.dispatcher.clone(), self.audit.clone())
    }

    pub fn invoices(&self) -> InvoiceGenerator {
        InvoiceGenerator::new(
            self.dispatcher.clone(),
            self.sequence.clone(),
            self.index.clone(),
            self.profiles.clone(),
            self.audit.clone(),
            &self.config,
        )
    }

    /// T-Shirt at 2000: RED-M (1 in stock, no discount) and BLU-L (4 in
    /// stock, 10% off, always active).
    pub fn seed_shirt(&self) -> ProductId {
        let id = ProductId::new(AggregateId::new());
        let product = Product::new(id, "T-Shirt", 2000)
            .with_variant(Variant::new("RED-M", 2000).with_labels(Some("Red"), Some("M"), None))
            .with_variant(
                Variant::new("BLU-L", 2000)
                    .with_labels(Some("Blue"), Some("L"), None)
                    .with_discount(Discount::Percent(10), DiscountSchedule::always()),
            );
        self.catalog.upsert(product).unwrap();
        self.ledger.set_variant_stock(id, "RED-M", 1).unwrap();
        self.ledger.set_variant_stock(id, "BLU-L", 4).unwrap();
        id
    }

    /// Variant-less product priced at `price` with `stock` units.
    pub fn seed_simple(&self, name: &str, price: u64, stock: u32) -> ProductId {
        let id = ProductId::new(AggregateId::new());
        self.catalog.upsert(Product::new(id, name, price)).unwrap();
        self.ledger.set_total_stock(id, stock).unwrap();
        id
    }

    pub fn place(&self, user: UserId, lines: Vec<RequestedLine>) -> Order {
        self.builder()
            .build_order(BuildOrderRequest::new(user, lines, Utc::now()))
            .unwrap()
    }
}

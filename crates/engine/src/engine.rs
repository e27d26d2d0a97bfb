//! The engine facade: every component wired over one set of adapters.
//!
//! Stock and invoice numbering are pluggable (in-memory or Postgres); the
//! catalog, profiles, order and invoice streams stay in process.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use fulfil_catalog::{CatalogReader, Product, ProductId};
use fulfil_core::UserId;
use fulfil_events::{AuditEvent, AuditSink, AuditSinkError, InMemoryAuditSink, TracingAuditSink};
use fulfil_infra::config::EngineConfig;
use fulfil_infra::event_store::InMemoryEventStore;
use fulfil_infra::memory::{
    InMemoryCatalog, InMemoryInvoiceIndex, InMemoryInvoiceSequence, InMemoryStockLedger,
    InMemoryUserProfiles,
};
use fulfil_infra::postgres::PgStores;
use fulfil_infra::services::{
    shared_dispatcher, BuildOrderRequest, GenerateInvoiceRequest, InvoiceGenerator, OrderBuilder,
    OrderLifecycle, ServiceError, TransitionRequest,
};
use fulfil_inventory::{InventoryLedger, StockAdmin, StockRecord};
use fulfil_invoicing::{Invoice, InvoiceId, InvoiceSequence, InvoiceStatus};
use fulfil_sales::{Order, OrderId, PaymentStatus, UserProfile};

/// Keeps a readable copy of the audit trail and forwards it to the log.
#[derive(Debug, Default)]
struct RecordingAuditSink {
    log: InMemoryAuditSink,
    tracing: TracingAuditSink,
}

impl AuditSink for RecordingAuditSink {
    fn append(&self, event: AuditEvent) -> Result<(), AuditSinkError> {
        self.tracing.append(event.clone())?;
        self.log.append(event)
    }
}

pub struct Engine {
    catalog: Arc<InMemoryCatalog>,
    ledger: Arc<dyn StockAdmin>,
    profiles: Arc<InMemoryUserProfiles>,
    audit: Arc<RecordingAuditSink>,
    orders: OrderBuilder,
    lifecycle: OrderLifecycle,
    invoices: InvoiceGenerator,
    config: EngineConfig,
}

impl Engine {
    pub fn in_memory(config: EngineConfig) -> Self {
        Self::with_stores(
            config,
            Arc::new(InMemoryStockLedger::new()),
            Arc::new(InMemoryInvoiceSequence::new()),
        )
    }

    /// Stock and invoice numbering in Postgres. Needs a multi-threaded tokio
    /// runtime, since the adapters block in place.
    pub fn postgres(config: EngineConfig, stores: PgStores) -> Self {
        Self::with_stores(config, stores.ledger, stores.sequence)
    }

    pub fn with_stores<L>(
        config: EngineConfig,
        ledger: Arc<L>,
        sequence: Arc<dyn InvoiceSequence>,
    ) -> Self
    where
        L: StockAdmin + 'static,
    {
        let catalog = Arc::new(InMemoryCatalog::new());
        let profiles = Arc::new(InMemoryUserProfiles::new());
        let audit = Arc::new(RecordingAuditSink::default());
        let dispatcher = shared_dispatcher(Arc::new(InMemoryEventStore::new()));

        let orders = OrderBuilder::new(
            catalog.clone(),
            ledger.clone(),
            profiles.clone(),
            dispatcher.clone(),
            audit.clone(),
            &config,
        );
        let lifecycle = OrderLifecycle::new(ledger.clone(), dispatcher.clone(), audit.clone());
        let invoices = InvoiceGenerator::new(
            dispatcher,
            sequence,
            Arc::new(InMemoryInvoiceIndex::new()),
            profiles.clone(),
            audit.clone(),
            &config,
        );

        Self {
            catalog,
            ledger,
            profiles,
            audit,
            orders,
            lifecycle,
            invoices,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -------------------------
    // Catalog and stock administration
    // -------------------------

    pub fn register_product(&self, product: Product) -> Result<(), ServiceError> {
        Ok(self.catalog.upsert(product)?)
    }

    pub fn product(&self, product_id: &ProductId) -> Option<Product> {
        self.catalog.product(product_id)
    }

    pub fn products(&self) -> Vec<Product> {
        self.catalog.list()
    }

    pub fn set_variant_stock(
        &self,
        product_id: ProductId,
        sku: &str,
        quantity: u32,
    ) -> Result<StockRecord, ServiceError> {
        Ok(self.ledger.set_variant_stock(product_id, sku, quantity)?)
    }

    /// Overrides the total; it stops following variant stock until reconciled.
    pub fn set_total_stock(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<StockRecord, ServiceError> {
        Ok(self.ledger.set_total_stock(product_id, quantity)?)
    }

    pub fn reconcile_stock(&self, product_id: ProductId) -> Result<StockRecord, ServiceError> {
        Ok(self.ledger.reconcile_total(product_id)?)
    }

    pub fn stock(&self, product_id: &ProductId) -> Option<StockRecord> {
        self.ledger.stock(product_id)
    }

    pub fn set_user_profile(&self, user_id: UserId, profile: UserProfile) {
        self.profiles.upsert(user_id, profile);
    }

    // -------------------------
    // Orders
    // -------------------------

    pub fn place_order(&self, request: BuildOrderRequest) -> Result<Order, ServiceError> {
        self.orders.build_order(request)
    }

    pub fn transition_order(&self, request: TransitionRequest) -> Result<Order, ServiceError> {
        self.lifecycle.transition(request)
    }

    /// Finish giving back the stock of a cancelled order.
    pub fn restore_cancelled_stock(&self, order_id: OrderId) -> Result<bool, ServiceError> {
        self.lifecycle.restore_cancelled(order_id)
    }

    pub fn update_payment_status(
        &self,
        order_id: OrderId,
        actor: UserId,
        status: PaymentStatus,
        transaction_id: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Order, ServiceError> {
        self.lifecycle
            .update_payment_status(order_id, actor, status, transaction_id, at)
    }

    pub fn order(&self, order_id: OrderId) -> Result<Order, ServiceError> {
        self.lifecycle.order(order_id)
    }

    // -------------------------
    // Invoices
    // -------------------------

    pub fn generate_invoice(&self, request: GenerateInvoiceRequest) -> Result<Invoice, ServiceError> {
        self.invoices.generate_from_order(request)
    }

    pub fn record_payment(
        &self,
        invoice_id: InvoiceId,
        actor: UserId,
        amount: u64,
        method: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Invoice, ServiceError> {
        self.invoices
            .record_payment(invoice_id, actor, amount, method, at)
    }

    pub fn change_invoice_status(
        &self,
        invoice_id: InvoiceId,
        actor: UserId,
        target: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> Result<Invoice, ServiceError> {
        self.invoices.change_status(invoice_id, actor, target, at)
    }

    pub fn mark_invoice_overdue(
        &self,
        invoice_id: InvoiceId,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<Invoice, ServiceError> {
        self.invoices.mark_overdue(invoice_id, actor, now)
    }

    pub fn delete_invoice(
        &self,
        invoice_id: InvoiceId,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        self.invoices.delete(invoice_id, actor, at)
    }

    pub fn invoice(&self, invoice_id: InvoiceId) -> Result<Invoice, ServiceError> {
        self.invoices.invoice(invoice_id)
    }

    pub fn invoice_for_order(&self, order_id: OrderId) -> Result<Option<Invoice>, ServiceError> {
        self.invoices.invoice_for_order(order_id)
    }

    // -------------------------
    // Audit
    // -------------------------

    pub fn audit_log(&self) -> Vec<AuditEvent> {
        self.audit.log.events()
    }

    pub fn audit_log_for(&self, model_id: &str) -> Vec<AuditEvent> {
        self.audit.log.for_model(model_id)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::in_memory(EngineConfig::default())
    }
}

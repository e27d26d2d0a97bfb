use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::{Duration as ChronoDuration, Utc};

use fulfil_catalog::{Discount, DiscountSchedule, Product, ProductId, Variant};
use fulfil_core::{AggregateId, DomainError, DomainResult, ErrorKind, UserId};
use fulfil_engine::{Engine, EngineConfig};
use fulfil_events::AuditAction;
use fulfil_infra::memory::InMemoryStockLedger;
use fulfil_infra::postgres::PgStores;
use fulfil_infra::services::{
    BuildOrderRequest, GenerateInvoiceRequest, RequestedLine, ServiceError, TransitionRequest,
};
use fulfil_inventory::InventoryLedger;
use fulfil_invoicing::{InvoiceSequence, InvoiceStatus};
use fulfil_sales::{DeliveryStatus, Order, PaymentStatus};

fn new_product_id() -> ProductId {
    ProductId::new(AggregateId::new())
}

fn order_for(engine: &Engine, user: UserId, lines: Vec<RequestedLine>) -> Result<Order, ServiceError> {
    engine.place_order(BuildOrderRequest::new(user, lines, Utc::now()))
}

fn move_to(engine: &Engine, order: &Order, target: DeliveryStatus) -> Result<Order, ServiceError> {
    engine.transition_order(TransitionRequest {
        order_id: order.id_typed(),
        actor: UserId::new(),
        target,
        expected_current: None,
        at: Utc::now(),
    })
}

/// Single product priced at `price` with `stock` units and no discount.
fn simple_product(engine: &Engine, price: u64, stock: u32) -> ProductId {
    let id = new_product_id();
    engine.register_product(Product::new(id, "Widget", price)).unwrap();
    engine.set_total_stock(id, stock).unwrap();
    id
}

#[test]
fn flat_discount_in_window_prices_each_unit() {
    let engine = Engine::in_memory(EngineConfig::default());
    let today = Utc::now().date_naive();
    let id = new_product_id();
    engine
        .register_product(Product::new(id, "Lamp", 100).with_discount(
            Discount::Flat(20),
            DiscountSchedule::between_dates(
                today - ChronoDuration::days(1),
                today + ChronoDuration::days(1),
            ),
        ))
        .unwrap();
    engine.set_total_stock(id, 10).unwrap();

    let order = order_for(&engine, UserId::new(), vec![RequestedLine::product(id, 2)]).unwrap();

    let line = &order.lines()[0];
    assert_eq!(line.unit_price, 80);
    assert_eq!(line.original_price, 100);
    assert_eq!(line.discount_amount, 20);
    assert_eq!(line.line_total, 160);
    assert_eq!(order.totals().total_price, 160);
    assert_eq!(engine.stock(&id).unwrap().total_stock(), 8);
}

#[test]
fn concurrent_orders_for_same_variant_never_oversell() {
    let engine = Arc::new(Engine::in_memory(EngineConfig::default()));
    let id = new_product_id();
    engine
        .register_product(Product::new(id, "Jacket", 5000).with_variant(Variant::new("GRN-S", 5000)))
        .unwrap();
    engine.set_variant_stock(id, "GRN-S", 3).unwrap();

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                order_for(&engine, UserId::new(), vec![RequestedLine::variant(id, "GRN-S", 2)])
            })
        })
        .collect();
    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let err = results.into_iter().find_map(Result::err).unwrap();
    match err {
        ServiceError::Domain(DomainError::InsufficientStock(shortfall)) => {
            assert_eq!(shortfall.variant_sku.as_deref(), Some("GRN-S"));
            assert_eq!((shortfall.requested, shortfall.available), (2, 1));
        }
        other => panic!("Expected InsufficientStock, got {other:?}"),
    }

    let rec = engine.stock(&id).unwrap();
    assert_eq!(rec.variant_stock("GRN-S"), 1);
    assert_eq!(rec.total_stock(), 1);
}

#[test]
fn cancelled_order_restores_stock_and_can_still_be_invoiced() {
    let engine = Engine::in_memory(EngineConfig::default());
    let id = simple_product(&engine, 250, 5);
    let user = UserId::new();

    let order = order_for(&engine, user, vec![RequestedLine::product(id, 2)]).unwrap();
    assert_eq!(order.totals().total_price, 500);
    assert_eq!(engine.stock(&id).unwrap().sales_count(), 2);

    move_to(&engine, &order, DeliveryStatus::Processing).unwrap();
    let cancelled = move_to(&engine, &order, DeliveryStatus::Cancelled).unwrap();
    assert_eq!(cancelled.delivery_status(), DeliveryStatus::Cancelled);

    let rec = engine.stock(&id).unwrap();
    assert_eq!(rec.total_stock(), 5);
    assert_eq!(rec.sales_count(), 0);

    // Cancellation does not touch payment status.
    assert_eq!(cancelled.payment().unwrap().status, PaymentStatus::Pending);

    let invoice = engine
        .generate_invoice(GenerateInvoiceRequest::new(order.id_typed(), user, Utc::now()))
        .unwrap();
    assert_eq!(invoice.total_amount(), 500);

    // Closed states accept nothing further.
    let err = move_to(&engine, &order, DeliveryStatus::Processing).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
}

#[test]
fn two_payments_settle_the_invoice() {
    let engine = Engine::in_memory(EngineConfig::default());
    let id = simple_product(&engine, 1000, 3);
    let user = UserId::new();
    let order = order_for(&engine, user, vec![RequestedLine::product(id, 1)]).unwrap();
    let invoice = engine
        .generate_invoice(GenerateInvoiceRequest::new(order.id_typed(), user, Utc::now()))
        .unwrap();
    assert_eq!(invoice.total_amount(), 1000);

    let partial = engine
        .record_payment(invoice.id_typed(), user, 400, None, Utc::now())
        .unwrap();
    assert_eq!(partial.payment_status(), PaymentStatus::Partial);
    assert_eq!(partial.remaining_amount(), 600);

    let paid = engine
        .record_payment(invoice.id_typed(), user, 600, Some("bank_transfer".into()), Utc::now())
        .unwrap();
    assert_eq!(paid.payment_status(), PaymentStatus::Paid);
    assert_eq!(paid.remaining_amount(), 0);
    assert_eq!(paid.status(), InvoiceStatus::Paid);
}

#[test]
fn overpayment_is_rejected_without_side_effects() {
    let engine = Engine::in_memory(EngineConfig::default());
    let id = simple_product(&engine, 1000, 3);
    let user = UserId::new();
    let order = order_for(&engine, user, vec![RequestedLine::product(id, 1)]).unwrap();
    let invoice = engine
        .generate_invoice(GenerateInvoiceRequest::new(order.id_typed(), user, Utc::now()))
        .unwrap();
    engine
        .record_payment(invoice.id_typed(), user, 400, None, Utc::now())
        .unwrap();

    let err = engine
        .record_payment(invoice.id_typed(), user, 700, None, Utc::now())
        .unwrap_err();
    match err {
        ServiceError::Domain(DomainError::InvalidOperation(_)) => {}
        other => panic!("Expected InvalidOperation, got {other:?}"),
    }

    let invoice = engine.invoice(invoice.id_typed()).unwrap();
    assert_eq!(invoice.paid_amount(), 400);
    assert_eq!(invoice.payment_status(), PaymentStatus::Partial);
}

#[test]
fn second_generation_returns_existing_invoice() {
    let engine = Engine::in_memory(EngineConfig::default());
    let id = simple_product(&engine, 300, 3);
    let user = UserId::new();
    let order = order_for(&engine, user, vec![RequestedLine::product(id, 1)]).unwrap();

    let first = engine
        .generate_invoice(GenerateInvoiceRequest::new(order.id_typed(), user, Utc::now()))
        .unwrap();
    let err = engine
        .generate_invoice(GenerateInvoiceRequest::new(order.id_typed(), user, Utc::now()))
        .unwrap_err();
    match err {
        ServiceError::InvoiceAlreadyExists(existing) => {
            assert_eq!(existing.id_typed(), first.id_typed());
            assert_eq!(existing.invoice_number(), first.invoice_number());
        }
        other => panic!("Expected InvoiceAlreadyExists, got {other:?}"),
    }
    assert_eq!(
        engine.invoice_for_order(order.id_typed()).unwrap().unwrap().id_typed(),
        first.id_typed()
    );
}

#[test]
fn deleting_a_draft_frees_the_order_for_reinvoicing() {
    let engine = Engine::in_memory(EngineConfig::default());
    let id = simple_product(&engine, 300, 3);
    let user = UserId::new();
    let order = order_for(&engine, user, vec![RequestedLine::product(id, 1)]).unwrap();
    let first = engine
        .generate_invoice(GenerateInvoiceRequest::new(order.id_typed(), user, Utc::now()))
        .unwrap();

    engine.delete_invoice(first.id_typed(), user, Utc::now()).unwrap();
    assert_eq!(engine.invoice(first.id_typed()).unwrap_err().kind(), ErrorKind::NotFound);
    assert!(engine.invoice_for_order(order.id_typed()).unwrap().is_none());

    let second = engine
        .generate_invoice(GenerateInvoiceRequest::new(order.id_typed(), user, Utc::now()))
        .unwrap();
    assert_ne!(second.id_typed(), first.id_typed());
    assert_ne!(second.invoice_number(), first.invoice_number());
}

#[test]
fn overdue_check_only_moves_sent_invoices_past_due() {
    let engine = Engine::in_memory(EngineConfig::default());
    let id = simple_product(&engine, 300, 3);
    let user = UserId::new();
    let order = order_for(&engine, user, vec![RequestedLine::product(id, 1)]).unwrap();
    let invoice = engine
        .generate_invoice(GenerateInvoiceRequest::new(order.id_typed(), user, Utc::now()))
        .unwrap();
    let after_due = Utc::now() + ChronoDuration::days(45);

    // Drafts are never overdue.
    let unchanged = engine
        .mark_invoice_overdue(invoice.id_typed(), user, after_due)
        .unwrap();
    assert_eq!(unchanged.status(), InvoiceStatus::Draft);

    engine
        .change_invoice_status(invoice.id_typed(), user, InvoiceStatus::Sent, Utc::now())
        .unwrap();
    let not_yet = engine
        .mark_invoice_overdue(invoice.id_typed(), user, Utc::now())
        .unwrap();
    assert_eq!(not_yet.status(), InvoiceStatus::Sent);

    let overdue = engine
        .mark_invoice_overdue(invoice.id_typed(), user, after_due)
        .unwrap();
    assert_eq!(overdue.status(), InvoiceStatus::Overdue);
}

#[test]
fn audit_log_follows_the_order_through_its_life() {
    let engine = Engine::in_memory(EngineConfig::default());
    let id = simple_product(&engine, 300, 3);
    let user = UserId::new();
    let order = order_for(&engine, user, vec![RequestedLine::product(id, 1)]).unwrap();
    move_to(&engine, &order, DeliveryStatus::Processing).unwrap();
    move_to(&engine, &order, DeliveryStatus::Shipped).unwrap();
    move_to(&engine, &order, DeliveryStatus::Delivered).unwrap();

    let trail = engine.audit_log_for(&order.id_typed().to_string());
    let actions: Vec<_> = trail.iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::OrderCreated,
            AuditAction::OrderStatusChanged,
            AuditAction::OrderStatusChanged,
            AuditAction::OrderStatusChanged,
        ]
    );
    assert!(trail.iter().all(|e| e.model == "Order"));
    assert_eq!(engine.audit_log().len(), 4);
}

/// Numbering that continues from an existing counter.
struct ContinuedSequence(AtomicU64);

impl InvoiceSequence for ContinuedSequence {
    fn next(&self, _period: &str) -> DomainResult<u64> {
        Ok(self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[test]
fn engine_runs_over_supplied_stores() {
    let ledger = Arc::new(InMemoryStockLedger::new());
    let engine = Engine::with_stores(
        EngineConfig::default(),
        ledger.clone(),
        Arc::new(ContinuedSequence(AtomicU64::new(41))),
    );
    let id = simple_product(&engine, 700, 4);
    let user = UserId::new();

    let order = order_for(&engine, user, vec![RequestedLine::product(id, 3)]).unwrap();
    // Stock moves land in the supplied ledger.
    assert_eq!(ledger.stock(&id).unwrap().total_stock(), 1);

    let invoice = engine
        .generate_invoice(GenerateInvoiceRequest::new(order.id_typed(), user, Utc::now()))
        .unwrap();
    assert!(invoice.invoice_number().ends_with("-0042"));
}

#[tokio::test(flavor = "multi_thread")]
#[ignore = "requires DATABASE_URL pointing at a Postgres instance"]
async fn engine_over_postgres_reserves_and_restores() {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let stores = PgStores::connect(&url).await.unwrap();
    let engine = Engine::postgres(EngineConfig::default(), stores);

    let id = simple_product(&engine, 300, 2);
    let user = UserId::new();
    let order = order_for(&engine, user, vec![RequestedLine::product(id, 2)]).unwrap();
    assert_eq!(engine.stock(&id).unwrap().total_stock(), 0);

    let err = order_for(&engine, user, vec![RequestedLine::product(id, 1)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientStock);

    move_to(&engine, &order, DeliveryStatus::Cancelled).unwrap();
    let rec = engine.stock(&id).unwrap();
    assert_eq!(rec.total_stock(), 2);
    assert_eq!(rec.sales_count(), 0);

    let invoice = engine
        .generate_invoice(GenerateInvoiceRequest::new(order.id_typed(), user, Utc::now()))
        .unwrap();
    assert!(invoice.invoice_number().starts_with("INV-"));
}

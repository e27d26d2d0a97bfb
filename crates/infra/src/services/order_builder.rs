//! Order construction: price every line, reserve stock for the whole batch,
//! snapshot the shipping address and persist the order.
//!
//! ```text
//! request ─► structural validation ─► per line: catalog lookup, sellable,
//!            resolve price, advisory stock check
//!         ─► reserve(order_id, lines)        (all or nothing)
//!         ─► PlaceOrder via dispatcher        (on failure: restore)
//!         ─► ORDER_CREATED audit record
//! ```

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use fulfil_catalog::{price_breakdown, CatalogReader, ProductId};
use fulfil_core::{AggregateId, DomainError, StockShortfall, UserId};
use fulfil_events::{emit, AuditAction, AuditEvent, AuditSink};
use fulfil_inventory::{InventoryLedger, ReservationId, StockLine};
use fulfil_sales::{
    Order, OrderCommand, OrderId, OrderLine, Payment, PaymentStatus, PlaceOrder, ShippingAddress,
    UserProfiles,
};

use crate::config::EngineConfig;
use crate::services::{ServiceError, SharedDispatcher, ORDER_AGGREGATE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedLine {
    pub product_id: ProductId,
    pub variant_sku: Option<String>,
    pub quantity: u32,
}

impl RequestedLine {
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInput {
    pub method: String,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOrderRequest {
    pub user_id: UserId,
    pub lines: Vec<RequestedLine>,
    /// Per-field override of the profile's shipping address.
    pub shipping: Option<ShippingAddress>,
    pub payment: Option<PaymentInput>,
    pub shipping_price: Option<u64>,
    pub note: Option<String>,
    pub placed_at: DateTime<Utc>,
}

impl BuildOrderRequest {
    pub fn new(user_id: UserId, lines: Vec<RequestedLine>, placed_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            lines,
            shipping: None,
            payment: None,
            shipping_price: None,
            note: None,
            placed_at,
        }
    }

    fn violations(&self) -> Vec<String> {
        let mut v = Vec::new();
        if self.lines.is_empty() {
            v.push("order must have at least one line".to_string());
        }
        for (idx, line) in self.lines.iter().enumerate() {
            if line.quantity == 0 {
                v.push(format!("lines[{idx}].quantity must be at least 1"));
            }
            if line.variant_sku.as_deref().is_some_and(|s| s.trim().is_empty()) {
                v.push(format!("lines[{idx}].variant_sku cannot be blank"));
            }
        }
        if let Some(p) = &self.payment {
            if p.method.trim().is_empty() {
                v.push("payment.method cannot be empty".to_string());
            }
        }
        v
    }
}

pub struct OrderBuilder {
    catalog: Arc<dyn CatalogReader>,
    ledger: Arc<dyn InventoryLedger>,
    profiles: Arc<dyn UserProfiles>,
    dispatcher: SharedDispatcher,
    audit: Arc<dyn AuditSink>,
    pricing_offset: FixedOffset,
    default_payment_method: String,
    default_shipping_price: u64,
}

impl OrderBuilder {
    pub fn new(
        catalog: Arc<dyn CatalogReader>,
        ledger: Arc<dyn InventoryLedger>,
        profiles: Arc<dyn UserProfiles>,
        dispatcher: SharedDispatcher,
        audit: Arc<dyn AuditSink>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            catalog,
            ledger,
            profiles,
            dispatcher,
            audit,
            pricing_offset: config.pricing_offset(),
            default_payment_method: config.default_payment_method.clone(),
            default_shipping_price: config.default_shipping_price,
        }
    }

    #[instrument(
        skip(self, request),
        fields(user_id = %request.user_id, lines = request.lines.len()),
        err
    )]
    pub fn build_order(&self, request: BuildOrderRequest) -> Result<Order, ServiceError> {
        DomainError::check_violations(request.violations())?;

        let lines = match self.price_lines(&request) {
            Ok(lines) => lines,
            Err(err) => {
                warn!(error = %err, "order rejected while pricing lines");
                return Err(err.into());
            }
        };

        let order_id = OrderId::new(AggregateId::new());
        let reservation = ReservationId::new(order_id.0);
        let stock_lines = stock_lines(&lines);

        if let Err(err) = self.ledger.reserve(reservation, &stock_lines) {
            warn!(order_id = %order_id, error = %err, "stock reservation rejected");
            return Err(err.into());
        }

        let command = PlaceOrder {
            order_id,
            user_id: request.user_id,
            lines,
            shipping: self.shipping_snapshot(&request),
            payment: self.payment(&request),
            shipping_price: request.shipping_price.unwrap_or(self.default_shipping_price),
            tax_price: 0,
            note: request.note.clone(),
            occurred_at: request.placed_at,
        };

        let placed = self.dispatcher.dispatch(
            order_id.0,
            ORDER_AGGREGATE,
            OrderCommand::PlaceOrder(command),
            |id| Order::empty(OrderId::new(id)),
        );

        let order = match placed {
            Ok(out) => out.aggregate,
            Err(err) => {
                match self.ledger.restore(reservation, &stock_lines) {
                    Ok(true) => {}
                    Ok(false) => warn!(order_id = %order_id, "reservation already restored"),
                    Err(restore_err) => error!(
                        order_id = %order_id,
                        error = %restore_err,
                        "failed to restore stock after order persistence failure"
                    ),
                }
                return Err(err.into());
            }
        };

        let totals = order.totals();
        emit(
            self.audit.as_ref(),
            AuditEvent::new(
                AuditAction::OrderCreated,
                "Order",
                order_id,
                request.user_id,
                request.placed_at,
            )
            .with_new_values(json!({
                "delivery_status": order.delivery_status(),
                "items_price": totals.items_price,
                "shipping_price": totals.shipping_price,
                "total_price": totals.total_price,
                "lines": order.lines().len(),
            }))
            .with_description(format!("order {order_id} placed")),
        );

        info!(order_id = %order_id, total_price = totals.total_price, "order placed");
        Ok(order)
    }

    fn price_lines(&self, request: &BuildOrderRequest) -> Result<Vec<OrderLine>, DomainError> {
        let at = request
            .placed_at
            .with_timezone(&self.pricing_offset)
            .naive_local();

        request
            .lines
            .iter()
            .map(|line| {
                let sku = line.variant_sku.as_deref();
                let product = self
                    .catalog
                    .product(&line.product_id)
                    .ok_or_else(|| DomainError::not_found("product", line.product_id))?;
                product.ensure_sellable()?;

                let terms = product.pricing_for(sku)?;
                let price = price_breakdown(terms.base_price, terms.discount, terms.schedule, at);

                let available = self.ledger.available(&line.product_id, sku)?;
                if available < line.quantity {
                    return Err(DomainError::insufficient_stock(StockShortfall {
                        product_id: line.product_id.to_string(),
                        variant_sku: line.variant_sku.clone(),
                        requested: line.quantity,
                        available,
                    }));
                }

                let line_total = price
                    .effective
                    .checked_mul(u64::from(line.quantity))
                    .ok_or_else(|| DomainError::invariant("line total overflow"))?;

                Ok(OrderLine {
                    product_id: line.product_id,
                    variant_sku: line.variant_sku.clone(),
                    quantity: line.quantity,
                    unit_price: price.effective,
                    original_price: price.original,
                    discount_amount: price.discount_per_unit,
                    line_total,
                    product_name: product.name().to_string(),
                    image: product.image().map(str::to_string),
                })
            })
            .collect()
    }

    fn shipping_snapshot(&self, request: &BuildOrderRequest) -> ShippingAddress {
        let profile = self.profiles.profile(&request.user_id);
        let profile_shipping = profile.as_ref().and_then(|p| p.shipping.as_ref());
        let profile_billing = profile.as_ref().and_then(|p| p.billing.as_ref());
        ShippingAddress::merged(&[request.shipping.as_ref(), profile_shipping, profile_billing])
    }

    fn payment(&self, request: &BuildOrderRequest) -> Payment {
        match &request.payment {
            Some(p) => Payment {
                method: p.method.trim().to_string(),
                status: p.status,
                transaction_id: p.transaction_id.clone(),
            },
            None => Payment {
                method: self.default_payment_method.clone(),
                status: PaymentStatus::Pending,
                transaction_id: None,
            },
        }
    }
}

pub(crate) fn stock_lines(lines: &[OrderLine]) -> Vec<StockLine> {
    lines
        .iter()
        .map(|l| StockLine {
            product_id: l.product_id,
            variant_sku: l.variant_sku.clone(),
            quantity: l.quantity,
        })
        .collect()
}

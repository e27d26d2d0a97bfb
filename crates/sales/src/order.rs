use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fulfil_catalog::ProductId;
use fulfil_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use fulfil_events::Event;

use crate::shipping::ShippingAddress;

/// Order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Delivery status lifecycle.
///
/// `pending → processing → shipped → delivered`, with `cancelled` reachable
/// from any of the first three. `delivered` and `cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl DeliveryStatus {
    pub const ALL: [DeliveryStatus; 5] = [
        DeliveryStatus::Pending,
        DeliveryStatus::Processing,
        DeliveryStatus::Shipped,
        DeliveryStatus::Delivered,
        DeliveryStatus::Cancelled,
    ];

    pub fn can_transition_to(self, target: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        matches!(
            (self, target),
            (Pending, Processing)
                | (Pending, Cancelled)
                | (Processing, Shipped)
                | (Processing, Cancelled)
                | (Shipped, Delivered)
                | (Shipped, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Processing => "processing",
            DeliveryStatus::Shipped => "shipped",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status, shared by orders and invoices. Not gated by any table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
    Partial,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Partial => "partial",
        }
    }
}

impl core::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment sub-record of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub method: String,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
}

/// Priced line snapshot. Never re-priced after the order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub variant_sku: Option<String>,
    pub quantity: u32,
    /// Resolved (post-discount) unit price in smallest currency unit.
    pub unit_price: u64,
    /// Pre-discount unit price.
    pub original_price: u64,
    /// Discount applied per unit.
    pub discount_amount: u64,
    pub line_total: u64,
    pub product_name: String,
    pub image: Option<String>,
}

impl OrderLine {
    fn violations(&self, idx: usize) -> Vec<String> {
        let mut v = Vec::new();
        if self.quantity == 0 {
            v.push(format!("lines[{idx}].quantity must be at least 1"));
        }
        if self.unit_price.checked_add(self.discount_amount) != Some(self.original_price) {
            v.push(format!(
                "lines[{idx}] unit_price + discount_amount must equal original_price"
            ));
        }
        if self.unit_price.checked_mul(u64::from(self.quantity)) != Some(self.line_total) {
            v.push(format!("lines[{idx}].line_total must equal unit_price * quantity"));
        }
        v
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderTotals {
    pub items_price: u64,
    pub shipping_price: u64,
    pub tax_price: u64,
    pub total_price: u64,
}

impl OrderTotals {
    /// `items = Σ line totals`, `total = items + shipping + tax`.
    pub fn compute(
        lines: &[OrderLine],
        shipping_price: u64,
        tax_price: u64,
    ) -> Result<Self, DomainError> {
        let items_price = lines.iter().try_fold(0u64, |acc, l| {
            acc.checked_add(l.line_total)
                .ok_or_else(|| DomainError::invariant("order items total overflow"))
        })?;
        let total_price = items_price
            .checked_add(shipping_price)
            .and_then(|t| t.checked_add(tax_price))
            .ok_or_else(|| DomainError::invariant("order total overflow"))?;
        Ok(Self {
            items_price,
            shipping_price,
            tax_price,
            total_price,
        })
    }
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    user_id: Option<UserId>,
    placed_at: Option<DateTime<Utc>>,
    lines: Vec<OrderLine>,
    shipping: ShippingAddress,
    payment: Option<Payment>,
    totals: OrderTotals,
    delivery_status: DeliveryStatus,
    note: Option<String>,
    delivered_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            user_id: None,
            placed_at: None,
            lines: Vec::new(),
            shipping: ShippingAddress::default(),
            payment: None,
            totals: OrderTotals::default(),
            delivery_status: DeliveryStatus::Pending,
            note: None,
            delivered_at: None,
            cancelled_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn placed_at(&self) -> Option<DateTime<Utc>> {
        self.placed_at
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn shipping(&self) -> &ShippingAddress {
        &self.shipping
    }

    pub fn payment(&self) -> Option<&Payment> {
        self.payment.as_ref()
    }

    pub fn totals(&self) -> OrderTotals {
        self.totals
    }

    pub fn delivery_status(&self) -> DeliveryStatus {
        self.delivery_status
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        self.cancelled_at
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder. Lines arrive already priced and stock-committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub lines: Vec<OrderLine>,
    pub shipping: ShippingAddress,
    pub payment: Payment,
    pub shipping_price: u64,
    pub tax_price: u64,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeDeliveryStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDeliveryStatus {
    pub order_id: OrderId,
    pub target: DeliveryStatus,
    /// Optimistic guard: fail with `Conflict` unless the order is still here.
    pub expected_current: Option<DeliveryStatus>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdatePaymentStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePaymentStatus {
    pub order_id: OrderId,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    ChangeDeliveryStatus(ChangeDeliveryStatus),
    UpdatePaymentStatus(UpdatePaymentStatus),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub lines: Vec<OrderLine>,
    pub shipping: ShippingAddress,
    pub payment: Payment,
    pub totals: OrderTotals,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DeliveryStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryStatusChanged {
    pub order_id: OrderId,
    pub from: DeliveryStatus,
    pub to: DeliveryStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentStatusUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusUpdated {
    pub order_id: OrderId,
    pub from: PaymentStatus,
    pub to: PaymentStatus,
    pub transaction_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    DeliveryStatusChanged(DeliveryStatusChanged),
    PaymentStatusUpdated(PaymentStatusUpdated),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "sales.order.placed",
            OrderEvent::DeliveryStatusChanged(_) => "sales.order.delivery_status_changed",
            OrderEvent::PaymentStatusUpdated(_) => "sales.order.payment_status_updated",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::DeliveryStatusChanged(e) => e.occurred_at,
            OrderEvent::PaymentStatusUpdated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.user_id = Some(e.user_id);
                self.placed_at = Some(e.occurred_at);
                self.lines = e.lines.clone();
                self.shipping = e.shipping.clone();
                self.payment = Some(e.payment.clone());
                self.totals = e.totals;
                self.note = e.note.clone();
                self.delivery_status = DeliveryStatus::Pending;
                self.created = true;
            }
            OrderEvent::DeliveryStatusChanged(e) => {
                self.delivery_status = e.to;
                match e.to {
                    DeliveryStatus::Delivered => self.delivered_at = Some(e.occurred_at),
                    DeliveryStatus::Cancelled => self.cancelled_at = Some(e.occurred_at),
                    _ => {}
                }
            }
            OrderEvent::PaymentStatusUpdated(e) => {
                if let Some(payment) = self.payment.as_mut() {
                    payment.status = e.to;
                    if e.transaction_id.is_some() {
                        payment.transaction_id = e.transaction_id.clone();
                    }
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::ChangeDeliveryStatus(cmd) => self.handle_change_status(cmd),
            OrderCommand::UpdatePaymentStatus(cmd) => self.handle_update_payment(cmd),
        }
    }
}

impl Order {
    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("order", self.id));
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: OrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        self.ensure_order_id(cmd.order_id)?;

        let mut violations = Vec::new();
        if cmd.lines.is_empty() {
            violations.push("order must have at least one line".to_string());
        }
        for (idx, line) in cmd.lines.iter().enumerate() {
            violations.extend(line.violations(idx));
        }
        if cmd.payment.method.trim().is_empty() {
            violations.push("payment.method cannot be empty".to_string());
        }
        DomainError::check_violations(violations)?;

        let totals = OrderTotals::compute(&cmd.lines, cmd.shipping_price, cmd.tax_price)?;

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            order_id: cmd.order_id,
            user_id: cmd.user_id,
            lines: cmd.lines.clone(),
            shipping: cmd.shipping.clone(),
            payment: cmd.payment.clone(),
            totals,
            note: cmd.note.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_status(
        &self,
        cmd: &ChangeDeliveryStatus,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_order_id(cmd.order_id)?;

        if let Some(expected) = cmd.expected_current {
            if expected != self.delivery_status {
                return Err(DomainError::conflict(format!(
                    "order {} is {}, expected {}",
                    self.id, self.delivery_status, expected
                )));
            }
        }

        if !self.delivery_status.can_transition_to(cmd.target) {
            return Err(DomainError::invalid_transition(
                "order",
                self.delivery_status,
                cmd.target,
            ));
        }

        Ok(vec![OrderEvent::DeliveryStatusChanged(DeliveryStatusChanged {
            order_id: cmd.order_id,
            from: self.delivery_status,
            to: cmd.target,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update_payment(
        &self,
        cmd: &UpdatePaymentStatus,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_order_id(cmd.order_id)?;

        let from = self
            .payment
            .as_ref()
            .map(|p| p.status)
            .ok_or_else(|| DomainError::invariant("placed order has no payment record"))?;

        Ok(vec![OrderEvent::PaymentStatusUpdated(PaymentStatusUpdated {
            order_id: cmd.order_id,
            from,
            to: cmd.status,
            transaction_id: cmd.transaction_id.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use fulfil_core::{AggregateRoot, UserId};
use fulfil_infra::services::{BuildOrderRequest, PaymentInput, RequestedLine};
use fulfil_invoicing::{Invoice, InvoiceLine, InvoiceStatus, InvoiceTotals, TaxEntry};
use fulfil_sales::{
    DeliveryStatus, Order, OrderLine, OrderTotals, Payment, PaymentStatus, ShippingAddress,
};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub user_id: UserId,
    pub lines: Vec<RequestedLine>,
    pub shipping: Option<ShippingAddress>,
    pub payment: Option<PaymentInput>,
    pub shipping_price: Option<u64>,
    pub note: Option<String>,
}

impl PlaceOrderRequest {
    pub fn into_build_request(self, placed_at: DateTime<Utc>) -> BuildOrderRequest {
        BuildOrderRequest {
            user_id: self.user_id,
            lines: self.lines,
            shipping: self.shipping,
            payment: self.payment,
            shipping_price: self.shipping_price,
            note: self.note,
            placed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangeDeliveryStatusRequest {
    pub actor: UserId,
    pub status: DeliveryStatus,
    pub expected_current: Option<DeliveryStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePaymentStatusRequest {
    pub actor: UserId,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateInvoiceRequest {
    pub actor: UserId,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct RecordPaymentRequest {
    pub actor: UserId,
    pub amount: u64,
    pub method: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeInvoiceStatusRequest {
    pub actor: UserId,
    pub status: InvoiceStatus,
}

#[derive(Debug, Deserialize)]
pub struct ActorRequest {
    pub actor: UserId,
}

#[derive(Debug, Deserialize)]
pub struct SetStockRequest {
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub model_id: Option<String>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct OrderView {
    pub id: String,
    pub user_id: Option<UserId>,
    pub placed_at: Option<DateTime<Utc>>,
    pub lines: Vec<OrderLine>,
    pub shipping: ShippingAddress,
    pub payment: Option<Payment>,
    pub totals: OrderTotals,
    pub delivery_status: DeliveryStatus,
    pub note: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub version: u64,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id_typed().to_string(),
            user_id: order.user_id(),
            placed_at: order.placed_at(),
            lines: order.lines().to_vec(),
            shipping: order.shipping().clone(),
            payment: order.payment().cloned(),
            totals: order.totals(),
            delivery_status: order.delivery_status(),
            note: order.note().map(str::to_string),
            delivered_at: order.delivered_at(),
            cancelled_at: order.cancelled_at(),
            version: order.version(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceView {
    pub id: String,
    pub invoice_number: String,
    pub order_id: Option<String>,
    pub user_id: Option<UserId>,
    pub lines: Vec<InvoiceLine>,
    pub billing_address: ShippingAddress,
    pub tax_breakdown: Vec<TaxEntry>,
    pub totals: InvoiceTotals,
    pub status: InvoiceStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<String>,
    pub paid_amount: u64,
    pub remaining_amount: u64,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub paid_date: Option<DateTime<Utc>>,
    pub version: u64,
}

impl From<&Invoice> for InvoiceView {
    fn from(invoice: &Invoice) -> Self {
        Self {
            id: invoice.id_typed().to_string(),
            invoice_number: invoice.invoice_number().to_string(),
            order_id: invoice.order_id().map(|id| id.to_string()),
            user_id: invoice.user_id(),
            lines: invoice.lines().to_vec(),
            billing_address: invoice.billing_address().clone(),
            tax_breakdown: invoice.tax_breakdown().to_vec(),
            totals: invoice.totals(),
            status: invoice.status(),
            payment_status: invoice.payment_status(),
            payment_method: invoice.payment_method().map(str::to_string),
            paid_amount: invoice.paid_amount(),
            remaining_amount: invoice.remaining_amount(),
            issue_date: invoice.issue_date(),
            due_date: invoice.due_date(),
            paid_date: invoice.paid_date(),
            version: invoice.version(),
        }
    }
}

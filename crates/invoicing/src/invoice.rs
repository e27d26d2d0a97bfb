use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use fulfil_catalog::ProductId;
use fulfil_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use fulfil_events::Event;
use fulfil_sales::{OrderId, OrderLine, PaymentStatus, ShippingAddress};

/// Invoice identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvoiceId(pub AggregateId);

impl InvoiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Invoice status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 5] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::Paid,
        InvoiceStatus::Overdue,
        InvoiceStatus::Cancelled,
    ];

    /// Manual status changes. `paid` is only reached by recording payments.
    pub fn can_transition_to(self, target: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, target),
            (Draft, Sent)
                | (Draft, Cancelled)
                | (Sent, Overdue)
                | (Sent, Cancelled)
                | (Overdue, Sent)
                | (Overdue, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invoice line copied verbatim from an order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub product_id: ProductId,
    pub variant_sku: Option<String>,
    pub product_name: String,
    pub image: Option<String>,
    pub quantity: u32,
    /// Price in smallest currency unit (e.g., cents).
    pub unit_price: u64,
    pub original_price: u64,
    pub discount_amount: u64,
    pub line_total: u64,
}

impl From<&OrderLine> for InvoiceLine {
    fn from(line: &OrderLine) -> Self {
        Self {
            product_id: line.product_id,
            variant_sku: line.variant_sku.clone(),
            product_name: line.product_name.clone(),
            image: line.image.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            original_price: line.original_price,
            discount_amount: line.discount_amount,
            line_total: line.line_total,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxEntry {
    pub label: String,
    pub amount: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvoiceTotals {
    pub subtotal: u64,
    pub total_tax: u64,
    pub shipping_cost: u64,
    /// `subtotal + shipping + tax - order total`. Non-zero only when the
    /// order's own totals disagree with its lines.
    pub discount: i64,
    pub total_amount: u64,
}

impl InvoiceTotals {
    fn reconcile(
        subtotal: u64,
        shipping_cost: u64,
        total_tax: u64,
        order_total: u64,
    ) -> Result<Self, DomainError> {
        let gross = i128::from(subtotal) + i128::from(shipping_cost) + i128::from(total_tax);
        let discount = i64::try_from(gross - i128::from(order_total))
            .map_err(|_| DomainError::invariant("invoice discount out of range"))?;
        Ok(Self {
            subtotal,
            total_tax,
            shipping_cost,
            discount,
            total_amount: order_total,
        })
    }
}

/// Aggregate root: Invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoice {
    id: InvoiceId,
    invoice_number: String,
    order_id: Option<OrderId>,
    user_id: Option<UserId>,
    lines: Vec<InvoiceLine>,
    billing_address: ShippingAddress,
    tax_breakdown: Vec<TaxEntry>,
    totals: InvoiceTotals,
    status: InvoiceStatus,
    payment_status: PaymentStatus,
    payment_method: Option<String>,
    paid_amount: u64,
    remaining_amount: u64,
    issue_date: Option<NaiveDate>,
    due_date: Option<NaiveDate>,
    paid_date: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl Invoice {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InvoiceId) -> Self {
        Self {
            id,
            invoice_number: String::new(),
            order_id: None,
            user_id: None,
            lines: Vec::new(),
            billing_address: ShippingAddress::default(),
            tax_breakdown: Vec::new(),
            totals: InvoiceTotals::default(),
            status: InvoiceStatus::Draft,
            payment_status: PaymentStatus::Pending,
            payment_method: None,
            paid_amount: 0,
            remaining_amount: 0,
            issue_date: None,
            due_date: None,
            paid_date: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> InvoiceId {
        self.id
    }

    /// Generated and not deleted.
    pub fn exists(&self) -> bool {
        self.created && !self.deleted
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn invoice_number(&self) -> &str {
        &self.invoice_number
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn lines(&self) -> &[InvoiceLine] {
        &self.lines
    }

    pub fn billing_address(&self) -> &ShippingAddress {
        &self.billing_address
    }

    pub fn tax_breakdown(&self) -> &[TaxEntry] {
        &self.tax_breakdown
    }

    pub fn totals(&self) -> InvoiceTotals {
        self.totals
    }

    pub fn total_amount(&self) -> u64 {
        self.totals.total_amount
    }

    pub fn status(&self) -> InvoiceStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn payment_method(&self) -> Option<&str> {
        self.payment_method.as_deref()
    }

    pub fn paid_amount(&self) -> u64 {
        self.paid_amount
    }

    pub fn remaining_amount(&self) -> u64 {
        self.remaining_amount
    }

    pub fn issue_date(&self) -> Option<NaiveDate> {
        self.issue_date
    }

    pub fn due_date(&self) -> Option<NaiveDate> {
        self.due_date
    }

    pub fn paid_date(&self) -> Option<DateTime<Utc>> {
        self.paid_date
    }

    /// Sent, not settled, and past its due date on `today`.
    pub fn is_overdue_on(&self, today: NaiveDate) -> bool {
        self.status == InvoiceStatus::Sent
            && self.remaining_amount > 0
            && self.due_date.is_some_and(|due| today > due)
    }
}

impl AggregateRoot for Invoice {
    type Id = InvoiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: GenerateInvoice. Carries the order figures the invoice is derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateInvoice {
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub lines: Vec<InvoiceLine>,
    pub billing_address: ShippingAddress,
    pub items_price: u64,
    pub shipping_price: u64,
    pub tax_price: u64,
    pub order_total: u64,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPayment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayment {
    pub invoice_id: InvoiceId,
    /// Payment amount in smallest currency unit.
    pub amount: u64,
    pub method: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeInvoiceStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeInvoiceStatus {
    pub invoice_id: InvoiceId,
    pub target: InvoiceStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteInvoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteInvoice {
    pub invoice_id: InvoiceId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceCommand {
    GenerateInvoice(GenerateInvoice),
    RecordPayment(RecordPayment),
    ChangeInvoiceStatus(ChangeInvoiceStatus),
    DeleteInvoice(DeleteInvoice),
}

/// Event: InvoiceGenerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceGenerated {
    pub invoice_id: InvoiceId,
    pub invoice_number: String,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub lines: Vec<InvoiceLine>,
    pub billing_address: ShippingAddress,
    pub tax_breakdown: Vec<TaxEntry>,
    pub totals: InvoiceTotals,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecorded {
    pub invoice_id: InvoiceId,
    pub amount: u64,
    pub new_paid_amount: u64,
    pub payment_status: PaymentStatus,
    pub method: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceStatusChanged {
    pub invoice_id: InvoiceId,
    pub from: InvoiceStatus,
    pub to: InvoiceStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InvoiceDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDeleted {
    pub invoice_id: InvoiceId,
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceEvent {
    InvoiceGenerated(InvoiceGenerated),
    PaymentRecorded(PaymentRecorded),
    InvoiceStatusChanged(InvoiceStatusChanged),
    InvoiceDeleted(InvoiceDeleted),
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InvoiceEvent::InvoiceGenerated(_) => "invoicing.invoice.generated",
            InvoiceEvent::PaymentRecorded(_) => "invoicing.invoice.payment_recorded",
            InvoiceEvent::InvoiceStatusChanged(_) => "invoicing.invoice.status_changed",
            InvoiceEvent::InvoiceDeleted(_) => "invoicing.invoice.deleted",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InvoiceEvent::InvoiceGenerated(e) => e.occurred_at,
            InvoiceEvent::PaymentRecorded(e) => e.occurred_at,
            InvoiceEvent::InvoiceStatusChanged(e) => e.occurred_at,
            InvoiceEvent::InvoiceDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Invoice {
    type Command = InvoiceCommand;
    type Event = InvoiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InvoiceEvent::InvoiceGenerated(e) => {
                self.id = e.invoice_id;
                self.invoice_number = e.invoice_number.clone();
                self.order_id = Some(e.order_id);
                self.user_id = Some(e.user_id);
                self.lines = e.lines.clone();
                self.billing_address = e.billing_address.clone();
                self.tax_breakdown = e.tax_breakdown.clone();
                self.totals = e.totals;
                self.status = InvoiceStatus::Draft;
                self.payment_status = PaymentStatus::Pending;
                self.paid_amount = 0;
                self.issue_date = Some(e.issue_date);
                self.due_date = Some(e.due_date);
                self.created = true;
            }
            InvoiceEvent::PaymentRecorded(e) => {
                self.paid_amount = e.new_paid_amount;
                self.payment_status = e.payment_status;
                if e.method.is_some() {
                    self.payment_method = e.method.clone();
                }
                if e.payment_status == PaymentStatus::Paid {
                    self.status = InvoiceStatus::Paid;
                    self.paid_date = Some(e.occurred_at);
                }
            }
            InvoiceEvent::InvoiceStatusChanged(e) => {
                self.status = e.to;
            }
            InvoiceEvent::InvoiceDeleted(_) => {
                self.deleted = true;
            }
        }

        self.remaining_amount = self.totals.total_amount.saturating_sub(self.paid_amount);

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InvoiceCommand::GenerateInvoice(cmd) => self.handle_generate(cmd),
            InvoiceCommand::RecordPayment(cmd) => self.handle_record_payment(cmd),
            InvoiceCommand::ChangeInvoiceStatus(cmd) => self.handle_change_status(cmd),
            InvoiceCommand::DeleteInvoice(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Invoice {
    fn ensure_exists(&self) -> Result<(), DomainError> {
        if !self.exists() {
            return Err(DomainError::not_found("invoice", self.id));
        }
        Ok(())
    }

    fn ensure_invoice_id(&self, invoice_id: InvoiceId) -> Result<(), DomainError> {
        if self.id != invoice_id {
            return Err(DomainError::invariant("invoice_id mismatch"));
        }
        Ok(())
    }

    fn handle_generate(&self, cmd: &GenerateInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("invoice already exists"));
        }
        self.ensure_invoice_id(cmd.invoice_id)?;

        let mut violations = Vec::new();
        if cmd.invoice_number.trim().is_empty() {
            violations.push("invoice_number cannot be empty".to_string());
        }
        if cmd.lines.is_empty() {
            violations.push("cannot generate invoice without lines".to_string());
        }
        if cmd.due_date < cmd.issue_date {
            violations.push("due_date must not be before issue_date".to_string());
        }
        DomainError::check_violations(violations)?;

        let totals = InvoiceTotals::reconcile(
            cmd.items_price,
            cmd.shipping_price,
            cmd.tax_price,
            cmd.order_total,
        )?;
        let tax_breakdown = if cmd.tax_price > 0 {
            vec![TaxEntry {
                label: "tax".to_string(),
                amount: cmd.tax_price,
            }]
        } else {
            Vec::new()
        };

        Ok(vec![InvoiceEvent::InvoiceGenerated(InvoiceGenerated {
            invoice_id: cmd.invoice_id,
            invoice_number: cmd.invoice_number.clone(),
            order_id: cmd.order_id,
            user_id: cmd.user_id,
            lines: cmd.lines.clone(),
            billing_address: cmd.billing_address.clone(),
            tax_breakdown,
            totals,
            issue_date: cmd.issue_date,
            due_date: cmd.due_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_payment(
        &self,
        cmd: &RecordPayment,
    ) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if cmd.amount == 0 {
            return Err(DomainError::validation("payment amount must be positive"));
        }
        match self.status {
            InvoiceStatus::Cancelled => {
                return Err(DomainError::invalid_operation(
                    "cannot record payment on a cancelled invoice",
                ));
            }
            InvoiceStatus::Paid => {
                return Err(DomainError::invalid_operation(
                    "invoice is already fully paid",
                ));
            }
            _ => {}
        }

        let new_paid_amount = self
            .paid_amount
            .checked_add(cmd.amount)
            .ok_or_else(|| DomainError::invariant("payment total overflow"))?;
        if new_paid_amount > self.totals.total_amount {
            return Err(DomainError::invalid_operation(format!(
                "payment of {} exceeds remaining amount {}",
                cmd.amount, self.remaining_amount
            )));
        }

        let payment_status = if new_paid_amount >= self.totals.total_amount {
            PaymentStatus::Paid
        } else {
            PaymentStatus::Partial
        };

        Ok(vec![InvoiceEvent::PaymentRecorded(PaymentRecorded {
            invoice_id: cmd.invoice_id,
            amount: cmd.amount,
            new_paid_amount,
            payment_status,
            method: cmd.method.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_status(
        &self,
        cmd: &ChangeInvoiceStatus,
    ) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if !self.status.can_transition_to(cmd.target) {
            return Err(DomainError::invalid_transition(
                "invoice",
                self.status,
                cmd.target,
            ));
        }

        Ok(vec![InvoiceEvent::InvoiceStatusChanged(InvoiceStatusChanged {
            invoice_id: cmd.invoice_id,
            from: self.status,
            to: cmd.target,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteInvoice) -> Result<Vec<InvoiceEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_invoice_id(cmd.invoice_id)?;

        if self.status != InvoiceStatus::Draft {
            return Err(DomainError::invalid_operation(format!(
                "only draft invoices can be deleted (status: {})",
                self.status
            )));
        }
        let order_id = self
            .order_id
            .ok_or_else(|| DomainError::invariant("generated invoice has no order"))?;

        Ok(vec![InvoiceEvent::InvoiceDeleted(InvoiceDeleted {
            invoice_id: cmd.invoice_id,
            order_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulfil_core::ErrorKind;

    fn test_invoice_id() -> InvoiceId {
        InvoiceId::new(AggregateId::new())
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn single_line(unit_price: u64, quantity: u32) -> InvoiceLine {
        InvoiceLine {
            product_id: ProductId::new(AggregateId::new()),
            variant_sku: None,
            product_name: "Lamp".to_string(),
            image: None,
            quantity,
            unit_price,
            original_price: unit_price,
            discount_amount: 0,
            line_total: unit_price * u64::from(quantity),
        }
    }

    fn generate_cmd(invoice_id: InvoiceId, items: u64, shipping: u64, tax: u64) -> GenerateInvoice {
        GenerateInvoice {
            invoice_id,
            invoice_number: "INV-2026-03-0001".to_string(),
            order_id: OrderId::new(AggregateId::new()),
            user_id: UserId::new(),
            lines: vec![single_line(items, 1)],
            billing_address: ShippingAddress::default(),
            items_price: items,
            shipping_price: shipping,
            tax_price: tax,
            order_total: items + shipping + tax,
            issue_date: day(1),
            due_date: day(31),
            occurred_at: test_time(),
        }
    }

    fn generated(total: u64) -> Invoice {
        let invoice_id = test_invoice_id();
        let mut invoice = Invoice::empty(invoice_id);
        let events = invoice
            .handle(&InvoiceCommand::GenerateInvoice(generate_cmd(invoice_id, total, 0, 0)))
            .unwrap();
        invoice.apply(&events[0]);
        invoice
    }

    fn pay(invoice: &mut Invoice, amount: u64) -> Result<(), DomainError> {
        let events = invoice.handle(&InvoiceCommand::RecordPayment(RecordPayment {
            invoice_id: invoice.id_typed(),
            amount,
            method: Some("bkash".to_string()),
            occurred_at: test_time(),
        }))?;
        invoice.apply(&events[0]);
        Ok(())
    }

    fn set_status(invoice: &mut Invoice, target: InvoiceStatus) -> Result<(), DomainError> {
        let events = invoice.handle(&InvoiceCommand::ChangeInvoiceStatus(ChangeInvoiceStatus {
            invoice_id: invoice.id_typed(),
            target,
            occurred_at: test_time(),
        }))?;
        invoice.apply(&events[0]);
        Ok(())
    }

    #[test]
    fn generate_starts_as_unpaid_draft() {
        let invoice = generated(1_000);
        assert_eq!(invoice.status(), InvoiceStatus::Draft);
        assert_eq!(invoice.payment_status(), PaymentStatus::Pending);
        assert_eq!(invoice.paid_amount(), 0);
        assert_eq!(invoice.remaining_amount(), 1_000);
        assert!(invoice.tax_breakdown().is_empty());
        assert_eq!(invoice.totals().discount, 0);
    }

    #[test]
    fn tax_gets_one_breakdown_entry() {
        let invoice_id = test_invoice_id();
        let events = Invoice::empty(invoice_id)
            .handle(&InvoiceCommand::GenerateInvoice(generate_cmd(invoice_id, 500, 60, 25)))
            .unwrap();
        match &events[0] {
            InvoiceEvent::InvoiceGenerated(e) => {
                assert_eq!(
                    e.tax_breakdown,
                    vec![TaxEntry { label: "tax".to_string(), amount: 25 }]
                );
                assert_eq!(e.totals.total_tax, 25);
                assert_eq!(e.totals.total_amount, 585);
            }
            _ => panic!("Expected InvoiceGenerated event"),
        }
    }

    #[test]
    fn discount_absorbs_total_mismatch() {
        let invoice_id = test_invoice_id();
        let mut cmd = generate_cmd(invoice_id, 500, 60, 0);
        cmd.order_total = 520;
        let events = Invoice::empty(invoice_id)
            .handle(&InvoiceCommand::GenerateInvoice(cmd.clone()))
            .unwrap();
        match &events[0] {
            InvoiceEvent::InvoiceGenerated(e) => {
                assert_eq!(e.totals.discount, 40);
                assert_eq!(e.totals.total_amount, 520);
            }
            _ => panic!("Expected InvoiceGenerated event"),
        }

        cmd.order_total = 600;
        let events = Invoice::empty(invoice_id)
            .handle(&InvoiceCommand::GenerateInvoice(cmd))
            .unwrap();
        match &events[0] {
            InvoiceEvent::InvoiceGenerated(e) => assert_eq!(e.totals.discount, -40),
            _ => panic!("Expected InvoiceGenerated event"),
        }
    }

    #[test]
    fn due_date_before_issue_date_is_invalid() {
        let invoice_id = test_invoice_id();
        let mut cmd = generate_cmd(invoice_id, 100, 0, 0);
        cmd.due_date = day(1) - chrono::Duration::days(1);
        let err = Invoice::empty(invoice_id)
            .handle(&InvoiceCommand::GenerateInvoice(cmd))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    }

    #[test]
    fn two_payments_settle_the_invoice() {
        let mut invoice = generated(1_000);

        pay(&mut invoice, 400).unwrap();
        assert_eq!(invoice.payment_status(), PaymentStatus::Partial);
        assert_eq!(invoice.remaining_amount(), 600);
        assert_eq!(invoice.status(), InvoiceStatus::Draft);
        assert!(invoice.paid_date().is_none());

        pay(&mut invoice, 600).unwrap();
        assert_eq!(invoice.payment_status(), PaymentStatus::Paid);
        assert_eq!(invoice.status(), InvoiceStatus::Paid);
        assert_eq!(invoice.remaining_amount(), 0);
        assert!(invoice.paid_date().is_some());
        assert_eq!(invoice.payment_method(), Some("bkash"));
    }

    #[test]
    fn overpayment_is_rejected_and_changes_nothing() {
        let mut invoice = generated(1_000);
        pay(&mut invoice, 400).unwrap();
        let before = invoice.clone();

        let err = pay(&mut invoice, 700).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert_eq!(invoice, before);
        assert_eq!(invoice.paid_amount(), 400);
    }

    #[test]
    fn zero_payment_is_a_validation_error() {
        let mut invoice = generated(1_000);
        assert_eq!(pay(&mut invoice, 0).unwrap_err().kind(), ErrorKind::ValidationFailed);
    }

    #[test]
    fn cannot_pay_cancelled_or_settled_invoice() {
        let mut cancelled = generated(100);
        set_status(&mut cancelled, InvoiceStatus::Cancelled).unwrap();
        assert_eq!(pay(&mut cancelled, 10).unwrap_err().kind(), ErrorKind::InvalidOperation);

        let mut settled = generated(100);
        pay(&mut settled, 100).unwrap();
        match pay(&mut settled, 1).unwrap_err() {
            DomainError::InvalidOperation(msg) if msg.contains("fully paid") => {}
            _ => panic!("Expected InvalidOperation for settled invoice"),
        }
    }

    #[test]
    fn status_table_is_enforced() {
        let mut invoice = generated(100);
        set_status(&mut invoice, InvoiceStatus::Sent).unwrap();
        set_status(&mut invoice, InvoiceStatus::Overdue).unwrap();
        set_status(&mut invoice, InvoiceStatus::Sent).unwrap();

        let err = set_status(&mut invoice, InvoiceStatus::Paid).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        set_status(&mut invoice, InvoiceStatus::Cancelled).unwrap();
        for target in InvoiceStatus::ALL {
            assert!(set_status(&mut invoice, target).is_err());
        }
    }

    #[test]
    fn overdue_check_needs_sent_unpaid_and_past_due() {
        let mut invoice = generated(100);
        assert!(!invoice.is_overdue_on(day(31) + chrono::Duration::days(1)));

        set_status(&mut invoice, InvoiceStatus::Sent).unwrap();
        assert!(!invoice.is_overdue_on(day(31)));
        assert!(invoice.is_overdue_on(day(31) + chrono::Duration::days(1)));

        pay(&mut invoice, 100).unwrap();
        assert!(!invoice.is_overdue_on(day(31) + chrono::Duration::days(1)));
    }

    #[test]
    fn only_draft_invoices_can_be_deleted() {
        let mut sent = generated(100);
        set_status(&mut sent, InvoiceStatus::Sent).unwrap();
        let err = sent
            .handle(&InvoiceCommand::DeleteInvoice(DeleteInvoice {
                invoice_id: sent.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);

        let mut draft = generated(100);
        let events = draft
            .handle(&InvoiceCommand::DeleteInvoice(DeleteInvoice {
                invoice_id: draft.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap();
        draft.apply(&events[0]);
        assert!(!draft.exists());
        assert_eq!(pay(&mut draft, 1).unwrap_err().kind(), ErrorKind::NotFound);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: paid + remaining == total after every accepted payment,
            /// and paid never exceeds total.
            #[test]
            fn payments_never_exceed_total(
                total in 1u64..100_000,
                amounts in prop::collection::vec(0u64..50_000, 1..20),
            ) {
                let mut invoice = generated(total);
                for amount in amounts {
                    let _ = pay(&mut invoice, amount);
                    prop_assert!(invoice.paid_amount() <= total);
                    prop_assert_eq!(invoice.paid_amount() + invoice.remaining_amount(), total);
                }
                prop_assert_eq!(
                    invoice.status() == InvoiceStatus::Paid,
                    invoice.remaining_amount() == 0
                );
            }
        }
    }
}

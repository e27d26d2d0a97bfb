//! Invoice generation from committed orders, payments and invoice status.
//!
//! One invoice per order is enforced by claiming the order's slot in the
//! `InvoiceIndex` before anything is persisted; the claim is released again
//! when persistence fails or the draft invoice is deleted.

use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

use fulfil_core::{AggregateId, DomainError, UserId};
use fulfil_events::{emit, AuditAction, AuditEvent, AuditSink, Severity};
use fulfil_invoicing::{
    ChangeInvoiceStatus, Claim, DeleteInvoice, GenerateInvoice, Invoice, InvoiceCommand,
    InvoiceEvent, InvoiceId, InvoiceIndex, InvoiceLine, InvoiceNumberFormat, InvoiceSequence,
    InvoiceStatus, RecordPayment,
};
use fulfil_sales::{Order, OrderId, ShippingAddress, UserProfiles};

use crate::config::EngineConfig;
use crate::services::{ServiceError, SharedDispatcher, INVOICE_AGGREGATE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateInvoiceRequest {
    pub order_id: OrderId,
    pub actor: UserId,
    pub issue_date: NaiveDate,
    /// Defaults to `issue_date` plus the configured number of days.
    pub due_date: Option<NaiveDate>,
    pub at: DateTime<Utc>,
}

impl GenerateInvoiceRequest {
    pub fn new(order_id: OrderId, actor: UserId, at: DateTime<Utc>) -> Self {
        Self {
            order_id,
            actor,
            issue_date: at.date_naive(),
            due_date: None,
            at,
        }
    }
}

pub struct InvoiceGenerator {
    dispatcher: SharedDispatcher,
    sequence: Arc<dyn InvoiceSequence>,
    index: Arc<dyn InvoiceIndex>,
    profiles: Arc<dyn UserProfiles>,
    audit: Arc<dyn AuditSink>,
    number_format: InvoiceNumberFormat,
    due_days: u32,
}

fn make_invoice(id: AggregateId) -> Invoice {
    Invoice::empty(InvoiceId::new(id))
}

impl InvoiceGenerator {
    pub fn new(
        dispatcher: SharedDispatcher,
        sequence: Arc<dyn InvoiceSequence>,
        index: Arc<dyn InvoiceIndex>,
        profiles: Arc<dyn UserProfiles>,
        audit: Arc<dyn AuditSink>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            dispatcher,
            sequence,
            index,
            profiles,
            audit,
            number_format: config.invoice_number_format(),
            due_days: config.invoice_due_days,
        }
    }

    pub fn invoice(&self, invoice_id: InvoiceId) -> Result<Invoice, ServiceError> {
        let invoice = self.dispatcher.load(invoice_id.0, make_invoice)?;
        if !invoice.exists() {
            return Err(DomainError::not_found("invoice", invoice_id).into());
        }
        Ok(invoice)
    }

    /// The invoice currently holding the order's slot.
    pub fn invoice_for_order(&self, order_id: OrderId) -> Result<Option<Invoice>, ServiceError> {
        match self.index.lookup(order_id)? {
            Some(invoice_id) => {
                let invoice = self.dispatcher.load(invoice_id.0, make_invoice)?;
                Ok(invoice.exists().then_some(invoice))
            }
            None => Ok(None),
        }
    }

    fn slot_taken(&self, order_id: OrderId, holder: InvoiceId) -> ServiceError {
        match self.dispatcher.load(holder.0, make_invoice) {
            Ok(existing) if existing.exists() => {
                ServiceError::InvoiceAlreadyExists(Box::new(existing))
            }
            Ok(_) => DomainError::conflict(format!(
                "invoice generation for order {order_id} is already in progress"
            ))
            .into(),
            Err(err) => err.into(),
        }
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id), err)]
    pub fn generate_from_order(
        &self,
        request: GenerateInvoiceRequest,
    ) -> Result<Invoice, ServiceError> {
        let order_id = request.order_id;
        if let Some(holder) = self.index.lookup(order_id)? {
            return Err(self.slot_taken(order_id, holder));
        }

        let order: Order = self
            .dispatcher
            .load(order_id.0, |id| Order::empty(OrderId::new(id)))?;
        if !order.exists() {
            return Err(DomainError::not_found("order", order_id).into());
        }
        let user_id = order
            .user_id()
            .ok_or_else(|| DomainError::invariant("placed order has no user"))?;

        let invoice_id = InvoiceId::new(AggregateId::new());
        if let Claim::Taken(holder) = self.index.claim(order_id, invoice_id)? {
            return Err(self.slot_taken(order_id, holder));
        }

        match self.persist(&request, &order, user_id, invoice_id) {
            Ok(invoice) => {
                emit(
                    self.audit.as_ref(),
                    AuditEvent::new(
                        AuditAction::InvoiceCreated,
                        "Invoice",
                        invoice_id,
                        request.actor,
                        request.at,
                    )
                    .with_new_values(json!({
                        "invoice_number": invoice.invoice_number(),
                        "order_id": order_id,
                        "total_amount": invoice.total_amount(),
                        "status": invoice.status(),
                    }))
                    .with_description(format!(
                        "invoice {} generated for order {order_id}",
                        invoice.invoice_number()
                    )),
                );
                info!(invoice_number = invoice.invoice_number(), "invoice generated");
                Ok(invoice)
            }
            Err(err) => {
                if let Err(release_err) = self.index.release(order_id, invoice_id) {
                    warn!(error = %release_err, "failed to release invoice slot");
                }
                warn!(error = %err, "invoice generation failed");
                Err(err)
            }
        }
    }

    fn persist(
        &self,
        request: &GenerateInvoiceRequest,
        order: &Order,
        user_id: UserId,
        invoice_id: InvoiceId,
    ) -> Result<Invoice, ServiceError> {
        let seq = self
            .sequence
            .next(&InvoiceNumberFormat::period_key(request.issue_date))?;
        let invoice_number = self.number_format.format(request.issue_date, seq);

        let due_date = match request.due_date {
            Some(d) => d,
            None => request
                .issue_date
                .checked_add_days(Days::new(u64::from(self.due_days)))
                .ok_or_else(|| DomainError::validation("due date out of range"))?,
        };

        let profile = self.profiles.profile(&user_id);
        let billing_address = ShippingAddress::merged(&[
            profile.as_ref().and_then(|p| p.billing.as_ref()),
            Some(order.shipping()),
        ]);

        let totals = order.totals();
        let command = InvoiceCommand::GenerateInvoice(GenerateInvoice {
            invoice_id,
            invoice_number,
            order_id: order.id_typed(),
            user_id,
            lines: order.lines().iter().map(InvoiceLine::from).collect(),
            billing_address,
            items_price: totals.items_price,
            shipping_price: totals.shipping_price,
            tax_price: totals.tax_price,
            order_total: totals.total_price,
            issue_date: request.issue_date,
            due_date,
            occurred_at: request.at,
        });

        let out = self
            .dispatcher
            .dispatch(invoice_id.0, INVOICE_AGGREGATE, command, make_invoice)?;
        Ok(out.aggregate)
    }

    #[instrument(skip(self, method), fields(invoice_id = %invoice_id), err)]
    pub fn record_payment(
        &self,
        invoice_id: InvoiceId,
        actor: UserId,
        amount: u64,
        method: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Invoice, ServiceError> {
        let command = InvoiceCommand::RecordPayment(RecordPayment {
            invoice_id,
            amount,
            method,
            occurred_at: at,
        });
        let out = self
            .dispatcher
            .dispatch(invoice_id.0, INVOICE_AGGREGATE, command, make_invoice)
            .inspect_err(|err| warn!(error = %err, "payment rejected"))?;
        let invoice = out.aggregate;

        emit(
            self.audit.as_ref(),
            AuditEvent::new(AuditAction::InvoiceUpdated, "Invoice", invoice_id, actor, at)
                .with_old_values(json!({
                    "paid_amount": invoice.paid_amount() - amount,
                }))
                .with_new_values(json!({
                    "paid_amount": invoice.paid_amount(),
                    "remaining_amount": invoice.remaining_amount(),
                    "payment_status": invoice.payment_status(),
                    "status": invoice.status(),
                }))
                .with_description(format!(
                    "payment of {amount} recorded on invoice {}",
                    invoice.invoice_number()
                )),
        );

        info!(remaining = invoice.remaining_amount(), "payment recorded");
        Ok(invoice)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id, target = %target), err)]
    pub fn change_status(
        &self,
        invoice_id: InvoiceId,
        actor: UserId,
        target: InvoiceStatus,
        at: DateTime<Utc>,
    ) -> Result<Invoice, ServiceError> {
        let command = InvoiceCommand::ChangeInvoiceStatus(ChangeInvoiceStatus {
            invoice_id,
            target,
            occurred_at: at,
        });
        let out = self
            .dispatcher
            .dispatch(invoice_id.0, INVOICE_AGGREGATE, command, make_invoice)
            .inspect_err(|err| warn!(error = %err, "invoice status change rejected"))?;

        let from = out.events.iter().find_map(|e| match e {
            InvoiceEvent::InvoiceStatusChanged(e) => Some(e.from),
            _ => None,
        });
        let invoice = out.aggregate;

        emit(
            self.audit.as_ref(),
            AuditEvent::new(AuditAction::InvoiceStatusChanged, "Invoice", invoice_id, actor, at)
                .with_old_values(json!({ "status": from }))
                .with_new_values(json!({ "status": invoice.status() }))
                .with_description(format!(
                    "invoice {} moved to {}",
                    invoice.invoice_number(),
                    invoice.status()
                )),
        );
        Ok(invoice)
    }

    /// Move a sent invoice past its due date with a balance left to `overdue`.
    /// Any other invoice is returned unchanged.
    pub fn mark_overdue(
        &self,
        invoice_id: InvoiceId,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<Invoice, ServiceError> {
        let invoice = self.invoice(invoice_id)?;
        if !invoice.is_overdue_on(now.date_naive()) {
            return Ok(invoice);
        }
        self.change_status(invoice_id, actor, InvoiceStatus::Overdue, now)
    }

    /// Delete a draft invoice and free its order for invoicing again.
    #[instrument(skip(self), fields(invoice_id = %invoice_id), err)]
    pub fn delete(
        &self,
        invoice_id: InvoiceId,
        actor: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let command = InvoiceCommand::DeleteInvoice(DeleteInvoice {
            invoice_id,
            occurred_at: at,
        });
        let out = self
            .dispatcher
            .dispatch(invoice_id.0, INVOICE_AGGREGATE, command, make_invoice)
            .inspect_err(|err| warn!(error = %err, "invoice deletion rejected"))?;

        let invoice = out.aggregate;
        if let Some(order_id) = invoice.order_id() {
            self.index.release(order_id, invoice_id)?;
        }

        emit(
            self.audit.as_ref(),
            AuditEvent::new(AuditAction::InvoiceDeleted, "Invoice", invoice_id, actor, at)
                .with_old_values(json!({
                    "invoice_number": invoice.invoice_number(),
                    "order_id": invoice.order_id(),
                    "status": invoice.status(),
                }))
                .with_description(format!("invoice {} deleted", invoice.invoice_number()))
                .with_severity(Severity::Warning),
        );
        info!(invoice_number = invoice.invoice_number(), "invoice deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulfil_core::ErrorKind;
    use fulfil_sales::{PaymentStatus, UserProfile};

    use crate::services::test_support::Harness;
    use crate::services::RequestedLine;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn request_on(order_id: OrderId, issue_date: NaiveDate) -> GenerateInvoiceRequest {
        GenerateInvoiceRequest {
            order_id,
            actor: UserId::new(),
            issue_date,
            due_date: None,
            at: Utc::now(),
        }
    }

    #[test]
    fn invoice_copies_order_and_numbers_by_month() {
        let h = Harness::new();
        let mug = h.seed_simple("Mug", 450, 10);
        let user = UserId::new();
        let first = h.place(user, vec![RequestedLine::product(mug, 2)]);
        let second = h.place(user, vec![RequestedLine::product(mug, 1)]);
        let generator = h.invoices();

        let a = generator.generate_from_order(request_on(first.id_typed(), date(2026, 3, 9))).unwrap();
        let b = generator.generate_from_order(request_on(second.id_typed(), date(2026, 3, 10))).unwrap();

        assert_eq!(a.invoice_number(), "INV-2026-03-0001");
        assert_eq!(b.invoice_number(), "INV-2026-03-0002");
        assert_eq!(a.lines().len(), 1);
        assert_eq!(a.total_amount(), 900);
        assert_eq!(a.totals().discount, 0);
        assert!(a.tax_breakdown().is_empty());
        assert_eq!(a.status(), InvoiceStatus::Draft);
        assert_eq!(a.payment_status(), PaymentStatus::Pending);
        assert_eq!(a.due_date(), Some(date(2026, 4, 8)));
        assert_eq!(h.audit.with_action(AuditAction::InvoiceCreated).len(), 2);
    }

    #[test]
    fn second_generation_returns_existing_invoice() {
        let h = Harness::new();
        let mug = h.seed_simple("Mug", 450, 10);
        let order = h.place(UserId::new(), vec![RequestedLine::product(mug, 1)]);
        let generator = h.invoices();

        let first = generator.generate_from_order(request_on(order.id_typed(), date(2026, 3, 9))).unwrap();
        let err = generator
            .generate_from_order(request_on(order.id_typed(), date(2026, 3, 9)))
            .unwrap_err();

        match err {
            ServiceError::InvoiceAlreadyExists(existing) => {
                assert_eq!(existing.invoice_number(), first.invoice_number());
            }
            other => panic!("Expected InvoiceAlreadyExists, got {other:?}"),
        }
        // No number was consumed by the rejected attempt.
        let next = h.place(UserId::new(), vec![RequestedLine::product(mug, 1)]);
        let inv = generator.generate_from_order(request_on(next.id_typed(), date(2026, 3, 9))).unwrap();
        assert_eq!(inv.invoice_number(), "INV-2026-03-0002");
    }

    #[test]
    fn missing_order_is_not_found_and_leaves_no_claim() {
        let h = Harness::new();
        let missing = OrderId::new(AggregateId::new());

        let err = h
            .invoices()
            .generate_from_order(request_on(missing, date(2026, 3, 9)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(h.index.lookup(missing).unwrap(), None);
    }

    #[test]
    fn billing_prefers_profile_then_order_shipping() {
        let h = Harness::new();
        let mug = h.seed_simple("Mug", 450, 10);
        let user = UserId::new();
        h.profiles.upsert(
            user,
            UserProfile {
                shipping: Some(ShippingAddress {
                    full_name: Some("Rahim Uddin".to_string()),
                    district: Some("Sylhet".to_string()),
                    ..ShippingAddress::default()
                }),
                billing: Some(ShippingAddress {
                    district: Some("Dhaka".to_string()),
                    ..ShippingAddress::default()
                }),
            },
        );
        let order = h.place(user, vec![RequestedLine::product(mug, 1)]);

        let invoice = h
            .invoices()
            .generate_from_order(request_on(order.id_typed(), date(2026, 3, 9)))
            .unwrap();
        assert_eq!(invoice.billing_address().district.as_deref(), Some("Dhaka"));
        assert_eq!(invoice.billing_address().full_name.as_deref(), Some("Rahim Uddin"));
    }

    #[test]
    fn partial_then_full_payment() {
        let h = Harness::new();
        let kettle = h.seed_simple("Kettle", 1000, 10);
        let order = h.place(UserId::new(), vec![RequestedLine::product(kettle, 1)]);
        let generator = h.invoices();
        let invoice = generator
            .generate_from_order(request_on(order.id_typed(), date(2026, 3, 9)))
            .unwrap();
        let id = invoice.id_typed();
        let actor = UserId::new();

        let inv = generator.record_payment(id, actor, 400, Some("card".to_string()), Utc::now()).unwrap();
        assert_eq!(inv.paid_amount(), 400);
        assert_eq!(inv.remaining_amount(), 600);
        assert_eq!(inv.payment_status(), PaymentStatus::Partial);

        let err = generator.record_payment(id, actor, 700, None, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);

        let inv = generator.record_payment(id, actor, 600, None, Utc::now()).unwrap();
        assert_eq!(inv.status(), InvoiceStatus::Paid);
        assert_eq!(inv.payment_status(), PaymentStatus::Paid);
        assert_eq!(inv.remaining_amount(), 0);
        assert!(inv.paid_date().is_some());
        assert_eq!(inv.payment_method(), Some("card"));

        let updates = h.audit.with_action(AuditAction::InvoiceUpdated);
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].old_values.as_ref().unwrap()["paid_amount"], 400);
    }

    #[test]
    fn overdue_only_after_due_date_while_sent() {
        let h = Harness::new();
        let mug = h.seed_simple("Mug", 450, 10);
        let order = h.place(UserId::new(), vec![RequestedLine::product(mug, 1)]);
        let generator = h.invoices();
        let mut req = request_on(order.id_typed(), date(2026, 3, 1));
        req.due_date = Some(date(2026, 3, 31));
        let id = generator.generate_from_order(req).unwrap().id_typed();
        let actor = UserId::new();
        let after_due = date(2026, 4, 2).and_hms_opt(9, 0, 0).unwrap().and_utc();

        // Drafts are never overdue.
        let inv = generator.mark_overdue(id, actor, after_due).unwrap();
        assert_eq!(inv.status(), InvoiceStatus::Draft);

        generator.change_status(id, actor, InvoiceStatus::Sent, Utc::now()).unwrap();
        let before_due = date(2026, 3, 31).and_hms_opt(9, 0, 0).unwrap().and_utc();
        assert_eq!(generator.mark_overdue(id, actor, before_due).unwrap().status(), InvoiceStatus::Sent);
        assert_eq!(generator.mark_overdue(id, actor, after_due).unwrap().status(), InvoiceStatus::Overdue);

        // Payments still settle an overdue invoice.
        let inv = generator.record_payment(id, actor, 450, None, Utc::now()).unwrap();
        assert_eq!(inv.status(), InvoiceStatus::Paid);
    }

    #[test]
    fn deleting_a_draft_frees_the_order() {
        let h = Harness::new();
        let mug = h.seed_simple("Mug", 450, 10);
        let order = h.place(UserId::new(), vec![RequestedLine::product(mug, 1)]);
        let generator = h.invoices();
        let actor = UserId::new();

        let first = generator
            .generate_from_order(request_on(order.id_typed(), date(2026, 3, 9)))
            .unwrap();
        generator.delete(first.id_typed(), actor, Utc::now()).unwrap();
        assert_eq!(generator.invoice(first.id_typed()).unwrap_err().kind(), ErrorKind::NotFound);

        let again = generator
            .generate_from_order(request_on(order.id_typed(), date(2026, 3, 9)))
            .unwrap();
        assert_ne!(again.id_typed(), first.id_typed());
        assert_eq!(again.invoice_number(), "INV-2026-03-0002");

        let deleted = h.audit.with_action(AuditAction::InvoiceDeleted);
        assert_eq!(deleted[0].severity, Severity::Warning);
    }

    #[test]
    fn sent_invoice_cannot_be_deleted() {
        let h = Harness::new();
        let mug = h.seed_simple("Mug", 450, 10);
        let order = h.place(UserId::new(), vec![RequestedLine::product(mug, 1)]);
        let generator = h.invoices();
        let actor = UserId::new();
        let id = generator
            .generate_from_order(request_on(order.id_typed(), date(2026, 3, 9)))
            .unwrap()
            .id_typed();
        generator.change_status(id, actor, InvoiceStatus::Sent, Utc::now()).unwrap();

        let err = generator.delete(id, actor, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert!(generator.invoice_for_order(order.id_typed()).unwrap().is_some());
    }
}

//! Delivery and payment status changes on placed orders.
//!
//! A cancellation gives the order's stock back through the ledger, keyed by
//! the order id, so it happens at most once however many times the
//! cancellation is observed. If the give-back fails after the cancellation is
//! committed, the caller gets the error and cancelling again finishes the job.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument, warn};

use fulfil_core::{DomainError, UserId};
use fulfil_events::{emit, AuditAction, AuditEvent, AuditSink, Severity};
use fulfil_inventory::{InventoryLedger, ReservationId};
use fulfil_sales::{
    ChangeDeliveryStatus, DeliveryStatus, Order, OrderCommand, OrderEvent, OrderId,
    PaymentStatus, UpdatePaymentStatus,
};

use crate::services::order_builder::stock_lines;
use crate::services::{ServiceError, SharedDispatcher, ORDER_AGGREGATE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub order_id: OrderId,
    pub actor: UserId,
    pub target: DeliveryStatus,
    /// Status the caller last saw; a different current status is a conflict.
    pub expected_current: Option<DeliveryStatus>,
    pub at: DateTime<Utc>,
}

pub struct OrderLifecycle {
    ledger: Arc<dyn InventoryLedger>,
    dispatcher: SharedDispatcher,
    audit: Arc<dyn AuditSink>,
}

fn make_order(id: fulfil_core::AggregateId) -> Order {
    Order::empty(OrderId::new(id))
}

impl OrderLifecycle {
    pub fn new(
        ledger: Arc<dyn InventoryLedger>,
        dispatcher: SharedDispatcher,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            ledger,
            dispatcher,
            audit,
        }
    }

    pub fn order(&self, order_id: OrderId) -> Result<Order, ServiceError> {
        let order = self.dispatcher.load(order_id.0, make_order)?;
        if !order.exists() {
            return Err(DomainError::not_found("order", order_id).into());
        }
        Ok(order)
    }

    #[instrument(
        skip(self, request),
        fields(order_id = %request.order_id, target = %request.target),
        err
    )]
    pub fn transition(&self, request: TransitionRequest) -> Result<Order, ServiceError> {
        if request.target == DeliveryStatus::Cancelled {
            if let Some(order) = self.pending_restore(request.order_id)? {
                return Ok(order);
            }
        }

        let command = OrderCommand::ChangeDeliveryStatus(ChangeDeliveryStatus {
            order_id: request.order_id,
            target: request.target,
            expected_current: request.expected_current,
            occurred_at: request.at,
        });

        let out = match self
            .dispatcher
            .dispatch(request.order_id.0, ORDER_AGGREGATE, command, make_order)
        {
            Ok(out) => out,
            Err(err) => {
                warn!(error = %err, "delivery status change rejected");
                return Err(err.into());
            }
        };
        // The committed event carries the status we actually moved from.
        let from = out.events.iter().find_map(|e| match e {
            OrderEvent::DeliveryStatusChanged(e) => Some(e.from),
            _ => None,
        });
        let order = out.aggregate;

        let severity = if request.target == DeliveryStatus::Cancelled {
            Severity::Warning
        } else {
            Severity::Info
        };
        emit(
            self.audit.as_ref(),
            AuditEvent::new(
                AuditAction::OrderStatusChanged,
                "Order",
                request.order_id,
                request.actor,
                request.at,
            )
            .with_old_values(json!({ "delivery_status": from }))
            .with_new_values(json!({ "delivery_status": order.delivery_status() }))
            .with_description(format!(
                "order {} moved to {}",
                request.order_id,
                order.delivery_status()
            ))
            .with_severity(severity),
        );

        info!(status = %order.delivery_status(), "delivery status changed");

        if request.target == DeliveryStatus::Cancelled {
            self.restore_stock(&order)?;
        }
        Ok(order)
    }

    /// Give back the stock of a cancelled order. Idempotent: returns
    /// `Ok(false)` when the stock was already back.
    #[instrument(skip(self), fields(order_id = %order_id), err)]
    pub fn restore_cancelled(&self, order_id: OrderId) -> Result<bool, ServiceError> {
        let order = self.order(order_id)?;
        if order.delivery_status() != DeliveryStatus::Cancelled {
            return Err(DomainError::invalid_operation(format!(
                "order {order_id} is {}, only cancelled orders give stock back",
                order.delivery_status()
            ))
            .into());
        }
        self.restore_stock(&order)
    }

    /// A cancel on an order that is already cancelled completes a give-back
    /// that failed earlier. `None` means the normal transition applies.
    fn pending_restore(&self, order_id: OrderId) -> Result<Option<Order>, ServiceError> {
        let order = match self.order(order_id) {
            Ok(order) => order,
            Err(ServiceError::Domain(DomainError::NotFound { .. })) => return Ok(None),
            Err(err) => return Err(err),
        };
        if order.delivery_status() != DeliveryStatus::Cancelled {
            return Ok(None);
        }
        if self.restore_stock(&order)? {
            return Ok(Some(order));
        }
        Ok(None)
    }

    fn restore_stock(&self, order: &Order) -> Result<bool, ServiceError> {
        let order_id = order.id_typed();
        let lines = stock_lines(order.lines());
        match self.ledger.restore(ReservationId::new(order_id.0), &lines) {
            Ok(true) => {
                info!(order_id = %order_id, "stock restored for cancelled order");
                Ok(true)
            }
            Ok(false) => {
                warn!(order_id = %order_id, "stock for cancelled order was already restored");
                Ok(false)
            }
            Err(err) => {
                error!(
                    order_id = %order_id,
                    error = %err,
                    "failed to restore stock for cancelled order"
                );
                Err(ServiceError::Infrastructure(format!(
                    "order {order_id} is cancelled but its stock was not restored ({err}); cancel again to retry"
                )))
            }
        }
    }

    /// Record a payment status change. Independent of delivery status.
    #[instrument(skip(self, transaction_id), fields(order_id = %order_id, status = %status), err)]
    pub fn update_payment_status(
        &self,
        order_id: OrderId,
        actor: UserId,
        status: PaymentStatus,
        transaction_id: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Order, ServiceError> {
        let command = OrderCommand::UpdatePaymentStatus(UpdatePaymentStatus {
            order_id,
            status,
            transaction_id,
            occurred_at: at,
        });

        let out = match self
            .dispatcher
            .dispatch(order_id.0, ORDER_AGGREGATE, command, make_order)
        {
            Ok(out) => out,
            Err(err) => {
                warn!(error = %err, "payment status update rejected");
                return Err(err.into());
            }
        };
        let from = out.events.iter().find_map(|e| match e {
            OrderEvent::PaymentStatusUpdated(e) => Some(e.from),
            _ => None,
        });
        let order = out.aggregate;

        emit(
            self.audit.as_ref(),
            AuditEvent::new(AuditAction::OrderStatusChanged, "Order", order_id, actor, at)
                .with_old_values(json!({ "payment_status": from }))
                .with_new_values(json!({
                    "payment_status": status,
                    "transaction_id": order.payment().and_then(|p| p.transaction_id.clone()),
                }))
                .with_description(format!("order {order_id} payment is {status}")),
        );

        Ok(order)
    }
}

//! Application services that drive the order and invoice aggregates.
//!
//! Each service owns the side effects around one workflow (stock movements,
//! numbering, audit records) and goes through the command dispatcher for every
//! state change, so optimistic concurrency is enforced in one place.

use std::sync::Arc;

use crate::command_dispatcher::CommandDispatcher;
use crate::event_store::EventStore;

pub mod error;
pub mod invoice_generator;
pub mod order_builder;
pub mod order_lifecycle;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::ServiceError;
pub use invoice_generator::{GenerateInvoiceRequest, InvoiceGenerator};
pub use order_builder::{BuildOrderRequest, OrderBuilder, PaymentInput, RequestedLine};
pub use order_lifecycle::{OrderLifecycle, TransitionRequest};

/// Dispatcher shared by every service, over whichever event store is wired in.
pub type SharedDispatcher = Arc<CommandDispatcher<Arc<dyn EventStore>>>;

pub const ORDER_AGGREGATE: &str = "sales.order";
pub const INVOICE_AGGREGATE: &str = "invoicing.invoice";

pub fn shared_dispatcher(store: Arc<dyn EventStore>) -> SharedDispatcher {
    Arc::new(CommandDispatcher::new(store))
}

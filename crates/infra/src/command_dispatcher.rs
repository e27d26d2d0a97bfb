//! Command execution pipeline for event-sourced aggregates.
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store
//!   ↓
//! 2. Rehydrate aggregate (apply historical events to rebuild state)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events to store (append-only, optimistic concurrency check)
//! ```
//!
//! The append expects the exact version the aggregate was rehydrated at, so
//! two commands racing on the same order or invoice cannot both commit: the
//! loser gets a `Conflict`.

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

use fulfil_core::{Aggregate, AggregateId, DomainError, ErrorKind, ExpectedVersion};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Deterministic domain failure, including optimistic-concurrency conflicts.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Failed to deserialize historical event payloads into the aggregate event type.
    #[error("failed to deserialize event history: {0}")]
    Deserialize(String),

    /// Loading or persisting through the event store failed.
    #[error(transparent)]
    Store(EventStoreError),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => DispatchError::Domain(DomainError::conflict(msg)),
            other => DispatchError::Store(other),
        }
    }
}

impl DispatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::Domain(e) => e.kind(),
            DispatchError::Deserialize(_) | DispatchError::Store(_) => ErrorKind::Internal,
        }
    }
}

/// Result of a committed command: the aggregate after applying the new events.
#[derive(Debug, Clone)]
pub struct Dispatched<A: Aggregate> {
    pub aggregate: A,
    /// The decided events, in commit order.
    pub events: Vec<A::Event>,
    pub committed: Vec<StoredEvent>,
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Generic over the store so tests can inject failing or in-memory backends.
#[derive(Debug)]
pub struct CommandDispatcher<S> {
    store: S,
}

impl<S> CommandDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S> CommandDispatcher<S>
where
    S: EventStore,
{
    /// Dispatch a command: load, rehydrate, decide, append.
    ///
    /// `make_aggregate` builds the empty instance to replay into, e.g.
    /// `|id| Order::empty(OrderId::new(id))`.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Dispatched<A>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: fulfil_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate aggregate
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(&command)?;
        if decided.is_empty() {
            return Ok(Dispatched {
                aggregate,
                events: decided,
                committed: vec![],
            });
        }

        // 4) Persist (append-only, optimistic)
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(aggregate_id, aggregate_type.clone(), Uuid::now_v7(), ev)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        for ev in &decided {
            aggregate.apply(ev);
        }

        Ok(Dispatched {
            aggregate,
            events: decided,
            committed,
        })
    }

    /// Rehydrate an aggregate without handling a command.
    pub fn load<A>(
        &self,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<A, DispatchError>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;
        Ok(aggregate)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fulfil_core::{AggregateRoot, UserId};
    use fulfil_sales::{
        ChangeDeliveryStatus, DeliveryStatus, Order, OrderCommand, OrderId, Payment,
        PaymentStatus, PlaceOrder, ShippingAddress,
    };

    use crate::event_store::InMemoryEventStore;

    fn place(order_id: OrderId) -> OrderCommand {
        OrderCommand::PlaceOrder(PlaceOrder {
            order_id,
            user_id: UserId::new(),
            lines: vec![fulfil_sales::OrderLine {
                product_id: fulfil_catalog::ProductId::new(AggregateId::new()),
                variant_sku: None,
                quantity: 1,
                unit_price: 100,
                original_price: 100,
                discount_amount: 0,
                line_total: 100,
                product_name: "Kettle".to_string(),
                image: None,
            }],
            shipping: ShippingAddress::default(),
            payment: Payment {
                method: "cash_on_delivery".to_string(),
                status: PaymentStatus::Pending,
                transaction_id: None,
            },
            shipping_price: 0,
            tax_price: 0,
            note: None,
            occurred_at: Utc::now(),
        })
    }

    fn make(id: AggregateId) -> Order {
        Order::empty(OrderId::new(id))
    }

    #[test]
    fn dispatch_returns_updated_aggregate() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let order_id = OrderId::new(AggregateId::new());

        let out = dispatcher
            .dispatch(order_id.0, "sales.order", place(order_id), make)
            .unwrap();
        assert_eq!(out.committed.len(), 1);
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.committed[0].event_type, "sales.order.placed");
        assert_eq!(out.aggregate.version(), 1);

        let loaded: Order = dispatcher.load(order_id.0, make).unwrap();
        assert_eq!(loaded, out.aggregate);
    }

    #[test]
    fn domain_errors_pass_through_with_their_kind() {
        let dispatcher = CommandDispatcher::new(InMemoryEventStore::new());
        let order_id = OrderId::new(AggregateId::new());

        let err = dispatcher
            .dispatch(
                order_id.0,
                "sales.order",
                OrderCommand::ChangeDeliveryStatus(ChangeDeliveryStatus {
                    order_id,
                    target: DeliveryStatus::Processing,
                    expected_current: None,
                    occurred_at: Utc::now(),
                }),
                make,
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn store_concurrency_maps_to_conflict() {
        let err: DispatchError = EventStoreError::Concurrency("stale".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err: DispatchError = EventStoreError::Unavailable("down".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}

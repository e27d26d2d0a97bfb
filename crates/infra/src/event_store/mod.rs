//! Append-only event store boundary.
//!
//! Order and invoice aggregates are persisted as event streams, one stream per
//! aggregate instance. This module defines the storage-agnostic contract plus
//! an in-memory implementation.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

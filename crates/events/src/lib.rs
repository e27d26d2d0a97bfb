//! Domain events and the audit trail.
//!
//! Aggregates describe what happened through [`Event`]s; services turn
//! committed changes into [`AuditEvent`]s for the external audit collaborator.

pub mod audit;
pub mod event;
pub mod in_memory_sink;
pub mod tracing_sink;

pub use audit::{emit, AuditAction, AuditEvent, AuditSink, AuditSinkError, Severity};
pub use event::Event;
pub use in_memory_sink::InMemoryAuditSink;
pub use tracing_sink::TracingAuditSink;

//! Audit sink that writes records to the `audit` tracing target.

use crate::audit::{AuditEvent, AuditSink, AuditSinkError};

/// Forwards audit events to the process log.
///
/// Pair with `fulfil_observability::init()` so the JSON formatter picks them up;
/// filter with `RUST_LOG=audit=info`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl TracingAuditSink {
    pub fn new() -> Self {
        Self
    }
}

impl AuditSink for TracingAuditSink {
    fn append(&self, event: AuditEvent) -> Result<(), AuditSinkError> {
        let old_values = event
            .old_values
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();
        let new_values = event
            .new_values
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();

        tracing::info!(
            target: "audit",
            action = %event.action,
            model = %event.model,
            model_id = %event.model_id,
            actor_id = %event.actor_id,
            severity = ?event.severity,
            old_values = %old_values,
            new_values = %new_values,
            occurred_at = %event.occurred_at,
            "{}",
            event.description
        );
        Ok(())
    }
}

//! Audit events handed to the external audit-log collaborator.
//!
//! The sink is fire-and-forget from the engine's point of view: a failing sink
//! is logged locally and never fails the order or invoice operation that
//! produced the record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use fulfil_core::UserId;

/// What happened, in the audit log's vocabulary.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    OrderCreated,
    OrderStatusChanged,
    InvoiceCreated,
    InvoiceUpdated,
    InvoiceStatusChanged,
    InvoiceDeleted,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::OrderCreated => "ORDER_CREATED",
            AuditAction::OrderStatusChanged => "ORDER_STATUS_CHANGED",
            AuditAction::InvoiceCreated => "INVOICE_CREATED",
            AuditAction::InvoiceUpdated => "INVOICE_UPDATED",
            AuditAction::InvoiceStatusChanged => "INVOICE_STATUS_CHANGED",
            AuditAction::InvoiceDeleted => "INVOICE_DELETED",
        }
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// One structured audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    /// Model name, e.g. `"Order"` or `"Invoice"`.
    pub model: String,
    pub model_id: String,
    pub actor_id: UserId,
    pub old_values: Option<JsonValue>,
    pub new_values: Option<JsonValue>,
    pub description: String,
    pub severity: Severity,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        action: AuditAction,
        model: impl Into<String>,
        model_id: impl ToString,
        actor_id: UserId,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            action,
            model: model.into(),
            model_id: model_id.to_string(),
            actor_id,
            old_values: None,
            new_values: None,
            description: String::new(),
            severity: Severity::Info,
            occurred_at,
        }
    }

    pub fn with_old_values(mut self, values: JsonValue) -> Self {
        self.old_values = Some(values);
        self
    }

    pub fn with_new_values(mut self, values: JsonValue) -> Self {
        self.new_values = Some(values);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

#[derive(Debug, Error)]
pub enum AuditSinkError {
    /// The backing log could not accept the record.
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),

    /// Internal lock poisoning.
    #[error("audit sink lock poisoned")]
    Poisoned,
}

/// Append-only destination for audit events.
///
/// Implementations must be safe to share across request threads.
pub trait AuditSink: Send + Sync {
    fn append(&self, event: AuditEvent) -> Result<(), AuditSinkError>;
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    fn append(&self, event: AuditEvent) -> Result<(), AuditSinkError> {
        (**self).append(event)
    }
}

/// Best-effort append: failures are logged and swallowed.
pub fn emit(sink: &dyn AuditSink, event: AuditEvent) {
    let action = event.action;
    let model_id = event.model_id.clone();
    if let Err(err) = sink.append(event) {
        tracing::warn!(
            action = %action,
            model_id = %model_id,
            error = %err,
            "audit event dropped"
        );
    }
}

//! In-memory audit sink for tests/dev.

use std::sync::Mutex;

use crate::audit::{AuditAction, AuditEvent, AuditSink, AuditSinkError};

/// Collects audit events in arrival order.
///
/// - No IO
/// - Cloned snapshots on read
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded event.
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(_) => vec![],
        }
    }

    pub fn with_action(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.action == action)
            .collect()
    }

    pub fn for_model(&self, model_id: &str) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.model_id == model_id)
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn append(&self, event: AuditEvent) -> Result<(), AuditSinkError> {
        let mut events = self.events.lock().map_err(|_| AuditSinkError::Poisoned)?;
        events.push(event);
        Ok(())
    }
}

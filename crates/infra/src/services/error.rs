use thiserror::Error;

use fulfil_core::{DomainError, ErrorKind};
use fulfil_invoicing::Invoice;

use crate::command_dispatcher::DispatchError;

/// Error surfaced by the order and invoice services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The order already has an invoice; it is returned unchanged.
    #[error("invoice {} already exists for this order", .0.invoice_number())]
    InvoiceAlreadyExists(Box<Invoice>),

    /// Storage or serialization failure below the domain.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl From<DispatchError> for ServiceError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(e) => ServiceError::Domain(e),
            other => ServiceError::Infrastructure(other.to_string()),
        }
    }
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Domain(e) => e.kind(),
            ServiceError::InvoiceAlreadyExists(_) => ErrorKind::InvoiceAlreadyExists,
            ServiceError::Infrastructure(_) => ErrorKind::Internal,
        }
    }

    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::EventStoreError;

    #[test]
    fn dispatch_errors_keep_their_kind() {
        let err: ServiceError =
            DispatchError::from(EventStoreError::Concurrency("stale".to_string())).into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.domain().is_some());

        let err: ServiceError =
            DispatchError::from(EventStoreError::Unavailable("down".to_string())).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        match err {
            ServiceError::Infrastructure(msg) => assert!(msg.contains("down")),
            _ => panic!("Expected Infrastructure error"),
        }
    }
}

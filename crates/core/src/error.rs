//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Stable, machine-readable error category.
///
/// Every failure surfaced by the engine maps onto exactly one kind, so callers
/// can branch on it without parsing messages.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unavailable,
    InsufficientStock,
    InvalidTransition,
    InvalidOperation,
    Conflict,
    ValidationFailed,
    InvoiceAlreadyExists,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::InvalidOperation => "invalid_operation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::ValidationFailed => "validation_failed",
            ErrorKind::InvoiceAlreadyExists => "invoice_already_exists",
            ErrorKind::Internal => "internal",
        }
    }

    /// Only optimistic-concurrency conflicts are worth retrying from scratch.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Conflict)
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Requested vs. available quantity for the stock pool that could not cover a line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockShortfall {
    pub product_id: String,
    pub variant_sku: Option<String>,
    pub requested: u32,
    pub available: u32,
}

impl core::fmt::Display for StockShortfall {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.variant_sku {
            Some(sku) => write!(
                f,
                "product {} variant {sku}: requested {}, available {}",
                self.product_id, self.requested, self.available
            ),
            None => write!(
                f,
                "product {}: requested {}, available {}",
                self.product_id, self.requested, self.available
            ),
        }
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures. Infrastructure
/// concerns (storage, serialization) have their own error types and are mapped
/// onto `ErrorKind::Internal` at the service boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The product exists but cannot be sold (unpublished or soft-deleted).
    #[error("product {product_id} is unavailable: {reason}")]
    Unavailable { product_id: String, reason: String },

    /// A stock pool cannot cover the requested quantity.
    #[error("insufficient stock: {0}")]
    InsufficientStock(StockShortfall),

    /// A status change that the lifecycle table does not allow.
    #[error("invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    /// A well-formed request that is not allowed in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// One or more structural input problems, all of them.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn unavailable(product_id: impl ToString, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            product_id: product_id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn insufficient_stock(shortfall: StockShortfall) -> Self {
        Self::InsufficientStock(shortfall)
    }

    pub fn invalid_transition(
        entity: &'static str,
        from: impl ToString,
        to: impl ToString,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Single-violation shorthand.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(vec![msg.into()])
    }

    /// Returns `Ok(())` for an empty list, otherwise every violation at once.
    pub fn check_violations(violations: Vec<String>) -> DomainResult<()> {
        if violations.is_empty() {
            Ok(())
        } else {
            Err(Self::Validation(violations))
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::Unavailable { .. } => ErrorKind::Unavailable,
            DomainError::InsufficientStock(_) => ErrorKind::InsufficientStock,
            DomainError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            DomainError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            DomainError::Conflict(_) => ErrorKind::Conflict,
            DomainError::Validation(_) | DomainError::InvalidId(_) => ErrorKind::ValidationFailed,
            DomainError::InvariantViolation(_) => ErrorKind::Internal,
        }
    }

    /// Structured detail for shortfalls, so callers can present precise numbers.
    pub fn shortfall(&self) -> Option<&StockShortfall> {
        match self {
            DomainError::InsufficientStock(s) => Some(s),
            _ => None,
        }
    }
}

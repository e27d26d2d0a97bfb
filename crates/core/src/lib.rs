//! `fulfil-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the error taxonomy shared by every component, and the
//! aggregate traits the order and invoice models are written against.

pub mod aggregate;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult, ErrorKind, StockShortfall};
pub use id::{AggregateId, UserId};
pub use value_object::ValueObject;

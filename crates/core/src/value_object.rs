//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. In this
/// workspace that covers discount configuration, schedules, address snapshots
/// and stock lines: two of them with the same fields are interchangeable.
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct ShippingAddress { country: String, phone: String }
///
/// impl ValueObject for ShippingAddress {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

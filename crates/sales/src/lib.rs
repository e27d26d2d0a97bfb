//! Sales Orders domain module (event-sourced).
//!
//! The committed order, its priced line snapshots, and the delivery-status
//! state machine. Implemented purely as deterministic domain logic (no IO, no
//! storage); stock movements and audit records are driven by the services in
//! the infrastructure crate.

pub mod order;
pub mod shipping;

pub use order::{
    ChangeDeliveryStatus, DeliveryStatus, DeliveryStatusChanged, Order, OrderCommand, OrderEvent,
    OrderId, OrderLine, OrderPlaced, OrderTotals, Payment, PaymentStatus, PaymentStatusUpdated,
    PlaceOrder, UpdatePaymentStatus,
};
pub use shipping::{ShippingAddress, UserProfile, UserProfiles};

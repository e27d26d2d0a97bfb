use chrono::{DateTime, Utc};

/// A committed change to an order or invoice stream.
///
/// Payloads are facts: once appended they are replayed as-is to rebuild the
/// aggregate, so a payload change needs a new `version`.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name such as `sales.order.placed`.
    fn event_type(&self) -> &'static str;

    fn version(&self) -> u32 {
        1
    }

    /// Business time of the change, not the append time.
    fn occurred_at(&self) -> DateTime<Utc>;
}

//! Process-wide logging setup shared by the engine binary and embedders.

/// Tracing configuration (filters, formatters).
pub mod tracing;

pub use crate::tracing::LogFormat;

/// Initialize process-wide logging with the format chosen by `FULFIL_LOG_FORMAT`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::from_env());
}

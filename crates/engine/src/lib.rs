//! Order fulfilment engine: the facade wiring catalog, stock ledger, orders
//! and invoices together, plus its HTTP surface.
//!
//! ```text
//! HTTP (axum) ─► Engine ─► OrderBuilder / OrderLifecycle / InvoiceGenerator
//!                          └► stock ledger, event store, audit sink
//! ```

pub mod engine;
pub mod http;

pub use engine::Engine;
pub use fulfil_infra::config::EngineConfig;

//! In-memory adapters for the engine's ports.
//!
//! Used by tests, the demo binary and `Engine::in_memory`. All of them are
//! `Send + Sync` and safe to share behind an `Arc`.

pub mod catalog;
pub mod invoice_index;
pub mod invoice_sequence;
pub mod profiles;
pub mod stock_ledger;

pub use catalog::InMemoryCatalog;
pub use invoice_index::InMemoryInvoiceIndex;
pub use invoice_sequence::InMemoryInvoiceSequence;
pub use profiles::InMemoryUserProfiles;
pub use stock_ledger::InMemoryStockLedger;

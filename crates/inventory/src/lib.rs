//! Inventory domain module.
//!
//! Stock pools for products and their variants, and the rules for reserving
//! and restoring them as one batch. The `InventoryLedger` port is implemented
//! by the infrastructure crate (in-memory arena, Postgres).

pub mod ledger;
pub mod stock;

pub use ledger::{InventoryLedger, ReservationId, StockAdmin};
pub use stock::{StockLine, StockRecord};

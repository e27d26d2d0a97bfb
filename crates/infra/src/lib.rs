//! Infrastructure layer: event store, stock ledger adapters, config and the
//! application services that tie the domain crates together.

pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod memory;
pub mod postgres;
pub mod services;


pub use command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
pub use config::EngineConfig;
pub use services::ServiceError;

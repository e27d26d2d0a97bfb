//! HTTP surface over the engine (Axum router).
//!
//! - `routes/`: handlers, one file per resource
//! - `dto.rs`: request bodies and JSON views of the aggregates
//! - `errors.rs`: `ErrorKind` to status code mapping

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use crate::Engine;

pub mod dto;
pub mod errors;
pub mod routes;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(ServiceBuilder::new().layer(Extension(engine)))
}

use axum::{routing::get, Router};

pub mod audit;
pub mod invoices;
pub mod orders;
pub mod products;
pub mod system;
pub mod users;

pub fn router() -> Router {
    Router::new()
        .route("/audit", get(audit::list_audit_events))
        .nest("/products", products::router())
        .nest("/users", users::router())
        .nest("/orders", orders::router())
        .nest("/invoices", invoices::router())
}

use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use fulfil_invoicing::InvoiceId;

use crate::http::{dto, errors};
use crate::Engine;

pub fn router() -> Router {
    Router::new()
        .route("/:id", get(get_invoice).delete(delete_invoice))
        .route("/:id/payments", post(record_payment))
        .route("/:id/status", post(change_status))
        .route("/:id/overdue-check", post(mark_overdue))
}

fn invoice_id(raw: &str) -> Result<InvoiceId, axum::response::Response> {
    errors::parse_id(raw, "invoice").map(InvoiceId::new)
}

pub async fn get_invoice(
    Extension(engine): Extension<Arc<Engine>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match engine.invoice(id) {
        Ok(invoice) => Json(dto::InvoiceView::from(&invoice)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn record_payment(
    Extension(engine): Extension<Arc<Engine>>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordPaymentRequest>,
) -> axum::response::Response {
    let id = match invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match engine.record_payment(id, body.actor, body.amount, body.method, Utc::now()) {
        Ok(invoice) => Json(dto::InvoiceView::from(&invoice)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn change_status(
    Extension(engine): Extension<Arc<Engine>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeInvoiceStatusRequest>,
) -> axum::response::Response {
    let id = match invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match engine.change_invoice_status(id, body.actor, body.status, Utc::now()) {
        Ok(invoice) => Json(dto::InvoiceView::from(&invoice)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn mark_overdue(
    Extension(engine): Extension<Arc<Engine>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ActorRequest>,
) -> axum::response::Response {
    let id = match invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match engine.mark_invoice_overdue(id, body.actor, Utc::now()) {
        Ok(invoice) => Json(dto::InvoiceView::from(&invoice)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn delete_invoice(
    Extension(engine): Extension<Arc<Engine>>,
    Path(id): Path<String>,
    Query(query): Query<dto::ActorRequest>,
) -> axum::response::Response {
    let id = match invoice_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match engine.delete_invoice(id, query.actor, Utc::now()) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use fulfil_infra::services::{GenerateInvoiceRequest, ServiceError, TransitionRequest};
use fulfil_sales::OrderId;

use crate::http::{dto, errors};
use crate::Engine;

pub fn router() -> Router {
    Router::new()
        .route("/", post(place_order))
        .route("/:id", get(get_order))
        .route("/:id/status", post(change_delivery_status))
        .route("/:id/payment", post(update_payment_status))
        .route("/:id/invoice", post(generate_invoice).get(get_order_invoice))
}

fn order_id(raw: &str) -> Result<OrderId, axum::response::Response> {
    errors::parse_id(raw, "order").map(OrderId::new)
}

pub async fn place_order(
    Extension(engine): Extension<Arc<Engine>>,
    Json(body): Json<dto::PlaceOrderRequest>,
) -> axum::response::Response {
    match engine.place_order(body.into_build_request(Utc::now())) {
        Ok(order) => (StatusCode::CREATED, Json(dto::OrderView::from(&order))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_order(
    Extension(engine): Extension<Arc<Engine>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match engine.order(id) {
        Ok(order) => Json(dto::OrderView::from(&order)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn change_delivery_status(
    Extension(engine): Extension<Arc<Engine>>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeDeliveryStatusRequest>,
) -> axum::response::Response {
    let id = match order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let request = TransitionRequest {
        order_id: id,
        actor: body.actor,
        target: body.status,
        expected_current: body.expected_current,
        at: Utc::now(),
    };
    match engine.transition_order(request) {
        Ok(order) => Json(dto::OrderView::from(&order)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn update_payment_status(
    Extension(engine): Extension<Arc<Engine>>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdatePaymentStatusRequest>,
) -> axum::response::Response {
    let id = match order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match engine.update_payment_status(id, body.actor, body.status, body.transaction_id, Utc::now()) {
        Ok(order) => Json(dto::OrderView::from(&order)).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

/// `201` with the new invoice, or `200` with the one already issued for the order.
pub async fn generate_invoice(
    Extension(engine): Extension<Arc<Engine>>,
    Path(id): Path<String>,
    Json(body): Json<dto::GenerateInvoiceRequest>,
) -> axum::response::Response {
    let id = match order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let mut request = GenerateInvoiceRequest::new(id, body.actor, Utc::now());
    if let Some(issue_date) = body.issue_date {
        request.issue_date = issue_date;
    }
    request.due_date = body.due_date;

    match engine.generate_invoice(request) {
        Ok(invoice) => (StatusCode::CREATED, Json(dto::InvoiceView::from(&invoice))).into_response(),
        Err(ServiceError::InvoiceAlreadyExists(existing)) => {
            (StatusCode::OK, Json(dto::InvoiceView::from(existing.as_ref()))).into_response()
        }
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn get_order_invoice(
    Extension(engine): Extension<Arc<Engine>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match order_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match engine.invoice_for_order(id) {
        Ok(Some(invoice)) => Json(dto::InvoiceView::from(&invoice)).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "order has no invoice"),
        Err(e) => errors::service_error_to_response(e),
    }
}

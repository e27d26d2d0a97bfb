use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};

use fulfil_catalog::{Product, ProductId};

use crate::http::{dto, errors};
use crate::Engine;

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_product).get(list_products))
        .route("/:id", get(get_product))
        .route("/:id/stock", get(get_stock).put(set_total_stock))
        .route("/:id/stock/reconcile", post(reconcile_stock))
        .route("/:id/variants/:sku/stock", put(set_variant_stock))
}

fn product_id(raw: &str) -> Result<ProductId, axum::response::Response> {
    errors::parse_id(raw, "product").map(ProductId::new)
}

pub async fn register_product(
    Extension(engine): Extension<Arc<Engine>>,
    Json(product): Json<Product>,
) -> axum::response::Response {
    let id = product.id();
    match engine.register_product(product) {
        Ok(()) => (StatusCode::CREATED, Json(serde_json::json!({ "id": id.to_string() }))).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn list_products(Extension(engine): Extension<Arc<Engine>>) -> Json<Vec<Product>> {
    Json(engine.products())
}

pub async fn get_product(
    Extension(engine): Extension<Arc<Engine>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match engine.product(&id) {
        Some(product) => Json(product).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "product not found"),
    }
}

pub async fn get_stock(
    Extension(engine): Extension<Arc<Engine>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match engine.stock(&id) {
        Some(record) => Json(record).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "not_found", "no stock recorded for product"),
    }
}

pub async fn set_total_stock(
    Extension(engine): Extension<Arc<Engine>>,
    Path(id): Path<String>,
    Json(body): Json<dto::SetStockRequest>,
) -> axum::response::Response {
    let id = match product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match engine.set_total_stock(id, body.quantity) {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn set_variant_stock(
    Extension(engine): Extension<Arc<Engine>>,
    Path((id, sku)): Path<(String, String)>,
    Json(body): Json<dto::SetStockRequest>,
) -> axum::response::Response {
    let id = match product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match engine.set_variant_stock(id, &sku, body.quantity) {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

pub async fn reconcile_stock(
    Extension(engine): Extension<Arc<Engine>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match product_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match engine.reconcile_stock(id) {
        Ok(record) => Json(record).into_response(),
        Err(e) => errors::service_error_to_response(e),
    }
}

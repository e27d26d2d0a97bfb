use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    Json,
};

use fulfil_events::AuditEvent;

use crate::http::dto;
use crate::Engine;

pub async fn list_audit_events(
    Extension(engine): Extension<Arc<Engine>>,
    Query(query): Query<dto::AuditQuery>,
) -> Json<Vec<AuditEvent>> {
    let events = match query.model_id.as_deref() {
        Some(model_id) => engine.audit_log_for(model_id),
        None => engine.audit_log(),
    };
    Json(events)
}

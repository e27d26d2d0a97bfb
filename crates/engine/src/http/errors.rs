use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use fulfil_core::{AggregateId, DomainError, ErrorKind};
use fulfil_infra::services::ServiceError;

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::ValidationFailed => StatusCode::BAD_REQUEST,
        ErrorKind::Unavailable
        | ErrorKind::InsufficientStock
        | ErrorKind::InvalidTransition
        | ErrorKind::InvalidOperation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Conflict | ErrorKind::InvoiceAlreadyExists => StatusCode::CONFLICT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Every failure carries the stable `kind` plus a human-readable message.
pub fn service_error_to_response(err: ServiceError) -> axum::response::Response {
    let kind = err.kind();
    let details = match &err {
        ServiceError::Domain(DomainError::Validation(violations)) => json!({ "violations": violations }),
        ServiceError::Domain(DomainError::InsufficientStock(shortfall)) => json!(shortfall),
        ServiceError::Domain(DomainError::InvalidTransition { from, to, .. }) => {
            json!({ "from": from, "to": to })
        }
        _ => serde_json::Value::Null,
    };
    if kind == ErrorKind::Internal {
        tracing::error!(error = %err, "request failed");
    }

    (
        status_for(kind),
        axum::Json(json!({
            "error": kind.as_str(),
            "message": err.to_string(),
            "details": details,
        })),
    )
        .into_response()
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_id(raw: &str, what: &'static str) -> Result<AggregateId, axum::response::Response> {
    raw.parse().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "validation_failed",
            format!("invalid {what} id"),
        )
    })
}

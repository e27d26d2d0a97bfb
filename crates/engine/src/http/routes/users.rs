use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::put,
    Json, Router,
};

use fulfil_core::UserId;
use fulfil_sales::UserProfile;

use crate::http::errors;
use crate::Engine;

pub fn router() -> Router {
    Router::new().route("/:id/profile", put(set_profile))
}

pub async fn set_profile(
    Extension(engine): Extension<Arc<Engine>>,
    Path(id): Path<String>,
    Json(body): Json<UserProfile>,
) -> axum::response::Response {
    let user_id: UserId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "validation_failed", "invalid user id")
        }
    };
    engine.set_user_profile(user_id, body);
    StatusCode::NO_CONTENT.into_response()
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mesh_core::CoreError;
use serde::Serialize;

/// HTTP adapter over [`CoreError`] (§7). Nothing in `mesh-core` knows about
/// status codes; this is the one place that translates a kind into one.
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        ApiError(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    details: serde_json::Value,
}

fn code_for(e: &CoreError) -> &'static str {
    match e {
        CoreError::Unauthenticated => "Unauthenticated",
        CoreError::Forbidden => "Forbidden",
        CoreError::NotFound => "NotFound",
        CoreError::Conflict(_) => "Conflict",
        CoreError::Validation(_) => "ValidationFailed",
        CoreError::CircularRouting { .. } => "CircularRouting",
        CoreError::Exhausted => "IPExhausted",
        CoreError::DependencyBlocked(_) => "DependencyBlocked",
        CoreError::Transient(_) | CoreError::Pool(_) => "Transient",
        CoreError::ProviderUnreachable => "ProviderUnreachable",
    }
}

fn status_for(e: &CoreError) -> StatusCode {
    match e {
        CoreError::Unauthenticated => StatusCode::UNAUTHORIZED,
        CoreError::Forbidden => StatusCode::FORBIDDEN,
        CoreError::NotFound => StatusCode::NOT_FOUND,
        CoreError::Conflict(_) | CoreError::Validation(_) | CoreError::CircularRouting { .. } | CoreError::Exhausted => {
            StatusCode::BAD_REQUEST
        },
        CoreError::DependencyBlocked(_) => StatusCode::CONFLICT,
        CoreError::Transient(_) | CoreError::Pool(_) | CoreError::ProviderUnreachable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn details_for(e: &CoreError) -> serde_json::Value {
    match e {
        CoreError::CircularRouting { peer_id, group_id, route_ids } => {
            serde_json::json!({ "peer_id": peer_id, "group_id": group_id, "route_ids": route_ids })
        },
        _ => serde_json::Value::Null,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if matches!(status, StatusCode::INTERNAL_SERVER_ERROR | StatusCode::SERVICE_UNAVAILABLE) {
            tracing::warn!(error = %self.0, "request failed with a transient error");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            code: code_for(&self.0),
            details: details_for(&self.0),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

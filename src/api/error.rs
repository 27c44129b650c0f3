use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use validator::ValidationErrors;
use crate::{EngineError, ErrorKind};

#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    Validation(ValidationErrors),
    /// No `X-User-Id` was forwarded by the gateway.
    Unauthenticated,
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self { Self::Engine(err) }
}

impl From<ValidationErrors> for ApiError {
    fn from(err: ValidationErrors) -> Self { Self::Validation(err) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Engine(err) => {
                let status = match err.kind() {
                    ErrorKind::Validation => StatusCode::BAD_REQUEST,
                    ErrorKind::Unauthenticated => StatusCode::UNAUTHORIZED,
                    ErrorKind::NotFound => StatusCode::NOT_FOUND,
                    ErrorKind::StateConflict => StatusCode::CONFLICT,
                    ErrorKind::Expired => StatusCode::GONE,
                    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!("Internal Server Error: {}", err);
                    "Internal Server Error".to_string()
                } else {
                    err.to_string()
                };
                (status, json!({ "error": message, "code": err.code() }))
            }
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid request", "code": "invalid_request", "fields": errors }),
            ),
            ApiError::Unauthenticated => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Sign in to continue", "code": "unauthenticated" }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

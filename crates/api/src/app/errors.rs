use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use keygate_core::AuthError;

/// Handler error: an [`AuthError`] rendered as `{"error", "message"}`.
#[derive(Debug)]
pub struct ApiError(pub AuthError);

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        auth_error_to_response(self.0)
    }
}

pub fn auth_error_to_response(err: AuthError) -> Response {
    let code = err.code();
    match err {
        AuthError::Unauthorized => json_error(StatusCode::UNAUTHORIZED, code, "unauthorized"),
        AuthError::Forbidden(perm) => json_error(
            StatusCode::FORBIDDEN,
            code,
            format!("missing permission '{perm}'"),
        ),
        AuthError::NotFound => json_error(StatusCode::NOT_FOUND, code, "not found"),
        AuthError::AlreadyExists(msg) => json_error(StatusCode::CONFLICT, code, msg),
        AuthError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, code, msg),
        AuthError::Internal(msg) => {
            error!(error = %msg, "internal error");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, code, "internal server error")
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// 400 for request bodies that fail to parse.
pub fn invalid_request(message: impl Into<String>) -> ApiError {
    ApiError(AuthError::validation(message))
}

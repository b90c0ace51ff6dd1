use axum::{
    Json,
    extract::{Extension, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use crate::app::dto::{LoginRequest, RefreshRequest, RegisterRequest, TokenResponse, UserResponse};
use crate::app::errors::{ApiError, invalid_request};
use crate::app::services::AppServices;
use crate::context::AuthenticatedUser;

/// POST /auth/login
pub async fn login(
    Extension(services): Extension<AppServices>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(req) = body.map_err(|e| invalid_request(e.body_text()))?;
    let tokens = services.auth.login(&req.email, &req.password).await?;
    Ok(Json(tokens.into()))
}

/// POST /auth/refresh
pub async fn refresh(
    Extension(services): Extension<AppServices>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let Json(req) = body.map_err(|e| invalid_request(e.body_text()))?;
    let tokens = services.auth.refresh_tokens(&req.refresh_token).await?;
    Ok(Json(tokens.into()))
}

/// POST /auth/register
pub async fn register(
    Extension(services): Extension<AppServices>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body.map_err(|e| invalid_request(e.body_text()))?;
    let user = services.auth.register(req.into()).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// GET /me
pub async fn me(
    Extension(services): Extension<AppServices>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<UserResponse>, ApiError> {
    let me = services.auth.get_me(user.user_id()).await?;
    Ok(Json(me.into()))
}

/// POST /auth/logout
pub async fn logout(
    Extension(services): Extension<AppServices>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<StatusCode, ApiError> {
    services.auth.logout(user.claims()).await?;
    Ok(StatusCode::NO_CONTENT)
}

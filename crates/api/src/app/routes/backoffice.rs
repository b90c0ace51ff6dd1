//! Backoffice RBAC administration and the caller's menu.

use axum::{
    Json, Router,
    extract::{Extension, Path, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};

use keygate_auth::module::ROLES_MANAGE;
use keygate_auth::{MenuNode, Permission, Role};

use crate::app::dto::{
    AddPermissionRequest, AssignRoleRequest, CreateRoleRequest, parse_role_id, parse_user_id,
};
use crate::app::errors::{ApiError, invalid_request};
use crate::app::services::AppServices;
use crate::context::AuthenticatedUser;

pub fn router() -> Router {
    Router::new()
        .route("/me/menu", get(my_menu))
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/:role_id/permissions", post(add_permission_to_role))
        .route("/users/:user_id/roles", post(assign_role))
        .route("/permissions", get(list_permissions))
}

async fn require_manage(services: &AppServices, user: &AuthenticatedUser) -> Result<(), ApiError> {
    services.auth.authorize(user.user_id(), ROLES_MANAGE).await?;
    Ok(())
}

/// GET /backoffice/me/menu
pub async fn my_menu(
    Extension(services): Extension<AppServices>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<MenuNode>>, ApiError> {
    Ok(Json(services.auth.get_my_menu(user.user_id()).await?))
}

/// GET /backoffice/roles
pub async fn list_roles(
    Extension(services): Extension<AppServices>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<Role>>, ApiError> {
    require_manage(&services, &user).await?;
    Ok(Json(services.auth.get_roles().await?))
}

/// POST /backoffice/roles
pub async fn create_role(
    Extension(services): Extension<AppServices>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<CreateRoleRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    require_manage(&services, &user).await?;
    let Json(req) = body.map_err(|e| invalid_request(e.body_text()))?;
    let role = services.auth.create_role(&req.name).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

/// POST /backoffice/roles/:role_id/permissions
pub async fn add_permission_to_role(
    Extension(services): Extension<AppServices>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(role_id): Path<String>,
    body: Result<Json<AddPermissionRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    require_manage(&services, &user).await?;
    let role_id = parse_role_id(&role_id)?;
    let Json(req) = body.map_err(|e| invalid_request(e.body_text()))?;
    services
        .auth
        .add_permission_to_role(role_id, &req.permission_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /backoffice/users/:user_id/roles
pub async fn assign_role(
    Extension(services): Extension<AppServices>,
    Extension(user): Extension<AuthenticatedUser>,
    Path(user_id): Path<String>,
    body: Result<Json<AssignRoleRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    require_manage(&services, &user).await?;
    let target = parse_user_id(&user_id)?;
    let Json(req) = body.map_err(|e| invalid_request(e.body_text()))?;
    services
        .auth
        .assign_role(target, keygate_core::RoleId::new(req.role_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /backoffice/permissions
pub async fn list_permissions(
    Extension(services): Extension<AppServices>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<Vec<Permission>>, ApiError> {
    require_manage(&services, &user).await?;
    Ok(Json(services.auth.list_permissions().await?))
}

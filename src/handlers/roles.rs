use axum::{Json, extract::State, http::StatusCode};
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    auth::AuthUser,
    authz::authorize,
    error::{AppError, AppResult, ErrorBody},
    extract::{ApiJson, ApiPath},
    models::{
        BulkUpdateResponse, CreateRoleRequest, Role, UpdatePermissionsRequest, UpdateRoleRequest,
        UserIdsRequest, UserResponse,
    },
    permissions::{Action, Permission, Resource},
};

// Roles are an administrative resource: every endpoint below is admin-only, whatever
// the caller's permission list says.

#[utoipa::path(
    get,
    path = "/roles",
    responses(
        (status = 200, description = "Roles", body = [Role]),
        (status = 403, description = "Not an administrator", body = ErrorBody)
    )
)]
pub async fn list_roles(
    actor: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<Role>>> {
    authorize(&actor, Resource::Roles, Action::Read)?;
    Ok(Json(state.roles().list().await?))
}

#[utoipa::path(
    get,
    path = "/roles/{id}",
    params(("id" = Uuid, Path, description = "Role ID")),
    responses((status = 200, description = "Role", body = Role))
)]
pub async fn get_role(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<Role>> {
    authorize(&actor, Resource::Roles, Action::Read)?;
    Ok(Json(state.roles().get(id).await?))
}

/// create_role
///
/// [Admin Route] A permission list naming the same resource twice is rejected.
#[utoipa::path(
    post,
    path = "/roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Created", body = Role),
        (status = 400, description = "Invalid input or duplicate name", body = ErrorBody)
    )
)]
pub async fn create_role(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateRoleRequest>,
) -> AppResult<(StatusCode, Json<Role>)> {
    authorize(&actor, Resource::Roles, Action::Create)?;
    let role = state.roles().create(Some(actor.id), payload).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    put,
    path = "/roles/{id}",
    params(("id" = Uuid, Path, description = "Role ID")),
    request_body = UpdateRoleRequest,
    responses((status = 200, description = "Updated", body = Role))
)]
pub async fn update_role(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateRoleRequest>,
) -> AppResult<Json<Role>> {
    authorize(&actor, Resource::Roles, Action::Update)?;
    Ok(Json(state.roles().update(Some(actor.id), id, payload).await?))
}

/// delete_role
///
/// [Admin Route] Refused (400) while users still hold the role.
#[utoipa::path(
    delete,
    path = "/roles/{id}",
    params(("id" = Uuid, Path, description = "Role ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Role still assigned", body = ErrorBody),
        (status = 404, description = "No such role", body = ErrorBody)
    )
)]
pub async fn delete_role(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    authorize(&actor, Resource::Roles, Action::Delete)?;
    state.roles().delete(Some(actor.id), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/roles/{id}/users",
    params(("id" = Uuid, Path, description = "Role ID")),
    responses((status = 200, description = "Holders of the role", body = [UserResponse]))
)]
pub async fn get_role_users(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<Vec<UserResponse>>> {
    authorize(&actor, Resource::Roles, Action::Read)?;
    Ok(Json(state.roles().users_of(id).await?))
}

#[utoipa::path(
    post,
    path = "/roles/{id}/users",
    params(("id" = Uuid, Path, description = "Role ID")),
    request_body = UserIdsRequest,
    responses((status = 200, description = "Users updated", body = BulkUpdateResponse))
)]
pub async fn assign_role_users(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UserIdsRequest>,
) -> AppResult<Json<BulkUpdateResponse>> {
    authorize(&actor, Resource::Roles, Action::Update)?;
    payload.validate().map_err(AppError::from)?;
    let modified_count = state
        .roles()
        .assign_to_users(Some(actor.id), id, &payload.user_ids)
        .await?;
    Ok(Json(BulkUpdateResponse {
        modified_count,
        message: format!("Role assigned to {} users", modified_count),
    }))
}

#[utoipa::path(
    delete,
    path = "/roles/{id}/users",
    params(("id" = Uuid, Path, description = "Role ID")),
    request_body = UserIdsRequest,
    responses((status = 200, description = "Users updated", body = BulkUpdateResponse))
)]
pub async fn remove_role_users(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UserIdsRequest>,
) -> AppResult<Json<BulkUpdateResponse>> {
    authorize(&actor, Resource::Roles, Action::Update)?;
    payload.validate().map_err(AppError::from)?;
    let modified_count = state
        .roles()
        .remove_from_users(Some(actor.id), id, &payload.user_ids)
        .await?;
    Ok(Json(BulkUpdateResponse {
        modified_count,
        message: format!("Role removed from {} users", modified_count),
    }))
}

#[utoipa::path(
    get,
    path = "/roles/{id}/permissions",
    params(("id" = Uuid, Path, description = "Role ID")),
    responses((status = 200, description = "Permission list", body = [Permission]))
)]
pub async fn get_role_permissions(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<Vec<Permission>>> {
    authorize(&actor, Resource::Roles, Action::Read)?;
    Ok(Json(state.roles().permissions_of(id).await?))
}

/// update_role_permissions
///
/// [Admin Route] Replaces the role's whole permission list. Takes effect on the
/// holders' next request.
#[utoipa::path(
    put,
    path = "/roles/{id}/permissions",
    params(("id" = Uuid, Path, description = "Role ID")),
    request_body = UpdatePermissionsRequest,
    responses(
        (status = 200, description = "Updated", body = Role),
        (status = 400, description = "Duplicate resource entries", body = ErrorBody)
    )
)]
pub async fn update_role_permissions(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdatePermissionsRequest>,
) -> AppResult<Json<Role>> {
    authorize(&actor, Resource::Roles, Action::Update)?;
    let role = state
        .roles()
        .update_permissions(Some(actor.id), id, payload.permissions)
        .await?;
    Ok(Json(role))
}

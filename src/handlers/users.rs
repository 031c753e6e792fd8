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
        BulkAssignRolesRequest, BulkUpdateResponse, CreateUserRequest, Role, RoleIdsRequest,
        UpdateUserRequest, UserResponse,
    },
    permissions::{Action, Resource},
};

/// list_users
///
/// [Admin Route] All users with their role resolved to `{ id, name }`.
#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "Users", body = [UserResponse]),
        (status = 403, description = "Not an administrator", body = ErrorBody)
    )
)]
pub async fn list_users(
    actor: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<UserResponse>>> {
    authorize(&actor, Resource::Users, Action::Read)?;
    Ok(Json(state.users().list().await?))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = UserResponse),
        (status = 404, description = "No such user", body = ErrorBody)
    )
)]
pub async fn get_user(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<UserResponse>> {
    authorize(&actor, Resource::Users, Action::Read)?;
    Ok(Json(state.users().get(id).await?))
}

/// create_user
///
/// [Admin Route] Creates an account. The password is hashed with argon2 and never
/// echoed back.
#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "Created", body = UserResponse),
        (status = 400, description = "Invalid input or duplicate username/email", body = ErrorBody)
    )
)]
pub async fn create_user(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateUserRequest>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    authorize(&actor, Resource::Users, Action::Create)?;
    let user = state.users().create(Some(actor.id), payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    put,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated", body = UserResponse),
        (status = 400, description = "Invalid input or duplicate username/email", body = ErrorBody),
        (status = 404, description = "No such user", body = ErrorBody)
    )
)]
pub async fn update_user(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateUserRequest>,
) -> AppResult<Json<UserResponse>> {
    authorize(&actor, Resource::Users, Action::Update)?;
    Ok(Json(state.users().update(Some(actor.id), id, payload).await?))
}

/// delete_user
///
/// [Admin Route] Administrators cannot delete their own account (400).
#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Self-deletion", body = ErrorBody),
        (status = 404, description = "No such user", body = ErrorBody)
    )
)]
pub async fn delete_user(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    authorize(&actor, Resource::Users, Action::Delete)?;
    state.users().delete(Some(actor.id), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/users/{id}/roles",
    params(("id" = Uuid, Path, description = "User ID")),
    responses((status = 200, description = "Roles held by the user", body = [Role]))
)]
pub async fn get_user_roles(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<Vec<Role>>> {
    authorize(&actor, Resource::Users, Action::Read)?;
    Ok(Json(state.users().roles_of(id).await?))
}

/// assign_user_roles
///
/// [Admin Route] Every listed role must exist; the first one becomes the user's role.
#[utoipa::path(
    post,
    path = "/users/{id}/roles",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = RoleIdsRequest,
    responses(
        (status = 200, description = "Role assigned", body = UserResponse),
        (status = 400, description = "Unknown role", body = ErrorBody)
    )
)]
pub async fn assign_user_roles(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<RoleIdsRequest>,
) -> AppResult<Json<UserResponse>> {
    authorize(&actor, Resource::Users, Action::Update)?;
    payload.validate().map_err(AppError::from)?;
    let user = state
        .users()
        .assign_roles(Some(actor.id), id, &payload.role_ids)
        .await?;
    Ok(Json(user))
}

#[utoipa::path(
    delete,
    path = "/users/{id}/roles",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = RoleIdsRequest,
    responses((status = 200, description = "Roles removed", body = UserResponse))
)]
pub async fn remove_user_roles(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<RoleIdsRequest>,
) -> AppResult<Json<UserResponse>> {
    authorize(&actor, Resource::Users, Action::Update)?;
    payload.validate().map_err(AppError::from)?;
    let user = state
        .users()
        .remove_roles(Some(actor.id), id, &payload.role_ids)
        .await?;
    Ok(Json(user))
}

/// bulk_assign_roles
///
/// [Admin Route] Assigns the first listed role to many users at once. Roles are
/// checked up front; users are updated independently.
#[utoipa::path(
    post,
    path = "/users/bulk/roles",
    request_body = BulkAssignRolesRequest,
    responses(
        (status = 200, description = "Users updated", body = BulkUpdateResponse),
        (status = 400, description = "Unknown role", body = ErrorBody)
    )
)]
pub async fn bulk_assign_roles(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<BulkAssignRolesRequest>,
) -> AppResult<Json<BulkUpdateResponse>> {
    authorize(&actor, Resource::Users, Action::Update)?;
    payload.validate().map_err(AppError::from)?;
    let modified_count = state
        .users()
        .bulk_assign_roles(Some(actor.id), &payload.user_ids, &payload.role_ids)
        .await?;
    Ok(Json(BulkUpdateResponse {
        modified_count,
        message: format!("Roles assigned to {} users", modified_count),
    }))
}

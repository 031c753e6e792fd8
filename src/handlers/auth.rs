use axum::{Json, extract::State, http::StatusCode};

use crate::{
    AppState,
    auth::AuthUser,
    error::{AppResult, ErrorBody},
    extract::ApiJson,
    models::{ChangePasswordRequest, LoginRequest, LoginResponse, RefreshRequest, UserResponse},
};

/// login
///
/// [Public Route] Exchanges email and password for an access token and a refresh
/// token. Unknown emails and wrong passwords both answer 401.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Tokens issued", body = LoginResponse),
        (status = 400, description = "Malformed credentials", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let response = state.auth().login(payload).await?;
    Ok(Json(response))
}

/// refresh
///
/// [Public Route] Trades a refresh token for a new token pair.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens issued", body = LoginResponse),
        (status = 401, description = "Invalid or expired refresh token", body = ErrorBody)
    )
)]
pub async fn refresh(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<RefreshRequest>,
) -> AppResult<Json<LoginResponse>> {
    Ok(Json(state.auth().refresh(payload).await?))
}

/// verify
///
/// [Authenticated Route] Confirms the bearer token and returns its owner.
#[utoipa::path(
    post,
    path = "/auth/verify",
    responses(
        (status = 200, description = "Token is valid", body = UserResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    )
)]
pub async fn verify(
    actor: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<UserResponse>> {
    Ok(Json(state.auth().current_user(actor.id).await?))
}

#[utoipa::path(
    post,
    path = "/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "Wrong current password or weak new one", body = ErrorBody),
        (status = 401, description = "Missing or invalid token", body = ErrorBody)
    )
)]
pub async fn change_password(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ChangePasswordRequest>,
) -> AppResult<StatusCode> {
    state.auth().change_password(actor.id, payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

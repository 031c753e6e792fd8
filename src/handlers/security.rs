use axum::{Json, extract::State};

use crate::{
    AppState,
    auth::AuthUser,
    authz::authorize,
    error::{AppResult, ErrorBody},
    extract::{ApiJson, ApiQuery},
    models::{AuditLogPage, AuditLogQuery, SecuritySettings, UpdateSecuritySettingsRequest},
    permissions::{Action, Resource},
};

/// get_audit_logs
///
/// [Admin Route] Paginated audit trail, newest first. Filters combine with AND.
#[utoipa::path(
    get,
    path = "/security/logs",
    params(AuditLogQuery),
    responses(
        (status = 200, description = "One page of audit entries", body = AuditLogPage),
        (status = 400, description = "Bad pagination or date range", body = ErrorBody),
        (status = 403, description = "Not an administrator", body = ErrorBody)
    )
)]
pub async fn get_audit_logs(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AuditLogQuery>,
) -> AppResult<Json<AuditLogPage>> {
    authorize(&actor, Resource::Security, Action::Read)?;
    Ok(Json(state.security().audit_logs(query).await?))
}

#[utoipa::path(
    get,
    path = "/security/settings",
    responses((status = 200, description = "Current settings", body = SecuritySettings))
)]
pub async fn get_security_settings(
    actor: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<SecuritySettings>> {
    authorize(&actor, Resource::Security, Action::Read)?;
    Ok(Json(state.security().settings().await?))
}

/// update_security_settings
///
/// [Admin Route] Partial update. Durations use the `15m` / `1h` / `7d` notation.
#[utoipa::path(
    put,
    path = "/security/settings",
    request_body = UpdateSecuritySettingsRequest,
    responses(
        (status = 200, description = "Updated settings", body = SecuritySettings),
        (status = 400, description = "Invalid duration or length", body = ErrorBody)
    )
)]
pub async fn update_security_settings(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<UpdateSecuritySettingsRequest>,
) -> AppResult<Json<SecuritySettings>> {
    authorize(&actor, Resource::Security, Action::Update)?;
    let settings = state
        .security()
        .update_settings(Some(actor.id), payload)
        .await?;
    Ok(Json(settings))
}

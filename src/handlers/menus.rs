use axum::{Json, extract::State, http::StatusCode};
use uuid::Uuid;
use validator::Validate;

use crate::{
    AppState,
    auth::AuthUser,
    authz::{Requirement, authorize, require},
    error::{AppError, AppResult, ErrorBody},
    extract::{ApiJson, ApiPath},
    models::{CreateMenuRequest, MenuResponse, ReorderRequest, ReorderResponse, UpdateMenuRequest},
    permissions::{Action, Resource},
};

// Menus can be read by any role granted menus:read; changing them is reserved to
// administrators.

/// list_menus
///
/// [Authenticated Route] Menus ordered by `displayOrder`, with parent and page
/// element resolved. Served through the response cache.
#[utoipa::path(
    get,
    path = "/menus",
    responses(
        (status = 200, description = "Menus", body = [MenuResponse]),
        (status = 403, description = "Missing menus:read", body = ErrorBody)
    )
)]
pub async fn list_menus(
    actor: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<MenuResponse>>> {
    authorize(&actor, Resource::Menus, Action::Read)?;
    let service = state.menus();
    let menus = state.cache.read_through("/menus", || service.list()).await?;
    Ok(Json(menus))
}

#[utoipa::path(
    get,
    path = "/menus/{id}",
    params(("id" = Uuid, Path, description = "Menu ID")),
    responses(
        (status = 200, description = "Menu", body = MenuResponse),
        (status = 404, description = "No such menu", body = ErrorBody)
    )
)]
pub async fn get_menu(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<MenuResponse>> {
    authorize(&actor, Resource::Menus, Action::Read)?;
    Ok(Json(state.menus().get(id).await?))
}

#[utoipa::path(
    get,
    path = "/menus/slug/{slug}",
    params(("slug" = String, Path, description = "Menu slug")),
    responses(
        (status = 200, description = "Menu", body = MenuResponse),
        (status = 404, description = "No such menu", body = ErrorBody)
    )
)]
pub async fn get_menu_by_slug(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> AppResult<Json<MenuResponse>> {
    authorize(&actor, Resource::Menus, Action::Read)?;
    let service = state.menus();
    let key = format!("/menus/slug/{}", slug);
    let menu = state
        .cache
        .read_through(&key, || service.get_by_slug(&slug))
        .await?;
    Ok(Json(menu))
}

/// create_menu
///
/// [Admin Route] `parent` must name an existing menu and `pageElement` an existing
/// page element.
#[utoipa::path(
    post,
    path = "/menus",
    request_body = CreateMenuRequest,
    responses(
        (status = 201, description = "Created", body = MenuResponse),
        (status = 400, description = "Invalid input or duplicate name", body = ErrorBody),
        (status = 403, description = "Not an administrator", body = ErrorBody)
    )
)]
pub async fn create_menu(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreateMenuRequest>,
) -> AppResult<(StatusCode, Json<MenuResponse>)> {
    require(&actor, Requirement::admin(Resource::Menus, Action::Create))?;
    let menu = state.menus().create(Some(actor.id), payload).await?;
    Ok((StatusCode::CREATED, Json(menu)))
}

#[utoipa::path(
    put,
    path = "/menus/{id}",
    params(("id" = Uuid, Path, description = "Menu ID")),
    request_body = UpdateMenuRequest,
    responses(
        (status = 200, description = "Updated", body = MenuResponse),
        (status = 400, description = "Invalid input, cycle or duplicate name", body = ErrorBody)
    )
)]
pub async fn update_menu(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdateMenuRequest>,
) -> AppResult<Json<MenuResponse>> {
    require(&actor, Requirement::admin(Resource::Menus, Action::Update))?;
    Ok(Json(state.menus().update(Some(actor.id), id, payload).await?))
}

/// delete_menu
///
/// [Admin Route] Refused (400) while submenus still point at this menu.
#[utoipa::path(
    delete,
    path = "/menus/{id}",
    params(("id" = Uuid, Path, description = "Menu ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Menu has submenus", body = ErrorBody),
        (status = 404, description = "No such menu", body = ErrorBody)
    )
)]
pub async fn delete_menu(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    require(&actor, Requirement::admin(Resource::Menus, Action::Delete))?;
    state.menus().delete(Some(actor.id), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/menus/reorder",
    request_body = ReorderRequest,
    responses((status = 200, description = "Reordered", body = ReorderResponse))
)]
pub async fn reorder_menus(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ReorderRequest>,
) -> AppResult<Json<ReorderResponse>> {
    require(&actor, Requirement::admin(Resource::Menus, Action::Update))?;
    payload.validate().map_err(AppError::from)?;
    let updated = state.menus().reorder(Some(actor.id), &payload.ids).await?;
    Ok(Json(ReorderResponse {
        updated,
        message: "Menus reordered successfully".into(),
    }))
}

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
        BulkDeleteRequest, BulkDeleteResponse, CreatePageElementRequest, CreatePageRequest, Page,
        PageElement, PageResponse, ReorderRequest, ReorderResponse, UpdatePageElementRequest,
        UpdatePageRequest,
    },
    permissions::{Action, Resource},
};

/// list_pages
///
/// [Authenticated Route] Pages ordered by `displayOrder`, each with its elements.
/// Served through the response cache.
#[utoipa::path(
    get,
    path = "/pages",
    responses(
        (status = 200, description = "Pages", body = [PageResponse]),
        (status = 403, description = "Missing pages:read", body = ErrorBody)
    )
)]
pub async fn list_pages(
    actor: AuthUser,
    State(state): State<AppState>,
) -> AppResult<Json<Vec<PageResponse>>> {
    authorize(&actor, Resource::Pages, Action::Read)?;
    let service = state.pages();
    let pages = state.cache.read_through("/pages", || service.list()).await?;
    Ok(Json(pages))
}

#[utoipa::path(
    get,
    path = "/pages/{id}",
    params(("id" = Uuid, Path, description = "Page ID")),
    responses(
        (status = 200, description = "Page", body = PageResponse),
        (status = 404, description = "No such page", body = ErrorBody)
    )
)]
pub async fn get_page(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<Json<PageResponse>> {
    authorize(&actor, Resource::Pages, Action::Read)?;
    Ok(Json(state.pages().get(id).await?))
}

#[utoipa::path(
    post,
    path = "/pages",
    request_body = CreatePageRequest,
    responses(
        (status = 201, description = "Created", body = Page),
        (status = 400, description = "Invalid input or duplicate name", body = ErrorBody)
    )
)]
pub async fn create_page(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<CreatePageRequest>,
) -> AppResult<(StatusCode, Json<Page>)> {
    authorize(&actor, Resource::Pages, Action::Create)?;
    let page = state.pages().create(Some(actor.id), payload).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

#[utoipa::path(
    put,
    path = "/pages/{id}",
    params(("id" = Uuid, Path, description = "Page ID")),
    request_body = UpdatePageRequest,
    responses((status = 200, description = "Updated", body = Page))
)]
pub async fn update_page(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<UpdatePageRequest>,
) -> AppResult<Json<Page>> {
    authorize(&actor, Resource::Pages, Action::Update)?;
    Ok(Json(state.pages().update(Some(actor.id), id, payload).await?))
}

/// delete_page
///
/// [Authenticated Route] Refused (400) while the page still owns elements.
#[utoipa::path(
    delete,
    path = "/pages/{id}",
    params(("id" = Uuid, Path, description = "Page ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Page still has elements", body = ErrorBody),
        (status = 404, description = "No such page", body = ErrorBody)
    )
)]
pub async fn delete_page(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> AppResult<StatusCode> {
    authorize(&actor, Resource::Pages, Action::Delete)?;
    state.pages().delete(Some(actor.id), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// reorder_pages
///
/// [Authenticated Route] The position of each id in `ids` becomes its `displayOrder`.
#[utoipa::path(
    post,
    path = "/pages/reorder",
    request_body = ReorderRequest,
    responses((status = 200, description = "Reordered", body = ReorderResponse))
)]
pub async fn reorder_pages(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ReorderRequest>,
) -> AppResult<Json<ReorderResponse>> {
    authorize(&actor, Resource::Pages, Action::Update)?;
    payload.validate().map_err(AppError::from)?;
    let updated = state.pages().reorder(Some(actor.id), &payload.ids).await?;
    Ok(Json(ReorderResponse {
        updated,
        message: "Pages reordered successfully".into(),
    }))
}

// --- Page Elements ---

#[utoipa::path(
    get,
    path = "/pages/{id}/elements",
    params(("id" = Uuid, Path, description = "Page ID")),
    responses((status = 200, description = "Elements of the page", body = [PageElement]))
)]
pub async fn list_page_elements(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(page_id): ApiPath<Uuid>,
) -> AppResult<Json<Vec<PageElement>>> {
    authorize(&actor, Resource::Pages, Action::Read)?;
    let service = state.pages();
    let key = format!("/pages/{}/elements", page_id);
    let elements = state
        .cache
        .read_through(&key, || service.elements(page_id))
        .await?;
    Ok(Json(elements))
}

#[utoipa::path(
    post,
    path = "/pages/{id}/elements",
    params(("id" = Uuid, Path, description = "Page ID")),
    request_body = CreatePageElementRequest,
    responses(
        (status = 201, description = "Created", body = PageElement),
        (status = 400, description = "Invalid input or duplicate name", body = ErrorBody),
        (status = 404, description = "No such page", body = ErrorBody)
    )
)]
pub async fn create_page_element(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(page_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<CreatePageElementRequest>,
) -> AppResult<(StatusCode, Json<PageElement>)> {
    authorize(&actor, Resource::Pages, Action::Create)?;
    let element = state
        .pages()
        .create_element(Some(actor.id), page_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(element)))
}

#[utoipa::path(
    put,
    path = "/pages/{id}/elements/{element_id}",
    params(
        ("id" = Uuid, Path, description = "Page ID"),
        ("element_id" = Uuid, Path, description = "Page element ID")
    ),
    request_body = UpdatePageElementRequest,
    responses((status = 200, description = "Updated", body = PageElement))
)]
pub async fn update_page_element(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath((page_id, element_id)): ApiPath<(Uuid, Uuid)>,
    ApiJson(payload): ApiJson<UpdatePageElementRequest>,
) -> AppResult<Json<PageElement>> {
    authorize(&actor, Resource::Pages, Action::Update)?;
    let element = state
        .pages()
        .update_element(Some(actor.id), page_id, element_id, payload)
        .await?;
    Ok(Json(element))
}

#[utoipa::path(
    delete,
    path = "/pages/{id}/elements/{element_id}",
    params(
        ("id" = Uuid, Path, description = "Page ID"),
        ("element_id" = Uuid, Path, description = "Page element ID")
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No such element on this page", body = ErrorBody)
    )
)]
pub async fn delete_page_element(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath((page_id, element_id)): ApiPath<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    authorize(&actor, Resource::Pages, Action::Delete)?;
    state
        .pages()
        .delete_element(Some(actor.id), page_id, element_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// bulk_delete_page_elements
///
/// [Authenticated Route] Deletes the listed elements of one page individually and
/// reports how many went.
#[utoipa::path(
    delete,
    path = "/pages/{id}/elements/bulk",
    params(("id" = Uuid, Path, description = "Page ID")),
    request_body = BulkDeleteRequest,
    responses((status = 200, description = "Deleted", body = BulkDeleteResponse))
)]
pub async fn bulk_delete_page_elements(
    actor: AuthUser,
    State(state): State<AppState>,
    ApiPath(page_id): ApiPath<Uuid>,
    ApiJson(payload): ApiJson<BulkDeleteRequest>,
) -> AppResult<Json<BulkDeleteResponse>> {
    authorize(&actor, Resource::Pages, Action::Delete)?;
    payload.validate().map_err(AppError::from)?;
    let deleted = state
        .pages()
        .bulk_delete_elements(Some(actor.id), page_id, &payload.ids)
        .await?;
    Ok(Json(BulkDeleteResponse {
        deleted,
        message: format!("{} elements deleted", deleted),
    }))
}

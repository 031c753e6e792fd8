use std::time::Duration;

use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Domain model, access control and persistence.
pub mod auth;
pub mod authz;
pub mod config;
pub mod error;
pub mod models;
pub mod permissions;
pub mod repository;

// Cross-cutting services shared through AppState.
pub mod audit;
pub mod bootstrap;
pub mod cache;
pub mod services;

// HTTP surface.
pub mod extract;
pub mod handlers;
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// Console-side lifecycle controller and its HTTP backend.
pub mod client;
pub mod machine;

// --- Public Re-exports ---

pub use audit::AuditRecorder;
pub use cache::ResponseCache;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};

use services::{AuthService, MenuService, PageService, RoleService, SecurityService, UserService};

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` model into the OpenAPI
/// document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health, handlers::auth::login, handlers::auth::refresh,
        handlers::auth::verify, handlers::auth::change_password,
        handlers::users::list_users, handlers::users::get_user, handlers::users::create_user,
        handlers::users::update_user, handlers::users::delete_user, handlers::users::get_user_roles,
        handlers::users::assign_user_roles, handlers::users::remove_user_roles,
        handlers::users::bulk_assign_roles,
        handlers::roles::list_roles, handlers::roles::get_role, handlers::roles::create_role,
        handlers::roles::update_role, handlers::roles::delete_role, handlers::roles::get_role_users,
        handlers::roles::assign_role_users, handlers::roles::remove_role_users,
        handlers::roles::get_role_permissions, handlers::roles::update_role_permissions,
        handlers::pages::list_pages, handlers::pages::get_page, handlers::pages::create_page,
        handlers::pages::update_page, handlers::pages::delete_page, handlers::pages::reorder_pages,
        handlers::pages::list_page_elements, handlers::pages::create_page_element,
        handlers::pages::update_page_element, handlers::pages::delete_page_element,
        handlers::pages::bulk_delete_page_elements,
        handlers::menus::list_menus, handlers::menus::get_menu, handlers::menus::get_menu_by_slug,
        handlers::menus::create_menu, handlers::menus::update_menu, handlers::menus::delete_menu,
        handlers::menus::reorder_menus,
        handlers::security::get_audit_logs, handlers::security::get_security_settings,
        handlers::security::update_security_settings
    ),
    components(
        schemas(
            error::ErrorBody, error::FieldError,
            permissions::Resource, permissions::Action, permissions::Permission,
            models::UserResponse, models::RoleSummary, models::CreateUserRequest,
            models::UpdateUserRequest, models::Role, models::CreateRoleRequest,
            models::UpdateRoleRequest, models::UpdatePermissionsRequest, models::UserIdsRequest,
            models::RoleIdsRequest, models::BulkAssignRolesRequest, models::BulkUpdateResponse,
            models::Page, models::PageElement, models::PageResponse, models::CreatePageRequest,
            models::UpdatePageRequest, models::CreatePageElementRequest,
            models::UpdatePageElementRequest, models::ReorderRequest, models::ReorderResponse,
            models::BulkDeleteRequest, models::BulkDeleteResponse,
            models::MenuResponse, models::MenuSummary, models::PageElementSummary,
            models::CreateMenuRequest, models::UpdateMenuRequest,
            models::AuditAction, models::AuditLog, models::AuditLogPage,
            models::SecuritySettings, models::UpdateSecuritySettingsRequest,
            models::LoginRequest, models::LoginResponse, models::RefreshRequest,
            models::ChangePasswordRequest,
        )
    ),
    tags(
        (name = "cms-portal", description = "Content and administration API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single shared container handed to every handler. Cloning is cheap: every
/// field is a handle.
#[derive(Clone)]
pub struct AppState {
    /// Entity store behind the `Repository` trait (Postgres or in-memory).
    pub repo: RepositoryState,
    pub config: AppConfig,
    /// Read-through cache for listing endpoints, invalidated on every mutation.
    pub cache: ResponseCache,
    /// Handle to the background audit worker.
    pub audit: AuditRecorder,
}

impl AppState {
    /// Builds the state and spawns the audit worker, so it must be called from
    /// within a Tokio runtime.
    pub fn new(repo: RepositoryState, config: AppConfig) -> Self {
        let cache = ResponseCache::new(Duration::from_secs(config.cache_ttl_secs));
        let audit = AuditRecorder::spawn(repo.clone());
        Self {
            repo,
            config,
            cache,
            audit,
        }
    }

    pub fn users(&self) -> UserService {
        UserService::new(self.repo.clone(), self.audit.clone())
    }

    pub fn roles(&self) -> RoleService {
        RoleService::new(self.repo.clone(), self.audit.clone())
    }

    pub fn pages(&self) -> PageService {
        PageService::new(self.repo.clone(), self.audit.clone(), self.cache.clone())
    }

    pub fn menus(&self) -> MenuService {
        MenuService::new(self.repo.clone(), self.audit.clone(), self.cache.clone())
    }

    pub fn security(&self) -> SecurityService {
        SecurityService::new(self.repo.clone(), self.audit.clone())
    }

    pub fn auth(&self) -> AuthService {
        AuthService::new(
            self.repo.clone(),
            self.audit.clone(),
            self.config.jwt_secret.clone(),
        )
    }
}

// --- Axum FromRef Extractor Implementations ---

// Lets extractors such as `AuthUser` pull only the pieces they need.

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for ResponseCache {
    fn from_ref(app_state: &AppState) -> ResponseCache {
        app_state.cache.clone()
    }
}

/// auth_middleware
///
/// Rejects unauthenticated requests with 401 before routing reaches a handler.
/// The resolved `AuthUser` is left in the request extensions, where the handler's
/// own `AuthUser` extractor picks it up without a second lookup.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing tree, applies the authentication layer to the protected
/// modules and wraps everything in the observability stack.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let protected = authenticated::authenticated_routes()
        .merge(admin::admin_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(protected)
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                // Request ID generation, one UUID per incoming request.
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // Request tracing with the request id in the span.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // Echo x-request-id back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: method, URI and the `x-request-id` header, so
/// every log line of one request shares an id.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}

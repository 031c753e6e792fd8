//! HTTP handlers.
//!
//! Every protected handler resolves the caller through the `AuthUser` extractor,
//! asks the authorization gate, then delegates to the matching orchestrator.

pub mod auth;
pub mod menus;
pub mod pages;
pub mod roles;
pub mod security;
pub mod users;

/// health
///
/// [Public Route] Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}

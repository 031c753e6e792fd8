use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Unauthenticated endpoints: the liveness check and the login and refresh
/// gateways that issue bearer tokens for every other route.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Used by monitoring and load balancers; answers "ok" without touching storage.
        .route("/health", get(handlers::health))
        // POST /auth/login
        // Exchanges email and password for a signed token whose lifetime follows the
        // `jwtExpiration` security setting.
        .route("/auth/login", post(handlers::auth::login))
        // POST /auth/refresh
        // Trades a refresh token for a new pair; refresh tokens never authenticate
        // other routes.
        .route("/auth/refresh", post(handlers::auth::refresh))
}

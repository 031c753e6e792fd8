use crate::{
    AppState,
    handlers::{roles, security, users},
};
use axum::{
    Router,
    routing::{get, post},
};

/// Admin Router Module
///
/// User administration, role management and the security console. Mounted behind
/// the authentication middleware; every handler then requires the admin role and
/// the matching permission on the role itself.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // --- Users ---
        .route("/users", get(users::list_users).post(users::create_user))
        // POST /users/bulk/roles
        // Assigns the first listed role to every listed user.
        .route("/users/bulk/roles", post(users::bulk_assign_roles))
        .route(
            "/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route(
            "/users/{id}/roles",
            get(users::get_user_roles)
                .post(users::assign_user_roles)
                .delete(users::remove_user_roles),
        )
        // --- Roles ---
        .route("/roles", get(roles::list_roles).post(roles::create_role))
        .route(
            "/roles/{id}",
            get(roles::get_role)
                .put(roles::update_role)
                .delete(roles::delete_role),
        )
        .route(
            "/roles/{id}/users",
            get(roles::get_role_users)
                .post(roles::assign_role_users)
                .delete(roles::remove_role_users),
        )
        .route(
            "/roles/{id}/permissions",
            get(roles::get_role_permissions).put(roles::update_role_permissions),
        )
        // --- Security ---
        // GET /security/logs?page=&limit=&startDate=&endDate=&userId=&action=&resource=
        .route("/security/logs", get(security::get_audit_logs))
        .route(
            "/security/settings",
            get(security::get_security_settings).put(security::update_security_settings),
        )
}

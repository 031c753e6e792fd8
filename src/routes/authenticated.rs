use crate::{
    AppState,
    handlers::{auth, menus, pages},
};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Authenticated Router Module
///
/// Account self-service and content management. Any authenticated user may call
/// these routes; what they may actually do depends on the `pages` and `menus`
/// permissions of their role.
/// Menu mutations are additionally reserved to administrators.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // --- Account ---
        .route("/auth/verify", post(auth::verify))
        .route("/auth/change-password", post(auth::change_password))
        // --- Pages ---
        .route("/pages", get(pages::list_pages).post(pages::create_page))
        // POST /pages/reorder
        // The index of each id in the body becomes that page's displayOrder.
        .route("/pages/reorder", post(pages::reorder_pages))
        .route(
            "/pages/{id}",
            get(pages::get_page)
                .put(pages::update_page)
                .delete(pages::delete_page),
        )
        // --- Page Elements ---
        .route(
            "/pages/{id}/elements",
            get(pages::list_page_elements).post(pages::create_page_element),
        )
        // DELETE /pages/{id}/elements/bulk
        // Static segment, matched ahead of the `{element_id}` capture.
        .route(
            "/pages/{id}/elements/bulk",
            delete(pages::bulk_delete_page_elements),
        )
        .route(
            "/pages/{id}/elements/{element_id}",
            put(pages::update_page_element).delete(pages::delete_page_element),
        )
        // --- Menus ---
        .route("/menus", get(menus::list_menus).post(menus::create_menu))
        .route("/menus/reorder", post(menus::reorder_menus))
        .route("/menus/slug/{slug}", get(menus::get_menu_by_slug))
        .route(
            "/menus/{id}",
            get(menus::get_menu)
                .put(menus::update_menu)
                .delete(menus::delete_menu),
        )
}

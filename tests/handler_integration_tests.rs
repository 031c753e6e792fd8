use axum::{Json, extract::State, http::StatusCode};
use cms_portal::{
    AppConfig, AppError, AppState, InMemoryRepository,
    auth::{AuthUser, resolve_user},
    extract::{ApiJson, ApiPath, ApiQuery},
    handlers,
    models::{
        AuditLogQuery, CreateMenuRequest, CreatePageElementRequest, CreatePageRequest,
        CreateRoleRequest, CreateUserRequest, ReorderRequest, UpdatePermissionsRequest,
        UpdateSecuritySettingsRequest,
    },
    permissions::{Action, Permission, Resource, full_access},
    repository::RepositoryState,
};
use std::sync::Arc;
use uuid::Uuid;

// --- Fixtures ---

fn app_state() -> AppState {
    let repo = Arc::new(InMemoryRepository::new()) as RepositoryState;
    AppState::new(repo, AppConfig::default())
}

/// Creates a role and a user holding it, and returns the resolved identity.
async fn actor_with_role(state: &AppState, role_name: &str, permissions: Vec<Permission>) -> AuthUser {
    let role = state
        .roles()
        .create(
            None,
            CreateRoleRequest {
                name: role_name.into(),
                description: None,
                permissions,
            },
        )
        .await
        .unwrap();
    let username = role_name.to_lowercase();
    let user = state
        .users()
        .create(
            None,
            CreateUserRequest {
                username: format!("{}-user", username),
                email: format!("{}@example.com", username),
                password: "secret123".into(),
                role: Some(role.id),
            },
        )
        .await
        .unwrap();
    resolve_user(&state.repo, user.id).await.unwrap().unwrap()
}

fn editor_permissions() -> Vec<Permission> {
    vec![
        Permission::new(
            Resource::Pages,
            [Action::Create, Action::Read, Action::Update, Action::Delete],
        ),
        Permission::new(Resource::Menus, [Action::Read]),
    ]
}

fn assert_forbidden<T: std::fmt::Debug>(result: Result<T, AppError>) {
    match result {
        Err(AppError::Forbidden(_)) => {}
        other => panic!("expected Forbidden, got {:?}", other),
    }
}

fn page_request(name: &str) -> CreatePageRequest {
    CreatePageRequest {
        name: name.into(),
        description: Some("landing".into()),
        display_order: 0,
    }
}

// --- Editor scenario ---

#[tokio::test]
async fn test_editor_manages_pages_but_not_menus_or_users() {
    let state = app_state();
    let editor = actor_with_role(&state, "Editor", editor_permissions()).await;

    let (status, Json(page)) = handlers::pages::create_page(
        editor.clone(),
        State(state.clone()),
        ApiJson(page_request("Home")),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);

    let (status, Json(element)) = handlers::pages::create_page_element(
        editor.clone(),
        State(state.clone()),
        ApiPath(page.id),
        ApiJson(CreatePageElementRequest {
            name: "Hero banner".into(),
            description: String::new(),
            is_root: Some(false),
            display_order: 0,
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert!(!element.is_root);

    let Json(menus) = handlers::menus::list_menus(editor.clone(), State(state.clone()))
        .await
        .unwrap();
    assert!(menus.is_empty());

    // Menu mutations are admin-only even for roles granted menus:create.
    assert_forbidden(
        handlers::menus::create_menu(
            editor.clone(),
            State(state.clone()),
            ApiJson(CreateMenuRequest {
                name: "Main".into(),
                label: "Main".into(),
                icon: "home".into(),
                slug: "main".into(),
                display_order: 0,
                parent: None,
                page_element: element.id,
            }),
        )
        .await,
    );

    assert_forbidden(handlers::users::list_users(editor.clone(), State(state.clone())).await);
    assert_forbidden(
        handlers::security::get_security_settings(editor, State(state.clone())).await,
    );
}

#[tokio::test]
async fn test_permission_change_applies_on_next_request() {
    let state = app_state();
    let admin = actor_with_role(&state, "Admin", full_access()).await;
    let editor = actor_with_role(&state, "Editor", editor_permissions()).await;
    let role_id = editor.role.as_ref().unwrap().id;

    let Json(updated) = handlers::roles::update_role_permissions(
        admin,
        State(state.clone()),
        ApiPath(role_id),
        ApiJson(UpdatePermissionsRequest {
            permissions: vec![Permission::new(Resource::Pages, [Action::Read])],
        }),
    )
    .await
    .unwrap();
    assert_eq!(updated.permissions.len(), 1);

    // A fresh resolution sees the new permission list.
    let editor = resolve_user(&state.repo, editor.id).await.unwrap().unwrap();
    assert_forbidden(
        handlers::pages::create_page(editor.clone(), State(state.clone()), ApiJson(page_request("Blog")))
            .await,
    );
    handlers::pages::list_pages(editor, State(state)).await.unwrap();
}

// --- Role endpoints are administrator-only ---

#[tokio::test]
async fn test_non_admin_role_endpoints_forbidden_even_with_permissions() {
    let state = app_state();
    // Every permission, but the role is not named "admin".
    let manager = actor_with_role(&state, "Manager", full_access()).await;
    let role_id = manager.role.as_ref().unwrap().id;

    assert_forbidden(handlers::roles::list_roles(manager.clone(), State(state.clone())).await);
    assert_forbidden(
        handlers::roles::get_role(manager.clone(), State(state.clone()), ApiPath(role_id)).await,
    );
    assert_forbidden(
        handlers::roles::create_role(
            manager.clone(),
            State(state.clone()),
            ApiJson(CreateRoleRequest {
                name: "Sneaky".into(),
                description: None,
                permissions: full_access(),
            }),
        )
        .await,
    );
    assert_forbidden(
        handlers::roles::delete_role(manager.clone(), State(state.clone()), ApiPath(role_id)).await,
    );
    assert_forbidden(
        handlers::roles::get_role_permissions(manager, State(state), ApiPath(role_id)).await,
    );
}

#[tokio::test]
async fn test_admin_without_roles_permission_is_forbidden() {
    let state = app_state();
    // Named admin, but the role itself grants nothing on roles.
    let admin = actor_with_role(
        &state,
        "ADMIN",
        vec![Permission::new(Resource::Users, [Action::Read])],
    )
    .await;

    handlers::users::list_users(admin.clone(), State(state.clone()))
        .await
        .unwrap();
    assert_forbidden(handlers::roles::list_roles(admin, State(state)).await);
}

#[tokio::test]
async fn test_user_without_role_is_forbidden_everywhere() {
    let state = app_state();
    let user = state
        .users()
        .create(
            None,
            CreateUserRequest {
                username: "nobody".into(),
                email: "nobody@example.com".into(),
                password: "secret123".into(),
                role: None,
            },
        )
        .await
        .unwrap();
    let actor = resolve_user(&state.repo, user.id).await.unwrap().unwrap();

    assert_forbidden(handlers::pages::list_pages(actor.clone(), State(state.clone())).await);
    assert_forbidden(handlers::menus::list_menus(actor, State(state)).await);
}

// --- Admin flows ---

#[tokio::test]
async fn test_admin_cannot_delete_self_via_handler() {
    let state = app_state();
    let admin = actor_with_role(&state, "Admin", full_access()).await;
    let admin_id = admin.id;

    let err = handlers::users::delete_user(admin, State(state), ApiPath(admin_id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidOperation(_)));
}

#[tokio::test]
async fn test_admin_reorders_pages() {
    let state = app_state();
    let admin = actor_with_role(&state, "Admin", full_access()).await;

    let mut ids = Vec::new();
    for name in ["One", "Two", "Three"] {
        let (_, Json(page)) = handlers::pages::create_page(
            admin.clone(),
            State(state.clone()),
            ApiJson(page_request(name)),
        )
        .await
        .unwrap();
        ids.push(page.id);
    }

    let Json(response) = handlers::pages::reorder_pages(
        admin.clone(),
        State(state.clone()),
        ApiJson(ReorderRequest {
            ids: vec![ids[2], ids[0], ids[1]],
        }),
    )
    .await
    .unwrap();
    assert_eq!(response.updated, 3);

    let Json(pages) = handlers::pages::list_pages(admin, State(state)).await.unwrap();
    let order: Vec<Uuid> = pages.iter().map(|p| p.id).collect();
    assert_eq!(order, vec![ids[2], ids[0], ids[1]]);
}

#[tokio::test]
async fn test_empty_reorder_is_rejected() {
    let state = app_state();
    let admin = actor_with_role(&state, "Admin", full_access()).await;

    let err = handlers::pages::reorder_pages(admin, State(state), ApiJson(ReorderRequest { ids: vec![] }))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_audit_log_pagination() {
    let state = app_state();
    let admin = actor_with_role(&state, "Admin", full_access()).await;

    for i in 0..12 {
        handlers::pages::create_page(
            admin.clone(),
            State(state.clone()),
            ApiJson(page_request(&format!("Page {}", i))),
        )
        .await
        .unwrap();
    }
    state.audit.flush().await;

    let query = AuditLogQuery {
        page: Some(2),
        limit: Some(10),
        user_id: Some(admin.id),
        resource: Some(Resource::Pages),
        ..Default::default()
    };
    let Json(page) =
        handlers::security::get_audit_logs(admin.clone(), State(state.clone()), ApiQuery(query))
            .await
            .unwrap();
    assert_eq!(page.count, 12);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.logs.len(), 2);
    assert_eq!(page.page, 2);

    let too_small = AuditLogQuery {
        limit: Some(5),
        ..Default::default()
    };
    let err = handlers::security::get_audit_logs(admin, State(state), ApiQuery(too_small))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

#[tokio::test]
async fn test_security_settings_round_trip() {
    let state = app_state();
    let admin = actor_with_role(&state, "Admin", full_access()).await;

    let Json(settings) = handlers::security::update_security_settings(
        admin.clone(),
        State(state.clone()),
        ApiJson(UpdateSecuritySettingsRequest {
            jwt_expiration: Some("15m".into()),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(settings.jwt_expiration, "15m");
    assert_eq!(settings.refresh_token_expiration, "7d");

    let err = handlers::security::update_security_settings(
        admin,
        State(state),
        ApiJson(UpdateSecuritySettingsRequest {
            refresh_token_expiration: Some("forever".into()),
            ..Default::default()
        }),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
}

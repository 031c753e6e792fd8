use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use cms_portal::{
    AppConfig, AppState, InMemoryRepository, bootstrap, create_router,
    config::Env,
    models::{LoginResponse, Page, PageResponse},
    repository::RepositoryState,
};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const ADMIN_EMAIL: &str = "root@example.com";
const ADMIN_PASSWORD: &str = "changeme";

struct TestApp {
    router: Router,
    state: AppState,
    admin_id: Uuid,
}

/// Builds the full router over an in-memory store with a seeded administrator.
async fn spawn_app(env: Env) -> TestApp {
    let repo = Arc::new(InMemoryRepository::new()) as RepositoryState;
    let config = AppConfig {
        env,
        admin_email: Some(ADMIN_EMAIL.into()),
        admin_password: Some(ADMIN_PASSWORD.into()),
        ..AppConfig::default()
    };
    bootstrap::ensure_admin(&repo, &config).await.unwrap();
    let admin_id = repo.list_users().await.unwrap()[0].id;

    let state = AppState::new(repo, config);
    TestApp {
        router: create_router(state.clone()),
        state,
        admin_id,
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, body)
}

fn json_request(method: Method, uri: &str, user: Option<Uuid>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(id) = user {
        builder = builder.header("x-user-id", id.to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, user: Option<Uuid>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(id) = user {
        builder = builder.header("x-user-id", id.to_string());
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app(Env::Local).await;
    let response = app.router.clone().oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    // Every response carries a request id.
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_openapi_document_served() {
    let app = spawn_app(Env::Local).await;
    let (status, body) = send(&app, get("/api-docs/openapi.json", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/pages/{id}/elements/bulk"].is_object());
    assert!(body["paths"]["/security/logs"].is_object());
    assert!(body["paths"]["/auth/refresh"].is_object());
    assert!(body["paths"]["/auth/change-password"].is_object());
}

#[tokio::test]
async fn test_protected_routes_require_authentication() {
    let app = spawn_app(Env::Local).await;
    for uri in ["/pages", "/menus", "/users", "/roles", "/security/settings"] {
        let (status, body) = send(&app, get(uri, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert!(body["message"].is_string());
    }

    // A header naming nobody is no better than no header.
    let (status, _) = send(&app, get("/pages", Some(Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_header_bypass_is_local_only() {
    let app = spawn_app(Env::Production).await;
    let (status, _) = send(&app, get("/pages", Some(app.admin_id))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_and_bearer_token() {
    let app = spawn_app(Env::Production).await;

    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            "/auth/login",
            None,
            json!({ "email": ADMIN_EMAIL, "password": "wrong" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/auth/login",
            None,
            json!({ "email": "ROOT@example.com", "password": ADMIN_PASSWORD }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let login: LoginResponse = serde_json::from_value(body).unwrap();
    assert_eq!(login.user.id, app.admin_id);
    assert_eq!(login.user.role.as_ref().unwrap().name, "Admin");

    let request = Request::builder()
        .uri("/users")
        .header(header::AUTHORIZATION, format!("Bearer {}", login.token))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    let users = body.as_array().unwrap();
    assert_eq!(users.len(), 1);
    // Password hashes never leave the server.
    assert!(users[0].get("password").is_none());
    assert!(users[0].get("passwordHash").is_none());

    let request = Request::builder()
        .uri("/users")
        .header(header::AUTHORIZATION, "Bearer not.a.token")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

fn with_bearer(method: Method, uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn login(app: &TestApp, password: &str) -> (StatusCode, Value) {
    send(
        app,
        json_request(
            Method::POST,
            "/auth/login",
            None,
            json!({ "email": ADMIN_EMAIL, "password": password }),
        ),
    )
    .await
}

#[tokio::test]
async fn test_refresh_token_only_renews() {
    let app = spawn_app(Env::Production).await;
    let (status, body) = login(&app, ADMIN_PASSWORD).await;
    assert_eq!(status, StatusCode::OK);
    let first: LoginResponse = serde_json::from_value(body).unwrap();
    assert!(first.refresh_expires_at > first.expires_at);

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/auth/refresh",
            None,
            json!({ "refreshToken": first.refresh_token }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let renewed: LoginResponse = serde_json::from_value(body).unwrap();
    assert_eq!(renewed.user.id, app.admin_id);
    let (status, _) = send(
        &app,
        with_bearer(Method::GET, "/pages", &renewed.token, Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // An access token cannot be refreshed, and a refresh token is no bearer.
    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            "/auth/refresh",
            None,
            json!({ "refreshToken": first.token }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(
        &app,
        with_bearer(Method::GET, "/pages", &first.refresh_token, Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_verify_and_change_password() {
    let app = spawn_app(Env::Production).await;
    let (_, body) = login(&app, ADMIN_PASSWORD).await;
    let session: LoginResponse = serde_json::from_value(body).unwrap();

    let (status, body) = send(
        &app,
        with_bearer(Method::POST, "/auth/verify", &session.token, Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], json!(app.admin_id));
    let (status, _) = send(
        &app,
        json_request(Method::POST, "/auth/verify", None, Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(
        &app,
        with_bearer(
            Method::POST,
            "/auth/change-password",
            &session.token,
            json!({ "currentPassword": "wrong", "newPassword": "brand-new-secret" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], json!("currentPassword"));

    let (status, _) = send(
        &app,
        with_bearer(
            Method::POST,
            "/auth/change-password",
            &session.token,
            json!({ "currentPassword": ADMIN_PASSWORD, "newPassword": "brand-new-secret" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = login(&app, ADMIN_PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = login(&app, "brand-new-secret").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_page_lifecycle_over_http() {
    let app = spawn_app(Env::Local).await;
    let admin = Some(app.admin_id);

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/pages", admin, json!({ "name": "Home", "displayOrder": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let page: Page = serde_json::from_value(body).unwrap();

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            &format!("/pages/{}/elements", page.id),
            admin,
            json!({ "name": "Hero banner" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["page"], json!(page.id));
    assert_eq!(body["isRoot"], json!(true));
    let element_id = body["id"].as_str().unwrap().to_string();

    // Cached listing reflects the new element.
    let (status, body) = send(&app, get("/pages", admin)).await;
    assert_eq!(status, StatusCode::OK);
    let pages: Vec<PageResponse> = serde_json::from_value(body).unwrap();
    assert_eq!(pages[0].page_elements.len(), 1);

    let (status, body) = send(
        &app,
        json_request(Method::DELETE, &format!("/pages/{}", page.id), admin, Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("elements"));

    let (_, body) = send(&app, get(&format!("/pages/{}/elements", page.id), admin)).await;
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(
        &app,
        json_request(
            Method::DELETE,
            &format!("/pages/{}/elements/bulk", page.id),
            admin,
            json!({ "ids": [element_id] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], json!(1));

    // The elements listing was cached above; the delete must have dropped it.
    let (_, body) = send(&app, get(&format!("/pages/{}/elements", page.id), admin)).await;
    assert_eq!(body, json!([]));

    let (status, _) = send(
        &app,
        json_request(Method::DELETE, &format!("/pages/{}", page.id), admin, Value::Null),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, get(&format!("/pages/{}", page.id), admin)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_validation_error_body_lists_fields() {
    let app = spawn_app(Env::Local).await;
    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/users",
            Some(app.admin_id),
            json!({ "username": "x", "email": "nope", "password": "123" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"username"));
    assert!(fields.contains(&"email"));
    assert!(fields.contains(&"password"));
}

#[tokio::test]
async fn test_malformed_input_is_a_validation_error() {
    let app = spawn_app(Env::Local).await;

    let (status, body) = send(&app, get("/pages/not-a-uuid", Some(app.admin_id))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], json!("path"));

    // Unknown resource names fail deserialization.
    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/roles",
            Some(app.admin_id),
            json!({ "name": "Weird", "permissions": [{ "resource": "billing", "actions": ["read"] }] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], json!("body"));
}

#[tokio::test]
async fn test_menu_mutation_requires_admin_over_http() {
    let app = spawn_app(Env::Local).await;
    let admin = Some(app.admin_id);

    let (_, body) = send(
        &app,
        json_request(
            Method::POST,
            "/roles",
            admin,
            json!({
                "name": "Editor",
                "permissions": [
                    { "resource": "pages", "actions": ["create", "read", "update", "delete"] },
                    { "resource": "menus", "actions": ["create", "read", "update", "delete"] }
                ]
            }),
        ),
    )
    .await;
    let role_id = body["id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/users",
            admin,
            json!({
                "username": "editor",
                "email": "editor@example.com",
                "password": "secret123",
                "role": role_id
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let editor = Some(Uuid::parse_str(body["id"].as_str().unwrap()).unwrap());

    let (status, _) = send(&app, get("/menus", editor)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/menus/reorder", editor, json!({ "ids": [Uuid::new_v4()] })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["message"].is_string());

    let (status, _) = send(&app, get("/roles", editor)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/menus/reorder", admin, json!({ "ids": [Uuid::new_v4()] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["updated"], json!(0));

    app.state.audit.flush().await;
}

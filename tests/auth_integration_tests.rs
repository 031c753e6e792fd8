use axum::{
    extract::FromRequestParts,
    http::{Method, Request, Uri, header, request::Parts},
};
use cms_portal::{
    AppConfig, AppError, AppState, InMemoryRepository,
    auth::{AuthUser, Claims, TokenKind, hash_password, issue_refresh_token, issue_token},
    config::Env,
    permissions::{Action, Resource, full_access},
    repository::{NewRole, NewUser, RepositoryState},
};
use jsonwebtoken::{EncodingKey, Header, encode};
use std::{sync::Arc, time::SystemTime};
use uuid::Uuid;

// --- Helper Functions ---

const TEST_JWT_SECRET: &str = "test-secret-value-1234567890";

fn create_token(user_id: Uuid, exp_offset: i64) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now + exp_offset) as usize,
        kind: TokenKind::Access,
    };

    let key = EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes());
    encode(&Header::default(), &claims, &key).unwrap()
}

/// Builds state over a fresh in-memory store holding one "Admin" user.
async fn create_app_state(env: Env) -> (AppState, Uuid) {
    let repo = Arc::new(InMemoryRepository::new()) as RepositoryState;
    let role = repo
        .create_role(NewRole {
            name: "Admin".into(),
            description: None,
            permissions: full_access(),
        })
        .await
        .unwrap();
    let user = repo
        .create_user(NewUser {
            username: "admin".into(),
            email: "admin@example.com".into(),
            password_hash: hash_password("changeme").unwrap(),
            role_id: Some(role.id),
        })
        .await
        .unwrap();

    let config = AppConfig {
        env,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        ..AppConfig::default()
    };
    (AppState::new(repo, config), user.id)
}

fn get_request_parts(method: Method, uri: Uri) -> Parts {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap();
    let (parts, _) = request.into_parts();
    parts
}

fn with_bearer(parts: &mut Parts, token: &str) {
    parts.headers.insert(
        header::AUTHORIZATION,
        header::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
}

fn with_user_header(parts: &mut Parts, id: Uuid) {
    parts.headers.insert(
        header::HeaderName::from_static("x-user-id"),
        header::HeaderValue::from_str(&id.to_string()).unwrap(),
    );
}

// --- Tests ---

#[tokio::test]
async fn test_auth_success_with_valid_jwt() {
    let (app_state, user_id) = create_app_state(Env::Production).await;
    let token = create_token(user_id, 3600);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(user.id, user_id);
    assert!(user.is_admin());
    assert!(user.has_action(Resource::Pages, Action::Delete));

    // The identity is cached on the request for later extractors.
    assert!(parts.extensions.get::<AuthUser>().is_some());
}

#[tokio::test]
async fn test_issued_token_is_accepted() {
    let (app_state, user_id) = create_app_state(Env::Production).await;
    let (token, _) =
        issue_token(TEST_JWT_SECRET, user_id, chrono::Duration::minutes(15)).unwrap();

    let mut parts = get_request_parts(Method::GET, "/pages".parse().unwrap());
    with_bearer(&mut parts, &token);

    let user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(user.username, "admin");
}

#[tokio::test]
async fn test_refresh_token_is_not_a_bearer() {
    let (app_state, user_id) = create_app_state(Env::Production).await;
    let (token, _) =
        issue_refresh_token(TEST_JWT_SECRET, user_id, chrono::Duration::days(7)).unwrap();

    let mut parts = get_request_parts(Method::GET, "/pages".parse().unwrap());
    with_bearer(&mut parts, &token);

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert!(matches!(result, Err(AppError::Unauthenticated)));
}

#[tokio::test]
async fn test_tokens_without_kind_claim_are_access_tokens() {
    let (app_state, user_id) = create_app_state(Env::Production).await;
    let now = chrono::Utc::now().timestamp();
    let legacy = serde_json::json!({ "sub": user_id, "iat": now, "exp": now + 3600 });
    let key = EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes());
    let token = encode(&Header::default(), &legacy, &key).unwrap();

    let mut parts = get_request_parts(Method::GET, "/pages".parse().unwrap());
    with_bearer(&mut parts, &token);

    let user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(user.id, user_id);
}

#[tokio::test]
async fn test_auth_failure_with_missing_header() {
    let (app_state, _) = create_app_state(Env::Production).await;
    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert!(matches!(result, Err(AppError::Unauthenticated)));
}

#[tokio::test]
async fn test_auth_failure_with_expired_jwt() {
    let (app_state, user_id) = create_app_state(Env::Production).await;
    // Well past the validator's default leeway.
    let token = create_token(user_id, -600);

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert!(matches!(result, Err(AppError::Unauthenticated)));
}

#[tokio::test]
async fn test_auth_failure_with_foreign_signature() {
    let (app_state, user_id) = create_app_state(Env::Production).await;
    let (token, _) =
        issue_token("some-other-secret", user_id, chrono::Duration::minutes(15)).unwrap();

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert!(matches!(result, Err(AppError::Unauthenticated)));
}

#[tokio::test]
async fn test_deleted_user_loses_access() {
    let (app_state, user_id) = create_app_state(Env::Production).await;
    let token = create_token(user_id, 3600);
    app_state.repo.delete_user(user_id).await.unwrap();

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_bearer(&mut parts, &token);

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert!(matches!(result, Err(AppError::Unauthenticated)));
}

#[tokio::test]
async fn test_local_bypass_success() {
    let (app_state, user_id) = create_app_state(Env::Local).await;

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_user_header(&mut parts, user_id);

    let user = AuthUser::from_request_parts(&mut parts, &app_state)
        .await
        .unwrap();
    assert_eq!(user.id, user_id);
    assert_eq!(user.role.unwrap().name, "Admin");
}

#[tokio::test]
async fn test_local_bypass_unknown_user_falls_through() {
    let (app_state, _) = create_app_state(Env::Local).await;

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    with_user_header(&mut parts, Uuid::new_v4());

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert!(matches!(result, Err(AppError::Unauthenticated)));
}

#[tokio::test]
async fn test_local_bypass_disabled_in_prod() {
    let (app_state, user_id) = create_app_state(Env::Production).await;

    let mut parts = get_request_parts(Method::GET, "/".parse().unwrap());
    // Provide ONLY the local bypass header
    with_user_header(&mut parts, user_id);

    let result = AuthUser::from_request_parts(&mut parts, &app_state).await;
    assert!(matches!(result, Err(AppError::Unauthenticated)));
}

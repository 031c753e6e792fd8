use axum::{http::StatusCode, response::IntoResponse};
use chrono::Utc;
use cms_portal::{
    AppError,
    error::FieldError,
    models::{
        AuditAction, ChangePasswordRequest, CreateMenuRequest, CreatePageRequest,
        CreateUserRequest, PageElement, Role, UpdateMenuRequest, UpdateSecuritySettingsRequest,
        UserRecord, UserResponse,
    },
    permissions::{Action, Permission, Resource},
    repository::{EntityKind, RepoError},
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

// --- Wire shapes ---

#[test]
fn test_user_response_hides_password_and_uses_camel_case() {
    let role = Role {
        id: Uuid::new_v4(),
        name: "Editor".into(),
        description: None,
        permissions: vec![],
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let record = UserRecord {
        id: Uuid::new_v4(),
        username: "alice".into(),
        email: "alice@example.com".into(),
        password_hash: "$argon2id$v=19$secret".into(),
        role_id: Some(role.id),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let value = serde_json::to_value(UserResponse::new(record, Some(&role))).unwrap();
    let text = value.to_string();
    assert!(!text.contains("argon2"));
    assert!(value.get("createdAt").is_some());
    assert!(value.get("created_at").is_none());
    assert_eq!(value["role"], json!({ "id": role.id, "name": "Editor" }));
}

#[test]
fn test_page_element_serializes_owner_as_page() {
    let page_id = Uuid::new_v4();
    let element = PageElement {
        id: Uuid::new_v4(),
        name: "Hero banner".into(),
        description: String::new(),
        is_root: true,
        display_order: 2,
        page_id,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let value = serde_json::to_value(&element).unwrap();
    assert_eq!(value["page"], json!(page_id));
    assert_eq!(value["isRoot"], json!(true));
    assert_eq!(value["displayOrder"], json!(2));
}

#[test]
fn test_permission_rejects_unknown_resource_and_action() {
    let ok: Permission =
        serde_json::from_value(json!({ "resource": "menus", "actions": ["read", "update"] }))
            .unwrap();
    assert_eq!(ok.resource, Resource::Menus);
    assert_eq!(ok.actions, vec![Action::Read, Action::Update]);

    assert!(
        serde_json::from_value::<Permission>(json!({ "resource": "billing", "actions": [] }))
            .is_err()
    );
    assert!(
        serde_json::from_value::<Permission>(json!({ "resource": "pages", "actions": ["publish"] }))
            .is_err()
    );
}

#[test]
fn test_audit_action_wire_names() {
    assert_eq!(
        serde_json::to_value(AuditAction::BulkAssignRoles).unwrap(),
        json!("bulk_assign_roles")
    );
    assert_eq!(
        "update_permissions".parse::<AuditAction>().unwrap(),
        AuditAction::UpdatePermissions
    );
    assert!("publish".parse::<AuditAction>().is_err());
}

#[test]
fn test_menu_request_reads_camel_case() {
    let element = Uuid::new_v4();
    let req: CreateMenuRequest = serde_json::from_value(json!({
        "name": "Main",
        "label": "Main",
        "icon": "home",
        "slug": "main",
        "pageElement": element
    }))
    .unwrap();
    assert_eq!(req.page_element, element);
    assert_eq!(req.display_order, 0);
    assert!(req.parent.is_none());
}

#[test]
fn test_menu_update_tells_null_parent_from_missing() {
    let parent = Uuid::new_v4();
    let parse = |value| serde_json::from_value::<UpdateMenuRequest>(value).unwrap();

    assert_eq!(parse(json!({ "label": "Main" })).parent, None);
    assert_eq!(parse(json!({ "parent": null })).parent, Some(None));
    assert_eq!(parse(json!({ "parent": parent })).parent, Some(Some(parent)));
}

// --- Validation rules ---

#[test]
fn test_create_user_rules() {
    let req = CreateUserRequest {
        username: "ab".into(),
        email: "nope".into(),
        password: "12345".into(),
        role: None,
    };
    let errors = req.validate().unwrap_err();
    let fields = errors.field_errors();
    assert!(fields.contains_key("username"));
    assert!(fields.contains_key("email"));
    assert!(fields.contains_key("password"));
}

#[test]
fn test_page_display_order_must_not_be_negative() {
    let req = CreatePageRequest {
        name: "Home".into(),
        description: None,
        display_order: -1,
    };
    assert!(req.validate().is_err());
}

#[test]
fn test_change_password_rules() {
    let req: ChangePasswordRequest =
        serde_json::from_value(json!({ "currentPassword": "", "newPassword": "12345" })).unwrap();
    let errors = req.validate().unwrap_err();
    let fields = errors.field_errors();
    assert!(fields.contains_key("current_password"));
    assert!(fields.contains_key("new_password"));
}

#[test]
fn test_settings_password_floor() {
    let req = UpdateSecuritySettingsRequest {
        password_min_length: Some(4),
        ..Default::default()
    };
    assert!(req.validate().is_err());
}

// --- Error mapping ---

#[test]
fn test_error_status_codes() {
    let cases = [
        (AppError::invalid("name", "required"), StatusCode::BAD_REQUEST),
        (AppError::Conflict("dup".into()), StatusCode::BAD_REQUEST),
        (AppError::HasDependents("kids".into()), StatusCode::BAD_REQUEST),
        (AppError::InvalidOperation("self".into()), StatusCode::BAD_REQUEST),
        (AppError::NotFound("gone".into()), StatusCode::NOT_FOUND),
        (AppError::Forbidden("no".into()), StatusCode::FORBIDDEN),
        (AppError::Unauthenticated, StatusCode::UNAUTHORIZED),
        (AppError::Unexpected("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (err, status) in cases {
        assert_eq!(err.status(), status, "{:?}", err);
    }
}

#[test]
fn test_unexpected_error_hides_detail() {
    let body = AppError::Unexpected("connection refused at 10.0.0.3".into()).body();
    assert!(!body.message.contains("10.0.0.3"));
    assert!(body.errors.is_empty());

    let response = AppError::Unexpected("detail".into()).into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[test]
fn test_validation_body_carries_fields() {
    let body = AppError::Validation(vec![FieldError::new("slug", "bad")]).body();
    let value = serde_json::to_value(&body).unwrap();
    assert_eq!(value["errors"][0], json!({ "field": "slug", "message": "bad" }));

    // `errors` is omitted entirely when there are none.
    let value = serde_json::to_value(AppError::Forbidden("no".into()).body()).unwrap();
    assert!(value.get("errors").is_none());
}

#[test]
fn test_store_errors_translate() {
    assert!(matches!(
        AppError::from(RepoError::DuplicateKey("email".into())),
        AppError::Conflict(_)
    ));
    match AppError::from(RepoError::NotFound(EntityKind::Menu)) {
        AppError::NotFound(message) => assert_eq!(message, "Menu not found"),
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        AppError::from(RepoError::Backend("pool timed out".into())),
        AppError::Unexpected(_)
    ));
}

#[test]
fn test_foreign_key_errors_are_client_errors() {
    // A concurrent child insert makes the parent delete trip the foreign key.
    let err = AppError::from(RepoError::StillReferenced("parent".into()));
    assert!(matches!(err, AppError::HasDependents(_)));
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);

    // A concurrent parent delete makes the child write trip it instead.
    match AppError::from(RepoError::MissingReference("parent".into())) {
        AppError::Validation(fields) => assert_eq!(fields[0].field, "parent"),
        other => panic!("unexpected {:?}", other),
    }
}

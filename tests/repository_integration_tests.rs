//! PostgreSQL-backed store tests. They need a reachable `DATABASE_URL` and are
//! skipped by default; run them with `cargo test -- --ignored`.

use cms_portal::{
    models::{AuditAction, NewAuditLog, SecuritySettings},
    permissions::{Action, Permission, Resource},
    repository::{
        AuditFilter, EntityKind, MenuPatch, NewMenu, NewPage, NewPageElement, NewRole, NewUser,
        PagePatch, PostgresRepository, RepoError, Repository, RolePatch, UserPatch,
    },
};
use sqlx::PgPool;
use tokio::test;
use uuid::Uuid;

// --- Test Context and Setup ---

/// A simple structure to hold the database pool for testing
struct DbTestContext {
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");

        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run database migrations.");

        DbTestContext { pool }
    }

    fn repository(&self) -> PostgresRepository {
        PostgresRepository::new(self.pool.clone())
    }
}

// --- Test Data Helpers ---

/// Unique names keep tests independent on a shared database.
fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

async fn create_test_page(repo: &PostgresRepository, display_order: i32) -> cms_portal::models::Page {
    repo.create_page(NewPage {
        name: unique("page"),
        description: Some("Integration page".into()),
        display_order,
    })
    .await
    .expect("Failed to create test page")
}

// --- Tests ---

#[test]
#[ignore = "requires DATABASE_URL"]
async fn test_user_uniqueness_maps_to_duplicate_key() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let username = unique("user");
    let email = format!("{}@test.com", username);

    let user = repo
        .create_user(NewUser {
            username: username.clone(),
            email: email.clone(),
            password_hash: "hash".into(),
            role_id: None,
        })
        .await
        .unwrap();
    assert_eq!(repo.find_user_by_email(&email).await.unwrap().unwrap().id, user.id);

    let clash = repo
        .create_user(NewUser {
            username: unique("user"),
            email: email.clone(),
            password_hash: "hash".into(),
            role_id: None,
        })
        .await;
    match clash {
        Err(RepoError::DuplicateKey(field)) => assert_eq!(field, "email"),
        other => panic!("expected DuplicateKey, got {:?}", other),
    }

    repo.delete_user(user.id).await.unwrap();
    assert!(repo.get_user(user.id).await.unwrap().is_none());
}

#[test]
#[ignore = "requires DATABASE_URL"]
async fn test_role_permissions_round_trip_and_assignment_count() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    let role = repo
        .create_role(NewRole {
            name: unique("role"),
            description: None,
            permissions: vec![Permission::new(Resource::Pages, [Action::Read, Action::Update])],
        })
        .await
        .unwrap();
    let fetched = repo.get_role(role.id).await.unwrap().unwrap();
    assert_eq!(fetched.permissions, role.permissions);

    let user = repo
        .create_user(NewUser {
            username: unique("member"),
            email: format!("{}@test.com", unique("member")),
            password_hash: "hash".into(),
            role_id: Some(role.id),
        })
        .await
        .unwrap();
    assert_eq!(repo.count_users_with_role(role.id).await.unwrap(), 1);

    // Clearing the role is distinct from leaving it alone.
    let untouched = repo
        .update_user(user.id, UserPatch::default())
        .await
        .unwrap();
    assert_eq!(untouched.role_id, Some(role.id));
    let cleared = repo
        .update_user(
            user.id,
            UserPatch {
                role_id: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(cleared.role_id.is_none());
    assert_eq!(repo.count_users_with_role(role.id).await.unwrap(), 0);

    let updated = repo
        .update_role(
            role.id,
            RolePatch {
                permissions: Some(vec![]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.permissions.is_empty());
    assert_eq!(updated.name, role.name);

    repo.delete_user(user.id).await.unwrap();
    repo.delete_role(role.id).await.unwrap();
}

#[test]
#[ignore = "requires DATABASE_URL"]
async fn test_page_patch_and_unknown_ids() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let page = create_test_page(&repo, 4).await;

    let patched = repo
        .update_page(
            page.id,
            PagePatch {
                display_order: Some(9),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(patched.display_order, 9);
    assert_eq!(patched.name, page.name);
    assert_eq!(patched.description, page.description);

    let missing = repo.update_page(Uuid::new_v4(), PagePatch::default()).await;
    assert!(matches!(missing, Err(RepoError::NotFound(EntityKind::Page))));
    let missing = repo.delete_page(Uuid::new_v4()).await;
    assert!(matches!(missing, Err(RepoError::NotFound(EntityKind::Page))));

    repo.delete_page(page.id).await.unwrap();
}

#[test]
#[ignore = "requires DATABASE_URL"]
async fn test_elements_listed_by_display_order_then_insertion() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let page = create_test_page(&repo, 0).await;

    let mut created = Vec::new();
    for order in [2, 1, 1] {
        let element = repo
            .create_page_element(NewPageElement {
                name: unique("element"),
                description: String::new(),
                is_root: true,
                display_order: order,
                page_id: page.id,
            })
            .await
            .unwrap();
        created.push(element.id);
    }

    let listed: Vec<Uuid> = repo
        .list_page_elements(page.id)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(listed, vec![created[1], created[2], created[0]]);
    assert_eq!(repo.count_page_elements(page.id).await.unwrap(), 3);

    for id in created {
        repo.delete_page_element(id).await.unwrap();
    }
    repo.delete_page(page.id).await.unwrap();
}

#[test]
#[ignore = "requires DATABASE_URL"]
async fn test_menu_children_and_slug_lookup() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let slug = unique("slug");

    let parent = repo
        .create_menu(NewMenu {
            name: unique("menu"),
            label: "Main".into(),
            icon: "home".into(),
            slug: slug.clone(),
            display_order: 0,
            parent_id: None,
            page_element_id: Uuid::new_v4(),
        })
        .await
        .unwrap();
    let child = repo
        .create_menu(NewMenu {
            name: unique("menu"),
            label: "Child".into(),
            icon: "dot".into(),
            slug: unique("slug"),
            display_order: 0,
            parent_id: Some(parent.id),
            page_element_id: Uuid::new_v4(),
        })
        .await
        .unwrap();

    assert_eq!(repo.count_child_menus(parent.id).await.unwrap(), 1);
    assert_eq!(
        repo.find_menu_by_slug(&slug).await.unwrap().unwrap().id,
        parent.id
    );

    let detached = repo
        .update_menu(
            child.id,
            MenuPatch {
                parent_id: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(detached.parent_id.is_none());
    assert_eq!(repo.count_child_menus(parent.id).await.unwrap(), 0);

    repo.delete_menu(child.id).await.unwrap();
    repo.delete_menu(parent.id).await.unwrap();
}

#[test]
#[ignore = "requires DATABASE_URL"]
async fn test_foreign_key_violations_map_to_reference_errors() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    let menu = |parent_id| NewMenu {
        name: unique("menu"),
        label: "Menu".into(),
        icon: "home".into(),
        slug: unique("slug"),
        display_order: 0,
        parent_id,
        page_element_id: Uuid::new_v4(),
    };
    let parent = repo.create_menu(menu(None)).await.unwrap();
    let child = repo.create_menu(menu(Some(parent.id))).await.unwrap();

    match repo.delete_menu(parent.id).await {
        Err(RepoError::StillReferenced(field)) => assert_eq!(field, "parent"),
        other => panic!("expected StillReferenced, got {:?}", other),
    }
    match repo.create_menu(menu(Some(Uuid::new_v4()))).await {
        Err(RepoError::MissingReference(field)) => assert_eq!(field, "parent"),
        other => panic!("expected MissingReference, got {:?}", other),
    }

    repo.delete_menu(child.id).await.unwrap();
    repo.delete_menu(parent.id).await.unwrap();
}

#[test]
#[ignore = "requires DATABASE_URL"]
async fn test_audit_query_filters_and_counts() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();
    let actor = Uuid::new_v4();

    for action in [AuditAction::Create, AuditAction::Update, AuditAction::Update] {
        repo.append_audit_log(NewAuditLog {
            user_id: Some(actor),
            action,
            resource: Resource::Menus,
            details: format!("{} menu", action),
        })
        .await
        .unwrap();
    }

    let (logs, total) = repo
        .query_audit_logs(&AuditFilter {
            user_id: Some(actor),
            action: Some(AuditAction::Update),
            limit: 1,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].resource, Resource::Menus);

    let (logs, total) = repo
        .query_audit_logs(&AuditFilter {
            user_id: Some(actor),
            limit: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 3);
    // Newest first.
    assert!(logs.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
}

#[test]
#[ignore = "requires DATABASE_URL"]
async fn test_security_settings_upsert() {
    let ctx = DbTestContext::setup().await;
    let repo = ctx.repository();

    let saved = repo
        .save_security_settings(SecuritySettings {
            jwt_expiration: "2h".into(),
            ..SecuritySettings::default()
        })
        .await
        .unwrap();
    let loaded = repo.get_security_settings().await.unwrap();
    assert_eq!(loaded.jwt_expiration, saved.jwt_expiration);
    assert_eq!(loaded.password_min_length, saved.password_min_length);

    repo.save_security_settings(SecuritySettings::default())
        .await
        .unwrap();
}

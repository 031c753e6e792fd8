use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{fmt, sync::Arc};
use uuid::Uuid;

use crate::{
    models::{
        AuditAction, AuditLog, Menu, NewAuditLog, Page, PageElement, Role, SecuritySettings,
        UserRecord,
    },
    permissions::{Permission, Resource},
};

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

/// EntityKind
///
/// Names the stored entity a `RepoError::NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    User,
    Role,
    Page,
    PageElement,
    Menu,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::User => "User",
            EntityKind::Role => "Role",
            EntityKind::Page => "Page",
            EntityKind::PageElement => "Page element",
            EntityKind::Menu => "Menu",
        })
    }
}

/// RepoError
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// A unique field (`username`, `email`, `name`) already holds this value.
    #[error("duplicate value for unique field `{0}`")]
    DuplicateKey(String),
    #[error("{0} not found")]
    NotFound(EntityKind),
    /// The row being deleted is still referenced by another row.
    #[error("row is still referenced through `{0}`")]
    StillReferenced(String),
    /// A foreign key (`parent`, `page`, `role`) names a row that does not exist.
    #[error("referenced row for `{0}` does not exist")]
    MissingReference(String),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

// --- Insert payloads and merge patches ---
//
// Patch fields left as `None` are untouched. `Option<Option<_>>` distinguishes
// "leave alone" from "clear".

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub role_id: Option<Option<Uuid>>,
}

#[derive(Debug, Clone)]
pub struct NewRole {
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Default)]
pub struct RolePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub permissions: Option<Vec<Permission>>,
}

#[derive(Debug, Clone)]
pub struct NewPage {
    pub name: String,
    pub description: Option<String>,
    pub display_order: i32,
}

#[derive(Debug, Clone, Default)]
pub struct PagePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub display_order: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewPageElement {
    pub name: String,
    pub description: String,
    pub is_root: bool,
    pub display_order: i32,
    pub page_id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct PageElementPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_root: Option<bool>,
    pub display_order: Option<i32>,
    pub page_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewMenu {
    pub name: String,
    pub label: String,
    pub icon: String,
    pub slug: String,
    pub display_order: i32,
    pub parent_id: Option<Uuid>,
    pub page_element_id: Uuid,
}

#[derive(Debug, Clone, Default)]
pub struct MenuPatch {
    pub name: Option<String>,
    pub label: Option<String>,
    pub icon: Option<String>,
    pub slug: Option<String>,
    pub display_order: Option<i32>,
    pub parent_id: Option<Option<Uuid>>,
    pub page_element_id: Option<Uuid>,
}

/// AuditFilter
///
/// Store-level audit query: every filter is optional, results come back newest
/// first together with the total number of matches.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub user_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub resource: Option<Resource>,
    pub offset: u32,
    pub limit: u32,
}

impl AuditFilter {
    pub fn matches(&self, log: &AuditLog) -> bool {
        self.start.is_none_or(|s| log.timestamp >= s)
            && self.end.is_none_or(|e| log.timestamp <= e)
            && self.user_id.is_none_or(|u| log.user_id == Some(u))
            && self.action.is_none_or(|a| log.action == a)
            && self.resource.is_none_or(|r| log.resource == r)
    }
}

/// Repository Trait
///
/// The Entity Store contract. `create` and `update` fail with `DuplicateKey` on a
/// uniqueness clash, `update` and `delete` fail with `NotFound` for unknown ids.
/// Deletes never check cascades; that is the orchestrators' job.
///
/// Listings are sorted ascending by `display_order` where the entity has one, with
/// ties broken by insertion order.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Users ---
    async fn create_user(&self, user: NewUser) -> RepoResult<UserRecord>;
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<UserRecord>>;
    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<UserRecord>>;
    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<UserRecord>>;
    async fn list_users(&self) -> RepoResult<Vec<UserRecord>>;
    async fn list_users_with_role(&self, role_id: Uuid) -> RepoResult<Vec<UserRecord>>;
    async fn count_users_with_role(&self, role_id: Uuid) -> RepoResult<u64>;
    async fn update_user(&self, id: Uuid, patch: UserPatch) -> RepoResult<UserRecord>;
    async fn delete_user(&self, id: Uuid) -> RepoResult<UserRecord>;

    // --- Roles ---
    async fn create_role(&self, role: NewRole) -> RepoResult<Role>;
    async fn get_role(&self, id: Uuid) -> RepoResult<Option<Role>>;
    async fn find_role_by_name(&self, name: &str) -> RepoResult<Option<Role>>;
    async fn list_roles(&self) -> RepoResult<Vec<Role>>;
    async fn update_role(&self, id: Uuid, patch: RolePatch) -> RepoResult<Role>;
    async fn delete_role(&self, id: Uuid) -> RepoResult<Role>;

    // --- Pages ---
    async fn create_page(&self, page: NewPage) -> RepoResult<Page>;
    async fn get_page(&self, id: Uuid) -> RepoResult<Option<Page>>;
    async fn find_page_by_name(&self, name: &str) -> RepoResult<Option<Page>>;
    async fn list_pages(&self) -> RepoResult<Vec<Page>>;
    async fn update_page(&self, id: Uuid, patch: PagePatch) -> RepoResult<Page>;
    async fn delete_page(&self, id: Uuid) -> RepoResult<Page>;

    // --- Page Elements ---
    async fn create_page_element(&self, element: NewPageElement) -> RepoResult<PageElement>;
    async fn get_page_element(&self, id: Uuid) -> RepoResult<Option<PageElement>>;
    async fn find_page_element_by_name(&self, name: &str) -> RepoResult<Option<PageElement>>;
    async fn list_page_elements(&self, page_id: Uuid) -> RepoResult<Vec<PageElement>>;
    async fn count_page_elements(&self, page_id: Uuid) -> RepoResult<u64>;
    async fn update_page_element(
        &self,
        id: Uuid,
        patch: PageElementPatch,
    ) -> RepoResult<PageElement>;
    async fn delete_page_element(&self, id: Uuid) -> RepoResult<PageElement>;

    // --- Menus ---
    async fn create_menu(&self, menu: NewMenu) -> RepoResult<Menu>;
    async fn get_menu(&self, id: Uuid) -> RepoResult<Option<Menu>>;
    async fn find_menu_by_name(&self, name: &str) -> RepoResult<Option<Menu>>;
    async fn find_menu_by_slug(&self, slug: &str) -> RepoResult<Option<Menu>>;
    async fn list_menus(&self) -> RepoResult<Vec<Menu>>;
    async fn count_child_menus(&self, parent_id: Uuid) -> RepoResult<u64>;
    async fn update_menu(&self, id: Uuid, patch: MenuPatch) -> RepoResult<Menu>;
    async fn delete_menu(&self, id: Uuid) -> RepoResult<Menu>;

    // --- Audit ---
    async fn append_audit_log(&self, entry: NewAuditLog) -> RepoResult<AuditLog>;
    async fn query_audit_logs(&self, filter: &AuditFilter) -> RepoResult<(Vec<AuditLog>, u64)>;

    // --- Security settings ---
    /// Returns the stored settings, or the defaults when none were saved yet.
    async fn get_security_settings(&self) -> RepoResult<SecuritySettings>;
    async fn save_security_settings(
        &self,
        settings: SecuritySettings,
    ) -> RepoResult<SecuritySettings>;
}

/// RepositoryState
///
/// The shared handle to the Entity Store held in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;

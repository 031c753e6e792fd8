use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::HashSet,
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AuditFilter, EntityKind, MenuPatch, NewMenu, NewPage, NewPageElement, NewRole, NewUser,
    PageElementPatch, PagePatch, RepoError, RepoResult, Repository, RolePatch, UserPatch,
};
use crate::models::{
    AuditLog, Menu, NewAuditLog, Page, PageElement, Role, SecuritySettings, UserRecord,
};

/// Tables
///
/// Each table is a `Vec` kept in insertion order; deletes remove in place, so the
/// relative order of the survivors is stable and serves as the listing tie-breaker.
#[derive(Default)]
struct Tables {
    users: Vec<UserRecord>,
    roles: Vec<Role>,
    pages: Vec<Page>,
    page_elements: Vec<PageElement>,
    menus: Vec<Menu>,
    audit_logs: Vec<AuditLog>,
    settings: Option<SecuritySettings>,
}

/// InMemoryRepository
///
/// Process-local Entity Store. Backs local runs without `DATABASE_URL` and every
/// test suite. Audit appends, and updates of chosen rows, can be made to fail on
/// demand so callers can verify how store failures propagate.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
    fail_audit_writes: AtomicBool,
    failing_rows: Mutex<HashSet<Uuid>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose audit appends always fail with a backend error.
    pub fn with_failing_audit() -> Self {
        let repo = Self::default();
        repo.set_fail_audit_writes(true);
        repo
    }

    pub fn set_fail_audit_writes(&self, fail: bool) {
        self.fail_audit_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes every later page or menu update of `id` fail with a backend error.
    pub fn fail_updates_of(&self, id: Uuid) {
        if let Ok(mut rows) = self.failing_rows.lock() {
            rows.insert(id);
        }
    }

    fn check_row_writable(&self, id: Uuid) -> RepoResult<()> {
        match self.failing_rows.lock() {
            Ok(rows) if rows.contains(&id) => {
                Err(RepoError::Backend(format!("row {} is locked", id)))
            }
            _ => Ok(()),
        }
    }
}

fn sorted_by_display_order<T: Clone>(rows: &[T], key: impl Fn(&T) -> i32) -> Vec<T> {
    let mut out = rows.to_vec();
    // stable: equal keys keep insertion order
    out.sort_by_key(|r| key(r));
    out
}

fn position<T>(rows: &[T], id: Uuid, key: impl Fn(&T) -> Uuid, kind: EntityKind) -> RepoResult<usize> {
    rows.iter()
        .position(|r| key(r) == id)
        .ok_or(RepoError::NotFound(kind))
}

#[async_trait]
impl Repository for InMemoryRepository {
    // --- Users ---

    async fn create_user(&self, user: NewUser) -> RepoResult<UserRecord> {
        let mut t = self.tables.write().await;
        if t.users.iter().any(|u| u.username == user.username) {
            return Err(RepoError::DuplicateKey("username".into()));
        }
        if t.users.iter().any(|u| u.email == user.email) {
            return Err(RepoError::DuplicateKey("email".into()));
        }
        let now = Utc::now();
        let record = UserRecord {
            id: Uuid::new_v4(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role_id: user.role_id,
            created_at: now,
            updated_at: now,
        };
        t.users.push(record.clone());
        Ok(record)
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<UserRecord>> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<UserRecord>> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<UserRecord>> {
        let t = self.tables.read().await;
        Ok(t.users.iter().find(|u| u.email == email).cloned())
    }

    async fn list_users(&self) -> RepoResult<Vec<UserRecord>> {
        Ok(self.tables.read().await.users.clone())
    }

    async fn list_users_with_role(&self, role_id: Uuid) -> RepoResult<Vec<UserRecord>> {
        let t = self.tables.read().await;
        Ok(t.users
            .iter()
            .filter(|u| u.role_id == Some(role_id))
            .cloned()
            .collect())
    }

    async fn count_users_with_role(&self, role_id: Uuid) -> RepoResult<u64> {
        let t = self.tables.read().await;
        Ok(t.users.iter().filter(|u| u.role_id == Some(role_id)).count() as u64)
    }

    async fn update_user(&self, id: Uuid, patch: UserPatch) -> RepoResult<UserRecord> {
        let mut t = self.tables.write().await;
        let idx = position(&t.users, id, |u| u.id, EntityKind::User)?;
        if let Some(username) = &patch.username {
            if t.users.iter().any(|u| u.id != id && &u.username == username) {
                return Err(RepoError::DuplicateKey("username".into()));
            }
        }
        if let Some(email) = &patch.email {
            if t.users.iter().any(|u| u.id != id && &u.email == email) {
                return Err(RepoError::DuplicateKey("email".into()));
            }
        }

        let user = &mut t.users[idx];
        if let Some(username) = patch.username {
            user.username = username;
        }
        if let Some(email) = patch.email {
            user.email = email;
        }
        if let Some(hash) = patch.password_hash {
            user.password_hash = hash;
        }
        if let Some(role_id) = patch.role_id {
            user.role_id = role_id;
        }
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<UserRecord> {
        let mut t = self.tables.write().await;
        let idx = position(&t.users, id, |u| u.id, EntityKind::User)?;
        Ok(t.users.remove(idx))
    }

    // --- Roles ---

    async fn create_role(&self, role: NewRole) -> RepoResult<Role> {
        let mut t = self.tables.write().await;
        if t.roles.iter().any(|r| r.name == role.name) {
            return Err(RepoError::DuplicateKey("name".into()));
        }
        let now = Utc::now();
        let record = Role {
            id: Uuid::new_v4(),
            name: role.name,
            description: role.description,
            permissions: role.permissions,
            created_at: now,
            updated_at: now,
        };
        t.roles.push(record.clone());
        Ok(record)
    }

    async fn get_role(&self, id: Uuid) -> RepoResult<Option<Role>> {
        let t = self.tables.read().await;
        Ok(t.roles.iter().find(|r| r.id == id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> RepoResult<Option<Role>> {
        let t = self.tables.read().await;
        Ok(t.roles.iter().find(|r| r.name == name).cloned())
    }

    async fn list_roles(&self) -> RepoResult<Vec<Role>> {
        Ok(self.tables.read().await.roles.clone())
    }

    async fn update_role(&self, id: Uuid, patch: RolePatch) -> RepoResult<Role> {
        let mut t = self.tables.write().await;
        let idx = position(&t.roles, id, |r| r.id, EntityKind::Role)?;
        if let Some(name) = &patch.name {
            if t.roles.iter().any(|r| r.id != id && &r.name == name) {
                return Err(RepoError::DuplicateKey("name".into()));
            }
        }

        let role = &mut t.roles[idx];
        if let Some(name) = patch.name {
            role.name = name;
        }
        if let Some(description) = patch.description {
            role.description = Some(description);
        }
        if let Some(permissions) = patch.permissions {
            role.permissions = permissions;
        }
        role.updated_at = Utc::now();
        Ok(role.clone())
    }

    async fn delete_role(&self, id: Uuid) -> RepoResult<Role> {
        let mut t = self.tables.write().await;
        let idx = position(&t.roles, id, |r| r.id, EntityKind::Role)?;
        Ok(t.roles.remove(idx))
    }

    // --- Pages ---

    async fn create_page(&self, page: NewPage) -> RepoResult<Page> {
        let mut t = self.tables.write().await;
        if t.pages.iter().any(|p| p.name == page.name) {
            return Err(RepoError::DuplicateKey("name".into()));
        }
        let now = Utc::now();
        let record = Page {
            id: Uuid::new_v4(),
            name: page.name,
            description: page.description,
            display_order: page.display_order,
            created_at: now,
            updated_at: now,
        };
        t.pages.push(record.clone());
        Ok(record)
    }

    async fn get_page(&self, id: Uuid) -> RepoResult<Option<Page>> {
        let t = self.tables.read().await;
        Ok(t.pages.iter().find(|p| p.id == id).cloned())
    }

    async fn find_page_by_name(&self, name: &str) -> RepoResult<Option<Page>> {
        let t = self.tables.read().await;
        Ok(t.pages.iter().find(|p| p.name == name).cloned())
    }

    async fn list_pages(&self) -> RepoResult<Vec<Page>> {
        let t = self.tables.read().await;
        Ok(sorted_by_display_order(&t.pages, |p| p.display_order))
    }

    async fn update_page(&self, id: Uuid, patch: PagePatch) -> RepoResult<Page> {
        self.check_row_writable(id)?;
        let mut t = self.tables.write().await;
        let idx = position(&t.pages, id, |p| p.id, EntityKind::Page)?;
        if let Some(name) = &patch.name {
            if t.pages.iter().any(|p| p.id != id && &p.name == name) {
                return Err(RepoError::DuplicateKey("name".into()));
            }
        }

        let page = &mut t.pages[idx];
        if let Some(name) = patch.name {
            page.name = name;
        }
        if let Some(description) = patch.description {
            page.description = Some(description);
        }
        if let Some(order) = patch.display_order {
            page.display_order = order;
        }
        page.updated_at = Utc::now();
        Ok(page.clone())
    }

    async fn delete_page(&self, id: Uuid) -> RepoResult<Page> {
        let mut t = self.tables.write().await;
        let idx = position(&t.pages, id, |p| p.id, EntityKind::Page)?;
        Ok(t.pages.remove(idx))
    }

    // --- Page Elements ---

    async fn create_page_element(&self, element: NewPageElement) -> RepoResult<PageElement> {
        let mut t = self.tables.write().await;
        if t.page_elements.iter().any(|e| e.name == element.name) {
            return Err(RepoError::DuplicateKey("name".into()));
        }
        let now = Utc::now();
        let record = PageElement {
            id: Uuid::new_v4(),
            name: element.name,
            description: element.description,
            is_root: element.is_root,
            display_order: element.display_order,
            page_id: element.page_id,
            created_at: now,
            updated_at: now,
        };
        t.page_elements.push(record.clone());
        Ok(record)
    }

    async fn get_page_element(&self, id: Uuid) -> RepoResult<Option<PageElement>> {
        let t = self.tables.read().await;
        Ok(t.page_elements.iter().find(|e| e.id == id).cloned())
    }

    async fn find_page_element_by_name(&self, name: &str) -> RepoResult<Option<PageElement>> {
        let t = self.tables.read().await;
        Ok(t.page_elements.iter().find(|e| e.name == name).cloned())
    }

    async fn list_page_elements(&self, page_id: Uuid) -> RepoResult<Vec<PageElement>> {
        let t = self.tables.read().await;
        let owned: Vec<PageElement> = t
            .page_elements
            .iter()
            .filter(|e| e.page_id == page_id)
            .cloned()
            .collect();
        Ok(sorted_by_display_order(&owned, |e| e.display_order))
    }

    async fn count_page_elements(&self, page_id: Uuid) -> RepoResult<u64> {
        let t = self.tables.read().await;
        Ok(t.page_elements.iter().filter(|e| e.page_id == page_id).count() as u64)
    }

    async fn update_page_element(
        &self,
        id: Uuid,
        patch: PageElementPatch,
    ) -> RepoResult<PageElement> {
        let mut t = self.tables.write().await;
        let idx = position(&t.page_elements, id, |e| e.id, EntityKind::PageElement)?;
        if let Some(name) = &patch.name {
            if t.page_elements.iter().any(|e| e.id != id && &e.name == name) {
                return Err(RepoError::DuplicateKey("name".into()));
            }
        }

        let element = &mut t.page_elements[idx];
        if let Some(name) = patch.name {
            element.name = name;
        }
        if let Some(description) = patch.description {
            element.description = description;
        }
        if let Some(is_root) = patch.is_root {
            element.is_root = is_root;
        }
        if let Some(order) = patch.display_order {
            element.display_order = order;
        }
        if let Some(page_id) = patch.page_id {
            element.page_id = page_id;
        }
        element.updated_at = Utc::now();
        Ok(element.clone())
    }

    async fn delete_page_element(&self, id: Uuid) -> RepoResult<PageElement> {
        let mut t = self.tables.write().await;
        let idx = position(&t.page_elements, id, |e| e.id, EntityKind::PageElement)?;
        Ok(t.page_elements.remove(idx))
    }

    // --- Menus ---

    async fn create_menu(&self, menu: NewMenu) -> RepoResult<Menu> {
        let mut t = self.tables.write().await;
        if t.menus.iter().any(|m| m.name == menu.name) {
            return Err(RepoError::DuplicateKey("name".into()));
        }
        let now = Utc::now();
        let record = Menu {
            id: Uuid::new_v4(),
            name: menu.name,
            label: menu.label,
            icon: menu.icon,
            slug: menu.slug,
            display_order: menu.display_order,
            parent_id: menu.parent_id,
            page_element_id: menu.page_element_id,
            created_at: now,
            updated_at: now,
        };
        t.menus.push(record.clone());
        Ok(record)
    }

    async fn get_menu(&self, id: Uuid) -> RepoResult<Option<Menu>> {
        let t = self.tables.read().await;
        Ok(t.menus.iter().find(|m| m.id == id).cloned())
    }

    async fn find_menu_by_name(&self, name: &str) -> RepoResult<Option<Menu>> {
        let t = self.tables.read().await;
        Ok(t.menus.iter().find(|m| m.name == name).cloned())
    }

    async fn find_menu_by_slug(&self, slug: &str) -> RepoResult<Option<Menu>> {
        let t = self.tables.read().await;
        Ok(t.menus.iter().find(|m| m.slug == slug).cloned())
    }

    async fn list_menus(&self) -> RepoResult<Vec<Menu>> {
        let t = self.tables.read().await;
        Ok(sorted_by_display_order(&t.menus, |m| m.display_order))
    }

    async fn count_child_menus(&self, parent_id: Uuid) -> RepoResult<u64> {
        let t = self.tables.read().await;
        Ok(t.menus
            .iter()
            .filter(|m| m.parent_id == Some(parent_id))
            .count() as u64)
    }

    async fn update_menu(&self, id: Uuid, patch: MenuPatch) -> RepoResult<Menu> {
        self.check_row_writable(id)?;
        let mut t = self.tables.write().await;
        let idx = position(&t.menus, id, |m| m.id, EntityKind::Menu)?;
        if let Some(name) = &patch.name {
            if t.menus.iter().any(|m| m.id != id && &m.name == name) {
                return Err(RepoError::DuplicateKey("name".into()));
            }
        }

        let menu = &mut t.menus[idx];
        if let Some(name) = patch.name {
            menu.name = name;
        }
        if let Some(label) = patch.label {
            menu.label = label;
        }
        if let Some(icon) = patch.icon {
            menu.icon = icon;
        }
        if let Some(slug) = patch.slug {
            menu.slug = slug;
        }
        if let Some(order) = patch.display_order {
            menu.display_order = order;
        }
        if let Some(parent_id) = patch.parent_id {
            menu.parent_id = parent_id;
        }
        if let Some(element_id) = patch.page_element_id {
            menu.page_element_id = element_id;
        }
        menu.updated_at = Utc::now();
        Ok(menu.clone())
    }

    async fn delete_menu(&self, id: Uuid) -> RepoResult<Menu> {
        let mut t = self.tables.write().await;
        let idx = position(&t.menus, id, |m| m.id, EntityKind::Menu)?;
        Ok(t.menus.remove(idx))
    }

    // --- Audit ---

    async fn append_audit_log(&self, entry: NewAuditLog) -> RepoResult<AuditLog> {
        if self.fail_audit_writes.load(Ordering::SeqCst) {
            return Err(RepoError::Backend("audit table is unavailable".into()));
        }
        let log = AuditLog {
            id: Uuid::new_v4(),
            user_id: entry.user_id,
            action: entry.action,
            resource: entry.resource,
            details: entry.details,
            timestamp: Utc::now(),
        };
        self.tables.write().await.audit_logs.push(log.clone());
        Ok(log)
    }

    async fn query_audit_logs(&self, filter: &AuditFilter) -> RepoResult<(Vec<AuditLog>, u64)> {
        let t = self.tables.read().await;
        let matching: Vec<&AuditLog> = t
            .audit_logs
            .iter()
            .rev()
            .filter(|log| filter.matches(log))
            .collect();
        let total = matching.len() as u64;
        let page = matching
            .into_iter()
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    // --- Security settings ---

    async fn get_security_settings(&self) -> RepoResult<SecuritySettings> {
        let t = self.tables.read().await;
        Ok(t.settings.clone().unwrap_or_default())
    }

    async fn save_security_settings(
        &self,
        settings: SecuritySettings,
    ) -> RepoResult<SecuritySettings> {
        self.tables.write().await.settings = Some(settings.clone());
        Ok(settings)
    }
}

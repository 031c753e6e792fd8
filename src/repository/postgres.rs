use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, query_builder::QueryBuilder, types::Json};
use uuid::Uuid;

use super::{
    AuditFilter, EntityKind, MenuPatch, NewMenu, NewPage, NewPageElement, NewRole, NewUser,
    PageElementPatch, PagePatch, RepoError, RepoResult, Repository, RolePatch, UserPatch,
};
use crate::{
    models::{
        AuditAction, AuditLog, Menu, NewAuditLog, Page, PageElement, Role, SecuritySettings,
        UserRecord,
    },
    permissions::{Permission, Resource},
};

const USER_COLUMNS: &str = "id, username, email, password_hash, role_id, created_at, updated_at";
const ROLE_COLUMNS: &str = "id, name, description, permissions, created_at, updated_at";
const PAGE_COLUMNS: &str = "id, name, description, display_order, created_at, updated_at";
const ELEMENT_COLUMNS: &str =
    "id, name, description, is_root, display_order, page_id, created_at, updated_at";
const MENU_COLUMNS: &str = "id, name, label, icon, slug, display_order, parent_id, \
     page_element_id, created_at, updated_at";
const AUDIT_COLUMNS: &str = "id, user_id, action, resource, details, occurred_at AS timestamp";

// --- Row types for columns that need decoding ---

#[derive(FromRow)]
struct RoleRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    permissions: Json<Vec<Permission>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RoleRow> for Role {
    fn from(row: RoleRow) -> Self {
        Role {
            id: row.id,
            name: row.name,
            description: row.description,
            permissions: row.permissions.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct AuditRow {
    id: Uuid,
    user_id: Option<Uuid>,
    action: String,
    resource: String,
    details: String,
    timestamp: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditLog {
    type Error = RepoError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        Ok(AuditLog {
            id: row.id,
            user_id: row.user_id,
            action: row.action.parse::<AuditAction>().map_err(RepoError::Backend)?,
            resource: row.resource.parse::<Resource>().map_err(RepoError::Backend)?,
            details: row.details,
            timestamp: row.timestamp,
        })
    }
}

#[derive(FromRow)]
struct SettingsRow {
    jwt_expiration: String,
    refresh_token_expiration: String,
    password_min_length: i32,
    updated_at: DateTime<Utc>,
}

/// Maps a driver error into a `RepoError`. Unique violations surface as
/// `DuplicateKey` with the offending column taken from the constraint name
/// (`<table>_<column>_key`). Foreign-key violations (`<table>_<column>_fkey`)
/// raised by a delete mean the row is still referenced; raised by a write they
/// mean the referenced row is gone.
fn db_err(context: &'static str, e: sqlx::Error) -> RepoError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            let field = db
                .constraint()
                .and_then(|c| constraint_column(c, "_key"))
                .unwrap_or_else(|| "name".to_string());
            return RepoError::DuplicateKey(field);
        }
        if db.is_foreign_key_violation() {
            let field = db
                .constraint()
                .and_then(|c| constraint_column(c, "_fkey"))
                .map(|column| column.trim_end_matches("_id").to_string())
                .unwrap_or_else(|| "reference".to_string());
            tracing::debug!(context, %field, "foreign key violation");
            return if context.starts_with("delete_") {
                RepoError::StillReferenced(field)
            } else {
                RepoError::MissingReference(field)
            };
        }
    }
    tracing::error!("{} error: {:?}", context, e);
    RepoError::Backend(e.to_string())
}

/// Column part of a `<table>_<column><suffix>` constraint name. Table names
/// here may contain underscores (`page_elements`), so known tables are
/// stripped first.
fn constraint_column(constraint: &str, suffix: &str) -> Option<String> {
    let stem = constraint.strip_suffix(suffix)?;
    for table in ["page_elements", "audit_logs", "users", "roles", "pages", "menus"] {
        if let Some(column) = stem.strip_prefix(table).and_then(|s| s.strip_prefix('_')) {
            return Some(column.to_string());
        }
    }
    stem.rsplit_once('_').map(|(_, column)| column.to_string())
}

/// PostgresRepository
///
/// The Entity Store backed by PostgreSQL. Every table carries a `seq BIGSERIAL`
/// column used as the ordering tie-breaker.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations in `./migrations`.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    // --- Users ---

    async fn create_user(&self, user: NewUser) -> RepoResult<UserRecord> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "INSERT INTO users (id, username, email, password_hash, role_id) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user.username)
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.role_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("create_user", e))
    }

    async fn get_user(&self, id: Uuid) -> RepoResult<Option<UserRecord>> {
        sqlx::query_as::<_, UserRecord>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("get_user", e))
    }

    async fn find_user_by_username(&self, username: &str) -> RepoResult<Option<UserRecord>> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("find_user_by_username", e))
    }

    async fn find_user_by_email(&self, email: &str) -> RepoResult<Option<UserRecord>> {
        sqlx::query_as::<_, UserRecord>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("find_user_by_email", e))
    }

    async fn list_users(&self) -> RepoResult<Vec<UserRecord>> {
        sqlx::query_as::<_, UserRecord>(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY seq"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err("list_users", e))
    }

    async fn list_users_with_role(&self, role_id: Uuid) -> RepoResult<Vec<UserRecord>> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE role_id = $1 ORDER BY seq"
        ))
        .bind(role_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("list_users_with_role", e))
    }

    async fn count_users_with_role(&self, role_id: Uuid) -> RepoResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role_id = $1")
            .bind(role_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_err("count_users_with_role", e))?;
        Ok(count as u64)
    }

    /// Partial update via COALESCE. `role_id` uses an explicit "set" flag so the
    /// column can be cleared.
    async fn update_user(&self, id: Uuid, patch: UserPatch) -> RepoResult<UserRecord> {
        let (set_role, role_id) = match patch.role_id {
            Some(role_id) => (true, role_id),
            None => (false, None),
        };
        sqlx::query_as::<_, UserRecord>(&format!(
            "UPDATE users SET \
                username = COALESCE($2, username), \
                email = COALESCE($3, email), \
                password_hash = COALESCE($4, password_hash), \
                role_id = CASE WHEN $5 THEN $6 ELSE role_id END, \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(patch.username)
        .bind(patch.email)
        .bind(patch.password_hash)
        .bind(set_role)
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("update_user", e))?
        .ok_or(RepoError::NotFound(EntityKind::User))
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<UserRecord> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "DELETE FROM users WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("delete_user", e))?
        .ok_or(RepoError::NotFound(EntityKind::User))
    }

    // --- Roles ---

    async fn create_role(&self, role: NewRole) -> RepoResult<Role> {
        sqlx::query_as::<_, RoleRow>(&format!(
            "INSERT INTO roles (id, name, description, permissions) \
             VALUES ($1, $2, $3, $4) RETURNING {ROLE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(role.name)
        .bind(role.description)
        .bind(Json(role.permissions))
        .fetch_one(&self.pool)
        .await
        .map(Role::from)
        .map_err(|e| db_err("create_role", e))
    }

    async fn get_role(&self, id: Uuid) -> RepoResult<Option<Role>> {
        sqlx::query_as::<_, RoleRow>(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.map(Role::from))
            .map_err(|e| db_err("get_role", e))
    }

    async fn find_role_by_name(&self, name: &str) -> RepoResult<Option<Role>> {
        sqlx::query_as::<_, RoleRow>(&format!("SELECT {ROLE_COLUMNS} FROM roles WHERE name = $1"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.map(Role::from))
            .map_err(|e| db_err("find_role_by_name", e))
    }

    async fn list_roles(&self) -> RepoResult<Vec<Role>> {
        sqlx::query_as::<_, RoleRow>(&format!("SELECT {ROLE_COLUMNS} FROM roles ORDER BY seq"))
            .fetch_all(&self.pool)
            .await
            .map(|rows| rows.into_iter().map(Role::from).collect())
            .map_err(|e| db_err("list_roles", e))
    }

    async fn update_role(&self, id: Uuid, patch: RolePatch) -> RepoResult<Role> {
        sqlx::query_as::<_, RoleRow>(&format!(
            "UPDATE roles SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description), \
                permissions = COALESCE($4, permissions), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {ROLE_COLUMNS}"
        ))
        .bind(id)
        .bind(patch.name)
        .bind(patch.description)
        .bind(patch.permissions.map(Json))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("update_role", e))?
        .map(Role::from)
        .ok_or(RepoError::NotFound(EntityKind::Role))
    }

    async fn delete_role(&self, id: Uuid) -> RepoResult<Role> {
        sqlx::query_as::<_, RoleRow>(&format!(
            "DELETE FROM roles WHERE id = $1 RETURNING {ROLE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("delete_role", e))?
        .map(Role::from)
        .ok_or(RepoError::NotFound(EntityKind::Role))
    }

    // --- Pages ---

    async fn create_page(&self, page: NewPage) -> RepoResult<Page> {
        sqlx::query_as::<_, Page>(&format!(
            "INSERT INTO pages (id, name, description, display_order) \
             VALUES ($1, $2, $3, $4) RETURNING {PAGE_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(page.name)
        .bind(page.description)
        .bind(page.display_order)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("create_page", e))
    }

    async fn get_page(&self, id: Uuid) -> RepoResult<Option<Page>> {
        sqlx::query_as::<_, Page>(&format!("SELECT {PAGE_COLUMNS} FROM pages WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("get_page", e))
    }

    async fn find_page_by_name(&self, name: &str) -> RepoResult<Option<Page>> {
        sqlx::query_as::<_, Page>(&format!("SELECT {PAGE_COLUMNS} FROM pages WHERE name = $1"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("find_page_by_name", e))
    }

    async fn list_pages(&self) -> RepoResult<Vec<Page>> {
        sqlx::query_as::<_, Page>(&format!(
            "SELECT {PAGE_COLUMNS} FROM pages ORDER BY display_order, seq"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("list_pages", e))
    }

    async fn update_page(&self, id: Uuid, patch: PagePatch) -> RepoResult<Page> {
        sqlx::query_as::<_, Page>(&format!(
            "UPDATE pages SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description), \
                display_order = COALESCE($4, display_order), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {PAGE_COLUMNS}"
        ))
        .bind(id)
        .bind(patch.name)
        .bind(patch.description)
        .bind(patch.display_order)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("update_page", e))?
        .ok_or(RepoError::NotFound(EntityKind::Page))
    }

    async fn delete_page(&self, id: Uuid) -> RepoResult<Page> {
        sqlx::query_as::<_, Page>(&format!(
            "DELETE FROM pages WHERE id = $1 RETURNING {PAGE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("delete_page", e))?
        .ok_or(RepoError::NotFound(EntityKind::Page))
    }

    // --- Page Elements ---

    async fn create_page_element(&self, element: NewPageElement) -> RepoResult<PageElement> {
        sqlx::query_as::<_, PageElement>(&format!(
            "INSERT INTO page_elements (id, name, description, is_root, display_order, page_id) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {ELEMENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(element.name)
        .bind(element.description)
        .bind(element.is_root)
        .bind(element.display_order)
        .bind(element.page_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("create_page_element", e))
    }

    async fn get_page_element(&self, id: Uuid) -> RepoResult<Option<PageElement>> {
        sqlx::query_as::<_, PageElement>(&format!(
            "SELECT {ELEMENT_COLUMNS} FROM page_elements WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("get_page_element", e))
    }

    async fn find_page_element_by_name(&self, name: &str) -> RepoResult<Option<PageElement>> {
        sqlx::query_as::<_, PageElement>(&format!(
            "SELECT {ELEMENT_COLUMNS} FROM page_elements WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("find_page_element_by_name", e))
    }

    async fn list_page_elements(&self, page_id: Uuid) -> RepoResult<Vec<PageElement>> {
        sqlx::query_as::<_, PageElement>(&format!(
            "SELECT {ELEMENT_COLUMNS} FROM page_elements WHERE page_id = $1 \
             ORDER BY display_order, seq"
        ))
        .bind(page_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("list_page_elements", e))
    }

    async fn count_page_elements(&self, page_id: Uuid) -> RepoResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM page_elements WHERE page_id = $1")
            .bind(page_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_err("count_page_elements", e))?;
        Ok(count as u64)
    }

    async fn update_page_element(
        &self,
        id: Uuid,
        patch: PageElementPatch,
    ) -> RepoResult<PageElement> {
        sqlx::query_as::<_, PageElement>(&format!(
            "UPDATE page_elements SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description), \
                is_root = COALESCE($4, is_root), \
                display_order = COALESCE($5, display_order), \
                page_id = COALESCE($6, page_id), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {ELEMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(patch.name)
        .bind(patch.description)
        .bind(patch.is_root)
        .bind(patch.display_order)
        .bind(patch.page_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("update_page_element", e))?
        .ok_or(RepoError::NotFound(EntityKind::PageElement))
    }

    async fn delete_page_element(&self, id: Uuid) -> RepoResult<PageElement> {
        sqlx::query_as::<_, PageElement>(&format!(
            "DELETE FROM page_elements WHERE id = $1 RETURNING {ELEMENT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("delete_page_element", e))?
        .ok_or(RepoError::NotFound(EntityKind::PageElement))
    }

    // --- Menus ---

    async fn create_menu(&self, menu: NewMenu) -> RepoResult<Menu> {
        sqlx::query_as::<_, Menu>(&format!(
            "INSERT INTO menus (id, name, label, icon, slug, display_order, parent_id, page_element_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {MENU_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(menu.name)
        .bind(menu.label)
        .bind(menu.icon)
        .bind(menu.slug)
        .bind(menu.display_order)
        .bind(menu.parent_id)
        .bind(menu.page_element_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("create_menu", e))
    }

    async fn get_menu(&self, id: Uuid) -> RepoResult<Option<Menu>> {
        sqlx::query_as::<_, Menu>(&format!("SELECT {MENU_COLUMNS} FROM menus WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("get_menu", e))
    }

    async fn find_menu_by_name(&self, name: &str) -> RepoResult<Option<Menu>> {
        sqlx::query_as::<_, Menu>(&format!("SELECT {MENU_COLUMNS} FROM menus WHERE name = $1"))
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("find_menu_by_name", e))
    }

    async fn find_menu_by_slug(&self, slug: &str) -> RepoResult<Option<Menu>> {
        sqlx::query_as::<_, Menu>(&format!(
            "SELECT {MENU_COLUMNS} FROM menus WHERE slug = $1 ORDER BY seq LIMIT 1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("find_menu_by_slug", e))
    }

    async fn list_menus(&self) -> RepoResult<Vec<Menu>> {
        sqlx::query_as::<_, Menu>(&format!(
            "SELECT {MENU_COLUMNS} FROM menus ORDER BY display_order, seq"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("list_menus", e))
    }

    async fn count_child_menus(&self, parent_id: Uuid) -> RepoResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM menus WHERE parent_id = $1")
            .bind(parent_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_err("count_child_menus", e))?;
        Ok(count as u64)
    }

    async fn update_menu(&self, id: Uuid, patch: MenuPatch) -> RepoResult<Menu> {
        let (set_parent, parent_id) = match patch.parent_id {
            Some(parent_id) => (true, parent_id),
            None => (false, None),
        };
        sqlx::query_as::<_, Menu>(&format!(
            "UPDATE menus SET \
                name = COALESCE($2, name), \
                label = COALESCE($3, label), \
                icon = COALESCE($4, icon), \
                slug = COALESCE($5, slug), \
                display_order = COALESCE($6, display_order), \
                parent_id = CASE WHEN $7 THEN $8 ELSE parent_id END, \
                page_element_id = COALESCE($9, page_element_id), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {MENU_COLUMNS}"
        ))
        .bind(id)
        .bind(patch.name)
        .bind(patch.label)
        .bind(patch.icon)
        .bind(patch.slug)
        .bind(patch.display_order)
        .bind(set_parent)
        .bind(parent_id)
        .bind(patch.page_element_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("update_menu", e))?
        .ok_or(RepoError::NotFound(EntityKind::Menu))
    }

    async fn delete_menu(&self, id: Uuid) -> RepoResult<Menu> {
        sqlx::query_as::<_, Menu>(&format!(
            "DELETE FROM menus WHERE id = $1 RETURNING {MENU_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("delete_menu", e))?
        .ok_or(RepoError::NotFound(EntityKind::Menu))
    }

    // --- Audit ---

    async fn append_audit_log(&self, entry: NewAuditLog) -> RepoResult<AuditLog> {
        let row = sqlx::query_as::<_, AuditRow>(&format!(
            "INSERT INTO audit_logs (id, user_id, action, resource, details) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {AUDIT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(entry.user_id)
        .bind(entry.action.as_str())
        .bind(entry.resource.as_str())
        .bind(entry.details)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("append_audit_log", e))?;
        AuditLog::try_from(row)
    }

    /// query_audit_logs
    ///
    /// Builds the WHERE clause once with `QueryBuilder` and reuses it for both the
    /// page query and the total count.
    async fn query_audit_logs(&self, filter: &AuditFilter) -> RepoResult<(Vec<AuditLog>, u64)> {
        fn push_filters(builder: &mut QueryBuilder<'_, sqlx::Postgres>, filter: &AuditFilter) {
            builder.push(" WHERE TRUE");
            if let Some(start) = filter.start {
                builder.push(" AND occurred_at >= ");
                builder.push_bind(start);
            }
            if let Some(end) = filter.end {
                builder.push(" AND occurred_at <= ");
                builder.push_bind(end);
            }
            if let Some(user_id) = filter.user_id {
                builder.push(" AND user_id = ");
                builder.push_bind(user_id);
            }
            if let Some(action) = filter.action {
                builder.push(" AND action = ");
                builder.push_bind(action.as_str());
            }
            if let Some(resource) = filter.resource {
                builder.push(" AND resource = ");
                builder.push_bind(resource.as_str());
            }
        }

        let mut count_query: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM audit_logs");
        push_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_err("query_audit_logs", e))?;

        let mut page_query: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new(format!("SELECT {AUDIT_COLUMNS} FROM audit_logs"));
        push_filters(&mut page_query, filter);
        page_query.push(" ORDER BY occurred_at DESC, seq DESC LIMIT ");
        page_query.push_bind(i64::from(filter.limit));
        page_query.push(" OFFSET ");
        page_query.push_bind(i64::from(filter.offset));

        let rows = page_query
            .build_query_as::<AuditRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err("query_audit_logs", e))?;

        let logs = rows
            .into_iter()
            .map(AuditLog::try_from)
            .collect::<RepoResult<Vec<_>>>()?;
        Ok((logs, total as u64))
    }

    // --- Security settings ---

    async fn get_security_settings(&self) -> RepoResult<SecuritySettings> {
        let row = sqlx::query_as::<_, SettingsRow>(
            "SELECT jwt_expiration, refresh_token_expiration, password_min_length, updated_at \
             FROM security_settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("get_security_settings", e))?;

        Ok(row
            .map(|r| SecuritySettings {
                jwt_expiration: r.jwt_expiration,
                refresh_token_expiration: r.refresh_token_expiration,
                password_min_length: r.password_min_length.max(0) as u32,
                updated_at: r.updated_at,
            })
            .unwrap_or_default())
    }

    async fn save_security_settings(
        &self,
        settings: SecuritySettings,
    ) -> RepoResult<SecuritySettings> {
        sqlx::query(
            "INSERT INTO security_settings \
                (id, jwt_expiration, refresh_token_expiration, password_min_length, updated_at) \
             VALUES (1, $1, $2, $3, $4) \
             ON CONFLICT (id) DO UPDATE SET \
                jwt_expiration = EXCLUDED.jwt_expiration, \
                refresh_token_expiration = EXCLUDED.refresh_token_expiration, \
                password_min_length = EXCLUDED.password_min_length, \
                updated_at = EXCLUDED.updated_at",
        )
        .bind(&settings.jwt_expiration)
        .bind(&settings.refresh_token_expiration)
        .bind(settings.password_min_length as i32)
        .bind(settings.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("save_security_settings", e))?;
        Ok(settings)
    }
}

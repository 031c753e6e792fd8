use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::permissions::{self, Action, Permission, Resource};

// --- Users ---

/// UserRecord
///
/// The stored user row. Carries the password hash, so it is deliberately not
/// `Serialize`; everything leaving the API goes through `UserResponse`.
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// RoleSummary
///
/// The `{ id, name }` projection of a role embedded in user responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RoleSummary {
    pub id: Uuid,
    pub name: String,
}

/// UserResponse
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Option<RoleSummary>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl UserResponse {
    pub fn new(user: UserRecord, role: Option<&Role>) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: role.map(|r| RoleSummary {
                id: r.id,
                name: r.name.clone(),
            }),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// CreateUserRequest
///
/// Input payload for `POST /users`. The password floor here is the absolute minimum;
/// the configured `passwordMinLength` security setting is checked on top of it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 30, message = "Username must be between 3 and 30 characters"))]
    pub username: String,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    pub role: Option<Uuid>,
}

/// UpdateUserRequest
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct UpdateUserRequest {
    #[validate(length(min = 3, max = 30, message = "Username must be between 3 and 30 characters"))]
    pub username: Option<String>,
    #[validate(email(message = "Please provide a valid email"))]
    pub email: Option<String>,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: Option<String>,
    pub role: Option<Uuid>,
}

// --- Roles ---

/// Role
///
/// A named bundle of permissions. A role named "admin" (any casing) is the
/// administrator role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub permissions: Vec<Permission>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl Role {
    pub fn has_action(&self, resource: Resource, action: Action) -> bool {
        permissions::has_action(&self.permissions, resource, action)
    }

    pub fn is_admin_role(&self) -> bool {
        self.name.eq_ignore_ascii_case("admin")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 50, message = "Role name must be between 1 and 50 characters"))]
    pub name: String,
    #[validate(length(max = 200, message = "Description cannot exceed 200 characters"))]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct UpdateRoleRequest {
    #[validate(length(min = 1, max = 50, message = "Role name must be between 1 and 50 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 200, message = "Description cannot exceed 200 characters"))]
    pub description: Option<String>,
    pub permissions: Option<Vec<Permission>>,
}

/// UpdatePermissionsRequest
///
/// Input payload for `PUT /roles/{id}/permissions`; replaces the whole list.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdatePermissionsRequest {
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserIdsRequest {
    #[validate(length(min = 1, message = "At least one user id is required"))]
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RoleIdsRequest {
    #[validate(length(min = 1, message = "At least one role id is required"))]
    pub role_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BulkAssignRolesRequest {
    #[validate(length(min = 1, message = "At least one user id is required"))]
    pub user_ids: Vec<Uuid>,
    #[validate(length(min = 1, message = "At least one role id is required"))]
    pub role_ids: Vec<Uuid>,
}

/// BulkUpdateResponse
///
/// Count of records touched by a bulk role operation.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct BulkUpdateResponse {
    pub modified_count: u32,
    pub message: String,
}

// --- Pages & Page Elements ---

/// Page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Page {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub display_order: i32,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// PageElement
///
/// A building block owned by exactly one page. Serialized with the owning page id
/// under `page`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PageElement {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub is_root: bool,
    pub display_order: i32,
    #[serde(rename = "page")]
    pub page_id: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// PageResponse
///
/// A page with its elements attached, as returned by the page listing.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct PageResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub display_order: i32,
    pub page_elements: Vec<PageElement>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl PageResponse {
    pub fn new(page: Page, page_elements: Vec<PageElement>) -> Self {
        Self {
            id: page.id,
            name: page.name,
            description: page.description,
            display_order: page.display_order,
            page_elements,
            created_at: page.created_at,
            updated_at: page.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreatePageRequest {
    #[validate(length(min = 3, max = 50, message = "Name must be between 3 and 50 characters"))]
    pub name: String,
    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    pub description: Option<String>,
    #[validate(range(min = 0, message = "Display order must be a positive number"))]
    #[serde(default)]
    pub display_order: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdatePageRequest {
    #[validate(length(min = 3, max = 50, message = "Name must be between 3 and 50 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    pub description: Option<String>,
    #[validate(range(min = 0, message = "Display order must be a positive number"))]
    pub display_order: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreatePageElementRequest {
    #[validate(length(min = 3, max = 50, message = "Name must be between 3 and 50 characters"))]
    pub name: String,
    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    #[serde(default)]
    pub description: String,
    pub is_root: Option<bool>,
    #[validate(range(min = 0, message = "Display order must be a positive number"))]
    #[serde(default)]
    pub display_order: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdatePageElementRequest {
    #[validate(length(min = 3, max = 50, message = "Name must be between 3 and 50 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 500, message = "Description cannot exceed 500 characters"))]
    pub description: Option<String>,
    pub is_root: Option<bool>,
    #[validate(range(min = 0, message = "Display order must be a positive number"))]
    pub display_order: Option<i32>,
    /// Moves the element to another page.
    pub page: Option<Uuid>,
}

/// ReorderRequest
///
/// The new display order, expressed as the ids in their desired sequence.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct ReorderRequest {
    #[validate(length(min = 1, message = "At least one id is required"))]
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ReorderResponse {
    pub updated: u32,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct BulkDeleteRequest {
    #[validate(length(min = 1, message = "At least one id is required"))]
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct BulkDeleteResponse {
    pub deleted: u32,
    pub message: String,
}

// --- Menus ---

/// Menu
///
/// The stored menu row with its relations as bare ids.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct Menu {
    pub id: Uuid,
    pub name: String,
    pub label: String,
    pub icon: String,
    pub slug: String,
    pub display_order: i32,
    pub parent_id: Option<Uuid>,
    pub page_element_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MenuSummary {
    pub id: Uuid,
    pub name: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct PageElementSummary {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

/// MenuResponse
///
/// A menu with `parent` resolved to `{ id, name, label }` and `pageElement` resolved
/// to `{ id, name, description }`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MenuResponse {
    pub id: Uuid,
    pub name: String,
    pub label: String,
    pub icon: String,
    pub slug: String,
    pub display_order: i32,
    pub parent: Option<MenuSummary>,
    pub page_element: Option<PageElementSummary>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl MenuResponse {
    pub fn new(menu: Menu, parent: Option<&Menu>, page_element: Option<&PageElement>) -> Self {
        Self {
            id: menu.id,
            name: menu.name,
            label: menu.label,
            icon: menu.icon,
            slug: menu.slug,
            display_order: menu.display_order,
            parent: parent.map(|p| MenuSummary {
                id: p.id,
                name: p.name.clone(),
                label: p.label.clone(),
            }),
            page_element: page_element.map(|e| PageElementSummary {
                id: e.id,
                name: e.name.clone(),
                description: e.description.clone(),
            }),
            created_at: menu.created_at,
            updated_at: menu.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateMenuRequest {
    #[validate(length(min = 1, max = 50, message = "Name must be between 1 and 50 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 100, message = "Label is required"))]
    pub label: String,
    #[validate(length(min = 1, message = "Icon is required"))]
    pub icon: String,
    #[validate(length(min = 1, max = 100, message = "Slug is required"))]
    pub slug: String,
    #[validate(range(min = 0, message = "Display order must be a positive number"))]
    #[serde(default)]
    pub display_order: i32,
    pub parent: Option<Uuid>,
    pub page_element: Uuid,
}

/// UpdateMenuRequest
///
/// Partial update. An absent `parent` leaves it alone, `"parent": null` detaches
/// the menu to the top level.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateMenuRequest {
    #[validate(length(min = 1, max = 50, message = "Name must be between 1 and 50 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Label is required"))]
    pub label: Option<String>,
    #[validate(length(min = 1, message = "Icon is required"))]
    pub icon: Option<String>,
    #[validate(length(min = 1, max = 100, message = "Slug is required"))]
    pub slug: Option<String>,
    #[validate(range(min = 0, message = "Display order must be a positive number"))]
    pub display_order: Option<i32>,
    #[serde(default, deserialize_with = "explicit_null")]
    #[schema(value_type = Option<Uuid>)]
    #[ts(type = "string | null")]
    pub parent: Option<Option<Uuid>>,
    pub page_element: Option<Uuid>,
}

/// Keeps a present `null` apart from a missing field: `None` when absent,
/// `Some(None)` for `null`.
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

// --- Audit ---

/// AuditAction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Reorder,
    AssignRoles,
    RemoveRoles,
    BulkAssignRoles,
    BulkDelete,
    UpdatePermissions,
}

impl AuditAction {
    pub const ALL: [AuditAction; 9] = [
        AuditAction::Create,
        AuditAction::Update,
        AuditAction::Delete,
        AuditAction::Reorder,
        AuditAction::AssignRoles,
        AuditAction::RemoveRoles,
        AuditAction::BulkAssignRoles,
        AuditAction::BulkDelete,
        AuditAction::UpdatePermissions,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Reorder => "reorder",
            AuditAction::AssignRoles => "assign_roles",
            AuditAction::RemoveRoles => "remove_roles",
            AuditAction::BulkAssignRoles => "bulk_assign_roles",
            AuditAction::BulkDelete => "bulk_delete",
            AuditAction::UpdatePermissions => "update_permissions",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown audit action `{}`", s))
    }
}

/// AuditLog
///
/// An append-only record of one mutation. `userId` is absent for system actions.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource: Resource,
    pub details: String,
    #[ts(type = "string")]
    pub timestamp: DateTime<Utc>,
}

/// NewAuditLog
///
/// An entry handed to the audit recorder; id and timestamp are assigned on append.
#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub user_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource: Resource,
    pub details: String,
}

/// AuditLogQuery
///
/// Query string accepted by `GET /security/logs`.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AuditLogQuery {
    /// 1-based page number (default 1).
    pub page: Option<u32>,
    /// Page size between 10 and 100 (default 10).
    pub limit: Option<u32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub user_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub resource: Option<Resource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AuditLogPage {
    pub logs: Vec<AuditLog>,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
    pub count: u32,
}

// --- Security settings ---

/// SecuritySettings
///
/// Singleton record. Expirations are duration strings such as "15m", "1h" or "7d".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SecuritySettings {
    pub jwt_expiration: String,
    pub refresh_token_expiration: String,
    pub password_min_length: u32,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            jwt_expiration: "1h".to_string(),
            refresh_token_expiration: "7d".to_string(),
            password_min_length: 6,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateSecuritySettingsRequest {
    pub jwt_expiration: Option<String>,
    pub refresh_token_expiration: Option<String>,
    #[validate(range(min = 6, max = 128, message = "Password minimum length must be between 6 and 128"))]
    pub password_min_length: Option<u32>,
}

/// parse_duration
///
/// Parses `<n><unit>` with unit one of `s`, `m`, `h`, `d`. Returns `None` for
/// anything else, including zero.
pub fn parse_duration(raw: &str) -> Option<chrono::Duration> {
    let raw = raw.trim();
    let unit = raw.chars().last()?;
    let amount: i64 = raw[..raw.len() - unit.len_utf8()].parse().ok()?;
    if amount <= 0 {
        return None;
    }
    match unit {
        's' => chrono::Duration::try_seconds(amount),
        'm' => chrono::Duration::try_minutes(amount),
        'h' => chrono::Duration::try_hours(amount),
        'd' => chrono::Duration::try_days(amount),
        _ => None,
    }
}

// --- Auth ---

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[ts(export)]
pub struct LoginRequest {
    #[validate(email(message = "Please provide a valid email"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LoginResponse {
    pub token: String,
    #[ts(type = "string")]
    pub expires_at: DateTime<Utc>,
    /// Exchanged at `POST /auth/refresh` for a new pair once `token` expires.
    pub refresh_token: String,
    #[ts(type = "string")]
    pub refresh_expires_at: DateTime<Utc>,
    pub user: UserResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// ChangePasswordRequest
///
/// `newPassword` must also meet the `passwordMinLength` security setting.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 6, message = "New password must be at least 6 characters"))]
    pub new_password: String,
}

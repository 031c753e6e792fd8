use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::error::{AppError, FieldError};

/// Resource
///
/// The closed set of things a role can be granted rights over. Anything outside this
/// set fails deserialization and never reaches the authorization gate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Resource {
    Users,
    Pages,
    Menus,
    Roles,
    Security,
}

impl Resource {
    pub const ALL: [Resource; 5] = [
        Resource::Users,
        Resource::Pages,
        Resource::Menus,
        Resource::Roles,
        Resource::Security,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Resource::Users => "users",
            Resource::Pages => "pages",
            Resource::Menus => "menus",
            Resource::Roles => "roles",
            Resource::Security => "security",
        }
    }

    /// Administrative resources are admin-only regardless of what a role's
    /// permission list says.
    pub fn is_administrative(self) -> bool {
        matches!(self, Resource::Users | Resource::Roles | Resource::Security)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Resource::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown resource `{}`", s))
    }
}

/// Action
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 4] = [Action::Create, Action::Read, Action::Update, Action::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown action `{}`", s))
    }
}

/// Permission
///
/// One grant entry inside a role: a resource plus the actions allowed on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Permission {
    pub resource: Resource,
    pub actions: Vec<Action>,
}

impl Permission {
    pub fn new(resource: Resource, actions: impl IntoIterator<Item = Action>) -> Self {
        Self {
            resource,
            actions: actions.into_iter().collect(),
        }
    }
}

/// has_action
///
/// True iff some entry for `resource` lists `action`. Literal lookup: no inheritance,
/// no wildcards, and `update` does not imply `read`.
pub fn has_action(permissions: &[Permission], resource: Resource, action: Action) -> bool {
    permissions
        .iter()
        .any(|p| p.resource == resource && p.actions.contains(&action))
}

/// Every action on every resource. Granted to the bootstrap admin role.
pub fn full_access() -> Vec<Permission> {
    Resource::ALL
        .into_iter()
        .map(|r| Permission::new(r, Action::ALL))
        .collect()
}

/// validate_permissions
///
/// Rejects a permission list that mentions the same resource twice.
pub fn validate_permissions(permissions: &[Permission]) -> Result<(), AppError> {
    let mut seen = HashSet::new();
    let errors: Vec<FieldError> = permissions
        .iter()
        .enumerate()
        .filter(|(_, p)| !seen.insert(p.resource))
        .map(|(i, p)| {
            FieldError::new(
                format!("permissions[{}].resource", i),
                format!("duplicate entry for resource `{}`", p.resource),
            )
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

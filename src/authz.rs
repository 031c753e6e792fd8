//! Authorization gate.
//!
//! Every protected handler states what it needs as a `Requirement` and asks the gate
//! before touching an orchestrator. `decide` is a pure policy check over an already
//! resolved `AuthUser`; `authorize`/`require` wrap it into an `AppError::Forbidden`.

use crate::{
    auth::AuthUser,
    error::AppError,
    permissions::{Action, Resource},
};

/// Requirement
///
/// What an operation needs from its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub resource: Resource,
    pub action: Action,
    pub admin_only: bool,
}

impl Requirement {
    /// The action must be granted by the caller's role. Administrative resources
    /// (users, roles, security) are admin-only as well.
    pub fn permission(resource: Resource, action: Action) -> Self {
        Self {
            resource,
            action,
            admin_only: resource.is_administrative(),
        }
    }

    /// Admin-only, and the admin role must also grant the action.
    pub fn admin(resource: Resource, action: Action) -> Self {
        Self {
            resource,
            action,
            admin_only: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    AdminRequired,
    MissingPermission { resource: Resource, action: Action },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

/// decide
///
/// The admin check runs first: a non-admin is denied an admin-only requirement even
/// when their permissions list the action.
pub fn decide(actor: &AuthUser, requirement: Requirement) -> Decision {
    if requirement.admin_only && !actor.is_admin() {
        return Decision::Deny(DenyReason::AdminRequired);
    }
    if !actor.has_action(requirement.resource, requirement.action) {
        return Decision::Deny(DenyReason::MissingPermission {
            resource: requirement.resource,
            action: requirement.action,
        });
    }
    Decision::Allow
}

pub fn require(actor: &AuthUser, requirement: Requirement) -> Result<(), AppError> {
    match decide(actor, requirement) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            tracing::warn!(
                user_id = %actor.id,
                resource = %requirement.resource,
                action = %requirement.action,
                ?reason,
                "authorization denied"
            );
            Err(AppError::Forbidden(match reason {
                DenyReason::AdminRequired => "Administrator access required".to_string(),
                DenyReason::MissingPermission { resource, action } => {
                    format!("Not allowed to {} {}", action, resource)
                }
            }))
        }
    }
}

/// authorize
///
/// Shorthand for `require(actor, Requirement::permission(resource, action))`.
pub fn authorize(actor: &AuthUser, resource: Resource, action: Action) -> Result<(), AppError> {
    require(actor, Requirement::permission(resource, action))
}

use uuid::Uuid;

use super::{into_result, trim_optional, trim_required, validate};
use crate::{
    audit::AuditRecorder,
    error::{AppError, AppResult},
    models::{AuditAction, CreateRoleRequest, Role, UpdateRoleRequest, UserResponse},
    permissions::{Permission, Resource, validate_permissions},
    repository::{NewRole, RepoError, RepositoryState, RolePatch, UserPatch},
};

/// RoleService
#[derive(Clone)]
pub struct RoleService {
    repo: RepositoryState,
    audit: AuditRecorder,
}

impl RoleService {
    pub fn new(repo: RepositoryState, audit: AuditRecorder) -> Self {
        Self { repo, audit }
    }

    async fn load(&self, id: Uuid) -> AppResult<Role> {
        self.repo
            .get_role(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Role not found".into()))
    }

    async fn check_unique_name(&self, name: &str, except: Option<Uuid>) -> AppResult<()> {
        match self.repo.find_role_by_name(name).await? {
            Some(existing) if Some(existing.id) != except => Err(AppError::Conflict(format!(
                "Role with name '{}' already exists",
                name
            ))),
            _ => Ok(()),
        }
    }

    pub async fn list(&self) -> AppResult<Vec<Role>> {
        Ok(self.repo.list_roles().await?)
    }

    pub async fn get(&self, id: Uuid) -> AppResult<Role> {
        self.load(id).await
    }

    pub async fn create(&self, actor: Option<Uuid>, mut input: CreateRoleRequest) -> AppResult<Role> {
        let mut errors = Vec::new();
        trim_required(&mut input.name, "name", &mut errors);
        into_result(errors)?;
        validate(&input)?;
        validate_permissions(&input.permissions)?;

        self.check_unique_name(&input.name, None).await?;

        let role = self
            .repo
            .create_role(NewRole {
                name: input.name,
                description: input.description,
                permissions: input.permissions,
            })
            .await?;

        self.audit.record(
            actor,
            AuditAction::Create,
            Resource::Roles,
            format!("Role {} was created", role.name),
        );
        Ok(role)
    }

    pub async fn update(
        &self,
        actor: Option<Uuid>,
        id: Uuid,
        mut input: UpdateRoleRequest,
    ) -> AppResult<Role> {
        let mut errors = Vec::new();
        trim_optional(&mut input.name, "name", &mut errors);
        into_result(errors)?;
        validate(&input)?;
        if let Some(permissions) = &input.permissions {
            validate_permissions(permissions)?;
        }

        self.load(id).await?;
        if let Some(name) = &input.name {
            self.check_unique_name(name, Some(id)).await?;
        }

        let role = self
            .repo
            .update_role(
                id,
                RolePatch {
                    name: input.name,
                    description: input.description,
                    permissions: input.permissions,
                },
            )
            .await?;

        self.audit.record(
            actor,
            AuditAction::Update,
            Resource::Roles,
            format!("Role {} was updated", role.name),
        );
        Ok(role)
    }

    /// delete
    ///
    /// Refused with `HasDependents` while any user still holds the role.
    pub async fn delete(&self, actor: Option<Uuid>, id: Uuid) -> AppResult<()> {
        let role = self.load(id).await?;
        let holders = self.repo.count_users_with_role(id).await?;
        if holders > 0 {
            return Err(AppError::HasDependents(format!(
                "Cannot delete role assigned to {} user(s). Reassign them first.",
                holders
            )));
        }

        self.repo.delete_role(id).await?;
        self.audit.record(
            actor,
            AuditAction::Delete,
            Resource::Roles,
            format!("Role {} was deleted", role.name),
        );
        Ok(())
    }

    pub async fn users_of(&self, id: Uuid) -> AppResult<Vec<UserResponse>> {
        let role = self.load(id).await?;
        Ok(self
            .repo
            .list_users_with_role(id)
            .await?
            .into_iter()
            .map(|u| UserResponse::new(u, Some(&role)))
            .collect())
    }

    /// Gives the role to each listed user. Unknown users are skipped.
    pub async fn assign_to_users(
        &self,
        actor: Option<Uuid>,
        id: Uuid,
        user_ids: &[Uuid],
    ) -> AppResult<u32> {
        let role = self.load(id).await?;

        let mut modified = 0;
        for user_id in user_ids {
            let patch = UserPatch {
                role_id: Some(Some(role.id)),
                ..Default::default()
            };
            match self.repo.update_user(*user_id, patch).await {
                Ok(_) => modified += 1,
                Err(RepoError::NotFound(_)) => {}
                Err(e) => tracing::error!(%user_id, "role assignment failed for user: {}", e),
            }
        }

        self.audit.record(
            actor,
            AuditAction::AssignRoles,
            Resource::Roles,
            format!("Role {} assigned to {} users", role.name, modified),
        );
        Ok(modified)
    }

    /// Clears the role from each listed user that currently holds it.
    pub async fn remove_from_users(
        &self,
        actor: Option<Uuid>,
        id: Uuid,
        user_ids: &[Uuid],
    ) -> AppResult<u32> {
        let role = self.load(id).await?;

        let mut modified = 0;
        for user_id in user_ids {
            let Some(user) = self.repo.get_user(*user_id).await? else {
                continue;
            };
            if user.role_id != Some(role.id) {
                continue;
            }
            let patch = UserPatch {
                role_id: Some(None),
                ..Default::default()
            };
            match self.repo.update_user(user.id, patch).await {
                Ok(_) => modified += 1,
                Err(RepoError::NotFound(_)) => {}
                Err(e) => tracing::error!(%user_id, "role removal failed for user: {}", e),
            }
        }

        self.audit.record(
            actor,
            AuditAction::RemoveRoles,
            Resource::Roles,
            format!("Role {} removed from {} users", role.name, modified),
        );
        Ok(modified)
    }

    pub async fn permissions_of(&self, id: Uuid) -> AppResult<Vec<Permission>> {
        Ok(self.load(id).await?.permissions)
    }

    pub async fn update_permissions(
        &self,
        actor: Option<Uuid>,
        id: Uuid,
        permissions: Vec<Permission>,
    ) -> AppResult<Role> {
        validate_permissions(&permissions)?;
        self.load(id).await?;

        let role = self
            .repo
            .update_role(
                id,
                RolePatch {
                    permissions: Some(permissions),
                    ..Default::default()
                },
            )
            .await?;

        self.audit.record(
            actor,
            AuditAction::UpdatePermissions,
            Resource::Roles,
            format!("Permissions of role {} were updated", role.name),
        );
        Ok(role)
    }
}

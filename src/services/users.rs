use std::collections::HashMap;
use uuid::Uuid;

use super::{into_result, trim_optional, trim_required, validate};
use crate::{
    audit::AuditRecorder,
    auth::hash_password,
    error::{AppError, AppResult, FieldError},
    models::{
        AuditAction, CreateUserRequest, Role, UpdateUserRequest, UserRecord, UserResponse,
    },
    permissions::Resource,
    repository::{NewUser, RepoError, RepositoryState, UserPatch},
};

const USER_EXISTS: &str = "User already exists with this email or username";

/// UserService
///
/// Orchestrates user accounts and their role assignment.
#[derive(Clone)]
pub struct UserService {
    repo: RepositoryState,
    audit: AuditRecorder,
}

impl UserService {
    pub fn new(repo: RepositoryState, audit: AuditRecorder) -> Self {
        Self { repo, audit }
    }

    async fn roles_by_id(&self) -> AppResult<HashMap<Uuid, Role>> {
        Ok(self
            .repo
            .list_roles()
            .await?
            .into_iter()
            .map(|r| (r.id, r))
            .collect())
    }

    async fn respond(&self, user: UserRecord) -> AppResult<UserResponse> {
        let role = match user.role_id {
            Some(role_id) => self.repo.get_role(role_id).await?,
            None => None,
        };
        Ok(UserResponse::new(user, role.as_ref()))
    }

    async fn load(&self, id: Uuid) -> AppResult<UserRecord> {
        self.repo
            .get_user(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".into()))
    }

    /// Checks the configured minimum on top of the static floor.
    async fn check_password(&self, password: &str, errors: &mut Vec<FieldError>) -> AppResult<()> {
        let min = self.repo.get_security_settings().await?.password_min_length as usize;
        if password.chars().count() < min {
            errors.push(FieldError::new(
                "password",
                format!("Password must be at least {} characters", min),
            ));
        }
        Ok(())
    }

    async fn check_role_exists(&self, role_id: Uuid, errors: &mut Vec<FieldError>) -> AppResult<()> {
        if self.repo.get_role(role_id).await?.is_none() {
            errors.push(FieldError::new("role", "Role not found"));
        }
        Ok(())
    }

    /// Fails with `Conflict` when another user already holds the username or email.
    async fn check_unique(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        except: Option<Uuid>,
    ) -> AppResult<()> {
        let clash = |found: Option<UserRecord>| found.is_some_and(|u| Some(u.id) != except);
        if let Some(username) = username {
            if clash(self.repo.find_user_by_username(username).await?) {
                return Err(AppError::Conflict(USER_EXISTS.into()));
            }
        }
        if let Some(email) = email {
            if clash(self.repo.find_user_by_email(email).await?) {
                return Err(AppError::Conflict(USER_EXISTS.into()));
            }
        }
        Ok(())
    }

    pub async fn list(&self) -> AppResult<Vec<UserResponse>> {
        let roles = self.roles_by_id().await?;
        Ok(self
            .repo
            .list_users()
            .await?
            .into_iter()
            .map(|u| {
                let role = u.role_id.and_then(|id| roles.get(&id));
                UserResponse::new(u, role)
            })
            .collect())
    }

    pub async fn get(&self, id: Uuid) -> AppResult<UserResponse> {
        let user = self.load(id).await?;
        self.respond(user).await
    }

    pub async fn create(
        &self,
        actor: Option<Uuid>,
        mut input: CreateUserRequest,
    ) -> AppResult<UserResponse> {
        let mut errors = Vec::new();
        trim_required(&mut input.username, "username", &mut errors);
        input.email = input.email.trim().to_lowercase();
        into_result(errors)?;
        validate(&input)?;

        let mut errors = Vec::new();
        self.check_password(&input.password, &mut errors).await?;
        if let Some(role_id) = input.role {
            self.check_role_exists(role_id, &mut errors).await?;
        }
        into_result(errors)?;

        self.check_unique(Some(&input.username), Some(&input.email), None)
            .await?;

        let user = self
            .repo
            .create_user(NewUser {
                username: input.username,
                email: input.email,
                password_hash: hash_password(&input.password)?,
                role_id: input.role,
            })
            .await
            .map_err(conflict_as_user_exists)?;

        tracing::info!(user_id = %user.id, "user created");
        self.audit.record(
            actor,
            AuditAction::Create,
            Resource::Users,
            format!("User {} was created", user.username),
        );
        self.respond(user).await
    }

    pub async fn update(
        &self,
        actor: Option<Uuid>,
        id: Uuid,
        mut input: UpdateUserRequest,
    ) -> AppResult<UserResponse> {
        let mut errors = Vec::new();
        trim_optional(&mut input.username, "username", &mut errors);
        if let Some(email) = input.email.as_mut() {
            *email = email.trim().to_lowercase();
        }
        into_result(errors)?;
        validate(&input)?;

        self.load(id).await?;

        let mut errors = Vec::new();
        if let Some(password) = &input.password {
            self.check_password(password, &mut errors).await?;
        }
        if let Some(role_id) = input.role {
            self.check_role_exists(role_id, &mut errors).await?;
        }
        into_result(errors)?;

        self.check_unique(input.username.as_deref(), input.email.as_deref(), Some(id))
            .await?;

        let password_hash = input.password.as_deref().map(hash_password).transpose()?;
        let user = self
            .repo
            .update_user(
                id,
                UserPatch {
                    username: input.username,
                    email: input.email,
                    password_hash,
                    role_id: input.role.map(Some),
                },
            )
            .await
            .map_err(conflict_as_user_exists)?;

        self.audit.record(
            actor,
            AuditAction::Update,
            Resource::Users,
            format!("User {} was updated", user.username),
        );
        self.respond(user).await
    }

    /// delete
    ///
    /// Deleting one's own account is refused before the store is touched.
    pub async fn delete(&self, actor: Option<Uuid>, id: Uuid) -> AppResult<()> {
        if actor == Some(id) {
            return Err(AppError::InvalidOperation(
                "Cannot delete your own account".into(),
            ));
        }
        let user = self.repo.delete_user(id).await?;

        tracing::info!(user_id = %user.id, "user deleted");
        self.audit.record(
            actor,
            AuditAction::Delete,
            Resource::Users,
            format!("User {} was deleted", user.username),
        );
        Ok(())
    }

    /// The roles held by a user: zero or one.
    pub async fn roles_of(&self, id: Uuid) -> AppResult<Vec<Role>> {
        let user = self.load(id).await?;
        Ok(match user.role_id {
            Some(role_id) => self.repo.get_role(role_id).await?.into_iter().collect(),
            None => Vec::new(),
        })
    }

    /// Every role id must exist; the first one becomes the user's role.
    async fn resolve_roles(&self, role_ids: &[Uuid]) -> AppResult<Role> {
        let mut found = Vec::with_capacity(role_ids.len());
        for role_id in role_ids {
            match self.repo.get_role(*role_id).await? {
                Some(role) => found.push(role),
                None => return Err(AppError::invalid("roleIds", "One or more roles not found")),
            }
        }
        found
            .into_iter()
            .next()
            .ok_or_else(|| AppError::invalid("roleIds", "At least one role id is required"))
    }

    pub async fn assign_roles(
        &self,
        actor: Option<Uuid>,
        id: Uuid,
        role_ids: &[Uuid],
    ) -> AppResult<UserResponse> {
        let user = self.load(id).await?;
        let role = self.resolve_roles(role_ids).await?;

        let updated = self
            .repo
            .update_user(
                user.id,
                UserPatch {
                    role_id: Some(Some(role.id)),
                    ..Default::default()
                },
            )
            .await?;

        self.audit.record(
            actor,
            AuditAction::AssignRoles,
            Resource::Users,
            format!("Role {} assigned to user {}", role.name, updated.username),
        );
        Ok(UserResponse::new(updated, Some(&role)))
    }

    /// Clears the user's role when it is among `role_ids`.
    pub async fn remove_roles(
        &self,
        actor: Option<Uuid>,
        id: Uuid,
        role_ids: &[Uuid],
    ) -> AppResult<UserResponse> {
        let user = self.load(id).await?;
        let holds_listed_role = user.role_id.is_some_and(|r| role_ids.contains(&r));
        if !holds_listed_role {
            return self.respond(user).await;
        }

        let updated = self
            .repo
            .update_user(
                user.id,
                UserPatch {
                    role_id: Some(None),
                    ..Default::default()
                },
            )
            .await?;

        self.audit.record(
            actor,
            AuditAction::RemoveRoles,
            Resource::Users,
            format!("Roles removed from user {}", updated.username),
        );
        Ok(UserResponse::new(updated, None))
    }

    /// bulk_assign_roles
    ///
    /// All roles must exist before anything is written. Users are then updated one by
    /// one; unknown users are skipped and a failure on one user does not undo the
    /// others. Returns the number of users updated.
    pub async fn bulk_assign_roles(
        &self,
        actor: Option<Uuid>,
        user_ids: &[Uuid],
        role_ids: &[Uuid],
    ) -> AppResult<u32> {
        let role = self.resolve_roles(role_ids).await?;

        let mut modified = 0;
        for user_id in user_ids {
            let patch = UserPatch {
                role_id: Some(Some(role.id)),
                ..Default::default()
            };
            match self.repo.update_user(*user_id, patch).await {
                Ok(_) => modified += 1,
                Err(RepoError::NotFound(_)) => {
                    tracing::debug!(%user_id, "bulk role assignment skipped unknown user");
                }
                Err(e) => {
                    tracing::error!(%user_id, "bulk role assignment failed for user: {}", e);
                }
            }
        }

        self.audit.record(
            actor,
            AuditAction::BulkAssignRoles,
            Resource::Users,
            format!("Role {} assigned to {} users", role.name, modified),
        );
        Ok(modified)
    }
}

/// A store-level uniqueness clash that slipped past the lookup (concurrent insert).
fn conflict_as_user_exists(e: RepoError) -> AppError {
    match e {
        RepoError::DuplicateKey(_) => AppError::Conflict(USER_EXISTS.into()),
        other => other.into(),
    }
}

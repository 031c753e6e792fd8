//! Startup seeding.

use crate::{
    auth::hash_password,
    config::AppConfig,
    error::AppResult,
    models::Role,
    permissions::full_access,
    repository::{NewRole, NewUser, RepositoryState},
};

pub const ADMIN_ROLE_NAME: &str = "Admin";
const ADMIN_USERNAME: &str = "admin";

/// ensure_admin
///
/// Makes sure an administrator role exists, granting every action on every resource,
/// and seeds an administrator account from `ADMIN_EMAIL` / `ADMIN_PASSWORD` when the
/// user table is still empty. Safe to run on every start.
pub async fn ensure_admin(repo: &RepositoryState, config: &AppConfig) -> AppResult<Role> {
    let role = match repo.find_role_by_name(ADMIN_ROLE_NAME).await? {
        Some(role) => role,
        None => {
            let role = repo
                .create_role(NewRole {
                    name: ADMIN_ROLE_NAME.to_string(),
                    description: Some("Full access to every resource".to_string()),
                    permissions: full_access(),
                })
                .await?;
            tracing::info!(role_id = %role.id, "Seeded administrator role");
            role
        }
    };

    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(role);
    };
    if !repo.list_users().await?.is_empty() {
        tracing::debug!("Users already present, skipping administrator seed");
        return Ok(role);
    }

    let user = repo
        .create_user(NewUser {
            username: ADMIN_USERNAME.to_string(),
            email: email.trim().to_lowercase(),
            password_hash: hash_password(password)?,
            role_id: Some(role.id),
        })
        .await?;
    tracing::info!(user_id = %user.id, email = %user.email, "Seeded administrator account");
    Ok(role)
}

use uuid::Uuid;

use crate::{
    audit::AuditRecorder,
    auth::{
        TokenKind, decode_token, hash_password, issue_refresh_token, issue_token, verify_password,
    },
    error::{AppError, AppResult},
    models::{
        AuditAction, ChangePasswordRequest, LoginRequest, LoginResponse, RefreshRequest,
        UserRecord, UserResponse, parse_duration,
    },
    permissions::Resource,
    repository::{RepositoryState, UserPatch},
};

use super::validate;

/// AuthService
///
/// Exchanges email and password for an access token and a refresh token. Their
/// lifetimes follow the `jwtExpiration` and `refreshTokenExpiration` security
/// settings. Tokens are stateless, so there is no server-side logout.
#[derive(Clone)]
pub struct AuthService {
    repo: RepositoryState,
    audit: AuditRecorder,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(repo: RepositoryState, audit: AuditRecorder, jwt_secret: String) -> Self {
        Self {
            repo,
            audit,
            jwt_secret,
        }
    }

    pub async fn login(&self, mut input: LoginRequest) -> AppResult<LoginResponse> {
        input.email = input.email.trim().to_lowercase();
        validate(&input)?;

        // Same answer for unknown email and wrong password.
        let invalid = || AppError::Unauthenticated;

        let user = self
            .repo
            .find_user_by_email(&input.email)
            .await?
            .ok_or_else(invalid)?;
        if !verify_password(&input.password, &user.password_hash) {
            tracing::info!(user_id = %user.id, "login rejected: bad password");
            return Err(invalid());
        }

        tracing::info!(user_id = %user.id, "login succeeded");
        self.issue_pair(user).await
    }

    /// refresh
    ///
    /// Trades a valid refresh token for a new token pair. Access tokens, expired
    /// tokens and tokens of deleted users are all refused with 401.
    pub async fn refresh(&self, input: RefreshRequest) -> AppResult<LoginResponse> {
        validate(&input)?;
        let claims = decode_token(&self.jwt_secret, &input.refresh_token)?;
        if claims.kind != TokenKind::Refresh {
            tracing::debug!(user_id = %claims.sub, "access token presented for refresh");
            return Err(AppError::Unauthenticated);
        }
        let user = self
            .repo
            .get_user(claims.sub)
            .await?
            .ok_or(AppError::Unauthenticated)?;
        self.issue_pair(user).await
    }

    /// The authenticated caller's own profile.
    pub async fn current_user(&self, user_id: Uuid) -> AppResult<UserResponse> {
        let user = self
            .repo
            .get_user(user_id)
            .await?
            .ok_or(AppError::Unauthenticated)?;
        self.respond(user).await
    }

    /// change_password
    ///
    /// The current password must match. The new one is held to the configured
    /// `passwordMinLength` on top of the static floor.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        input: ChangePasswordRequest,
    ) -> AppResult<()> {
        validate(&input)?;
        let user = self
            .repo
            .get_user(user_id)
            .await?
            .ok_or(AppError::Unauthenticated)?;
        if !verify_password(&input.current_password, &user.password_hash) {
            return Err(AppError::invalid(
                "currentPassword",
                "Current password is incorrect",
            ));
        }

        let min = self.repo.get_security_settings().await?.password_min_length as usize;
        if input.new_password.chars().count() < min {
            return Err(AppError::invalid(
                "newPassword",
                format!("New password must be at least {} characters", min),
            ));
        }

        let patch = UserPatch {
            password_hash: Some(hash_password(&input.new_password)?),
            ..Default::default()
        };
        self.repo.update_user(user.id, patch).await?;
        self.audit.record(
            Some(user.id),
            AuditAction::Update,
            Resource::Users,
            format!("User {} changed their password", user.username),
        );
        Ok(())
    }

    async fn issue_pair(&self, user: UserRecord) -> AppResult<LoginResponse> {
        let settings = self.repo.get_security_settings().await?;
        let ttl = lifetime(&settings.jwt_expiration, "jwtExpiration", chrono::Duration::hours(1));
        let refresh_ttl = lifetime(
            &settings.refresh_token_expiration,
            "refreshTokenExpiration",
            chrono::Duration::days(7),
        );
        let (token, expires_at) = issue_token(&self.jwt_secret, user.id, ttl)?;
        let (refresh_token, refresh_expires_at) =
            issue_refresh_token(&self.jwt_secret, user.id, refresh_ttl)?;

        Ok(LoginResponse {
            token,
            expires_at,
            refresh_token,
            refresh_expires_at,
            user: self.respond(user).await?,
        })
    }

    async fn respond(&self, user: UserRecord) -> AppResult<UserResponse> {
        let role = match user.role_id {
            Some(role_id) => self.repo.get_role(role_id).await?,
            None => None,
        };
        Ok(UserResponse::new(user, role.as_ref()))
    }
}

fn lifetime(value: &str, setting: &str, fallback: chrono::Duration) -> chrono::Duration {
    parse_duration(value).unwrap_or_else(|| {
        tracing::warn!(value, setting, "stored token lifetime is malformed, using the default");
        fallback
    })
}

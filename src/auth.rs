use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::AppError,
    models::Role,
    permissions::{Action, Resource},
    repository::RepositoryState,
};

/// What a token may be used for. Only access tokens authenticate requests; a
/// refresh token is only accepted by `POST /auth/refresh`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    #[default]
    Access,
    Refresh,
}

/// Claims
///
/// The payload of the bearer tokens issued by `POST /auth/login` and
/// `POST /auth/refresh`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's id.
    pub sub: Uuid,
    /// Expiration Time (exp), seconds since the epoch.
    pub exp: usize,
    /// Issued At (iat), seconds since the epoch.
    pub iat: usize,
    /// Tokens without a `kind` claim are access tokens.
    #[serde(default)]
    pub kind: TokenKind,
}

/// AuthUser
///
/// The resolved identity of an authenticated request: the user plus their role as
/// it is stored right now, so permission edits apply to the very next request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub username: String,
    pub role: Option<Role>,
}

impl AuthUser {
    /// True iff the user's role is named "admin" (case-insensitive).
    pub fn is_admin(&self) -> bool {
        self.role.as_ref().is_some_and(Role::is_admin_role)
    }

    pub fn has_action(&self, resource: Resource, action: Action) -> bool {
        self.role
            .as_ref()
            .is_some_and(|role| role.has_action(resource, action))
    }
}

/// resolve_user
///
/// Loads the user and their role. `Ok(None)` when the user no longer exists.
pub async fn resolve_user(repo: &RepositoryState, id: Uuid) -> Result<Option<AuthUser>, AppError> {
    let Some(user) = repo.get_user(id).await? else {
        return Ok(None);
    };
    let role = match user.role_id {
        Some(role_id) => repo.get_role(role_id).await?,
        None => None,
    };
    Ok(Some(AuthUser {
        id: user.id,
        username: user.username,
        role,
    }))
}

/// AuthUser Extractor Implementation
///
/// 1. Reuses an identity already resolved by `auth_middleware` for this request.
/// 2. Local bypass: in `Env::Local` an `x-user-id` header naming an existing user
///    authenticates as that user.
/// 3. Otherwise a `Bearer` access token is decoded and validated (signature and
///    expiry) and its subject is looked up, so deleted users lose access immediately.
///    Refresh tokens are refused here.
///
/// Rejection: `AppError::Unauthenticated` (401) on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        if config.env == Env::Local {
            let header_id = parts
                .headers
                .get("x-user-id")
                .and_then(|value| value.to_str().ok())
                .and_then(|raw| Uuid::parse_str(raw).ok());
            if let Some(user_id) = header_id {
                if let Some(user) = resolve_user(&repo, user_id).await? {
                    parts.extensions.insert(user.clone());
                    return Ok(user);
                }
            }
        }

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(AppError::Unauthenticated)?;

        let claims = decode_token(&config.jwt_secret, token)?;
        if claims.kind != TokenKind::Access {
            tracing::debug!(user_id = %claims.sub, "refresh token presented as bearer");
            return Err(AppError::Unauthenticated);
        }

        let user = resolve_user(&repo, claims.sub)
            .await?
            .ok_or(AppError::Unauthenticated)?;
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// Validates signature and expiry and returns the claims.
pub fn decode_token(secret: &str, token: &str) -> Result<Claims, AppError> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("rejected expired token"),
                other => tracing::debug!("rejected token: {:?}", other),
            }
            AppError::Unauthenticated
        })
}

/// issue_token
///
/// Signs an HS256 access token for `user_id` valid for `ttl`. Returns the token and
/// its expiry instant.
pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    ttl: chrono::Duration,
) -> Result<(String, DateTime<Utc>), AppError> {
    sign(secret, user_id, TokenKind::Access, ttl)
}

/// Signs a refresh token, accepted only by `POST /auth/refresh`.
pub fn issue_refresh_token(
    secret: &str,
    user_id: Uuid,
    ttl: chrono::Duration,
) -> Result<(String, DateTime<Utc>), AppError> {
    sign(secret, user_id, TokenKind::Refresh, ttl)
}

fn sign(
    secret: &str,
    user_id: Uuid,
    kind: TokenKind,
    ttl: chrono::Duration,
) -> Result<(String, DateTime<Utc>), AppError> {
    let now = Utc::now();
    let expires_at = now + ttl;
    let claims = Claims {
        sub: user_id,
        exp: expires_at.timestamp() as usize,
        iat: now.timestamp() as usize,
        kind,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Unexpected(format!("token signing failed: {}", e)))?;
    Ok((token, expires_at))
}

// --- Passwords ---

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Unexpected(format!("password hashing failed: {}", e)))
}

/// False for a wrong password and for an unparseable stored hash.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("stored password hash is malformed: {}", e);
            false
        }
    }
}

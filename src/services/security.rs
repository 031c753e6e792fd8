use chrono::Utc;
use uuid::Uuid;

use super::{into_result, validate};
use crate::{
    audit::AuditRecorder,
    error::{AppError, AppResult, FieldError},
    models::{
        AuditAction, AuditLogPage, AuditLogQuery, SecuritySettings, UpdateSecuritySettingsRequest,
        parse_duration,
    },
    permissions::Resource,
    repository::{AuditFilter, RepositoryState},
};

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// SecurityService
///
/// Security settings and the audit log browser.
#[derive(Clone)]
pub struct SecurityService {
    repo: RepositoryState,
    audit: AuditRecorder,
}

impl SecurityService {
    pub fn new(repo: RepositoryState, audit: AuditRecorder) -> Self {
        Self { repo, audit }
    }

    pub async fn settings(&self) -> AppResult<SecuritySettings> {
        Ok(self.repo.get_security_settings().await?)
    }

    pub async fn update_settings(
        &self,
        actor: Option<Uuid>,
        input: UpdateSecuritySettingsRequest,
    ) -> AppResult<SecuritySettings> {
        validate(&input)?;

        let mut errors = Vec::new();
        for (field, value) in [
            ("jwtExpiration", &input.jwt_expiration),
            ("refreshTokenExpiration", &input.refresh_token_expiration),
        ] {
            if let Some(raw) = value {
                if parse_duration(raw).is_none() {
                    errors.push(FieldError::new(
                        field,
                        "Expected a duration such as 15m, 1h or 7d",
                    ));
                }
            }
        }
        into_result(errors)?;

        let mut settings = self.repo.get_security_settings().await?;
        if let Some(jwt) = input.jwt_expiration {
            settings.jwt_expiration = jwt.trim().to_string();
        }
        if let Some(refresh) = input.refresh_token_expiration {
            settings.refresh_token_expiration = refresh.trim().to_string();
        }
        if let Some(min) = input.password_min_length {
            settings.password_min_length = min;
        }
        settings.updated_at = Utc::now();

        let saved = self.repo.save_security_settings(settings).await?;
        self.audit.record(
            actor,
            AuditAction::Update,
            Resource::Security,
            "Security settings were updated",
        );
        Ok(saved)
    }

    /// audit_logs
    ///
    /// One page of audit entries, newest first. `page` is 1-based; `limit` must lie
    /// within 10..=100.
    pub async fn audit_logs(&self, query: AuditLogQuery) -> AppResult<AuditLogPage> {
        let page = query.page.unwrap_or(1);
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);

        let mut errors = Vec::new();
        if page < 1 {
            errors.push(FieldError::new("page", "Page must be a positive integer"));
        }
        if !(DEFAULT_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&limit) {
            errors.push(FieldError::new(
                "limit",
                format!("Limit must be between {} and {}", DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE),
            ));
        }
        if let (Some(start), Some(end)) = (query.start_date, query.end_date) {
            if start > end {
                errors.push(FieldError::new("endDate", "End date must not precede start date"));
            }
        }
        into_result(errors)?;

        let filter = AuditFilter {
            start: query.start_date,
            end: query.end_date,
            user_id: query.user_id,
            action: query.action,
            resource: query.resource,
            offset: (page - 1).saturating_mul(limit),
            limit,
        };
        let (logs, total) = self.repo.query_audit_logs(&filter).await?;
        let count = u32::try_from(total)
            .map_err(|_| AppError::Unexpected("audit log count overflow".into()))?;

        Ok(AuditLogPage {
            logs,
            page,
            limit,
            total_pages: count.div_ceil(limit),
            count,
        })
    }
}

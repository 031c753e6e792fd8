//! CRUD orchestrators.
//!
//! Each service owns the business rules for one entity family: shape validation,
//! uniqueness checks, cascade guards, persistence, the audit entry and cache
//! invalidation. Handlers stay thin and only check authorization before calling in.

use validator::Validate;

use crate::error::{AppError, FieldError};

pub mod auth;
pub mod menus;
pub mod pages;
pub mod roles;
pub mod security;
pub mod users;

pub use auth::AuthService;
pub use menus::MenuService;
pub use pages::PageService;
pub use roles::RoleService;
pub use security::SecurityService;
pub use users::UserService;

/// Runs the derived `validator` rules.
pub(crate) fn validate<T: Validate>(input: &T) -> Result<(), AppError> {
    input.validate().map_err(AppError::from)
}

/// Trims a required text field in place, reporting it when nothing is left.
pub(crate) fn trim_required(value: &mut String, field: &str, errors: &mut Vec<FieldError>) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
    if value.is_empty() {
        errors.push(FieldError::new(field, format!("{} is required", field)));
    }
}

/// Same as `trim_required` for a field present only on partial updates.
pub(crate) fn trim_optional(value: &mut Option<String>, field: &str, errors: &mut Vec<FieldError>) {
    if let Some(inner) = value.as_mut() {
        trim_required(inner, field, errors);
    }
}

pub(crate) fn into_result(errors: Vec<FieldError>) -> Result<(), AppError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}

/// Slugs are lowercase ASCII words separated by `-` or `/`.
pub(crate) fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '/')
        && !slug.contains("--")
        && !slug.contains("//")
}

use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::repository::RepoError;

/// FieldError
///
/// A single offending input field reported alongside a 400 validation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// ErrorBody
///
/// The wire shape of every non-2xx response: `{ "message": ..., "errors": [...] }`.
/// `errors` is only present for validation failures.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

/// AppError
///
/// The client-visible failure taxonomy. Orchestrators translate store failures into
/// one of these variants; handlers return them directly via `IntoResponse`.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed or missing input (400).
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    /// Uniqueness violation (400).
    #[error("{0}")]
    Conflict(String),

    /// Cascade guard tripped (400).
    #[error("{0}")]
    HasDependents(String),

    /// Business rule violation such as self-deletion (400).
    #[error("{0}")]
    InvalidOperation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Authentication required")]
    Unauthenticated,

    /// Anything else. The detail is logged, the client sees a generic message.
    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Shorthand for a validation failure on a single field.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::Conflict(_)
            | AppError::HasDependents(_)
            | AppError::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The body that will be serialized for this error.
    pub fn body(&self) -> ErrorBody {
        match self {
            AppError::Validation(errors) => ErrorBody {
                message: self.to_string(),
                errors: errors.clone(),
            },
            AppError::Unexpected(_) => ErrorBody {
                message: "Internal server error".to_string(),
                errors: Vec::new(),
            },
            other => ErrorBody {
                message: other.to_string(),
                errors: Vec::new(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Unexpected(detail) = &self {
            tracing::error!(error = %detail, "unexpected failure while handling request");
        }
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<RepoError> for AppError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::DuplicateKey(field) => {
                AppError::Conflict(format!("A record with this {} already exists", field))
            }
            RepoError::NotFound(kind) => AppError::NotFound(format!("{} not found", kind)),
            RepoError::StillReferenced(_) => AppError::HasDependents(
                "Cannot delete a record that other records still depend on".into(),
            ),
            RepoError::MissingReference(field) => {
                AppError::invalid(field, "Referenced record not found")
            }
            RepoError::Backend(detail) => AppError::Unexpected(detail),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<FieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                let field = field.to_string();
                errs.iter().map(move |err| {
                    let message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed `{}` check", err.code));
                    FieldError::new(field.clone(), message)
                })
            })
            .collect();
        fields.sort_by(|a, b| a.field.cmp(&b.field));
        AppError::Validation(fields)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::invalid("body", rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::invalid("path", rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::invalid("query", rejection.body_text())
    }
}

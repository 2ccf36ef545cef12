//! API error handling.
//!
//! Operational errors carry a status, a code and a message. Unexpected
//! errors are logged and masked as a generic 500.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::domain::{InvitationError, MembershipError, ScheduleError, TagClash};
use crate::infrastructure::{RepositoryError, SecurityError};

// =============================================================================
// API Error
// =============================================================================

/// API error structure for JSON responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Optional field-level errors for validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

impl ApiError {
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Creates a validation error with field-level details.
    #[must_use]
    pub fn validation(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self {
            code: "VALIDATION_ERROR".to_string(),
            message: message.into(),
            details: Some(details),
        }
    }
}

/// Field-level error for validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// API Error Response
// =============================================================================

/// API error response containing status code and error details.
#[derive(Debug, Clone)]
pub struct ApiErrorResponse {
    pub status: StatusCode,
    pub error: ApiError,
}

/// Shorthand for handler results.
pub type ApiResult<T> = Result<T, ApiErrorResponse>;

impl ApiErrorResponse {
    #[must_use]
    pub const fn new(status: StatusCode, error: ApiError) -> Self {
        Self { status, error }
    }

    /// 400 for a request that breaks a business rule.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ApiError::new("BAD_REQUEST", message))
    }

    /// 400 for malformed input, with field-level details.
    #[must_use]
    pub fn validation_error(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ApiError::validation(message, details),
        )
    }

    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            ApiError::new("AUTHENTICATION_ERROR", message),
        )
    }

    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, ApiError::new("FORBIDDEN", message))
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ApiError::new("NOT_FOUND", message))
    }

    /// 409 for a duplicate or a resource already in the requested state.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, ApiError::new("CONFLICT", message))
    }

    /// 409 for a write that lost an optimistic concurrency race.
    #[must_use]
    pub fn version_conflict(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::CONFLICT,
            ApiError::new("VERSION_CONFLICT", message),
        )
    }

    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::new("INTERNAL_ERROR", message),
        )
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

impl From<RepositoryError> for ApiErrorResponse {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound(message) => Self::not_found(message),
            RepositoryError::VersionConflict { expected, found } => Self::version_conflict(format!(
                "The resource was modified concurrently (expected version {expected}, found {found})"
            )),
            RepositoryError::Conflict(message) => Self::conflict(message),
            RepositoryError::PreconditionFailed(message) => {
                tracing::debug!(%message, "Commit guard failed");
                Self::conflict("The resource changed while the request was processed")
            }
            RepositoryError::DatabaseError(_) | RepositoryError::SerializationError(_) => {
                tracing::error!(%error, "Internal error");
                Self::internal_error("An internal error occurred")
            }
        }
    }
}

impl From<SecurityError> for ApiErrorResponse {
    fn from(error: SecurityError) -> Self {
        tracing::error!(%error, "Internal error");
        Self::internal_error("An internal error occurred")
    }
}

impl From<MembershipError> for ApiErrorResponse {
    fn from(error: MembershipError) -> Self {
        match error {
            MembershipError::AlreadyMember
            | MembershipError::AlreadyLead
            | MembershipError::NotLead => Self::conflict(error.to_string()),
            MembershipError::NotMember
            | MembershipError::OwnerCannotLeave
            | MembershipError::OwnerRoleFixed => Self::bad_request(error.to_string()),
        }
    }
}

impl From<InvitationError> for ApiErrorResponse {
    fn from(error: InvitationError) -> Self {
        match error {
            InvitationError::AlreadyPending | InvitationError::AlreadyMember => {
                Self::conflict(error.to_string())
            }
            InvitationError::NotPending | InvitationError::InvalidResponse => {
                Self::bad_request(error.to_string())
            }
        }
    }
}

impl From<ScheduleError> for ApiErrorResponse {
    fn from(error: ScheduleError) -> Self {
        ValidationError::single("due_at", error.to_string()).into()
    }
}

impl From<TagClash> for ApiErrorResponse {
    fn from(clash: TagClash) -> Self {
        Self::conflict(clash.message())
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Accumulates field errors while checking a request body.
#[derive(Debug, Clone, Default)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    #[must_use]
    pub const fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    /// Creates a validation error with a single field error.
    #[must_use]
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![FieldError::new(field, message)])
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when nothing was recorded.
    ///
    /// # Errors
    ///
    /// Returns `self` when at least one field failed.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl From<ValidationError> for ApiErrorResponse {
    fn from(error: ValidationError) -> Self {
        Self::validation_error("Validation failed", error.errors)
    }
}

// =============================================================================
// Tests
// =============================================================================

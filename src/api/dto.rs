//! Shared request and response types.
//!
//! Resource-specific request bodies live next to their handlers; this module
//! holds what several resources share: the public user view, session
//! envelopes and the parsing helpers for ids, dates and text fields.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::error::{ApiErrorResponse, ApiResult, ValidationError};
use crate::domain::{Invitation, ProjectId, User, UserId};

// =============================================================================
// Responses
// =============================================================================

/// Public view of a user. Credentials never leave the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub profile_picture_url: Option<String>,
    pub is_active: bool,
    pub project_own_count: u64,
    pub project_in_count: u64,
    pub task_count: u64,
    pub favorite_projects: Vec<ProjectId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            profile_picture_url: user.profile_picture_url.clone(),
            is_active: user.is_active,
            project_own_count: user.project_own_count,
            project_in_count: user.project_in_count,
            task_count: user.task_count,
            favorite_projects: user.favorite_projects.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEnvelope {
    pub user: UserResponse,
}

/// A user together with a fresh session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub access_token: String,
}

/// A user who could be invited, with the invitation already on record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub invitation: Option<Invitation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: u64,
}

// =============================================================================
// Parsing Helpers
// =============================================================================

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`). Use with `#[serde(default, deserialize_with = "nullable")]`.
///
/// # Errors
///
/// Propagates the inner deserialization error.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Parses an RFC 3339 timestamp or a `YYYY-MM-DD` date (midnight UTC).
///
/// # Errors
///
/// Returns a field error naming `field` when neither format matches.
pub fn parse_date(field: &str, value: &str) -> Result<DateTime<Utc>, ValidationError> {
    let value = value.trim();
    if let Ok(instant) = DateTime::parse_from_rfc3339(value) {
        return Ok(instant.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| {
            ValidationError::single(field, format!("{field} must be an RFC 3339 date or YYYY-MM-DD"))
        })
}

/// Parses an optional date field of a request body.
///
/// # Errors
///
/// Returns a field error when the value is malformed.
pub fn parse_optional_date(
    field: &str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, ValidationError> {
    value.map(|value| parse_date(field, value)).transpose()
}

/// Parses an optional date, recording a field error when malformed.
pub fn date_field(
    errors: &mut ValidationError,
    field: &str,
    value: Option<&str>,
) -> Option<DateTime<Utc>> {
    parse_optional_date(field, value)
        .map_err(|error| errors.errors.extend(error.errors))
        .ok()
        .flatten()
}

/// Applies a date patch: an absent key keeps `current`, `null` clears it.
pub fn patch_date(
    errors: &mut ValidationError,
    field: &str,
    current: Option<DateTime<Utc>>,
    patch: Option<Option<&str>>,
) -> Option<DateTime<Utc>> {
    match patch {
        None => current,
        Some(value) => date_field(errors, field, value),
    }
}

/// Parses an id taken from the path or a body.
///
/// # Errors
///
/// Returns 400 when `value` is not a UUID.
pub fn parse_id<T: FromStr>(field: &str, value: &str) -> ApiResult<T> {
    value
        .parse()
        .map_err(|_| ValidationError::single(field, format!("{field} is not a valid id")).into())
}

/// Trims a required text field, recording an error when it is blank or too long.
pub fn required_text(
    errors: &mut ValidationError,
    field: &str,
    value: &str,
    max_length: usize,
) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        errors.push(field, format!("{field} is required"));
    } else if trimmed.chars().count() > max_length {
        errors.push(field, format!("{field} must be at most {max_length} characters"));
    }
    trimmed.to_string()
}

/// Like [`required_text`] for fields that are present only when changing.
pub fn optional_text(
    errors: &mut ValidationError,
    field: &str,
    value: Option<&str>,
    max_length: usize,
) -> Option<String> {
    value.map(|value| required_text(errors, field, value, max_length))
}

/// Checks an email address has the `local@domain` shape.
pub fn check_email(errors: &mut ValidationError, field: &str, email: &str) {
    let valid = email.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
    }) && !email.contains(char::is_whitespace);
    if !valid {
        errors.push(field, "Invalid email address");
    }
}

/// Minimum password length accepted on sign-up and reset.
pub const MIN_PASSWORD_LENGTH: usize = 8;

pub fn check_password(errors: &mut ValidationError, field: &str, password: &str) {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.push(
            field,
            format!("Password must be at least {MIN_PASSWORD_LENGTH} characters"),
        );
    }
}

/// Converts accumulated field errors into a handler error.
///
/// # Errors
///
/// Returns 400 when any field failed.
pub fn finish(errors: ValidationError) -> ApiResult<()> {
    errors.into_result().map_err(ApiErrorResponse::from)
}

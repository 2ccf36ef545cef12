//! Email confirmation and password reset.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::auth::session;
use super::dto::{
    AuthResponse, UserEnvelope, UserResponse, check_email, check_password, finish,
};
use super::error::{ApiErrorResponse, ApiResult, ValidationError};
use super::handlers::AppState;
use crate::domain::{
    User, Verification, VerificationId, VerificationPurpose, normalize_email,
};
use crate::infrastructure::{Filter, Mail, WriteBatch, dispatch, generate_code, hash_password, is_code};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

async fn find_code(
    state: &AppState,
    code: &str,
    purpose: VerificationPurpose,
) -> ApiResult<Verification> {
    if !is_code(code) {
        return Err(ValidationError::single("code", "Invalid verification code").into());
    }
    state
        .repository
        .find_one::<Verification>(
            Filter::eq("code", code.to_lowercase()).and(Filter::eq("purpose", purpose)),
        )
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found("Verification code not found"))
}

// =============================================================================
// PUT /verifications/{code}
// =============================================================================

/// Redeems an email confirmation code and signs the user in.
///
/// # Response
///
/// - **200 OK**: `{user, access_token}`
/// - **400 Bad Request**: Malformed code, or the account is already active
///   or deleted
/// - **404 Not Found**: Unknown code
///
/// # Errors
///
/// See the responses above.
pub async fn verify_email(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> ApiResult<Json<AuthResponse>> {
    let verification = find_code(&state, &code, VerificationPurpose::EmailConfirmation).await?;

    let mut user = state
        .repository
        .get::<User>(verification.user)
        .await?
        .filter(|user| !user.is_deleted && !user.is_active)
        .ok_or_else(|| ApiErrorResponse::bad_request("User is already verified or no longer exists"))?;

    user.is_active = true;
    user.updated_at = Utc::now();

    let mut batch = WriteBatch::new();
    batch.replace(&user)?;
    batch.delete::<Verification>(verification.id);
    state.repository.commit(batch).await?;
    user.version += 1;

    tracing::info!(user = %user.id, "Email confirmed");
    Ok(Json(session(&state, &user)?))
}

// =============================================================================
// POST /verifications/password-reset
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordResetRequest {
    pub email: String,
}

/// Mails a password reset link to a live account.
///
/// Always answers 200 so the response does not reveal whether the account
/// exists.
///
/// # Errors
///
/// Returns 400 for a malformed email.
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(request): Json<PasswordResetRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let email = normalize_email(&request.email);
    let mut errors = ValidationError::default();
    check_email(&mut errors, "email", &email);
    finish(errors)?;

    let user = state
        .repository
        .find_one::<User>(Filter::eq("email", &email).and(Filter::eq("is_deleted", false)))
        .await?;

    if let Some(user) = user {
        let verification = Verification::new(
            VerificationId::generate(),
            user.id,
            generate_code(),
            VerificationPurpose::PasswordReset,
            Utc::now(),
        );
        let mut batch = WriteBatch::new();
        batch.delete_where::<Verification>(
            Filter::eq("user", user.id)
                .and(Filter::eq("purpose", VerificationPurpose::PasswordReset)),
        );
        batch.insert(&verification)?;
        state.repository.commit(batch).await?;

        dispatch(
            &state.mailer,
            Mail::password_reset(&user.email, &state.frontend_url, &verification.code),
        );
        tracing::info!(user = %user.id, "Password reset requested");
    } else {
        tracing::debug!(%email, "Password reset for unknown account");
    }

    Ok(Json(MessageResponse {
        message: "If an account exists for this email, a reset link has been sent".to_string(),
    }))
}

// =============================================================================
// PUT /verifications/password-reset/{code}
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

/// Sets a new password using a reset code.
///
/// # Errors
///
/// - 400 for a malformed code or password, or an expired code
/// - 404 for an unknown code or a deleted account
pub async fn reset_password(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(request): Json<ResetPasswordRequest>,
) -> ApiResult<Json<UserEnvelope>> {
    let mut errors = ValidationError::default();
    check_password(&mut errors, "password", &request.password);
    finish(errors)?;

    let verification = find_code(&state, &code, VerificationPurpose::PasswordReset).await?;
    let now = Utc::now();

    if verification.is_expired(now) {
        let mut batch = WriteBatch::new();
        batch.delete::<Verification>(verification.id);
        state.repository.commit(batch).await?;
        return Err(ApiErrorResponse::bad_request("Reset code has expired"));
    }

    let mut user = state
        .repository
        .get::<User>(verification.user)
        .await?
        .filter(|user| !user.is_deleted)
        .ok_or_else(|| ApiErrorResponse::not_found("User not found"))?;

    user.password_hash = Some(hash_password(&request.password)?);
    user.updated_at = now;

    let mut batch = WriteBatch::new();
    batch.replace(&user)?;
    batch.delete::<Verification>(verification.id);
    state.repository.commit(batch).await?;
    user.version += 1;

    tracing::info!(user = %user.id, "Password reset");
    Ok(Json(UserEnvelope {
        user: UserResponse::from(&user),
    }))
}

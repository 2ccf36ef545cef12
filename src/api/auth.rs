//! Sign-in handlers.

use axum::{Json, extract::State};
use chrono::Utc;
use serde::Deserialize;

use super::dto::{AuthResponse, UserResponse, check_email, finish, required_text};
use super::error::{ApiErrorResponse, ApiResult, ValidationError};
use super::handlers::AppState;
use crate::domain::{User, UserId, normalize_email};
use crate::infrastructure::{Filter, WriteBatch, verify_password};

const INVALID_CREDENTIALS: &str = "Invalid credentials or user not yet verified";

/// Issues a session token for `user`.
///
/// # Errors
///
/// Returns 500 if the token cannot be signed.
pub fn session(state: &AppState, user: &User) -> ApiResult<AuthResponse> {
    let access_token = state.tokens.issue(user.id, Utc::now())?;
    Ok(AuthResponse {
        user: UserResponse::from(user),
        access_token,
    })
}

// =============================================================================
// POST /auth/login
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Signs in with email and password.
///
/// # Request Body
///
/// ```json
/// { "email": "ada@example.com", "password": "correct horse" }
/// ```
///
/// # Response
///
/// - **200 OK**: `{user, access_token}`
/// - **401 Unauthorized**: Unknown email, wrong password, unconfirmed or
///   deleted account
///
/// # Errors
///
/// See the responses above.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = normalize_email(&request.email);
    let user = state
        .repository
        .find_one::<User>(Filter::eq("email", &email).and(Filter::eq("is_deleted", false)))
        .await?
        .filter(User::can_sign_in)
        .filter(|user| {
            user.password_hash
                .as_deref()
                .is_some_and(|hash| verify_password(&request.password, hash))
        })
        .ok_or_else(|| {
            tracing::debug!(%email, "Login refused");
            ApiErrorResponse::unauthorized(INVALID_CREDENTIALS)
        })?;

    tracing::info!(user = %user.id, "User signed in");
    Ok(Json(session(&state, &user)?))
}

// =============================================================================
// POST /auth/login/google
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleLoginRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub profile_picture_url: Option<String>,
    pub is_google_verified: bool,
    pub google_id: String,
}

/// Signs in with an identity already verified by Google.
///
/// An existing account is linked to the Google identity and activated; a
/// missing profile picture is taken from Google. Otherwise a new, active
/// account is created.
///
/// # Errors
///
/// - 400 on validation errors
/// - 401 when Google has not verified the address or the account is deleted
pub async fn login_with_google(
    State(state): State<AppState>,
    Json(request): Json<GoogleLoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let mut errors = ValidationError::default();
    check_email(&mut errors, "email", request.email.trim());
    let first_name = required_text(&mut errors, "first_name", &request.first_name, 50);
    let last_name = required_text(&mut errors, "last_name", &request.last_name, 50);
    let google_id = required_text(&mut errors, "google_id", &request.google_id, 255);
    finish(errors)?;

    if !request.is_google_verified {
        return Err(ApiErrorResponse::unauthorized("User not yet verified by Google"));
    }

    let email = normalize_email(&request.email);
    let now = Utc::now();
    let existing = state
        .repository
        .find_one::<User>(Filter::eq("email", &email))
        .await?;

    let mut batch = WriteBatch::new();
    let user = match existing {
        Some(user) if user.is_deleted => {
            return Err(ApiErrorResponse::unauthorized(INVALID_CREDENTIALS));
        }
        Some(mut user) => {
            let linked = user.google_id.is_none()
                || user.profile_picture_url.is_none()
                || !user.is_active;
            if linked {
                user.google_id.get_or_insert(google_id);
                if user.profile_picture_url.is_none() {
                    user.profile_picture_url = request.profile_picture_url;
                }
                user.is_active = true;
                user.updated_at = now;
                batch.replace(&user)?;
                user.version += 1;
            }
            user
        }
        None => {
            let mut user = User::new(UserId::generate(), first_name, last_name, &email, now).activated();
            user.google_id = Some(google_id);
            user.profile_picture_url = request.profile_picture_url;
            batch.insert(&user)?;
            tracing::info!(user = %user.id, "User registered with Google");
            user
        }
    };
    state.repository.commit(batch).await?;

    Ok(Json(session(&state, &user)?))
}

//! User account handlers.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;

use super::access::ProjectAccess;
use super::dto::{
    UserEnvelope, UserResponse, check_email, check_password, finish, nullable, optional_text,
    parse_id, required_text,
};
use super::error::{ApiErrorResponse, ApiResult, ValidationError};
use super::extract::AuthUser;
use super::handlers::AppState;
use super::listing::{ListParams, ListResponse};
use crate::domain::{
    ProjectId, ProjectRole, User, UserId, Verification, VerificationId, VerificationPurpose,
    normalize_email,
};
use crate::infrastructure::{
    Filter, Mail, Query as StoreQuery, Sort, WriteBatch, dispatch, generate_code, hash_password,
};

const NAME_MAX_LENGTH: usize = 50;

/// Fields searched by `?search=` on user lists.
pub const USER_SEARCH_FIELDS: [&str; 3] = ["first_name", "last_name", "email"];

/// Loads a live user or fails with 404.
///
/// # Errors
///
/// Returns 404 when the user is missing or deleted.
pub async fn load_live_user(state: &AppState, id: UserId) -> ApiResult<User> {
    state
        .repository
        .get::<User>(id)
        .await?
        .filter(|user| !user.is_deleted)
        .ok_or_else(|| ApiErrorResponse::not_found("User not found"))
}

fn ensure_self(current: &User, id: &str) -> ApiResult<()> {
    let id: UserId = parse_id("user_id", id)?;
    if id == current.id {
        Ok(())
    } else {
        Err(ApiErrorResponse::forbidden("You can only change your own account"))
    }
}

// =============================================================================
// POST /users
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
}

/// Registers an account and mails the confirmation link.
///
/// A soft-deleted account with the same email is revived in place.
///
/// # Request Body
///
/// ```json
/// {
///   "first_name": "Ada",
///   "last_name": "Lovelace",
///   "email": "ada@example.com",
///   "password": "correct horse"
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: `{user}`, inactive until the email is confirmed
/// - **400 Bad Request**: Validation error
/// - **409 Conflict**: A live account already uses the email
///
/// # Errors
///
/// See the responses above.
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserEnvelope>)> {
    let mut errors = ValidationError::default();
    let first_name = required_text(&mut errors, "first_name", &request.first_name, NAME_MAX_LENGTH);
    let last_name = required_text(&mut errors, "last_name", &request.last_name, NAME_MAX_LENGTH);
    let email = normalize_email(&request.email);
    check_email(&mut errors, "email", &email);
    check_password(&mut errors, "password", &request.password);
    finish(errors)?;

    let existing = state
        .repository
        .find_one::<User>(Filter::eq("email", &email))
        .await?;
    let password_hash = hash_password(&request.password)?;
    let now = Utc::now();

    let mut batch = WriteBatch::new();
    let user = match existing {
        Some(user) if !user.is_deleted => {
            return Err(ApiErrorResponse::conflict("User already exists"));
        }
        Some(mut user) => {
            user.revive(first_name, last_name, password_hash, now);
            batch.replace(&user)?;
            user.version += 1;
            tracing::info!(user = %user.id, "Deleted account revived");
            user
        }
        None => {
            let user = User::new(UserId::generate(), first_name, last_name, &email, now)
                .with_password_hash(password_hash);
            batch.require_absent::<User>(Filter::eq("email", &email), "User already exists");
            batch.insert(&user)?;
            tracing::info!(user = %user.id, "User registered");
            user
        }
    };

    let verification = Verification::new(
        VerificationId::generate(),
        user.id,
        generate_code(),
        VerificationPurpose::EmailConfirmation,
        now,
    );
    batch.delete_where::<Verification>(
        Filter::eq("user", user.id)
            .and(Filter::eq("purpose", VerificationPurpose::EmailConfirmation)),
    );
    batch.insert(&verification)?;
    state.repository.commit(batch).await?;

    dispatch(
        &state.mailer,
        Mail::email_confirmation(&user.email, &state.frontend_url, &verification.code),
    );

    Ok((
        StatusCode::CREATED,
        Json(UserEnvelope {
            user: UserResponse::from(&user),
        }),
    ))
}

// =============================================================================
// GET /users
// =============================================================================

/// Lists live users, sorted by last name.
///
/// # Errors
///
/// Returns 400 for unknown query keys.
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ListResponse<UserResponse>>> {
    let params = ListParams::parse(params, &["search"])?;
    let filter = Filter::eq("is_deleted", false).and(params.search(&USER_SEARCH_FIELDS));
    let query = StoreQuery::new(filter)
        .sorted_by(Sort::text("last_name"))
        .sorted_by(Sort::text("first_name"))
        .paginate(params.pagination());
    let page = state.repository.find::<User>(&query).await?;
    Ok(Json(ListResponse::from_page(page, |user| UserResponse::from(&user))))
}

// =============================================================================
// GET /users/me, GET /users/{id}
// =============================================================================

pub async fn get_current_user(AuthUser(user): AuthUser) -> Json<UserResponse> {
    Json(UserResponse::from(&user))
}

/// Returns a live user.
///
/// # Errors
///
/// Returns 400 for a malformed id and 404 for a missing or deleted user.
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(_user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<UserResponse>> {
    let user = load_live_user(&state, parse_id("user_id", &id)?).await?;
    Ok(Json(UserResponse::from(&user)))
}

// =============================================================================
// PUT /users/{id}
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub profile_picture_url: Option<Option<String>>,
}

/// Updates my own profile.
///
/// # Errors
///
/// - 400 on validation errors
/// - 403 when `id` is someone else
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(mut user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    ensure_self(&user, &id)?;

    let mut errors = ValidationError::default();
    let first_name = optional_text(
        &mut errors,
        "first_name",
        request.first_name.as_deref(),
        NAME_MAX_LENGTH,
    );
    let last_name = optional_text(
        &mut errors,
        "last_name",
        request.last_name.as_deref(),
        NAME_MAX_LENGTH,
    );
    if let Some(password) = &request.password {
        check_password(&mut errors, "password", password);
    }
    finish(errors)?;

    if let Some(first_name) = first_name {
        user.first_name = first_name;
    }
    if let Some(last_name) = last_name {
        user.last_name = last_name;
    }
    if let Some(password) = &request.password {
        user.password_hash = Some(hash_password(password)?);
    }
    if let Some(picture) = request.profile_picture_url {
        user.profile_picture_url = picture.map(|url| url.trim().to_string()).filter(|url| !url.is_empty());
    }
    user.updated_at = Utc::now();

    let mut batch = WriteBatch::new();
    batch.replace(&user)?;
    state.repository.commit(batch).await?;
    user.version += 1;
    Ok(Json(UserResponse::from(&user)))
}

// =============================================================================
// DELETE /users/{id}
// =============================================================================

/// Soft-deletes my own account.
///
/// # Errors
///
/// Returns 403 when `id` is someone else.
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(mut user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<UserResponse>> {
    ensure_self(&user, &id)?;

    user.is_deleted = true;
    user.updated_at = Utc::now();
    let mut batch = WriteBatch::new();
    batch.replace(&user)?;
    state.repository.commit(batch).await?;
    user.version += 1;

    tracing::info!(user = %user.id, "Account deleted");
    Ok(Json(UserResponse::from(&user)))
}

// =============================================================================
// Favorites
// =============================================================================

/// Adds a project I belong to to my favorites.
///
/// # Errors
///
/// Returns 404 when the project is missing or I am not a member.
pub async fn add_favorite(
    State(state): State<AppState>,
    AuthUser(mut user): AuthUser,
    Path(project_id): Path<String>,
) -> ApiResult<Json<UserResponse>> {
    let project_id: ProjectId = parse_id("project_id", &project_id)?;
    let access =
        ProjectAccess::resolve(&state.repository, user.id, project_id, ProjectRole::Member).await?;

    if user.add_favorite(project_id) {
        user.updated_at = Utc::now();
        let mut batch = WriteBatch::new();
        access.guard(&mut batch);
        batch.replace(&user)?;
        state.repository.commit(batch).await?;
        user.version += 1;
    }
    Ok(Json(UserResponse::from(&user)))
}

/// Removes a project from my favorites.
///
/// # Errors
///
/// Returns 400 for a malformed id.
pub async fn remove_favorite(
    State(state): State<AppState>,
    AuthUser(mut user): AuthUser,
    Path(project_id): Path<String>,
) -> ApiResult<Json<UserResponse>> {
    let project_id: ProjectId = parse_id("project_id", &project_id)?;
    if user.remove_favorite(project_id) {
        user.updated_at = Utc::now();
        let mut batch = WriteBatch::new();
        batch.replace(&user)?;
        state.repository.commit(batch).await?;
        user.version += 1;
    }
    Ok(Json(UserResponse::from(&user)))
}

//! Comment handlers.
//!
//! A comment targets a task or a project. Creating or reading one requires
//! read access to the target; only the author may edit or delete it.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::access::TargetAccess;
use super::dto::{finish, parse_id, required_text};
use super::error::{ApiErrorResponse, ApiResult, ValidationError};
use super::extract::AuthUser;
use super::handlers::AppState;
use super::listing::{ListParams, ListResponse};
use crate::domain::{Comment, CommentId, Project, TargetType, Task, User};
use crate::infrastructure::{Filter, Query as StoreQuery, Sort, WriteBatch};

const CONTENT_MAX_LENGTH: usize = 5000;

/// Queues the counter adjustment of the comment's target.
fn count_on_target(batch: &mut WriteBatch, comment: &Comment, delta: i64) {
    match comment.target_type {
        TargetType::Task => batch.increment::<Task>(comment.target_id, Task::COMMENT_COUNT, delta),
        TargetType::Project => {
            batch.increment::<Project>(comment.target_id, Project::COMMENT_COUNT, delta);
        }
    }
}

async fn load_comment(state: &AppState, id: &str) -> ApiResult<Comment> {
    let id: CommentId = parse_id("comment_id", id)?;
    state
        .repository
        .get::<Comment>(id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found("Comment not found"))
}

fn ensure_author(comment: &Comment, user: &User) -> ApiResult<()> {
    if comment.author == user.id {
        Ok(())
    } else {
        Err(ApiErrorResponse::forbidden(
            "Only the author can change this comment",
        ))
    }
}

/// Lists the comments on a target the caller has already been granted
/// access to, newest first.
///
/// # Errors
///
/// Returns 400 for unknown query keys.
pub async fn list_for_target(
    state: &AppState,
    target_type: TargetType,
    target_id: Uuid,
    params: HashMap<String, String>,
) -> ApiResult<ListResponse<Comment>> {
    let params = ListParams::parse(params, &[])?;
    let filter = Filter::eq("target_type", target_type).and(Filter::eq("target_id", target_id));
    let query = StoreQuery::new(filter)
        .sorted_by(Sort::newest_first("created_at"))
        .paginate(params.pagination());
    Ok(ListResponse::from(state.repository.find::<Comment>(&query).await?))
}

// =============================================================================
// POST /comments
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCommentRequest {
    pub content: String,
    pub target_type: TargetType,
    pub target_id: String,
    #[serde(default)]
    pub files: Vec<String>,
}

/// Comments on a task or project.
///
/// # Request Body
///
/// ```json
/// {
///   "content": "Looks good",
///   "target_type": "Task",
///   "target_id": "0190...",
///   "files": []
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: Comment created
/// - **400 Bad Request**: Validation error
/// - **404 Not Found**: Target missing or not visible
///
/// # Errors
///
/// See the responses above.
pub async fn create_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateCommentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let mut errors = ValidationError::default();
    let content = required_text(&mut errors, "content", &request.content, CONTENT_MAX_LENGTH);
    finish(errors)?;
    let target_id: Uuid = parse_id("target_id", &request.target_id)?;

    let target =
        TargetAccess::resolve(&state.repository, user.id, request.target_type, target_id).await?;

    let mut comment = Comment::new(
        CommentId::generate(),
        user.id,
        content,
        request.target_type,
        target_id,
        Utc::now(),
    );
    comment.files = request.files;

    let mut batch = WriteBatch::new();
    target.guard(&mut batch);
    batch.insert(&comment)?;
    count_on_target(&mut batch, &comment, 1);
    state.repository.commit(batch).await?;

    tracing::debug!(comment = %comment.id, target_type = ?comment.target_type, %target_id, "Comment created");
    Ok((StatusCode::CREATED, Json(comment)))
}

// =============================================================================
// GET /comments/{id}
// =============================================================================

/// Returns a comment whose target I can see.
///
/// # Errors
///
/// Returns 404 when the comment or its target is not visible.
pub async fn get_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Comment>> {
    let comment = load_comment(&state, &id).await?;
    TargetAccess::resolve(&state.repository, user.id, comment.target_type, comment.target_id)
        .await?;
    Ok(Json(comment))
}

// =============================================================================
// PUT /comments/{id}
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCommentRequest {
    pub content: String,
}

/// Edits my comment.
///
/// # Errors
///
/// - 400 on validation errors
/// - 403 when I am not the author
pub async fn update_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateCommentRequest>,
) -> ApiResult<Json<Comment>> {
    let mut comment = load_comment(&state, &id).await?;
    ensure_author(&comment, &user)?;

    let mut errors = ValidationError::default();
    comment.content = required_text(&mut errors, "content", &request.content, CONTENT_MAX_LENGTH);
    finish(errors)?;
    comment.updated_at = Utc::now();

    let mut batch = WriteBatch::new();
    batch.replace(&comment)?;
    state.repository.commit(batch).await?;
    comment.version += 1;
    Ok(Json(comment))
}

// =============================================================================
// DELETE /comments/{id}
// =============================================================================

/// Deletes my comment.
///
/// # Errors
///
/// Returns 403 when I am not the author.
pub async fn delete_comment(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Comment>> {
    let comment = load_comment(&state, &id).await?;
    ensure_author(&comment, &user)?;

    let mut batch = WriteBatch::new();
    batch.delete::<Comment>(comment.id);
    count_on_target(&mut batch, &comment, -1);
    state.repository.commit(batch).await?;
    Ok(Json(comment))
}

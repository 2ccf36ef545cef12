//! Tag handlers.
//!
//! A tag's scope is either its project or its creator's personal space.
//! Labels (ignoring case) and color/shade pairs are unique per scope.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;

use super::access::ProjectAccess;
use super::dto::{finish, optional_text, parse_id, required_text};
use super::error::{ApiErrorResponse, ApiResult, ValidationError};
use super::extract::AuthUser;
use super::handlers::AppState;
use super::listing::{ListParams, ListResponse};
use crate::domain::{
    ProjectId, ProjectRole, Tag, TagClash, TagColor, TagId, TagShade, Task, UserId,
};
use crate::infrastructure::{Filter, Query as StoreQuery, Sort, WriteBatch};

const LABEL_MAX_LENGTH: usize = 30;

/// Filter matching the tags sharing a scope.
fn scope_filter(project: Option<ProjectId>, creator: UserId) -> Filter {
    match project {
        Some(project) => Filter::eq("project", project),
        None => Filter::eq("project", serde_json::Value::Null).and(Filter::eq("created_by", creator)),
    }
}

/// Fails with 409 if a tag in the scope, other than `except`, clashes.
async fn check_unique(
    state: &AppState,
    scope: Filter,
    except: Option<TagId>,
    label: &str,
    color: TagColor,
    shade: TagShade,
) -> ApiResult<()> {
    let clash = state
        .repository
        .find_all::<Tag>(scope)
        .await?
        .iter()
        .filter(|tag| Some(tag.id) != except)
        .find_map(|tag| tag.clash_with(label, color, shade));
    match clash {
        Some(clash) => Err(clash.into()),
        None => Ok(()),
    }
}

/// Queues the commit-time form of [`check_unique`], so a tag written
/// concurrently into the same scope still fails the batch with 409.
fn guard_unique(
    batch: &mut WriteBatch,
    scope: &Filter,
    except: Option<TagId>,
    label: &str,
    color: TagColor,
    shade: TagShade,
) {
    let others = match except {
        Some(id) => scope.clone().and(Filter::ne("id", id)),
        None => scope.clone(),
    };
    batch.require_absent::<Tag>(
        others.clone().and(Filter::eq_ignore_case("label", label.trim())),
        TagClash::Label.message(),
    );
    batch.require_absent::<Tag>(
        others.and(Filter::eq("color", color)).and(Filter::eq("shade", shade)),
        TagClash::Color.message(),
    );
}

/// Loads a tag I may change, resolving project membership for project tags.
async fn load_own_tag(
    state: &AppState,
    user: UserId,
    id: &str,
) -> ApiResult<(Tag, Option<ProjectAccess>)> {
    let id: TagId = parse_id("tag_id", id)?;
    let tag = state
        .repository
        .get::<Tag>(id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found("Tag not found"))?;
    let access = match tag.project {
        Some(project) => Some(
            ProjectAccess::resolve(&state.repository, user, project, ProjectRole::Member).await?,
        ),
        None => None,
    };
    if tag.created_by != user {
        return Err(ApiErrorResponse::forbidden(
            "Only the creator can change this tag",
        ));
    }
    Ok((tag, access))
}

// =============================================================================
// POST /tags
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTagRequest {
    pub label: String,
    pub color: TagColor,
    #[serde(default)]
    pub shade: TagShade,
    pub project_id: Option<String>,
}

/// Creates a personal tag, or a project tag when `project_id` is given.
///
/// # Request Body
///
/// ```json
/// { "label": "urgent", "color": "red", "shade": "dark", "project_id": "0190..." }
/// ```
///
/// # Response
///
/// - **201 Created**: Tag created
/// - **400 Bad Request**: Validation error
/// - **403 Forbidden**: Plain members cannot create project tags
/// - **409 Conflict**: Label or color/shade already used in the scope
///
/// # Errors
///
/// See the responses above.
pub async fn create_tag(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateTagRequest>,
) -> ApiResult<(StatusCode, Json<Tag>)> {
    let mut errors = ValidationError::default();
    let label = required_text(&mut errors, "label", &request.label, LABEL_MAX_LENGTH);
    finish(errors)?;

    let access = match request.project_id.as_deref() {
        Some(project_id) => Some(
            ProjectAccess::resolve(
                &state.repository,
                user.id,
                parse_id("project_id", project_id)?,
                ProjectRole::Lead,
            )
            .await?,
        ),
        None => None,
    };
    let project = access.as_ref().map(|access| access.project.id);
    let scope = scope_filter(project, user.id);
    check_unique(&state, scope.clone(), None, &label, request.color, request.shade).await?;

    let tag = Tag::new(
        TagId::generate(),
        label,
        request.color,
        request.shade,
        project,
        user.id,
        Utc::now(),
    );
    let mut batch = WriteBatch::new();
    if let Some(access) = &access {
        access.guard(&mut batch);
    }
    guard_unique(&mut batch, &scope, None, &tag.label, tag.color, tag.shade);
    batch.insert(&tag)?;
    state.repository.commit(batch).await?;

    tracing::debug!(tag = %tag.id, project = ?tag.project, "Tag created");
    Ok((StatusCode::CREATED, Json(tag)))
}

// =============================================================================
// GET /tags
// =============================================================================

/// Lists the tags of a project I belong to, or my personal tags when no
/// `project_id` is given. Sorted by label.
///
/// # Errors
///
/// Returns 400 for unknown keys and 404 when I am not a project member.
pub async fn list_tags(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ListResponse<Tag>>> {
    let params = ListParams::parse(params, &["search", "project_id"])?;
    let project = match params.parsed::<ProjectId>("project_id")? {
        Some(project) => Some(
            ProjectAccess::resolve(&state.repository, user.id, project, ProjectRole::Member)
                .await?
                .project
                .id,
        ),
        None => None,
    };

    let filter = scope_filter(project, user.id).and(params.search(&["label", "color"]));
    let query = StoreQuery::new(filter)
        .sorted_by(Sort::text("label"))
        .paginate(params.pagination());
    Ok(Json(ListResponse::from(
        state.repository.find::<Tag>(&query).await?,
    )))
}

// =============================================================================
// PUT /tags/{id}
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateTagRequest {
    pub label: Option<String>,
    pub color: Option<TagColor>,
    pub shade: Option<TagShade>,
}

/// Edits a tag I created.
///
/// # Errors
///
/// - 400 on validation errors
/// - 403 when I did not create the tag
/// - 409 when the new attributes clash with another tag in scope
pub async fn update_tag(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateTagRequest>,
) -> ApiResult<Json<Tag>> {
    let (mut tag, access) = load_own_tag(&state, user.id, &id).await?;

    let mut errors = ValidationError::default();
    let label = optional_text(&mut errors, "label", request.label.as_deref(), LABEL_MAX_LENGTH);
    finish(errors)?;

    if let Some(label) = label {
        tag.label = label;
    }
    if let Some(color) = request.color {
        tag.color = color;
    }
    if let Some(shade) = request.shade {
        tag.shade = shade;
    }
    let scope = scope_filter(tag.project, tag.created_by);
    check_unique(&state, scope.clone(), Some(tag.id), &tag.label, tag.color, tag.shade).await?;
    tag.updated_at = Utc::now();

    let mut batch = WriteBatch::new();
    if let Some(access) = &access {
        access.guard(&mut batch);
    }
    guard_unique(&mut batch, &scope, Some(tag.id), &tag.label, tag.color, tag.shade);
    batch.replace(&tag)?;
    state.repository.commit(batch).await?;
    tag.version += 1;
    Ok(Json(tag))
}

// =============================================================================
// DELETE /tags/{id}
// =============================================================================

/// Deletes a tag I created and detaches it from every task.
///
/// # Errors
///
/// Returns 403 when I did not create the tag.
pub async fn delete_tag(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Tag>> {
    let (tag, access) = load_own_tag(&state, user.id, &id).await?;

    let mut batch = WriteBatch::new();
    if let Some(access) = &access {
        access.guard(&mut batch);
    }
    batch.delete::<Tag>(tag.id);
    batch.pull::<Task>(Filter::contains("tags", tag.id), "tags", tag.id);
    let outcome = state.repository.commit(batch).await?;

    tracing::debug!(tag = %tag.id, detached = outcome.modified, "Tag deleted");
    Ok(Json(tag))
}

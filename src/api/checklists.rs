//! Checklist and checklist item handlers.
//!
//! Access to both follows the permission on the owning task.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::access::TaskAccess;
use super::dto::{finish, optional_text, parse_id, required_text};
use super::error::{ApiErrorResponse, ApiResult, ValidationError};
use super::extract::AuthUser;
use super::handlers::AppState;
use super::listing::{ListParams, ListResponse};
use crate::domain::{
    Checklist, ChecklistId, ChecklistItem, ChecklistItemId, Task, TaskPermission, UserId,
};
use crate::infrastructure::{Filter, Query as StoreQuery, Sort, SortDirection, SortKind, WriteBatch};

const TITLE_MAX_LENGTH: usize = 100;

fn oldest_first() -> Sort {
    Sort::new("created_at", SortKind::Timestamp, SortDirection::Ascending)
}

async fn load_checklist(
    state: &AppState,
    user: UserId,
    id: &str,
    required: TaskPermission,
) -> ApiResult<(Checklist, TaskAccess)> {
    let id: ChecklistId = parse_id("checklist_id", id)?;
    let checklist = state
        .repository
        .get::<Checklist>(id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found("Checklist not found"))?;
    let access = TaskAccess::resolve(&state.repository, user, checklist.task, required).await?;
    Ok((checklist, access))
}

async fn load_item(
    state: &AppState,
    user: UserId,
    id: &str,
    required: TaskPermission,
) -> ApiResult<(ChecklistItem, TaskAccess)> {
    let id: ChecklistItemId = parse_id("item_id", id)?;
    let item = state
        .repository
        .get::<ChecklistItem>(id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found("Checklist item not found"))?;
    let access = TaskAccess::resolve(&state.repository, user, item.task, required).await?;
    Ok((item, access))
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChecklistRequest {
    pub title: String,
}

// =============================================================================
// Checklists
// =============================================================================

/// Adds a checklist to a task I manage.
///
/// # Errors
///
/// - 400 on validation errors
/// - 403 without Manage on the task
pub async fn create_checklist(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<String>,
    Json(request): Json<ChecklistRequest>,
) -> ApiResult<(StatusCode, Json<Checklist>)> {
    let mut errors = ValidationError::default();
    let title = required_text(&mut errors, "title", &request.title, TITLE_MAX_LENGTH);
    finish(errors)?;
    let access = TaskAccess::resolve(
        &state.repository,
        user.id,
        parse_id("task_id", &task_id)?,
        TaskPermission::Manage,
    )
    .await?;

    let checklist = Checklist::new(ChecklistId::generate(), access.task.id, title, Utc::now());
    let mut batch = WriteBatch::new();
    access.guard(&mut batch);
    batch.insert(&checklist)?;
    batch.increment::<Task>(access.task.id, Task::CHECKLIST_COUNT, 1);
    state.repository.commit(batch).await?;
    Ok((StatusCode::CREATED, Json(checklist)))
}

/// Lists the checklists of a task.
///
/// # Errors
///
/// Returns 404 when the task is not visible.
pub async fn list_checklists(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ListResponse<Checklist>>> {
    let access = TaskAccess::resolve(
        &state.repository,
        user.id,
        parse_id("task_id", &task_id)?,
        TaskPermission::View,
    )
    .await?;
    let params = ListParams::parse(params, &[])?;
    let query = StoreQuery::new(Filter::eq("task", access.task.id))
        .sorted_by(oldest_first())
        .paginate(params.pagination());
    Ok(Json(ListResponse::from(
        state.repository.find::<Checklist>(&query).await?,
    )))
}

/// Renames a checklist.
///
/// # Errors
///
/// Returns 403 without Manage on the task.
pub async fn update_checklist(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<ChecklistRequest>,
) -> ApiResult<Json<Checklist>> {
    let (mut checklist, access) = load_checklist(&state, user.id, &id, TaskPermission::Manage).await?;

    let mut errors = ValidationError::default();
    checklist.title = required_text(&mut errors, "title", &request.title, TITLE_MAX_LENGTH);
    finish(errors)?;
    checklist.updated_at = Utc::now();

    let mut batch = WriteBatch::new();
    access.guard(&mut batch);
    batch.replace(&checklist)?;
    state.repository.commit(batch).await?;
    checklist.version += 1;
    Ok(Json(checklist))
}

/// Deletes a checklist together with its items.
///
/// # Errors
///
/// Returns 403 without Manage on the task.
pub async fn delete_checklist(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Checklist>> {
    let (checklist, access) = load_checklist(&state, user.id, &id, TaskPermission::Manage).await?;

    let mut batch = WriteBatch::new();
    access.guard(&mut batch);
    batch.delete_where::<ChecklistItem>(Filter::eq("checklist", checklist.id));
    batch.delete::<Checklist>(checklist.id);
    batch.increment::<Task>(checklist.task, Task::CHECKLIST_COUNT, -1);
    let outcome = state.repository.commit(batch).await?;

    tracing::debug!(checklist = %checklist.id, removed = outcome.deleted, "Checklist deleted");
    Ok(Json(checklist))
}

// =============================================================================
// Checklist Items
// =============================================================================

/// Every item of one checklist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsResponse {
    pub items: Vec<ChecklistItem>,
    pub count: usize,
}

/// Adds an item to a checklist.
///
/// # Errors
///
/// - 400 on validation errors
/// - 403 without Manage on the task
pub async fn create_item(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(checklist_id): Path<String>,
    Json(request): Json<ChecklistRequest>,
) -> ApiResult<(StatusCode, Json<ChecklistItem>)> {
    let mut errors = ValidationError::default();
    let title = required_text(&mut errors, "title", &request.title, TITLE_MAX_LENGTH);
    finish(errors)?;
    let (checklist, access) =
        load_checklist(&state, user.id, &checklist_id, TaskPermission::Manage).await?;

    let item = ChecklistItem::new(ChecklistItemId::generate(), &checklist, title, Utc::now());
    let mut batch = WriteBatch::new();
    access.guard(&mut batch);
    batch.insert(&item)?;
    batch.increment::<Checklist>(checklist.id, Checklist::ITEM_COUNT, 1);
    state.repository.commit(batch).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Lists every item of a checklist in creation order.
///
/// # Errors
///
/// Returns 404 when the checklist or its task is not visible.
pub async fn list_items(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(checklist_id): Path<String>,
) -> ApiResult<Json<ItemsResponse>> {
    let (checklist, _access) =
        load_checklist(&state, user.id, &checklist_id, TaskPermission::View).await?;
    let query = StoreQuery::new(Filter::eq("checklist", checklist.id)).sorted_by(oldest_first());
    let items = state.repository.find::<ChecklistItem>(&query).await?.items;
    Ok(Json(ItemsResponse {
        count: items.len(),
        items,
    }))
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateItemRequest {
    pub title: Option<String>,
    pub is_checked: Option<bool>,
}

/// Renames or ticks a checklist item.
///
/// # Errors
///
/// Returns 403 when renaming without Manage, or ticking without the right
/// to update the task status.
pub async fn update_item(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateItemRequest>,
) -> ApiResult<Json<ChecklistItem>> {
    let required = if request.title.is_some() {
        TaskPermission::Manage
    } else {
        TaskPermission::UpdateStatus
    };
    let (mut item, access) = load_item(&state, user.id, &id, required).await?;

    let mut errors = ValidationError::default();
    let title = optional_text(&mut errors, "title", request.title.as_deref(), TITLE_MAX_LENGTH);
    finish(errors)?;

    if let Some(title) = title {
        item.title = title;
    }
    if let Some(is_checked) = request.is_checked {
        item.is_checked = is_checked;
    }
    item.updated_at = Utc::now();

    let mut batch = WriteBatch::new();
    access.guard(&mut batch);
    batch.replace(&item)?;
    state.repository.commit(batch).await?;
    item.version += 1;
    Ok(Json(item))
}

/// Deletes a checklist item.
///
/// # Errors
///
/// Returns 403 without Manage on the task.
pub async fn delete_item(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<ChecklistItem>> {
    let (item, access) = load_item(&state, user.id, &id, TaskPermission::Manage).await?;

    let mut batch = WriteBatch::new();
    access.guard(&mut batch);
    batch.delete::<ChecklistItem>(item.id);
    batch.increment::<Checklist>(item.checklist, Checklist::ITEM_COUNT, -1);
    state.repository.commit(batch).await?;
    Ok(Json(item))
}

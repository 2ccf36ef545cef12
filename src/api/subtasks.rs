//! Sub-task handlers.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;

use super::access::TaskAccess;
use super::dto::{finish, optional_text, parse_id, required_text};
use super::error::{ApiErrorResponse, ApiResult, ValidationError};
use super::extract::AuthUser;
use super::handlers::AppState;
use super::listing::{ListParams, ListResponse};
use crate::domain::{SubTask, SubTaskId, Task, TaskPermission, UserId};
use crate::infrastructure::{Filter, Query as StoreQuery, Sort, SortDirection, SortKind, WriteBatch};

const TEXT_MAX_LENGTH: usize = 200;

/// Loads a sub-task and resolves access to its task.
async fn load_sub_task(
    state: &AppState,
    user: UserId,
    id: &str,
    required: TaskPermission,
) -> ApiResult<(SubTask, TaskAccess)> {
    let id: SubTaskId = parse_id("sub_task_id", id)?;
    let sub_task = state
        .repository
        .get::<SubTask>(id)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found("Sub-task not found"))?;
    let access = TaskAccess::resolve(&state.repository, user, sub_task.task, required).await?;
    Ok((sub_task, access))
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubTaskRequest {
    pub text: String,
}

/// Adds a sub-task to a task I manage.
///
/// # Errors
///
/// - 400 on validation errors
/// - 403 without Manage on the task
/// - 404 when the task is not visible
pub async fn create_sub_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<String>,
    Json(request): Json<CreateSubTaskRequest>,
) -> ApiResult<(StatusCode, Json<SubTask>)> {
    let mut errors = ValidationError::default();
    let text = required_text(&mut errors, "text", &request.text, TEXT_MAX_LENGTH);
    finish(errors)?;
    let access = TaskAccess::resolve(
        &state.repository,
        user.id,
        parse_id("task_id", &task_id)?,
        TaskPermission::Manage,
    )
    .await?;

    let sub_task = SubTask::new(SubTaskId::generate(), access.task.id, text, Utc::now());
    let mut batch = WriteBatch::new();
    access.guard(&mut batch);
    batch.insert(&sub_task)?;
    batch.increment::<Task>(access.task.id, Task::SUB_TASK_COUNT, 1);
    state.repository.commit(batch).await?;
    Ok((StatusCode::CREATED, Json(sub_task)))
}

/// Lists the sub-tasks of a task in creation order.
///
/// # Errors
///
/// Returns 404 when the task is not visible.
pub async fn list_sub_tasks(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(task_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ListResponse<SubTask>>> {
    let access = TaskAccess::resolve(
        &state.repository,
        user.id,
        parse_id("task_id", &task_id)?,
        TaskPermission::View,
    )
    .await?;
    let params = ListParams::parse(params, &[])?;
    let query = StoreQuery::new(Filter::eq("task", access.task.id))
        .sorted_by(Sort::new(
            "created_at",
            SortKind::Timestamp,
            SortDirection::Ascending,
        ))
        .paginate(params.pagination());
    Ok(Json(ListResponse::from(
        state.repository.find::<SubTask>(&query).await?,
    )))
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateSubTaskRequest {
    pub text: Option<String>,
    pub is_checked: Option<bool>,
}

/// Edits or ticks a sub-task.
///
/// Ticking needs the right to update the task status; changing the text
/// needs Manage.
///
/// # Errors
///
/// - 400 on validation errors
/// - 403 when the permission is insufficient for the change
pub async fn update_sub_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateSubTaskRequest>,
) -> ApiResult<Json<SubTask>> {
    let required = if request.text.is_some() {
        TaskPermission::Manage
    } else {
        TaskPermission::UpdateStatus
    };
    let (mut sub_task, access) = load_sub_task(&state, user.id, &id, required).await?;

    let mut errors = ValidationError::default();
    let text = optional_text(&mut errors, "text", request.text.as_deref(), TEXT_MAX_LENGTH);
    finish(errors)?;

    if let Some(text) = text {
        sub_task.text = text;
    }
    if let Some(is_checked) = request.is_checked {
        sub_task.is_checked = is_checked;
    }
    sub_task.updated_at = Utc::now();

    let mut batch = WriteBatch::new();
    access.guard(&mut batch);
    batch.replace(&sub_task)?;
    state.repository.commit(batch).await?;
    sub_task.version += 1;
    Ok(Json(sub_task))
}

/// Deletes a sub-task of a task I manage.
///
/// # Errors
///
/// Returns 403 without Manage on the task.
pub async fn delete_sub_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<SubTask>> {
    let (sub_task, access) = load_sub_task(&state, user.id, &id, TaskPermission::Manage).await?;

    let mut batch = WriteBatch::new();
    access.guard(&mut batch);
    batch.delete::<SubTask>(sub_task.id);
    batch.increment::<Task>(sub_task.task, Task::SUB_TASK_COUNT, -1);
    state.repository.commit(batch).await?;
    Ok(Json(sub_task))
}

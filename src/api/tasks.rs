//! Task handlers.
//!
//! A project task is managed by the project's owner and leads; plain members
//! may only move its status. A personal task belongs to its creator.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;

use super::access::{ProjectAccess, TaskAccess};
use super::comments::list_for_target;
use super::dto::{date_field, finish, nullable, optional_text, parse_id, patch_date, required_text};
use super::error::{ApiErrorResponse, ApiResult, ValidationError};
use super::extract::AuthUser;
use super::handlers::AppState;
use super::listing::{ListParams, ListResponse};
use super::notifications::notify;
use crate::domain::{
    Comment, Priority, Project, ProjectId, ProjectRole, SystemNotice, Tag, TagId, TargetType,
    Task, TaskId, TaskPermission, TaskStatus, User, UserId, validate_schedule,
};
use crate::infrastructure::{Filter, Query as StoreQuery, Sort, WriteBatch};

const TITLE_MAX_LENGTH: usize = 100;
const DESCRIPTION_MAX_LENGTH: usize = 2000;

/// Query keys accepted by `GET /tasks` and `GET /users/me/tasks`.
const TASK_LIST_KEYS: [&str; 9] = [
    "search",
    "task_status",
    "priority",
    "project_id",
    "assignee_id",
    "start_after",
    "start_before",
    "due_after",
    "due_before",
];

/// Builds the filter shared by every task list from its query keys.
///
/// # Errors
///
/// Returns 400 when a value is malformed.
pub fn task_filter(params: &ListParams) -> ApiResult<Filter> {
    let mut filter = params.search(&["title", "description"]);
    if let Some(status) = params.choice::<TaskStatus>("task_status")? {
        filter = filter.and(Filter::eq("status", status));
    }
    if let Some(priority) = params.choice::<Priority>("priority")? {
        filter = filter.and(Filter::eq("priority", priority));
    }
    if let Some(project) = params.parsed::<ProjectId>("project_id")? {
        filter = filter.and(Filter::eq("project", project));
    }
    if let Some(assignee) = params.parsed::<UserId>("assignee_id")? {
        filter = filter.and(Filter::eq("assignee", assignee));
    }
    Ok(filter
        .and(params.date_range("start_at", "start")?)
        .and(params.date_range("due_at", "due")?))
}

/// Default ordering of task lists.
#[must_use]
pub fn task_sort() -> Sort {
    Sort::newest_first("created_at")
}

fn task_id(value: &str) -> ApiResult<TaskId> {
    parse_id("task_id", value)
}

/// Loads the tags named by `ids` and checks each may be attached to `task`.
async fn resolve_tags(state: &AppState, task: &Task, ids: &[String]) -> ApiResult<Vec<TagId>> {
    let mut ids = ids
        .iter()
        .map(|id| parse_id::<TagId>("tag_ids", id))
        .collect::<ApiResult<Vec<_>>>()?;
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Ok(ids);
    }

    let tags = state
        .repository
        .find_all::<Tag>(Filter::is_in("id", &ids))
        .await?;
    if let Some(missing) = ids.iter().find(|id| !tags.iter().any(|tag| tag.id == **id)) {
        return Err(ValidationError::single("tag_ids", format!("Tag {missing} not found")).into());
    }
    if let Some(tag) = tags.iter().find(|tag| !tag.applies_to(task)) {
        return Err(ValidationError::single(
            "tag_ids",
            format!("Tag {} cannot be used on this task", tag.id),
        )
        .into());
    }
    Ok(ids)
}

/// Checks `assignee` can hold a task of `project` and guards the membership
/// until commit.
async fn check_assignee(
    state: &AppState,
    project: &Project,
    assignee: UserId,
    batch: &mut WriteBatch,
) -> ApiResult<()> {
    let live = state
        .repository
        .get::<User>(assignee)
        .await?
        .is_some_and(|user| !user.is_deleted);
    if !live || !project.is_member(assignee) {
        return Err(ValidationError::single(
            "assignee_id",
            "Assignee must be a member of the project",
        )
        .into());
    }
    batch.require::<Project>(project.id, Filter::contains("members", assignee));
    batch.require::<User>(assignee, Filter::eq("is_deleted", false));
    Ok(())
}

fn check_effort(errors: &mut ValidationError, effort: Option<f64>) {
    if effort.is_some_and(|effort| !effort.is_finite() || effort < 0.0) {
        errors.push("effort", "effort must be a non-negative number");
    }
}

fn check_description(errors: &mut ValidationError, description: Option<&str>) {
    if description.is_some_and(|text| text.trim().chars().count() > DESCRIPTION_MAX_LENGTH) {
        errors.push(
            "description",
            format!("description must be at most {DESCRIPTION_MAX_LENGTH} characters"),
        );
    }
}

// =============================================================================
// POST /tasks
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub effort: Option<f64>,
    pub project_id: Option<String>,
    pub assignee_id: Option<String>,
    pub start_at: Option<String>,
    pub due_at: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub tag_ids: Vec<String>,
}

/// Creates a personal task, or a project task when `project_id` is given.
///
/// # Request Body
///
/// ```json
/// {
///   "title": "Write release notes",
///   "priority": "High",
///   "project_id": "0190...",
///   "assignee_id": "0190...",
///   "due_at": "2026-06-01"
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: Task created
/// - **400 Bad Request**: Validation error, non-member assignee, or a tag
///   from another scope
/// - **403 Forbidden**: Plain members cannot create project tasks
/// - **404 Not Found**: Project missing or not accessible
///
/// # Errors
///
/// See the responses above.
pub async fn create_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let mut errors = ValidationError::default();
    let title = required_text(&mut errors, "title", &request.title, TITLE_MAX_LENGTH);
    check_description(&mut errors, request.description.as_deref());
    check_effort(&mut errors, request.effort);
    let start_at = date_field(&mut errors, "start_at", request.start_at.as_deref());
    let due_at = date_field(&mut errors, "due_at", request.due_at.as_deref());
    finish(errors)?;
    validate_schedule(start_at, due_at)?;

    let assignee = request
        .assignee_id
        .as_deref()
        .map(|id| parse_id::<UserId>("assignee_id", id))
        .transpose()?;
    let now = Utc::now();
    let mut task = Task::new(TaskId::generate(), user.id, title, now);
    let mut batch = WriteBatch::new();

    let project = match request.project_id.as_deref() {
        Some(project_id) => {
            let project_id: ProjectId = parse_id("project_id", project_id)?;
            let access =
                ProjectAccess::resolve(&state.repository, user.id, project_id, ProjectRole::Lead)
                    .await?;
            if let Some(assignee) = assignee {
                check_assignee(&state, &access.project, assignee, &mut batch).await?;
            }
            access.guard(&mut batch);
            task = task.in_project(project_id, assignee);
            Some(access.project)
        }
        None => {
            if assignee.is_some_and(|assignee| assignee != user.id) {
                return Err(ValidationError::single(
                    "assignee_id",
                    "A personal task is always assigned to its creator",
                )
                .into());
            }
            None
        }
    };

    task.description = request.description.unwrap_or_default().trim().to_string();
    task.status = request.status.unwrap_or_default();
    task.priority = request.priority.unwrap_or_default();
    task.effort = request.effort.unwrap_or_default();
    task.start_at = start_at;
    task.due_at = due_at;
    task.files = request.files;
    task.tags = resolve_tags(&state, &task, &request.tag_ids).await?;

    batch.insert(&task)?;
    if let Some(project) = &project {
        batch.increment::<Project>(project.id, Project::TASK_COUNT, 1);
    }
    if let Some(assignee) = task.assignee {
        batch.increment::<User>(assignee, User::TASK_COUNT, 1);
        if assignee != user.id {
            notify(
                &mut batch,
                &SystemNotice::TaskAssigned {
                    task: &task,
                    assigner: &user,
                },
                assignee,
                now,
            )?;
        }
    }
    state.repository.commit(batch).await?;

    tracing::info!(task = %task.id, project = ?task.project, assignee = ?task.assignee, "Task created");
    Ok((StatusCode::CREATED, Json(task)))
}

// =============================================================================
// GET /tasks, GET /users/me/tasks
// =============================================================================

/// Lists the live tasks I can see: my personal tasks and the tasks of live
/// projects I belong to.
///
/// # Errors
///
/// Returns 400 for unknown keys or malformed values.
pub async fn list_tasks(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ListResponse<Task>>> {
    let params = ListParams::parse(params, &TASK_LIST_KEYS)?;
    let projects = state
        .repository
        .find_all::<Project>(
            Filter::eq("is_deleted", false).and(Filter::contains("members", user.id)),
        )
        .await?;

    let visible = Filter::Or(vec![
        Filter::eq("project", serde_json::Value::Null).and(Filter::eq("created_by", user.id)),
        Filter::is_in("project", projects.iter().map(|project| project.id)),
    ]);
    let filter = Filter::eq("is_deleted", false)
        .and(visible)
        .and(task_filter(&params)?);
    let query = StoreQuery::new(filter)
        .sorted_by(task_sort())
        .paginate(params.pagination());
    Ok(Json(ListResponse::from(
        state.repository.find::<Task>(&query).await?,
    )))
}

/// Lists the live tasks assigned to me.
///
/// # Errors
///
/// Returns 400 for unknown keys or malformed values.
pub async fn list_my_tasks(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ListResponse<Task>>> {
    let params = ListParams::parse(
        params,
        &TASK_LIST_KEYS
            .into_iter()
            .filter(|key| *key != "assignee_id")
            .collect::<Vec<_>>(),
    )?;
    let filter = Filter::eq("is_deleted", false)
        .and(Filter::eq("assignee", user.id))
        .and(task_filter(&params)?);
    let query = StoreQuery::new(filter)
        .sorted_by(task_sort())
        .paginate(params.pagination());
    Ok(Json(ListResponse::from(
        state.repository.find::<Task>(&query).await?,
    )))
}

// =============================================================================
// GET /tasks/{id}
// =============================================================================

/// Returns a task I can see.
///
/// # Errors
///
/// Returns 404 when the task is missing or not visible.
pub async fn get_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    let access =
        TaskAccess::resolve(&state.repository, user.id, task_id(&id)?, TaskPermission::View)
            .await?;
    Ok(Json(access.task))
}

// =============================================================================
// PUT /tasks/{id}
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<Priority>,
    pub effort: Option<f64>,
    #[serde(default, deserialize_with = "nullable")]
    pub assignee_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub start_at: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_at: Option<Option<String>>,
    pub files: Option<Vec<String>>,
    pub tag_ids: Option<Vec<String>>,
}

impl UpdateTaskRequest {
    /// Returns true if the request touches anything besides the status.
    fn edits_details(&self) -> bool {
        self.title.is_some()
            || self.description.is_some()
            || self.priority.is_some()
            || self.effort.is_some()
            || self.assignee_id.is_some()
            || self.start_at.is_some()
            || self.due_at.is_some()
            || self.files.is_some()
            || self.tag_ids.is_some()
    }
}

/// Edits a task.
///
/// Members of the task's project may change the status only; every other
/// field needs the owner or a lead. Reassigning moves the task counters and
/// notifies the new assignee.
///
/// # Errors
///
/// - 400 on validation errors or an invalid assignee
/// - 403 when editing fields beyond the status without managing the task
/// - 404 when the task is not visible
pub async fn update_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    let access = TaskAccess::resolve(
        &state.repository,
        user.id,
        task_id(&id)?,
        TaskPermission::UpdateStatus,
    )
    .await?;
    if request.edits_details() && !access.can_manage() {
        return Err(ApiErrorResponse::forbidden(
            "Only the project owner or a lead can edit this task",
        ));
    }
    let mut task = access.task.clone();

    let mut errors = ValidationError::default();
    let title = optional_text(&mut errors, "title", request.title.as_deref(), TITLE_MAX_LENGTH);
    check_description(&mut errors, request.description.as_deref());
    check_effort(&mut errors, request.effort);
    let start_at = patch_date(
        &mut errors,
        "start_at",
        task.start_at,
        request.start_at.as_ref().map(Option::as_deref),
    );
    let due_at = patch_date(
        &mut errors,
        "due_at",
        task.due_at,
        request.due_at.as_ref().map(Option::as_deref),
    );
    finish(errors)?;
    validate_schedule(start_at, due_at)?;

    let mut batch = WriteBatch::new();
    access.guard(&mut batch);

    let previous_assignee = task.assignee;
    if let Some(assignee) = &request.assignee_id {
        let assignee = assignee
            .as_deref()
            .map(|id| parse_id::<UserId>("assignee_id", id))
            .transpose()?;
        match &access.project {
            Some(project) => {
                if let Some(assignee) = assignee.filter(|id| Some(*id) != previous_assignee) {
                    check_assignee(&state, project, assignee, &mut batch).await?;
                }
                task.assignee = assignee;
            }
            None if assignee != Some(task.created_by) => {
                return Err(ValidationError::single(
                    "assignee_id",
                    "A personal task is always assigned to its creator",
                )
                .into());
            }
            None => {}
        }
    }

    if let Some(title) = title {
        task.title = title;
    }
    if let Some(description) = &request.description {
        task.description = description.trim().to_string();
    }
    if let Some(status) = request.status {
        task.status = status;
    }
    if let Some(priority) = request.priority {
        task.priority = priority;
    }
    if let Some(effort) = request.effort {
        task.effort = effort;
    }
    if let Some(files) = request.files {
        task.files = files;
    }
    if let Some(tag_ids) = &request.tag_ids {
        task.tags = resolve_tags(&state, &task, tag_ids).await?;
    }
    task.start_at = start_at;
    task.due_at = due_at;
    let now = Utc::now();
    task.updated_at = now;

    batch.replace(&task)?;
    if task.assignee != previous_assignee {
        if let Some(previous) = previous_assignee {
            batch.increment::<User>(previous, User::TASK_COUNT, -1);
        }
        if let Some(assignee) = task.assignee {
            batch.increment::<User>(assignee, User::TASK_COUNT, 1);
            if assignee != user.id {
                notify(
                    &mut batch,
                    &SystemNotice::TaskAssigned {
                        task: &task,
                        assigner: &user,
                    },
                    assignee,
                    now,
                )?;
            }
        }
    }
    state.repository.commit(batch).await?;
    task.version += 1;

    tracing::debug!(task = %task.id, reassigned = task.assignee != previous_assignee, "Task updated");
    Ok(Json(task))
}

// =============================================================================
// DELETE /tasks/{id}
// =============================================================================

/// Soft-deletes a task I manage.
///
/// # Errors
///
/// Returns 403 for plain members and 404 when the task is not visible.
pub async fn delete_task(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Task>> {
    let access =
        TaskAccess::resolve(&state.repository, user.id, task_id(&id)?, TaskPermission::Manage)
            .await?;
    let mut task = access.task.clone();
    task.is_deleted = true;
    task.updated_at = Utc::now();

    let mut batch = WriteBatch::new();
    access.guard(&mut batch);
    batch.replace(&task)?;
    if let Some(project) = task.project {
        batch.increment::<Project>(project, Project::TASK_COUNT, -1);
    }
    if let Some(assignee) = task.assignee {
        batch.increment::<User>(assignee, User::TASK_COUNT, -1);
    }
    state.repository.commit(batch).await?;
    task.version += 1;

    tracing::info!(task = %task.id, "Task deleted");
    Ok(Json(task))
}

// =============================================================================
// GET /tasks/{id}/comments
// =============================================================================

/// Lists the comments on a task I can see.
///
/// # Errors
///
/// Returns 404 when the task is not visible.
pub async fn list_task_comments(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ListResponse<Comment>>> {
    let access =
        TaskAccess::resolve(&state.repository, user.id, task_id(&id)?, TaskPermission::View)
            .await?;
    let comments =
        list_for_target(&state, TargetType::Task, *access.task.id.as_uuid(), params).await?;
    Ok(Json(comments))
}

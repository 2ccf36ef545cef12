//! Project handlers.
//!
//! Membership is resolved once per request through [`ProjectAccess`]. Every
//! write carries the counter adjustments it implies in the same batch.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;

use super::access::ProjectAccess;
use super::comments::list_for_target;
use super::dto::{
    CandidateResponse, UserResponse, date_field, finish, nullable, optional_text, parse_id,
    patch_date, required_text,
};
use super::error::{ApiErrorResponse, ApiResult, ValidationError};
use super::extract::AuthUser;
use super::handlers::AppState;
use super::listing::{ListParams, ListResponse};
use super::notifications::notify;
use super::tasks::{task_filter, task_sort};
use super::users::{USER_SEARCH_FIELDS, load_live_user};
use crate::domain::{
    Comment, Invitation, InvitationId, InvitationStatus, Project, ProjectId, ProjectRole,
    ProjectStatus, SystemNotice, TargetType, Task, User, UserId, validate_schedule,
};
use crate::infrastructure::{
    Filter, Query as StoreQuery, Sort, SortDirection, SortKind, WriteBatch, generate_code,
};

const TITLE_MAX_LENGTH: usize = 100;
const DESCRIPTION_MAX_LENGTH: usize = 1000;

/// Query keys accepted by project lists.
pub const PROJECT_LIST_KEYS: [&str; 8] = [
    "search",
    "current_user_role",
    "project_status",
    "start_after",
    "start_before",
    "due_after",
    "due_before",
    "sort_by",
];

/// Ordering of project lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectSort {
    TitleAsc,
    TitleDesc,
    CreatedAtAsc,
    #[default]
    CreatedAtDesc,
}

impl ProjectSort {
    fn to_sort(self) -> Sort {
        match self {
            Self::TitleAsc => Sort::text("title"),
            Self::TitleDesc => Sort::new("title", SortKind::Text, SortDirection::Descending),
            Self::CreatedAtAsc => {
                Sort::new("created_at", SortKind::Timestamp, SortDirection::Ascending)
            }
            Self::CreatedAtDesc => Sort::newest_first("created_at"),
        }
    }
}

fn project_id(value: &str) -> ApiResult<ProjectId> {
    parse_id("project_id", value)
}

// =============================================================================
// POST /projects
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProjectRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: Option<ProjectStatus>,
    pub start_at: Option<String>,
    pub due_at: Option<String>,
    #[serde(default)]
    pub invitee_ids: Vec<String>,
}

/// Creates a project owned by the current user and invites the listed users.
///
/// # Request Body
///
/// ```json
/// {
///   "title": "Launch",
///   "description": "Ship v1",
///   "status": "Planning",
///   "start_at": "2026-05-01",
///   "due_at": "2026-06-30",
///   "invitee_ids": ["0190..."]
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: Project created
/// - **400 Bad Request**: Validation error, unknown invitee, or self-invite
///
/// # Errors
///
/// See the responses above.
pub async fn create_project(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let mut errors = ValidationError::default();
    let title = required_text(&mut errors, "title", &request.title, TITLE_MAX_LENGTH);
    let description = request.description.trim().to_string();
    if description.chars().count() > DESCRIPTION_MAX_LENGTH {
        errors.push(
            "description",
            format!("description must be at most {DESCRIPTION_MAX_LENGTH} characters"),
        );
    }
    let start_at = date_field(&mut errors, "start_at", request.start_at.as_deref());
    let due_at = date_field(&mut errors, "due_at", request.due_at.as_deref());
    finish(errors)?;
    validate_schedule(start_at, due_at)?;

    let mut invitee_ids = request
        .invitee_ids
        .iter()
        .map(|id| parse_id::<UserId>("invitee_ids", id))
        .collect::<ApiResult<Vec<_>>>()?;
    invitee_ids.sort_unstable();
    invitee_ids.dedup();
    if invitee_ids.contains(&user.id) {
        return Err(ApiErrorResponse::bad_request("You cannot invite yourself"));
    }
    for invitee in &invitee_ids {
        load_live_user(&state, *invitee)
            .await
            .map_err(|_| ApiErrorResponse::bad_request(format!("Invitee {invitee} not found")))?;
    }

    let now = Utc::now();
    let mut project = Project::new(ProjectId::generate(), user.id, title, description, now);
    project.status = request.status.unwrap_or_default();
    project.start_at = start_at;
    project.due_at = due_at;

    let mut batch = WriteBatch::new();
    batch.insert(&project)?;
    batch.increment::<User>(user.id, User::PROJECT_OWN_COUNT, 1);
    batch.increment::<User>(user.id, User::PROJECT_IN_COUNT, 1);
    for invitee in &invitee_ids {
        let invitation = Invitation::new(
            InvitationId::generate(),
            user.id,
            *invitee,
            project.id,
            generate_code(),
            now,
        );
        batch.insert(&invitation)?;
        notify(
            &mut batch,
            &SystemNotice::InvitationReceived {
                project: &project,
                inviter: &user,
            },
            *invitee,
            now,
        )?;
    }
    state.repository.commit(batch).await?;

    tracing::info!(project = %project.id, owner = %user.id, invitees = invitee_ids.len(), "Project created");
    Ok((StatusCode::CREATED, Json(project)))
}

// =============================================================================
// GET /projects
// =============================================================================

/// Lists the live projects I belong to.
///
/// Also serves `GET /users/me/projects`.
///
/// # Query Parameters
///
/// `search`, `current_user_role` (`owner`|`lead`|`member`), `project_status`,
/// `start_after`, `start_before`, `due_after`, `due_before`, `sort_by`
/// (`title_asc`|`title_desc`|`created_at_asc`|`created_at_desc`).
///
/// # Errors
///
/// Returns 400 for unknown keys or malformed values.
pub async fn list_projects(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ListResponse<Project>>> {
    let params = ListParams::parse(params, &PROJECT_LIST_KEYS)?;

    let mut filter = Filter::eq("is_deleted", false)
        .and(Filter::contains("members", user.id))
        .and(params.search(&["title", "description"]));
    if let Some(role) = params.choice::<ProjectRole>("current_user_role")? {
        filter = filter.and(match role {
            ProjectRole::Owner => Filter::eq("owner", user.id),
            ProjectRole::Lead => Filter::contains("leads", user.id),
            ProjectRole::Member => Filter::ne("owner", user.id)
                .and(!Filter::contains("leads", user.id)),
        });
    }
    if let Some(status) = params.choice::<ProjectStatus>("project_status")? {
        filter = filter.and(Filter::eq("status", status));
    }
    filter = filter
        .and(params.date_range("start_at", "start")?)
        .and(params.date_range("due_at", "due")?);
    let sort = params.choice::<ProjectSort>("sort_by")?.unwrap_or_default();

    let query = StoreQuery::new(filter)
        .sorted_by(sort.to_sort())
        .paginate(params.pagination());
    let page = state.repository.find::<Project>(&query).await?;
    Ok(Json(ListResponse::from(page)))
}

// =============================================================================
// GET /projects/{id}
// =============================================================================

/// Returns a project I belong to.
///
/// # Errors
///
/// Returns 404 when the project is missing or I am not a member.
pub async fn get_project(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Project>> {
    let access =
        ProjectAccess::resolve(&state.repository, user.id, project_id(&id)?, ProjectRole::Member)
            .await?;
    Ok(Json(access.project))
}

// =============================================================================
// GET /projects/{id}/members
// =============================================================================

/// Lists the live members of a project, sorted by last name.
///
/// # Errors
///
/// Returns 404 when I am not a member.
pub async fn list_members(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ListResponse<UserResponse>>> {
    let access =
        ProjectAccess::resolve(&state.repository, user.id, project_id(&id)?, ProjectRole::Member)
            .await?;
    let params = ListParams::parse(params, &["search"])?;

    let filter = Filter::is_in("id", &access.project.members)
        .and(Filter::eq("is_deleted", false))
        .and(params.search(&USER_SEARCH_FIELDS));
    let query = StoreQuery::new(filter)
        .sorted_by(Sort::text("last_name"))
        .sorted_by(Sort::text("first_name"))
        .paginate(params.pagination());
    let page = state.repository.find::<User>(&query).await?;
    Ok(Json(ListResponse::from_page(page, |member| UserResponse::from(&member))))
}

// =============================================================================
// PUT /projects/{id}
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateProjectRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProjectStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub start_at: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub due_at: Option<Option<String>>,
}

/// Edits a project I own.
///
/// # Errors
///
/// - 400 on validation errors, including a due date before the start date
/// - 403 when I am not the owner
/// - 404 when I am not a member
pub async fn update_project(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateProjectRequest>,
) -> ApiResult<Json<Project>> {
    let access =
        ProjectAccess::resolve(&state.repository, user.id, project_id(&id)?, ProjectRole::Owner)
            .await?;
    let mut project = access.project.clone();

    let mut errors = ValidationError::default();
    let title = optional_text(&mut errors, "title", request.title.as_deref(), TITLE_MAX_LENGTH);
    let description = request.description.as_deref().map(str::trim);
    if description.is_some_and(|text| text.chars().count() > DESCRIPTION_MAX_LENGTH) {
        errors.push(
            "description",
            format!("description must be at most {DESCRIPTION_MAX_LENGTH} characters"),
        );
    }
    let start_at = patch_date(
        &mut errors,
        "start_at",
        project.start_at,
        request.start_at.as_ref().map(Option::as_deref),
    );
    let due_at = patch_date(
        &mut errors,
        "due_at",
        project.due_at,
        request.due_at.as_ref().map(Option::as_deref),
    );
    finish(errors)?;
    validate_schedule(start_at, due_at)?;

    if let Some(title) = title {
        project.title = title;
    }
    if let Some(description) = description {
        project.description = description.to_string();
    }
    if let Some(status) = request.status {
        project.status = status;
    }
    project.start_at = start_at;
    project.due_at = due_at;
    project.updated_at = Utc::now();

    let mut batch = WriteBatch::new();
    access.guard(&mut batch);
    batch.replace(&project)?;
    state.repository.commit(batch).await?;
    project.version += 1;
    Ok(Json(project))
}

// =============================================================================
// DELETE /projects/{id}
// =============================================================================

/// Soft-deletes a project I own.
///
/// The project's live tasks are soft-deleted with it, open invitations
/// expire, the project leaves every favorites list and the other members
/// are notified.
///
/// # Errors
///
/// - 403 when I am not the owner
/// - 404 when I am not a member
pub async fn delete_project(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Project>> {
    let access =
        ProjectAccess::resolve(&state.repository, user.id, project_id(&id)?, ProjectRole::Owner)
            .await?;
    let mut project = access.project.clone();
    let now = Utc::now();

    let tasks = state
        .repository
        .find_all::<Task>(Filter::eq("project", project.id).and(Filter::eq("is_deleted", false)))
        .await?;
    let invitations = state
        .repository
        .find_all::<Invitation>(
            Filter::eq("project", project.id)
                .and(Filter::eq("status", InvitationStatus::Pending))
                .and(Filter::eq("is_expired", false)),
        )
        .await?;

    let deleted_tasks = tasks.len();
    project.is_deleted = true;
    project.task_count = project.task_count.saturating_sub(u64::try_from(deleted_tasks).unwrap_or(u64::MAX));
    project.updated_at = now;

    let mut batch = WriteBatch::new();
    access.guard(&mut batch);
    batch.replace(&project)?;
    batch.increment::<User>(project.owner, User::PROJECT_OWN_COUNT, -1);
    for member in &project.members {
        batch.increment::<User>(*member, User::PROJECT_IN_COUNT, -1);
    }

    for mut task in tasks {
        task.is_deleted = true;
        task.updated_at = now;
        batch.replace(&task)?;
        if let Some(assignee) = task.assignee {
            batch.increment::<User>(assignee, User::TASK_COUNT, -1);
        }
    }

    for mut invitation in invitations {
        invitation.is_expired = true;
        invitation.updated_at = now;
        batch.replace(&invitation)?;
    }

    batch.pull::<User>(
        Filter::contains("favorite_projects", project.id),
        "favorite_projects",
        project.id,
    );

    let notice = SystemNotice::ProjectDeleted { project: &project };
    for member in project.members.iter().filter(|member| **member != project.owner) {
        notify(&mut batch, &notice, *member, now)?;
    }
    state.repository.commit(batch).await?;
    project.version += 1;

    tracing::info!(project = %project.id, tasks = deleted_tasks, "Project deleted");
    Ok(Json(project))
}

// =============================================================================
// GET /projects/{id}/candidates
// =============================================================================

/// Lists live users who could be invited, each with their current
/// invitation to this project, if any.
///
/// # Errors
///
/// Returns 403 for plain members and 404 for non-members.
pub async fn list_candidates(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ListResponse<CandidateResponse>>> {
    let access =
        ProjectAccess::resolve(&state.repository, user.id, project_id(&id)?, ProjectRole::Lead)
            .await?;
    let params = ListParams::parse(params, &["search"])?;

    let filter = Filter::eq("is_deleted", false).and(params.search(&USER_SEARCH_FIELDS));
    let query = StoreQuery::new(filter)
        .sorted_by(Sort::text("last_name"))
        .sorted_by(Sort::text("first_name"))
        .paginate(params.pagination());
    let page = state.repository.find::<User>(&query).await?;

    let mut invitations: HashMap<UserId, Invitation> = state
        .repository
        .find_all::<Invitation>(
            Filter::eq("project", access.project.id)
                .and(Filter::eq("is_expired", false))
                .and(Filter::is_in("to", page.items.iter().map(|candidate| candidate.id))),
        )
        .await?
        .into_iter()
        .map(|invitation| (invitation.to, invitation))
        .collect();

    Ok(Json(ListResponse::from_page(page, |candidate| CandidateResponse {
        user: UserResponse::from(&candidate),
        invitation: invitations.remove(&candidate.id),
    })))
}

// =============================================================================
// PUT /projects/{id}/members/{member_id}/lead
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SetLeadRequest {
    pub is_lead: bool,
}

/// Promotes a member to lead or demotes a lead.
///
/// # Errors
///
/// - 400 when the target is the owner or not a member
/// - 403 when I am not the owner
/// - 409 when the member already has the requested role
pub async fn set_lead(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, member_id)): Path<(String, String)>,
    Json(request): Json<SetLeadRequest>,
) -> ApiResult<Json<Project>> {
    let access =
        ProjectAccess::resolve(&state.repository, user.id, project_id(&id)?, ProjectRole::Owner)
            .await?;
    let member: UserId = parse_id("member_id", &member_id)?;

    let mut project = access.project.clone();
    project.set_lead(member, request.is_lead)?;
    project.updated_at = Utc::now();

    let mut batch = WriteBatch::new();
    access.guard(&mut batch);
    batch.replace(&project)?;
    state.repository.commit(batch).await?;
    project.version += 1;

    tracing::debug!(project = %project.id, %member, is_lead = request.is_lead, "Lead role changed");
    Ok(Json(project))
}

// =============================================================================
// DELETE /projects/{id}/members/{member_id}
// =============================================================================

/// Removes a member, or leaves the project when `member_id` is myself.
///
/// The owner may remove anyone but themself; other members may only
/// remove themselves. The member's tasks in the project are unassigned and
/// their invitation expires.
///
/// # Errors
///
/// - 400 when the owner tries to leave or the target is not a member
/// - 403 when a non-owner removes someone else
pub async fn remove_member(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, member_id)): Path<(String, String)>,
) -> ApiResult<Json<Project>> {
    let member: UserId = parse_id("member_id", &member_id)?;
    let leaving = member == user.id;
    let required = if leaving {
        ProjectRole::Member
    } else {
        ProjectRole::Owner
    };
    let access =
        ProjectAccess::resolve(&state.repository, user.id, project_id(&id)?, required).await?;

    let mut project = access.project.clone();
    project.remove_member(member)?;
    let now = Utc::now();
    project.updated_at = now;

    let tasks = state
        .repository
        .find_all::<Task>(
            Filter::eq("project", project.id)
                .and(Filter::eq("assignee", member))
                .and(Filter::eq("is_deleted", false)),
        )
        .await?;
    let invitation = state
        .repository
        .find_one::<Invitation>(Filter::eq("project", project.id).and(Filter::eq("to", member)))
        .await?;

    let mut batch = WriteBatch::new();
    access.guard(&mut batch);
    batch.replace(&project)?;
    batch.increment::<User>(member, User::PROJECT_IN_COUNT, -1);

    let unassigned = i64::try_from(tasks.len()).unwrap_or(i64::MAX);
    for mut task in tasks {
        task.assignee = None;
        task.updated_at = now;
        batch.replace(&task)?;
    }
    if unassigned > 0 {
        batch.increment::<User>(member, User::TASK_COUNT, -unassigned);
    }

    if let Some(mut invitation) = invitation.filter(|invitation| !invitation.is_expired) {
        invitation.is_expired = true;
        invitation.updated_at = now;
        batch.replace(&invitation)?;
    }
    batch.pull::<User>(
        Filter::eq("id", member).and(Filter::contains("favorite_projects", project.id)),
        "favorite_projects",
        project.id,
    );
    if !leaving {
        notify(
            &mut batch,
            &SystemNotice::RemovedFromProject { project: &project },
            member,
            now,
        )?;
    }
    state.repository.commit(batch).await?;
    project.version += 1;

    tracing::info!(project = %project.id, %member, leaving, "Member removed");
    Ok(Json(project))
}

// =============================================================================
// GET /projects/{id}/tasks, GET /projects/{id}/comments
// =============================================================================

/// Query keys accepted by `GET /projects/{id}/tasks`.
const PROJECT_TASK_KEYS: [&str; 8] = [
    "search",
    "task_status",
    "priority",
    "assignee_id",
    "start_after",
    "start_before",
    "due_after",
    "due_before",
];

/// Lists the live tasks of a project I belong to.
///
/// # Errors
///
/// Returns 400 for unknown keys and 404 when I am not a member.
pub async fn list_project_tasks(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ListResponse<Task>>> {
    let access =
        ProjectAccess::resolve(&state.repository, user.id, project_id(&id)?, ProjectRole::Member)
            .await?;
    let params = ListParams::parse(params, &PROJECT_TASK_KEYS)?;

    let filter = Filter::eq("project", access.project.id)
        .and(Filter::eq("is_deleted", false))
        .and(task_filter(&params)?);
    let query = StoreQuery::new(filter)
        .sorted_by(task_sort())
        .paginate(params.pagination());
    let page = state.repository.find::<Task>(&query).await?;
    Ok(Json(ListResponse::from(page)))
}

/// Lists the comments on a project I belong to.
///
/// # Errors
///
/// Returns 404 when I am not a member.
pub async fn list_project_comments(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ListResponse<Comment>>> {
    let access =
        ProjectAccess::resolve(&state.repository, user.id, project_id(&id)?, ProjectRole::Member)
            .await?;
    let comments =
        list_for_target(&state, TargetType::Project, *access.project.id.as_uuid(), params).await?;
    Ok(Json(comments))
}

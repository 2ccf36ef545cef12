//! Project invitations.
//!
//! One record per (project, invitee). The transitions live on
//! [`Invitation`]; handlers load, apply and commit.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;

use super::access::ProjectAccess;
use super::dto::parse_id;
use super::error::{ApiErrorResponse, ApiResult};
use super::extract::AuthUser;
use super::handlers::AppState;
use super::listing::{ListParams, ListResponse};
use super::notifications::notify;
use super::users::load_live_user;
use crate::domain::{
    Invitation, InvitationError, InvitationId, InvitationStatus, Project, ProjectId, ProjectRole, SendOutcome,
    SystemNotice, User, UserId,
};
use crate::infrastructure::{Filter, Query as StoreQuery, Sort, WriteBatch, generate_code};

fn between(project: ProjectId, invitee: UserId) -> Filter {
    Filter::eq("project", project).and(Filter::eq("to", invitee))
}

async fn load_invitation(
    state: &AppState,
    project: ProjectId,
    invitee: UserId,
) -> ApiResult<Invitation> {
    state
        .repository
        .find_one::<Invitation>(between(project, invitee))
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found("Invitation not found"))
}

async fn list_where(
    state: &AppState,
    filter: Filter,
    params: HashMap<String, String>,
) -> ApiResult<ListResponse<Invitation>> {
    let params = ListParams::parse(params, &["status"])?;
    let mut filter = filter;
    if let Some(status) = params.choice::<InvitationStatus>("status")? {
        filter = filter.and(Filter::eq("status", status));
    }
    let query = StoreQuery::new(filter)
        .sorted_by(Sort::newest_first("updated_at"))
        .paginate(params.pagination());
    Ok(ListResponse::from(
        state.repository.find::<Invitation>(&query).await?,
    ))
}

// =============================================================================
// POST /projects/{id}/invitations
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SendInvitationRequest {
    pub to: String,
}

/// Invites a live user to a project I own.
///
/// A closed invitation (declined, canceled, expired, or accepted by someone
/// who has since left) is reopened with a new code.
///
/// # Request Body
///
/// ```json
/// { "to": "0190..." }
/// ```
///
/// # Response
///
/// - **201 Created**: New invitation
/// - **200 OK**: Existing invitation reopened
/// - **400 Bad Request**: Self-invite
/// - **404 Not Found**: Unknown invitee
/// - **409 Conflict**: Already pending, or already a member
///
/// # Errors
///
/// See the responses above.
pub async fn send_invitation(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<SendInvitationRequest>,
) -> ApiResult<(StatusCode, Json<Invitation>)> {
    let project_id: ProjectId = parse_id("project_id", &id)?;
    let invitee: UserId = parse_id("to", &request.to)?;
    let access =
        ProjectAccess::resolve(&state.repository, user.id, project_id, ProjectRole::Owner).await?;
    if invitee == user.id {
        return Err(ApiErrorResponse::bad_request("You cannot invite yourself"));
    }
    load_live_user(&state, invitee).await?;

    let existing = state
        .repository
        .find_one::<Invitation>(between(project_id, invitee))
        .await?;
    let outcome = Invitation::plan_send(existing.as_ref(), access.project.is_member(invitee))?;
    let now = Utc::now();

    let mut batch = WriteBatch::new();
    access.guard(&mut batch);
    let (status, invitation) = match (outcome, existing) {
        (SendOutcome::Reopen, Some(mut invitation)) => {
            invitation.reopen(user.id, generate_code(), now);
            batch.replace(&invitation)?;
            invitation.version += 1;
            (StatusCode::OK, invitation)
        }
        _ => {
            let invitation = Invitation::new(
                InvitationId::generate(),
                user.id,
                invitee,
                project_id,
                generate_code(),
                now,
            );
            batch.require_absent::<Invitation>(
                between(project_id, invitee),
                InvitationError::AlreadyPending.to_string(),
            );
            batch.insert(&invitation)?;
            (StatusCode::CREATED, invitation)
        }
    };
    notify(
        &mut batch,
        &SystemNotice::InvitationReceived {
            project: &access.project,
            inviter: &user,
        },
        invitee,
        now,
    )?;
    state.repository.commit(batch).await?;

    tracing::info!(project = %project_id, %invitee, ?outcome, "Invitation sent");
    Ok((status, Json(invitation)))
}

// =============================================================================
// GET /projects/{id}/invitations
// =============================================================================

/// Lists the invitations of a project I own.
///
/// # Errors
///
/// Returns 403 for non-owners and 400 for unknown query keys.
pub async fn list_project_invitations(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ListResponse<Invitation>>> {
    let project_id: ProjectId = parse_id("project_id", &id)?;
    ProjectAccess::resolve(&state.repository, user.id, project_id, ProjectRole::Owner).await?;
    let invitations = list_where(&state, Filter::eq("project", project_id), params).await?;
    Ok(Json(invitations))
}

// =============================================================================
// DELETE /projects/{id}/invitations/{invitee_id}
// =============================================================================

/// Cancels a pending invitation of a project I own.
///
/// # Errors
///
/// - 400 when the invitation is no longer pending
/// - 403 for non-owners
/// - 404 when no invitation exists for the invitee
pub async fn cancel_invitation(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, invitee_id)): Path<(String, String)>,
) -> ApiResult<Json<Invitation>> {
    let project_id: ProjectId = parse_id("project_id", &id)?;
    let invitee: UserId = parse_id("invitee_id", &invitee_id)?;
    let access =
        ProjectAccess::resolve(&state.repository, user.id, project_id, ProjectRole::Owner).await?;

    let mut invitation = load_invitation(&state, project_id, invitee).await?;
    invitation.cancel(Utc::now())?;

    let mut batch = WriteBatch::new();
    access.guard(&mut batch);
    batch.replace(&invitation)?;
    state.repository.commit(batch).await?;
    invitation.version += 1;

    tracing::info!(project = %project_id, %invitee, "Invitation canceled");
    Ok(Json(invitation))
}

// =============================================================================
// PUT /projects/{id}/invitations/{invitee_id}
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RespondInvitationRequest {
    pub status: InvitationStatus,
}

/// Accepts or declines an invitation addressed to me.
///
/// Accepting adds me to the project and notifies the owner.
///
/// # Errors
///
/// - 400 when the invitation is not pending or `status` is not an answer
/// - 403 when `invitee_id` is someone else
/// - 404 when the invitation or the live project is missing
/// - 409 when I am already a member
pub async fn respond_invitation(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((id, invitee_id)): Path<(String, String)>,
    Json(request): Json<RespondInvitationRequest>,
) -> ApiResult<Json<Invitation>> {
    let project_id: ProjectId = parse_id("project_id", &id)?;
    let invitee: UserId = parse_id("invitee_id", &invitee_id)?;
    if invitee != user.id {
        return Err(ApiErrorResponse::forbidden(
            "Only the invitee can respond to this invitation",
        ));
    }

    let mut invitation = load_invitation(&state, project_id, user.id).await?;
    let mut project = state
        .repository
        .get::<Project>(project_id)
        .await?
        .filter(|project| !project.is_deleted)
        .ok_or_else(|| ApiErrorResponse::not_found("Project not found or not accessible"))?;
    let now = Utc::now();
    invitation.respond(request.status, now)?;

    let mut batch = WriteBatch::new();
    if invitation.status == InvitationStatus::Accepted {
        project.add_member(user.id)?;
        project.updated_at = now;
        batch.replace(&project)?;
        batch.increment::<User>(user.id, User::PROJECT_IN_COUNT, 1);
        notify(
            &mut batch,
            &SystemNotice::InvitationAccepted {
                project: &project,
                invitee: &user,
            },
            project.owner,
            now,
        )?;
    } else {
        batch.require::<Project>(project_id, Filter::eq("is_deleted", false));
    }
    batch.replace(&invitation)?;
    state.repository.commit(batch).await?;
    invitation.version += 1;

    tracing::info!(project = %project_id, user = %user.id, status = ?invitation.status, "Invitation answered");
    Ok(Json(invitation))
}

// =============================================================================
// GET /invitations/incoming, GET /invitations/outgoing
// =============================================================================

/// Lists the live invitations addressed to me.
///
/// # Errors
///
/// Returns 400 for unknown query keys.
pub async fn list_incoming(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ListResponse<Invitation>>> {
    let filter = Filter::eq("to", user.id).and(Filter::eq("is_expired", false));
    Ok(Json(list_where(&state, filter, params).await?))
}

/// Lists the live invitations I sent.
///
/// # Errors
///
/// Returns 400 for unknown query keys.
pub async fn list_outgoing(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ListResponse<Invitation>>> {
    let filter = Filter::eq("from", user.id).and(Filter::eq("is_expired", false));
    Ok(Json(list_where(&state, filter, params).await?))
}

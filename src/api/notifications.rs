//! Notification and reminder handlers.
//!
//! Every notification belongs to exactly one recipient. System notifications
//! are written by other handlers through [`notify`]; reminders are scheduled
//! by users for themselves and are delivered once `send_time` has passed.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::access::TargetAccess;
use super::dto::{DeletedResponse, finish, optional_text, parse_date, parse_id, required_text};
use super::error::{ApiErrorResponse, ApiResult, ValidationError};
use super::extract::AuthUser;
use super::handlers::AppState;
use super::listing::{ListParams, ListResponse};
use crate::domain::{
    Notification, NotificationId, NotificationKind, SystemNotice, TargetType, UserId,
};
use crate::infrastructure::{
    Filter, Query as StoreQuery, RepositoryError, Sort, SortDirection, SortKind, WriteBatch,
};

const TITLE_MAX_LENGTH: usize = 200;
const MESSAGE_MAX_LENGTH: usize = 2000;

/// Queues a system notification for `recipient`, replacing any identical one.
///
/// # Errors
///
/// Returns `SerializationError` if the notification cannot be encoded.
pub fn notify(
    batch: &mut WriteBatch,
    notice: &SystemNotice<'_>,
    recipient: UserId,
    now: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    let notification = notice.to_notification(NotificationId::generate(), recipient, now);
    batch.delete_where::<Notification>(Filter::all_of([
        Filter::eq("recipient", recipient),
        Filter::eq("kind", NotificationKind::System),
        Filter::eq("title", &notification.title),
        Filter::eq("message", &notification.message),
        Filter::eq("target_type", notification.target_type),
        Filter::eq("target_id", notification.target_id),
    ]));
    batch.insert(&notification)
}

fn delivered_to(user: UserId, now: DateTime<Utc>) -> Filter {
    Filter::eq("recipient", user).and(Filter::before("send_time", now))
}

async fn load_own(
    state: &AppState,
    user: UserId,
    id: &str,
    kind: Option<NotificationKind>,
) -> ApiResult<Notification> {
    let id: NotificationId = parse_id("notification_id", id)?;
    state
        .repository
        .get::<Notification>(id)
        .await?
        .filter(|notification| notification.recipient == user)
        .filter(|notification| kind.is_none_or(|kind| notification.kind == kind))
        .ok_or_else(|| {
            ApiErrorResponse::not_found(match kind {
                Some(NotificationKind::User) => "Reminder not found",
                _ => "Notification not found",
            })
        })
}

// =============================================================================
// GET /notifications
// =============================================================================

/// Lists delivered notifications, newest first.
///
/// # Query Parameters
///
/// `is_read`, `kind` (`system`|`user`), `target_type` (`Task`|`Project`),
/// `page`, `limit`.
///
/// # Errors
///
/// Returns 400 for unknown keys or malformed values.
pub async fn list_notifications(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ListResponse<Notification>>> {
    let params = ListParams::parse(params, &["is_read", "kind", "target_type"])?;

    let mut filter = delivered_to(user.id, Utc::now());
    if let Some(is_read) = params.parsed::<bool>("is_read")? {
        filter = filter.and(Filter::eq("is_read", is_read));
    }
    if let Some(kind) = params.choice::<NotificationKind>("kind")? {
        filter = filter.and(Filter::eq("kind", kind));
    }
    if let Some(target_type) = params.choice::<TargetType>("target_type")? {
        filter = filter.and(Filter::eq("target_type", target_type));
    }

    let query = StoreQuery::new(filter)
        .sorted_by(Sort::newest_first("send_time"))
        .paginate(params.pagination());
    let page = state.repository.find::<Notification>(&query).await?;
    Ok(Json(ListResponse::from(page)))
}

// =============================================================================
// PUT /notifications/{id}
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct MarkReadRequest {
    pub is_read: bool,
}

/// Marks one of my notifications as read or unread.
///
/// # Errors
///
/// Returns 404 when the notification is not mine.
pub async fn update_notification(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<MarkReadRequest>,
) -> ApiResult<Json<Notification>> {
    let mut notification = load_own(&state, user.id, &id, None).await?;
    if notification.is_read != request.is_read {
        notification.is_read = request.is_read;
        notification.updated_at = Utc::now();

        let mut batch = WriteBatch::new();
        batch.replace(&notification)?;
        state.repository.commit(batch).await?;
        notification.version += 1;
    }
    Ok(Json(notification))
}

// =============================================================================
// PUT /notifications
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct MarkAllRequest {
    pub is_read: bool,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Marks every delivered notification of mine and returns the requested page.
///
/// # Errors
///
/// Returns 400 for a malformed page and 409 when a notification changes
/// concurrently.
pub async fn update_all_notifications(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<MarkAllRequest>,
) -> ApiResult<Json<ListResponse<Notification>>> {
    let params = ListParams::from_body(request.page, request.limit)?;
    let now = Utc::now();

    let stale = state
        .repository
        .find_all::<Notification>(
            delivered_to(user.id, now).and(Filter::ne("is_read", request.is_read)),
        )
        .await?;

    let mut batch = WriteBatch::new();
    for mut notification in stale {
        notification.is_read = request.is_read;
        notification.updated_at = now;
        batch.replace(&notification)?;
    }
    let marked = batch.len();
    state.repository.commit(batch).await?;
    tracing::debug!(user = %user.id, marked, "Marked notifications");

    let query = StoreQuery::new(delivered_to(user.id, now))
        .sorted_by(Sort::newest_first("send_time"))
        .paginate(params.pagination());
    let page = state.repository.find::<Notification>(&query).await?;
    Ok(Json(ListResponse::from(page)))
}

// =============================================================================
// DELETE /notifications/{id}
// =============================================================================

/// Deletes one of my notifications.
///
/// # Errors
///
/// Returns 404 when the notification is not mine.
pub async fn delete_notification(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Notification>> {
    let notification = load_own(&state, user.id, &id, None).await?;
    let mut batch = WriteBatch::new();
    batch.delete::<Notification>(notification.id);
    state.repository.commit(batch).await?;
    Ok(Json(notification))
}

// =============================================================================
// DELETE /notifications
// =============================================================================

/// Deletes my delivered notifications, optionally only read or unread ones.
///
/// # Errors
///
/// Returns 400 for unknown keys or a malformed `is_read`.
pub async fn delete_notifications(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<DeletedResponse>> {
    let params = ListParams::parse(params, &["is_read"])?;
    let mut filter = delivered_to(user.id, Utc::now());
    if let Some(is_read) = params.parsed::<bool>("is_read")? {
        filter = filter.and(Filter::eq("is_read", is_read));
    }

    let mut batch = WriteBatch::new();
    batch.delete_where::<Notification>(filter);
    let outcome = state.repository.commit(batch).await?;
    Ok(Json(DeletedResponse {
        deleted: outcome.deleted,
    }))
}

// =============================================================================
// Reminders
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CreateReminderRequest {
    pub title: String,
    pub message: String,
    pub target_type: TargetType,
    pub target_id: String,
    pub send_time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateReminderRequest {
    pub title: Option<String>,
    pub message: Option<String>,
    pub send_time: Option<String>,
}

/// Schedules a reminder about a task or project I can see.
///
/// # Request Body
///
/// ```json
/// {
///   "title": "Stand-up",
///   "message": "Prepare the demo",
///   "target_type": "Task",
///   "target_id": "0190...",
///   "send_time": "2026-05-01T09:00:00Z"
/// }
/// ```
///
/// # Response
///
/// - **201 Created**: Reminder scheduled
/// - **400 Bad Request**: Validation error
/// - **404 Not Found**: Target missing or not visible
///
/// # Errors
///
/// See the responses above.
pub async fn create_reminder(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateReminderRequest>,
) -> ApiResult<(StatusCode, Json<Notification>)> {
    let mut errors = ValidationError::default();
    let title = required_text(&mut errors, "title", &request.title, TITLE_MAX_LENGTH);
    let message = required_text(&mut errors, "message", &request.message, MESSAGE_MAX_LENGTH);
    let send_time = parse_date("send_time", &request.send_time)
        .map_err(|error| errors.errors.extend(error.errors))
        .ok();
    finish(errors)?;
    let target_id: Uuid = parse_id("target_id", &request.target_id)?;

    let target =
        TargetAccess::resolve(&state.repository, user.id, request.target_type, target_id).await?;

    let now = Utc::now();
    let reminder = Notification::reminder(
        NotificationId::generate(),
        user.id,
        title,
        message,
        request.target_type,
        target_id,
        send_time.unwrap_or(now),
        now,
    );

    let mut batch = WriteBatch::new();
    target.guard(&mut batch);
    batch.insert(&reminder)?;
    state.repository.commit(batch).await?;

    tracing::info!(reminder = %reminder.id, user = %user.id, "Reminder scheduled");
    Ok((StatusCode::CREATED, Json(reminder)))
}

/// Lists my reminders, including those not yet delivered, by send time.
///
/// # Errors
///
/// Returns 400 for unknown keys.
pub async fn list_reminders(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<ListResponse<Notification>>> {
    let params = ListParams::parse(params, &[])?;
    let filter =
        Filter::eq("recipient", user.id).and(Filter::eq("kind", NotificationKind::User));
    let query = StoreQuery::new(filter)
        .sorted_by(Sort::new(
            "send_time",
            SortKind::Timestamp,
            SortDirection::Ascending,
        ))
        .paginate(params.pagination());
    let page = state.repository.find::<Notification>(&query).await?;
    Ok(Json(ListResponse::from(page)))
}

/// Edits one of my reminders. Moving the send time marks it unread again.
///
/// # Errors
///
/// Returns 404 when the reminder is not mine and 400 on validation errors.
pub async fn update_reminder(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateReminderRequest>,
) -> ApiResult<Json<Notification>> {
    let mut reminder = load_own(&state, user.id, &id, Some(NotificationKind::User)).await?;

    let mut errors = ValidationError::default();
    let title = optional_text(&mut errors, "title", request.title.as_deref(), TITLE_MAX_LENGTH);
    let message = optional_text(
        &mut errors,
        "message",
        request.message.as_deref(),
        MESSAGE_MAX_LENGTH,
    );
    let send_time = request
        .send_time
        .as_deref()
        .and_then(|value| {
            parse_date("send_time", value)
                .map_err(|error| errors.errors.extend(error.errors))
                .ok()
        });
    finish(errors)?;

    if let Some(title) = title {
        reminder.title = title;
    }
    if let Some(message) = message {
        reminder.message = message;
    }
    if let Some(send_time) = send_time {
        reminder.send_time = send_time;
        reminder.is_read = false;
    }
    reminder.updated_at = Utc::now();

    let mut batch = WriteBatch::new();
    batch.replace(&reminder)?;
    state.repository.commit(batch).await?;
    reminder.version += 1;
    Ok(Json(reminder))
}

/// Deletes one of my reminders.
///
/// # Errors
///
/// Returns 404 when the reminder is not mine.
pub async fn delete_reminder(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Notification>> {
    let reminder = load_own(&state, user.id, &id, Some(NotificationKind::User)).await?;
    let mut batch = WriteBatch::new();
    batch.delete::<Notification>(reminder.id);
    state.repository.commit(batch).await?;
    Ok(Json(reminder))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Project, ProjectId, User};
    use crate::infrastructure::{InMemoryDocumentStore, Repository};
    use rstest::rstest;
    use std::sync::Arc;

    #[rstest]
    #[tokio::test]
    async fn test_notify_replaces_identical_notification() {
        let repository = Repository::new(Arc::new(InMemoryDocumentStore::new()));
        let owner = User::new(UserId::generate(), "Ada", "Lovelace", "ada@x.io", Utc::now());
        let project = Project::new(ProjectId::generate(), owner.id, "Engine", "", Utc::now());
        let recipient = UserId::generate();
        let notice = SystemNotice::ProjectDeleted { project: &project };

        for _ in 0..2 {
            let mut batch = WriteBatch::new();
            notify(&mut batch, &notice, recipient, Utc::now()).unwrap();
            repository.commit(batch).await.unwrap();
        }

        let count = repository
            .count::<Notification>(&Filter::eq("recipient", recipient))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}

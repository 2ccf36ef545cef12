//! Per-request authorization.
//!
//! Each handler resolves access once, at the start of the request, through
//! [`ProjectAccess::resolve`] or [`TaskAccess::resolve`]. The loaded
//! documents are reused for the rest of the request, and `guard` registers
//! commit-time checks so that a membership revoked mid-request aborts the
//! write instead of racing it.

use uuid::Uuid;

use super::error::{ApiErrorResponse, ApiResult};
use crate::domain::{
    Project, ProjectId, ProjectRole, TargetType, Task, TaskId, TaskPermission, UserId,
    role_satisfies, task_permission,
};
use crate::infrastructure::{Filter, Repository, WriteBatch};

const PROJECT_NOT_FOUND: &str = "Project not found or not accessible";
const TASK_NOT_FOUND: &str = "Task not found or not accessible";

/// Filter matching live projects in which `user` holds at least `role`.
pub fn project_role_filter(user: UserId, role: ProjectRole) -> Filter {
    let holds_role = match role {
        ProjectRole::Owner => Filter::eq("owner", user),
        ProjectRole::Lead => Filter::Or(vec![
            Filter::eq("owner", user),
            Filter::contains("leads", user),
        ]),
        ProjectRole::Member => Filter::contains("members", user),
    };
    Filter::eq("is_deleted", false).and(holds_role)
}

// =============================================================================
// Project Access
// =============================================================================

/// A live project the acting user holds at least the required role in.
#[derive(Debug, Clone)]
pub struct ProjectAccess {
    pub project: Project,
    user: UserId,
    required: ProjectRole,
}

impl ProjectAccess {
    /// Loads the project and checks that `user` holds at least `required`.
    ///
    /// # Errors
    ///
    /// - 404 when the project is missing, deleted or `user` is not a member
    /// - 403 when the user's role is below `required`
    pub async fn resolve(
        repository: &Repository,
        user: UserId,
        project_id: ProjectId,
        required: ProjectRole,
    ) -> ApiResult<Self> {
        let project = repository
            .get::<Project>(project_id)
            .await?
            .filter(|project| !project.is_deleted)
            .ok_or_else(|| ApiErrorResponse::not_found(PROJECT_NOT_FOUND))?;
        let role = project
            .role_of(user)
            .ok_or_else(|| ApiErrorResponse::not_found(PROJECT_NOT_FOUND))?;

        if !role_satisfies(role, required) {
            tracing::debug!(%user, project = %project.id, ?role, ?required, "Project role too low");
            return Err(ApiErrorResponse::forbidden(match required {
                ProjectRole::Owner => "Only the project owner can perform this action",
                ProjectRole::Lead | ProjectRole::Member => {
                    "Only the project owner or a lead can perform this action"
                }
            }));
        }

        Ok(Self {
            project,
            user,
            required,
        })
    }

    /// Fails the batch if the project is deleted or the user loses the
    /// required role before it commits.
    pub fn guard(&self, batch: &mut WriteBatch) {
        batch.require::<Project>(self.project.id, project_role_filter(self.user, self.required));
    }
}

// =============================================================================
// Task Access
// =============================================================================

/// A live task, its live project (if any) and the acting user's permission.
#[derive(Debug, Clone)]
pub struct TaskAccess {
    pub task: Task,
    pub project: Option<Project>,
    pub permission: TaskPermission,
    user: UserId,
}

impl TaskAccess {
    /// Loads the task, and its project for project tasks, exactly once.
    ///
    /// # Errors
    ///
    /// - 404 when the task is missing, deleted or invisible to `user`
    /// - 403 when the user's permission is below `required`
    pub async fn resolve(
        repository: &Repository,
        user: UserId,
        task_id: TaskId,
        required: TaskPermission,
    ) -> ApiResult<Self> {
        let task = repository
            .get::<Task>(task_id)
            .await?
            .filter(|task| !task.is_deleted)
            .ok_or_else(|| ApiErrorResponse::not_found(TASK_NOT_FOUND))?;

        let project = match task.project {
            Some(project_id) => repository
                .get::<Project>(project_id)
                .await?
                .filter(|project| !project.is_deleted),
            None => None,
        };

        let permission = task_permission(&task, project.as_ref(), user)
            .ok_or_else(|| ApiErrorResponse::not_found(TASK_NOT_FOUND))?;

        if permission < required {
            tracing::debug!(%user, task = %task.id, ?permission, ?required, "Task permission too low");
            return Err(ApiErrorResponse::forbidden(
                "You do not have permission to perform this action on this task",
            ));
        }

        Ok(Self {
            task,
            project,
            permission,
            user,
        })
    }

    /// Returns true if the user may edit every field of the task.
    #[must_use]
    pub fn can_manage(&self) -> bool {
        self.permission >= TaskPermission::Manage
    }

    /// Fails the batch if the task is deleted or, for project tasks, the
    /// user loses the role behind the current permission.
    pub fn guard(&self, batch: &mut WriteBatch) {
        batch.require::<Task>(self.task.id, Filter::eq("is_deleted", false));
        if let Some(project) = &self.project {
            let role = if self.can_manage() {
                ProjectRole::Lead
            } else {
                ProjectRole::Member
            };
            batch.require::<Project>(project.id, project_role_filter(self.user, role));
        }
    }
}

// =============================================================================
// Target Access
// =============================================================================

/// Read access to the task or project a comment or reminder points at.
#[derive(Debug, Clone)]
pub enum TargetAccess {
    Task(TaskAccess),
    Project(ProjectAccess),
}

impl TargetAccess {
    /// Requires View on a task target or membership of a project target.
    ///
    /// # Errors
    ///
    /// Same as [`TaskAccess::resolve`] and [`ProjectAccess::resolve`].
    pub async fn resolve(
        repository: &Repository,
        user: UserId,
        target_type: TargetType,
        target_id: Uuid,
    ) -> ApiResult<Self> {
        match target_type {
            TargetType::Task => TaskAccess::resolve(
                repository,
                user,
                TaskId::from_uuid(target_id),
                TaskPermission::View,
            )
            .await
            .map(Self::Task),
            TargetType::Project => ProjectAccess::resolve(
                repository,
                user,
                ProjectId::from_uuid(target_id),
                ProjectRole::Member,
            )
            .await
            .map(Self::Project),
        }
    }

    pub fn guard(&self, batch: &mut WriteBatch) {
        match self {
            Self::Task(access) => access.guard(batch),
            Self::Project(access) => access.guard(batch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::InMemoryDocumentStore;
    use axum::http::StatusCode;
    use chrono::Utc;
    use rstest::rstest;
    use std::sync::Arc;

    struct Fixture {
        repository: Repository,
        project: Project,
        owner: UserId,
        lead: UserId,
        member: UserId,
    }

    async fn fixture() -> Fixture {
        let repository = Repository::new(Arc::new(InMemoryDocumentStore::new()));
        let owner = UserId::generate();
        let lead = UserId::generate();
        let member = UserId::generate();
        let mut project = Project::new(ProjectId::generate(), owner, "Apollo", "", Utc::now());
        project.add_member(lead).unwrap();
        project.add_member(member).unwrap();
        project.set_lead(lead, true).unwrap();

        let mut batch = WriteBatch::new();
        batch.insert(&project).unwrap();
        repository.commit(batch).await.unwrap();

        Fixture {
            repository,
            project,
            owner,
            lead,
            member,
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_outsider_gets_not_found() {
        let fixture = fixture().await;
        let error = ProjectAccess::resolve(
            &fixture.repository,
            UserId::generate(),
            fixture.project.id,
            ProjectRole::Member,
        )
        .await
        .unwrap_err();
        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert_eq!(error.error.message, PROJECT_NOT_FOUND);
    }

    #[rstest]
    #[tokio::test]
    async fn test_role_requirements() {
        let fixture = fixture().await;
        let resolve = |user, role| {
            ProjectAccess::resolve(&fixture.repository, user, fixture.project.id, role)
        };

        assert_eq!(
            resolve(fixture.owner, ProjectRole::Owner).await.unwrap().project.owner,
            fixture.owner
        );
        assert!(resolve(fixture.lead, ProjectRole::Lead).await.is_ok());
        assert_eq!(
            resolve(fixture.lead, ProjectRole::Owner).await.unwrap_err().status,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            resolve(fixture.member, ProjectRole::Lead).await.unwrap_err().status,
            StatusCode::FORBIDDEN
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_guard_fails_after_membership_is_revoked() {
        let fixture = fixture().await;
        let access = ProjectAccess::resolve(
            &fixture.repository,
            fixture.member,
            fixture.project.id,
            ProjectRole::Member,
        )
        .await
        .unwrap();

        let mut revoked = fixture.project.clone();
        revoked.remove_member(fixture.member).unwrap();
        let mut batch = WriteBatch::new();
        batch.replace(&revoked).unwrap();
        fixture.repository.commit(batch).await.unwrap();

        let mut batch = WriteBatch::new();
        access.guard(&mut batch);
        let error: ApiErrorResponse = fixture.repository.commit(batch).await.unwrap_err().into();
        assert_eq!(error.status, StatusCode::CONFLICT);
    }

    #[rstest]
    #[tokio::test]
    async fn test_task_access_in_project() {
        let fixture = fixture().await;
        let task = Task::new(TaskId::generate(), fixture.owner, "Launch", Utc::now())
            .in_project(fixture.project.id, Some(fixture.member));
        let mut batch = WriteBatch::new();
        batch.insert(&task).unwrap();
        fixture.repository.commit(batch).await.unwrap();

        let access = TaskAccess::resolve(
            &fixture.repository,
            fixture.member,
            task.id,
            TaskPermission::UpdateStatus,
        )
        .await
        .unwrap();
        assert!(!access.can_manage());
        assert_eq!(access.project.as_ref().map(|project| project.id), Some(fixture.project.id));

        let error = TaskAccess::resolve(
            &fixture.repository,
            fixture.member,
            task.id,
            TaskPermission::Manage,
        )
        .await
        .unwrap_err();
        assert_eq!(error.status, StatusCode::FORBIDDEN);

        let error = TaskAccess::resolve(
            &fixture.repository,
            UserId::generate(),
            task.id,
            TaskPermission::View,
        )
        .await
        .unwrap_err();
        assert_eq!(error.status, StatusCode::NOT_FOUND);
    }
}

//! Permission rules.
//!
//! These functions decide what a user may do given the documents already
//! loaded for the request. Loading happens once in the API layer.

use super::ids::UserId;
use super::project::{Project, ProjectRole};
use super::task::Task;

/// What a user may do with a task and everything hanging off it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskPermission {
    /// Read the task, its sub-tasks, checklists and comments.
    View,
    /// Change the task status and tick items.
    UpdateStatus,
    /// Edit every field, delete, and manage children.
    Manage,
}

/// Resolves the permission `user` holds on `task`.
///
/// `project` must be the live project the task belongs to, or `None` for a
/// personal task. A project task whose project is gone grants nothing.
#[must_use]
pub fn task_permission(
    task: &Task,
    project: Option<&Project>,
    user: UserId,
) -> Option<TaskPermission> {
    match (task.project, project) {
        (None, _) => (task.created_by == user).then_some(TaskPermission::Manage),
        (Some(project_id), Some(project)) if project.id == project_id => {
            project.role_of(user).map(|role| match role {
                ProjectRole::Owner | ProjectRole::Lead => TaskPermission::Manage,
                ProjectRole::Member => TaskPermission::UpdateStatus,
            })
        }
        (Some(_), _) => None,
    }
}

/// Returns true if `role` is at least `required`.
#[must_use]
pub fn role_satisfies(role: ProjectRole, required: ProjectRole) -> bool {
    role >= required
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProjectId, TaskId};
    use chrono::Utc;
    use rstest::rstest;

    fn project_with_roles() -> (Project, UserId, UserId, UserId) {
        let owner = UserId::generate();
        let lead = UserId::generate();
        let member = UserId::generate();
        let mut project = Project::new(ProjectId::generate(), owner, "P", "", Utc::now());
        project.add_member(lead).unwrap();
        project.add_member(member).unwrap();
        project.set_lead(lead, true).unwrap();
        (project, owner, lead, member)
    }

    #[rstest]
    fn test_personal_task_belongs_to_creator() {
        let creator = UserId::generate();
        let task = Task::new(TaskId::generate(), creator, "Mine", Utc::now());

        assert_eq!(
            task_permission(&task, None, creator),
            Some(TaskPermission::Manage)
        );
        assert_eq!(task_permission(&task, None, UserId::generate()), None);
    }

    #[rstest]
    fn test_project_task_permissions_follow_role() {
        let (project, owner, lead, member) = project_with_roles();
        let task = Task::new(TaskId::generate(), owner, "Shared", Utc::now())
            .in_project(project.id, Some(member));

        assert_eq!(
            task_permission(&task, Some(&project), owner),
            Some(TaskPermission::Manage)
        );
        assert_eq!(
            task_permission(&task, Some(&project), lead),
            Some(TaskPermission::Manage)
        );
        assert_eq!(
            task_permission(&task, Some(&project), member),
            Some(TaskPermission::UpdateStatus)
        );
        assert_eq!(
            task_permission(&task, Some(&project), UserId::generate()),
            None
        );
    }

    #[rstest]
    fn test_project_task_without_live_project_grants_nothing() {
        let (project, owner, _, _) = project_with_roles();
        let task =
            Task::new(TaskId::generate(), owner, "Orphan", Utc::now()).in_project(project.id, None);
        assert_eq!(task_permission(&task, None, owner), None);
    }

    #[rstest]
    #[case(ProjectRole::Owner, ProjectRole::Lead, true)]
    #[case(ProjectRole::Lead, ProjectRole::Lead, true)]
    #[case(ProjectRole::Member, ProjectRole::Lead, false)]
    #[case(ProjectRole::Member, ProjectRole::Member, true)]
    fn test_role_satisfies(
        #[case] role: ProjectRole,
        #[case] required: ProjectRole,
        #[case] expected: bool,
    ) {
        assert_eq!(role_satisfies(role, required), expected);
    }
}

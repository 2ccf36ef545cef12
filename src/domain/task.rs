//! Task domain model.
//!
//! A task either belongs to a project or is personal. Personal tasks are
//! always assigned to their creator; project tasks may be assigned to any
//! project member or left unassigned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ProjectId, SubTaskId, TagId, TaskId, UserId};

// =============================================================================
// Enums
// =============================================================================

/// Workflow status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TaskStatus {
    #[default]
    Backlog,
    Pending,
    InProgress,
    Completed,
    Reviewed,
    Archived,
}

/// Priority level of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

// =============================================================================
// Task
// =============================================================================

/// A unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    /// Estimated effort in hours.
    pub effort: f64,
    pub project: Option<ProjectId>,
    pub assignee: Option<UserId>,
    pub start_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub files: Vec<String>,
    pub tags: Vec<TagId>,
    pub created_by: UserId,
    pub is_deleted: bool,
    pub sub_task_count: u64,
    pub checklist_count: u64,
    pub comment_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Task {
    pub const SUB_TASK_COUNT: &'static str = "sub_task_count";
    pub const CHECKLIST_COUNT: &'static str = "checklist_count";
    pub const COMMENT_COUNT: &'static str = "comment_count";

    /// Creates a personal task assigned to its creator.
    #[must_use]
    pub fn new(id: TaskId, created_by: UserId, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            status: TaskStatus::default(),
            priority: Priority::default(),
            effort: 0.0,
            project: None,
            assignee: Some(created_by),
            start_at: None,
            due_at: None,
            files: Vec::new(),
            tags: Vec::new(),
            created_by,
            is_deleted: false,
            sub_task_count: 0,
            checklist_count: 0,
            comment_count: 0,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Moves the task into a project with the given (optional) assignee.
    #[must_use]
    pub const fn in_project(mut self, project: ProjectId, assignee: Option<UserId>) -> Self {
        self.project = Some(project);
        self.assignee = assignee;
        self
    }

    #[must_use]
    pub const fn is_personal(&self) -> bool {
        self.project.is_none()
    }
}

// =============================================================================
// SubTask
// =============================================================================

/// A checkable line item attached directly to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    pub id: SubTaskId,
    pub task: TaskId,
    pub text: String,
    pub is_checked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl SubTask {
    #[must_use]
    pub fn new(id: SubTaskId, task: TaskId, text: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            task,
            text: text.into(),
            is_checked: false,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_new_task_is_personal_and_self_assigned() {
        let creator = UserId::generate();
        let task = Task::new(TaskId::generate(), creator, "Write report", Utc::now());

        assert!(task.is_personal());
        assert_eq!(task.assignee, Some(creator));
        assert_eq!(task.status, TaskStatus::Backlog);
        assert_eq!(task.priority, Priority::Medium);
    }

    #[rstest]
    fn test_in_project_replaces_assignee() {
        let creator = UserId::generate();
        let project = ProjectId::generate();
        let task =
            Task::new(TaskId::generate(), creator, "Review", Utc::now()).in_project(project, None);

        assert!(!task.is_personal());
        assert_eq!(task.project, Some(project));
        assert_eq!(task.assignee, None);
    }

    #[rstest]
    #[case("\"InProgress\"", TaskStatus::InProgress)]
    #[case("\"Reviewed\"", TaskStatus::Reviewed)]
    fn test_status_wire_names(#[case] json: &str, #[case] expected: TaskStatus) {
        let status: TaskStatus = serde_json::from_str(json).unwrap();
        assert_eq!(status, expected);
    }
}

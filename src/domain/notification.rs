//! Notifications and reminders.
//!
//! Each notification has exactly one recipient, so read state is per user.
//! System notifications are produced by domain events; user notifications
//! are reminders a user schedules for themself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::comment::TargetType;
use super::ids::{NotificationId, UserId};
use super::project::Project;
use super::task::Task;
use super::user::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: UserId,
    pub title: String,
    pub message: String,
    /// Not shown before this instant.
    pub send_time: DateTime<Utc>,
    pub target_type: TargetType,
    pub target_id: Uuid,
    pub is_read: bool,
    pub kind: NotificationKind,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Notification {
    /// Creates a reminder scheduled by `recipient`.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn reminder(
        id: NotificationId,
        recipient: UserId,
        title: impl Into<String>,
        message: impl Into<String>,
        target_type: TargetType,
        target_id: Uuid,
        send_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            recipient,
            title: title.into(),
            message: message.into(),
            send_time,
            target_type,
            target_id,
            is_read: false,
            kind: NotificationKind::User,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}

/// Events that notify someone.
#[derive(Debug, Clone, Copy)]
pub enum SystemNotice<'a> {
    InvitationReceived {
        project: &'a Project,
        inviter: &'a User,
    },
    InvitationAccepted {
        project: &'a Project,
        invitee: &'a User,
    },
    TaskAssigned {
        task: &'a Task,
        assigner: &'a User,
    },
    ProjectDeleted {
        project: &'a Project,
    },
    RemovedFromProject {
        project: &'a Project,
    },
}

impl SystemNotice<'_> {
    fn title(&self) -> &'static str {
        match self {
            Self::InvitationReceived { .. } => "New project invitation",
            Self::InvitationAccepted { .. } => "Invitation accepted",
            Self::TaskAssigned { .. } => "New task assigned",
            Self::ProjectDeleted { .. } => "Project deleted",
            Self::RemovedFromProject { .. } => "Removed from project",
        }
    }

    fn message(&self) -> String {
        match self {
            Self::InvitationReceived { project, inviter } => format!(
                "{} invited you to join the project \"{}\"",
                inviter.full_name(),
                project.title
            ),
            Self::InvitationAccepted { project, invitee } => format!(
                "{} joined the project \"{}\"",
                invitee.full_name(),
                project.title
            ),
            Self::TaskAssigned { task, assigner } => format!(
                "{} assigned you the task \"{}\"",
                assigner.full_name(),
                task.title
            ),
            Self::ProjectDeleted { project } => {
                format!("The project \"{}\" has been deleted", project.title)
            }
            Self::RemovedFromProject { project } => {
                format!("You are no longer a member of \"{}\"", project.title)
            }
        }
    }

    fn target(&self) -> (TargetType, Uuid) {
        match self {
            Self::InvitationReceived { project, .. }
            | Self::InvitationAccepted { project, .. }
            | Self::ProjectDeleted { project }
            | Self::RemovedFromProject { project } => (TargetType::Project, *project.id.as_uuid()),
            Self::TaskAssigned { task, .. } => (TargetType::Task, *task.id.as_uuid()),
        }
    }

    /// Renders the notice for one recipient, delivered immediately.
    #[must_use]
    pub fn to_notification(
        &self,
        id: NotificationId,
        recipient: UserId,
        now: DateTime<Utc>,
    ) -> Notification {
        let (target_type, target_id) = self.target();
        Notification {
            id,
            recipient,
            title: self.title().to_string(),
            message: self.message(),
            send_time: now,
            target_type,
            target_id,
            is_read: false,
            kind: NotificationKind::System,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProjectId, TaskId};
    use rstest::rstest;

    #[rstest]
    fn test_invitation_notice_targets_project() {
        let inviter = User::new(UserId::generate(), "Ada", "Lovelace", "ada@x.io", Utc::now());
        let project = Project::new(ProjectId::generate(), inviter.id, "Engine", "", Utc::now());
        let recipient = UserId::generate();

        let notification = SystemNotice::InvitationReceived {
            project: &project,
            inviter: &inviter,
        }
        .to_notification(NotificationId::generate(), recipient, Utc::now());

        assert_eq!(notification.recipient, recipient);
        assert_eq!(notification.kind, NotificationKind::System);
        assert_eq!(notification.target_type, TargetType::Project);
        assert_eq!(notification.target_id, *project.id.as_uuid());
        assert!(notification.message.contains("Ada Lovelace"));
        assert!(notification.message.contains("Engine"));
        assert!(!notification.is_read);
    }

    #[rstest]
    fn test_task_notice_targets_task() {
        let assigner = User::new(UserId::generate(), "Ada", "Lovelace", "ada@x.io", Utc::now());
        let task = Task::new(TaskId::generate(), assigner.id, "Draft", Utc::now());

        let notification = SystemNotice::TaskAssigned {
            task: &task,
            assigner: &assigner,
        }
        .to_notification(NotificationId::generate(), UserId::generate(), Utc::now());

        assert_eq!(notification.target_type, TargetType::Task);
        assert_eq!(notification.title, "New task assigned");
    }
}

//! Domain module for collaborative task management.
//!
//! This module contains the entities, their invariants and the permission
//! rules. Nothing here performs I/O.

pub mod access;
pub mod checklist;
pub mod comment;
pub mod ids;
pub mod invitation;
pub mod notification;
pub mod project;
pub mod tag;
pub mod task;
pub mod user;
pub mod verification;

pub use access::{TaskPermission, role_satisfies, task_permission};
pub use checklist::{Checklist, ChecklistItem};
pub use comment::{Comment, TargetType};
pub use ids::{
    ChecklistId, ChecklistItemId, CommentId, InvitationId, NotificationId, ProjectId, SubTaskId,
    TagId, TaskId, UserId, VerificationId,
};
pub use invitation::{Invitation, InvitationError, InvitationStatus, SendOutcome};
pub use notification::{Notification, NotificationKind, SystemNotice};
pub use project::{
    MembershipError, Project, ProjectRole, ProjectStatus, ScheduleError, validate_schedule,
};
pub use tag::{Tag, TagClash, TagColor, TagShade};
pub use task::{Priority, SubTask, Task, TaskStatus};
pub use user::{User, normalize_email};
pub use verification::{PASSWORD_RESET_TTL_MINUTES, Verification, VerificationPurpose};

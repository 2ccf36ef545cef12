//! Project domain model and membership rules.
//!
//! A project has exactly one owner, a set of members and a subset of those
//! members promoted to lead. The following always hold:
//!
//! - the owner is a member
//! - every lead is a member
//! - the owner is never listed as a lead

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{ProjectId, UserId};

// =============================================================================
// Enums
// =============================================================================

/// Lifecycle stage of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ProjectStatus {
    #[default]
    Planning,
    Ongoing,
    Done,
}

/// Role of a user inside a project, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectRole {
    Member,
    Lead,
    Owner,
}

impl ProjectRole {
    /// Returns the lowercase wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Lead => "lead",
            Self::Owner => "owner",
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Violations of the membership rules.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum MembershipError {
    #[error("User is already a member of this project")]
    AlreadyMember,

    #[error("User is not a member of this project")]
    NotMember,

    #[error("The project owner cannot leave or be removed from the project")]
    OwnerCannotLeave,

    #[error("The project owner's role cannot be changed")]
    OwnerRoleFixed,

    #[error("Member is already a lead")]
    AlreadyLead,

    #[error("Member is not a lead")]
    NotLead,
}

/// A start/due pair where the due date precedes the start date.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("Due date must not be earlier than start date")]
pub struct ScheduleError;

/// Checks that `due_at` is not before `start_at` when both are set.
///
/// # Errors
///
/// Returns [`ScheduleError`] when the due date precedes the start date.
pub fn validate_schedule(
    start_at: Option<DateTime<Utc>>,
    due_at: Option<DateTime<Utc>>,
) -> Result<(), ScheduleError> {
    match (start_at, due_at) {
        (Some(start), Some(due)) if due < start => Err(ScheduleError),
        _ => Ok(()),
    }
}

// =============================================================================
// Project
// =============================================================================

/// A shared workspace grouping tasks and members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    pub description: String,
    pub status: ProjectStatus,
    pub owner: UserId,
    pub leads: Vec<UserId>,
    pub members: Vec<UserId>,
    pub start_at: Option<DateTime<Utc>>,
    pub due_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    /// Number of live tasks in this project.
    pub task_count: u64,
    /// Number of comments targeting this project.
    pub comment_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Project {
    pub const TASK_COUNT: &'static str = "task_count";
    pub const COMMENT_COUNT: &'static str = "comment_count";

    /// Creates a project owned by `owner`, who is also its first member.
    #[must_use]
    pub fn new(
        id: ProjectId,
        owner: UserId,
        title: impl Into<String>,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            description: description.into(),
            status: ProjectStatus::default(),
            owner,
            leads: Vec::new(),
            members: vec![owner],
            start_at: None,
            due_at: None,
            is_deleted: false,
            task_count: 0,
            comment_count: 0,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Resolves the role `user` holds in this project.
    #[must_use]
    pub fn role_of(&self, user: UserId) -> Option<ProjectRole> {
        if self.owner == user {
            Some(ProjectRole::Owner)
        } else if self.leads.contains(&user) {
            Some(ProjectRole::Lead)
        } else if self.members.contains(&user) {
            Some(ProjectRole::Member)
        } else {
            None
        }
    }

    #[must_use]
    pub fn is_member(&self, user: UserId) -> bool {
        self.members.contains(&user)
    }

    /// Adds `user` as a plain member.
    ///
    /// # Errors
    ///
    /// Returns [`MembershipError::AlreadyMember`] if the user is already in.
    pub fn add_member(&mut self, user: UserId) -> Result<(), MembershipError> {
        if self.is_member(user) {
            return Err(MembershipError::AlreadyMember);
        }
        self.members.push(user);
        Ok(())
    }

    /// Removes `user` from the members and, if needed, from the leads.
    ///
    /// # Errors
    ///
    /// Fails for the owner and for users who are not members.
    pub fn remove_member(&mut self, user: UserId) -> Result<(), MembershipError> {
        if self.owner == user {
            return Err(MembershipError::OwnerCannotLeave);
        }
        if !self.is_member(user) {
            return Err(MembershipError::NotMember);
        }
        self.members.retain(|member| *member != user);
        self.leads.retain(|lead| *lead != user);
        Ok(())
    }

    /// Promotes or demotes a member.
    ///
    /// # Errors
    ///
    /// Fails when the target is not a member, is the owner, or already has
    /// the requested role.
    pub fn set_lead(&mut self, user: UserId, is_lead: bool) -> Result<(), MembershipError> {
        match self.role_of(user) {
            None => Err(MembershipError::NotMember),
            Some(ProjectRole::Owner) => Err(MembershipError::OwnerRoleFixed),
            Some(ProjectRole::Lead) if is_lead => Err(MembershipError::AlreadyLead),
            Some(ProjectRole::Member) if !is_lead => Err(MembershipError::NotLead),
            Some(ProjectRole::Member) => {
                self.leads.push(user);
                Ok(())
            }
            Some(ProjectRole::Lead) => {
                self.leads.retain(|lead| *lead != user);
                Ok(())
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

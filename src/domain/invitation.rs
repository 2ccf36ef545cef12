//! Project invitations.
//!
//! There is at most one invitation per (project, invitee) pair. Sending an
//! invitation again reopens the existing record instead of creating another.
//!
//! ```text
//!            send                    respond(accepted)
//!   (none) -------> pending -----------------------------> accepted
//!                    |  |  \         respond(declined)
//!             cancel |  |   -------------------------------> declined
//!                    v  | expire (project deleted, member removed)
//!              canceled v
//!                    expired
//!
//!   declined | canceled | expired | accepted-but-left --send--> pending
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{InvitationId, ProjectId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
    Canceled,
}

/// Why an invitation transition was refused.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum InvitationError {
    #[error("Invitation has already been sent")]
    AlreadyPending,

    #[error("User is already a member of this project")]
    AlreadyMember,

    #[error("Invitation is no longer pending")]
    NotPending,

    #[error("An invitation can only be accepted or declined")]
    InvalidResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub from: UserId,
    pub to: UserId,
    pub project: ProjectId,
    /// 40 lowercase hex characters.
    pub code: String,
    pub status: InvitationStatus,
    pub is_expired: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

/// What sending an invitation should do with the existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Create,
    Reopen,
}

impl Invitation {
    #[must_use]
    pub fn new(
        id: InvitationId,
        from: UserId,
        to: UserId,
        project: ProjectId,
        code: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            from,
            to,
            project,
            code,
            status: InvitationStatus::Pending,
            is_expired: false,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Returns true while the invitee can still respond.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == InvitationStatus::Pending && !self.is_expired
    }

    /// Decides how a new send interacts with the current record.
    ///
    /// # Errors
    ///
    /// Refuses when the invitee already belongs to the project or an open
    /// invitation exists.
    pub fn plan_send(
        existing: Option<&Self>,
        invitee_is_member: bool,
    ) -> Result<SendOutcome, InvitationError> {
        if invitee_is_member {
            return Err(InvitationError::AlreadyMember);
        }
        match existing {
            None => Ok(SendOutcome::Create),
            Some(invitation) if invitation.is_open() => Err(InvitationError::AlreadyPending),
            Some(_) => Ok(SendOutcome::Reopen),
        }
    }

    /// Puts a closed invitation back into the pending state.
    pub fn reopen(&mut self, from: UserId, code: String, now: DateTime<Utc>) {
        self.from = from;
        self.code = code;
        self.status = InvitationStatus::Pending;
        self.is_expired = false;
        self.updated_at = now;
    }

    /// Records the invitee's answer.
    ///
    /// # Errors
    ///
    /// Fails when the invitation is not open or `status` is not an answer.
    pub fn respond(
        &mut self,
        status: InvitationStatus,
        now: DateTime<Utc>,
    ) -> Result<(), InvitationError> {
        if !matches!(
            status,
            InvitationStatus::Accepted | InvitationStatus::Declined
        ) {
            return Err(InvitationError::InvalidResponse);
        }
        if !self.is_open() {
            return Err(InvitationError::NotPending);
        }
        self.status = status;
        self.updated_at = now;
        Ok(())
    }

    /// Withdraws an open invitation.
    ///
    /// # Errors
    ///
    /// Fails when the invitation is not open.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), InvitationError> {
        if !self.is_open() {
            return Err(InvitationError::NotPending);
        }
        self.status = InvitationStatus::Canceled;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn invitation() -> Invitation {
        Invitation::new(
            InvitationId::generate(),
            UserId::generate(),
            UserId::generate(),
            ProjectId::generate(),
            "a".repeat(40),
            Utc::now(),
        )
    }

    #[rstest]
    fn test_plan_send_without_record_creates() {
        assert_eq!(Invitation::plan_send(None, false), Ok(SendOutcome::Create));
    }

    #[rstest]
    fn test_plan_send_rejects_members(invitation: Invitation) {
        assert_eq!(
            Invitation::plan_send(Some(&invitation), true),
            Err(InvitationError::AlreadyMember)
        );
        assert_eq!(
            Invitation::plan_send(None, true),
            Err(InvitationError::AlreadyMember)
        );
    }

    #[rstest]
    fn test_plan_send_rejects_open_invitation(invitation: Invitation) {
        assert_eq!(
            Invitation::plan_send(Some(&invitation), false),
            Err(InvitationError::AlreadyPending)
        );
    }

    #[rstest]
    #[case(InvitationStatus::Declined, false)]
    #[case(InvitationStatus::Canceled, false)]
    #[case(InvitationStatus::Accepted, false)]
    #[case(InvitationStatus::Pending, true)]
    fn test_plan_send_reopens_closed_invitation(
        mut invitation: Invitation,
        #[case] status: InvitationStatus,
        #[case] expired: bool,
    ) {
        invitation.status = status;
        invitation.is_expired = expired;
        assert_eq!(
            Invitation::plan_send(Some(&invitation), false),
            Ok(SendOutcome::Reopen)
        );
    }

    #[rstest]
    fn test_reopen_resets_state(mut invitation: Invitation) {
        invitation.status = InvitationStatus::Declined;
        invitation.is_expired = true;
        let sender = UserId::generate();

        invitation.reopen(sender, "b".repeat(40), Utc::now());

        assert!(invitation.is_open());
        assert_eq!(invitation.from, sender);
        assert_eq!(invitation.code, "b".repeat(40));
    }

    #[rstest]
    fn test_respond_only_once(mut invitation: Invitation) {
        invitation
            .respond(InvitationStatus::Accepted, Utc::now())
            .unwrap();
        assert_eq!(
            invitation.respond(InvitationStatus::Declined, Utc::now()),
            Err(InvitationError::NotPending)
        );
    }

    #[rstest]
    fn test_respond_rejects_non_answers(mut invitation: Invitation) {
        assert_eq!(
            invitation.respond(InvitationStatus::Canceled, Utc::now()),
            Err(InvitationError::InvalidResponse)
        );
    }

    #[rstest]
    fn test_cancel_requires_open(mut invitation: Invitation) {
        invitation.is_expired = true;
        assert_eq!(
            invitation.cancel(Utc::now()),
            Err(InvitationError::NotPending)
        );
    }
}

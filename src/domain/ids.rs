//! Typed identifiers for stored entities.
//!
//! Every entity is keyed by a time-ordered UUID (v7) wrapped in its own
//! newtype so that a `TaskId` can never be passed where a `ProjectId` is
//! expected.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Wraps an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Generates a new time-ordered identifier (UUID v7).
            #[must_use]
            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(value.trim()).map(Self)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

entity_id!(
    /// Identifier of a [`crate::domain::User`].
    UserId
);
entity_id!(
    /// Identifier of a [`crate::domain::Project`].
    ProjectId
);
entity_id!(
    /// Identifier of a [`crate::domain::Task`].
    TaskId
);
entity_id!(
    /// Identifier of a [`crate::domain::SubTask`].
    SubTaskId
);
entity_id!(
    /// Identifier of a [`crate::domain::Checklist`].
    ChecklistId
);
entity_id!(
    /// Identifier of a [`crate::domain::ChecklistItem`].
    ChecklistItemId
);
entity_id!(
    /// Identifier of a [`crate::domain::Tag`].
    TagId
);
entity_id!(
    /// Identifier of a [`crate::domain::Comment`].
    CommentId
);
entity_id!(
    /// Identifier of a [`crate::domain::Invitation`].
    InvitationId
);
entity_id!(
    /// Identifier of a [`crate::domain::Notification`].
    NotificationId
);
entity_id!(
    /// Identifier of a [`crate::domain::Verification`].
    VerificationId
);

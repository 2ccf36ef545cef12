//! One-time codes for email confirmation and password reset.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{UserId, VerificationId};

/// How long a password reset code stays valid.
pub const PASSWORD_RESET_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationPurpose {
    EmailConfirmation,
    PasswordReset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    pub id: VerificationId,
    pub user: UserId,
    pub code: String,
    pub purpose: VerificationPurpose,
    pub created_at: DateTime<Utc>,
    pub version: u64,
}

impl Verification {
    #[must_use]
    pub const fn new(
        id: VerificationId,
        user: UserId,
        code: String,
        purpose: VerificationPurpose,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user,
            code,
            purpose,
            created_at: now,
            version: 1,
        }
    }

    /// Email confirmation codes never expire; reset codes do.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.purpose {
            VerificationPurpose::EmailConfirmation => false,
            VerificationPurpose::PasswordReset => {
                now - self.created_at > Duration::minutes(PASSWORD_RESET_TTL_MINUTES)
            }
        }
    }
}

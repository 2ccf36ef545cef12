//! User domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ProjectId, UserId};

/// A registered account.
///
/// Accounts created with a password start inactive and become active once
/// the email confirmation code is redeemed. Google sign-in creates active
/// accounts directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    /// Normalized with [`normalize_email`].
    pub email: String,
    /// Argon2 PHC string; absent for Google-only accounts.
    pub password_hash: Option<String>,
    pub google_id: Option<String>,
    pub profile_picture_url: Option<String>,
    pub is_active: bool,
    pub is_deleted: bool,
    /// Number of live projects owned by this user.
    pub project_own_count: u64,
    /// Number of live projects this user is a member of (owned included).
    pub project_in_count: u64,
    /// Number of live tasks assigned to this user.
    pub task_count: u64,
    pub favorite_projects: Vec<ProjectId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl User {
    pub const PROJECT_OWN_COUNT: &'static str = "project_own_count";
    pub const PROJECT_IN_COUNT: &'static str = "project_in_count";
    pub const TASK_COUNT: &'static str = "task_count";

    /// Creates an inactive account without credentials.
    #[must_use]
    pub fn new(
        id: UserId,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: normalize_email(email),
            password_hash: None,
            google_id: None,
            profile_picture_url: None,
            is_active: false,
            is_deleted: false,
            project_own_count: 0,
            project_in_count: 0,
            task_count: 0,
            favorite_projects: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Sets the password hash.
    #[must_use]
    pub fn with_password_hash(mut self, hash: impl Into<String>) -> Self {
        self.password_hash = Some(hash.into());
        self
    }

    /// Marks the account as active.
    #[must_use]
    pub const fn activated(mut self) -> Self {
        self.is_active = true;
        self
    }

    /// Returns the display name.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Returns true if the account may obtain a session token.
    #[must_use]
    pub const fn can_sign_in(&self) -> bool {
        self.is_active && !self.is_deleted
    }

    /// Re-registers a soft-deleted account in place.
    ///
    /// Favorites are cleared and the account must be confirmed again.
    pub fn revive(
        &mut self,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        password_hash: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self.password_hash = Some(password_hash.into());
        self.is_deleted = false;
        self.is_active = false;
        self.favorite_projects.clear();
        self.updated_at = now;
    }

    /// Adds a project to the favorites list. Returns false if already present.
    pub fn add_favorite(&mut self, project: ProjectId) -> bool {
        if self.favorite_projects.contains(&project) {
            return false;
        }
        self.favorite_projects.push(project);
        true
    }

    /// Removes a project from the favorites list. Returns false if absent.
    pub fn remove_favorite(&mut self, project: ProjectId) -> bool {
        let before = self.favorite_projects.len();
        self.favorite_projects.retain(|favorite| *favorite != project);
        before != self.favorite_projects.len()
    }
}

/// Normalizes an email address for storage and lookup.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

//! Colored labels attached to tasks.
//!
//! A tag lives either in a project (shared by its members) or in the personal
//! space of its creator. Within one scope labels are unique ignoring case,
//! and so are color/shade pairs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ProjectId, TagId, UserId};
use super::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagColor {
    Red,
    Yellow,
    Orange,
    Blue,
    Green,
    Purple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TagShade {
    Dark,
    #[default]
    Main,
    Light,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub label: String,
    pub color: TagColor,
    pub shade: TagShade,
    pub project: Option<ProjectId>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Tag {
    #[must_use]
    pub fn new(
        id: TagId,
        label: impl Into<String>,
        color: TagColor,
        shade: TagShade,
        project: Option<ProjectId>,
        created_by: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            label: label.into(),
            color,
            shade,
            project,
            created_by,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Returns true if this tag may be attached to `task`.
    ///
    /// Project tasks take tags of their project; personal tasks take the
    /// personal tags of the task's creator.
    #[must_use]
    pub fn applies_to(&self, task: &Task) -> bool {
        match task.project {
            Some(project) => self.project == Some(project),
            None => self.project.is_none() && self.created_by == task.created_by,
        }
    }

    /// Returns the uniqueness rule a tag with these attributes would break
    /// if it shared a scope with `self`.
    #[must_use]
    pub fn clash_with(&self, label: &str, color: TagColor, shade: TagShade) -> Option<TagClash> {
        if self.label.to_lowercase() == label.trim().to_lowercase() {
            Some(TagClash::Label)
        } else if self.color == color && self.shade == shade {
            Some(TagClash::Color)
        } else {
            None
        }
    }
}

/// Uniqueness rule broken by a tag within its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClash {
    Label,
    Color,
}

impl TagClash {
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::Label => "A tag with this label already exists",
            Self::Color => "A tag with this color and shade already exists",
        }
    }
}

//! Comments on tasks and projects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ids::{CommentId, UserId};

/// Kind of entity a comment or notification points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    Task,
    Project,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub author: UserId,
    pub content: String,
    pub target_type: TargetType,
    pub target_id: Uuid,
    pub files: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Comment {
    #[must_use]
    pub fn new(
        id: CommentId,
        author: UserId,
        content: impl Into<String>,
        target_type: TargetType,
        target_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            author,
            content: content.into(),
            target_type,
            target_id,
            files: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}

//! Checklists and their items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ChecklistId, ChecklistItemId, TaskId};

/// A named group of items attached to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    pub id: ChecklistId,
    pub task: TaskId,
    pub title: String,
    pub item_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl Checklist {
    pub const ITEM_COUNT: &'static str = "item_count";

    #[must_use]
    pub fn new(id: ChecklistId, task: TaskId, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            task,
            title: title.into(),
            item_count: 0,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}

/// One entry of a checklist.
///
/// The owning task is stored alongside the checklist so that access can be
/// resolved without loading the checklist first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: ChecklistItemId,
    pub checklist: ChecklistId,
    pub task: TaskId,
    pub title: String,
    pub is_checked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl ChecklistItem {
    #[must_use]
    pub fn new(
        id: ChecklistItemId,
        checklist: &Checklist,
        title: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            checklist: checklist.id,
            task: checklist.task,
            title: title.into(),
            is_checked: false,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }
}

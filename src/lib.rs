//! Taskoodle API library.
//!
//! REST backend for collaborative task and project management: users,
//! projects with role-based membership, tasks with sub-tasks and
//! checklists, tags, comments, invitations and notifications.

pub mod api;
pub mod domain;
pub mod infrastructure;

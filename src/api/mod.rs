//! API module for HTTP handlers.
//!
//! This module contains route definitions, request extractors, per-request
//! authorization and the handlers of every resource.

pub mod access;
pub mod auth;
pub mod checklists;
pub mod comments;
pub mod dto;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod invitations;
pub mod listing;
pub mod notifications;
pub mod projects;
pub mod routes;
pub mod subtasks;
pub mod tags;
pub mod tasks;
pub mod users;
pub mod verifications;

pub use access::{ProjectAccess, TargetAccess, TaskAccess};
pub use error::{ApiError, ApiErrorResponse, ApiResult, FieldError, ValidationError};
pub use extract::AuthUser;
pub use handlers::{AppState, HealthResponse, health_check};
pub use listing::{ListParams, ListResponse};
pub use routes::create_router;

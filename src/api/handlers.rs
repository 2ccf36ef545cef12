//! Application state and the service-level handlers.
//!
//! Resource handlers live in their own modules (`users`, `projects`, ...);
//! they all receive the same [`AppState`].

use std::sync::Arc;

use axum::Json;

use crate::infrastructure::{AppSettings, Mailer, Repository, Services, TokenIssuer};

// =============================================================================
// Application State
// =============================================================================

/// Shared application dependencies.
///
/// Uses trait objects behind `Arc` so that the storage and mail backends can
/// be selected at runtime by the `ServiceFactory`.
#[derive(Clone)]
pub struct AppState {
    /// Document repository for every collection.
    pub repository: Repository,
    /// Outbound mail for verification and reset links.
    pub mailer: Arc<dyn Mailer>,
    /// Issues and verifies session tokens.
    pub tokens: TokenIssuer,
    /// Base URL of the web client, used in emailed links.
    pub frontend_url: Arc<str>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AppState")
            .field("repository", &self.repository)
            .field("tokens", &self.tokens)
            .field("frontend_url", &self.frontend_url)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Creates a new `AppState` from initialized services.
    ///
    /// Emailed links point at the default frontend URL.
    #[must_use]
    pub fn from_services(services: Services) -> Self {
        Self::with_settings(services, &AppSettings::default())
    }

    /// Creates a new `AppState` from services and the loaded settings.
    #[must_use]
    pub fn with_settings(services: Services, settings: &AppSettings) -> Self {
        Self {
            repository: services.repository,
            mailer: services.mailer,
            tokens: services.tokens,
            frontend_url: Arc::from(settings.frontend_url.trim_end_matches('/')),
        }
    }
}

// =============================================================================
// GET /health Handler
// =============================================================================

/// Health check response body.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
}

/// Health check endpoint.
///
/// Returns a simple JSON response indicating the service is running.
///
/// # Response
///
/// - **200 OK**: Service is healthy
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// =============================================================================
// GET /api Handler
// =============================================================================

/// Landing route of the API.
pub async fn welcome() -> &'static str {
    "Welcome to the Taskoodle API"
}

//! Request extractors.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::error::ApiErrorResponse;
use super::handlers::AppState;
use crate::domain::User;

/// The signed-in user, loaded from the bearer token.
///
/// Rejects with 401 when the header is missing, the token does not verify,
/// or the account has been deleted since the token was issued.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiErrorResponse;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiErrorResponse::unauthorized("Login required"))?;

        let user_id = state.tokens.verify(token).map_err(|error| {
            tracing::debug!(%error, "Rejected session token");
            ApiErrorResponse::unauthorized(error.to_string())
        })?;

        match state.repository.get::<User>(user_id).await? {
            Some(user) if !user.is_deleted => Ok(Self(user)),
            _ => Err(ApiErrorResponse::unauthorized("Token is invalid")),
        }
    }
}

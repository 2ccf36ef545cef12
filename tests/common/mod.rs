//! Common test helpers for integration tests.
//!
//! Every test drives the full router over in-memory storage. One-time codes
//! are read straight from the repository instead of intercepting mail.
//!
//! # Note
//!
//! The `#![allow(dead_code)]` attribute is necessary because Rust compiles each
//! integration test file as a separate crate. Helpers used only by some test
//! files would otherwise generate dead code warnings in the others.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use taskoodle_api::api::{AppState, create_router};
use taskoodle_api::domain::{UserId, Verification, VerificationPurpose};
use taskoodle_api::infrastructure::{
    Filter, InMemoryDocumentStore, LogMailer, Repository, Services, TokenIssuer,
};

pub const PASSWORD: &str = "correct horse battery";

/// A signed-in test user.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub token: String,
}

/// The router plus a handle on its storage.
pub struct TestApp {
    router: Router,
    pub state: AppState,
}

impl TestApp {
    pub fn new() -> Self {
        let services = Services {
            repository: Repository::new(Arc::new(InMemoryDocumentStore::new())),
            mailer: Arc::new(LogMailer),
            tokens: TokenIssuer::new("integration-test-secret", chrono::Duration::hours(1)),
        };
        let state = AppState::from_services(services);
        Self {
            router: create_router(state.clone()),
            state,
        }
    }

    /// Sends one request and returns the status with the decoded body.
    ///
    /// Non-JSON bodies come back as a JSON string; empty bodies as `null`.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, Some(token), None).await
    }

    /// Reads the pending one-time code of a user.
    pub async fn code_for(&self, user_id: &str, purpose: VerificationPurpose) -> String {
        let user: UserId = user_id.parse().unwrap();
        self.state
            .repository
            .find_one::<Verification>(Filter::eq("user", user).and(Filter::eq("purpose", purpose)))
            .await
            .unwrap()
            .expect("verification code should exist")
            .code
    }

    /// Registers an account, confirms its email and returns the session.
    pub async fn sign_up(&self, first_name: &str, last_name: &str, email: &str) -> Session {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/users",
                None,
                Some(json!({
                    "first_name": first_name,
                    "last_name": last_name,
                    "email": email,
                    "password": PASSWORD,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let id = body["user"]["id"].as_str().unwrap().to_string();

        let code = self.code_for(&id, VerificationPurpose::EmailConfirmation).await;
        let (status, body) = self
            .request(Method::PUT, &format!("/api/verifications/{code}"), None, None)
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");

        Session {
            id,
            token: body["access_token"].as_str().unwrap().to_string(),
        }
    }

    /// Creates a project owned by `owner` and returns its id.
    pub async fn create_project(&self, owner: &Session, title: &str) -> String {
        let (status, body) = self
            .post("/api/projects", &owner.token, json!({ "title": title }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    /// Invites `member` into the project and accepts on their behalf.
    pub async fn add_member(&self, owner: &Session, project_id: &str, member: &Session) {
        let (status, body) = self
            .post(
                &format!("/api/projects/{project_id}/invitations"),
                &owner.token,
                json!({ "to": member.id }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");

        let (status, body) = self
            .put(
                &format!("/api/projects/{project_id}/invitations/{}", member.id),
                &member.token,
                json!({ "status": "accepted" }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    /// Returns the current public view of a user.
    pub async fn user(&self, viewer: &Session, user_id: &str) -> Value {
        let (status, body) = self.get(&format!("/api/users/{user_id}"), &viewer.token).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

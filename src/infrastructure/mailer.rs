//! Outbound email.
//!
//! Mail is a side effect of a committed change: handlers hand messages to
//! [`dispatch`], which sends them on a background task and only logs
//! failures. A failed send never fails the request.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

// =============================================================================
// Mail Error
// =============================================================================

#[derive(Debug, Clone, Error)]
pub enum MailError {
    /// The mail API could not be reached.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Request timed out after the specified duration.
    #[error("Timeout after {0}ms")]
    Timeout(u64),

    /// The mail API answered with an error status.
    #[error("Mail service rejected the message: {0}")]
    Rejected(String),
}

// =============================================================================
// Messages
// =============================================================================

/// One outgoing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl Mail {
    #[must_use]
    pub fn email_confirmation(to: &str, frontend_url: &str, code: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Confirm your email with Taskoodle".to_string(),
            html: format!(
                "<p>Welcome to Taskoodle! Click on this \
                 <a href=\"{frontend_url}/verifications/{code}\">link</a> to verify your email.</p>"
            ),
        }
    }

    #[must_use]
    pub fn password_reset(to: &str, frontend_url: &str, code: &str) -> Self {
        Self {
            to: to.to_string(),
            subject: "Reset your Taskoodle password".to_string(),
            html: format!(
                "<p>Click on this <a href=\"{frontend_url}/reset-password/{code}\">link</a> \
                 to choose a new password. The link expires in 10 minutes.</p>"
            ),
        }
    }
}

// =============================================================================
// Mailer
// =============================================================================

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Delivers one message.
    async fn send(&self, mail: Mail) -> Result<(), MailError>;
}

/// Sends `mail` on a background task.
pub fn dispatch(mailer: &Arc<dyn Mailer>, mail: Mail) {
    let mailer = Arc::clone(mailer);
    tokio::spawn(async move {
        let recipient = mail.to.clone();
        if let Err(error) = mailer.send(mail).await {
            tracing::warn!(%recipient, %error, "Failed to send email");
        }
    });
}

/// Writes messages to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: Mail) -> Result<(), MailError> {
        tracing::info!(to = %mail.to, subject = %mail.subject, body = %mail.html, "Email");
        Ok(())
    }
}

#[derive(Serialize)]
struct MailRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Posts messages as JSON to a transactional mail API.
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    from: String,
    timeout: Duration,
}

impl std::fmt::Debug for HttpMailer {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpMailer")
            .field("endpoint", &self.endpoint)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

impl HttpMailer {
    #[must_use]
    pub fn new(endpoint: String, token: String, from: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            token,
            from,
            timeout,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    #[allow(clippy::cast_possible_truncation)]
    async fn send(&self, mail: Mail) -> Result<(), MailError> {
        let timeout_ms = self.timeout.as_millis() as u64;
        let request = MailRequest {
            from: &self.from,
            to: &mail.to,
            subject: &mail.subject,
            html: &mail.html,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    MailError::Timeout(timeout_ms)
                } else {
                    MailError::ConnectionFailed(error.to_string())
                }
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(MailError::Rejected(format!("HTTP {}", response.status())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_confirmation_links_to_frontend() {
        let mail = Mail::email_confirmation("a@b.c", "http://localhost:3000", "abc123");
        assert_eq!(mail.to, "a@b.c");
        assert!(mail.html.contains("http://localhost:3000/verifications/abc123"));
    }

    #[rstest]
    fn test_reset_links_to_frontend() {
        let mail = Mail::password_reset("a@b.c", "https://app.example", "ff00");
        assert!(mail.html.contains("https://app.example/reset-password/ff00"));
    }

    #[rstest]
    #[tokio::test]
    async fn test_log_mailer_always_succeeds() {
        let mailer = LogMailer;
        assert!(mailer.send(Mail::password_reset("a@b.c", "x", "y")).await.is_ok());
    }
}

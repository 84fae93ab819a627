//! Completion service abstraction.
//!
//! Defines the [`CompletionService`] trait and the shared request types used
//! by all provider implementations. One provider is implemented:
//! [`gemini::GeminiCompletion`] — Google `generateContent` API.
//!
//! The engine never retries or backs off; a failed call surfaces as a
//! [`CompletionError`] and the current batch aborts fail-fast.

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub mod gemini;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Role of one message in the folded model history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Spoken by the human user.
    User,
    /// Spoken by the model (any persona agent).
    Model,
}

impl ChatRole {
    /// Wire-level role string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// One folded history message handed to the completion call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role.
    pub role: ChatRole,
    /// Message text, already budget-truncated by the context assembler.
    pub text: String,
}

impl ChatMessage {
    /// Construct a user-role message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    /// Construct a model-role message.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Model,
            text: text.into(),
        }
    }
}

/// An inline stimulus attachment for one-shot simulation prompts.
///
/// `data` is pure base64 with no `data:` URL prefix; callers validate with
/// [`crate::engine::simulation::decode_stimulus`] before constructing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Base64-encoded payload.
    pub data: String,
    /// MIME type of the payload (e.g. `image/png`, `application/pdf`).
    pub mime_type: String,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by completion providers.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// HTTP transport failure.
    #[error("completion request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response did not match the expected schema.
    #[error("completion response parse error: {0}")]
    Parse(String),
    /// Upstream provider responded with an error status (quota, auth,
    /// malformed input).
    #[error("completion provider returned status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },
    /// Provider cannot satisfy the request with current configuration.
    #[error("completion provider unavailable: {0}")]
    Unavailable(String),
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Check HTTP response status and return the body text or a structured error.
///
/// # Errors
///
/// Returns `CompletionError::Request` on transport failure,
/// `CompletionError::HttpStatus` on non-2xx.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, CompletionError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(CompletionError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_http_error_body(&body),
        });
    }
    Ok(body)
}

/// Collapse whitespace, redact API keys, and length-cap an error body before
/// it enters an error value or a log line.
pub(crate) fn sanitize_http_error_body(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut sanitized = collapsed;
    for pattern in [
        r"AIza[A-Za-z0-9_\-]{30,}",
        r"key=[A-Za-z0-9_\-]{20,}",
        r"sk-[A-Za-z0-9]{32,}",
    ] {
        if let Ok(regex) = Regex::new(pattern) {
            sanitized = regex.replace_all(&sanitized, "[REDACTED]").into_owned();
        }
    }

    const MAX_ERROR_BODY_CHARS: usize = 256;
    if sanitized.chars().count() > MAX_ERROR_BODY_CHARS {
        let shortened = sanitized
            .chars()
            .take(MAX_ERROR_BODY_CHARS)
            .collect::<String>();
        return format!("{shortened}...[truncated]");
    }

    sanitized
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// The external completion service.
///
/// Both calls are single opaque suspension points; the engine applies no
/// timeout of its own — callers needing bounded latency wrap these futures
/// themselves.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Answer `utterance` as the persona described by `briefing`, given the
    /// folded conversation `history` (which does not yet contain
    /// `utterance`).
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError`] on API, network, or parse failure.
    async fn chat(
        &self,
        briefing: &str,
        history: &[ChatMessage],
        utterance: &str,
    ) -> Result<String, CompletionError>;

    /// Run a one-shot prompt with an optional inline stimulus attachment.
    ///
    /// # Errors
    ///
    /// Returns [`CompletionError`] on API, network, or parse failure.
    async fn generate(
        &self,
        prompt: &str,
        stimulus: Option<&Attachment>,
    ) -> Result<String, CompletionError>;
}

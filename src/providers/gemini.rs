//! Gemini completion provider using the `generateContent` API.

use serde::{Deserialize, Serialize};

use super::{check_http_response, Attachment, ChatMessage, CompletionError, CompletionService};

/// Default API base.
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Default model identifier.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// `generateContent` request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct GenerateContentRequest {
    /// Conversation contents, oldest first.
    pub contents: Vec<GeminiContent>,
    /// Optional system instruction (the briefing).
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<GeminiContent>,
}

/// One content entry: a role plus ordered parts.
#[doc(hidden)]
#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiContent {
    /// "user" or "model"; absent on system instructions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Content parts.
    pub parts: Vec<GeminiPart>,
}

impl GeminiContent {
    fn text(role: Option<&str>, text: &str) -> Self {
        Self {
            role: role.map(str::to_owned),
            parts: vec![GeminiPart::Text {
                text: text.to_owned(),
            }],
        }
    }
}

/// A single content part — plain text or inline binary data.
#[doc(hidden)]
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeminiPart {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// Inline base64 payload.
    InlineData {
        /// The payload.
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

/// Inline binary payload for multimodal parts.
#[doc(hidden)]
#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiInlineData {
    /// MIME type of the payload.
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    /// Base64-encoded data.
    pub data: String,
}

/// `generateContent` response body.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct GenerateContentResponse {
    /// Response candidates; the first one is used.
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,
}

/// One response candidate.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct GeminiCandidate {
    /// Generated content.
    pub content: Option<GeminiContent>,
}

impl GenerateContentResponse {
    /// Join the text parts of the first candidate.
    ///
    /// # Errors
    ///
    /// Returns `CompletionError::Parse` when no candidate carries text.
    pub fn into_text(self) -> Result<String, CompletionError> {
        let content = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .ok_or_else(|| CompletionError::Parse("response carried no candidates".to_owned()))?;

        let text: String = content
            .parts
            .iter()
            .filter_map(|p| match p {
                GeminiPart::Text { text } => Some(text.as_str()),
                GeminiPart::InlineData { .. } => None,
            })
            .collect();

        if text.is_empty() {
            return Err(CompletionError::Parse(
                "response candidate carried no text parts".to_owned(),
            ));
        }
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Gemini `generateContent` client.
#[derive(Debug, Clone)]
pub struct GeminiCompletion {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiCompletion {
    /// Create a provider for the given API key and model.
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_owned(),
        }
    }

    /// Override the API base URL (used against test servers).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// The model identifier this provider is instantiated for.
    pub fn model_id(&self) -> &str {
        &self.model
    }

    async fn send(&self, request: &GenerateContentRequest) -> Result<String, CompletionError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let body = check_http_response(response).await?;
        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| CompletionError::Parse(format!("invalid generateContent response: {e}")))?;
        parsed.into_text()
    }
}

#[async_trait::async_trait]
impl CompletionService for GeminiCompletion {
    async fn chat(
        &self,
        briefing: &str,
        history: &[ChatMessage],
        utterance: &str,
    ) -> Result<String, CompletionError> {
        let mut contents: Vec<GeminiContent> = history
            .iter()
            .map(|m| GeminiContent::text(Some(m.role.as_str()), &m.text))
            .collect();
        contents.push(GeminiContent::text(Some("user"), utterance));

        let request = GenerateContentRequest {
            contents,
            system_instruction: Some(GeminiContent::text(None, briefing)),
        };

        tracing::debug!(
            model = %self.model,
            history_len = history.len(),
            "sending chat completion"
        );
        self.send(&request).await
    }

    async fn generate(
        &self,
        prompt: &str,
        stimulus: Option<&Attachment>,
    ) -> Result<String, CompletionError> {
        let mut parts = vec![GeminiPart::Text {
            text: prompt.to_owned(),
        }];
        if let Some(att) = stimulus {
            parts.push(GeminiPart::InlineData {
                inline_data: GeminiInlineData {
                    mime_type: att.mime_type.clone(),
                    data: att.data.clone(),
                },
            });
        }

        let request = GenerateContentRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_owned()),
                parts,
            }],
            system_instruction: None,
        };

        tracing::debug!(
            model = %self.model,
            has_stimulus = stimulus.is_some(),
            "sending one-shot completion"
        );
        self.send(&request).await
    }
}

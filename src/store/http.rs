//! HTTP clients for the persona and session stores.
//!
//! Wire DTOs follow the stores' snake_case JSON (`sender_type`,
//! `persona_ids`, `created_at`); mapping into engine types happens here so
//! the rest of the crate never sees wire shapes.

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::providers::sanitize_http_error_body;
use crate::types::{Agent, DocumentKind, KnowledgeDocument, Session, Speaker, Turn};

use super::{PersonaStore, SessionStore, StoreError};

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// Persona record as served by the persona store.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct PersonaDto {
    /// Persona id.
    pub id: String,
    /// Persona name.
    pub name: String,
    /// Identity/title description.
    #[serde(default)]
    pub description: String,
    /// Embedded document snapshot, when the store inlines it.
    #[serde(default)]
    pub files: Vec<PersonaFileDto>,
}

/// Knowledge document record.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct PersonaFileDto {
    /// Document name.
    pub name: String,
    /// Document text.
    pub content: String,
    /// Kind tag: `markdown`, `pdf_analysis`, or `linked_in_profile`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl PersonaFileDto {
    /// Map the wire record into an engine document.
    pub fn into_document(self) -> Result<KnowledgeDocument, StoreError> {
        let kind = match self.kind.as_str() {
            "markdown" => DocumentKind::Markdown,
            "pdf_analysis" => DocumentKind::PdfAnalysis,
            "linked_in_profile" => DocumentKind::LinkedInProfile,
            other => {
                return Err(StoreError::Parse(format!(
                    "unknown document kind: {other:?}"
                )))
            }
        };
        Ok(KnowledgeDocument {
            name: self.name,
            content: self.content,
            kind,
        })
    }
}

impl PersonaDto {
    /// Map the wire record into an engine agent.
    pub fn into_agent(self) -> Result<Agent, StoreError> {
        let documents = self
            .files
            .into_iter()
            .map(PersonaFileDto::into_document)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Agent {
            id: self.id,
            name: self.name,
            description: self.description,
            documents,
        })
    }
}

/// Session record as served by the session store.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct SessionDto {
    /// Session id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Participant persona ids, ordered.
    #[serde(default)]
    pub persona_ids: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last-update time.
    pub updated_at: DateTime<Utc>,
}

impl SessionDto {
    /// Map the wire record into an engine session.
    pub fn into_session(self) -> Session {
        Session {
            id: self.id,
            name: self.name,
            participant_agent_ids: self.persona_ids,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Request body for session creation.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct CreateSessionDto<'a> {
    /// Display name.
    pub name: &'a str,
    /// Participant persona ids.
    pub persona_ids: &'a [String],
}

/// Message record as served by the session store.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct MessageDto {
    /// Message id.
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// `user` or `persona`.
    pub sender_type: String,
    /// Speaking persona, present on persona messages.
    #[serde(default)]
    pub persona_id: Option<String>,
    /// Message text.
    pub content: String,
    /// Store-assigned creation time.
    pub created_at: DateTime<Utc>,
}

impl MessageDto {
    /// Map the wire record into an engine turn.
    pub fn into_turn(self) -> Result<Turn, StoreError> {
        let speaker = match self.sender_type.as_str() {
            "user" => Speaker::User,
            "persona" => Speaker::Agent,
            other => {
                return Err(StoreError::Parse(format!(
                    "unknown sender type: {other:?}"
                )))
            }
        };
        Ok(Turn {
            id: self.id,
            session_id: self.session_id,
            speaker,
            agent_id: self.persona_id,
            content: self.content,
            created_at: self.created_at,
        })
    }
}

/// Request body for turn appends; the store assigns id and timestamp.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct CreateMessageDto<'a> {
    /// `user` or `persona`.
    pub sender_type: &'a str,
    /// Speaking persona, present on persona messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona_id: Option<&'a str>,
    /// Message text.
    pub content: &'a str,
}

impl<'a> CreateMessageDto<'a> {
    /// Build an append request from a locally constructed turn.
    pub fn from_turn(turn: &'a Turn) -> Self {
        Self {
            sender_type: match turn.speaker {
                Speaker::User => "user",
                Speaker::Agent => "persona",
            },
            persona_id: turn.agent_id.as_deref(),
            content: &turn.content,
        }
    }
}

// ---------------------------------------------------------------------------
// Shared request plumbing
// ---------------------------------------------------------------------------

async fn read_body(response: reqwest::Response) -> Result<Option<String>, StoreError> {
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Ok(None);
    }
    let body = response.text().await?;
    if !status.is_success() {
        return Err(StoreError::HttpStatus {
            status: status.as_u16(),
            body: sanitize_http_error_body(&body),
        });
    }
    Ok(Some(body))
}

fn decode<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, StoreError> {
    serde_json::from_str(body).map_err(|e| StoreError::Parse(e.to_string()))
}

// ---------------------------------------------------------------------------
// Persona store client
// ---------------------------------------------------------------------------

/// `reqwest`-backed persona store client.
#[derive(Debug, Clone)]
pub struct HttpPersonaStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPersonaStore {
    /// Create a client rooted at `base_url` (e.g. `http://host/api`).
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl PersonaStore for HttpPersonaStore {
    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, StoreError> {
        let response = self
            .client
            .get(self.url(&format!("personas/{agent_id}")))
            .send()
            .await?;
        match read_body(response).await? {
            Some(body) => {
                let dto: PersonaDto = decode(&body)?;
                Ok(Some(dto.into_agent()?))
            }
            None => Ok(None),
        }
    }

    async fn list_documents(&self, agent_id: &str) -> Result<Vec<KnowledgeDocument>, StoreError> {
        let response = self
            .client
            .get(self.url(&format!("personas/{agent_id}/files")))
            .send()
            .await?;
        match read_body(response).await? {
            Some(body) => {
                let dtos: Vec<PersonaFileDto> = decode(&body)?;
                dtos.into_iter()
                    .map(PersonaFileDto::into_document)
                    .collect()
            }
            // Unknown agent: no documents rather than a hard failure; the
            // orchestrator validates agent existence separately.
            None => Ok(Vec::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Session store client
// ---------------------------------------------------------------------------

/// `reqwest`-backed session/message store client.
#[derive(Debug, Clone)]
pub struct HttpSessionStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSessionStore {
    /// Create a client rooted at `base_url` (e.g. `http://host/api`).
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl SessionStore for HttpSessionStore {
    async fn create_session(
        &self,
        name: &str,
        participant_agent_ids: &[String],
    ) -> Result<Session, StoreError> {
        let response = self
            .client
            .post(self.url("chat/sessions"))
            .json(&CreateSessionDto {
                name,
                persona_ids: participant_agent_ids,
            })
            .send()
            .await?;
        let body = read_body(response).await?.ok_or_else(|| StoreError::Parse(
            "session store returned 404 on create".to_owned(),
        ))?;
        let dto: SessionDto = decode(&body)?;
        Ok(dto.into_session())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let response = self
            .client
            .get(self.url(&format!("chat/sessions/{session_id}")))
            .send()
            .await?;
        match read_body(response).await? {
            Some(body) => {
                let dto: SessionDto = decode(&body)?;
                Ok(Some(dto.into_session()))
            }
            None => Ok(None),
        }
    }

    async fn append_turn(&self, session_id: &str, turn: &Turn) -> Result<Turn, StoreError> {
        let response = self
            .client
            .post(self.url(&format!("chat/sessions/{session_id}/messages")))
            .json(&CreateMessageDto::from_turn(turn))
            .send()
            .await?;
        let body = read_body(response).await?.ok_or_else(|| StoreError::Parse(
            format!("session store returned 404 appending to {session_id}"),
        ))?;
        let dto: MessageDto = decode(&body)?;
        dto.into_turn()
    }

    async fn list_turns(&self, session_id: &str) -> Result<Vec<Turn>, StoreError> {
        let response = self
            .client
            .get(self.url(&format!("chat/sessions/{session_id}/messages")))
            .send()
            .await?;
        match read_body(response).await? {
            Some(body) => {
                let dtos: Vec<MessageDto> = decode(&body)?;
                dtos.into_iter().map(MessageDto::into_turn).collect()
            }
            None => Ok(Vec::new()),
        }
    }
}

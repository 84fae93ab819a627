//! Core domain types shared across the engine.
//!
//! Agents, knowledge documents, sessions, and turns are owned by external
//! stores; the engine treats them as immutable snapshots for the duration of
//! one orchestration run and only ever appends new turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum number of participant agents in one session.
pub const MAX_PARTICIPANTS: usize = 5;

/// Kind tag attached to a knowledge document by the persona store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Free-form markdown authored by the user.
    Markdown,
    /// Extracted text from an uploaded PDF.
    PdfAnalysis,
    /// Pasted professional-profile text.
    LinkedInProfile,
}

/// A free-text knowledge document grounding one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    /// Display name, shown in briefing headers.
    pub name: String,
    /// Raw document text.
    pub content: String,
    /// Document kind tag.
    pub kind: DocumentKind,
}

/// A persona participant: profile text plus an ordered set of knowledge
/// documents.
///
/// The `documents` field may be an empty snapshot — the engine fetches from
/// the persona store only when it is, and caches that fetch for the duration
/// of one `advance()` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Store-assigned identifier.
    pub id: String,
    /// Persona name.
    pub name: String,
    /// Short identity/title description.
    pub description: String,
    /// Knowledge documents in store order (may be empty — fetch on demand).
    #[serde(default)]
    pub documents: Vec<KnowledgeDocument>,
}

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The human user.
    User,
    /// A persona agent.
    Agent,
}

/// One atomic conversation event.
///
/// Invariant: `agent_id` is present iff `speaker == Agent`. The
/// [`Turn::user`] and [`Turn::agent`] constructors enforce this; turns are
/// append-only and never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Turn identifier (locally a v4 UUID; the store may reassign on append).
    pub id: String,
    /// Owning session.
    pub session_id: String,
    /// Who spoke.
    pub speaker: Speaker,
    /// Speaking agent, present iff `speaker == Agent`.
    pub agent_id: Option<String>,
    /// Message text.
    pub content: String,
    /// Creation time; total order within a session, insertion-order tie-break.
    pub created_at: DateTime<Utc>,
}

impl Turn {
    /// Construct a user turn stamped with the current time.
    pub fn user(session_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_owned(),
            speaker: Speaker::User,
            agent_id: None,
            content: content.to_owned(),
            created_at: Utc::now(),
        }
    }

    /// Construct an agent turn stamped with the current time.
    pub fn agent(session_id: &str, agent_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_id: session_id.to_owned(),
            speaker: Speaker::Agent,
            agent_id: Some(agent_id.to_owned()),
            content: content.to_owned(),
            created_at: Utc::now(),
        }
    }

    /// Whether this turn was spoken by the user.
    pub fn is_user(&self) -> bool {
        self.speaker == Speaker::User
    }
}

/// A conversation session: an ordered turn log plus a fixed participant set.
///
/// The participant set is read once per `advance()` call; changing it
/// requires an updated session record in the external store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Store-assigned identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Participant agent ids, ordered, unique, at most [`MAX_PARTICIPANTS`].
    pub participant_agent_ids: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last-update time.
    pub updated_at: DateTime<Utc>,
}

/// Default display name for a new session: `Chat with {names}`.
pub fn default_session_name(agent_names: &[String]) -> String {
    format!("Chat with {}", agent_names.join(", "))
}

//! External store collaborators.
//!
//! The engine never owns persistence: agents and their documents live in the
//! persona store, sessions and turns in the session store. Both are reached
//! through the traits below; [`http`] provides `reqwest`-backed clients and
//! tests substitute in-memory fakes.

use async_trait::async_trait;

use crate::types::{Agent, KnowledgeDocument, Session, Turn};

pub mod http;

/// Errors returned by store clients.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// HTTP transport failure.
    #[error("store request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Response did not match the expected schema.
    #[error("store response parse error: {0}")]
    Parse(String),
    /// Store responded with an error status.
    #[error("store returned status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },
}

/// Read-only access to personas and their knowledge documents.
#[async_trait]
pub trait PersonaStore: Send + Sync {
    /// Fetch one agent snapshot, or `None` when the id is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport or decode failure.
    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, StoreError>;

    /// List an agent's knowledge documents in store order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport or decode failure.
    async fn list_documents(&self, agent_id: &str) -> Result<Vec<KnowledgeDocument>, StoreError>;
}

/// Append/read access to sessions and their turn logs.
///
/// Turn logs are append-only; the store assigns the final id and timestamp
/// on append. No transactional batching exists — partial failure mid-batch
/// leaves earlier appends in place, which the engine tolerates by design.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session with the given name and participant set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport or decode failure.
    async fn create_session(
        &self,
        name: &str,
        participant_agent_ids: &[String],
    ) -> Result<Session, StoreError>;

    /// Fetch one session, or `None` when the id is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport or decode failure.
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError>;

    /// Append one turn; the returned turn carries the store-assigned id and
    /// timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport or decode failure.
    async fn append_turn(&self, session_id: &str, turn: &Turn) -> Result<Turn, StoreError>;

    /// List a session's turns ordered by creation time (insertion-order
    /// tie-break).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport or decode failure.
    async fn list_turns(&self, session_id: &str) -> Result<Vec<Turn>, StoreError>;
}

//! One-shot simulations and their follow-up chats.
//!
//! A simulation renders a scenario template against a caller-supplied field
//! map plus built-in persona placeholders, runs a single completion call
//! (optionally with an inline stimulus), and seeds a locally cached
//! simulation session. Follow-ups continue that session as an ad-hoc
//! two-party chat; simulation turns are cached locally, never persisted to
//! the session store.

use std::sync::Arc;

use base64::Engine as _;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::providers::{Attachment, CompletionError, CompletionService};
use crate::store::{PersonaStore, StoreError};
use crate::types::{Agent, KnowledgeDocument, Turn};

use super::context::{fold_history, truncate_chars, ContextBudget};
use super::state::{SessionStateManager, StateError};
use super::template::{render, validate, FieldMap, Template};

/// Per-document cap when folding documents into a simulation profile block.
/// Tighter than the chat briefing cap — a one-shot prompt carries the whole
/// profile inline next to the scenario text.
pub const SIM_PROFILE_DOC_CHARS: usize = 15_000;

/// Built-in placeholder: the persona's name.
pub const FIELD_SELECTED_PROFILE: &str = "SELECTED_PROFILE";
/// Built-in placeholder: the full persona profile block.
pub const FIELD_SELECTED_PROFILE_FULL: &str = "SELECTED_PROFILE_FULL";

/// Errors from simulation runs and follow-ups.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Required template fields were not supplied.
    #[error("missing required template fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    /// The stimulus payload was not valid base64.
    #[error("invalid stimulus payload: {0}")]
    InvalidStimulus(String),
    /// No cached simulation session exists under this id.
    #[error("unknown simulation session {0}")]
    UnknownSession(String),
    /// The persona store failed.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
    /// Local state could not be read or written.
    #[error("state failure: {0}")]
    State(#[from] StateError),
    /// The completion call failed.
    #[error("completion failure: {0}")]
    Completion(#[from] CompletionError),
}

/// Decode and normalise an inline stimulus payload.
///
/// Accepts either pure base64 or a `data:` URL and returns the pure base64
/// portion after verifying it decodes.
///
/// # Errors
///
/// Returns [`SimulationError::InvalidStimulus`] on empty or malformed input.
pub fn decode_stimulus(data: &str) -> Result<String, SimulationError> {
    let payload = match data.split_once(',') {
        Some((_, rest)) => rest,
        None => data,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return Err(SimulationError::InvalidStimulus(
            "base64 content is empty".to_owned(),
        ));
    }
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| SimulationError::InvalidStimulus(e.to_string()))?;
    Ok(compact)
}

/// Runs one-shot simulations and their follow-up chats.
pub struct SimulationRunner {
    personas: Arc<dyn PersonaStore>,
    completion: Arc<dyn CompletionService>,
    state: Arc<Mutex<SessionStateManager>>,
    budget: ContextBudget,
}

impl std::fmt::Debug for SimulationRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationRunner")
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

impl SimulationRunner {
    /// Create a runner over the given collaborators.
    pub fn new(
        personas: Arc<dyn PersonaStore>,
        completion: Arc<dyn CompletionService>,
        state: Arc<Mutex<SessionStateManager>>,
        budget: ContextBudget,
    ) -> Self {
        Self {
            personas,
            completion,
            state,
            budget,
        }
    }

    /// Run a one-shot simulation: render the template, invoke the completion
    /// service once, and seed a fresh locally cached simulation session.
    ///
    /// The returned turn carries the new simulation session id; pass it to
    /// [`follow_up`](Self::follow_up) to continue the scenario.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError`] on validation, store, state, or
    /// completion failure.
    pub async fn run(
        &self,
        template: &Template,
        fields: &FieldMap,
        agent: &Agent,
        stimulus: Option<&Attachment>,
    ) -> Result<Turn, SimulationError> {
        let missing = validate(template, fields);
        if !missing.is_empty() {
            return Err(SimulationError::MissingFields(missing));
        }
        let stimulus = match stimulus {
            Some(att) => Some(Attachment {
                data: decode_stimulus(&att.data)?,
                mime_type: att.mime_type.clone(),
            }),
            None => None,
        };

        let documents = self.documents_for(agent).await?;
        let mut effective = fields.clone();
        effective
            .entry(FIELD_SELECTED_PROFILE.to_owned())
            .or_insert_with(|| agent.name.clone());
        effective
            .entry(FIELD_SELECTED_PROFILE_FULL.to_owned())
            .or_insert_with(|| profile_block(agent, &documents));

        let prompt = truncate_chars(
            &render(template, &effective),
            self.budget.max_oneshot_prompt_chars,
        );

        debug!(
            template = %template.title,
            agent = %agent.id,
            has_stimulus = stimulus.is_some(),
            "running simulation"
        );
        let text = self
            .completion
            .generate(&prompt, stimulus.as_ref())
            .await?;

        let session_id = Uuid::new_v4().to_string();
        let turn = Turn::agent(&session_id, &agent.id, &text);
        self.state
            .lock()
            .await
            .cache_turns(&session_id, vec![turn.clone()])?;
        info!(session = %session_id, agent = %agent.id, "simulation session seeded");
        Ok(turn)
    }

    /// Continue a simulation as an ad-hoc two-party chat.
    ///
    /// History comes from the local simulation cache; both the user turn and
    /// the reply are appended back to it.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError::UnknownSession`] when no cached session
    /// exists under `session_id`, or a state/completion failure.
    pub async fn follow_up(
        &self,
        session_id: &str,
        agent: &Agent,
        utterance: &str,
    ) -> Result<Turn, SimulationError> {
        let mut history = {
            let state = self.state.lock().await;
            state
                .load_cached_turns(session_id)
                .ok_or_else(|| SimulationError::UnknownSession(session_id.to_owned()))?
        };

        let briefing = follow_up_briefing(agent);
        let messages = fold_history(&history, &self.budget);
        let text = self
            .completion
            .chat(&briefing, &messages, utterance)
            .await?;

        let user_turn = Turn::user(session_id, utterance);
        let reply = Turn::agent(session_id, &agent.id, &text);
        history.push(user_turn);
        history.push(reply.clone());
        self.state
            .lock()
            .await
            .cache_turns(session_id, history)?;
        Ok(reply)
    }

    async fn documents_for(&self, agent: &Agent) -> Result<Vec<KnowledgeDocument>, StoreError> {
        if !agent.documents.is_empty() {
            return Ok(agent.documents.clone());
        }
        self.personas.list_documents(&agent.id).await
    }
}

/// Build the `SELECTED_PROFILE_FULL` block: name, description, then each
/// document under a file header, truncated to [`SIM_PROFILE_DOC_CHARS`].
fn profile_block(agent: &Agent, documents: &[KnowledgeDocument]) -> String {
    let mut block = format!(
        "NAME: {}\nDESCRIPTION: {}\n\nCORE BLUEPRINT FILES:\n",
        agent.name, agent.description
    );
    for doc in documents {
        block.push_str(&format!(
            "--- FILE: {} ---\n{}\n\n",
            doc.name,
            truncate_chars(&doc.content, SIM_PROFILE_DOC_CHARS)
        ));
    }
    block
}

/// Lightweight stay-in-character briefing for simulation follow-ups. The
/// full document briefing is deliberately not rebuilt here — the scenario
/// reaction already anchors the voice.
fn follow_up_briefing(agent: &Agent) -> String {
    format!(
        "You are strictly acting as the persona: {}.\nIdentity/Title: {}\nRespond to the user naturally in your unique voice. Staying in character is mandatory.",
        agent.name, agent.description
    )
}

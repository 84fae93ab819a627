//! Conversation orchestration: sequencing agent responses for one user turn.
//!
//! `advance()` produces one local-echo user turn plus one agent turn per
//! participant, strictly in participant order. Generation is deliberately
//! sequential — a later agent sees earlier agents' answers in the shared
//! transcript, and in-flight completion load stays at one request per
//! session. The user-turn append runs concurrently with generation; each
//! agent's context re-reads authoritative history and reconciles the local
//! echo explicitly (see [`ECHO_GRACE_SECONDS`]).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::providers::{ChatMessage, CompletionError, CompletionService};
use crate::store::{PersonaStore, SessionStore, StoreError};
use crate::types::{Agent, KnowledgeDocument, Session, Turn, MAX_PARTICIPANTS};

use super::context::{assemble_briefing, fold_history, ContextBudget};

/// Grace window for matching a just-sent user turn read back from the store
/// against its local echo. A store-read user turn with identical content and
/// a creation-time delta within this window is treated as the same message.
pub const ECHO_GRACE_SECONDS: u64 = 5;

/// Buffer size of the turn stream channel.
const STREAM_CHANNEL_CAPACITY: usize = 16;

/// Errors from one `advance()` call.
///
/// Mid-batch failures carry the turns already produced (and persisted —
/// they are never rolled back) so a caller can tell which agents answered.
#[derive(Debug, Error)]
pub enum AdvanceError {
    /// The session has no participant agents.
    #[error("session {0} has no participant agents")]
    NoParticipants(String),
    /// The session exceeds the participant limit.
    #[error("session {session_id} has {count} participants (max {max})", max = MAX_PARTICIPANTS)]
    TooManyParticipants {
        /// Offending session.
        session_id: String,
        /// Participant count found.
        count: usize,
    },
    /// The same agent appears twice in the participant set.
    #[error("duplicate participant agent {agent_id} in session {session_id}")]
    DuplicateParticipant {
        /// Offending session.
        session_id: String,
        /// Repeated agent id.
        agent_id: String,
    },
    /// A participant id has no agent record in the persona store.
    #[error("agent {0} not found in persona store")]
    UnknownAgent(String),
    /// A store call failed mid-batch.
    #[error("store failure while advancing session: {source}")]
    Store {
        /// Underlying store error.
        source: StoreError,
        /// Turns produced before the failure.
        completed: Vec<Turn>,
    },
    /// A completion call failed; remaining participants were aborted
    /// fail-fast.
    #[error("completion failed for agent {agent_id}: {source}")]
    Completion {
        /// Agent whose completion call raised.
        agent_id: String,
        /// Underlying completion error.
        source: CompletionError,
        /// Turns produced before the failure (user echo plus earlier
        /// agents' answers).
        completed: Vec<Turn>,
        /// Agents that did not answer: the failing agent first, then every
        /// participant that was never invoked.
        unanswered: Vec<String>,
    },
}

impl AdvanceError {
    /// Turns already produced (and persisted) before the failure.
    pub fn completed_turns(&self) -> &[Turn] {
        match self {
            Self::Store { completed, .. } | Self::Completion { completed, .. } => completed,
            _ => &[],
        }
    }
}

/// One item of the streaming `advance` variant.
#[derive(Debug)]
pub enum AdvanceEvent {
    /// A newly produced turn, yielded as soon as it exists.
    Turn(Turn),
    /// The batch aborted; carries the same report as the non-streaming API.
    Aborted(AdvanceError),
}

/// Sequences completion calls across a session's participants.
pub struct ConversationOrchestrator {
    sessions: Arc<dyn SessionStore>,
    personas: Arc<dyn PersonaStore>,
    completion: Arc<dyn CompletionService>,
    budget: ContextBudget,
}

impl std::fmt::Debug for ConversationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationOrchestrator")
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

impl ConversationOrchestrator {
    /// Create an orchestrator over the given collaborators.
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        personas: Arc<dyn PersonaStore>,
        completion: Arc<dyn CompletionService>,
        budget: ContextBudget,
    ) -> Self {
        Self {
            sessions,
            personas,
            completion,
            budget,
        }
    }

    /// Advance the session by one user utterance.
    ///
    /// Returns the new turns in order: the user's local echo first, then one
    /// turn per participant in participant order. Each agent turn's
    /// `created_at` is strictly after the user turn's.
    ///
    /// # Errors
    ///
    /// Returns [`AdvanceError`] on validation failure, store failure, or the
    /// first completion failure (fail-fast; earlier turns stay persisted).
    pub async fn advance(
        &self,
        session: &Session,
        utterance: &str,
    ) -> Result<Vec<Turn>, AdvanceError> {
        self.advance_with_sink(session, utterance, None).await
    }

    /// Streaming variant of [`advance`](Self::advance): turns are yielded as
    /// each agent finishes, so a caller can render one answer before the
    /// next agent begins. On failure the final item is
    /// [`AdvanceEvent::Aborted`].
    pub fn advance_stream(
        self: &Arc<Self>,
        session: Session,
        utterance: String,
    ) -> ReceiverStream<AdvanceEvent> {
        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this
                .advance_with_sink(&session, &utterance, Some(&tx))
                .await
            {
                let _ = tx.send(AdvanceEvent::Aborted(e)).await;
            }
        });
        ReceiverStream::new(rx)
    }

    async fn advance_with_sink(
        &self,
        session: &Session,
        utterance: &str,
        sink: Option<&mpsc::Sender<AdvanceEvent>>,
    ) -> Result<Vec<Turn>, AdvanceError> {
        let agents = self.resolve_participants(session).await?;

        // Local echo: constructed and yielded before persistence confirms.
        let user_turn = Turn::user(&session.id, utterance);
        let mut produced: Vec<Turn> = vec![user_turn.clone()];
        emit(sink, user_turn.clone()).await;

        // Fire the user-turn append without blocking generation. The task
        // logs its own outcome; context builds below do not trust the echo
        // alone and re-read authoritative history instead.
        let persist_store = Arc::clone(&self.sessions);
        let echo_for_persist = user_turn.clone();
        let persist_session = session.id.clone();
        tokio::spawn(async move {
            match persist_store
                .append_turn(&persist_session, &echo_for_persist)
                .await
            {
                Ok(_) => debug!(session = %persist_session, "user turn persisted"),
                Err(e) => {
                    warn!(session = %persist_session, error = %e, "failed to persist user turn");
                }
            }
        });

        // Sequential fold over participants: each step reads a fresh history
        // snapshot so a later agent sees every earlier answer.
        let mut documents_cache: HashMap<String, Vec<KnowledgeDocument>> = HashMap::new();
        for (index, agent) in agents.iter().enumerate() {
            let documents = match self.documents_for(agent, &mut documents_cache).await {
                Ok(docs) => docs,
                Err(source) => {
                    return Err(AdvanceError::Store {
                        source,
                        completed: produced,
                    })
                }
            };

            let history = match self.sessions.list_turns(&session.id).await {
                Ok(turns) => reconcile_local_echo(turns, &user_turn),
                Err(source) => {
                    return Err(AdvanceError::Store {
                        source,
                        completed: produced,
                    })
                }
            };
            let messages: Vec<ChatMessage> = fold_history(&history, &self.budget);
            let briefing = assemble_briefing(agent, &documents, &self.budget);

            debug!(
                session = %session.id,
                agent = %agent.id,
                history_len = messages.len(),
                "generating agent response"
            );
            let text = match self.completion.chat(&briefing, &messages, utterance).await {
                Ok(text) => text,
                Err(source) => {
                    let unanswered: Vec<String> = agents
                        .iter()
                        .skip(index)
                        .map(|a| a.id.clone())
                        .collect();
                    return Err(AdvanceError::Completion {
                        agent_id: agent.id.clone(),
                        source,
                        completed: produced,
                        unanswered,
                    });
                }
            };

            let draft = Turn::agent(&session.id, &agent.id, &text);
            let stored = match self.sessions.append_turn(&session.id, &draft).await {
                Ok(turn) => turn,
                Err(source) => {
                    return Err(AdvanceError::Store {
                        source,
                        completed: produced,
                    })
                }
            };
            produced.push(stored.clone());
            emit(sink, stored).await;
        }

        Ok(produced)
    }

    /// Resolve and validate the participant set before any turn is produced.
    async fn resolve_participants(&self, session: &Session) -> Result<Vec<Agent>, AdvanceError> {
        let ids = &session.participant_agent_ids;
        if ids.is_empty() {
            return Err(AdvanceError::NoParticipants(session.id.clone()));
        }
        if ids.len() > MAX_PARTICIPANTS {
            return Err(AdvanceError::TooManyParticipants {
                session_id: session.id.clone(),
                count: ids.len(),
            });
        }
        let mut seen: HashSet<&str> = HashSet::new();
        for id in ids {
            if !seen.insert(id.as_str()) {
                return Err(AdvanceError::DuplicateParticipant {
                    session_id: session.id.clone(),
                    agent_id: id.clone(),
                });
            }
        }

        let mut agents = Vec::with_capacity(ids.len());
        for id in ids {
            let agent = self
                .personas
                .get_agent(id)
                .await
                .map_err(|source| AdvanceError::Store {
                    source,
                    completed: Vec::new(),
                })?
                .ok_or_else(|| AdvanceError::UnknownAgent(id.clone()))?;
            agents.push(agent);
        }
        Ok(agents)
    }

    /// Documents for one agent, fetched at most once per `advance()` call.
    ///
    /// An agent snapshot that already carries documents is used as-is.
    async fn documents_for(
        &self,
        agent: &Agent,
        cache: &mut HashMap<String, Vec<KnowledgeDocument>>,
    ) -> Result<Vec<KnowledgeDocument>, StoreError> {
        if !agent.documents.is_empty() {
            return Ok(agent.documents.clone());
        }
        if let Some(docs) = cache.get(&agent.id) {
            return Ok(docs.clone());
        }
        let docs = self.personas.list_documents(&agent.id).await?;
        cache.insert(agent.id.clone(), docs.clone());
        Ok(docs)
    }
}

async fn emit(sink: Option<&mpsc::Sender<AdvanceEvent>>, turn: Turn) {
    if let Some(tx) = sink {
        let _ = tx.send(AdvanceEvent::Turn(turn)).await;
    }
}

/// Reconcile the authoritative history with the local echo of the user's own
/// message.
///
/// The just-sent utterance is handed to the completion call separately, so
/// the folded history must contain it exactly zero times. A store-read turn
/// counts as the echo when its id matches, or when it is a user turn with
/// identical content created within [`ECHO_GRACE_SECONDS`] of the echo —
/// the only place fuzzy matching is permitted, and only for the single most
/// recent user turn.
pub fn reconcile_local_echo(history: Vec<Turn>, echo: &Turn) -> Vec<Turn> {
    history
        .into_iter()
        .filter(|turn| !matches_local_echo(turn, echo))
        .collect()
}

fn matches_local_echo(turn: &Turn, echo: &Turn) -> bool {
    if turn.id == echo.id {
        return true;
    }
    turn.is_user()
        && turn.content == echo.content
        && turn
            .created_at
            .signed_duration_since(echo.created_at)
            .num_seconds()
            .unsigned_abs()
            <= ECHO_GRACE_SECONDS
}

//! Orchestration engine: context assembly, template substitution,
//! conversation sequencing, simulations, and local session state.
//!
//! The [`Engine`] facade wires the pieces over a shared set of external
//! collaborators and is the surface the CLI (or any API layer) drives.

use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::Mutex;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

pub mod context;
pub mod orchestrator;
pub mod simulation;
pub mod state;
pub mod template;

use crate::config::ColloquyConfig;
use crate::providers::gemini::GeminiCompletion;
use crate::providers::{Attachment, CompletionService};
use crate::store::http::{HttpPersonaStore, HttpSessionStore};
use crate::store::{PersonaStore, SessionStore, StoreError};
use crate::types::{default_session_name, Agent, Session, Turn};

use self::context::ContextBudget;
use self::orchestrator::{AdvanceError, AdvanceEvent, ConversationOrchestrator};
use self::simulation::{SimulationError, SimulationRunner};
use self::state::{ResumedSession, SessionStateManager, StateError};
use self::template::{FieldMap, Template};

/// Facade over the orchestration engine.
pub struct Engine {
    orchestrator: Arc<ConversationOrchestrator>,
    simulation: SimulationRunner,
    state: Arc<Mutex<SessionStateManager>>,
    sessions: Arc<dyn SessionStore>,
    personas: Arc<dyn PersonaStore>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine").finish_non_exhaustive()
    }
}

impl Engine {
    /// Assemble an engine over explicit collaborators (tests inject fakes
    /// here).
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        personas: Arc<dyn PersonaStore>,
        completion: Arc<dyn CompletionService>,
        state: SessionStateManager,
        budget: ContextBudget,
    ) -> Self {
        let state = Arc::new(Mutex::new(state));
        let orchestrator = Arc::new(ConversationOrchestrator::new(
            Arc::clone(&sessions),
            Arc::clone(&personas),
            Arc::clone(&completion),
            budget,
        ));
        let simulation = SimulationRunner::new(
            Arc::clone(&personas),
            Arc::clone(&completion),
            Arc::clone(&state),
            budget,
        );
        Self {
            orchestrator,
            simulation,
            state,
            sessions,
            personas,
        }
    }

    /// Build an engine from configuration: HTTP store clients, the Gemini
    /// completion provider, and the platform state directory.
    ///
    /// # Errors
    ///
    /// Fails when no completion API key is configured or the state file is
    /// unreadable.
    pub fn from_config(config: &ColloquyConfig) -> anyhow::Result<Self> {
        for (label, value) in [
            ("persona store", &config.stores.persona_base_url),
            ("session store", &config.stores.session_base_url),
        ] {
            url::Url::parse(value)
                .with_context(|| format!("invalid {label} base URL: {value}"))?;
        }

        let client = reqwest::Client::new();

        let sessions: Arc<dyn SessionStore> = Arc::new(HttpSessionStore::new(
            client.clone(),
            config.stores.session_base_url.clone(),
        ));
        let personas: Arc<dyn PersonaStore> = Arc::new(HttpPersonaStore::new(
            client.clone(),
            config.stores.persona_base_url.clone(),
        ));

        let api_key = config
            .completion
            .api_key
            .clone()
            .context("no completion API key configured (set COLLOQUY_GEMINI_API_KEY)")?;
        let completion: Arc<dyn CompletionService> = Arc::new(GeminiCompletion::new(
            client,
            api_key,
            config.completion.model.clone(),
        ));

        let state_dir = config.state_dir()?;
        let state = SessionStateManager::open(&state_dir)
            .with_context(|| format!("failed to open session state in {}", state_dir.display()))?;

        Ok(Self::new(
            sessions,
            personas,
            completion,
            state,
            ContextBudget::from(&config.budget),
        ))
    }

    /// Create a session in the store, mark it active, and seed an empty
    /// turn cache. When `name` is absent the session is named after its
    /// participants.
    ///
    /// # Errors
    ///
    /// Returns store or state failures.
    pub async fn start_session(
        &self,
        name: Option<&str>,
        agent_ids: &[String],
    ) -> anyhow::Result<Session> {
        let name = match name {
            Some(n) => n.to_owned(),
            None => {
                let mut names = Vec::with_capacity(agent_ids.len());
                for id in agent_ids {
                    let agent = self
                        .personas
                        .get_agent(id)
                        .await?
                        .with_context(|| format!("agent {id} not found in persona store"))?;
                    names.push(agent.name);
                }
                default_session_name(&names)
            }
        };

        let session = self.sessions.create_session(&name, agent_ids).await?;
        let mut state = self.state.lock().await;
        state.set_active(&session.id)?;
        state.cache_turns(&session.id, Vec::new())?;
        Ok(session)
    }

    /// Advance the session by one user utterance (see
    /// [`ConversationOrchestrator::advance`]). On success the active pointer
    /// and turn cache are updated; cache failures are logged, never fatal.
    ///
    /// # Errors
    ///
    /// Returns [`AdvanceError`] from the orchestrator.
    pub async fn advance(
        &self,
        session: &Session,
        utterance: &str,
    ) -> Result<Vec<Turn>, AdvanceError> {
        let turns = self.orchestrator.advance(session, utterance).await?;
        self.record_turns(&session.id, &turns).await;
        Ok(turns)
    }

    /// Streaming variant of [`advance`](Self::advance).
    pub fn advance_stream(
        &self,
        session: Session,
        utterance: String,
    ) -> ReceiverStream<AdvanceEvent> {
        self.orchestrator.advance_stream(session, utterance)
    }

    /// Resume the last active session (see [`SessionStateManager::resume`]).
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when there is no active session, it vanished
    /// from the store, or the store failed.
    pub async fn resume(&self) -> Result<ResumedSession, StateError> {
        self.state.lock().await.resume(self.sessions.as_ref()).await
    }

    /// Refresh one session's turn cache from the authoritative store.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on store or state-file failure.
    pub async fn refresh_turns(&self, session_id: &str) -> Result<Vec<Turn>, StateError> {
        self.state
            .lock()
            .await
            .refresh_turns(self.sessions.as_ref(), session_id)
            .await
    }

    /// Fetch one session record from the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport or decode failure.
    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        self.sessions.get_session(session_id).await
    }

    /// Fetch one agent snapshot from the persona store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on transport or decode failure.
    pub async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, StoreError> {
        self.personas.get_agent(agent_id).await
    }

    /// Run a one-shot simulation (see [`SimulationRunner::run`]).
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError`] on validation, store, state, or
    /// completion failure.
    pub async fn run_simulation(
        &self,
        template: &Template,
        fields: &FieldMap,
        agent: &Agent,
        stimulus: Option<&Attachment>,
    ) -> Result<Turn, SimulationError> {
        self.simulation.run(template, fields, agent, stimulus).await
    }

    /// Continue a simulation as an ad-hoc chat (see
    /// [`SimulationRunner::follow_up`]).
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError`] on unknown session or downstream failure.
    pub async fn follow_up(
        &self,
        session_id: &str,
        agent: &Agent,
        utterance: &str,
    ) -> Result<Turn, SimulationError> {
        self.simulation.follow_up(session_id, agent, utterance).await
    }

    /// Best-effort local bookkeeping after a successful advance.
    async fn record_turns(&self, session_id: &str, new_turns: &[Turn]) {
        let mut state = self.state.lock().await;
        if let Err(e) = state.set_active(session_id) {
            warn!(session = %session_id, error = %e, "failed to update active pointer");
        }
        let mut cached = state.load_cached_turns(session_id).unwrap_or_default();
        cached.extend(new_turns.iter().cloned());
        if let Err(e) = state.cache_turns(session_id, cached) {
            warn!(session = %session_id, error = %e, "failed to update turn cache");
        }
    }
}

//! Shared in-memory fakes for the engine integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use colloquy::providers::{Attachment, ChatMessage, CompletionError, CompletionService};
use colloquy::store::{PersonaStore, SessionStore, StoreError};
use colloquy::types::{Agent, DocumentKind, KnowledgeDocument, Session, Turn};

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn make_agent(id: &str, name: &str) -> Agent {
    Agent {
        id: id.to_owned(),
        name: name.to_owned(),
        description: format!("{name}, Test Persona"),
        documents: Vec::new(),
    }
}

pub fn make_document(name: &str, content: &str) -> KnowledgeDocument {
    KnowledgeDocument {
        name: name.to_owned(),
        content: content.to_owned(),
        kind: DocumentKind::Markdown,
    }
}

pub fn make_session(id: &str, participant_ids: &[&str]) -> Session {
    Session {
        id: id.to_owned(),
        name: "Test Session".to_owned(),
        participant_agent_ids: participant_ids.iter().map(|s| (*s).to_owned()).collect(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

// ---------------------------------------------------------------------------
// Persona store fake
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakePersonaStore {
    agents: HashMap<String, Agent>,
    documents: HashMap<String, Vec<KnowledgeDocument>>,
    /// Number of `list_documents` calls observed.
    pub document_fetches: AtomicU32,
}

impl FakePersonaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.agents.insert(agent.id.clone(), agent);
        self
    }

    pub fn with_documents(mut self, agent_id: &str, docs: Vec<KnowledgeDocument>) -> Self {
        self.documents.insert(agent_id.to_owned(), docs);
        self
    }

    pub fn fetch_count(&self) -> u32 {
        self.document_fetches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PersonaStore for FakePersonaStore {
    async fn get_agent(&self, agent_id: &str) -> Result<Option<Agent>, StoreError> {
        Ok(self.agents.get(agent_id).cloned())
    }

    async fn list_documents(&self, agent_id: &str) -> Result<Vec<KnowledgeDocument>, StoreError> {
        self.document_fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.documents.get(agent_id).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Session store fake
// ---------------------------------------------------------------------------

/// In-memory session store. With `hide_user_appends` set, appended user
/// turns are acknowledged but never become visible in `list_turns`,
/// simulating store-write latency during an advance.
#[derive(Default)]
pub struct FakeSessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    turns: Mutex<HashMap<String, Vec<Turn>>>,
    counter: AtomicU32,
    pub hide_user_appends: bool,
}

impl FakeSessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hiding_user_appends() -> Self {
        Self {
            hide_user_appends: true,
            ..Self::default()
        }
    }

    pub fn with_session(self, session: Session) -> Self {
        {
            let mut sessions = self.sessions.lock().expect("sessions lock");
            sessions.insert(session.id.clone(), session);
        }
        self
    }

    /// Seed a turn directly into the visible log.
    pub fn seed_turn(&self, turn: Turn) {
        let mut turns = self.turns.lock().expect("turns lock");
        turns.entry(turn.session_id.clone()).or_default().push(turn);
    }

    /// Snapshot of the visible log for one session.
    pub fn stored_turns(&self, session_id: &str) -> Vec<Turn> {
        let turns = self.turns.lock().expect("turns lock");
        turns.get(session_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl SessionStore for FakeSessionStore {
    async fn create_session(
        &self,
        name: &str,
        participant_agent_ids: &[String],
    ) -> Result<Session, StoreError> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let session = Session {
            id: format!("sess-{n}"),
            name: name.to_owned(),
            participant_agent_ids: participant_agent_ids.to_vec(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let mut sessions = self.sessions.lock().expect("sessions lock");
        sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<Session>, StoreError> {
        let sessions = self.sessions.lock().expect("sessions lock");
        Ok(sessions.get(session_id).cloned())
    }

    async fn append_turn(&self, session_id: &str, turn: &Turn) -> Result<Turn, StoreError> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut stored = turn.clone();
        stored.id = format!("srv-{n}");
        stored.created_at = Utc::now();
        if !(self.hide_user_appends && turn.is_user()) {
            let mut turns = self.turns.lock().expect("turns lock");
            turns
                .entry(session_id.to_owned())
                .or_default()
                .push(stored.clone());
        }
        Ok(stored)
    }

    async fn list_turns(&self, session_id: &str) -> Result<Vec<Turn>, StoreError> {
        let turns = self.turns.lock().expect("turns lock");
        Ok(turns.get(session_id).cloned().unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Completion fake
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RecordedChat {
    pub briefing: String,
    pub history: Vec<ChatMessage>,
    pub utterance: String,
}

#[derive(Debug, Clone)]
pub struct RecordedGenerate {
    pub prompt: String,
    pub stimulus: Option<Attachment>,
}

/// Records every call and answers `reply-{n}`; optionally fails the n-th
/// chat call (1-based).
#[derive(Default)]
pub struct ScriptedCompletion {
    pub fail_on_chat_call: Option<usize>,
    chat_calls: Mutex<Vec<RecordedChat>>,
    generate_calls: Mutex<Vec<RecordedGenerate>>,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(call: usize) -> Self {
        Self {
            fail_on_chat_call: Some(call),
            ..Self::default()
        }
    }

    pub fn chat_calls(&self) -> Vec<RecordedChat> {
        self.chat_calls.lock().expect("chat calls lock").clone()
    }

    pub fn generate_calls(&self) -> Vec<RecordedGenerate> {
        self.generate_calls
            .lock()
            .expect("generate calls lock")
            .clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn chat(
        &self,
        briefing: &str,
        history: &[ChatMessage],
        utterance: &str,
    ) -> Result<String, CompletionError> {
        let n = {
            let mut calls = self.chat_calls.lock().expect("chat calls lock");
            calls.push(RecordedChat {
                briefing: briefing.to_owned(),
                history: history.to_vec(),
                utterance: utterance.to_owned(),
            });
            calls.len()
        };
        if self.fail_on_chat_call == Some(n) {
            return Err(CompletionError::Unavailable(format!(
                "scripted failure on call {n}"
            )));
        }
        Ok(format!("reply-{n}"))
    }

    async fn generate(
        &self,
        prompt: &str,
        stimulus: Option<&Attachment>,
    ) -> Result<String, CompletionError> {
        let mut calls = self.generate_calls.lock().expect("generate calls lock");
        calls.push(RecordedGenerate {
            prompt: prompt.to_owned(),
            stimulus: stimulus.cloned(),
        });
        Ok("simulated-reaction".to_owned())
    }
}

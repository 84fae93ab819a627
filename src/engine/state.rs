//! Local session state: the active-session pointer and the turn cache.
//!
//! The [`SessionStateManager`] persists a single small JSON document holding
//! which session the user was last looking at, plus a per-session cache of
//! turns used to redisplay instantly on resume while an authoritative
//! refresh runs. The cache is never a substitute for the session store,
//! which stays the source of truth for orchestration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::store::{SessionStore, StoreError};
use crate::types::{Session, Turn};

/// State file name inside the state directory.
const STATE_FILE: &str = "state.json";

/// Errors from local-state operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// Reading or writing the state file failed.
    #[error("state file I/O failed at {path}: {source}")]
    Io {
        /// Offending path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The state file held malformed JSON.
    #[error("state file corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    /// No active-session pointer is set.
    #[error("no active session")]
    NoActiveSession,
    /// The store no longer knows the cached session; pointer and cache for
    /// that id were cleared.
    #[error("session {0} no longer exists in the store")]
    SessionGone(String),
    /// The authoritative store failed during resume or refresh.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

/// On-disk shape of the local state document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LocalState {
    /// Session the user was last looking at.
    active_session_id: Option<String>,
    /// Cached turns, last-write-wins, keyed by session id.
    #[serde(default)]
    turn_cache: HashMap<String, Vec<Turn>>,
}

/// A session restored from the active pointer, with its cached turns for
/// instant redisplay.
#[derive(Debug, Clone)]
pub struct ResumedSession {
    /// Authoritative session record.
    pub session: Session,
    /// Locally cached turns (possibly stale; refresh from the store).
    pub cached_turns: Vec<Turn>,
}

/// Tracks the active session and caches turns across process restarts.
#[derive(Debug)]
pub struct SessionStateManager {
    path: PathBuf,
    state: LocalState,
}

impl SessionStateManager {
    /// Open (or initialise) the state document at `dir/state.json`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] when the file exists but cannot be read or
    /// parsed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StateError> {
        let path = dir.as_ref().join(STATE_FILE);
        let state = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => LocalState::default(),
            Err(source) => {
                return Err(StateError::Io {
                    path: path.clone(),
                    source,
                })
            }
        };
        debug!(path = %path.display(), "session state opened");
        Ok(Self { path, state })
    }

    /// The session id the user was last looking at, if any.
    pub fn active_session_id(&self) -> Option<&str> {
        self.state.active_session_id.as_deref()
    }

    /// Point the durable marker at `session_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] when the state file cannot be written.
    pub fn set_active(&mut self, session_id: &str) -> Result<(), StateError> {
        self.state.active_session_id = Some(session_id.to_owned());
        self.save()
    }

    /// Clear the durable marker (explicit new-session action).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] when the state file cannot be written.
    pub fn clear_active(&mut self) -> Result<(), StateError> {
        self.state.active_session_id = None;
        self.save()
    }

    /// Replace the cached turns for one session (last-write-wins).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] when the state file cannot be written.
    pub fn cache_turns(&mut self, session_id: &str, turns: Vec<Turn>) -> Result<(), StateError> {
        self.state.turn_cache.insert(session_id.to_owned(), turns);
        self.save()
    }

    /// Cached turns for one session, if any.
    pub fn load_cached_turns(&self, session_id: &str) -> Option<Vec<Turn>> {
        self.state.turn_cache.get(session_id).cloned()
    }

    /// Drop the cache entry for one session, and the active pointer when it
    /// points at it.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] when the state file cannot be written.
    pub fn forget_session(&mut self, session_id: &str) -> Result<(), StateError> {
        self.state.turn_cache.remove(session_id);
        if self.state.active_session_id.as_deref() == Some(session_id) {
            self.state.active_session_id = None;
        }
        self.save()
    }

    /// Resume the last active session.
    ///
    /// Returns the authoritative session record plus cached turns for
    /// instant redisplay; callers then refresh via
    /// [`refresh_turns`](Self::refresh_turns) in the background. When the
    /// store no longer knows the session, both the active pointer and the
    /// cache for that id are cleared and [`StateError::SessionGone`] is
    /// reported — a vanished session is never silently reconstructed.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::NoActiveSession`], [`StateError::SessionGone`],
    /// or a wrapped store/I/O failure.
    pub async fn resume(&mut self, store: &dyn SessionStore) -> Result<ResumedSession, StateError> {
        let session_id = self
            .state
            .active_session_id
            .clone()
            .ok_or(StateError::NoActiveSession)?;

        match store.get_session(&session_id).await? {
            Some(session) => {
                let cached_turns = self.load_cached_turns(&session_id).unwrap_or_default();
                info!(session = %session_id, cached = cached_turns.len(), "session resumed");
                Ok(ResumedSession {
                    session,
                    cached_turns,
                })
            }
            None => {
                info!(session = %session_id, "cached session gone from store, clearing state");
                self.forget_session(&session_id)?;
                Err(StateError::SessionGone(session_id))
            }
        }
    }

    /// Fetch the authoritative turn list and overwrite the cache with it.
    ///
    /// # Errors
    ///
    /// Returns a wrapped store or I/O failure.
    pub async fn refresh_turns(
        &mut self,
        store: &dyn SessionStore,
        session_id: &str,
    ) -> Result<Vec<Turn>, StateError> {
        let turns = store.list_turns(session_id).await?;
        self.cache_turns(session_id, turns.clone())?;
        Ok(turns)
    }

    fn save(&self) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StateError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let contents = serde_json::to_string_pretty(&self.state)?;
        std::fs::write(&self.path, contents).map_err(|source| StateError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

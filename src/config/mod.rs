//! Configuration loading and management.
//!
//! Loads configuration from `./colloquy.toml` (or `$COLLOQUY_CONFIG_PATH`).
//! Environment variables override file values; file values override
//! defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::engine::context::ContextBudget;
use crate::providers::gemini::DEFAULT_GEMINI_MODEL;

/// Top-level configuration.
///
/// Precedence: env vars > config file > defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ColloquyConfig {
    /// Context budget limits (`[budget]`).
    pub budget: BudgetConfig,
    /// External store endpoints (`[stores]`).
    pub stores: StoresConfig,
    /// Completion provider settings (`[completion]`).
    pub completion: CompletionConfig,
    /// Local state location (`[state]`).
    pub state: StateConfig,
}

impl ColloquyConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// Config file path: `$COLLOQUY_CONFIG_PATH` or `./colloquy.toml`. A
    /// missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Parse a TOML string into config (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: ColloquyConfig =
            toml::from_str(toml_str).context("failed to parse config TOML")?;
        Ok(config)
    }

    fn load_from_file() -> Result<Self> {
        let path = Self::config_path_with(|key| std::env::var(key).ok());
        match std::fs::read_to_string(&path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config file found, using defaults");
                Ok(ColloquyConfig::default())
            }
            Err(e) => Err(anyhow::anyhow!("failed to read config file: {e}")),
        }
    }

    fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env("COLLOQUY_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("colloquy.toml"))
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function for testability.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("COLLOQUY_PERSONA_STORE_URL") {
            self.stores.persona_base_url = v;
        }
        if let Some(v) = env("COLLOQUY_SESSION_STORE_URL") {
            self.stores.session_base_url = v;
        }
        if let Some(v) = env("COLLOQUY_GEMINI_API_KEY").or_else(|| env("GEMINI_API_KEY")) {
            self.completion.api_key = Some(v);
        }
        if let Some(v) = env("COLLOQUY_GEMINI_MODEL") {
            self.completion.model = v;
        }
        if let Some(v) = env("COLLOQUY_STATE_DIR") {
            self.state.dir = Some(v);
        }
    }

    /// Resolve the directory holding the local state document.
    ///
    /// Uses `[state] dir` (or `$COLLOQUY_STATE_DIR`) when set, else the
    /// platform state directory.
    ///
    /// # Errors
    ///
    /// Returns an error when no platform directory can be determined.
    pub fn state_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.state.dir {
            return Ok(PathBuf::from(dir));
        }
        let dirs = directories::ProjectDirs::from("", "", "colloquy")
            .context("could not determine a platform state directory")?;
        Ok(dirs
            .state_dir()
            .unwrap_or_else(|| dirs.data_local_dir())
            .to_path_buf())
    }
}

/// Context budget limits (`[budget]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Per-document cap when folded into a briefing.
    pub max_document_chars: usize,
    /// History window: number of most-recent turns kept.
    pub max_history_turns: usize,
    /// Per-turn cap when folded into model history.
    pub max_history_chars_per_turn: usize,
    /// Total briefing cap.
    pub max_total_context_chars: usize,
    /// Cap for bulk one-shot prompts (simulations).
    pub max_oneshot_prompt_chars: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        let defaults = ContextBudget::default();
        Self {
            max_document_chars: defaults.max_document_chars,
            max_history_turns: defaults.max_history_turns,
            max_history_chars_per_turn: defaults.max_history_chars_per_turn,
            max_total_context_chars: defaults.max_total_context_chars,
            max_oneshot_prompt_chars: defaults.max_oneshot_prompt_chars,
        }
    }
}

impl From<&BudgetConfig> for ContextBudget {
    fn from(config: &BudgetConfig) -> Self {
        Self {
            max_document_chars: config.max_document_chars,
            max_history_turns: config.max_history_turns,
            max_history_chars_per_turn: config.max_history_chars_per_turn,
            max_total_context_chars: config.max_total_context_chars,
            max_oneshot_prompt_chars: config.max_oneshot_prompt_chars,
        }
    }
}

/// External store endpoints (`[stores]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoresConfig {
    /// Base URL of the persona/document store API.
    pub persona_base_url: String,
    /// Base URL of the session/message store API.
    pub session_base_url: String,
}

impl Default for StoresConfig {
    fn default() -> Self {
        Self {
            persona_base_url: "http://localhost:3001/api".to_owned(),
            session_base_url: "http://localhost:3001/api".to_owned(),
        }
    }
}

/// Completion provider settings (`[completion]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Gemini API key; also read from `COLLOQUY_GEMINI_API_KEY` or
    /// `GEMINI_API_KEY`.
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: String,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_GEMINI_MODEL.to_owned(),
        }
    }
}

/// Local state location (`[state]`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Directory holding the state document; platform default when unset.
    pub dir: Option<String>,
}

//! Configuration parsing, defaults, and environment overrides.

use colloquy::config::ColloquyConfig;
use colloquy::engine::context::ContextBudget;

#[test]
fn defaults_match_the_context_budget_invariants() {
    let config = ColloquyConfig::default();
    let budget = ContextBudget::from(&config.budget);
    assert_eq!(budget.max_document_chars, 50_000);
    assert_eq!(budget.max_history_turns, 20);
    assert_eq!(budget.max_history_chars_per_turn, 20_000);
    assert_eq!(budget.max_total_context_chars, 200_000);
    assert_eq!(budget.max_oneshot_prompt_chars, 500_000);
}

#[test]
fn empty_toml_yields_defaults() {
    let config = ColloquyConfig::from_toml("").expect("empty config parses");
    assert_eq!(config.completion.model, "gemini-2.5-flash");
    assert!(config.completion.api_key.is_none());
    assert_eq!(config.stores.persona_base_url, "http://localhost:3001/api");
}

#[test]
fn file_values_override_defaults() {
    let config = ColloquyConfig::from_toml(
        r#"
        [budget]
        max_history_turns = 8

        [stores]
        session_base_url = "http://stores.internal/api"

        [completion]
        model = "gemini-2.5-pro"
        "#,
    )
    .expect("config parses");

    assert_eq!(config.budget.max_history_turns, 8);
    assert_eq!(config.stores.session_base_url, "http://stores.internal/api");
    assert_eq!(config.completion.model, "gemini-2.5-pro");
    // Untouched sections keep their defaults.
    assert_eq!(config.budget.max_document_chars, 50_000);
}

#[test]
fn env_overrides_win_over_file_values() {
    let mut config = ColloquyConfig::from_toml(
        r#"
        [completion]
        model = "gemini-2.5-pro"
        "#,
    )
    .expect("config parses");

    config.apply_overrides(|key| match key {
        "COLLOQUY_GEMINI_API_KEY" => Some("env-key".to_owned()),
        "COLLOQUY_GEMINI_MODEL" => Some("gemini-2.5-flash".to_owned()),
        "COLLOQUY_SESSION_STORE_URL" => Some("http://env.internal/api".to_owned()),
        _ => None,
    });

    assert_eq!(config.completion.api_key.as_deref(), Some("env-key"));
    assert_eq!(config.completion.model, "gemini-2.5-flash");
    assert_eq!(config.stores.session_base_url, "http://env.internal/api");
}

#[test]
fn generic_gemini_key_is_a_fallback() {
    let mut config = ColloquyConfig::default();
    config.apply_overrides(|key| match key {
        "GEMINI_API_KEY" => Some("fallback-key".to_owned()),
        _ => None,
    });
    assert_eq!(config.completion.api_key.as_deref(), Some("fallback-key"));
}

#[test]
fn explicit_state_dir_wins_over_platform_default() {
    let mut config = ColloquyConfig::default();
    config.apply_overrides(|key| match key {
        "COLLOQUY_STATE_DIR" => Some("/tmp/colloquy-test-state".to_owned()),
        _ => None,
    });
    let dir = config.state_dir().expect("state dir resolves");
    assert_eq!(dir, std::path::PathBuf::from("/tmp/colloquy-test-state"));
}

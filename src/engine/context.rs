//! Briefing assembly and history folding.
//!
//! Builds the size-bounded system briefing for one agent from its profile
//! and knowledge documents, and folds the conversation history into a
//! bounded message window. Both are pure functions over their inputs; the
//! orchestrator owns the store fetches that feed them.

use crate::providers::{ChatMessage, ChatRole};
use crate::types::{Agent, KnowledgeDocument, Speaker, Turn};

/// Marker appended wherever content was cut to fit a budget.
pub const TRUNCATION_MARKER: &str = "... [Truncated for Context]";

/// Size limits governing document, history, and total-context truncation.
///
/// These are hard invariants: `assemble_briefing` output never exceeds
/// `max_total_context_chars`, and any document cut to `max_document_chars`
/// carries a visible [`TRUNCATION_MARKER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextBudget {
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

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            max_document_chars: 50_000,
            max_history_turns: 20,
            max_history_chars_per_turn: 20_000,
            max_total_context_chars: 200_000,
            max_oneshot_prompt_chars: 500_000,
        }
    }
}

/// Truncate `text` to at most `max` characters, appending the marker when a
/// cut happened. Operates on `char` boundaries.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str(TRUNCATION_MARKER);
    out
}

/// Character count of a string (briefing budgets are in characters, not
/// bytes).
fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Assemble the in-character briefing for one agent.
///
/// Layout, in order: an identity header, one section per knowledge document
/// (store order preserved, each truncated to `max_document_chars` with a
/// visible marker), and a closing instruction block. When the total exceeds
/// `max_total_context_chars`, documents are dropped from the *end* of the
/// list until it fits — recency and identity win over breadth. The identity
/// header and the instruction block are never dropped; in the degenerate
/// case where they alone exceed the cap, the header is cut instead.
pub fn assemble_briefing(
    agent: &Agent,
    documents: &[KnowledgeDocument],
    budget: &ContextBudget,
) -> String {
    let mut header = format!(
        "You are strictly acting as the persona: {}.\nIdentity/Title: {}\n\nCORE BLUEPRINT DATA:\n",
        agent.name,
        truncate_chars(&agent.description, budget.max_document_chars)
    );

    let instructions = "INSTRUCTIONS: Respond naturally to the user's message as this persona. \
                        Stay in character. Use bolding (**text**) for emphasis and bullet \
                        points for lists to ensure your message is easy to read and highly \
                        professional.";

    let mut sections: Vec<String> = documents
        .iter()
        .map(|doc| {
            format!(
                "--- FILE: {} ---\n{}\n\n",
                doc.name,
                truncate_chars(&doc.content, budget.max_document_chars)
            )
        })
        .collect();

    let fixed = char_len(&header).saturating_add(char_len(instructions));
    let mut total = fixed;
    for s in &sections {
        total = total.saturating_add(char_len(s));
    }

    while total > budget.max_total_context_chars {
        match sections.pop() {
            Some(dropped) => {
                total = total.saturating_sub(char_len(&dropped));
                tracing::debug!(
                    agent = %agent.id,
                    "dropped trailing document section to meet context budget"
                );
            }
            None => break,
        }
    }

    // Degenerate case: header + instructions alone exceed the cap. The
    // instruction block is never cut, so the header absorbs the loss.
    if total > budget.max_total_context_chars {
        let available = budget
            .max_total_context_chars
            .saturating_sub(char_len(instructions));
        header = truncate_chars(
            &header,
            available.saturating_sub(char_len(TRUNCATION_MARKER)),
        );
    }

    let mut briefing = header;
    for s in &sections {
        briefing.push_str(s);
    }
    briefing.push_str(instructions);
    briefing
}

/// Fold a turn log into the bounded history window handed to the completion
/// call.
///
/// Keeps exactly the last `max_history_turns` turns in chronological order
/// (a window of at least one — the most recent turn is never dropped), each
/// truncated to `max_history_chars_per_turn`.
pub fn fold_history(turns: &[Turn], budget: &ContextBudget) -> Vec<ChatMessage> {
    let window = budget.max_history_turns.max(1);
    let start = turns.len().saturating_sub(window);

    turns
        .iter()
        .skip(start)
        .map(|turn| ChatMessage {
            role: match turn.speaker {
                Speaker::User => ChatRole::User,
                Speaker::Agent => ChatRole::Model,
            },
            text: truncate_chars(&turn.content, budget.max_history_chars_per_turn),
        })
        .collect()
}

//! Scenario templates — loading, placeholder substitution, and validation.
//!
//! A template's body carries `{{NAME}}` placeholders filled from a
//! caller-supplied field map. Substitution is a single pass: a substituted
//! value is inserted verbatim even if it itself contains placeholder-shaped
//! text, and an unresolved placeholder renders as the empty string, never as
//! a literal token.

use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

/// Field values supplied by the caller, keyed by placeholder name.
pub type FieldMap = HashMap<String, String>;

/// Error type for template loading.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Failed to parse a template TOML file.
    #[error("failed to parse template TOML: {0}")]
    Parse(#[from] toml::de::Error),
    /// I/O error reading a template file.
    #[error("failed to read template file: {0}")]
    Io(#[from] std::io::Error),
}

/// Input kind of a declared template field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Single-line text.
    #[default]
    Text,
    /// Multi-line text.
    Textarea,
    /// Inline stimulus payload (base64 + MIME type).
    Image,
}

/// One declared input field of a template.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    /// Placeholder name this field fills.
    pub name: String,
    /// Input kind.
    #[serde(default)]
    pub kind: FieldKind,
    /// Human-readable label.
    #[serde(default)]
    pub label: Option<String>,
    /// Whether the field must be supplied before rendering.
    #[serde(default)]
    pub required: bool,
}

/// A scenario prompt with named placeholders, used for one-shot simulations.
#[derive(Debug, Clone, Deserialize)]
pub struct Template {
    /// Display title.
    pub title: String,
    /// Optional description shown in pickers.
    #[serde(default)]
    pub description: Option<String>,
    /// Declared input fields; placeholders may also appear undeclared.
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    /// Prompt body containing `{{NAME}}` placeholders.
    pub body: String,
}

impl Template {
    /// Load a template from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError`] when the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let contents = std::fs::read_to_string(path)?;
        let template: Template = toml::from_str(&contents)?;
        Ok(template)
    }

    /// Parse a template from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Parse`] on malformed TOML.
    pub fn from_toml(toml_str: &str) -> Result<Self, TemplateError> {
        Ok(toml::from_str(toml_str)?)
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("placeholder pattern is a valid regex")
    })
}

/// Placeholder names appearing in `body`, in first-occurrence order,
/// deduplicated.
pub fn placeholders(body: &str) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for caps in placeholder_regex().captures_iter(body) {
        if let Some(name) = caps.get(1) {
            if !seen.iter().any(|s| s == name.as_str()) {
                seen.push(name.as_str().to_owned());
            }
        }
    }
    seen
}

/// Fill every placeholder in the template body from the field map.
///
/// Missing fields render as the empty string. Single-pass and
/// non-recursive: values are inserted verbatim. Rendering twice with the
/// same inputs yields identical output.
pub fn render(template: &Template, fields: &FieldMap) -> String {
    placeholder_regex()
        .replace_all(&template.body, |caps: &regex::Captures<'_>| {
            caps.get(1)
                .and_then(|name| fields.get(name.as_str()))
                .cloned()
                .unwrap_or_default()
        })
        .into_owned()
}

/// Names of required declared fields that the map does not supply (absent or
/// blank). A non-empty result is a caller-facing validation error; `render`
/// must not be reached with one.
pub fn validate(template: &Template, fields: &FieldMap) -> Vec<String> {
    template
        .fields
        .iter()
        .filter(|spec| spec.required)
        .filter(|spec| {
            fields
                .get(&spec.name)
                .map(|v| v.trim().is_empty())
                .unwrap_or(true)
        })
        .map(|spec| spec.name.clone())
        .collect()
}

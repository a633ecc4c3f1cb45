//! Backend family resolution.
//!
//! Model names are mapped to a backend family exactly once, at connect time.
//! Everything downstream of `connect` carries the resolved family and never
//! inspects model names again.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Family of model-serving backend a model name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendFamily {
    /// Ollama-served open models (llama, gemma, mistral, ...).
    Ollama,
    /// OpenAI-compatible chat completion endpoints.
    OpenAiCompat,
}

impl fmt::Display for BackendFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::OpenAiCompat => write!(f, "openai_compat"),
        }
    }
}

/// Maps model name prefixes to backend families.
///
/// Resolution is first-match over the registered prefixes, falling back to
/// the registry default when nothing matches.
#[derive(Debug, Clone)]
pub struct FamilyRegistry {
    prefixes: Vec<(String, BackendFamily)>,
    fallback: BackendFamily,
}

impl FamilyRegistry {
    /// Registry covering the model names the pipeline is deployed with.
    pub fn with_defaults() -> Self {
        let prefixes = ["llama", "gemma", "mistral", "phi", "qwen"]
            .iter()
            .map(|p| (p.to_string(), BackendFamily::Ollama))
            .chain(std::iter::once((
                "gpt".to_string(),
                BackendFamily::OpenAiCompat,
            )))
            .collect();
        Self {
            prefixes,
            fallback: BackendFamily::Ollama,
        }
    }

    /// Register an additional prefix mapping. Later registrations take
    /// precedence over earlier ones.
    pub fn register(&mut self, prefix: impl Into<String>, family: BackendFamily) {
        self.prefixes.insert(0, (prefix.into(), family));
    }

    /// Resolve a model name to its backend family.
    pub fn resolve(&self, model: &str) -> BackendFamily {
        let lower = model.to_ascii_lowercase();
        self.prefixes
            .iter()
            .find(|(prefix, _)| lower.starts_with(prefix.as_str()))
            .map(|(_, family)| *family)
            .unwrap_or(self.fallback)
    }
}

impl Default for FamilyRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

//! Retrieval index boundary - the knowledge-base collaborator
//!
//! Everything the pipeline knows about retrieval lives behind the
//! RetrievalIndex trait: ask one grounded question, get back an answer plus
//! the evidence passages that produced it. Embedding and vector-store
//! internals belong to the sidecar service behind RagIndex.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::backend::ModelHandle;
use crate::error::Result;

pub mod rag;

pub use rag::{IndexConfig, RagIndex};

/// One supporting snippet returned alongside an answer.
///
/// Opaque to the pipeline: never mutated, only forwarded into critique
/// prompts and the final report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// Passage text.
    pub text: String,
    /// Source document the passage came from, when the service reports one.
    pub source: Option<String>,
    /// Relevance score, when the service reports one.
    pub score: Option<f32>,
}

impl Evidence {
    /// Create a bare text snippet.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: None,
            score: None,
        }
    }

    /// Attach a source document.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Answer plus the evidence passages used to produce it.
#[derive(Debug, Clone)]
pub struct ChatReply {
    /// Generated answer text.
    pub answer: String,
    /// Supporting passages, in retrieval order.
    pub evidence: Vec<Evidence>,
}

/// A queryable knowledge base over the guideline corpus.
///
/// Shared read-only across all concurrent units of a run; each `chat` call
/// carries its full context.
#[async_trait]
pub trait RetrievalIndex: Send + Sync {
    /// Ask one grounded question through the given model.
    async fn chat(&self, prompt: &str, model: &ModelHandle) -> Result<ChatReply>;
}

/// Deterministic in-memory index for tests and dry runs.
///
/// Delegates generation to the model handle unchanged and returns a fixed
/// evidence list, so stubbed backends fully determine every captured text.
#[derive(Default)]
pub struct StubIndex {
    evidence: Vec<Evidence>,
    prompts: Mutex<Vec<String>>,
}

impl StubIndex {
    /// Stub index returning no evidence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stub index returning the given evidence on every chat.
    pub fn with_evidence(evidence: Vec<Evidence>) -> Self {
        Self {
            evidence,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts observed so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl RetrievalIndex for StubIndex {
    async fn chat(&self, prompt: &str, model: &ModelHandle) -> Result<ChatReply> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let answer = model.complete(prompt).await?;
        Ok(ChatReply {
            answer,
            evidence: self.evidence.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendFamily, ScriptedBackend};
    use std::sync::Arc;

    fn handle(name: &str, backend: Arc<ScriptedBackend>) -> ModelHandle {
        ModelHandle::with_backend(name, BackendFamily::Ollama, backend)
    }

    #[test]
    fn test_evidence_builders() {
        let ev = Evidence::text("passage").with_source("guide.html");
        assert_eq!(ev.text, "passage");
        assert_eq!(ev.source.as_deref(), Some("guide.html"));
        assert!(ev.score.is_none());
    }

    #[test]
    fn test_evidence_serde_roundtrip() {
        let ev = Evidence::text("passage").with_source("guide.html");
        let json = serde_json::to_string(&ev).unwrap();
        let parsed: Evidence = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, ev);
    }

    #[tokio::test]
    async fn test_stub_index_returns_backend_answer() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.script("m", "42");
        let index = StubIndex::with_evidence(vec![Evidence::text("snippet")]);

        let reply = index.chat("Q", &handle("m", backend)).await.unwrap();
        assert_eq!(reply.answer, "42");
        assert_eq!(reply.evidence.len(), 1);
        assert_eq!(index.prompts(), vec!["Q"]);
    }

    #[tokio::test]
    async fn test_stub_index_propagates_backend_failure() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.script_failure("m", "down");
        let index = StubIndex::new();

        let err = index.chat("Q", &handle("m", backend)).await.unwrap_err();
        assert!(err.is_backend());
    }
}

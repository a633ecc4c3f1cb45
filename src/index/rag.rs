//! Retrieval-augmented index backed by the retrieval sidecar service.
//!
//! The sidecar owns embedding and vector storage. RagIndex drives it through
//! three narrow operations: build a collection from the corpus, load a
//! persisted collection, and fetch top-k evidence for a query. Generation
//! goes through whatever ModelHandle the caller binds to the chat call, so
//! one index serves every model in a run.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::time::Duration;

use crate::backend::ModelHandle;
use crate::config::PipelineConfig;
use crate::error::{CritiqError, Result};
use crate::index::{ChatReply, Evidence, RetrievalIndex};

/// Settings for building or loading the index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Root directory of the guideline documents.
    pub corpus_root: PathBuf,
    /// Persisted index location; existing storage is loaded, not rebuilt.
    pub persist_dir: PathBuf,
    /// Document extensions loaded into the index.
    pub extensions: Vec<String>,
    /// Whether corpus loading recurses into subdirectories.
    pub recursive: bool,
    /// Embedding model name.
    pub embed_model: String,
    /// Base URL of the retrieval service.
    pub endpoint: String,
    /// Evidence passages fetched per query.
    pub top_k: usize,
    /// Per-call request timeout.
    pub timeout: Duration,
}

impl IndexConfig {
    /// Derive index settings from the pipeline configuration.
    pub fn from_pipeline(config: &PipelineConfig) -> Self {
        Self {
            corpus_root: config.corpus.root.clone(),
            persist_dir: config.corpus.persist_dir.clone(),
            extensions: config.corpus.extensions.clone(),
            recursive: config.corpus.recursive,
            embed_model: config.corpus.embed_model.clone(),
            endpoint: config.corpus.endpoint.clone(),
            top_k: config.corpus.top_k,
            timeout: config.models.timeout(),
        }
    }
}

/// Knowledge base over the guideline corpus, served by the retrieval sidecar.
#[derive(Debug)]
pub struct RagIndex {
    client: Client,
    endpoint: String,
    top_k: usize,
    timeout_secs: u64,
}

impl RagIndex {
    /// Build the index from the corpus, or load it when persisted storage
    /// already exists. Any failure here is fatal to the run.
    pub async fn open(cfg: IndexConfig) -> Result<Self> {
        let client = Client::builder().timeout(cfg.timeout).build().map_err(|e| {
            CritiqError::IndexBuildFailure(format!("Failed to create HTTP client: {}", e))
        })?;

        let index = Self {
            client,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            top_k: cfg.top_k,
            timeout_secs: cfg.timeout.as_secs(),
        };

        if cfg.persist_dir.is_dir() {
            log::info!("loading persisted index from {}", cfg.persist_dir.display());
            index
                .post(
                    "/load",
                    json!({ "persist_dir": cfg.persist_dir }),
                )
                .await
                .map_err(|e| CritiqError::IndexBuildFailure(e.to_string()))?;
        } else {
            if !cfg.corpus_root.is_dir() {
                return Err(CritiqError::IndexBuildFailure(format!(
                    "corpus root {} does not exist",
                    cfg.corpus_root.display()
                )));
            }
            log::info!(
                "indexing corpus at {} ({} extensions, recursive={})",
                cfg.corpus_root.display(),
                cfg.extensions.len(),
                cfg.recursive
            );
            index
                .post(
                    "/index",
                    json!({
                        "corpus_root": cfg.corpus_root,
                        "extensions": cfg.extensions,
                        "recursive": cfg.recursive,
                        "embed_model": cfg.embed_model,
                        "persist_dir": cfg.persist_dir,
                    }),
                )
                .await
                .map_err(|e| CritiqError::IndexBuildFailure(e.to_string()))?;
        }

        Ok(index)
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}{}", self.endpoint, path))
            .json(&body)
            .send()
            .await
            .map_err(|e| CritiqError::from_transport(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CritiqError::BackendUnavailable(format!(
                "retrieval service error {}: {}",
                status, error_body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| CritiqError::from_transport(e, self.timeout_secs))
    }

    /// Fetch the top-k evidence passages for a query.
    async fn retrieve(&self, query: &str) -> Result<Vec<Evidence>> {
        let body = self
            .post("/query", json!({ "query": query, "top_k": self.top_k }))
            .await?;
        Ok(parse_passages(&body))
    }

    /// Assemble the generation prompt from the query and its evidence.
    fn grounded_prompt(query: &str, evidence: &[Evidence]) -> String {
        if evidence.is_empty() {
            return query.to_string();
        }

        let mut prompt = String::from("Context from the guideline corpus:\n");
        for passage in evidence {
            match &passage.source {
                Some(source) => prompt.push_str(&format!("[{}] {}\n", source, passage.text)),
                None => prompt.push_str(&format!("- {}\n", passage.text)),
            }
        }
        prompt.push_str("\nUsing the context above, respond to the following.\n\n");
        prompt.push_str(query);
        prompt
    }
}

/// Parse the retrieval service's passage list; entries missing text are
/// dropped rather than failing the whole reply.
fn parse_passages(body: &Value) -> Vec<Evidence> {
    let Some(passages) = body["passages"].as_array() else {
        return Vec::new();
    };

    passages
        .iter()
        .filter_map(|p| {
            let text = p["text"].as_str()?;
            Some(Evidence {
                text: text.to_string(),
                source: p["source"].as_str().map(str::to_string),
                score: p["score"].as_f64().map(|s| s as f32),
            })
        })
        .collect()
}

#[async_trait]
impl RetrievalIndex for RagIndex {
    async fn chat(&self, prompt: &str, model: &ModelHandle) -> Result<ChatReply> {
        let evidence = self.retrieve(prompt).await?;
        log::debug!(
            "retrieved {} passages for {} chars of prompt",
            evidence.len(),
            prompt.len()
        );
        let grounded = Self::grounded_prompt(prompt, &evidence);
        let answer = model.complete(&grounded).await?;
        Ok(ChatReply { answer, evidence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grounded_prompt_without_evidence_is_verbatim() {
        let prompt = RagIndex::grounded_prompt("What is required?", &[]);
        assert_eq!(prompt, "What is required?");
    }

    #[test]
    fn test_grounded_prompt_embeds_passages_and_query() {
        let evidence = vec![
            Evidence::text("Packages must include a vignette.").with_source("guide.html"),
            Evidence::text("Line length is limited to 80 characters."),
        ];
        let prompt = RagIndex::grounded_prompt("What is required?", &evidence);

        assert!(prompt.contains("[guide.html] Packages must include a vignette."));
        assert!(prompt.contains("- Line length is limited to 80 characters."));
        assert!(prompt.contains("What is required?"));
    }

    #[test]
    fn test_grounded_prompt_is_deterministic() {
        let evidence = vec![Evidence::text("a"), Evidence::text("b")];
        let first = RagIndex::grounded_prompt("Q", &evidence);
        let second = RagIndex::grounded_prompt("Q", &evidence);
        assert_eq!(first, second);
    }

    #[test]
    fn test_parse_passages_full() {
        let body = json!({
            "passages": [
                { "text": "snippet", "source": "guide.html", "score": 0.87 },
                { "text": "plain" },
            ]
        });
        let passages = parse_passages(&body);
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].source.as_deref(), Some("guide.html"));
        assert!(passages[0].score.unwrap() > 0.8);
        assert!(passages[1].source.is_none());
    }

    #[test]
    fn test_parse_passages_drops_textless_entries() {
        let body = json!({ "passages": [ { "source": "x" }, { "text": "kept" } ] });
        let passages = parse_passages(&body);
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].text, "kept");
    }

    #[test]
    fn test_parse_passages_missing_array() {
        let body = json!({ "unexpected": true });
        assert!(parse_passages(&body).is_empty());
    }

    #[test]
    fn test_index_config_from_pipeline() {
        let pipeline = PipelineConfig::default();
        let cfg = IndexConfig::from_pipeline(&pipeline);
        assert_eq!(cfg.extensions, vec![".html"]);
        assert_eq!(cfg.top_k, 4);
        assert_eq!(cfg.timeout, Duration::from_secs(500));
    }

    #[tokio::test]
    async fn test_open_fails_without_corpus_or_storage() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = IndexConfig {
            corpus_root: dir.path().join("missing_corpus"),
            persist_dir: dir.path().join("missing_storage"),
            extensions: vec![".html".to_string()],
            recursive: true,
            embed_model: "BAAI/bge-small-en-v1.5".to_string(),
            endpoint: "http://localhost:1".to_string(),
            top_k: 4,
            timeout: Duration::from_secs(1),
        };

        let err = RagIndex::open(cfg).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("corpus root"));
    }
}

//! Configuration for the review pipeline.
//!
//! Loaded from .critiq.yml or ~/.config/critiq/critiq.yml. The configuration
//! is an explicit value threaded through index construction, backend
//! connection, and the batch runner; nothing in the pipeline reads ambient
//! global state.

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default judge model.
pub const DEFAULT_JUDGE: &str = "llama3.1:latest";

/// Default embedding model forwarded to the retrieval service.
pub const DEFAULT_EMBED_MODEL: &str = "BAAI/bge-small-en-v1.5";

/// Default subject models evaluated in one run.
pub fn default_subjects() -> Vec<String> {
    vec![
        "llama3.1:latest".to_string(),
        "llama3".to_string(),
        "gemma:2b".to_string(),
        "gemma:7b".to_string(),
    ]
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Guideline corpus and retrieval service settings.
    pub corpus: CorpusConfig,

    /// Model backend settings.
    pub models: ModelsConfig,

    /// Review mode settings (artifact discovery, prompt budgets).
    pub review: ReviewConfig,

    /// Concurrency limits.
    pub concurrency: ConcurrencyConfig,

    /// Report output settings.
    pub report: ReportConfig,
}

impl PipelineConfig {
    /// Load configuration with fallback chain.
    ///
    /// Search order:
    /// 1. Explicit path if provided
    /// 2. .critiq.yml in current directory
    /// 3. ~/.config/critiq/critiq.yml
    /// 4. Defaults
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        let project_config = PathBuf::from(".critiq.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .critiq.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .critiq.yml: {}", e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("critiq").join("critiq.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.models.subjects.is_empty() {
            eyre::bail!("models.subjects must name at least one model");
        }
        if self.models.judge.is_empty() {
            eyre::bail!("models.judge must not be empty");
        }
        if self.concurrency.workers == 0 {
            eyre::bail!("concurrency.workers must be > 0");
        }
        if self.review.prompt_budget_chars <= self.review.snippet_cap_chars {
            eyre::bail!("review.prompt-budget-chars must exceed review.snippet-cap-chars");
        }
        Ok(())
    }
}

/// Guideline corpus and retrieval service settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Root directory of the guideline documents.
    pub root: PathBuf,

    /// Directory where the built index is persisted. If it already exists
    /// the index is loaded instead of rebuilt.
    #[serde(rename = "persist-dir")]
    pub persist_dir: PathBuf,

    /// Document extensions loaded into the index.
    pub extensions: Vec<String>,

    /// Whether corpus loading recurses into subdirectories.
    pub recursive: bool,

    /// Embedding model name forwarded to the retrieval service.
    #[serde(rename = "embed-model")]
    pub embed_model: String,

    /// Base URL of the retrieval sidecar service.
    pub endpoint: String,

    /// How many evidence passages to retrieve per query.
    #[serde(rename = "top-k")]
    pub top_k: usize,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./guideline_docs"),
            persist_dir: PathBuf::from("./qdrant_data"),
            extensions: vec![".html".to_string()],
            recursive: true,
            embed_model: DEFAULT_EMBED_MODEL.to_string(),
            endpoint: "http://localhost:6333".to_string(),
            top_k: 4,
        }
    }
}

/// Model backend settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Subject models whose answers are produced and refined.
    pub subjects: Vec<String>,

    /// Judge model that critiques each subject's answer.
    pub judge: String,

    /// Base URL of the model-serving backend.
    pub endpoint: String,

    /// Per-call request timeout in seconds.
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,
}

impl ModelsConfig {
    /// Configured timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            subjects: default_subjects(),
            judge: DEFAULT_JUDGE.to_string(),
            endpoint: "http://localhost:11430".to_string(),
            timeout_secs: 500,
        }
    }
}

/// Review mode settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Root directory of the submission under review.
    #[serde(rename = "artifact-root")]
    pub artifact_root: PathBuf,

    /// Primary source file extensions discovered for review.
    #[serde(rename = "source-exts")]
    pub source_exts: Vec<String>,

    /// Companion documentation file extensions discovered for review.
    #[serde(rename = "doc-exts")]
    pub doc_exts: Vec<String>,

    /// Whether artifact discovery recurses into subdirectories.
    pub recursive: bool,

    /// Total character budget for a constructed prompt.
    #[serde(rename = "prompt-budget-chars")]
    pub prompt_budget_chars: usize,

    /// Per-evidence-snippet character cap inside critique prompts.
    #[serde(rename = "snippet-cap-chars")]
    pub snippet_cap_chars: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            artifact_root: PathBuf::from("./submission"),
            source_exts: vec![".R".to_string()],
            doc_exts: vec![".Rmd".to_string()],
            recursive: true,
            prompt_budget_chars: 32_000,
            snippet_cap_chars: 2_000,
        }
    }
}

/// Concurrency limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Bounded worker pool size for (model, artifact) units.
    pub workers: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Report output settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Path of the JSONL report written after a run.
    pub path: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./critiq-report.jsonl"),
        }
    }
}

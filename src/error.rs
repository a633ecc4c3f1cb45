//! Error types for critiq
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in critiq
#[derive(Debug, Error)]
pub enum CritiqError {
    /// The model or retrieval backend could not be reached
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// A backend call exceeded its configured request timeout
    #[error("Backend timed out after {0}s")]
    BackendTimeout(u64),

    /// A constructed prompt exceeds the configured input budget
    #[error("Prompt too large: {size} chars exceeds budget of {budget}")]
    PromptTooLarge { size: usize, budget: usize },

    /// Building or loading the retrieval index failed (fatal to the run)
    #[error("Index build failure: {0}")]
    IndexBuildFailure(String),

    /// The artifact root or a referenced file does not exist
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    /// The backend answered with something we cannot interpret
    #[error("Invalid backend response: {0}")]
    InvalidResponse(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CritiqError {
    /// Whether this error came from a backend round trip (as opposed to
    /// local state such as IO or prompt budgeting).
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            CritiqError::BackendUnavailable(_)
                | CritiqError::BackendTimeout(_)
                | CritiqError::InvalidResponse(_)
        )
    }

    /// Whether index construction failed; these abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CritiqError::IndexBuildFailure(_))
    }

    /// Map a reqwest transport error onto the backend taxonomy.
    ///
    /// `timeout_secs` is the configured per-call timeout, reported when the
    /// transport signals a timeout.
    pub fn from_transport(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            CritiqError::BackendTimeout(timeout_secs)
        } else if err.is_connect() {
            CritiqError::BackendUnavailable(format!("connection failed: {}", err))
        } else if err.is_decode() {
            CritiqError::InvalidResponse(err.to_string())
        } else {
            CritiqError::BackendUnavailable(err.to_string())
        }
    }
}

/// Result type alias for critiq operations
pub type Result<T> = std::result::Result<T, CritiqError>;

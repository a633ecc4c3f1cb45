//! Core model backend types and trait definitions.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::backend::family::{BackendFamily, FamilyRegistry};
use crate::backend::ollama::OllamaBackend;
use crate::error::{CritiqError, Result};

/// Stateless text-in/text-out backend - each call is independent and carries
/// its full context.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Single completion request (blocking until the full text is assembled).
    async fn complete(&self, model: &str, prompt: &str) -> Result<String>;

    /// Streaming completion. Token chunks are forwarded on `chunk_tx` as
    /// they arrive; the fully assembled text is returned either way, so
    /// callers that ignore the channel observe the same behavior as
    /// `complete`.
    async fn stream(
        &self,
        model: &str,
        prompt: &str,
        chunk_tx: mpsc::Sender<String>,
    ) -> Result<String>;
}

/// Connection parameters for a model backend.
#[derive(Debug, Clone)]
pub struct ConnectSpec {
    /// Model name as served by the backend.
    pub name: String,
    /// Base URL of the serving endpoint.
    pub endpoint: String,
    /// Per-call request timeout.
    pub timeout: Duration,
}

impl ConnectSpec {
    /// Create a connect spec for a named model.
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

/// A connected model: identity plus the backend that serves it.
///
/// Handles are cheap to clone and stateless from the pipeline's point of
/// view; many handles may share one retrieval index concurrently.
#[derive(Clone)]
pub struct ModelHandle {
    name: String,
    family: BackendFamily,
    backend: Arc<dyn ModelBackend>,
}

impl ModelHandle {
    /// Wrap an already-constructed backend. Used by the connector registry
    /// and by tests that supply scripted backends.
    pub fn with_backend(
        name: impl Into<String>,
        family: BackendFamily,
        backend: Arc<dyn ModelBackend>,
    ) -> Self {
        Self {
            name: name.into(),
            family,
            backend,
        }
    }

    /// Model name as served by the backend.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Backend family resolved at connect time.
    pub fn family(&self) -> BackendFamily {
        self.family
    }

    /// One full-context completion round trip.
    pub async fn complete(&self, prompt: &str) -> Result<String> {
        self.backend.complete(&self.name, prompt).await
    }

    /// One full-context round trip with incremental chunk forwarding.
    pub async fn stream(&self, prompt: &str, chunk_tx: mpsc::Sender<String>) -> Result<String> {
        self.backend.stream(&self.name, prompt, chunk_tx).await
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("name", &self.name)
            .field("family", &self.family)
            .finish()
    }
}

/// Connector function constructing a backend for one family.
pub type ConnectFn = fn(&ConnectSpec) -> Result<Arc<dyn ModelBackend>>;

/// Registry mapping backend families to connection strategies.
///
/// Family resolution and connector lookup both happen once, inside
/// `connect`; the returned handle carries everything later calls need.
pub struct BackendRegistry {
    families: FamilyRegistry,
    connectors: HashMap<BackendFamily, ConnectFn>,
}

impl BackendRegistry {
    /// Registry with the deployed connectors registered.
    pub fn with_defaults() -> Self {
        let mut connectors: HashMap<BackendFamily, ConnectFn> = HashMap::new();
        connectors.insert(BackendFamily::Ollama, connect_ollama);
        Self {
            families: FamilyRegistry::with_defaults(),
            connectors,
        }
    }

    /// Register or replace the connector for a family.
    pub fn register(&mut self, family: BackendFamily, connector: ConnectFn) {
        self.connectors.insert(family, connector);
    }

    /// Mutable access to the name-prefix mapping.
    pub fn families_mut(&mut self) -> &mut FamilyRegistry {
        &mut self.families
    }

    /// Resolve the family for `spec.name` and construct a connected handle.
    pub fn connect(&self, spec: &ConnectSpec) -> Result<ModelHandle> {
        let family = self.families.resolve(&spec.name);
        let connector = self.connectors.get(&family).ok_or_else(|| {
            CritiqError::BackendUnavailable(format!(
                "no connector registered for backend family {}",
                family
            ))
        })?;
        let backend = connector(spec)?;
        log::debug!("connected model {} via {}", spec.name, family);
        Ok(ModelHandle::with_backend(spec.name.clone(), family, backend))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn connect_ollama(spec: &ConnectSpec) -> Result<Arc<dyn ModelBackend>> {
    Ok(Arc::new(OllamaBackend::new(&spec.endpoint, spec.timeout)?))
}

/// Deterministic scripted backend for tests and dry runs.
///
/// Replies are queued per model name and served in FIFO order; call counts
/// are tracked per model so tests can assert which roles were exercised.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    calls: Mutex<HashMap<String, u32>>,
}

enum ScriptedReply {
    Text(String),
    Unavailable(String),
}

impl ScriptedBackend {
    /// Create an empty scripted backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply for `model`.
    pub fn script(&self, model: &str, text: impl Into<String>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push_back(ScriptedReply::Text(text.into()));
    }

    /// Queue a `BackendUnavailable` failure for `model`.
    pub fn script_failure(&self, model: &str, message: impl Into<String>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_default()
            .push_back(ScriptedReply::Unavailable(message.into()));
    }

    /// How many calls `model` has served.
    pub fn calls(&self, model: &str) -> u32 {
        *self.calls.lock().unwrap().get(model).unwrap_or(&0)
    }

    fn next_reply(&self, model: &str) -> Result<String> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(model.to_string())
            .or_insert(0) += 1;

        let reply = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(model)
            .and_then(|queue| queue.pop_front());

        match reply {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Unavailable(message)) => {
                Err(CritiqError::BackendUnavailable(message))
            }
            None => Err(CritiqError::InvalidResponse(format!(
                "script exhausted for model {}",
                model
            ))),
        }
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn complete(&self, model: &str, _prompt: &str) -> Result<String> {
        self.next_reply(model)
    }

    async fn stream(
        &self,
        model: &str,
        prompt: &str,
        chunk_tx: mpsc::Sender<String>,
    ) -> Result<String> {
        let text = self.complete(model, prompt).await?;
        // Receiver may already be gone; the assembled text is still returned.
        let _ = chunk_tx.send(text.clone()).await;
        Ok(text)
    }
}

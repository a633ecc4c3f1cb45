//! Batch runner - Cartesian iteration with a bounded worker pool.
//!
//! Every (subject model, artifact) pair becomes one independent unit of
//! work. Units run concurrently up to the configured worker count; the
//! collection is merged by a single collector after the pool drains, so a
//! result can never be lost to a concurrent overwrite. Every input pair
//! appears in the output exactly once, whatever happened to it.

use futures::StreamExt;
use futures::stream;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::artifact::Artifact;
use crate::backend::ModelHandle;
use crate::orchestrator::{CritiqueOrchestrator, ExchangeOutcome};

/// Cooperative cancellation flag shared across a batch.
///
/// Cancellation is observed at unit scheduling and at exchange step
/// boundaries; nothing is interrupted mid-call.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create an uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Per-status counts over a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl OutcomeCounts {
    /// Total units counted.
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.skipped
    }
}

/// Nested results: model → (artifact key → outcome).
///
/// Model iteration order is the order models were supplied to the run;
/// artifact keys iterate lexicographically within each model.
#[derive(Debug, Default)]
pub struct ResultCollection {
    model_order: Vec<String>,
    entries: HashMap<String, BTreeMap<String, ExchangeOutcome>>,
}

impl ResultCollection {
    /// Register a model so it appears in order even with zero artifacts.
    pub fn ensure_model(&mut self, model: &str) {
        if !self.entries.contains_key(model) {
            self.model_order.push(model.to_string());
            self.entries.insert(model.to_string(), BTreeMap::new());
        }
    }

    /// Insert one unit outcome.
    pub fn insert(&mut self, model: &str, artifact_key: String, outcome: ExchangeOutcome) {
        self.ensure_model(model);
        let previous = self
            .entries
            .get_mut(model)
            .expect("model registered above")
            .insert(artifact_key.clone(), outcome);
        if previous.is_some() {
            log::warn!(
                "duplicate unit ({}, {}) overwrote an earlier outcome",
                model,
                artifact_key
            );
        }
    }

    /// Look up one unit outcome.
    pub fn get(&self, model: &str, artifact_key: &str) -> Option<&ExchangeOutcome> {
        self.entries.get(model)?.get(artifact_key)
    }

    /// Models in supply order.
    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.model_order.iter().map(String::as_str)
    }

    /// Outcomes for one model, keyed by artifact, in lexicographic key order.
    pub fn outcomes(&self, model: &str) -> Option<&BTreeMap<String, ExchangeOutcome>> {
        self.entries.get(model)
    }

    /// Total number of units recorded.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// Whether no units are recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count units by status.
    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for outcomes in self.entries.values() {
            for outcome in outcomes.values() {
                match outcome {
                    ExchangeOutcome::Completed { .. } => counts.completed += 1,
                    ExchangeOutcome::Failed { .. } => counts.failed += 1,
                    ExchangeOutcome::Skipped { .. } => counts.skipped += 1,
                }
            }
        }
        counts
    }
}

/// Configuration for the batch runner.
#[derive(Debug, Clone)]
pub struct BatchRunnerConfig {
    /// Bounded worker pool size.
    pub workers: usize,
}

impl Default for BatchRunnerConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// Runs the critique orchestrator over every (model, artifact) pair.
pub struct BatchRunner {
    orchestrator: Arc<CritiqueOrchestrator>,
    config: BatchRunnerConfig,
}

impl BatchRunner {
    /// Create a runner with the default pool size.
    pub fn new(orchestrator: Arc<CritiqueOrchestrator>) -> Self {
        Self {
            orchestrator,
            config: BatchRunnerConfig::default(),
        }
    }

    /// Create a runner with a custom configuration.
    pub fn with_config(orchestrator: Arc<CritiqueOrchestrator>, config: BatchRunnerConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    /// Run every (model, artifact) pair exactly once.
    ///
    /// Units cancelled before they start are recorded as skipped; units
    /// whose exchange fails are recorded as failed; nothing is dropped.
    /// One failing unit never aborts the batch.
    pub async fn run(
        &self,
        artifacts: &[Artifact],
        subjects: &[ModelHandle],
        judge: &ModelHandle,
        cancel: &CancelToken,
    ) -> ResultCollection {
        let mut collection = ResultCollection::default();
        for subject in subjects {
            collection.ensure_model(subject.name());
        }

        log::info!(
            "batch start: {} models x {} artifacts, {} workers",
            subjects.len(),
            artifacts.len(),
            self.config.workers
        );

        let units = subjects.iter().flat_map(|subject| {
            artifacts
                .iter()
                .map(move |artifact| (subject.clone(), artifact.clone()))
        });

        let outcomes: Vec<(String, String, ExchangeOutcome)> = stream::iter(units)
            .map(|(subject, artifact)| {
                let orchestrator = Arc::clone(&self.orchestrator);
                let judge = judge.clone();
                let cancel = cancel.clone();
                async move {
                    let outcome = if cancel.is_cancelled() {
                        ExchangeOutcome::Skipped {
                            reason: "batch cancelled".to_string(),
                        }
                    } else {
                        orchestrator.run(&artifact, &subject, &judge, &cancel).await
                    };
                    (subject.name().to_string(), artifact.key(), outcome)
                }
            })
            .buffer_unordered(self.config.workers.max(1))
            .collect()
            .await;

        // Single collector: merged after the pool drains, no lost updates.
        for (model, artifact_key, outcome) in outcomes {
            collection.insert(&model, artifact_key, outcome);
        }

        let counts = collection.counts();
        log::info!(
            "batch done: {} completed, {} failed, {} skipped",
            counts.completed,
            counts.failed,
            counts.skipped
        );

        collection
    }
}

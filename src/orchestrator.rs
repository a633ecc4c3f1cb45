//! Critique orchestrator - drives the answer → critique → refine exchange.
//!
//! One exchange is exactly three chained calls for one (artifact, subject,
//! judge) triple: the subject answers, the judge critiques that answer
//! against the evidence, and the subject refines. Step 2 depends on step 1
//! and step 3 on both, so the steps are strictly sequential; cancellation is
//! observed only at the boundaries between them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::artifact::Artifact;
use crate::backend::ModelHandle;
use crate::index::{Evidence, RetrievalIndex};
use crate::prompt::{self, PromptLimits};
use crate::runner::CancelToken;

/// Which step of the exchange an outcome refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeStep {
    /// Step 1: subject model answers.
    Answer,
    /// Step 2: judge model critiques.
    Critique,
    /// Step 3: subject model refines.
    Refine,
}

impl fmt::Display for ExchangeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Answer => write!(f, "answer"),
            Self::Critique => write!(f, "critique"),
            Self::Refine => write!(f, "refine"),
        }
    }
}

/// The product of one completed exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeResult {
    /// The subject's first answer.
    pub initial_answer: String,
    /// The judge's critique of that answer.
    pub critique: String,
    /// The subject's answer after incorporating the critique.
    pub refined_answer: String,
    /// Evidence retrieved for step 1, forwarded untouched.
    pub evidence: Vec<Evidence>,
}

/// Outcome of one (artifact, subject, judge) unit.
///
/// Three-state by design: a consumer can always tell a unit that succeeded
/// from one that ran and failed from one that was never processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExchangeOutcome {
    /// All three steps completed.
    Completed { result: ExchangeResult },
    /// A step failed; later steps were skipped.
    Failed { step: ExchangeStep, error: String },
    /// The unit never ran (for example, the batch was cancelled first).
    Skipped { reason: String },
}

impl ExchangeOutcome {
    /// Whether the exchange completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Whether the exchange ran and failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Whether the unit was never processed.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// The completed result, if any.
    pub fn result(&self) -> Option<&ExchangeResult> {
        match self {
            Self::Completed { result } => Some(result),
            _ => None,
        }
    }
}

impl fmt::Display for ExchangeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { .. } => write!(f, "completed"),
            Self::Failed { step, error } => write!(f, "failed at {}: {}", step, error),
            Self::Skipped { reason } => write!(f, "skipped: {}", reason),
        }
    }
}

/// Drives the three-step exchange against a shared retrieval index.
pub struct CritiqueOrchestrator {
    index: Arc<dyn RetrievalIndex>,
    limits: PromptLimits,
}

impl CritiqueOrchestrator {
    /// Create an orchestrator with default prompt limits.
    pub fn new(index: Arc<dyn RetrievalIndex>) -> Self {
        Self {
            index,
            limits: PromptLimits::default(),
        }
    }

    /// Create an orchestrator with custom prompt limits.
    pub fn with_limits(index: Arc<dyn RetrievalIndex>, limits: PromptLimits) -> Self {
        Self { index, limits }
    }

    /// Run one full exchange.
    ///
    /// A step-1 failure short-circuits: the judge is never invoked and the
    /// unit records the failure instead of being dropped. Both subject and
    /// judge chat through the same index.
    pub async fn run(
        &self,
        artifact: &Artifact,
        subject: &ModelHandle,
        judge: &ModelHandle,
        cancel: &CancelToken,
    ) -> ExchangeOutcome {
        let question = prompt::answer_prompt(artifact);
        log::debug!("exchange start: {} via {}", artifact, subject.name());

        // Step 1 - answer
        let reply = match self.index.chat(&question, subject).await {
            Ok(reply) => reply,
            Err(e) => {
                log::warn!("answer step failed for {}: {}", artifact, e);
                return ExchangeOutcome::Failed {
                    step: ExchangeStep::Answer,
                    error: e.to_string(),
                };
            }
        };

        if cancel.is_cancelled() {
            return ExchangeOutcome::Failed {
                step: ExchangeStep::Critique,
                error: "cancelled before critique step".to_string(),
            };
        }

        // Step 2 - critique (judge model, same index)
        let critique_text = match prompt::critique_prompt(
            &question,
            &reply.answer,
            &reply.evidence,
            &self.limits,
        ) {
            Ok(critique) => match self.index.chat(&critique, judge).await {
                Ok(judge_reply) => judge_reply.answer,
                Err(e) => {
                    log::warn!("critique step failed for {}: {}", artifact, e);
                    return ExchangeOutcome::Failed {
                        step: ExchangeStep::Critique,
                        error: e.to_string(),
                    };
                }
            },
            Err(e) => {
                log::warn!("critique prompt rejected for {}: {}", artifact, e);
                return ExchangeOutcome::Failed {
                    step: ExchangeStep::Critique,
                    error: e.to_string(),
                };
            }
        };

        if cancel.is_cancelled() {
            return ExchangeOutcome::Failed {
                step: ExchangeStep::Refine,
                error: "cancelled before refine step".to_string(),
            };
        }

        // Step 3 - refine (subject model again)
        let refine = prompt::refine_prompt(&question, &reply.answer, &critique_text);
        let refined = match self.index.chat(&refine, subject).await {
            Ok(refined_reply) => refined_reply.answer,
            Err(e) => {
                log::warn!("refine step failed for {}: {}", artifact, e);
                return ExchangeOutcome::Failed {
                    step: ExchangeStep::Refine,
                    error: e.to_string(),
                };
            }
        };

        log::info!("exchange complete: {} via {}", artifact, subject.name());
        ExchangeOutcome::Completed {
            result: ExchangeResult {
                initial_answer: reply.answer,
                critique: critique_text,
                refined_answer: refined,
                evidence: reply.evidence,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendFamily, ScriptedBackend};
    use crate::index::{Evidence, StubIndex};

    const SUBJECT: &str = "llama3";
    const JUDGE: &str = "llama3.1:latest";

    fn handle(name: &str, backend: &Arc<ScriptedBackend>) -> ModelHandle {
        ModelHandle::with_backend(name, BackendFamily::Ollama, Arc::clone(backend) as _)
    }

    fn scripted_happy_path(backend: &ScriptedBackend) {
        backend.script(SUBJECT, "42");
        backend.script(JUDGE, "looks fine");
        backend.script(SUBJECT, "42, refined");
    }

    #[tokio::test]
    async fn test_happy_path_captures_all_three_texts() {
        let backend = Arc::new(ScriptedBackend::new());
        scripted_happy_path(&backend);
        let index = Arc::new(StubIndex::with_evidence(vec![Evidence::text("snippet")]));
        let orch = CritiqueOrchestrator::new(index);

        let outcome = orch
            .run(
                &Artifact::question("Q"),
                &handle(SUBJECT, &backend),
                &handle(JUDGE, &backend),
                &CancelToken::new(),
            )
            .await;

        let result = outcome.result().expect("exchange should complete");
        assert_eq!(result.initial_answer, "42");
        assert_eq!(result.critique, "looks fine");
        assert_eq!(result.refined_answer, "42, refined");
        assert_eq!(result.evidence, vec![Evidence::text("snippet")]);
    }

    #[tokio::test]
    async fn test_prompt_construction_is_deterministic() {
        let run_once = || async {
            let backend = Arc::new(ScriptedBackend::new());
            scripted_happy_path(&backend);
            let index = Arc::new(StubIndex::with_evidence(vec![Evidence::text("snippet")]));
            let orch = CritiqueOrchestrator::new(Arc::clone(&index) as Arc<dyn RetrievalIndex>);
            orch.run(
                &Artifact::question("Q"),
                &handle(SUBJECT, &backend),
                &handle(JUDGE, &backend),
                &CancelToken::new(),
            )
            .await;
            index.prompts()
        };

        let first = run_once().await;
        let second = run_once().await;
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[tokio::test]
    async fn test_refine_prompt_contains_answer_and_critique() {
        let backend = Arc::new(ScriptedBackend::new());
        scripted_happy_path(&backend);
        let index = Arc::new(StubIndex::new());
        let orch = CritiqueOrchestrator::new(Arc::clone(&index) as Arc<dyn RetrievalIndex>);

        orch.run(
            &Artifact::question("Q"),
            &handle(SUBJECT, &backend),
            &handle(JUDGE, &backend),
            &CancelToken::new(),
        )
        .await;

        let prompts = index.prompts();
        let refine = &prompts[2];
        assert!(refine.contains("42"));
        assert!(refine.contains("looks fine"));
    }

    #[tokio::test]
    async fn test_answer_failure_skips_judge_and_records_failure() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.script_failure(SUBJECT, "connection refused");
        let index = Arc::new(StubIndex::new());
        let orch = CritiqueOrchestrator::new(index);

        let outcome = orch
            .run(
                &Artifact::question("Q"),
                &handle(SUBJECT, &backend),
                &handle(JUDGE, &backend),
                &CancelToken::new(),
            )
            .await;

        match outcome {
            ExchangeOutcome::Failed { step, error } => {
                assert_eq!(step, ExchangeStep::Answer);
                assert!(error.contains("connection refused"));
            }
            other => panic!("expected failure, got {}", other),
        }
        // Steps 2-3 never ran
        assert_eq!(backend.calls(JUDGE), 0);
        assert_eq!(backend.calls(SUBJECT), 1);
    }

    #[tokio::test]
    async fn test_oversized_answer_fails_critique_step() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.script(SUBJECT, "y".repeat(2_000));
        let index = Arc::new(StubIndex::new());
        let orch = CritiqueOrchestrator::with_limits(
            index,
            PromptLimits {
                budget_chars: 500,
                snippet_chars: 100,
            },
        );

        let outcome = orch
            .run(
                &Artifact::question("Q"),
                &handle(SUBJECT, &backend),
                &handle(JUDGE, &backend),
                &CancelToken::new(),
            )
            .await;

        match outcome {
            ExchangeOutcome::Failed { step, error } => {
                assert_eq!(step, ExchangeStep::Critique);
                assert!(error.contains("Prompt too large"));
            }
            other => panic!("expected failure, got {}", other),
        }
        assert_eq!(backend.calls(JUDGE), 0);
    }

    #[tokio::test]
    async fn test_judge_failure_recorded_at_critique_step() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.script(SUBJECT, "42");
        backend.script_failure(JUDGE, "judge down");
        let index = Arc::new(StubIndex::new());
        let orch = CritiqueOrchestrator::new(index);

        let outcome = orch
            .run(
                &Artifact::question("Q"),
                &handle(SUBJECT, &backend),
                &handle(JUDGE, &backend),
                &CancelToken::new(),
            )
            .await;

        assert!(outcome.is_failed());
        assert!(outcome.to_string().contains("failed at critique"));
        // Refine never ran
        assert_eq!(backend.calls(SUBJECT), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_at_step_boundary() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.script(SUBJECT, "42");
        let index = Arc::new(StubIndex::new());
        let orch = CritiqueOrchestrator::new(index);

        let cancel = CancelToken::new();
        cancel.cancel();

        // Already cancelled before the run: the answer step still completes
        // (it was in flight from the caller's point of view), but no later
        // step starts.
        let outcome = orch
            .run(
                &Artifact::question("Q"),
                &handle(SUBJECT, &backend),
                &handle(JUDGE, &backend),
                &cancel,
            )
            .await;

        match outcome {
            ExchangeOutcome::Failed { step, error } => {
                assert_eq!(step, ExchangeStep::Critique);
                assert!(error.contains("cancelled"));
            }
            other => panic!("expected cancellation failure, got {}", other),
        }
        assert_eq!(backend.calls(JUDGE), 0);
    }

    #[tokio::test]
    async fn test_judge_may_equal_subject() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.script(SUBJECT, "42");
        backend.script(SUBJECT, "self critique");
        backend.script(SUBJECT, "refined");
        let index = Arc::new(StubIndex::new());
        let orch = CritiqueOrchestrator::new(index);

        let outcome = orch
            .run(
                &Artifact::question("Q"),
                &handle(SUBJECT, &backend),
                &handle(SUBJECT, &backend),
                &CancelToken::new(),
            )
            .await;

        let result = outcome.result().unwrap();
        assert_eq!(result.critique, "self critique");
        assert_eq!(backend.calls(SUBJECT), 3);
    }

    #[test]
    fn test_exchange_step_display() {
        assert_eq!(ExchangeStep::Answer.to_string(), "answer");
        assert_eq!(ExchangeStep::Critique.to_string(), "critique");
        assert_eq!(ExchangeStep::Refine.to_string(), "refine");
    }

    #[test]
    fn test_outcome_accessors() {
        let completed = ExchangeOutcome::Completed {
            result: ExchangeResult {
                initial_answer: "a".into(),
                critique: "c".into(),
                refined_answer: "r".into(),
                evidence: vec![],
            },
        };
        assert!(completed.is_completed());
        assert!(completed.result().is_some());

        let failed = ExchangeOutcome::Failed {
            step: ExchangeStep::Answer,
            error: "boom".into(),
        };
        assert!(failed.is_failed());
        assert!(failed.result().is_none());

        let skipped = ExchangeOutcome::Skipped {
            reason: "batch cancelled".into(),
        };
        assert!(skipped.is_skipped());
    }

    #[test]
    fn test_outcome_serde_discriminant() {
        let failed = ExchangeOutcome::Failed {
            step: ExchangeStep::Refine,
            error: "boom".into(),
        };
        let json = serde_json::to_string(&failed).unwrap();
        assert!(json.contains("\"status\":\"failed\""));
        assert!(json.contains("\"step\":\"refine\""));

        let parsed: ExchangeOutcome = serde_json::from_str(&json).unwrap();
        assert!(parsed.is_failed());
    }
}

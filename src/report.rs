//! Run report - JSONL persistence and console summary of batch outcomes.
//!
//! One JSONL line per (model, artifact) unit, so downstream tooling can tell
//! a unit that succeeded from one that failed from one that never ran.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::Path;

use crate::error::Result;
use crate::orchestrator::ExchangeOutcome;
use crate::runner::ResultCollection;

/// One unit's line in the JSONL report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRecord {
    /// When the record was written.
    pub recorded_at: DateTime<Utc>,
    /// Subject model name.
    pub model: String,
    /// Artifact key.
    pub artifact: String,
    /// The unit's outcome, with its status discriminant.
    #[serde(flatten)]
    pub outcome: ExchangeOutcome,
}

/// Append every unit outcome to `path`, one JSON object per line.
///
/// Records are written model-by-model in supply order, artifacts in
/// lexicographic key order, matching the summary.
pub fn write_jsonl(path: &Path, collection: &ResultCollection) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    let recorded_at = Utc::now();

    for model in collection.models() {
        let Some(outcomes) = collection.outcomes(model) else {
            continue;
        };
        for (artifact, outcome) in outcomes {
            let record = ReportRecord {
                recorded_at,
                model: model.to_string(),
                artifact: artifact.clone(),
                outcome: outcome.clone(),
            };
            writeln!(file, "{}", serde_json::to_string(&record)?)?;
        }
    }

    log::info!("wrote {} report records to {}", collection.len(), path.display());
    Ok(())
}

/// Human-readable summary of a run.
pub fn format_summary(collection: &ResultCollection) -> String {
    let counts = collection.counts();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} units: {} completed, {} failed, {} skipped",
        counts.total(),
        counts.completed,
        counts.failed,
        counts.skipped
    );

    for model in collection.models() {
        let _ = writeln!(out, "\n{}:", model);
        let Some(outcomes) = collection.outcomes(model) else {
            continue;
        };
        if outcomes.is_empty() {
            let _ = writeln!(out, "  (no artifacts)");
            continue;
        }
        for (artifact, outcome) in outcomes {
            let status = match outcome {
                ExchangeOutcome::Completed { .. } => "ok".to_string(),
                ExchangeOutcome::Failed { step, .. } => format!("failed:{}", step),
                ExchangeOutcome::Skipped { .. } => "skipped".to_string(),
            };
            let _ = writeln!(out, "  [{}] {}", status, artifact);
        }
    }

    out
}

/// The refined answers of every completed unit, in report order.
///
/// This is the pipeline's end product: what the original scripts printed
/// per model per artifact.
pub fn refined_answers(collection: &ResultCollection) -> Vec<(String, String, String)> {
    let mut answers = Vec::new();
    for model in collection.models() {
        let Some(outcomes) = collection.outcomes(model) else {
            continue;
        };
        for (artifact, outcome) in outcomes {
            if let Some(result) = outcome.result() {
                answers.push((
                    model.to_string(),
                    artifact.clone(),
                    result.refined_answer.clone(),
                ));
            }
        }
    }
    answers
}

//! Prompt construction for the three exchange steps.
//!
//! Templates are pure functions of their inputs: given the same artifact,
//! answer, and evidence, the same prompt text comes out. Evidence embedded
//! into the critique prompt is budgeted deterministically (fixed per-snippet
//! cap, then a total budget, snippets taken strictly in retrieval order);
//! a prompt that cannot fit even with zero evidence fails with
//! PromptTooLarge rather than being silently cut down.

use crate::artifact::Artifact;
use crate::error::{CritiqError, Result};
use crate::index::Evidence;

/// Character budgets applied during prompt construction.
#[derive(Debug, Clone)]
pub struct PromptLimits {
    /// Total character budget for one constructed prompt.
    pub budget_chars: usize,
    /// Per-evidence-snippet cap inside critique prompts.
    pub snippet_chars: usize,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            budget_chars: 32_000,
            snippet_chars: 2_000,
        }
    }
}

/// Step 1: the prompt put to the subject model.
///
/// Questions go through verbatim. File artifacts get a review template that
/// names the file and directs the evaluation at the guideline criteria.
pub fn answer_prompt(artifact: &Artifact) -> String {
    match artifact {
        Artifact::Question { text } => text.clone(),
        Artifact::File { path } => format!(
            "You are reviewing a package submission against the guideline corpus.\n\
             File under review: {}\n\n\
             Evaluate this file against the submission guidelines. Check style \
             limits such as line length, naming, and indentation, and structural \
             requirements such as required sections and companion documentation. \
             Identify every violation with a short explanation. If nothing is \
             violated, commend the strengths of the file.",
            path.display()
        ),
    }
}

/// Step 2: the critique prompt put to the judge model.
///
/// Embeds the original question, the subject's answer, and as much evidence
/// as the budget allows.
pub fn critique_prompt(
    question: &str,
    answer: &str,
    evidence: &[Evidence],
    limits: &PromptLimits,
) -> Result<String> {
    let header = format!(
        "The question was: {}\nAnswer from the model was: {}\n",
        question, answer
    );
    let task = "\nTask:\nEvaluate the correctness, relevance, and completeness of the \
                answer and the supporting documents above. Meticulously identify any \
                errors, suggest improvements, and provide your version of the answer.";

    let fixed_len = header.chars().count() + task.chars().count();
    if fixed_len > limits.budget_chars {
        return Err(CritiqError::PromptTooLarge {
            size: fixed_len,
            budget: limits.budget_chars,
        });
    }

    let mut prompt = header;
    let mut used = fixed_len;
    let mut embedded = 0usize;

    for (i, passage) in evidence.iter().enumerate() {
        let label = if embedded == 0 {
            "Supporting documents:\n".to_string()
        } else {
            String::new()
        };
        let snippet = truncate_chars(&passage.text, limits.snippet_chars);
        let line = match &passage.source {
            Some(source) => format!("{}[{}] {}\n", label, source, snippet),
            None => format!("{}- {}\n", label, snippet),
        };

        let line_len = line.chars().count();
        if used + line_len > limits.budget_chars {
            log::debug!("evidence budget reached, dropping {} trailing snippets", evidence.len() - i);
            break;
        }

        prompt.push_str(&line);
        used += line_len;
        embedded += 1;
    }

    prompt.push_str(task);
    Ok(prompt)
}

/// Step 3: the refinement prompt put back to the subject model.
///
/// Always embeds the original question, the initial answer, and the judge's
/// critique verbatim.
pub fn refine_prompt(question: &str, answer: &str, critique: &str) -> String {
    format!(
        "The question was: {}\n\
         The answer you gave was: {}\n\
         Feedback from the review: {}\n\
         Task:\n\
         Refine your answer by incorporating this feedback and adding more \
         information where necessary.",
        question, answer, critique
    )
}

/// Char-boundary-safe truncation.
fn truncate_chars(text: &str, cap: usize) -> String {
    if text.chars().count() <= cap {
        text.to_string()
    } else {
        let cut: String = text.chars().take(cap).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_limits() -> PromptLimits {
        PromptLimits {
            budget_chars: 300,
            snippet_chars: 40,
        }
    }

    #[test]
    fn test_answer_prompt_question_verbatim() {
        let artifact = Artifact::question("What must a package contain?");
        assert_eq!(answer_prompt(&artifact), "What must a package contain?");
    }

    #[test]
    fn test_answer_prompt_file_names_path_and_criteria() {
        let artifact = Artifact::file("pkg/R/methods.R");
        let prompt = answer_prompt(&artifact);
        assert!(prompt.contains("pkg/R/methods.R"));
        assert!(prompt.contains("style"));
        assert!(prompt.contains("structural"));
        assert!(prompt.contains("commend the strengths"));
    }

    #[test]
    fn test_critique_prompt_embeds_question_answer_evidence() {
        let evidence = vec![Evidence::text("Vignettes are mandatory.").with_source("guide.html")];
        let prompt = critique_prompt(
            "What is required?",
            "A vignette.",
            &evidence,
            &PromptLimits::default(),
        )
        .unwrap();

        assert!(prompt.contains("The question was: What is required?"));
        assert!(prompt.contains("Answer from the model was: A vignette."));
        assert!(prompt.contains("Supporting documents:"));
        assert!(prompt.contains("[guide.html] Vignettes are mandatory."));
        assert!(prompt.contains("correctness, relevance, and completeness"));
    }

    #[test]
    fn test_critique_prompt_without_evidence_has_no_documents_block() {
        let prompt =
            critique_prompt("Q", "A", &[], &PromptLimits::default()).unwrap();
        assert!(!prompt.contains("Supporting documents:"));
    }

    #[test]
    fn test_critique_prompt_is_deterministic() {
        let evidence = vec![Evidence::text("a"), Evidence::text("b")];
        let limits = PromptLimits::default();
        let first = critique_prompt("Q", "A", &evidence, &limits).unwrap();
        let second = critique_prompt("Q", "A", &evidence, &limits).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_critique_prompt_caps_each_snippet() {
        let long = "x".repeat(500);
        let evidence = vec![Evidence::text(long)];
        let limits = PromptLimits {
            budget_chars: 10_000,
            snippet_chars: 40,
        };
        let prompt = critique_prompt("Q", "A", &evidence, &limits).unwrap();
        assert!(prompt.contains(&format!("{}...", "x".repeat(40))));
        assert!(!prompt.contains(&"x".repeat(41)));
    }

    #[test]
    fn test_critique_prompt_drops_trailing_snippets_over_budget() {
        let evidence: Vec<Evidence> = (0..50)
            .map(|i| Evidence::text(format!("snippet number {}", i)))
            .collect();
        let prompt = critique_prompt("Q", "A", &evidence, &small_limits()).unwrap();

        assert!(prompt.contains("snippet number 0"));
        assert!(!prompt.contains("snippet number 49"));
        // The task block always survives budgeting
        assert!(prompt.contains("Task:"));
    }

    #[test]
    fn test_critique_prompt_too_large_without_evidence() {
        let answer = "y".repeat(1_000);
        let err = critique_prompt("Q", &answer, &[], &small_limits()).unwrap_err();
        assert!(matches!(err, CritiqError::PromptTooLarge { .. }));
    }

    #[test]
    fn test_refine_prompt_forwards_answer_and_critique() {
        let prompt = refine_prompt("What is required?", "A vignette.", "Also a NEWS file.");
        assert!(prompt.contains("A vignette."));
        assert!(prompt.contains("Also a NEWS file."));
        assert!(prompt.contains("The question was: What is required?"));
        assert!(prompt.contains("Refine your answer"));
    }

    #[test]
    fn test_truncate_chars_boundary_safe() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        // Multi-byte characters are never split
        assert_eq!(truncate_chars("ééééé", 2), "éé...");
    }
}

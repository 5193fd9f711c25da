//! Query stage.
//!
//! ```text
//!   Idle ──(question + non-empty corpus)──► InFlight ──► Resolved(outcome)
//! ```
//!
//! The prompt embeds a hard prefix of the corpus, cut at
//! `query.cutoff_chars` characters, and the question text as typed. Chunks
//! are not consulted. Exactly one model call is made per question.

use crate::config::QueryConfig;
use crate::llm::ModelError;
use crate::models::Corpus;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::traits::{GenerationParams, GenerativeModel};

/// How a question ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Answer(String),
    /// The call succeeded but the model returned no text.
    NoAnswer { diagnostics: Vec<String> },
    Failed(ModelError),
}

impl QueryOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            QueryOutcome::Answer(_) => "answer",
            QueryOutcome::NoAnswer { .. } => "no_answer",
            QueryOutcome::Failed(_) => "error",
        }
    }

    /// Text for the user: the answer, the no-answer notice, or the error
    /// detail followed by its guidance note.
    pub fn render(&self) -> String {
        match self {
            QueryOutcome::Answer(text) => text.clone(),
            QueryOutcome::NoAnswer { diagnostics } if diagnostics.is_empty() => {
                "The model returned no answer.".to_string()
            }
            QueryOutcome::NoAnswer { diagnostics } => format!(
                "The model returned no answer.\n{}",
                diagnostics
                    .iter()
                    .map(|d| format!("  - {}", d))
                    .collect::<Vec<_>>()
                    .join("\n")
            ),
            QueryOutcome::Failed(err) => {
                format!("Model call failed ({}): {}\n{}", err.category(), err.detail(), err.guidance())
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum QueryState {
    #[default]
    Idle,
    InFlight,
    Resolved(QueryOutcome),
}

pub struct QueryStage {
    cutoff_chars: usize,
    template: String,
    params: GenerationParams,
    state: QueryState,
}

impl QueryStage {
    pub fn new(config: &QueryConfig, params: GenerationParams) -> Self {
        Self {
            cutoff_chars: config.cutoff_chars,
            template: config.prompt_template.clone(),
            params,
            state: QueryState::Idle,
        }
    }

    pub fn state(&self) -> &QueryState {
        &self.state
    }

    pub fn outcome(&self) -> Option<&QueryOutcome> {
        match &self.state {
            QueryState::Resolved(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Back to idle, e.g. when a new corpus replaces the old one.
    pub fn reset(&mut self) {
        self.state = QueryState::Idle;
    }

    pub fn build_prompt(&self, corpus: &Corpus, question: &str) -> String {
        let data = truncate_chars(corpus.text(), self.cutoff_chars);
        render_prompt(&self.template, data, question)
    }

    /// Ask one question. Without a question or without corpus text the
    /// stage stays idle and no call is made.
    pub async fn ask(
        &mut self,
        model: &dyn GenerativeModel,
        corpus: &Corpus,
        question: &str,
        progress: &dyn ProgressReporter,
    ) -> &QueryState {
        if question.trim().is_empty() || corpus.is_empty() {
            self.state = QueryState::Idle;
            return &self.state;
        }

        let prompt = self.build_prompt(corpus, question);
        self.state = QueryState::InFlight;
        progress.report(ProgressEvent::Querying {
            model: model.model_name().to_string(),
        });
        tracing::info!(
            model = model.model_name(),
            prompt_chars = prompt.chars().count(),
            corpus_chars = corpus.char_count(),
            "query in flight"
        );

        let outcome = match model.generate(&prompt, &self.params).await {
            Ok(generation) if !generation.is_empty() => QueryOutcome::Answer(generation.text),
            Ok(generation) => QueryOutcome::NoAnswer {
                diagnostics: generation.diagnostics,
            },
            Err(err) => {
                tracing::warn!(category = err.category(), "model call failed: {}", err);
                QueryOutcome::Failed(err)
            }
        };

        progress.report(ProgressEvent::Resolved {
            outcome: outcome.label().to_string(),
        });
        self.state = QueryState::Resolved(outcome);
        &self.state
    }
}

/// The first `max_chars` characters of `text` (never splits a character).
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Substitute `{data}` and `{question}` in one left-to-right pass, so
/// braces inside the inserted text are never expanded again.
pub fn render_prompt(template: &str, data: &str, question: &str) -> String {
    let mut out = String::with_capacity(template.len() + data.len() + question.len());
    let mut rest = template;
    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix("{data}") {
            out.push_str(data);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{question}") {
            out.push_str(question);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

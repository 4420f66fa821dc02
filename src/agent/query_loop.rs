// ============================================================
// Layer 5 — Query Repair Loop
// ============================================================
// Bounded generate → execute → (repair) cycle, written as an
// explicit state machine:
//
//   Generate(n) ──ok──▶ Execute(n) ──rows──▶ Done(Success)
//       │                   │
//       └──fail──┐  ┌──fail─┘
//                ▼  ▼
//             Retry(n) ──budget left──▶ Generate(n+1)
//                │
//                └──budget spent─────▶ Done(Exhausted)
//
// Every pass records exactly one QueryAttempt, including passes
// where generation itself failed (empty query text). The failing
// error and query are fed into the next generation prompt.
//
// attempts = 1 + retries, retries ≤ MAX_RETRIES, so a question
// never makes more than three generation calls in this loop.

use std::time::Duration;

use crate::agent::normalizer::{extract_fields, FieldKind, FieldSpec};
use crate::agent::prompts;
use crate::domain::error::StageError;
use crate::domain::query::{AttemptOutcome, ExecutionResult};
use crate::domain::schema::SchemaSnapshot;
use crate::domain::state::{QuestionState, Stage};
use crate::domain::traits::{QueryExecutor, TextGenerator};

/// Hard upper bound on repairs after the first attempt
pub const MAX_RETRIES: u32 = 2;

const SQL_FIELDS: [FieldSpec; 1] = [FieldSpec::new("sql", FieldKind::Query)];

/// Repairs still allowed for one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    remaining: u32,
}

impl RetryBudget {
    /// Configured values above MAX_RETRIES are capped.
    pub fn new(max_retries: u32) -> Self {
        Self { remaining: max_retries.min(MAX_RETRIES) }
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Consume one retry; false if none were left.
    fn take(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        true
    }
}

#[derive(Debug)]
enum LoopPhase {
    Generate { feedback: Option<(String, String)> },
    Execute  { query: String, prior_error: Option<String> },
    Retry    { query: String, error: String },
    Done(ExecutionResult),
}

pub struct QueryLoop<'a> {
    pub generator: &'a dyn TextGenerator,
    pub executor:  &'a dyn QueryExecutor,
    pub schema:    &'a SchemaSnapshot,
    pub timeout:   Duration,
    pub budget:    RetryBudget,
}

impl QueryLoop<'_> {
    /// Run the loop to completion, recording attempts and errors in
    /// `state` and setting its execution result. `cancelled` is
    /// checked before every new generation.
    pub fn run(&self, state: &mut QuestionState, cancelled: &dyn Fn() -> bool) -> ExecutionResult {
        let schema_text = self.schema.render();
        let plan        = state.plan().cloned().unwrap_or_default();
        let mut budget  = self.budget;
        let mut phase   = LoopPhase::Generate { feedback: None };

        let result = loop {
            phase = match phase {
                LoopPhase::Generate { feedback } => {
                    if cancelled() {
                        let (last_query, last_error) = match feedback {
                            Some((q, _)) => (non_empty(q), "cancelled".to_string()),
                            None => (None, "cancelled".to_string()),
                        };
                        state.record_error(StageError::Cancelled(Stage::Query));
                        LoopPhase::Done(ExecutionResult::Exhausted { last_query, last_error })
                    } else {
                        let attempt = state.attempts().len() as u32;
                        let prompt = prompts::sql_prompt(
                            state.question(),
                            &plan,
                            &schema_text,
                            feedback.as_ref().map(|(q, e)| (q.as_str(), e.as_str())),
                        );
                        let prior_error = feedback.map(|(_, e)| e);

                        match self.generate_query(&prompt) {
                            Ok(query) => LoopPhase::Execute { query, prior_error },
                            Err(reason) => {
                                state.record_error(StageError::QueryGenerationFailure {
                                    attempt,
                                    reason: reason.clone(),
                                });
                                state.record_attempt(
                                    "",
                                    prior_error,
                                    AttemptOutcome::Failed(reason.clone()),
                                );
                                LoopPhase::Retry { query: String::new(), error: reason }
                            }
                        }
                    }
                }

                LoopPhase::Execute { query, prior_error } => match self.executor.execute(&query) {
                    Ok(rows) => {
                        tracing::info!(rows = rows.len(), "query succeeded");
                        let attempt = state.record_attempt(
                            query.clone(),
                            prior_error,
                            AttemptOutcome::Rows(rows.clone()),
                        );
                        LoopPhase::Done(ExecutionResult::Success { attempt, query, rows })
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        let attempt = state.record_attempt(
                            query.clone(),
                            prior_error,
                            AttemptOutcome::Failed(reason.clone()),
                        );
                        state.record_error(StageError::QueryExecutionFailure {
                            attempt,
                            reason: reason.clone(),
                        });
                        LoopPhase::Retry { query, error: reason }
                    }
                },

                LoopPhase::Retry { query, error } => {
                    if budget.take() {
                        tracing::info!(remaining = budget.remaining(), "repairing query");
                        LoopPhase::Generate { feedback: Some((query, error)) }
                    } else {
                        let last_query = state
                            .attempts()
                            .iter()
                            .rev()
                            .find(|a| !a.query.is_empty())
                            .map(|a| a.query.clone());
                        LoopPhase::Done(ExecutionResult::Exhausted { last_query, last_error: error })
                    }
                }

                LoopPhase::Done(result) => break result,
            };
        };

        if let ExecutionResult::Exhausted { last_error, .. } = &result {
            tracing::warn!(attempts = state.attempts().len(), "query attempts exhausted: {last_error}");
        }
        state.set_execution(result.clone());
        result
    }

    fn generate_query(&self, prompt: &str) -> Result<String, String> {
        let raw = self
            .generator
            .generate(prompt, self.timeout)
            .map_err(|e| e.to_string())?;
        let fields = extract_fields(&raw, &SQL_FIELDS);
        match fields.text("sql") {
            "" => Err("no SQL statement found in generator output".to_string()),
            sql => Ok(sql.to_string()),
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

// ============================================================
// Layer 3 — QuestionState and its parts
// ============================================================
// QuestionState is the single record threaded through the
// pipeline for one question. It is owned by exactly one worker
// for the lifetime of that question and is never shared.
//
// Append-only / set-once invariants are enforced here rather
// than in the stages:
//   - route, plan, execution result and final answer are set once
//   - query attempts are appended with index == previous count
//   - the error log only grows

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::chunk::RetrievedChunk;
use crate::domain::error::StageError;
use crate::domain::query::{AttemptOutcome, ExecutionResult, QueryAttempt};
use crate::domain::question::{OutputRecord, Question};

// ─── RouteDecision ────────────────────────────────────────────────────────────

/// Strategy chosen for a question. Hybrid is the superset and the
/// fallback whenever classification cannot decide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteDecision {
    /// Answer from retrieved document chunks only
    Document,
    /// Answer from a generated SQL query only
    Structured,
    #[default]
    Hybrid,
}

impl RouteDecision {
    pub fn label(self) -> &'static str {
        match self {
            RouteDecision::Document   => "document",
            RouteDecision::Structured => "structured",
            RouteDecision::Hybrid     => "hybrid",
        }
    }

    pub fn needs_retrieval(self) -> bool {
        matches!(self, RouteDecision::Document | RouteDecision::Hybrid)
    }

    pub fn needs_query(self) -> bool {
        matches!(self, RouteDecision::Structured | RouteDecision::Hybrid)
    }
}

impl fmt::Display for RouteDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ─── Stage ────────────────────────────────────────────────────────────────────

/// Pipeline bookkeeping: which stage a question is in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Route,
    Retrieve,
    Plan,
    Query,
    Synthesize,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Route      => "route",
            Stage::Retrieve   => "retrieve",
            Stage::Plan       => "plan",
            Stage::Query      => "query",
            Stage::Synthesize => "synthesize",
            Stage::Done       => "done",
        };
        f.write_str(name)
    }
}

// ─── PlanningContext ──────────────────────────────────────────────────────────

/// Entities and constraints extracted for SQL generation.
/// An empty context is valid: generation then relies on the schema alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningContext {
    pub entities:    BTreeSet<String>,
    /// constraint key → value, keys unique
    pub constraints: BTreeMap<String, String>,
}

impl PlanningContext {
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.constraints.is_empty()
    }

    pub fn render(&self) -> String {
        if self.is_empty() {
            return "(none extracted; rely on the schema)".to_string();
        }
        let entities: Vec<&str> = self.entities.iter().map(String::as_str).collect();
        let constraints: Vec<String> = self
            .constraints
            .iter()
            .map(|(k, v)| format!("{k} = {v}"))
            .collect();
        format!(
            "entities: {}\nconstraints: {}",
            entities.join(", "),
            constraints.join("; ")
        )
    }
}

// ─── FinalAnswer ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub text:        String,
    /// Clamped into [0, 1] on construction
    pub confidence:  f64,
    pub explanation: String,
    /// Chunk ids and query ids, in citation order
    pub citations:   Vec<String>,
}

impl FinalAnswer {
    pub fn new(
        text:        impl Into<String>,
        confidence:  f64,
        explanation: impl Into<String>,
        citations:   Vec<String>,
    ) -> Self {
        let confidence = if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            text:        text.into(),
            confidence,
            explanation: explanation.into(),
            citations,
        }
    }

    /// Fallback when nothing usable was retrieved or queried.
    pub fn insufficient(explanation: impl Into<String>) -> Self {
        Self::new(
            "Insufficient information to answer this question.",
            0.0,
            explanation,
            Vec::new(),
        )
    }
}

// ─── AnsweredQuestion ─────────────────────────────────────────────────────────

/// A finished question: its output record and a few facts about how
/// it was answered, for the run summary.
#[derive(Debug, Clone, PartialEq)]
pub struct AnsweredQuestion {
    pub record:          OutputRecord,
    /// None when the run was cancelled before routing
    pub route:           Option<RouteDecision>,
    pub query_exhausted: bool,
    pub attempts:        usize,
}

impl AnsweredQuestion {
    /// For questions that never entered the pipeline.
    pub fn unanswered(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            record:          OutputRecord::unanswered(id, reason),
            route:           None,
            query_exhausted: false,
            attempts:        0,
        }
    }
}

// ─── QuestionState ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct QuestionState {
    question:  Question,
    route:     Option<RouteDecision>,
    retrieved: Vec<RetrievedChunk>,
    plan:      Option<PlanningContext>,
    attempts:  Vec<QueryAttempt>,
    execution: Option<ExecutionResult>,
    answer:    Option<FinalAnswer>,
    stage:     Stage,
    errors:    Vec<StageError>,
}

impl QuestionState {
    pub fn new(question: Question) -> Self {
        Self {
            question,
            route:     None,
            retrieved: Vec::new(),
            plan:      None,
            attempts:  Vec::new(),
            execution: None,
            answer:    None,
            stage:     Stage::Route,
            errors:    Vec::new(),
        }
    }

    pub fn question(&self) -> &Question {
        &self.question
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn enter(&mut self, stage: Stage) {
        tracing::debug!(from = %self.stage, to = %stage, "stage transition");
        self.stage = stage;
    }

    /// The route, or Hybrid if routing never ran.
    pub fn route(&self) -> RouteDecision {
        self.route.unwrap_or_default()
    }

    pub fn set_route(&mut self, route: RouteDecision) {
        if self.route.is_none() {
            self.route = Some(route);
        }
    }

    pub fn retrieved(&self) -> &[RetrievedChunk] {
        &self.retrieved
    }

    pub fn set_retrieved(&mut self, chunks: Vec<RetrievedChunk>) {
        if self.retrieved.is_empty() {
            self.retrieved = chunks;
        }
    }

    pub fn plan(&self) -> Option<&PlanningContext> {
        self.plan.as_ref()
    }

    pub fn set_plan(&mut self, plan: PlanningContext) {
        if self.plan.is_none() {
            self.plan = Some(plan);
        }
    }

    pub fn attempts(&self) -> &[QueryAttempt] {
        &self.attempts
    }

    /// Append an attempt; its index is the number of attempts before it.
    pub fn record_attempt(
        &mut self,
        query:       impl Into<String>,
        prior_error: Option<String>,
        outcome:     AttemptOutcome,
    ) -> u32 {
        let index = self.attempts.len() as u32;
        self.attempts.push(QueryAttempt {
            index,
            query: query.into(),
            prior_error,
            outcome,
        });
        index
    }

    pub fn execution(&self) -> Option<&ExecutionResult> {
        self.execution.as_ref()
    }

    pub fn set_execution(&mut self, result: ExecutionResult) {
        if self.execution.is_none() {
            self.execution = Some(result);
        }
    }

    /// True when the repair loop ran out of attempts
    pub fn query_exhausted(&self) -> bool {
        matches!(self.execution, Some(ExecutionResult::Exhausted { .. }))
    }

    pub fn answer(&self) -> Option<&FinalAnswer> {
        self.answer.as_ref()
    }

    pub fn set_answer(&mut self, answer: FinalAnswer) {
        if self.answer.is_none() {
            self.answer = Some(answer);
        }
    }

    pub fn errors(&self) -> &[StageError] {
        &self.errors
    }

    pub fn record_error(&mut self, err: StageError) {
        tracing::warn!(stage = %self.stage, "{err}");
        self.errors.push(err);
    }

    /// Close the question: the output record plus what the run summary needs.
    pub fn finish(self) -> AnsweredQuestion {
        let route           = self.route;
        let query_exhausted = self.query_exhausted();
        let attempts        = self.attempts.len();
        AnsweredQuestion { record: self.into_output(), route, query_exhausted, attempts }
    }

    /// Serialise into the batch output contract.
    pub fn into_output(self) -> OutputRecord {
        let sql = self
            .execution
            .as_ref()
            .and_then(ExecutionResult::reported_query)
            .map(str::to_string);

        match self.answer {
            Some(answer) => OutputRecord {
                id:           self.question.id,
                final_answer: answer.text,
                sql,
                confidence:   answer.confidence,
                explanation:  answer.explanation,
                citations:    answer.citations,
            },
            None => {
                let reason = self
                    .errors
                    .last()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "no answer was produced".to_string());
                OutputRecord { sql, ..OutputRecord::unanswered(self.question.id, reason) }
            }
        }
    }
}

// ============================================================
// Layer 5 — Orchestrator
// ============================================================
// Drives one question through the pipeline:
//
//   Route ──▶ Retrieve? ──▶ Plan? ──▶ Query loop? ──▶ Synthesize ──▶ Done
//
//   Retrieve          when the route is document or hybrid
//   Plan + Query loop when the route is structured or hybrid
//
// The QuestionState is created here, owned by the calling worker
// for the whole run and turned into exactly one OutputRecord at
// the end. Cancellation is checked at every stage boundary; a
// cancelled question stops where it is and reports what it has.
//
// The chunk index and schema snapshot are built before the first
// question and only read afterwards, so one Orchestrator is shared
// by every worker.

use std::sync::Arc;
use std::time::Duration;

use crate::agent::query_loop::{QueryLoop, RetryBudget};
use crate::agent::retriever::Retriever;
use crate::agent::{planner, router, synthesizer};
use crate::data::index::ChunkIndex;
use crate::domain::error::StageError;
use crate::domain::question::Question;
use crate::domain::schema::SchemaSnapshot;
use crate::domain::state::{AnsweredQuestion, QuestionState, Stage};
use crate::domain::traits::{QueryExecutor, QuestionAnswerer, TextGenerator};
use crate::infra::cancel::CancelFlag;

/// Per-question pipeline knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    /// Chunks handed to planning and synthesis
    pub top_k:       usize,
    /// Repairs after the first query attempt, capped at 2
    pub max_retries: u32,
    /// Applied uniformly to every generation call
    pub llm_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_k:       6,
            max_retries: 2,
            llm_timeout: Duration::from_secs(300),
        }
    }
}

pub struct Orchestrator {
    generator: Arc<dyn TextGenerator>,
    executor:  Arc<dyn QueryExecutor>,
    index:     Arc<ChunkIndex>,
    schema:    Arc<SchemaSnapshot>,
    settings:  PipelineSettings,
    cancel:    CancelFlag,
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        executor:  Arc<dyn QueryExecutor>,
        index:     Arc<ChunkIndex>,
        schema:    Arc<SchemaSnapshot>,
        settings:  PipelineSettings,
        cancel:    CancelFlag,
    ) -> Self {
        Self { generator, executor, index, schema, settings, cancel }
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Run the full pipeline and keep the state for inspection.
    pub fn process(&self, question: &Question) -> QuestionState {
        let span = tracing::info_span!("question", id = %question.id);
        let _guard = span.enter();

        let mut state = QuestionState::new(question.clone());
        if self.run(&mut state).is_none() {
            tracing::warn!(stage = %state.stage(), "question cancelled");
        }
        state
    }

    /// Stages in order. `None` means the run was cancelled at a boundary.
    fn run(&self, state: &mut QuestionState) -> Option<()> {
        let timeout = self.settings.llm_timeout;

        // ── Route ────────────────────────────────────────────
        self.checkpoint(state, Stage::Route)?;
        let signal = self.route_signal();
        let (route, err) = router::classify(
            self.generator.as_ref(),
            timeout,
            state.question(),
            signal.as_deref(),
        );
        if let Some(e) = err {
            state.record_error(e);
        }
        state.set_route(route);
        tracing::info!(route = %route, "routed");

        // ── Retrieve ─────────────────────────────────────────
        if route.needs_retrieval() {
            self.checkpoint(state, Stage::Retrieve)?;
            let hits = Retriever::new(&self.index, self.settings.top_k).retrieve(&state.question().text);
            tracing::info!(chunks = hits.len(), "retrieved");
            state.set_retrieved(hits);
        }

        // ── Plan + Query loop ────────────────────────────────
        if route.needs_query() {
            self.checkpoint(state, Stage::Plan)?;
            let (plan, err) = planner::plan(
                self.generator.as_ref(),
                timeout,
                state.question(),
                state.retrieved(),
            );
            if let Some(e) = err {
                state.record_error(e);
            }
            state.set_plan(plan);

            self.checkpoint(state, Stage::Query)?;
            let qloop = QueryLoop {
                generator: self.generator.as_ref(),
                executor:  self.executor.as_ref(),
                schema:    &self.schema,
                timeout,
                budget:    RetryBudget::new(self.settings.max_retries),
            };
            let cancel = self.cancel.clone();
            qloop.run(state, &move || cancel.is_cancelled());
        }

        // ── Synthesize ───────────────────────────────────────
        self.checkpoint(state, Stage::Synthesize)?;
        let (answer, errors) = synthesizer::synthesize(self.generator.as_ref(), timeout, state);
        for e in errors {
            state.record_error(e);
        }
        tracing::info!(confidence = answer.confidence, citations = answer.citations.len(), "answered");
        state.set_answer(answer);
        state.enter(Stage::Done);
        Some(())
    }

    /// Enter `stage`, or record the cancellation and stop.
    fn checkpoint(&self, state: &mut QuestionState, stage: Stage) -> Option<()> {
        if self.cancel.is_cancelled() {
            state.record_error(StageError::Cancelled(stage));
            return None;
        }
        state.enter(stage);
        Some(())
    }

    /// Table names help the classifier recognise database questions.
    fn route_signal(&self) -> Option<String> {
        let tables = self.schema.table_names();
        (!tables.is_empty()).then(|| format!("Database tables: {}", tables.join(", ")))
    }
}

impl QuestionAnswerer for Orchestrator {
    fn answer(&self, question: &Question) -> AnsweredQuestion {
        self.process(question).finish()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::agent::prompts::PromptKind;
    use crate::data::index::Bm25Params;
    use crate::data::preprocessor::tokenize;
    use crate::domain::chunk::Chunk;
    use crate::domain::error::{ExecutionError, GenerationError};
    use crate::domain::query::RowSet;
    use crate::domain::state::RouteDecision;

    /// Answers by prompt kind; counts calls per kind.
    struct ByKind {
        route: &'static str,
        calls: Mutex<Vec<PromptKind>>,
    }

    impl TextGenerator for ByKind {
        fn generate(&self, prompt: &str, _timeout: Duration) -> Result<String, GenerationError> {
            let kind = PromptKind::of(prompt).ok_or(GenerationError::EmptyResponse)?;
            self.calls.lock().unwrap().push(kind);
            Ok(match kind {
                PromptKind::Route      => self.route.to_string(),
                PromptKind::Plan       => r#"{"entities": ["Orders"], "constraints": {}}"#.to_string(),
                PromptKind::Sql        => "SELECT COUNT(*) FROM Orders".to_string(),
                PromptKind::Synthesize => r#"{"final_answer": "830", "confidence": 0.8}"#.to_string(),
            })
        }
    }

    struct OneRow;

    impl QueryExecutor for OneRow {
        fn execute(&self, _query: &str) -> Result<RowSet, ExecutionError> {
            Ok(RowSet {
                columns:     vec!["n".into()],
                rows:        vec![vec![serde_json::json!(830)]],
                tables_used: vec!["Orders".into()],
            })
        }
    }

    fn orchestrator(route: &'static str, cancel: CancelFlag) -> (Orchestrator, Arc<ByKind>) {
        let gen = Arc::new(ByKind { route, calls: Mutex::new(Vec::new()) });
        let text = "Orders shipped in 1997";
        let index = ChunkIndex::build(
            vec![Chunk::new("kpi::chunk0", "kpi.md", tokenize(text), text)],
            Bm25Params::default(),
        );
        let orch = Orchestrator::new(
            gen.clone(),
            Arc::new(OneRow),
            Arc::new(index),
            Arc::new(SchemaSnapshot::default()),
            PipelineSettings::default(),
            cancel,
        );
        (orch, gen)
    }

    #[test]
    fn test_structured_route_skips_retrieval() {
        let (orch, gen) = orchestrator("structured", CancelFlag::new());
        let state = orch.process(&Question::new("q1", "How many Orders in 1997?"));
        assert_eq!(state.route(), RouteDecision::Structured);
        assert!(state.retrieved().is_empty());
        assert_eq!(state.stage(), Stage::Done);
        assert_eq!(
            *gen.calls.lock().unwrap(),
            vec![PromptKind::Route, PromptKind::Plan, PromptKind::Sql, PromptKind::Synthesize]
        );
    }

    #[test]
    fn test_document_route_skips_query() {
        let (orch, gen) = orchestrator("document", CancelFlag::new());
        let rec = orch.answer(&Question::new("q2", "Orders shipped in 1997?")).record;
        assert!(rec.sql.is_none());
        assert_eq!(rec.citations, vec!["kpi::chunk0"]);
        assert!(!gen.calls.lock().unwrap().contains(&PromptKind::Sql));
    }

    #[test]
    fn test_hybrid_runs_everything() {
        let (orch, _) = orchestrator("hybrid", CancelFlag::new());
        let rec = orch.answer(&Question::new("q3", "Orders shipped in 1997?")).record;
        assert_eq!(rec.sql.as_deref(), Some("SELECT COUNT(*) FROM Orders"));
        assert_eq!(rec.citations, vec!["kpi::chunk0", "sql::attempt0", "Orders"]);
        assert_eq!(rec.confidence, 0.8);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let (orch, gen) = orchestrator("hybrid", cancel);
        let done = orch.answer(&Question::new("q4", "?"));
        assert_eq!(done.route, None);
        let rec = done.record;
        assert_eq!(rec.id, "q4");
        assert_eq!(rec.confidence, 0.0);
        assert!(rec.explanation.contains("cancelled"));
        assert!(gen.calls.lock().unwrap().is_empty());
    }
}

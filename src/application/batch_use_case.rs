// ============================================================
// Layer 2 — BatchUseCase
// ============================================================
// Answers every question of a JSONL batch file:
//
//   Step 1: Read questions              (Layer 4 - data)
//   Step 2: Open the output file        (Layer 6 - infra)
//   Step 3: Fan questions out over a
//           bounded rayon pool          (Layer 5 - agent)
//   Step 4: Append each record as soon
//           as its question completes   (Layer 6 - infra)
//   Step 5: Log the run summary
//
// Every question yields exactly one record. A question that
// panics or is skipped by cancellation still gets one, with
// confidence 0.0. Only I/O on the batch or output file can
// fail the run.

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::data::batch::BatchReader;
use crate::domain::question::Question;
use crate::domain::state::AnsweredQuestion;
use crate::domain::traits::QuestionAnswerer;
use crate::infra::cancel::CancelFlag;
use crate::infra::results_writer::ResultsWriter;

// ─── Batch Summary ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub total:           usize,
    /// Questions that reached a route decision
    pub routed:          usize,
    /// Records written without running the pipeline (cancelled, panicked)
    pub unanswered:      usize,
    /// Questions whose query repair loop ran out of attempts
    pub query_exhausted: usize,
    pub by_route:        BTreeMap<String, usize>,
}

impl BatchSummary {
    fn add(&mut self, done: &AnsweredQuestion) {
        self.total += 1;
        match done.route {
            Some(route) => {
                self.routed += 1;
                *self.by_route.entry(route.label().to_string()).or_insert(0) += 1;
            }
            None => self.unanswered += 1,
        }
        if done.query_exhausted {
            self.query_exhausted += 1;
        }
    }
}

// ─── BatchUseCase ─────────────────────────────────────────────────────────────
pub struct BatchUseCase {
    input:   PathBuf,
    output:  PathBuf,
    workers: usize,
}

impl BatchUseCase {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, workers: usize) -> Self {
        Self { input: input.into(), output: output.into(), workers: workers.max(1) }
    }

    pub fn execute<A>(&self, answerer: &A, cancel: &CancelFlag) -> Result<BatchSummary>
    where
        A: QuestionAnswerer + Sync,
    {
        // Step 1
        let questions = BatchReader::read(&self.input)?;

        // Step 2
        let writer = ResultsWriter::create(&self.output)?;

        // Steps 3-4
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .context("Failed to build worker pool")?;
        tracing::info!("Answering {} questions with {} worker(s)", questions.len(), self.workers);

        let finished: Vec<AnsweredQuestion> = pool.install(|| -> Result<Vec<AnsweredQuestion>> {
            questions
                .par_iter()
                .map(|q| {
                    let done = answer_one(answerer, q, cancel);
                    writer.append(&done.record)?;
                    Ok(done)
                })
                .collect()
        })?;

        // Step 5
        let mut summary = BatchSummary::default();
        for done in &finished {
            summary.add(done);
        }
        tracing::info!(
            total = summary.total,
            routed = summary.routed,
            unanswered = summary.unanswered,
            query_exhausted = summary.query_exhausted,
            by_route = ?summary.by_route,
            "Batch complete, results in '{}'",
            writer.path().display()
        );
        Ok(summary)
    }
}

/// One question, isolated from panics in the pipeline.
fn answer_one<A: QuestionAnswerer>(answerer: &A, q: &Question, cancel: &CancelFlag) -> AnsweredQuestion {
    if cancel.is_cancelled() {
        return AnsweredQuestion::unanswered(q.id.clone(), "cancelled before processing started");
    }

    match panic::catch_unwind(AssertUnwindSafe(|| answerer.answer(q))) {
        Ok(done) => done,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(id = %q.id, "question processing panicked: {msg}");
            AnsweredQuestion::unanswered(q.id.clone(), format!("internal error: {msg}"))
        }
    }
}

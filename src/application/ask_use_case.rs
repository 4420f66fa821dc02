// ============================================================
// Layer 2 — Ask Use Case
// ============================================================
// Answers a single question given on the command line, through
// the same pipeline a batch run uses.

use crate::domain::question::{OutputRecord, Question};
use crate::domain::traits::QuestionAnswerer;

pub struct AskUseCase<A> {
    answerer: A,
}

impl<A: QuestionAnswerer> AskUseCase<A> {
    pub fn new(answerer: A) -> Self {
        Self { answerer }
    }

    pub fn answer(&self, id: &str, question: &str, format_hint: &str) -> OutputRecord {
        let q = Question::new(id, question).with_format_hint(format_hint);
        let done = self.answerer.answer(&q);
        if let Some(route) = done.route {
            tracing::info!(route = %route, attempts = done.attempts, "answered");
        }
        done.record
    }
}

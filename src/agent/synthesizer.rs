// ============================================================
// Layer 5 — Answer Synthesizer
// ============================================================
// Merges everything a question accumulated into one FinalAnswer.
//
// Always produces an answer:
//   - nothing retrieved and no rows   → "insufficient information",
//                                       confidence 0.0, no generator call
//   - generator fails or says nothing → best-effort text from the
//                                       rows or the top chunk
//
// Citations: cited chunk ids that were actually retrieved (all
// retrieved ids if none were cited), then the successful query's
// id and the tables it read. Duplicates dropped, order kept.
//
// Confidence: the generator's own figure when it gives one,
// otherwise 0.1 + 0.4 (no stage errors) + 0.3 (no query repair)
// + 0.3 (chunks retrieved), capped at 1. An exhausted query loop
// forces 0.0.

use std::time::Duration;

use crate::agent::normalizer::{extract_fields, ExtractedFields, FieldKind, FieldSpec};
use crate::agent::prompts;
use crate::domain::error::StageError;
use crate::domain::query::{ExecutionResult, RowSet};
use crate::domain::state::{FinalAnswer, QuestionState, Stage};
use crate::domain::traits::TextGenerator;

const ANSWER_FIELDS: [FieldSpec; 4] = [
    FieldSpec::new("final_answer", FieldKind::Text),
    FieldSpec::new("explanation", FieldKind::Text),
    FieldSpec::new("confidence", FieldKind::Confidence),
    FieldSpec::new("citations", FieldKind::List),
];

/// Compose the final answer. Errors met along the way are returned
/// for the caller to log; they never prevent an answer.
pub fn synthesize(
    generator: &dyn TextGenerator,
    timeout:   Duration,
    state:     &QuestionState,
) -> (FinalAnswer, Vec<StageError>) {
    let chunks = state.retrieved();
    let rows   = state.execution().and_then(ExecutionResult::rows);

    if chunks.is_empty() && rows.is_none() {
        let why = if state.query_exhausted() {
            format!(
                "The query failed after {} attempt(s) and no documents were retrieved.",
                state.attempts().len()
            )
        } else {
            "No relevant documents were retrieved and no query was run.".to_string()
        };
        return (FinalAnswer::insufficient(why), Vec::new());
    }

    let query = match state.execution() {
        Some(ExecutionResult::Success { query, rows, .. }) => Some((query.as_str(), rows)),
        _ => None,
    };
    let prompt = prompts::synthesize_prompt(state.question(), state.route(), chunks, state.plan(), query);

    let mut errors = Vec::new();
    let fields = match generator.generate(&prompt, timeout) {
        Ok(raw) => {
            let fields = extract_fields(&raw, &ANSWER_FIELDS);
            if !fields.defaulted().is_empty() {
                errors.push(StageError::FieldExtractionFailure {
                    stage:  Stage::Synthesize,
                    fields: fields.defaulted().iter().map(|f| f.to_string()).collect(),
                });
            }
            Some(fields)
        }
        Err(e) => {
            errors.push(StageError::from_generation(Stage::Synthesize, &e, StageError::SynthesisFailure));
            None
        }
    };

    let text = fields
        .as_ref()
        .map(|f| f.text("final_answer"))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| best_effort_text(state, rows));

    let explanation = fields
        .as_ref()
        .map(|f| f.text("explanation"))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| default_explanation(state, rows.is_some(), fields.is_some()));

    let citations  = citations(state, fields.as_ref());
    let confidence = confidence(state, fields.as_ref(), errors.is_empty());

    (FinalAnswer::new(text, confidence, explanation, citations), errors)
}

fn citations(state: &QuestionState, fields: Option<&ExtractedFields>) -> Vec<String> {
    let retrieved: Vec<&str> = state.retrieved().iter().map(|c| c.id()).collect();
    let cited: Vec<&str> = fields
        .map(|f| f.list("citations"))
        .unwrap_or_default()
        .iter()
        .map(|c| c.trim())
        .filter(|c| retrieved.contains(c))
        .collect();

    let mut out: Vec<String> = Vec::new();
    let mut push = |id: &str| {
        if !id.is_empty() && !out.iter().any(|o| o == id) {
            out.push(id.to_string());
        }
    };

    if state.route().needs_retrieval() {
        let docs = if cited.is_empty() { &retrieved } else { &cited };
        docs.iter().for_each(|id| push(*id));
    }

    if let Some(ExecutionResult::Success { attempt, rows, .. }) = state.execution() {
        if let Some(a) = state.attempts().get(*attempt as usize) {
            push(&a.citation_id());
        }
        rows.tables_used.iter().for_each(|t| push(t.as_str()));
    }
    out
}

fn confidence(state: &QuestionState, fields: Option<&ExtractedFields>, synthesis_ok: bool) -> f64 {
    if state.query_exhausted() {
        return 0.0;
    }
    if let Some(f) = fields.filter(|f| f.found("confidence")) {
        return f.number("confidence");
    }

    let mut score: f64 = 0.1;
    if state.errors().is_empty() && synthesis_ok {
        score += 0.4;
    }
    if state.attempts().len() <= 1 {
        score += 0.3;
    }
    if !state.retrieved().is_empty() {
        score += 0.3;
    }
    score.min(1.0)
}

/// Answer text built without the generator.
fn best_effort_text(state: &QuestionState, rows: Option<&RowSet>) -> String {
    if let Some(rows) = rows {
        return match (rows.rows.first(), rows.columns.len()) {
            (None, _) => "The query returned no rows.".to_string(),
            (Some(row), 1) if rows.len() == 1 => row.first().map(cell).unwrap_or_default(),
            (Some(row), _) => {
                let first: Vec<String> = rows
                    .columns
                    .iter()
                    .zip(row)
                    .map(|(c, v)| format!("{c}={}", cell(v)))
                    .collect();
                format!("{} row(s); first: {}", rows.len(), first.join(", "))
            }
        };
    }
    match state.retrieved().first() {
        Some(top) => top.chunk.text.clone(),
        None => "Insufficient information to answer this question.".to_string(),
    }
}

fn default_explanation(state: &QuestionState, has_rows: bool, generated: bool) -> String {
    let basis = match (has_rows, state.retrieved().len()) {
        (true, 0) => "the query result".to_string(),
        (true, n) => format!("the query result and {n} retrieved chunk(s)"),
        (false, n) => format!("{n} retrieved chunk(s)"),
    };
    if generated {
        format!("Answer based on {basis}.")
    } else {
        format!("Answer generation failed; best-effort answer taken from {basis}.")
    }
}

fn cell(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

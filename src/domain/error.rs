// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Collaborator errors (GenerationError, ExecutionError) are what
// the generation backend and the SQL executor return.
// StageError is what the pipeline records in a question's error
// log. None of these abort a question: every StageError has a
// local recovery (fallback route, empty plan, repair loop,
// default field values). Only run-level failures such as an
// unreadable corpus are fatal, and those travel as anyhow errors
// in Layers 1 and 2.

use std::time::Duration;

use thiserror::Error;

use crate::domain::state::Stage;

/// Failure of one call to the text-generation backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("generation transport error: {0}")]
    Transport(String),

    #[error("generation backend returned an empty response")]
    EmptyResponse,
}

/// Failure of one call to the structured-query executor.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("empty query text")]
    EmptyQuery,

    #[error("only read-only SELECT/WITH queries are allowed: {0}")]
    NotReadOnly(String),

    #[error("{0}")]
    Sqlite(String),
}

impl ExecutionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutionError::Timeout(_))
    }
}

/// A recovered failure inside one pipeline stage.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StageError {
    #[error("classification failed, defaulting to hybrid: {0}")]
    ClassificationFailure(String),

    #[error("planning output could not be parsed: {0}")]
    PlanningParseFailure(String),

    #[error("query generation failed on attempt {attempt}: {reason}")]
    QueryGenerationFailure { attempt: u32, reason: String },

    #[error("query execution failed on attempt {attempt}: {reason}")]
    QueryExecutionFailure { attempt: u32, reason: String },

    #[error("{stage} output missing fields {fields:?}, defaults used")]
    FieldExtractionFailure { stage: Stage, fields: Vec<String> },

    #[error("{stage} call timed out")]
    TransportTimeout { stage: Stage },

    #[error("answer synthesis failed: {0}")]
    SynthesisFailure(String),

    #[error("run cancelled before {0}")]
    Cancelled(Stage),
}

impl StageError {
    /// Map a generation failure to the stage taxonomy.
    /// Timeouts are reported as TransportTimeout for every stage;
    /// other failures go through `other`.
    pub fn from_generation(
        stage: Stage,
        err:   &GenerationError,
        other: impl FnOnce(String) -> StageError,
    ) -> StageError {
        match err {
            GenerationError::Timeout(_) => StageError::TransportTimeout { stage },
            e => other(e.to_string()),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_maps_to_transport_timeout() {
        let err = GenerationError::Timeout(Duration::from_secs(1));
        let mapped = StageError::from_generation(Stage::Route, &err, StageError::ClassificationFailure);
        assert_eq!(mapped, StageError::TransportTimeout { stage: Stage::Route });
    }

    #[test]
    fn test_transport_error_uses_fallback_variant() {
        let err = GenerationError::Transport("connection refused".into());
        let mapped = StageError::from_generation(Stage::Plan, &err, StageError::PlanningParseFailure);
        assert!(matches!(mapped, StageError::PlanningParseFailure(msg) if msg.contains("refused")));
    }
}

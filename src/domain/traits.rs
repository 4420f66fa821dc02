// ============================================================
// Layer 3 — Core Traits (Collaborator Abstractions)
// ============================================================
// The pipeline only ever sees these traits. Concrete
// implementations live in Layer 4 (MarkdownLoader) and Layer 6
// (OllamaClient, SqliteStore); tests substitute scripted fakes.
//
// TextGenerator and QueryExecutor are shared by every worker of
// the batch pool, hence the Send + Sync bounds.

use std::time::Duration;

use anyhow::Result;

use crate::domain::chunk::Document;
use crate::domain::error::{ExecutionError, GenerationError};
use crate::domain::query::RowSet;
use crate::domain::question::Question;
use crate::domain::schema::SchemaSnapshot;
use crate::domain::state::AnsweredQuestion;

// ─── DocumentSource ───────────────────────────────────────────────────────────
/// Any component that can load the document corpus.
/// Consumed once, before the chunk index is built.
pub trait DocumentSource {
    /// Load all documents, in a stable order.
    fn load_all(&self) -> Result<Vec<Document>>;
}

// ─── TextGenerator ────────────────────────────────────────────────────────────
/// Turns a prompt into text under a per-call timeout.
///
/// Called at most once per stage invocation: retries are made by
/// the pipeline (the repair loop), never by the transport.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, GenerationError>;
}

// ─── QueryExecutor ────────────────────────────────────────────────────────────
/// Executes read-only query text against the structured store.
pub trait QueryExecutor: Send + Sync {
    fn execute(&self, query: &str) -> Result<RowSet, ExecutionError>;
}

// ─── SchemaSource ─────────────────────────────────────────────────────────────
/// Describes the tables/columns/keys of the structured store.
/// A failure here is fatal for the run.
pub trait SchemaSource {
    fn schema_snapshot(&self) -> Result<SchemaSnapshot>;
}

// ─── QuestionAnswerer ─────────────────────────────────────────────────────────
/// Any component that turns a question into exactly one output record.
///
/// Implementations:
///   - Orchestrator → the full routing/retrieval/SQL pipeline
pub trait QuestionAnswerer {
    /// Never fails: every failure path degrades to a low-confidence record.
    fn answer(&self, question: &Question) -> AnsweredQuestion;
}

// ============================================================
// Layer 5 — Question-Answering Pipeline
// ============================================================
// The stages that turn one Question into one FinalAnswer, and
// the Orchestrator that drives them over a QuestionState.
//
// Every stage that talks to the generator goes through the
// Output Normalizer, so malformed output only ever degrades a
// field to its default. Nothing in this layer returns an error
// that ends a question.

/// Drives the per-question state machine
pub mod orchestrator;

/// Field extraction from free-form generator output
pub mod normalizer;

/// Entity/constraint extraction for query generation
pub mod planner;

/// Prompt text for every generator call
pub mod prompts;

/// Bounded generate → execute → repair loop
pub mod query_loop;

/// Top-k chunk retrieval
pub mod retriever;

/// Route classification with hybrid fallback
pub mod router;

/// Final answer composition
pub mod synthesizer;

// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain structs, enums and traits that describe what the system
// works with: questions, corpus chunks, the per-question state
// record, and the collaborators the pipeline talks to.
//
// Rules for this layer:
//   - NO HTTP or SQLite types
//   - NO file I/O
//   - Only data, invariants and traits
//
// Everything the agent layer (Layer 5) passes between stages
// is defined here so stages can be tested with fake collaborators.

/// Loaded documents, corpus chunks and retrieval hits
pub mod chunk;

/// Typed failures at collaborator boundaries and inside stages
pub mod error;

/// Batch input question and the output record written per question
pub mod question;

/// Query attempts, row sets and the terminal execution outcome
pub mod query;

/// Table/column/key description of the structured store
pub mod schema;

/// Route decision, planning context, final answer and QuestionState
pub mod state;

/// Collaborator abstractions implemented in Layers 4 and 6
pub mod traits;

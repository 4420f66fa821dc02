// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer wires the other layers together to accomplish a
// specific goal (answering a batch file or a single question).
//
// Rules for this layer:
//   - No ranking, prompting or parsing here (Layers 4 and 5)
//   - No printing here (that's Layer 1)
//   - No direct HTTP or database access (that's Layer 6)
//   - Only workflow coordination
//
// Fatal errors (unreadable corpus, unavailable schema, bad batch
// file) surface here as anyhow errors; per-question failures
// never do.

// Builds the shared pipeline from configuration
pub mod bootstrap;

// The batch question-answering workflow
pub mod batch_use_case;

// The single-question workflow
pub mod ask_use_case;

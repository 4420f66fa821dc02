// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Concrete collaborators and cross-cutting concerns that do not
// belong to any business layer:
//
//   llm_client.rs     — Text generation over HTTP
//                       Implements TextGenerator against an
//                       Ollama server's /api/generate endpoint,
//                       with a per-call timeout.
//
//   sqlite_store.rs   — Structured store
//                       Implements QueryExecutor (read-only,
//                       interruptible) and SchemaSource over a
//                       SQLite database file.
//
//   results_writer.rs — Batch output
//                       Appends one JSON line per answered
//                       question and flushes it immediately.
//
//   config.rs         — Run configuration
//                       CLI/env overrides over an optional TOML
//                       file over built-in defaults.
//
//   cancel.rs         — Ctrl-C handling
//                       A shared flag polled at stage boundaries.

/// Ctrl-C cancellation flag
pub mod cancel;

/// TOML + CLI configuration resolution
pub mod config;

/// Ollama HTTP text generator
pub mod llm_client;

/// JSONL output writer
pub mod results_writer;

/// SQLite executor and schema snapshot
pub mod sqlite_store;

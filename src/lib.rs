// ============================================================
// hybrid-qa — library root
// ============================================================
// Layers, outermost first:
//
//   cli          (1) argument parsing, printing
//   application  (2) use cases: batch, ask, bootstrap
//   domain       (3) types, invariants, collaborator traits
//   data         (4) corpus loading, chunking, BM25 index, batch input
//   agent        (5) routing, retrieval, planning, query repair,
//                    normalisation, synthesis, orchestration
//   infra        (6) Ollama client, SQLite store, output, config
//
// The binary in main.rs only initialises logging and runs the CLI.

pub mod agent;
pub mod application;
pub mod cli;
pub mod data;
pub mod domain;
pub mod infra;

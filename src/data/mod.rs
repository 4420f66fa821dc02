// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything between files on disk and the read-only chunk index:
//
//   docs/*.md
//       │
//       ▼
//   MarkdownLoader    → reads files in sorted order
//       │
//       ▼
//   Preprocessor      → cleans text, splits paragraphs, tokenises
//       │
//       ▼
//   Chunker           → one chunk per paragraph (windowed if long)
//       │
//       ▼
//   ChunkIndex        → BM25 statistics, built once, ranked per question
//
// BatchReader sits alongside: it turns the JSONL batch file into
// Questions.

/// Reads the JSONL batch file into Questions
pub mod batch;

/// Splits documents into id-tagged chunks
pub mod chunker;

/// BM25 chunk index and ranker
pub mod index;

/// Loads .md files from the corpus directory
pub mod loader;

/// Cleans raw text and tokenises it
pub mod preprocessor;

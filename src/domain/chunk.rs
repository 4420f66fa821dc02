// ============================================================
// Layer 3 — Document, Chunk and RetrievedChunk
// ============================================================
// A Document is one file of the corpus as loaded from disk.
// A Chunk is the unit the ranker scores: one paragraph (or one
// window of a long paragraph) with its token sequence.
// Chunks are built once at startup and shared read-only, so
// retrieval hits hold an Arc to the chunk instead of a copy.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A raw document loaded from the corpus directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// The filename, kept so chunk ids can be traced back to a file
    pub source: String,

    /// The full text of the document before cleaning
    pub text: String,
}

impl Document {
    /// Create a new Document with a source name and text content.
    ///
    /// Example:
    ///   let doc = Document::new("product_policy.md", "Returns ...");
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text:   text.into(),
        }
    }

    /// The filename without its extension, used as the chunk id prefix.
    pub fn stem(&self) -> &str {
        match self.source.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.source,
        }
    }
}

/// An immutable, indexed unit of corpus text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier: `<file-stem>::chunk<i>`
    pub id: String,

    /// Source document tag (the filename)
    pub source: String,

    /// Normalised tokens used for ranking
    pub tokens: Vec<String>,

    /// The cleaned chunk text, quoted into prompts
    pub text: String,
}

impl Chunk {
    pub fn new(
        id:     impl Into<String>,
        source: impl Into<String>,
        tokens: Vec<String>,
        text:   impl Into<String>,
    ) -> Self {
        Self {
            id:     id.into(),
            source: source.into(),
            tokens,
            text:   text.into(),
        }
    }

    /// Number of tokens, the |chunk| term of the BM25 length norm
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// A chunk scored against one question.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: Arc<Chunk>,

    /// BM25 relevance score, always > 0 for a returned hit
    pub score: f64,

    /// 1-based position in the ranking (1 = most relevant)
    pub rank: usize,
}

impl RetrievedChunk {
    pub fn id(&self) -> &str {
        &self.chunk.id
    }
}

// ============================================================
// Layer 5 — Retriever
// ============================================================
// Tokenises the question the same way chunks were tokenised and
// asks the index for the top-k hits. No generator call.

use crate::data::index::ChunkIndex;
use crate::data::preprocessor::tokenize;
use crate::domain::chunk::RetrievedChunk;

pub struct Retriever<'a> {
    index: &'a ChunkIndex,
    top_k: usize,
}

impl<'a> Retriever<'a> {
    pub fn new(index: &'a ChunkIndex, top_k: usize) -> Self {
        Self { index, top_k }
    }

    /// Up to `top_k` chunks, most relevant first, ranks 1-based.
    pub fn retrieve(&self, question: &str) -> Vec<RetrievedChunk> {
        let tokens = tokenize(question);
        let hits: Vec<RetrievedChunk> = self
            .index
            .rank(&tokens, self.top_k)
            .into_iter()
            .enumerate()
            .filter_map(|(i, (id, score))| {
                self.index.get(&id).map(|chunk| RetrievedChunk {
                    chunk: chunk.clone(),
                    score,
                    rank: i + 1,
                })
            })
            .collect();

        tracing::debug!(
            hits = hits.len(),
            top = hits.first().map(|h| h.id()).unwrap_or("-"),
            "retrieved"
        );
        hits
    }
}

// ============================================================
// Layer 4 — Chunk Index and BM25 Ranker
// ============================================================
// Built once from the whole corpus before any question is
// processed, then only read. Shared across workers behind an Arc.
//
// score(chunk, query) = Σ over query terms t of
//     IDF(t) · tf(t,chunk) · (k1 + 1)
//     ─────────────────────────────────────────────────────
//     tf(t,chunk) + k1 · (1 − b + b · |chunk| / avgChunkLen)
//
// IDF(t) = ln(1 + (N − df(t) + 0.5) / (df(t) + 0.5))
//
// This IDF variant is never negative, so a term present in most
// chunks still counts a little instead of pushing scores down.
// Terms absent from the corpus have no IDF entry and add nothing.
//
// Ordering: descending score, then ascending chunk id. Chunks
// with score 0 (no shared term) are never returned.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::chunk::Chunk;

/// BM25 tuning constants.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation
    pub k1: f64,
    /// Length normalisation strength, 0 = none, 1 = full
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

pub struct ChunkIndex {
    chunks:      Vec<Arc<Chunk>>,
    positions:   HashMap<String, usize>,
    term_freqs:  Vec<HashMap<String, u32>>,
    idf:         HashMap<String, f64>,
    avg_len:     f64,
    params:      Bm25Params,
}

impl ChunkIndex {
    /// Build the index. Pure and deterministic.
    pub fn build(chunks: Vec<Chunk>, params: Bm25Params) -> Self {
        let n = chunks.len();

        let mut term_freqs = Vec::with_capacity(n);
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;

        for chunk in &chunks {
            let mut tf: HashMap<String, u32> = HashMap::new();
            for token in &chunk.tokens {
                *tf.entry(token.clone()).or_insert(0) += 1;
            }
            for term in tf.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            total_len += chunk.len();
            term_freqs.push(tf);
        }

        let idf = doc_freq
            .into_iter()
            .map(|(term, df)| {
                let df = df as f64;
                let weight = (1.0 + (n as f64 - df + 0.5) / (df + 0.5)).ln();
                (term, weight)
            })
            .collect();

        let avg_len = if n == 0 { 0.0 } else { total_len as f64 / n as f64 };

        let positions = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (c.id.clone(), i))
            .collect();

        tracing::info!("Built chunk index: {} chunks, avg length {:.1} tokens", n, avg_len);

        Self {
            chunks: chunks.into_iter().map(Arc::new).collect(),
            positions,
            term_freqs,
            idf,
            avg_len,
            params,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Chunk>> {
        self.positions.get(id).map(|&i| &self.chunks[i])
    }

    /// Top `k` (chunk id, score) pairs for the query tokens.
    /// Empty corpus or empty query → empty result.
    pub fn rank(&self, query_tokens: &[String], k: usize) -> Vec<(String, f64)> {
        if self.chunks.is_empty() || query_tokens.is_empty() || k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(&str, f64)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| (chunk.id.as_str(), self.score(i, query_tokens)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(b.0))
        });

        scored
            .into_iter()
            .take(k)
            .map(|(id, score)| (id.to_string(), score))
            .collect()
    }

    fn score(&self, position: usize, query_tokens: &[String]) -> f64 {
        let tf_map = &self.term_freqs[position];
        let len    = self.chunks[position].len() as f64;
        let Bm25Params { k1, b } = self.params;

        let norm = if self.avg_len > 0.0 {
            k1 * (1.0 - b + b * len / self.avg_len)
        } else {
            k1
        };

        query_tokens
            .iter()
            .filter_map(|term| {
                let tf  = *tf_map.get(term)? as f64;
                let idf = *self.idf.get(term)?;
                Some(idf * tf * (k1 + 1.0) / (tf + norm))
            })
            .sum()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::preprocessor::tokenize;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk::new(id, "test.md", tokenize(text), text)
    }

    fn q(text: &str) -> Vec<String> {
        tokenize(text)
    }

    #[test]
    fn test_relevant_chunk_ranks_first() {
        let index = ChunkIndex::build(
            vec![
                chunk("policy::chunk0", "Perishables: 3-7 days return window"),
                chunk("policy::chunk1", "Beverages unopened: 14 days; opened: no returns"),
                chunk("calendar::chunk0", "Summer Beverages 1997 campaign dates"),
            ],
            Bm25Params::default(),
        );
        let hits = index.rank(&q("unopened Beverages"), 6);
        assert_eq!(hits[0].0, "policy::chunk1");
        assert!(hits.iter().all(|(_, s)| *s > 0.0));
    }

    #[test]
    fn test_ties_break_by_ascending_id_and_repeat_identically() {
        let index = ChunkIndex::build(
            vec![
                chunk("b::chunk0", "same text here"),
                chunk("a::chunk0", "same text here"),
                chunk("c::chunk0", "same text here"),
            ],
            Bm25Params::default(),
        );
        let first = index.rank(&q("text"), 6);
        let ids: Vec<&str> = first.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a::chunk0", "b::chunk0", "c::chunk0"]);
        for _ in 0..5 {
            assert_eq!(index.rank(&q("text"), 6), first);
        }
    }

    #[test]
    fn test_respects_k() {
        let chunks = (0..10).map(|i| chunk(&format!("d::chunk{i}"), "orders")).collect();
        let index  = ChunkIndex::build(chunks, Bm25Params::default());
        assert_eq!(index.rank(&q("orders"), 6).len(), 6);
    }

    #[test]
    fn test_empty_corpus_or_query_returns_empty() {
        let empty = ChunkIndex::build(Vec::new(), Bm25Params::default());
        assert!(empty.rank(&q("anything"), 6).is_empty());

        let index = ChunkIndex::build(vec![chunk("a::chunk0", "text")], Bm25Params::default());
        assert!(index.rank(&[], 6).is_empty());
    }

    #[test]
    fn test_unseen_terms_contribute_nothing() {
        let index = ChunkIndex::build(
            vec![chunk("a::chunk0", "beverages"), chunk("b::chunk0", "condiments")],
            Bm25Params::default(),
        );
        let with   = index.rank(&q("beverages"), 6);
        let padded  = index.rank(&q("beverages zebra quasar"), 6);
        assert_eq!(with, padded);
        assert!(index.rank(&q("zebra"), 6).is_empty());
    }

    #[test]
    fn test_shorter_chunk_wins_with_equal_tf() {
        let index = ChunkIndex::build(
            vec![
                chunk("long::chunk0", "beverages and many other unrelated filler words appear here"),
                chunk("short::chunk0", "beverages policy"),
            ],
            Bm25Params::default(),
        );
        let hits = index.rank(&q("beverages"), 2);
        assert_eq!(hits[0].0, "short::chunk0");
    }

    #[test]
    fn test_get_by_id() {
        let index = ChunkIndex::build(vec![chunk("a::chunk0", "text")], Bm25Params::default());
        assert_eq!(index.get("a::chunk0").map(|c| c.text.as_str()), Some("text"));
        assert!(index.get("missing").is_none());
    }
}

// ============================================================
// Layer 4 — Paragraph Chunker
// ============================================================
// Turns one cleaned Document into Chunks.
//
// Each paragraph becomes one chunk. Paragraphs longer than
// `max_words` are split into overlapping word windows so a long
// policy section does not dominate BM25 length normalisation:
//
//   max_words=5, overlap=2:
//     "A B C D E F G H I J"
//     → "A B C D E" | "D E F G H" | "G H I J"
//
// The stride between windows is max_words - overlap.
//
// Chunk ids are `<file-stem>::chunk<i>`, numbered 0.. per document
// in emission order.

use crate::data::preprocessor::{tokenize, Preprocessor};
use crate::domain::chunk::{Chunk, Document};

pub struct Chunker {
    /// Longest paragraph kept as a single chunk
    max_words: usize,
    /// Words shared between adjacent windows of a long paragraph
    overlap: usize,
    preprocessor: Preprocessor,
}

impl Chunker {
    /// # Panics
    /// Panics if overlap >= max_words, since the window stride would be 0.
    pub fn new(max_words: usize, overlap: usize) -> Self {
        assert!(
            overlap < max_words,
            "overlap ({}) must be less than max_words ({})",
            overlap,
            max_words
        );
        Self { max_words, overlap, preprocessor: Preprocessor::new() }
    }

    /// Clean, split and tokenise one document.
    pub fn chunk(&self, doc: &Document) -> Vec<Chunk> {
        let cleaned = self.preprocessor.clean(&doc.text);
        let stem    = doc.stem();

        self.preprocessor
            .paragraphs(&cleaned)
            .into_iter()
            .flat_map(|para| self.windows(para))
            .enumerate()
            .map(|(i, text)| {
                let tokens = tokenize(&text);
                Chunk::new(format!("{stem}::chunk{i}"), doc.source.clone(), tokens, text)
            })
            .collect()
    }

    pub fn chunk_all(&self, docs: &[Document]) -> Vec<Chunk> {
        docs.iter().flat_map(|d| self.chunk(d)).collect()
    }

    /// One paragraph, or overlapping windows of it if it is too long.
    fn windows(&self, paragraph: &str) -> Vec<String> {
        let words: Vec<&str> = paragraph.split_whitespace().collect();
        if words.len() <= self.max_words {
            return vec![paragraph.to_string()];
        }

        let stride = self.max_words - self.overlap;
        let mut out   = Vec::new();
        let mut start = 0usize;

        loop {
            let end = (start + self.max_words).min(words.len());
            out.push(words[start..end].join(" "));
            if end == words.len() {
                break;
            }
            start += stride;
        }

        out
    }
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(200, 50)
    }
}

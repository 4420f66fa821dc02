// ============================================================
// Layer 4 — Text Preprocessor and Tokenizer
// ============================================================
// Cleans raw corpus text before chunking, and turns text into
// the token sequence the BM25 ranker works on.
//
// Cleaning steps (applied in order):
//   1. Replace Unicode whitespace variants with plain space
//   2. Replace \r with \n for consistent line endings
//   3. Remove invisible control characters
//   4. Collapse multiple spaces into one per line
//   5. Trim leading/trailing whitespace per line
//   6. Collapse runs of blank lines to a single blank line
//
// Step 6 keeps exactly one blank line between paragraphs, which
// is what the chunker splits on.
//
// Tokenisation is deliberately simple and must be identical for
// chunks and queries: lowercase, split on whitespace, trim edge
// punctuation ("Beverages?" → "beverages", "$500" → "500").

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Clean a raw text string for chunking.
    pub fn clean(&self, text: &str) -> String {

        // ── Step 1: Normalise individual characters ───────────────────────────
        let step1: String = text
            .chars()
            .map(|c| match c {
                '\t' => ' ',
                '\u{00A0}' => ' ',
                '\u{200B}' => ' ',
                '\u{FEFF}' => ' ',
                '\r' => '\n',
                c if c.is_control() && c != '\n' => ' ',
                c => c,
            })
            .collect();

        // ── Step 2: Clean each line individually ─────────────────────────────
        let step2: String = step1
            .lines()
            .map(|line| {
                let mut out        = String::with_capacity(line.len());
                let mut last_space = false;

                for c in line.chars() {
                    if c == ' ' {
                        if !last_space {
                            out.push(' ');
                        }
                        last_space = true;
                    } else {
                        out.push(c);
                        last_space = false;
                    }
                }

                out.trim().to_string()
            })
            .collect::<Vec<_>>()
            .join("\n");

        // ── Step 3: Collapse excessive blank lines ────────────────────────────
        let mut result        = String::with_capacity(step2.len());
        let mut newline_count = 0usize;

        for c in step2.chars() {
            if c == '\n' {
                newline_count += 1;
                if newline_count <= 2 {
                    result.push(c);
                }
            } else {
                newline_count = 0;
                result.push(c);
            }
        }

        result.trim().to_string()
    }

    /// Split cleaned text into paragraphs (blocks separated by a blank line).
    pub fn paragraphs<'a>(&self, cleaned: &'a str) -> Vec<&'a str> {
        cleaned
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect()
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercased, punctuation-trimmed whitespace tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

// ============================================================
// Layer 3 — Question and OutputRecord
// ============================================================
// A Question is the immutable batch input. An OutputRecord is
// the one line written back per question, whatever happened
// while answering it.

use serde::{Deserialize, Serialize};

/// Format hint used when the input record carries none
pub const DEFAULT_FORMAT_HINT: &str = "text";

/// One question from the batch file. Never mutated after intake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,

    /// The raw natural-language question
    pub text: String,

    /// Expected answer shape ("text", "int", "float", ...), passed to synthesis
    pub format_hint: String,
}

impl Question {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id:          id.into(),
            text:        text.into(),
            format_hint: DEFAULT_FORMAT_HINT.to_string(),
        }
    }

    pub fn with_format_hint(mut self, hint: impl Into<String>) -> Self {
        self.format_hint = hint.into();
        self
    }
}

/// The batch output contract, one JSON line per question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub id:           String,
    pub final_answer: String,
    pub sql:          Option<String>,
    /// Always within [0, 1]
    pub confidence:   f64,
    pub explanation:  String,
    pub citations:    Vec<String>,
}

impl OutputRecord {
    /// Record for a question that never produced a FinalAnswer
    /// (cancelled before it started, or the worker panicked).
    pub fn unanswered(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id:           id.into(),
            final_answer: "Insufficient information to answer this question.".to_string(),
            sql:          None,
            confidence:   0.0,
            explanation:  reason.into(),
            citations:    Vec::new(),
        }
    }
}

// ============================================================
// Layer 4 — Batch Reader
// ============================================================
// Reads the JSONL batch file: one `{ "id", "question",
// "format_hint"? }` object per line.
//
// Blank lines are skipped. Lines that are not UTF-8, not a JSON
// object, or that have no usable question, are skipped with a
// warning: there is nothing to answer. A missing id becomes "unknown_id".

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::question::{Question, DEFAULT_FORMAT_HINT};

/// Raw input line; every field optional so one bad line never fails the batch.
#[derive(Debug, Deserialize)]
struct InputRecord {
    id:          Option<serde_json::Value>,
    question:    Option<String>,
    format_hint: Option<String>,
}

pub struct BatchReader;

impl BatchReader {
    pub fn read(path: &Path) -> Result<Vec<Question>> {
        let file = File::open(path)
            .with_context(|| format!("Cannot open batch file '{}'", path.display()))?;

        let mut questions = Vec::new();
        for (line_no, bytes) in BufReader::new(file).split(b'\n').enumerate() {
            let bytes = bytes.with_context(|| format!("Cannot read '{}'", path.display()))?;
            let line = match String::from_utf8(bytes) {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Skipping line {}: not valid UTF-8 ({})", line_no + 1, e.utf8_error());
                    continue;
                }
            };
            if let Some(q) = parse_line(&line, line_no + 1) {
                questions.push(q);
            }
        }

        tracing::info!("Loaded {} questions from '{}'", questions.len(), path.display());
        Ok(questions)
    }
}

fn parse_line(line: &str, line_no: usize) -> Option<Question> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let record: InputRecord = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("Skipping line {line_no}: invalid JSON object ({e})");
            return None;
        }
    };

    let id = match record.id {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s,
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => "unknown_id".to_string(),
    };

    let text = match record.question {
        Some(q) if !q.trim().is_empty() => q,
        _ => {
            tracing::warn!("Skipping line {line_no} (id {id}): missing 'question'");
            return None;
        }
    };

    let hint = record
        .format_hint
        .filter(|h| !h.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FORMAT_HINT.to_string());

    Some(Question::new(id, text).with_format_hint(hint))
}

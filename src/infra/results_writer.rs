// ============================================================
// Layer 6 — Results Writer
// ============================================================
// Streams output records to a JSONL file, one line per question.
//
// Each record is written and flushed as soon as its question
// completes, so an interrupted run keeps every answer produced
// so far. Workers share one writer; the Mutex serialises whole
// lines so output from two questions never interleaves.
//
// Line order is completion order, not input order. Consumers
// match records to questions by `id`.
//
// Example output line:
//   {"id":"q1","final_answer":"14 days","sql":null,"confidence":0.8,
//    "explanation":"...","citations":["product_policy::chunk1"]}

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};

use crate::domain::question::OutputRecord;

pub struct ResultsWriter {
    /// Full path to the JSONL file
    path: PathBuf,
    out:  Mutex<BufWriter<File>>,
}

impl ResultsWriter {
    /// Create (or truncate) the output file, creating parent
    /// directories as needed.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create output directory '{}'", dir.display()))?;
        }

        let file = File::create(&path)
            .with_context(|| format!("Cannot create output file '{}'", path.display()))?;
        tracing::debug!("Writing results to '{}'", path.display());

        Ok(Self { path, out: Mutex::new(BufWriter::new(file)) })
    }

    /// Append one record as a JSON line and flush it to disk.
    pub fn append(&self, record: &OutputRecord) -> Result<()> {
        let line = serde_json::to_string(record)
            .with_context(|| format!("Cannot serialise record '{}'", record.id))?;

        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow!("results writer lock poisoned"))?;
        writeln!(out, "{line}")
            .and_then(|_| out.flush())
            .with_context(|| format!("Cannot write to '{}'", self.path.display()))?;

        tracing::debug!(id = %record.id, "record written");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

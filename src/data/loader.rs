// ============================================================
// Layer 4 — Document Loader
// ============================================================
// Loads the markdown corpus (policies, calendars, KPI
// definitions...) from a directory.
//
// Files are read in sorted filename order so chunk ids and
// ranking tie-breaks are identical from run to run.
// A missing or unreadable corpus directory is fatal: answering
// from an empty corpus would silently degrade every question.

use std::{fs, path::{Path, PathBuf}};

use anyhow::{bail, Context, Result};

use crate::domain::chunk::Document;
use crate::domain::traits::DocumentSource;

/// Loads all .md files from a given directory.
pub struct MarkdownLoader {
    dir: PathBuf,
}

impl MarkdownLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl DocumentSource for MarkdownLoader {
    fn load_all(&self) -> Result<Vec<Document>> {
        if !self.dir.is_dir() {
            bail!("corpus directory '{}' does not exist", self.dir.display());
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read corpus directory '{}'", self.dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("md"))
            .collect();
        paths.sort();

        let mut docs = Vec::with_capacity(paths.len());
        for path in &paths {
            let doc = load_single_markdown(path)?;
            tracing::debug!("Loaded: {} ({} chars)", doc.source, doc.text.len());
            docs.push(doc);
        }

        tracing::info!("Loaded {} documents from '{}'", docs.len(), self.dir.display());
        Ok(docs)
    }
}

fn load_single_markdown(path: &Path) -> Result<Document> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;

    let source = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    Ok(Document::new(source, text))
}

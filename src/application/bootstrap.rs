// ============================================================
// Layer 2 — Bootstrap
// ============================================================
// Builds the shared, read-only pipeline before any question runs:
//
//   Step 1: Load .md documents          (Layer 4 - data)
//   Step 2: Chunk into paragraphs       (Layer 4 - data)
//   Step 3: Build the BM25 index        (Layer 4 - data)
//   Step 4: Open the database, snapshot
//           its schema                  (Layer 6 - infra)
//   Step 5: Connect the generator       (Layer 6 - infra)
//
// Any failure here is fatal for the run: without a corpus or a
// schema no question could be answered as configured.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::agent::orchestrator::Orchestrator;
use crate::data::{chunker::Chunker, index::ChunkIndex, loader::MarkdownLoader};
use crate::domain::traits::{DocumentSource, SchemaSource};
use crate::infra::cancel::CancelFlag;
use crate::infra::config::AppConfig;
use crate::infra::llm_client::OllamaClient;
use crate::infra::sqlite_store::SqliteStore;

pub fn build_orchestrator(config: &AppConfig, cancel: CancelFlag) -> Result<Orchestrator> {
    // Steps 1-3: corpus → chunks → index
    let loader = MarkdownLoader::new(&config.docs_dir);
    let docs = loader
        .load_all()
        .with_context(|| format!("Cannot load corpus from '{}'", config.docs_dir.display()))?;
    let chunks = Chunker::default().chunk_all(&docs);
    tracing::info!("Chunked {} documents into {} chunks", docs.len(), chunks.len());
    let index = ChunkIndex::build(chunks, config.bm25);

    // Step 4: structured store
    let store = SqliteStore::open(&config.db_path, config.query_timeout)?;
    let schema = store
        .schema_snapshot()
        .with_context(|| format!("Schema unavailable for '{}'", config.db_path.display()))?;

    // Step 5: generator
    let generator = OllamaClient::new(config.llm_settings())?;
    tracing::info!(
        "Using model '{}' at {} (timeout {:?})",
        config.model,
        config.base_url,
        config.llm_timeout
    );

    Ok(Orchestrator::new(
        Arc::new(generator),
        Arc::new(store),
        Arc::new(index),
        Arc::new(schema),
        config.pipeline_settings(),
        cancel,
    ))
}

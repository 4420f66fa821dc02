// Shared fixtures for the integration tests: scripted collaborators
// and small on-disk corpora.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hybrid_qa::agent::orchestrator::{Orchestrator, PipelineSettings};
use hybrid_qa::agent::prompts::PromptKind;
use hybrid_qa::data::chunker::Chunker;
use hybrid_qa::data::index::{Bm25Params, ChunkIndex};
use hybrid_qa::data::loader::MarkdownLoader;
use hybrid_qa::domain::error::{ExecutionError, GenerationError};
use hybrid_qa::domain::query::RowSet;
use hybrid_qa::domain::schema::{ColumnSchema, SchemaSnapshot, TableSchema};
use hybrid_qa::domain::traits::{DocumentSource, QueryExecutor, TextGenerator};
use hybrid_qa::infra::cancel::CancelFlag;

// ─── ScriptedGenerator ────────────────────────────────────────────────────────

/// Replies from per-stage queues, keyed on the prompt's task header.
/// An exhausted queue answers with a transport error.
#[derive(Default)]
pub struct ScriptedGenerator {
    replies: Mutex<HashMap<PromptKind, VecDeque<Result<String, GenerationError>>>>,
    prompts: Mutex<Vec<(PromptKind, String)>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, kind: PromptKind, text: &str) -> Self {
        self.push(kind, Ok(text.to_string()))
    }

    pub fn fail(self, kind: PromptKind, err: GenerationError) -> Self {
        self.push(kind, Err(err))
    }

    fn push(self, kind: PromptKind, reply: Result<String, GenerationError>) -> Self {
        self.replies.lock().unwrap().entry(kind).or_default().push_back(reply);
        self
    }

    /// Prompts received for one stage, in call order.
    pub fn prompts(&self, kind: PromptKind) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn calls(&self, kind: PromptKind) -> usize {
        self.prompts(kind).len()
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, prompt: &str, _timeout: Duration) -> Result<String, GenerationError> {
        let kind = PromptKind::of(prompt).expect("every prompt starts with a task header");
        self.prompts.lock().unwrap().push((kind, prompt.to_string()));
        self.replies
            .lock()
            .unwrap()
            .get_mut(&kind)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(GenerationError::Transport(format!("no scripted {kind:?} reply"))))
    }
}

// ─── ScriptedExecutor ─────────────────────────────────────────────────────────

/// Returns queued outcomes in order; an exhausted queue fails every call.
#[derive(Default)]
pub struct ScriptedExecutor {
    outcomes: Mutex<VecDeque<Result<RowSet, ExecutionError>>>,
    queries:  Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(self, rows: RowSet) -> Self {
        self.outcomes.lock().unwrap().push_back(Ok(rows));
        self
    }

    pub fn error(self, msg: &str) -> Self {
        self.outcomes.lock().unwrap().push_back(Err(ExecutionError::Sqlite(msg.to_string())));
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

impl QueryExecutor for ScriptedExecutor {
    fn execute(&self, query: &str) -> Result<RowSet, ExecutionError> {
        self.queries.lock().unwrap().push(query.to_string());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ExecutionError::Sqlite("near \"SELEC\": syntax error".into())))
    }
}

// ─── Fixtures ─────────────────────────────────────────────────────────────────

pub const PRODUCT_POLICY: &str = "# Returns & Policy\n\n\
- Perishables (Produce, Seafood, Dairy): 3-7 days.\n\n\
- Beverages: 14 days for unopened Beverages; opened: no returns.\n\n\
- Non-perishables: 30 days.\n";

pub const MARKETING_CALENDAR: &str = "# Marketing Calendar (1997)\n\n\
## Summer Beverages 1997\n\
- Dates: 1997-06-01 to 1997-06-30\n\
- Notes: Focus on Beverages and Condiments.\n\n\
## Winter Classics 1997\n\
- Dates: 1997-12-01 to 1997-12-31\n\
- Notes: Dairy Products and Confections for holiday gifts.\n";

pub const KPI_DEFINITIONS: &str = "# KPI Definitions\n\n\
## Average Order Value (AOV)\n\
- AOV = SUM(UnitPrice * Quantity * (1 - Discount)) / COUNT(DISTINCT OrderID)\n\n\
## Gross Margin\n\
- GM = SUM((UnitPrice - CostOfGoods) * Quantity * (1 - Discount))\n";

/// Writes the standard corpus to a temp dir and indexes it the way
/// bootstrap does.
pub fn corpus_index() -> ChunkIndex {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("product_policy.md"), PRODUCT_POLICY).unwrap();
    fs::write(dir.path().join("marketing_calendar.md"), MARKETING_CALENDAR).unwrap();
    fs::write(dir.path().join("kpi_definitions.md"), KPI_DEFINITIONS).unwrap();

    let docs   = MarkdownLoader::new(dir.path()).load_all().unwrap();
    let chunks = Chunker::default().chunk_all(&docs);
    ChunkIndex::build(chunks, Bm25Params::default())
}

pub fn schema() -> SchemaSnapshot {
    let col = |name: &str, ty: &str, pk: bool| ColumnSchema {
        name:        name.into(),
        decl_type:   ty.into(),
        primary_key: pk,
    };
    SchemaSnapshot {
        tables: vec![
            TableSchema {
                name:         "Orders".into(),
                columns:      vec![col("OrderID", "INTEGER", true), col("OrderDate", "DATETIME", false)],
                foreign_keys: vec![],
            },
            TableSchema {
                name:         "Order Details".into(),
                columns:      vec![
                    col("OrderID", "INTEGER", true),
                    col("UnitPrice", "NUMERIC", false),
                    col("Quantity", "INTEGER", false),
                ],
                foreign_keys: vec![],
            },
        ],
    }
}

pub fn order_rows() -> RowSet {
    RowSet {
        columns:     vec!["OrderID".into(), "total".into()],
        rows:        vec![
            vec![serde_json::json!(10260), serde_json::json!(1504.65)],
            vec![serde_json::json!(10261), serde_json::json!(536.0)],
        ],
        tables_used: vec!["Orders".into(), "Order Details".into()],
    }
}

pub fn orchestrator(
    generator: &Arc<ScriptedGenerator>,
    executor:  &Arc<ScriptedExecutor>,
    settings:  PipelineSettings,
) -> Orchestrator {
    Orchestrator::new(
        generator.clone(),
        executor.clone(),
        Arc::new(corpus_index()),
        Arc::new(schema()),
        settings,
        CancelFlag::new(),
    )
}

pub fn settings() -> PipelineSettings {
    PipelineSettings {
        top_k:       6,
        max_retries: 2,
        llm_timeout: Duration::from_secs(5),
    }
}

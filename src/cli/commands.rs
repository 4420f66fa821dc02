// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `batch` and `ask`, plus the
// options shared by both.
//
// Every shared option is optional and has a HYBRID_QA_*
// environment variable. Anything left unset falls through to
// the --config TOML file and then to the built-in defaults
// (see infra/config.rs).

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::infra::config::ConfigOverrides;

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Answer every question in a JSONL batch file
    Batch(BatchArgs),

    /// Answer one question and print the record as JSON
    Ask(AskArgs),
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// TOML config file
    #[arg(long, env = "HYBRID_QA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory of .md documents to retrieve from
    #[arg(long, env = "HYBRID_QA_DOCS_DIR")]
    pub docs_dir: Option<PathBuf>,

    /// SQLite database queried by structured questions
    #[arg(long, env = "HYBRID_QA_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Ollama server URL
    #[arg(long, env = "HYBRID_QA_BASE_URL")]
    pub base_url: Option<String>,

    /// Model name as known to the Ollama server
    #[arg(long, env = "HYBRID_QA_MODEL")]
    pub model: Option<String>,

    /// Per-call generation timeout, seconds
    #[arg(long, env = "HYBRID_QA_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Sampling temperature; 0 keeps routing deterministic
    #[arg(long, env = "HYBRID_QA_TEMPERATURE")]
    pub temperature: Option<f64>,

    /// Chunks retrieved per question
    #[arg(long, env = "HYBRID_QA_TOP_K")]
    pub top_k: Option<usize>,

    /// Query repairs after the first attempt (at most 2)
    #[arg(long, env = "HYBRID_QA_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Per-query execution timeout, seconds
    #[arg(long, env = "HYBRID_QA_QUERY_TIMEOUT_SECS")]
    pub query_timeout_secs: Option<u64>,
}

/// Convert CLI options into configuration overrides.
/// The infra layer never sees clap types.
impl From<&CommonArgs> for ConfigOverrides {
    fn from(a: &CommonArgs) -> Self {
        ConfigOverrides {
            base_url:           a.base_url.clone(),
            model:              a.model.clone(),
            timeout_secs:       a.timeout_secs,
            temperature:        a.temperature,
            top_k:              a.top_k,
            max_retries:        a.max_retries,
            workers:            None,
            query_timeout_secs: a.query_timeout_secs,
            docs_dir:           a.docs_dir.clone(),
            db_path:            a.db_path.clone(),
        }
    }
}

/// All arguments for the `batch` command
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Input JSONL: one {"id", "question", "format_hint"?} per line
    #[arg(long)]
    pub batch: PathBuf,

    /// Output JSONL, one record per question
    #[arg(long)]
    pub out: PathBuf,

    /// Questions answered concurrently
    #[arg(long, env = "HYBRID_QA_WORKERS")]
    pub workers: Option<usize>,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// All arguments for the `ask` command
#[derive(Args, Debug)]
pub struct AskArgs {
    /// The natural language question to answer
    #[arg(long)]
    pub question: String,

    /// Expected answer shape, e.g. "int", "float", "list[{...}]"
    #[arg(long, default_value = "text")]
    pub format_hint: String,

    /// Id written into the output record
    #[arg(long, default_value = "cli")]
    pub id: String,

    #[command(flatten)]
    pub common: CommonArgs,
}

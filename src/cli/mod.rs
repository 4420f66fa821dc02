// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `batch` — answers a JSONL file of questions into a JSONL file
//   2. `ask`   — answers one question and prints the record

pub mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use commands::{AskArgs, BatchArgs, Commands, CommonArgs};

use crate::application::ask_use_case::AskUseCase;
use crate::application::batch_use_case::BatchUseCase;
use crate::application::bootstrap::build_orchestrator;
use crate::infra::cancel::CancelFlag;
use crate::infra::config::{AppConfig, ConfigOverrides};

#[derive(Parser, Debug)]
#[command(
    name = "hybrid-qa",
    version,
    about = "Answer questions from markdown documents and a SQLite database with a local LLM."
)]
pub struct Cli {
    /// The subcommand to run (batch or ask)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Batch(args) => run_batch(args),
            Commands::Ask(args)   => run_ask(args),
        }
    }
}

fn resolve_config(common: &CommonArgs, workers: Option<usize>) -> Result<AppConfig> {
    let overrides = ConfigOverrides { workers, ..ConfigOverrides::from(common) };
    AppConfig::resolve(common.config.as_deref(), overrides)
}

/// Handles the `batch` subcommand.
fn run_batch(args: BatchArgs) -> Result<()> {
    let config = resolve_config(&args.common, args.workers)?;
    tracing::info!("Starting batch '{}' → '{}'", args.batch.display(), args.out.display());

    let cancel = CancelFlag::new();
    cancel.install_ctrlc_handler()?;

    let orchestrator = build_orchestrator(&config, cancel.clone())?;
    let summary = BatchUseCase::new(&args.batch, &args.out, config.workers)
        .execute(&orchestrator, &cancel)?;

    println!(
        "Answered {} questions ({} without a route, {} exhausted query loops). Results: {}",
        summary.total,
        summary.unanswered,
        summary.query_exhausted,
        args.out.display()
    );
    if cancel.is_cancelled() {
        println!("Run was interrupted; unstarted questions were recorded as cancelled.");
    }
    Ok(())
}

/// Handles the `ask` subcommand.
fn run_ask(args: AskArgs) -> Result<()> {
    let config = resolve_config(&args.common, None)?;
    let orchestrator = build_orchestrator(&config, CancelFlag::new())?;

    let record = AskUseCase::new(orchestrator).answer(&args.id, &args.question, &args.format_hint);
    let json = serde_json::to_string_pretty(&record).context("Cannot serialise answer")?;
    println!("{json}");
    Ok(())
}

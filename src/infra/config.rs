// ============================================================
// Layer 6 — Configuration
// ============================================================
// Resolves the run configuration from three sources:
//
//   CLI flag / HYBRID_QA_* env var   (clap merges these two)
//       ▼ falls back to
//   TOML file given with --config
//       ▼ falls back to
//   built-in defaults
//
// Example file:
//
//   [llm]
//   base_url     = "http://localhost:11434"
//   model        = "phi3.5:3.8b-mini-instruct-q4_K_M"
//   timeout_secs = 300
//   temperature  = 0.0
//
//   [retrieval]
//   top_k = 6
//   k1    = 1.5
//   b     = 0.75
//
//   [pipeline]
//   max_retries        = 2
//   workers            = 4
//   query_timeout_secs = 30
//
//   [paths]
//   docs_dir = "docs"
//   db_path  = "data/northwind.sqlite"

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::agent::orchestrator::PipelineSettings;
use crate::agent::query_loop::MAX_RETRIES;
use crate::data::index::Bm25Params;
use crate::infra::llm_client::LlmSettings;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "phi3.5:3.8b-mini-instruct-q4_K_M";
pub const DEFAULT_DOCS_DIR: &str = "docs";
pub const DEFAULT_DB_PATH: &str = "data/northwind.sqlite";

// ─── TOML file ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub llm:       LlmSection,
    pub retrieval: RetrievalSection,
    pub pipeline:  PipelineSection,
    pub paths:     PathsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmSection {
    pub base_url:     Option<String>,
    pub model:        Option<String>,
    pub timeout_secs: Option<u64>,
    pub temperature:  Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrievalSection {
    pub top_k: Option<usize>,
    pub k1:    Option<f64>,
    pub b:     Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSection {
    pub max_retries:        Option<u32>,
    pub workers:            Option<usize>,
    pub query_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsSection {
    pub docs_dir: Option<PathBuf>,
    pub db_path:  Option<PathBuf>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file '{}'", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Invalid config file '{}'", path.display()))
    }
}

// ─── CLI overrides ────────────────────────────────────────────────────────────

/// Values given on the command line or through the environment.
/// `None` means "not given", so the file or default applies.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url:           Option<String>,
    pub model:              Option<String>,
    pub timeout_secs:       Option<u64>,
    pub temperature:        Option<f64>,
    pub top_k:              Option<usize>,
    pub max_retries:        Option<u32>,
    pub workers:            Option<usize>,
    pub query_timeout_secs: Option<u64>,
    pub docs_dir:           Option<PathBuf>,
    pub db_path:            Option<PathBuf>,
}

// ─── Resolved configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub base_url:      String,
    pub model:         String,
    pub llm_timeout:   Duration,
    pub temperature:   f64,
    pub top_k:         usize,
    pub bm25:          Bm25Params,
    pub max_retries:   u32,
    pub workers:       usize,
    pub query_timeout: Duration,
    pub docs_dir:      PathBuf,
    pub db_path:       PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url:      DEFAULT_BASE_URL.to_string(),
            model:         DEFAULT_MODEL.to_string(),
            llm_timeout:   Duration::from_secs(300),
            temperature:   0.0,
            top_k:         6,
            bm25:          Bm25Params::default(),
            max_retries:   2,
            workers:       1,
            query_timeout: Duration::from_secs(30),
            docs_dir:      PathBuf::from(DEFAULT_DOCS_DIR),
            db_path:       PathBuf::from(DEFAULT_DB_PATH),
        }
    }
}

impl AppConfig {
    /// Merge overrides over the optional file over the defaults, then validate.
    pub fn resolve(file: Option<&Path>, cli: ConfigOverrides) -> Result<Self> {
        let file = match file {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        let d = AppConfig::default();

        let cfg = AppConfig {
            base_url:      cli.base_url.or(file.llm.base_url).unwrap_or(d.base_url),
            model:         cli.model.or(file.llm.model).unwrap_or(d.model),
            llm_timeout:   cli.timeout_secs
                .or(file.llm.timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(d.llm_timeout),
            temperature:   cli.temperature.or(file.llm.temperature).unwrap_or(d.temperature),
            top_k:         cli.top_k.or(file.retrieval.top_k).unwrap_or(d.top_k),
            bm25:          Bm25Params {
                k1: file.retrieval.k1.unwrap_or(d.bm25.k1),
                b:  file.retrieval.b.unwrap_or(d.bm25.b),
            },
            max_retries:   cli.max_retries.or(file.pipeline.max_retries).unwrap_or(d.max_retries),
            workers:       cli.workers.or(file.pipeline.workers).unwrap_or(d.workers),
            query_timeout: cli.query_timeout_secs
                .or(file.pipeline.query_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(d.query_timeout),
            docs_dir:      cli.docs_dir.or(file.paths.docs_dir).unwrap_or(d.docs_dir),
            db_path:       cli.db_path.or(file.paths.db_path).unwrap_or(d.db_path),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            bail!("top_k must be at least 1");
        }
        if self.workers == 0 {
            bail!("workers must be at least 1");
        }
        if self.llm_timeout.is_zero() || self.query_timeout.is_zero() {
            bail!("timeouts must be greater than zero");
        }
        if self.bm25.k1.is_nan() || self.bm25.k1 <= 0.0 || !(0.0..=1.0).contains(&self.bm25.b) {
            bail!("BM25 parameters out of range: k1 = {}, b = {}", self.bm25.k1, self.bm25.b);
        }
        if self.max_retries > MAX_RETRIES {
            tracing::warn!(
                "max_retries = {} exceeds the hard limit, using {}",
                self.max_retries,
                MAX_RETRIES
            );
        }
        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            top_k:       self.top_k,
            max_retries: self.max_retries.min(MAX_RETRIES),
            llm_timeout: self.llm_timeout,
        }
    }

    pub fn llm_settings(&self) -> LlmSettings {
        LlmSettings {
            base_url:    self.base_url.clone(),
            model:       self.model.clone(),
            temperature: self.temperature,
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::resolve(None, ConfigOverrides::default()).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.pipeline_settings().top_k, 6);
        assert_eq!(cfg.llm_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_cli_beats_file_beats_default() {
        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("qa.toml");
        fs::write(
            &path,
            "[llm]\nmodel = \"from-file\"\ntimeout_secs = 60\n\n[retrieval]\nk1 = 1.2\n\n[pipeline]\nworkers = 4\n",
        )
        .unwrap();

        let cli = ConfigOverrides { workers: Some(8), ..Default::default() };
        let cfg = AppConfig::resolve(Some(&path), cli).unwrap();
        assert_eq!(cfg.model, "from-file");
        assert_eq!(cfg.llm_timeout, Duration::from_secs(60));
        assert_eq!(cfg.bm25.k1, 1.2);
        assert_eq!(cfg.bm25.b, 0.75);
        assert_eq!(cfg.workers, 8);
    }

    #[test]
    fn test_retries_are_capped() {
        let cli = ConfigOverrides { max_retries: Some(9), ..Default::default() };
        let cfg = AppConfig::resolve(None, cli).unwrap();
        assert_eq!(cfg.pipeline_settings().max_retries, MAX_RETRIES);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let cli = ConfigOverrides { workers: Some(0), ..Default::default() };
        assert!(AppConfig::resolve(None, cli).is_err());

        let dir  = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[llm]\nmodle = \"typo\"\n").unwrap();
        assert!(AppConfig::resolve(Some(&path), ConfigOverrides::default()).is_err());
    }
}

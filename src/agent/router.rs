// ============================================================
// Layer 5 — Router
// ============================================================
// Classifies a question into document / structured / hybrid.
//
// Fails open: a timeout, a transport error, or output that
// names no recognisable route all yield Hybrid, the superset
// strategy. Under-retrieving would lose answers; over-retrieving
// only costs time.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::agent::normalizer::{extract_fields, FieldKind, FieldSpec};
use crate::agent::prompts;
use crate::domain::error::StageError;
use crate::domain::question::Question;
use crate::domain::state::{RouteDecision, Stage};
use crate::domain::traits::TextGenerator;

const ROUTE_FIELDS: [FieldSpec; 1] = [FieldSpec::new("route", FieldKind::Text)];

/// Full labels match anywhere ("documents", "structured_query"); the
/// short aliases only between non-letters, so "average" is not "rag".
static ROUTE_LABEL_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)(document|retrieval|structured|database|hybrid)|(?:^|[^a-z])(docs|rag|sql|both)(?:[^a-z]|$)").ok()
});

/// Classify, falling back to Hybrid on any failure. The error, if
/// any, is returned alongside so the caller can log it.
pub fn classify(
    generator: &dyn TextGenerator,
    timeout:   Duration,
    question:  &Question,
    signal:    Option<&str>,
) -> (RouteDecision, Option<StageError>) {
    match try_classify(generator, timeout, question, signal) {
        Ok(route) => (route, None),
        Err(e)    => (RouteDecision::Hybrid, Some(e)),
    }
}

pub fn try_classify(
    generator: &dyn TextGenerator,
    timeout:   Duration,
    question:  &Question,
    signal:    Option<&str>,
) -> Result<RouteDecision, StageError> {
    let prompt = prompts::route_prompt(question, signal);
    let raw = generator
        .generate(&prompt, timeout)
        .map_err(|e| StageError::from_generation(Stage::Route, &e, StageError::ClassificationFailure))?;

    let fields = extract_fields(&raw, &ROUTE_FIELDS);
    let route = parse_route(fields.text("route")).or_else(|| parse_route(&raw));

    match route {
        Some(r) => {
            tracing::debug!(route = %r, "classified");
            Ok(r)
        }
        None => Err(StageError::ClassificationFailure(format!(
            "no route label in output: {:?}",
            truncate(&raw, 80)
        ))),
    }
}

/// The earliest route label in `text`, case-insensitive.
pub fn parse_route(text: &str) -> Option<RouteDecision> {
    let caps = ROUTE_LABEL_RE.as_ref()?.captures(text)?;
    let label = caps.get(1).or_else(|| caps.get(2))?.as_str().to_ascii_lowercase();
    match label.as_str() {
        "document" | "docs" | "rag" | "retrieval" => Some(RouteDecision::Document),
        "structured" | "sql" | "database"         => Some(RouteDecision::Structured),
        "hybrid" | "both"                         => Some(RouteDecision::Hybrid),
        _ => None,
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

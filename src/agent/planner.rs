// ============================================================
// Layer 5 — Planner
// ============================================================
// Extracts entities and constraints for SQL generation from the
// question plus whatever chunks were retrieved (KPI definitions,
// campaign date ranges).
//
// An unusable reply is recoverable: the planner returns an empty
// context and query generation relies on the schema alone.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde_json::Value;

use crate::agent::normalizer::{convert_json, extract_fields, json_object, FieldKind, FieldSpec, FieldValue};
use crate::agent::prompts;
use crate::domain::chunk::RetrievedChunk;
use crate::domain::error::StageError;
use crate::domain::question::Question;
use crate::domain::state::{PlanningContext, Stage};
use crate::domain::traits::TextGenerator;

const PLAN_FIELDS: [FieldSpec; 3] = [
    FieldSpec::new("entities", FieldKind::List),
    FieldSpec::new("constraints", FieldKind::Map),
    // Some models nest everything under a single "plan" object
    FieldSpec::new("plan", FieldKind::Map),
];

/// Build the planning context. The context is always usable; the
/// error, if any, explains why it is empty.
pub fn plan(
    generator: &dyn TextGenerator,
    timeout:   Duration,
    question:  &Question,
    chunks:    &[RetrievedChunk],
) -> (PlanningContext, Option<StageError>) {
    let prompt = prompts::plan_prompt(question, chunks);
    let raw = match generator.generate(&prompt, timeout) {
        Ok(raw) => raw,
        Err(e) => {
            let err = StageError::from_generation(Stage::Plan, &e, StageError::PlanningParseFailure);
            return (PlanningContext::default(), Some(err));
        }
    };

    let fields = extract_fields(&raw, &PLAN_FIELDS);
    if PLAN_FIELDS.iter().all(|f| !fields.found(f.name)) {
        return (
            PlanningContext::default(),
            Some(StageError::PlanningParseFailure("no entities or constraints found".into())),
        );
    }

    let mut entities: BTreeSet<String> = fields
        .list("entities")
        .iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect();
    let mut constraints = fields.map("constraints");

    match json_object(&raw).and_then(|mut obj| obj.remove("plan")) {
        Some(Value::Object(nested)) => merge_nested_plan(&nested, &mut entities, &mut constraints),
        _ => {
            for (key, value) in fields.map("plan") {
                match key.as_str() {
                    "entities" => entities.extend(split_entities(&value)),
                    _ => {
                        constraints.entry(key).or_insert(value);
                    }
                }
            }
        }
    }

    let context = PlanningContext { entities, constraints };
    tracing::debug!(
        entities = context.entities.len(),
        constraints = context.constraints.len(),
        "planned"
    );
    (context, None)
}

/// `{"plan": {"entities": [...], "constraints": {...}, "<key>": ...}}`:
/// typed members are converted as such, other keys become constraints.
fn merge_nested_plan(
    nested:      &serde_json::Map<String, Value>,
    entities:    &mut BTreeSet<String>,
    constraints: &mut BTreeMap<String, String>,
) {
    for (key, value) in nested {
        match key.as_str() {
            "entities" => {
                if let Some(FieldValue::List(items)) = convert_json(FieldKind::List, value) {
                    entities.extend(items);
                }
            }
            "constraints" => {
                if let Some(FieldValue::Map(map)) = convert_json(FieldKind::Map, value) {
                    for (k, v) in map {
                        constraints.entry(k).or_insert(v);
                    }
                }
            }
            _ => {
                if let Some(FieldValue::Text(v)) = convert_json(FieldKind::Text, value) {
                    constraints.entry(key.clone()).or_insert(v);
                }
            }
        }
    }
}

fn split_entities(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(',')
        .map(|e| e.trim().trim_matches(|c: char| matches!(c, '[' | ']' | '"' | '\'')).trim().to_string())
        .filter(|e| !e.is_empty())
}

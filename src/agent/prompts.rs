// ============================================================
// Layer 5 — Prompt Builders
// ============================================================
// Every prompt starts with a `### Task: <kind>` line. The
// generator treats it as an instruction header; tests use it to
// tell stages apart when scripting a fake generator.

use std::fmt::Write as _;

use crate::domain::chunk::RetrievedChunk;
use crate::domain::query::RowSet;
use crate::domain::question::Question;
use crate::domain::state::{PlanningContext, RouteDecision};

/// Rows quoted into the synthesis prompt; the rest are summarised by count
const MAX_PROMPT_ROWS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Route,
    Plan,
    Sql,
    Synthesize,
}

impl PromptKind {
    pub fn marker(self) -> &'static str {
        match self {
            PromptKind::Route      => "### Task: route",
            PromptKind::Plan       => "### Task: plan",
            PromptKind::Sql        => "### Task: sql",
            PromptKind::Synthesize => "### Task: synthesize",
        }
    }

    /// Which stage a prompt was built for, from its header line.
    pub fn of(prompt: &str) -> Option<PromptKind> {
        let header = prompt.lines().next()?.trim();
        [PromptKind::Route, PromptKind::Plan, PromptKind::Sql, PromptKind::Synthesize]
            .into_iter()
            .find(|k| header == k.marker())
    }
}

pub fn route_prompt(question: &Question, signal: Option<&str>) -> String {
    let mut p = String::new();
    let _ = writeln!(p, "{}", PromptKind::Route.marker());
    p.push_str(
        "Classify the question into exactly one route:\n\
         - document: answerable from the policy, calendar and KPI documents alone\n\
         - structured: needs a SQL query over the database\n\
         - hybrid: needs both documents and a SQL query\n",
    );
    if let Some(signal) = signal {
        let _ = writeln!(p, "\nContext: {signal}");
    }
    let _ = writeln!(p, "\nQuestion: {}", question.text);
    p.push_str("Answer with a single word: document, structured or hybrid.\nroute:");
    p
}

pub fn plan_prompt(question: &Question, chunks: &[RetrievedChunk]) -> String {
    let mut p = String::new();
    let _ = writeln!(p, "{}", PromptKind::Plan.marker());
    p.push_str(
        "Extract the entities (tables, categories, products, customers) and the \
         constraints (date ranges, thresholds, KPI definitions) needed to answer \
         the question with SQL.\n",
    );
    let _ = writeln!(p, "\nQuestion: {}", question.text);
    p.push_str("\nDocuments:\n");
    p.push_str(&render_chunks(chunks));
    p.push_str(
        "\nRespond with JSON only:\n\
         {\"entities\": [\"...\"], \"constraints\": {\"name\": \"value\"}}\n",
    );
    p
}

pub fn sql_prompt(
    question:  &Question,
    plan:      &PlanningContext,
    schema:    &str,
    feedback:  Option<(&str, &str)>,
) -> String {
    let mut p = String::new();
    let _ = writeln!(p, "{}", PromptKind::Sql.marker());
    p.push_str("Write one read-only SQLite query (SELECT or WITH) that answers the question.\n");
    let _ = writeln!(p, "\nQuestion: {}", question.text);
    let _ = writeln!(p, "\nPlan:\n{}", plan.render());
    let _ = writeln!(p, "\nSchema (quote table names that contain spaces):\n{}", schema.trim_end());
    if let Some((previous_query, error)) = feedback {
        let _ = writeln!(
            p,
            "\nThe previous query failed. Fix it.\nPrevious query: {}\nError: {}",
            if previous_query.is_empty() { "(none produced)" } else { previous_query },
            error
        );
    }
    p.push_str("\nReturn only the SQL.\nsql:");
    p
}

pub fn synthesize_prompt(
    question: &Question,
    route:    RouteDecision,
    chunks:   &[RetrievedChunk],
    plan:     Option<&PlanningContext>,
    query:    Option<(&str, &RowSet)>,
) -> String {
    let mut p = String::new();
    let _ = writeln!(p, "{}", PromptKind::Synthesize.marker());
    p.push_str("Answer the question using only the material below.\n");
    let _ = writeln!(p, "\nQuestion: {}", question.text);
    let _ = writeln!(p, "Answer format: {}", question.format_hint);
    let _ = writeln!(p, "Route: {route}");

    if !chunks.is_empty() {
        p.push_str("\nDocuments:\n");
        p.push_str(&render_chunks(chunks));
    }
    if let Some(plan) = plan.filter(|p| !p.is_empty()) {
        let _ = writeln!(p, "\nPlan:\n{}", plan.render());
    }
    if let Some((sql, rows)) = query {
        let _ = writeln!(p, "\nSQL: {sql}");
        let _ = writeln!(p, "Tables: {}", rows.tables_used.join(", "));
        p.push_str(&render_rows(rows));
    }

    p.push_str(
        "\nRespond with JSON only:\n\
         {\"final_answer\": \"...\", \"explanation\": \"one or two sentences\", \
         \"confidence\": 0.0-1.0, \"citations\": [\"document chunk ids used\"]}\n",
    );
    p
}

fn render_chunks(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return "(none)\n".to_string();
    }
    let mut out = String::new();
    for c in chunks {
        let _ = writeln!(out, "[{}] {}", c.id(), c.chunk.text);
    }
    out
}

fn render_rows(rows: &RowSet) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Columns: {}", rows.columns.join(" | "));
    for row in rows.rows.iter().take(MAX_PROMPT_ROWS) {
        let cells: Vec<String> = row.iter().map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }).collect();
        let _ = writeln!(out, "{}", cells.join(" | "));
    }
    if rows.len() > MAX_PROMPT_ROWS {
        let _ = writeln!(out, "... ({} rows total)", rows.len());
    }
    if rows.is_empty() {
        out.push_str("(query returned no rows)\n");
    }
    out
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_kind_roundtrip() {
        let q = Question::new("q", "How many orders?");
        assert_eq!(PromptKind::of(&route_prompt(&q, None)), Some(PromptKind::Route));
        assert_eq!(PromptKind::of(&plan_prompt(&q, &[])), Some(PromptKind::Plan));
        assert_eq!(
            PromptKind::of(&sql_prompt(&q, &PlanningContext::default(), "", None)),
            Some(PromptKind::Sql)
        );
        assert_eq!(PromptKind::of("no header"), None);
    }

    #[test]
    fn test_sql_prompt_carries_feedback() {
        let q = Question::new("q", "How many orders?");
        let p = sql_prompt(
            &q,
            &PlanningContext::default(),
            "\"Orders\"(OrderID INTEGER PK)",
            Some(("SELEC COUNT(*) FROM Orders", "near \"SELEC\": syntax error")),
        );
        assert!(p.contains("Previous query: SELEC COUNT(*) FROM Orders"));
        assert!(p.contains("syntax error"));
        assert!(p.contains("rely on the schema"));
    }

    #[test]
    fn test_rows_are_truncated_in_prompt() {
        let rows = RowSet {
            columns:     vec!["n".into()],
            rows:        (0..30).map(|i| vec![serde_json::json!(i)]).collect(),
            tables_used: vec!["Orders".into()],
        };
        let text = render_rows(&rows);
        assert!(text.contains("(30 rows total)"));
        assert!(!text.contains("\n25\n"));
    }
}

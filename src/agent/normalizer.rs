// ============================================================
// Layer 5 — Output Normalizer
// ============================================================
// Pulls named fields out of free-form generator text.
//
// The generator may answer with clean JSON, JSON inside a code
// fence, DSPy-style `[[ ## field ## ]]` markers, "Field Name:"
// headings, or just prose with a SQL statement somewhere in it.
// Each field is resolved by trying these strategies in order:
//
//   1. json     — strict parse of the whole text, then of the
//                 fence-stripped text, then of the outermost {...}
//   2. marker   — [[ ## field ## ]] value
//   3. heading  — a line starting with the field label and ':'
//   4. shape    — a pattern for the field's kind (SELECT/WITH
//                 block, a decimal in [0,1], chunk/query ids)
//
// A field no strategy can recover takes its default (text → "",
// confidence → 0.0, lists → [], maps → {}) and is reported in
// `defaulted()`. Extraction itself never fails.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

// ─── Field schema ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free prose
    Text,
    /// A SQL statement; only accepted if it contains SELECT/WITH
    Query,
    /// A number in [0,1]; percentages are scaled down
    Confidence,
    List,
    Map,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

// ─── Extraction result ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct ExtractedFields {
    values:    BTreeMap<&'static str, FieldValue>,
    /// Which strategy resolved each field, for debug logging
    sources:   BTreeMap<&'static str, &'static str>,
    defaulted: Vec<&'static str>,
}

impl ExtractedFields {
    pub fn found(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn defaulted(&self) -> &[&'static str] {
        &self.defaulted
    }

    pub fn source(&self, name: &str) -> Option<&'static str> {
        self.sources.get(name).copied()
    }

    pub fn text(&self, name: &str) -> &str {
        match self.values.get(name) {
            Some(FieldValue::Text(s)) => s,
            _ => "",
        }
    }

    pub fn number(&self, name: &str) -> f64 {
        match self.values.get(name) {
            Some(FieldValue::Number(n)) => *n,
            _ => 0.0,
        }
    }

    pub fn list(&self, name: &str) -> &[String] {
        match self.values.get(name) {
            Some(FieldValue::List(items)) => items,
            _ => &[],
        }
    }

    pub fn map(&self, name: &str) -> BTreeMap<String, String> {
        match self.values.get(name) {
            Some(FieldValue::Map(m)) => m.clone(),
            _ => BTreeMap::new(),
        }
    }
}

// ─── Strategy chain ───────────────────────────────────────────────────────────

/// The text being normalised, pre-processed once for all fields.
struct Source<'a> {
    /// Fence-stripped text
    text:   String,
    json:   Option<Map<String, Value>>,
    labels: Vec<&'a str>,
}

type Strategy = fn(&Source<'_>, &FieldSpec) -> Option<FieldValue>;

const STRATEGIES: [(&str, Strategy); 4] = [
    ("json", from_json),
    ("marker", from_marker),
    ("heading", from_heading),
    ("shape", from_shape),
];

/// Labels that end a heading block even if not in the requested schema.
const COMMON_LABELS: [&str; 9] = [
    "final_answer", "answer", "explanation", "citations", "confidence",
    "sql", "route", "entities", "constraints",
];

/// Extract `schema` fields from raw generator output. Never fails.
pub fn extract_fields(raw: &str, schema: &[FieldSpec]) -> ExtractedFields {
    let text = strip_code_fences(raw);
    let json = json_in(raw, &text);

    let mut labels: Vec<&str> = schema.iter().map(|s| s.name).collect();
    labels.extend(COMMON_LABELS);

    let source = Source { text, json, labels };
    let mut out = ExtractedFields::default();

    for spec in schema {
        let hit = STRATEGIES
            .iter()
            .find_map(|(name, strategy)| strategy(&source, spec).map(|v| (*name, v)));

        match hit {
            Some((strategy, value)) => {
                out.values.insert(spec.name, value);
                out.sources.insert(spec.name, strategy);
            }
            None => out.defaulted.push(spec.name),
        }
    }

    tracing::debug!(sources = ?out.sources, defaulted = ?out.defaulted, "normalised output");
    out
}

/// The JSON object carried by `raw`: the whole text, a leading fence,
/// or the outermost braces inside prose.
pub fn json_object(raw: &str) -> Option<Map<String, Value>> {
    json_in(raw, &strip_code_fences(raw))
}

fn json_in(raw: &str, stripped: &str) -> Option<Map<String, Value>> {
    parse_json_object(raw)
        .or_else(|| parse_json_object(stripped))
        .or_else(|| embedded_json_object(stripped))
}

fn from_json(src: &Source<'_>, spec: &FieldSpec) -> Option<FieldValue> {
    let obj = src.json.as_ref()?;
    let value = obj.get(spec.name).or_else(|| {
        obj.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(spec.name))
            .map(|(_, v)| v)
    })?;
    convert_json(spec.kind, value)
}

fn from_marker(src: &Source<'_>, spec: &FieldSpec) -> Option<FieldValue> {
    let pattern = format!(
        r"(?is)\[+\s*##\s*{}\s*##\s*\]+\s*(.*?)(?:\n\s*\[+\s*##|\z)",
        regex::escape(spec.name)
    );
    let re = Regex::new(&pattern).ok()?;
    let captured = re.captures(&src.text)?.get(1)?.as_str();
    convert_text(spec.kind, captured)
}

fn from_heading(src: &Source<'_>, spec: &FieldSpec) -> Option<FieldValue> {
    let lines: Vec<&str> = src.text.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        let Some(first) = heading_value(line, spec.name) else {
            continue;
        };

        let mut block = vec![first];
        for next in &lines[i + 1..] {
            if next.trim().is_empty() || src.labels.iter().any(|l| heading_value(next, l).is_some()) {
                break;
            }
            block.push(next.trim());
        }

        let joined = block.join("\n");
        if let Some(v) = convert_text(spec.kind, &joined) {
            return Some(v);
        }
    }
    None
}

fn from_shape(src: &Source<'_>, spec: &FieldSpec) -> Option<FieldValue> {
    match spec.kind {
        FieldKind::Query => find_query(&src.text).map(FieldValue::Text),
        FieldKind::Confidence => {
            let labelled = CONFIDENCE_RE
                .as_ref()
                .and_then(|re| re.captures(&src.text))
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .and_then(normalize_confidence);
            labelled
                .or_else(|| {
                    BARE_DECIMAL_RE
                        .as_ref()
                        .and_then(|re| re.captures(&src.text))
                        .and_then(|c| c.get(1))
                        .and_then(|m| m.as_str().parse::<f64>().ok())
                        .and_then(normalize_confidence)
                })
                .map(FieldValue::Number)
        }
        FieldKind::List => {
            let re = CITATION_ID_RE.as_ref()?;
            let mut ids: Vec<String> = Vec::new();
            for m in re.find_iter(&src.text) {
                let id = m.as_str().to_string();
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
            (!ids.is_empty()).then_some(FieldValue::List(ids))
        }
        FieldKind::Text | FieldKind::Map => None,
    }
}

// ─── Value conversion ─────────────────────────────────────────────────────────

/// Convert one JSON value to the requested field kind.
pub fn convert_json(kind: FieldKind, value: &Value) -> Option<FieldValue> {
    match kind {
        FieldKind::Text => match value {
            Value::Null => None,
            Value::String(s) => non_empty(s).map(FieldValue::Text),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(json_to_string).collect();
                non_empty(&parts.join(", ")).map(FieldValue::Text)
            }
            other => Some(FieldValue::Text(other.to_string())),
        },
        FieldKind::Query => value.as_str().and_then(find_query).map(FieldValue::Text),
        FieldKind::Confidence => {
            let n = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => first_number(s),
                _ => None,
            };
            n.and_then(normalize_confidence).map(FieldValue::Number)
        }
        FieldKind::List => match value {
            Value::Array(items) => {
                let list: Vec<String> = items
                    .iter()
                    .map(json_to_string)
                    .filter_map(|s| non_empty(&s))
                    .collect();
                Some(FieldValue::List(list))
            }
            Value::String(s) => Some(FieldValue::List(split_list(s))),
            _ => None,
        },
        FieldKind::Map => match value {
            Value::Object(obj) => {
                let map: BTreeMap<String, String> = obj
                    .iter()
                    .filter_map(|(k, v)| non_empty(&json_to_string(v)).map(|v| (k.clone(), v)))
                    .collect();
                Some(FieldValue::Map(map))
            }
            Value::String(s) => parse_map_text(s).map(FieldValue::Map),
            Value::Array(items) => {
                let joined: Vec<String> = items.iter().map(json_to_string).collect();
                parse_map_text(&joined.join("\n")).map(FieldValue::Map)
            }
            _ => None,
        },
    }
}

fn convert_text(kind: FieldKind, raw: &str) -> Option<FieldValue> {
    let text = raw.trim().trim_matches('*').trim();
    if text.is_empty() {
        return None;
    }
    match kind {
        FieldKind::Text => Some(FieldValue::Text(text.to_string())),
        FieldKind::Query => find_query(text).map(FieldValue::Text),
        FieldKind::Confidence => first_number(text)
            .and_then(normalize_confidence)
            .map(FieldValue::Number),
        FieldKind::List => {
            if let Ok(value @ Value::Array(_)) = serde_json::from_str::<Value>(text) {
                return convert_json(kind, &value);
            }
            let items = split_list(text);
            (!items.is_empty()).then_some(FieldValue::List(items))
        }
        FieldKind::Map => {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text) {
                return convert_json(kind, &value);
            }
            parse_map_text(text).map(FieldValue::Map)
        }
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

static CONFIDENCE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)confidence\D{0,20}?(\d+(?:\.\d+)?)").ok());

static BARE_DECIMAL_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\d.])(0\.\d+|1\.0+)(?:[^\d.]|$)").ok());

static CITATION_ID_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9_\-]+::(?:chunk|attempt)\d+").ok());

/// SELECT/WITH opening a line, or right after a colon ("SQL: SELECT ...").
static QUERY_START_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?im)(?:^|:)[ \t]*(select|with)\b").ok());

/// `WITH [RECURSIVE] name [(cols)] AS (` at the start of the text.
static CTE_HEAD_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)^with\s+(?:recursive\s+)?(?:"[^"]+"|`[^`]+`|\[[^\]]+\]|\w+)\s*(?:\([^)]*\)\s*)?as\s*\("#,
    )
    .ok()
});

static NUMBER_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\d*\.?\d+").ok());

/// Inner text of a leading ``` fence, or the trimmed text unchanged.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // Skip the language tag on the opening fence line.
    let body = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    match body.find("```") {
        Some(end) => body[..end].trim().to_string(),
        None => body.trim().to_string(),
    }
}

fn parse_json_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(Value::Object(obj)) => Some(obj),
        _ => None,
    }
}

fn embedded_json_object(text: &str) -> Option<Map<String, Value>> {
    let start = text.find('{')?;
    let end   = text.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_json_object(&text[start..=end])
}

/// The SQL statement inside `text`. A fenced block anywhere in the
/// text is searched first, then the whole text.
fn find_query(text: &str) -> Option<String> {
    fenced_block(text)
        .and_then(query_in)
        .or_else(|| query_in(&strip_code_fences(text)))
}

/// From the first SELECT, or WITH opening a CTE, that starts a line
/// up to a blank line, a fence or the end; trailing ';' dropped.
fn query_in(text: &str) -> Option<String> {
    let start = QUERY_START_RE
        .as_ref()?
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .find(|kw| {
            kw.as_str().eq_ignore_ascii_case("select")
                || CTE_HEAD_RE.as_ref().is_some_and(|re| re.is_match(&text[kw.start()..]))
        })?
        .start();

    let mut query = &text[start..];
    for stop in ["```", "\n\n"] {
        if let Some(pos) = query.find(stop) {
            query = &query[..pos];
        }
    }
    let query = query.trim().trim_end_matches(';').trim();
    non_empty(query)
}

/// Body of the first ``` fence, wherever it opens.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let rest = &text[open + 3..];
    let body = &rest[rest.find('\n')? + 1..];
    Some(body.find("```").map_or(body, |end| &body[..end]))
}

/// Heading value if `line` reads `<label>: value` (label with '_' or ' ').
fn heading_value<'l>(line: &'l str, label: &str) -> Option<&'l str> {
    let line = line
        .trim()
        .trim_start_matches(|c: char| c == '#' || c == '-' || c == '*' || c == '>')
        .trim_start();

    let spaced = label.replace('_', " ");
    for candidate in [label, spaced.as_str()] {
        let n = candidate.len();
        if line.len() < n || !line.is_char_boundary(n) || !line[..n].eq_ignore_ascii_case(candidate) {
            continue;
        }
        let after = line[n..].trim_start_matches('*').trim_start();
        if let Some(value) = after.strip_prefix(':') {
            return Some(value.trim().trim_start_matches('*').trim());
        }
    }
    None
}

fn first_number(text: &str) -> Option<f64> {
    NUMBER_RE.as_ref()?.find(text)?.as_str().parse().ok()
}

fn normalize_confidence(x: f64) -> Option<f64> {
    if !x.is_finite() || x < 0.0 {
        None
    } else if x <= 1.0 {
        Some(x)
    } else if x <= 100.0 {
        Some(x / 100.0)
    } else {
        None
    }
}

fn split_list(text: &str) -> Vec<String> {
    text.split(['\n', ';', ','])
        .map(clean_item)
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_map_text(text: &str) -> Option<BTreeMap<String, String>> {
    let map: BTreeMap<String, String> = text
        .split(['\n', ';', ','])
        .filter_map(|item| {
            let (k, v) = item.split_once(':').or_else(|| item.split_once('='))?;
            let (k, v) = (clean_item(k), clean_item(v));
            (!k.is_empty() && !v.is_empty()).then_some((k, v))
        })
        .collect();
    (!map.is_empty()).then_some(map)
}

fn clean_item(s: &str) -> String {
    s.trim()
        .trim_start_matches(['-', '*', '•'])
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '[' || c == ']' || c == '`')
        .trim()
        .to_string()
}

fn json_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

// ============================================================
// Layer 3 — Query Attempts and Execution Results
// ============================================================
// One QueryAttempt is recorded per pass through the repair loop.
// ExecutionResult is the terminal outcome of the loop and is set
// exactly once.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rows returned by a successful query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns:     Vec<String>,
    pub rows:        Vec<Vec<Value>>,
    /// Tables named after FROM/JOIN in the query text
    pub tables_used: Vec<String>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What happened to one attempt's query.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Rows(RowSet),
    Failed(String),
}

/// One generate → execute cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAttempt {
    /// 0-based; strictly increasing across a question's attempts
    pub index:       u32,
    /// Generated query text, empty when generation itself failed
    pub query:       String,
    /// Error of the previous attempt, fed back into the prompt
    pub prior_error: Option<String>,
    pub outcome:     AttemptOutcome,
}

impl QueryAttempt {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Rows(_))
    }

    /// Citation id for this attempt's query
    pub fn citation_id(&self) -> String {
        format!("sql::attempt{}", self.index)
    }
}

/// Terminal outcome of the repair loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    Success {
        attempt: u32,
        query:   String,
        rows:    RowSet,
    },
    /// Failure marker: the retry budget ran out (or the run was cancelled)
    Exhausted {
        last_query: Option<String>,
        last_error: String,
    },
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success { .. })
    }

    pub fn rows(&self) -> Option<&RowSet> {
        match self {
            ExecutionResult::Success { rows, .. } => Some(rows),
            ExecutionResult::Exhausted { .. } => None,
        }
    }

    /// The query text reported in the output record's `sql` field
    pub fn reported_query(&self) -> Option<&str> {
        match self {
            ExecutionResult::Success { query, .. } => Some(query),
            ExecutionResult::Exhausted { last_query, .. } => last_query.as_deref(),
        }
    }
}

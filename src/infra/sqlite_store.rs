// ============================================================
// Layer 6 — SQLite Store
// ============================================================
// Read-only access to the structured store:
//
//   QueryExecutor  → runs one generated SELECT/WITH query
//   SchemaSource   → tables, columns, primary and foreign keys
//
// Every execute() opens its own read-only connection, so the
// store is shared by all workers without a lock. A watchdog
// thread interrupts the connection when the per-call timeout
// expires; SQLite then aborts the statement with
// SQLITE_INTERRUPT, reported here as ExecutionError::Timeout.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, LazyLock};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use regex::Regex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, ErrorCode, OpenFlags};
use serde_json::Value;

use crate::domain::error::ExecutionError;
use crate::domain::query::RowSet;
use crate::domain::schema::{ColumnSchema, ForeignKey, SchemaSnapshot, TableSchema};
use crate::domain::traits::{QueryExecutor, SchemaSource};

/// Table names after FROM/JOIN, quoted ("Order Details", [x], `x`) or bare.
static TABLE_REF_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:from|join)\s+("[^"]+"|\[[^\]]+\]|`[^`]+`|[A-Za-z_][A-Za-z0-9_]*)"#).ok()
});

pub struct SqliteStore {
    path:    PathBuf,
    timeout: Duration,
}

impl SqliteStore {
    /// Open the database read-only. Fails if the file is missing
    /// or is not a SQLite database.
    pub fn open(path: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let path = path.into();
        if !path.is_file() {
            bail!("Database not found: '{}'", path.display());
        }
        let store = Self { path, timeout };
        store
            .connect()
            .and_then(|c| c.query_row("SELECT COUNT(*) FROM sqlite_master", [], |r| r.get::<_, i64>(0)))
            .with_context(|| format!("Cannot read database '{}'", store.path.display()))?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
    }

    fn run_query(conn: &Connection, query: &str) -> rusqlite::Result<(Vec<String>, Vec<Vec<Value>>)> {
        let mut stmt = conn.prepare(query)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let width = columns.len();

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(to_json(row.get_ref(i)?));
            }
            out.push(values);
        }
        Ok((columns, out))
    }
}

impl QueryExecutor for SqliteStore {
    fn execute(&self, query: &str) -> Result<RowSet, ExecutionError> {
        let query = query.trim().trim_end_matches(';').trim();
        if query.is_empty() {
            return Err(ExecutionError::EmptyQuery);
        }
        if !is_read_only(query) {
            let head: String = query.chars().take(40).collect();
            return Err(ExecutionError::NotReadOnly(head));
        }

        let conn = self.connect().map_err(|e| ExecutionError::Sqlite(e.to_string()))?;

        // Watchdog: interrupt the connection if the query outlives the timeout.
        let handle    = conn.get_interrupt_handle();
        let timed_out = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let watchdog = {
            let timed_out = Arc::clone(&timed_out);
            let timeout   = self.timeout;
            thread::spawn(move || {
                if let Err(mpsc::RecvTimeoutError::Timeout) = done_rx.recv_timeout(timeout) {
                    timed_out.store(true, Ordering::SeqCst);
                    handle.interrupt();
                }
            })
        };

        let result = Self::run_query(&conn, query);
        let _ = done_tx.send(());
        let _ = watchdog.join();

        match result {
            Ok((columns, rows)) => {
                let tables_used = tables_used(query);
                tracing::debug!(rows = rows.len(), tables = ?tables_used, "query executed");
                Ok(RowSet { columns, rows, tables_used })
            }
            Err(e) if timed_out.load(Ordering::SeqCst)
                || e.sqlite_error_code() == Some(ErrorCode::OperationInterrupted) =>
            {
                Err(ExecutionError::Timeout(self.timeout))
            }
            Err(e) => Err(ExecutionError::Sqlite(e.to_string())),
        }
    }
}

impl SchemaSource for SqliteStore {
    fn schema_snapshot(&self) -> Result<SchemaSnapshot> {
        let conn = self
            .connect()
            .with_context(|| format!("Cannot open database '{}'", self.path.display()))?;

        let names: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )?;
            let rows = stmt.query_map([], |r| r.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let columns = {
                let mut stmt = conn.prepare("SELECT name, type, pk FROM pragma_table_info(?1) ORDER BY cid")?;
                let rows = stmt.query_map([&name], |r| {
                    Ok(ColumnSchema {
                        name:        r.get(0)?,
                        decl_type:   r.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        primary_key: r.get::<_, i64>(2)? > 0,
                    })
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            let foreign_keys = {
                let mut stmt = conn.prepare(
                    "SELECT \"from\", \"table\", \"to\" FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
                )?;
                let rows = stmt.query_map([&name], |r| {
                    Ok(ForeignKey {
                        column:     r.get(0)?,
                        ref_table:  r.get(1)?,
                        ref_column: r.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    })
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            tables.push(TableSchema { name, columns, foreign_keys });
        }

        tracing::info!("Loaded schema: {} tables from '{}'", tables.len(), self.path.display());
        Ok(SchemaSnapshot { tables })
    }
}

/// SELECT or WITH as the first keyword.
fn is_read_only(query: &str) -> bool {
    let first: String = query
        .trim_start_matches(|c: char| c == '(' || c.is_whitespace())
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    first.eq_ignore_ascii_case("select") || first.eq_ignore_ascii_case("with")
}

/// Distinct table names read by the query, in order of appearance.
pub fn tables_used(query: &str) -> Vec<String> {
    let Some(re) = TABLE_REF_RE.as_ref() else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::new();
    for cap in re.captures_iter(query) {
        let Some(m) = cap.get(1) else { continue };
        let name = m
            .as_str()
            .trim_matches(|c| c == '"' || c == '`' || c == '[' || c == ']')
            .to_string();
        if !name.is_empty() && !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

fn to_json(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null       => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f)    => serde_json::Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t)    => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b)    => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

// ============================================================
// Layer 3 — Schema Snapshot
// ============================================================
// Read-only description of the structured store. Built once
// before any question is processed and quoted verbatim into the
// query-generation prompt.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name:        String,
    /// Declared SQL type, may be empty for untyped SQLite columns
    pub decl_type:   String,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column:     String,
    pub ref_table:  String,
    pub ref_column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name:         String,
    pub columns:      Vec<ColumnSchema>,
    pub foreign_keys: Vec<ForeignKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableSchema>,
}

impl SchemaSnapshot {
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.iter().map(|t| t.name.as_str()).collect()
    }

    /// Render as prompt text, one table per line:
    ///   "Order Details"(OrderID INTEGER PK, ...) FK OrderID -> Orders.OrderID
    pub fn render(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            let cols: Vec<String> = table
                .columns
                .iter()
                .map(|c| {
                    let mut col = c.name.clone();
                    if !c.decl_type.is_empty() {
                        col.push(' ');
                        col.push_str(&c.decl_type);
                    }
                    if c.primary_key {
                        col.push_str(" PK");
                    }
                    col
                })
                .collect();

            let _ = write!(out, "\"{}\"({})", table.name, cols.join(", "));
            for fk in &table.foreign_keys {
                let _ = write!(out, " FK {} -> {}.{}", fk.column, fk.ref_table, fk.ref_column);
            }
            out.push('\n');
        }
        out
    }
}

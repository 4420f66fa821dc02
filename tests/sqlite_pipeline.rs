// The repair loop against a real read-only SQLite database: the
// executor's own error text is what the next prompt sees.

mod common;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use hybrid_qa::agent::orchestrator::Orchestrator;
use hybrid_qa::agent::prompts::PromptKind;
use hybrid_qa::domain::question::Question;
use hybrid_qa::domain::state::RouteDecision;
use hybrid_qa::domain::traits::{QueryExecutor, SchemaSource};
use hybrid_qa::infra::cancel::CancelFlag;
use hybrid_qa::infra::sqlite_store::SqliteStore;
use rusqlite::Connection;

fn shop_db(dir: &Path) -> SqliteStore {
    let path = dir.join("shop.sqlite");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE Orders (OrderID INTEGER PRIMARY KEY, OrderDate TEXT, Freight REAL);
         CREATE TABLE \"Order Details\" (
             OrderID INTEGER REFERENCES Orders(OrderID),
             UnitPrice REAL,
             Quantity INTEGER
         );
         INSERT INTO Orders VALUES (1, '1997-01-02', 12.5), (2, '1997-03-04', NULL);
         INSERT INTO \"Order Details\" VALUES (1, 10.0, 3), (2, 200.0, 4);",
    )
    .unwrap();
    drop(conn);
    SqliteStore::open(&path, Duration::from_secs(5)).unwrap()
}

fn sqlite_orchestrator(gen: &Arc<ScriptedGenerator>, store: SqliteStore) -> Orchestrator {
    let schema = store.schema_snapshot().unwrap();
    Orchestrator::new(
        gen.clone(),
        Arc::new(store),
        Arc::new(corpus_index()),
        Arc::new(schema),
        settings(),
        CancelFlag::new(),
    )
}

#[test]
fn bad_column_is_repaired_with_the_real_error() {
    let dir = tempfile::tempdir().unwrap();
    let gen = Arc::new(
        ScriptedGenerator::new()
            .reply(PromptKind::Route, "structured")
            .reply(PromptKind::Plan, r#"{"entities": ["Orders"], "constraints": {}}"#)
            .reply(PromptKind::Sql, "SELECT SUM(Freigth) FROM Orders")
            .reply(PromptKind::Sql, "SELECT SUM(Freight) AS freight FROM Orders;"),
    );
    let orch = sqlite_orchestrator(&gen, shop_db(dir.path()));

    let state = orch.process(&Question::new("freight_total", "Total freight over all orders?"));

    assert_eq!(state.route(), RouteDecision::Structured);
    assert_eq!(state.attempts().len(), 2);
    let first_error = state.attempts()[1].prior_error.clone().unwrap();
    assert!(first_error.contains("no such column: Freigth"), "{first_error}");

    let prompts = gen.prompts(PromptKind::Sql);
    assert!(prompts[0].contains("\"Order Details\"(OrderID INTEGER, UnitPrice REAL, Quantity INTEGER)"));
    assert!(prompts[0].contains("FK OrderID -> Orders.OrderID"));
    assert!(prompts[1].contains("Previous query: SELECT SUM(Freigth) FROM Orders"));
    assert!(prompts[1].contains(&first_error));

    // No synthesis reply scripted: the answer comes from the single cell
    let rec = state.into_output();
    assert_eq!(rec.final_answer, "12.5");
    assert_eq!(rec.sql.as_deref(), Some("SELECT SUM(Freight) AS freight FROM Orders"));
    assert_eq!(rec.citations, vec!["sql::attempt1", "Orders"]);
    assert!(rec.confidence > 0.0 && rec.confidence < 0.5);
}

#[test]
fn writes_never_reach_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let gen = Arc::new(
        ScriptedGenerator::new()
            .reply(PromptKind::Route, "sql")
            .reply(PromptKind::Sql, "WITH gone AS (SELECT 1) DELETE FROM Orders")
            .reply(PromptKind::Sql, "SELECT COUNT(*) AS n FROM Orders"),
    );
    let orch = sqlite_orchestrator(&gen, shop_db(dir.path()));

    let state = orch.process(&Question::new("orders_count", "How many orders are there?"));

    assert_eq!(state.attempts().len(), 2);
    assert!(!state.attempts()[0].succeeded());
    let rec = state.into_output();
    assert_eq!(rec.final_answer, "2");

    let check = SqliteStore::open(dir.path().join("shop.sqlite"), Duration::from_secs(5)).unwrap();
    let rows = check.execute("SELECT COUNT(*) FROM Orders").unwrap();
    assert_eq!(rows.rows, vec![vec![serde_json::json!(2)]]);
}

#[test]
fn hybrid_question_uses_documents_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let gen = Arc::new(
        ScriptedGenerator::new()
            .reply(PromptKind::Route, "hybrid")
            .reply(
                PromptKind::Plan,
                "entities: Orders, Order Details\nconstraints: start = 1997-01-01; end = 1997-01-31",
            )
            .reply(
                PromptKind::Sql,
                "```sql\nSELECT SUM(d.UnitPrice * d.Quantity) AS revenue FROM Orders o \
                 JOIN \"Order Details\" d ON d.OrderID = o.OrderID \
                 WHERE o.OrderDate BETWEEN '1997-01-01' AND '1997-01-31'\n```",
            )
            .reply(
                PromptKind::Synthesize,
                "final_answer: 30.0\nexplanation: Revenue from January 1997 orders.\n\
                 citations: kpi_definitions::chunk1\nconfidence: 0.8",
            ),
    );
    let orch = sqlite_orchestrator(&gen, shop_db(dir.path()));

    let state = orch.process(&Question::new(
        "hybrid_revenue_jan",
        "Using the AOV definition, what was revenue in January 1997?",
    ));

    assert_eq!(state.route(), RouteDecision::Hybrid);
    assert!(!state.retrieved().is_empty());
    let plan = state.plan().unwrap();
    assert!(plan.entities.contains("Order Details"));
    assert_eq!(plan.constraints.get("end").map(String::as_str), Some("1997-01-31"));

    let synth = &gen.prompts(PromptKind::Synthesize)[0];
    assert!(synth.contains("Columns: revenue"));
    assert!(synth.contains("Documents:"));

    let rec = state.into_output();
    assert_eq!(rec.final_answer, "30.0");
    assert_eq!(rec.confidence, 0.8);
    assert_eq!(rec.citations[0], "kpi_definitions::chunk1");
    assert!(rec.citations.contains(&"sql::attempt0".to_string()));
    assert!(rec.citations.contains(&"Order Details".to_string()));
}

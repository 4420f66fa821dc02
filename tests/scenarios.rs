// End-to-end question scenarios through the full Orchestrator with
// scripted generator and executor.

mod common;

use std::sync::Arc;

use common::*;
use hybrid_qa::agent::prompts::PromptKind;
use hybrid_qa::domain::query::ExecutionResult;
use hybrid_qa::domain::question::Question;
use hybrid_qa::domain::state::RouteDecision;

#[test]
fn document_question_cites_the_policy_chunk() {
    let gen = Arc::new(
        ScriptedGenerator::new()
            .reply(PromptKind::Route, "document")
            .reply(
                PromptKind::Synthesize,
                r#"{"final_answer": "14 days", "explanation": "The returns policy gives 14 days for unopened Beverages.", "confidence": 0.9, "citations": ["product_policy::chunk2"]}"#,
            ),
    );
    let exec = Arc::new(ScriptedExecutor::new());
    let orch = orchestrator(&gen, &exec, settings());

    let q = Question::new("rag_policy_beverages_return_days", "What is the return window for unopened Beverages?")
        .with_format_hint("int");
    let state = orch.process(&q);

    assert_eq!(state.route(), RouteDecision::Document);
    assert_eq!(state.retrieved()[0].id(), "product_policy::chunk2");
    assert!(state.retrieved()[0].chunk.text.contains("14 days for unopened Beverages"));
    assert!(state.attempts().is_empty());
    assert_eq!(gen.calls(PromptKind::Sql), 0);
    assert!(exec.queries().is_empty());

    // The format hint reaches synthesis
    assert!(gen.prompts(PromptKind::Synthesize)[0].contains("Answer format: int"));

    let rec = state.into_output();
    assert!(rec.final_answer.contains("14 days"));
    assert!(rec.citations.contains(&"product_policy::chunk2".to_string()));
    assert!(rec.sql.is_none());
    assert_eq!(rec.confidence, 0.9);
}

#[test]
fn structured_question_succeeds_on_first_attempt() {
    let sql = "SELECT o.OrderID, SUM(d.UnitPrice * d.Quantity) AS total FROM Orders o \
               JOIN \"Order Details\" d ON d.OrderID = o.OrderID \
               WHERE strftime('%Y', o.OrderDate) = '1997' GROUP BY o.OrderID HAVING total > 500";
    let gen = Arc::new(
        ScriptedGenerator::new()
            .reply(PromptKind::Route, "structured")
            .reply(PromptKind::Plan, r#"{"entities": ["Orders", "Order Details"], "constraints": {"year": "1997", "min_total": "500"}}"#)
            .reply(PromptKind::Sql, &format!("```sql\n{sql};\n```"))
            .reply(PromptKind::Synthesize, r#"{"final_answer": "2 orders: 10260, 10261", "explanation": "Orders in 1997 above $500."}"#),
    );
    let exec = Arc::new(ScriptedExecutor::new().rows(order_rows()));
    let orch = orchestrator(&gen, &exec, settings());

    let state = orch.process(&Question::new("sql_orders_over_500", "List all orders over $500 in 1997"));

    assert_eq!(state.route(), RouteDecision::Structured);
    assert!(state.retrieved().is_empty());
    assert_eq!(state.attempts().len(), 1);
    assert_eq!(state.attempts()[0].index, 0);
    assert!(state.attempts()[0].succeeded());
    assert_eq!(exec.queries(), vec![sql.to_string()]);

    // The planning context and schema reach the query prompt
    let sql_prompt = &gen.prompts(PromptKind::Sql)[0];
    assert!(sql_prompt.contains("min_total = 500"));
    assert!(sql_prompt.contains("\"Order Details\"("));

    let rec = state.into_output();
    assert_eq!(rec.sql.as_deref(), Some(sql));
    assert_eq!(rec.citations, vec!["sql::attempt0", "Orders", "Order Details"]);
    assert!(rec.confidence > 0.0 && rec.confidence <= 1.0);
}

#[test]
fn two_syntax_errors_then_success() {
    let gen = Arc::new(
        ScriptedGenerator::new()
            .reply(PromptKind::Route, "structured")
            .reply(PromptKind::Plan, r#"{"entities": ["Orders"], "constraints": {}}"#)
            .reply(PromptKind::Sql, "SELECT COUNT(*) FORM Orders")
            .reply(PromptKind::Sql, "SELECT COUNT(*) FROM Order")
            .reply(PromptKind::Sql, "SELECT COUNT(*) AS n FROM Orders")
            .reply(PromptKind::Synthesize, r#"{"final_answer": "830", "confidence": 0.7}"#),
    );
    let exec = Arc::new(
        ScriptedExecutor::new()
            .error("near \"Orders\": syntax error")
            .error("near \"Order\": syntax error")
            .rows(order_rows()),
    );
    let orch = orchestrator(&gen, &exec, settings());

    let state = orch.process(&Question::new("sql_count", "How many orders are there?"));

    assert_eq!(state.attempts().len(), 3);
    let indices: Vec<u32> = state.attempts().iter().map(|a| a.index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert!(matches!(state.execution(), Some(ExecutionResult::Success { attempt: 2, .. })));
    assert_eq!(state.attempts()[2].prior_error.as_deref(), Some("near \"Order\": syntax error"));

    // Each repair prompt carries the previous failure
    let prompts = gen.prompts(PromptKind::Sql);
    assert_eq!(prompts.len(), 3);
    assert!(!prompts[0].contains("Previous query"));
    assert!(prompts[1].contains("Previous query: SELECT COUNT(*) FORM Orders"));
    assert!(prompts[2].contains("near \"Order\": syntax error"));

    let rec = state.into_output();
    assert_eq!(rec.sql.as_deref(), Some("SELECT COUNT(*) AS n FROM Orders"));
    assert!(rec.citations.contains(&"sql::attempt2".to_string()));
    assert!(!rec.citations.contains(&"sql::attempt0".to_string()));
}

#[test]
fn all_attempts_fail_still_answers() {
    let gen = Arc::new(
        ScriptedGenerator::new()
            .reply(PromptKind::Route, "structured")
            .reply(PromptKind::Plan, "entities: Orders")
            .reply(PromptKind::Sql, "SELECT a FROM Orders")
            .reply(PromptKind::Sql, "SELECT b FROM Orders")
            .reply(PromptKind::Sql, "SELECT c FROM Orders"),
    );
    let exec = Arc::new(
        ScriptedExecutor::new()
            .error("no such column: a")
            .error("no such column: b")
            .error("no such column: c"),
    );
    let orch = orchestrator(&gen, &exec, settings());

    let state = orch.process(&Question::new("sql_broken", "What is the total freight?"));

    assert_eq!(state.attempts().len(), 3);
    assert!(state.query_exhausted());
    assert!(matches!(
        state.execution(),
        Some(ExecutionResult::Exhausted { last_error, .. }) if last_error == "no such column: c"
    ));
    // Nothing to answer from: synthesis falls back without a generator call
    assert_eq!(gen.calls(PromptKind::Synthesize), 0);

    let rec = state.into_output();
    assert!(!rec.final_answer.is_empty());
    assert_eq!(rec.confidence, 0.0);
    assert_eq!(rec.sql.as_deref(), Some("SELECT c FROM Orders"));
    assert!(rec.citations.is_empty());
}

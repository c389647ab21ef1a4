#![cfg(feature = "test-utils")]

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use sql_txn_middleware::prelude::*;
use sql_txn_middleware::test_utils::{Call, FakeDriver};
use sql_txn_middleware::{DriverError, StreamEvent, StreamSummary};

fn numbered_rows(n: i64) -> Vec<StreamEvent> {
    let cols = Arc::new(vec!["n".to_string()]);
    (0..n)
        .map(|i| StreamEvent::Row(CustomDbRow::new(cols.clone(), vec![RowValues::Int(i)])))
        .collect()
}

fn streaming_runner(driver: FakeDriver) -> TxnRunner<FakeDriver> {
    TxnRunner::new(Arc::new(driver), ConnectionMode::Pooled, true)
}

#[tokio::test]
async fn rows_are_regrouped_by_statement_counts() -> Result<(), Box<dyn std::error::Error>> {
    let mut events = numbered_rows(5);
    events.push(StreamEvent::Done(StreamSummary {
        rows_affected: Some(vec![3, 2]),
        ..Default::default()
    }));
    let runner = streaming_runner(FakeDriver::new().with_stream(events));

    let result = runner
        .run_transaction(
            &json!({"formato": 1, "dados": {"executar": "SELECT 1; SELECT 2"}}),
            false,
        )
        .await?;

    assert_eq!(result.rows_affected(), vec![3, 2]);
    assert_eq!(
        runner.to_json(&result)["recordsets"],
        json!([[{"n": 0}, {"n": 1}, {"n": 2}], [{"n": 3}, {"n": 4}]])
    );
    assert!(
        runner
            .manager()
            .driver()
            .calls()
            .contains(&Call::ExecuteStream("SELECT 1; SELECT 2".into()))
    );
    Ok(())
}

#[tokio::test]
async fn missing_counts_give_one_recordset() -> Result<(), Box<dyn std::error::Error>> {
    let mut events = numbered_rows(2);
    events.push(StreamEvent::Done(StreamSummary::default()));
    let runner = streaming_runner(FakeDriver::new().with_stream(events));

    let result = runner
        .run(ExecutionRequest::statement("SELECT n FROM t"), false)
        .await?;
    assert_eq!(result.rows_affected(), vec![2]);
    assert_eq!(result.recordset().map(Vec::len), Some(2));
    Ok(())
}

#[tokio::test]
async fn stream_without_summary_fails_execution() {
    let runner = streaming_runner(FakeDriver::new().with_stream(numbered_rows(1)));

    let err = runner
        .run(ExecutionRequest::statement("SELECT 1"), false)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
    assert!(!runner.manager().driver().calls().contains(&Call::Commit));
}

#[tokio::test]
async fn stream_error_tears_down_the_transaction() {
    let mut items: Vec<Result<StreamEvent, DriverError>> =
        numbered_rows(1).into_iter().map(Ok).collect();
    items.push(Err(DriverError::ExecutionError("conversion failed".into())));
    let runner = streaming_runner(FakeDriver::new().with_stream_items(items));

    let err = runner
        .run(ExecutionRequest::statement("SELECT 1"), false)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
    let calls = runner.manager().driver().calls();
    assert_eq!(&calls[calls.len() - 2..], &[Call::Release, Call::CloseAll]);
}

#[tokio::test]
async fn summary_outputs_reach_the_result() -> Result<(), Box<dyn std::error::Error>> {
    let mut output = BTreeMap::new();
    output.insert("count".to_string(), RowValues::Int(9));
    let runner = streaming_runner(FakeDriver::new().with_stream(vec![StreamEvent::Done(
        StreamSummary {
            rows_affected: Some(vec![]),
            output,
            return_value: Some(2),
        },
    )]));

    let result = runner
        .run(
            ExecutionRequest::procedure("dbo.count_things")
                .output(OutputBinding::new("count", "Int")),
            false,
        )
        .await?;
    assert_eq!(result.output_value("count"), Some(&RowValues::Int(9)));
    assert_eq!(result.return_value, Some(2));
    Ok(())
}

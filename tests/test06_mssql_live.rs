#![cfg(feature = "mssql")]

// Runs against a real server only when MSSQL_TEST_SERVER is set, e.g.
// MSSQL_TEST_SERVER=localhost MSSQL_TEST_PASSWORD=... cargo test --test test06_mssql_live

use std::sync::Arc;

use serde_json::json;
use sql_txn_middleware::prelude::*;

fn live_config() -> Option<MssqlTxnConfig> {
    let server = std::env::var("MSSQL_TEST_SERVER").ok()?;
    let user = std::env::var("MSSQL_TEST_USER").unwrap_or_else(|_| "sa".to_string());
    let password = std::env::var("MSSQL_TEST_PASSWORD").unwrap_or_default();
    let database = std::env::var("MSSQL_TEST_DATABASE").unwrap_or_else(|_| "master".to_string());
    Some(
        MssqlTxnConfig::builder(server, database, user, password)
            .trust_server_certificate(true)
            .finish(),
    )
}

#[tokio::test]
async fn statement_with_inputs_and_outputs() -> Result<(), Box<dyn std::error::Error>> {
    let Some(cfg) = live_config() else {
        return Ok(());
    };
    let runner = TxnRunner::from_config(Arc::new(MssqlDriver::new(cfg.clone())), &cfg);

    let result = runner
        .run_transaction(
            &json!({
                "formato": 1,
                "dados": {
                    "executar": "SELECT @a + 1 AS next, @label AS label; SET @doubled = @a * 2;",
                    "input": [["a", "Int", 20], ["label", "hello"]],
                    "output": [["doubled", "Int"]]
                }
            }),
            true,
        )
        .await?;

    let first = result.all_recordsets()[0];
    assert_eq!(first[0].get("next"), Some(&RowValues::Int(21)));
    assert_eq!(first[0].get("label"), Some(&RowValues::Text("hello".into())));
    assert_eq!(result.output_value("doubled"), Some(&RowValues::Int(40)));
    Ok(())
}

#[tokio::test]
async fn streaming_two_recordsets() -> Result<(), Box<dyn std::error::Error>> {
    let Some(cfg) = live_config() else {
        return Ok(());
    };
    let runner = TxnRunner::new(
        Arc::new(MssqlDriver::new(cfg)),
        ConnectionMode::Direct,
        true,
    );

    let result = runner
        .run(
            ExecutionRequest::statement(
                "SELECT v FROM (VALUES (1),(2),(3)) t(v); SELECT w FROM (VALUES (4),(5)) u(w);",
            ),
            false,
        )
        .await?;
    assert_eq!(result.rows_affected(), vec![3, 2]);
    Ok(())
}

#[tokio::test]
async fn syntax_error_carries_server_code() {
    let Some(cfg) = live_config() else {
        return;
    };
    let runner = TxnRunner::new(
        Arc::new(MssqlDriver::new(cfg)),
        ConnectionMode::Pooled,
        false,
    );
    let err = runner
        .run(ExecutionRequest::statement("SELEC 1"), true)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExecutionFailed);
    assert_eq!(err.code(), 102);
}

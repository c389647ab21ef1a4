#![cfg(feature = "test-utils")]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sql_txn_middleware::lifecycle::TxState;
use sql_txn_middleware::prelude::*;
use sql_txn_middleware::test_utils::{Call, FakeDriver};
use sql_txn_middleware::{DriverError, RawDriverResult};

fn runner(driver: FakeDriver, mode: ConnectionMode) -> TxnRunner<FakeDriver> {
    TxnRunner::new(Arc::new(driver), mode, false)
}

fn select_one() -> serde_json::Value {
    json!({"formato": 1, "dados": {"executar": "SELECT 1 AS one"}})
}

#[tokio::test]
async fn pooled_commit_returns_connection_to_pool() -> Result<(), Box<dyn std::error::Error>> {
    let runner = runner(FakeDriver::new(), ConnectionMode::Pooled);
    runner.run_transaction(&select_one(), false).await?;

    assert_eq!(
        runner.manager().driver().calls(),
        vec![
            Call::Connect(ConnectionMode::Pooled),
            Call::Begin,
            Call::Execute("SELECT 1 AS one".into()),
            Call::Commit,
            Call::Release,
        ]
    );
    Ok(())
}

#[tokio::test]
async fn direct_mode_closes_after_commit() -> Result<(), Box<dyn std::error::Error>> {
    let runner = runner(FakeDriver::new(), ConnectionMode::Direct);
    runner.run_transaction(&select_one(), false).await?;

    let calls = runner.manager().driver().calls();
    assert_eq!(calls.first(), Some(&Call::Connect(ConnectionMode::Direct)));
    assert_eq!(calls.last(), Some(&Call::CloseAll));
    Ok(())
}

#[tokio::test]
async fn force_close_closes_the_pool_too() -> Result<(), Box<dyn std::error::Error>> {
    let runner = runner(FakeDriver::new(), ConnectionMode::Pooled);
    runner.run_transaction(&select_one(), true).await?;

    let calls = runner.manager().driver().calls();
    assert_eq!(&calls[calls.len() - 3..], &[Call::Commit, Call::Release, Call::CloseAll]);
    Ok(())
}

#[tokio::test]
async fn connect_failure_closes_everything_and_never_begins() {
    let driver = FakeDriver::new().fail_connect(DriverError::ConnectionError("refused".into()));
    let runner = runner(driver, ConnectionMode::Pooled);

    let err = runner.run_transaction(&select_one(), false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
    assert_eq!(err.code(), 500);
    assert_eq!(err.domain(), "DB");
    assert_eq!(
        runner.manager().driver().calls(),
        vec![Call::Connect(ConnectionMode::Pooled), Call::CloseAll]
    );
}

#[tokio::test]
async fn execution_failure_skips_commit() {
    let driver = FakeDriver::new().fail_execute(DriverError::ExecutionError("bad syntax".into()));
    let runner = runner(driver, ConnectionMode::Pooled);

    let err = runner.run_transaction(&select_one(), false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExecutionFailed);

    let calls = runner.manager().driver().calls();
    assert!(!calls.contains(&Call::Commit));
    assert_eq!(&calls[calls.len() - 2..], &[Call::Release, Call::CloseAll]);
}

#[tokio::test]
async fn commit_failure_is_reported_and_closes_connections() {
    let driver = FakeDriver::new().fail_commit(DriverError::ExecutionError("deadlock".into()));
    let runner = runner(driver, ConnectionMode::Pooled);

    let err = runner.run_transaction(&select_one(), false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CommitFailed);
    let calls = runner.manager().driver().calls();
    assert_eq!(&calls[calls.len() - 3..], &[Call::Commit, Call::Release, Call::CloseAll]);
}

#[tokio::test]
async fn several_requests_share_one_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let driver = FakeDriver::new()
        .with_result(RawDriverResult {
            rows_affected: vec![1],
            recordsets: vec![vec![]],
            ..Default::default()
        })
        .with_result(RawDriverResult::default());
    let mgr = TransactionManager::new(Arc::new(driver), ConnectionMode::Pooled, false);

    let mut tx = mgr.open_transaction().await?;
    let first = tx
        .execute(&ExecutionRequest::statement("UPDATE t SET a = 1"))
        .await?;
    assert_eq!(first.rows_affected(), vec![1]);
    tx.execute(&ExecutionRequest::procedure("dbo.audit"))
        .await?;
    mgr.close_transaction(tx, false).await?;

    let calls = mgr.driver().calls();
    let begins = calls.iter().filter(|c| **c == Call::Begin).count();
    assert_eq!(begins, 1);
    assert_eq!(
        calls.iter().filter(|c| matches!(c, Call::Execute(_))).count(),
        2
    );
    Ok(())
}

#[tokio::test]
async fn failed_handle_rejects_later_requests() -> Result<(), Box<dyn std::error::Error>> {
    let driver = FakeDriver::new().fail_execute(DriverError::ExecutionError("boom".into()));
    let mgr = TransactionManager::new(Arc::new(driver), ConnectionMode::Pooled, false);

    let mut tx = mgr.open_transaction().await?;
    assert!(tx.execute(&ExecutionRequest::statement("SELECT 1")).await.is_err());
    assert_eq!(tx.state(), TxState::Error);

    let err = tx
        .execute(&ExecutionRequest::statement("SELECT 2"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransactionUnavailable);

    let err = mgr.close_transaction(tx, false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransactionUnavailable);
    assert!(!mgr.driver().calls().contains(&Call::Commit));
    Ok(())
}

#[tokio::test]
async fn dropping_an_open_handle_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let mgr = TransactionManager::new(Arc::new(FakeDriver::new()), ConnectionMode::Pooled, false);
    let tx = mgr.open_transaction().await?;
    drop(tx);

    // The rollback runs on a spawned task.
    for _ in 0..50 {
        if mgr.driver().calls().contains(&Call::Release) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let calls = mgr.driver().calls();
    assert_eq!(&calls[calls.len() - 2..], &[Call::Rollback, Call::Release]);
    Ok(())
}

#[tokio::test]
async fn explicit_abort_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let mgr = TransactionManager::new(Arc::new(FakeDriver::new()), ConnectionMode::Pooled, false);
    let mut tx = mgr.open_transaction().await?;
    tx.execute(&ExecutionRequest::statement("DELETE FROM t"))
        .await?;
    mgr.abort(tx).await?;

    let calls = mgr.driver().calls();
    assert!(!calls.contains(&Call::Commit));
    assert_eq!(&calls[calls.len() - 2..], &[Call::Rollback, Call::Release]);
    Ok(())
}

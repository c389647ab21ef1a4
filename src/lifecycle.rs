//! Transaction lifecycle: open, execute, commit or abort.
//!
//! A [`TxHandle`] owns the driver connection for exactly one transaction.
//! `commit` and `abort` consume it, so a finished transaction cannot be
//! reused. Any failure tears the connection down and closes every connection
//! the driver holds before the error is returned.

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::binder::BoundRequest;
use crate::dispatch::dispatch;
use crate::driver::Driver;
use crate::error::SqlTxnError;
use crate::request::ExecutionRequest;
use crate::results::NormalizedResult;
use crate::types::ConnectionMode;

/// Where a transaction handle is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxState {
    Idle,
    Connecting,
    Open,
    Committing,
    Closed,
    /// A step failed and the connection was torn down.
    Error,
    /// Rolled back on request.
    Aborted,
}

/// Opens transactions against one driver with a fixed connection mode.
pub struct TransactionManager<D: Driver> {
    driver: Arc<D>,
    mode: ConnectionMode,
    streaming: bool,
}

impl<D: Driver> std::fmt::Debug for TransactionManager<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("mode", &self.mode)
            .field("streaming", &self.streaming)
            .finish_non_exhaustive()
    }
}

impl<D: Driver + 'static> TransactionManager<D> {
    #[must_use]
    pub fn new(driver: Arc<D>, mode: ConnectionMode, streaming: bool) -> Self {
        Self {
            driver,
            mode,
            streaming,
        }
    }

    #[must_use]
    pub fn driver(&self) -> &Arc<D> {
        &self.driver
    }

    #[must_use]
    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    /// Check out (or open) a connection and begin a transaction on it.
    ///
    /// # Errors
    /// Returns `ConnectionFailed` if connecting or `BEGIN` fails; the driver's
    /// connections are closed first. There is no retry.
    pub async fn open_transaction(&self) -> Result<TxHandle<D>, SqlTxnError> {
        tracing::debug!(state = ?TxState::Connecting, mode = ?self.mode, "opening transaction");

        let mut conn = match self.driver.connect(self.mode).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "connect failed, closing driver connections");
                self.driver.close_all().await;
                return Err(SqlTxnError::ConnectionFailed(e));
            }
        };

        if let Err(e) = self.driver.begin(&mut conn).await {
            tracing::warn!(error = %e, "begin failed, closing driver connections");
            self.driver.release(conn).await;
            self.driver.close_all().await;
            return Err(SqlTxnError::ConnectionFailed(e));
        }

        tracing::debug!(state = ?TxState::Open, "transaction open");
        Ok(TxHandle {
            driver: Arc::clone(&self.driver),
            conn: Some(conn),
            mode: self.mode,
            streaming: self.streaming,
            state: TxState::Open,
        })
    }

    /// Commit `handle`. Afterwards the connection goes back to the pool, or
    /// every driver connection is closed when the mode is direct or
    /// `force_close` is set.
    ///
    /// # Errors
    /// Returns `CommitFailed` if the commit is rejected, or
    /// `TransactionUnavailable` if the handle already failed.
    pub async fn close_transaction(
        &self,
        handle: TxHandle<D>,
        force_close: bool,
    ) -> Result<(), SqlTxnError> {
        handle.commit(force_close).await
    }

    /// Roll `handle` back explicitly.
    ///
    /// # Errors
    /// Returns `RollbackFailed` if the rollback is rejected.
    pub async fn abort(&self, handle: TxHandle<D>) -> Result<(), SqlTxnError> {
        handle.abort().await
    }
}

/// One open transaction and the connection it runs on.
///
/// Dropping an open handle inside a tokio runtime spawns a rollback and
/// releases the connection; outside a runtime the connection is simply dropped.
pub struct TxHandle<D: Driver + 'static> {
    driver: Arc<D>,
    conn: Option<D::Connection>,
    mode: ConnectionMode,
    streaming: bool,
    state: TxState,
}

impl<D: Driver + 'static> std::fmt::Debug for TxHandle<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxHandle")
            .field("mode", &self.mode)
            .field("streaming", &self.streaming)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<D: Driver + 'static> TxHandle<D> {
    #[must_use]
    pub fn state(&self) -> TxState {
        self.state
    }

    #[must_use]
    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }

    /// Bind and run one request inside this transaction.
    ///
    /// # Errors
    /// Binding or execution errors. Either one tears the connection down and
    /// leaves the handle in [`TxState::Error`]; later calls return
    /// `TransactionUnavailable`.
    pub async fn execute(
        &mut self,
        request: &ExecutionRequest,
    ) -> Result<NormalizedResult, SqlTxnError> {
        self.ensure_open()?;
        match request.to_bound() {
            Ok(bound) => self.execute_bound(&bound).await,
            Err(e) => {
                self.teardown("binding failed").await;
                Err(e)
            }
        }
    }

    /// Run an already bound request inside this transaction.
    ///
    /// # Errors
    /// As [`TxHandle::execute`].
    pub async fn execute_bound(
        &mut self,
        request: &BoundRequest,
    ) -> Result<NormalizedResult, SqlTxnError> {
        self.ensure_open()?;
        let Some(conn) = self.conn.as_mut() else {
            return Err(unavailable(self.state));
        };

        match dispatch(self.driver.as_ref(), conn, request, self.streaming).await {
            Ok(result) => Ok(result),
            Err(e) => {
                self.teardown("execution failed").await;
                Err(e)
            }
        }
    }

    async fn commit(mut self, force_close: bool) -> Result<(), SqlTxnError> {
        self.ensure_open()?;
        let Some(mut conn) = self.conn.take() else {
            return Err(unavailable(self.state));
        };
        self.state = TxState::Committing;
        tracing::debug!(state = ?self.state, "committing transaction");

        if let Err(e) = self.driver.commit(&mut conn).await {
            tracing::warn!(error = %e, "commit failed, closing driver connections");
            self.driver.release(conn).await;
            self.driver.close_all().await;
            self.state = TxState::Error;
            return Err(SqlTxnError::CommitFailed(e));
        }

        self.driver.release(conn).await;
        if force_close || self.mode == ConnectionMode::Direct {
            tracing::debug!(force_close, mode = ?self.mode, "closing driver connections after commit");
            self.driver.close_all().await;
        }
        self.state = TxState::Closed;
        tracing::info!("transaction committed");
        Ok(())
    }

    async fn abort(mut self) -> Result<(), SqlTxnError> {
        self.ensure_open()?;
        let Some(mut conn) = self.conn.take() else {
            return Err(unavailable(self.state));
        };

        if let Err(e) = self.driver.rollback(&mut conn).await {
            tracing::warn!(error = %e, "rollback failed, closing driver connections");
            self.driver.release(conn).await;
            self.driver.close_all().await;
            self.state = TxState::Error;
            return Err(SqlTxnError::RollbackFailed(e));
        }

        self.driver.release(conn).await;
        if self.mode == ConnectionMode::Direct {
            self.driver.close_all().await;
        }
        self.state = TxState::Aborted;
        tracing::info!("transaction rolled back");
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), SqlTxnError> {
        if self.state == TxState::Open && self.conn.is_some() {
            Ok(())
        } else {
            Err(unavailable(self.state))
        }
    }

    async fn teardown(&mut self, reason: &'static str) {
        tracing::warn!(reason, "tearing down transaction connection");
        if let Some(conn) = self.conn.take() {
            self.driver.release(conn).await;
        }
        self.driver.close_all().await;
        self.state = TxState::Error;
    }
}

impl<D: Driver + 'static> Drop for TxHandle<D> {
    fn drop(&mut self) {
        if self.state == TxState::Open
            && let Some(mut conn) = self.conn.take()
            && let Ok(handle) = Handle::try_current()
        {
            let driver = Arc::clone(&self.driver);
            handle.spawn(async move {
                if let Err(e) = driver.rollback(&mut conn).await {
                    tracing::warn!(error = %e, "rollback of dropped transaction failed");
                }
                driver.release(conn).await;
            });
        }
    }
}

fn unavailable(state: TxState) -> SqlTxnError {
    SqlTxnError::TransactionUnavailable(format!("transaction is {state:?}, not open"))
}

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::driver::Driver;
use crate::error::SqlTxnError;
use crate::lifecycle::TransactionManager;
use crate::request::ExecutionRequest;
use crate::results::NormalizedResult;
use crate::types::ConnectionMode;

/// One-call entry point: open a transaction, run one request, commit.
///
/// ```rust,no_run
/// # #[cfg(feature = "mssql")]
/// # async fn demo() -> Result<(), sql_txn_middleware::SqlTxnError> {
/// use std::sync::Arc;
/// use sql_txn_middleware::prelude::*;
///
/// let cfg = MssqlTxnConfig::builder("localhost", "app", "sa", "secret").finish();
/// let runner = TxnRunner::from_config(Arc::new(MssqlDriver::new(cfg.clone())), &cfg);
/// let result = runner
///     .run_transaction(
///         &serde_json::json!({
///             "formato": 1,
///             "dados": {"executar": "SELECT @id AS id", "input": [["id", "Int", 1]]}
///         }),
///         false,
///     )
///     .await?;
/// println!("{}", runner.to_json(&result));
/// # Ok(())
/// # }
/// ```
pub struct TxnRunner<D: Driver + 'static> {
    manager: TransactionManager<D>,
    array_row_mode: bool,
}

impl<D: Driver + 'static> std::fmt::Debug for TxnRunner<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TxnRunner")
            .field("manager", &self.manager)
            .field("array_row_mode", &self.array_row_mode)
            .finish()
    }
}

impl<D: Driver + 'static> TxnRunner<D> {
    #[must_use]
    pub fn new(driver: Arc<D>, mode: ConnectionMode, streaming: bool) -> Self {
        Self {
            manager: TransactionManager::new(driver, mode, streaming),
            array_row_mode: false,
        }
    }

    /// Take connection mode, streaming and row layout from a config record.
    #[must_use]
    pub fn from_config(driver: Arc<D>, cfg: &crate::config::MssqlTxnConfig) -> Self {
        Self::new(driver, cfg.connection_type, cfg.stream).with_array_row_mode(cfg.array_row_mode)
    }

    #[must_use]
    pub fn with_array_row_mode(mut self, array_row_mode: bool) -> Self {
        self.array_row_mode = array_row_mode;
        self
    }

    #[must_use]
    pub fn manager(&self) -> &TransactionManager<D> {
        &self.manager
    }

    /// Parse `descriptor` and run it in its own transaction.
    ///
    /// # Errors
    /// Request validation errors are returned before any connection is made;
    /// after that, `ConnectionFailed`, `ExecutionFailed` or `CommitFailed`.
    pub async fn run_transaction(
        &self,
        descriptor: &JsonValue,
        force_close: bool,
    ) -> Result<NormalizedResult, SqlTxnError> {
        let request = ExecutionRequest::from_json(descriptor)?;
        self.run(request, force_close).await
    }

    /// Run a typed request in its own transaction.
    ///
    /// # Errors
    /// As [`TxnRunner::run_transaction`].
    pub async fn run(
        &self,
        request: ExecutionRequest,
        force_close: bool,
    ) -> Result<NormalizedResult, SqlTxnError> {
        let bound = request.to_bound()?;
        let mut tx = self.manager.open_transaction().await?;
        let result = tx.execute_bound(&bound).await?;
        self.manager.close_transaction(tx, force_close).await?;
        Ok(result)
    }

    /// Render `result` in the wire shape, honoring the configured row layout.
    #[must_use]
    pub fn to_json(&self, result: &NormalizedResult) -> JsonValue {
        result.to_json(self.array_row_mode)
    }
}

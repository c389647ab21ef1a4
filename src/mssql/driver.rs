use async_trait::async_trait;
use deadpool::managed::{Object, Pool};
use futures_util::{StreamExt, TryStreamExt};
use tiberius::{Query, QueryStream};
use tokio::sync::Mutex;

use super::batch::compose;
use super::client::{MssqlClient, build_tiberius_config, create_mssql_client, with_timeout};
use super::pool::MssqlManager;
use super::query::{ReadOptions, ResultAssembler};
use crate::binder::BoundRequest;
use crate::config::MssqlTxnConfig;
use crate::dispatch::partition_rows;
use crate::driver::{Driver, RawDriverResult, RowEventStream, StreamEvent, StreamSummary};
use crate::error::DriverError;
use crate::types::ConnectionMode;

/// A connection checked out for one transaction.
pub enum MssqlConnection {
    Pooled(Object<MssqlManager>),
    Direct(MssqlClient),
}

impl std::fmt::Debug for MssqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MssqlConnection::Pooled(_) => f.write_str("MssqlConnection::Pooled"),
            MssqlConnection::Direct(_) => f.write_str("MssqlConnection::Direct"),
        }
    }
}

impl MssqlConnection {
    pub fn client(&mut self) -> &mut MssqlClient {
        match self {
            MssqlConnection::Pooled(obj) => &mut **obj,
            MssqlConnection::Direct(client) => client,
        }
    }
}

/// [`Driver`] over tiberius.
///
/// The pool is created on first pooled checkout and dropped by
/// [`Driver::close_all`]; the next checkout builds a fresh one.
pub struct MssqlDriver {
    cfg: MssqlTxnConfig,
    tiberius: tiberius::Config,
    pool: Mutex<Option<Pool<MssqlManager>>>,
}

impl std::fmt::Debug for MssqlDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlDriver")
            .field("addr", &self.tiberius.get_addr())
            .field("database", &self.cfg.database)
            .finish_non_exhaustive()
    }
}

enum Phase<'a> {
    Reading(QueryStream<'a>, ResultAssembler),
    Finishing(StreamSummary),
    Finished,
}

impl MssqlDriver {
    /// No connection is made until the first transaction opens.
    #[must_use]
    pub fn new(cfg: MssqlTxnConfig) -> Self {
        let tiberius = build_tiberius_config(&cfg);
        Self {
            cfg,
            tiberius,
            pool: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &MssqlTxnConfig {
        &self.cfg
    }

    fn named_instance(&self) -> bool {
        !self.cfg.options.instance_name.is_empty()
    }

    fn read_options(&self) -> ReadOptions {
        ReadOptions {
            parse_json: self.cfg.parse_json,
            use_utc: self.cfg.options.use_utc,
        }
    }

    async fn pool(&self) -> Result<Pool<MssqlManager>, DriverError> {
        let mut guard = self.pool.lock().await;
        if let Some(pool) = guard.as_ref() {
            return Ok(pool.clone());
        }
        tracing::debug!(max = self.cfg.pool.max, "building SQL Server pool");
        let manager = MssqlManager::new(
            self.tiberius.clone(),
            self.named_instance(),
            self.cfg.connect_timeout(),
        );
        let pool = manager.build_pool(self.cfg.pool.max)?;
        *guard = Some(pool.clone());
        Ok(pool)
    }

    async fn run_simple(
        &self,
        conn: &mut MssqlConnection,
        operation: &'static str,
        sql: String,
    ) -> Result<(), DriverError> {
        let client = conn.client();
        with_timeout(operation, self.cfg.request_timeout(), async move {
            Query::new(sql).execute(client).await?;
            Ok::<_, DriverError>(())
        })
        .await
    }
}

#[async_trait]
impl Driver for MssqlDriver {
    type Connection = MssqlConnection;

    async fn connect(&self, mode: ConnectionMode) -> Result<MssqlConnection, DriverError> {
        match mode {
            ConnectionMode::Pooled => {
                let pool = self.pool().await?;
                let obj = with_timeout("pool checkout", self.cfg.connect_timeout(), async {
                    Ok::<_, DriverError>(pool.get().await?)
                })
                .await?;
                Ok(MssqlConnection::Pooled(obj))
            }
            ConnectionMode::Direct => {
                let client = create_mssql_client(
                    &self.tiberius,
                    self.named_instance(),
                    self.cfg.connect_timeout(),
                )
                .await?;
                Ok(MssqlConnection::Direct(client))
            }
        }
    }

    async fn begin(&self, conn: &mut MssqlConnection) -> Result<(), DriverError> {
        let mut sql = String::from("BEGIN TRANSACTION;");
        for stmt in self.cfg.session_statements() {
            sql.push(' ');
            sql.push_str(stmt);
            sql.push(';');
        }
        self.run_simple(conn, "begin", sql).await
    }

    async fn commit(&self, conn: &mut MssqlConnection) -> Result<(), DriverError> {
        self.run_simple(conn, "commit", "COMMIT TRANSACTION".to_string())
            .await
    }

    // XACT_ABORT may already have rolled the transaction back.
    async fn rollback(&self, conn: &mut MssqlConnection) -> Result<(), DriverError> {
        self.run_simple(
            conn,
            "rollback",
            "IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION".to_string(),
        )
        .await
    }

    async fn execute(
        &self,
        conn: &mut MssqlConnection,
        request: &BoundRequest,
    ) -> Result<RawDriverResult, DriverError> {
        let batch = compose(request)?;
        let opts = self.read_options();
        let client = conn.client();

        with_timeout("execute", self.cfg.request_timeout(), async move {
            let mut query = Query::new(batch.sql.as_str());
            for value in &batch.params {
                query.bind(*value);
            }
            let mut stream = query.query(client).await?;

            let mut asm = ResultAssembler::new(opts);
            let mut rows = Vec::new();
            while let Some(item) = stream.try_next().await? {
                if let Some(row) = asm.push(item)? {
                    rows.push(row);
                }
            }
            let (last, summary) = asm.finish()?;
            rows.extend(last);

            let counts = summary.rows_affected.unwrap_or_default();
            Ok::<_, DriverError>(RawDriverResult {
                recordsets: partition_rows(rows, &counts),
                rows_affected: counts,
                output: summary.output,
                return_value: summary.return_value,
            })
        })
        .await
    }

    /// The request timeout covers the server's first response; rows are then
    /// pulled at the caller's pace.
    async fn execute_stream<'a>(
        &'a self,
        conn: &'a mut MssqlConnection,
        request: &'a BoundRequest,
    ) -> Result<RowEventStream<'a>, DriverError> {
        let batch = compose(request)?;
        let asm = ResultAssembler::new(self.read_options());
        let client = conn.client();

        let inner = with_timeout("execute", self.cfg.request_timeout(), async move {
            let mut query = Query::new(batch.sql);
            for value in batch.params {
                query.bind(value);
            }
            Ok::<_, DriverError>(query.query(client).await?)
        })
        .await?;

        let events = futures_util::stream::unfold(Phase::Reading(inner, asm), |phase| async move {
            match phase {
                Phase::Reading(mut inner, mut asm) => loop {
                    match inner.try_next().await {
                        Ok(Some(item)) => match asm.push(item) {
                            Ok(Some(row)) => {
                                return Some((Ok(StreamEvent::Row(row)), Phase::Reading(inner, asm)));
                            }
                            Ok(None) => {}
                            Err(e) => return Some((Err(e), Phase::Finished)),
                        },
                        Ok(None) => {
                            return match asm.finish() {
                                Ok((Some(row), summary)) => {
                                    Some((Ok(StreamEvent::Row(row)), Phase::Finishing(summary)))
                                }
                                Ok((None, summary)) => {
                                    Some((Ok(StreamEvent::Done(summary)), Phase::Finished))
                                }
                                Err(e) => Some((Err(e), Phase::Finished)),
                            };
                        }
                        Err(e) => return Some((Err(DriverError::from(e)), Phase::Finished)),
                    }
                },
                Phase::Finishing(summary) => Some((Ok(StreamEvent::Done(summary)), Phase::Finished)),
                Phase::Finished => None,
            }
        });

        Ok(events.boxed())
    }

    async fn release(&self, conn: MssqlConnection) {
        match conn {
            MssqlConnection::Pooled(obj) => drop(obj),
            MssqlConnection::Direct(client) => {
                if let Err(e) = client.close().await {
                    tracing::warn!(error = %e, "closing direct SQL Server connection failed");
                }
            }
        }
    }

    async fn close_all(&self) {
        if let Some(pool) = self.pool.lock().await.take() {
            tracing::debug!("closing SQL Server pool");
            pool.close();
        }
    }
}

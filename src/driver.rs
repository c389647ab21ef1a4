//! The seam between the transaction engine and a database driver.
//!
//! The engine never touches sockets or pools itself; it drives a [`Driver`]
//! through connect → begin → execute → commit and asks it to tear everything
//! down on failure.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::binder::BoundRequest;
use crate::error::DriverError;
use crate::results::{CustomDbRow, Recordset};
use crate::types::{ConnectionMode, RowValues};

/// Everything one execution produced, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDriverResult {
    pub recordsets: Vec<Recordset>,
    /// One entry per statement.
    pub rows_affected: Vec<u64>,
    pub output: BTreeMap<String, RowValues>,
    pub return_value: Option<i64>,
}

/// Terminal summary of a streamed execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamSummary {
    /// Per-statement row counts; `None` when the driver cannot tell.
    pub rows_affected: Option<Vec<u64>>,
    pub output: BTreeMap<String, RowValues>,
    pub return_value: Option<i64>,
}

/// Items yielded by [`Driver::execute_stream`]. A well-formed stream ends with
/// exactly one `Done`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Row(CustomDbRow),
    Done(StreamSummary),
}

/// Row events borrowed from the connection for the lifetime of one execution.
pub type RowEventStream<'a> = BoxStream<'a, Result<StreamEvent, DriverError>>;

#[async_trait]
pub trait Driver: Send + Sync {
    /// A connection checked out for one transaction.
    type Connection: Send + 'static;

    /// Acquire a pooled connection or open a dedicated one.
    async fn connect(&self, mode: ConnectionMode) -> Result<Self::Connection, DriverError>;

    async fn begin(&self, conn: &mut Self::Connection) -> Result<(), DriverError>;

    async fn commit(&self, conn: &mut Self::Connection) -> Result<(), DriverError>;

    async fn rollback(&self, conn: &mut Self::Connection) -> Result<(), DriverError>;

    /// Run the bound statement or procedure and materialize every recordset.
    async fn execute(
        &self,
        conn: &mut Self::Connection,
        request: &BoundRequest,
    ) -> Result<RawDriverResult, DriverError>;

    /// Run the bound statement or procedure, yielding rows as they arrive.
    async fn execute_stream<'a>(
        &'a self,
        conn: &'a mut Self::Connection,
        request: &'a BoundRequest,
    ) -> Result<RowEventStream<'a>, DriverError>;

    /// Give the connection back: returned to the pool, or closed if dedicated.
    async fn release(&self, conn: Self::Connection);

    /// Close every connection the driver holds, including the pool.
    async fn close_all(&self);
}

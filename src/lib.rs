//! Transactional statement and stored-procedure runner for SQL Server.
//!
//! A request names either a literal T-SQL batch or a stored procedure, plus
//! input and output parameters described by type text such as
//! `"Decimal(18,2)"`. Each call runs in its own transaction and comes back as
//! one [`NormalizedResult`], whatever mix of recordsets, output values and
//! return status the server produced.

pub mod binder;
pub mod config;
pub mod dispatch;
pub mod driver;
pub mod error;
pub mod lifecycle;
pub mod prelude;
pub mod request;
pub mod results;
pub mod runner;
pub mod sanitize;
pub mod type_resolver;
pub mod types;

#[cfg(feature = "mssql")]
pub mod mssql;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use binder::{BoundRequest, OutputBinding, ParameterBinding, bind, bind_tuples};
pub use config::{MssqlPoolOptions, MssqlSessionOptions, MssqlTxnConfig, MssqlTxnConfigBuilder};
pub use dispatch::dispatch;
pub use driver::{Driver, RawDriverResult, RowEventStream, StreamEvent, StreamSummary};
pub use error::{DriverError, ErrorKind, SqlTxnError};
pub use lifecycle::{TransactionManager, TxHandle, TxState};
pub use request::ExecutionRequest;
pub use results::{CustomDbRow, NormalizedResult, Recordset, RecordsetShape, normalize};
pub use runner::TxnRunner;
pub use sanitize::{sanitize, sanitize_str};
pub use type_resolver::{ParamType, SqlType, TypeArg, TypeDescriptor, resolve_type};
pub use types::{ConnectionMode, ExecutionMode, RowValues};

#[cfg(feature = "mssql")]
pub use mssql::MssqlDriver;

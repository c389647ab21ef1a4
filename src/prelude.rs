//! Convenient imports for common functionality.
//!
//! This module re-exports the most commonly used types and functions
//! to make it easier to get started with the library.

pub use crate::binder::{OutputBinding, ParameterBinding};
pub use crate::config::{MssqlSessionOptions, MssqlTxnConfig};
pub use crate::driver::Driver;
pub use crate::error::{ErrorKind, SqlTxnError};
pub use crate::lifecycle::{TransactionManager, TxHandle};
pub use crate::request::ExecutionRequest;
pub use crate::results::{CustomDbRow, NormalizedResult, RecordsetShape};
pub use crate::runner::TxnRunner;
pub use crate::sanitize::{sanitize, sanitize_str};
pub use crate::types::{ConnectionMode, ExecutionMode, RowValues};

#[cfg(feature = "mssql")]
pub use crate::mssql::MssqlDriver;

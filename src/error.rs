use thiserror::Error;

/// Error domain reported with every structured failure.
pub const ERROR_DOMAIN: &str = "DB";

/// Code reported when the database did not supply its own error number.
pub const DEFAULT_ERROR_CODE: u32 = 500;

/// Failures raised by a [`Driver`](crate::driver::Driver) implementation.
#[derive(Debug, Error)]
pub enum DriverError {
    #[cfg(feature = "mssql")]
    #[error(transparent)]
    MssqlError(#[from] tiberius::error::Error),

    #[cfg(feature = "mssql")]
    #[error("SQL Server pool error: {0}")]
    PoolErrorMssql(#[from] deadpool::managed::PoolError<tiberius::error::Error>),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    #[error("{operation} timed out after {millis} ms")]
    Timeout { operation: &'static str, millis: u64 },

    #[error("Other database error: {0}")]
    Other(String),
}

impl DriverError {
    /// Server-side error number, when the database reported one.
    #[must_use]
    pub fn server_code(&self) -> Option<u32> {
        match self {
            #[cfg(feature = "mssql")]
            DriverError::MssqlError(e) => e.code(),
            _ => None,
        }
    }
}

/// Kind tag for [`SqlTxnError`], stable across message wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidParameterShape,
    InvalidParameterType,
    InvalidParameterName,
    InvalidExecutionMode,
    MalformedRequest,
    ExecutionFailed,
    ConnectionFailed,
    CommitFailed,
    RollbackFailed,
    TransactionUnavailable,
    ConfigError,
}

#[derive(Debug, Error)]
pub enum SqlTxnError {
    #[error("Invalid parameter shape: {0}")]
    InvalidParameterShape(String),

    #[error("Invalid parameter type: {0}")]
    InvalidParameterType(String),

    #[error("Invalid parameter name: {0}")]
    InvalidParameterName(String),

    #[error("Invalid execution mode: {0}")]
    InvalidExecutionMode(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("SQL execution failed: {0}")]
    ExecutionFailed(#[source] DriverError),

    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] DriverError),

    #[error("Commit failed: {0}")]
    CommitFailed(#[source] DriverError),

    #[error("Rollback failed: {0}")]
    RollbackFailed(#[source] DriverError),

    #[error("Transaction is no longer usable: {0}")]
    TransactionUnavailable(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl SqlTxnError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SqlTxnError::InvalidParameterShape(_) => ErrorKind::InvalidParameterShape,
            SqlTxnError::InvalidParameterType(_) => ErrorKind::InvalidParameterType,
            SqlTxnError::InvalidParameterName(_) => ErrorKind::InvalidParameterName,
            SqlTxnError::InvalidExecutionMode(_) => ErrorKind::InvalidExecutionMode,
            SqlTxnError::MalformedRequest(_) => ErrorKind::MalformedRequest,
            SqlTxnError::ExecutionFailed(_) => ErrorKind::ExecutionFailed,
            SqlTxnError::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            SqlTxnError::CommitFailed(_) => ErrorKind::CommitFailed,
            SqlTxnError::RollbackFailed(_) => ErrorKind::RollbackFailed,
            SqlTxnError::TransactionUnavailable(_) => ErrorKind::TransactionUnavailable,
            SqlTxnError::ConfigError(_) => ErrorKind::ConfigError,
        }
    }

    /// Numeric code: the server's error number for driver failures that carry
    /// one, [`DEFAULT_ERROR_CODE`] otherwise.
    #[must_use]
    pub fn code(&self) -> u32 {
        self.driver_error()
            .and_then(DriverError::server_code)
            .unwrap_or(DEFAULT_ERROR_CODE)
    }

    #[must_use]
    pub fn domain(&self) -> &'static str {
        ERROR_DOMAIN
    }

    /// The underlying driver failure, for the kinds that wrap one.
    #[must_use]
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            SqlTxnError::ExecutionFailed(e)
            | SqlTxnError::ConnectionFailed(e)
            | SqlTxnError::CommitFailed(e)
            | SqlTxnError::RollbackFailed(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_errors_use_default_code() {
        let err = SqlTxnError::InvalidParameterShape("[a, b, c, d]".into());
        assert_eq!(err.kind(), ErrorKind::InvalidParameterShape);
        assert_eq!(err.code(), DEFAULT_ERROR_CODE);
        assert_eq!(err.domain(), "DB");
        assert!(err.to_string().contains("[a, b, c, d]"));
    }

    #[test]
    fn driver_errors_are_exposed() {
        let err = SqlTxnError::ConnectionFailed(DriverError::ConnectionError("refused".into()));
        assert_eq!(err.kind(), ErrorKind::ConnectionFailed);
        assert!(matches!(
            err.driver_error(),
            Some(DriverError::ConnectionError(msg)) if msg == "refused"
        ));
        assert_eq!(err.code(), DEFAULT_ERROR_CODE);
    }
}

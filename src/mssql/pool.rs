use std::fmt;
use std::future::Future;
use std::time::Duration;

use deadpool::managed::{Manager, Metrics, Pool, RecycleError, RecycleResult};

use super::client::{MssqlClient, create_mssql_client};
use crate::error::DriverError;

/// Manager for SQL Server connections (used with Deadpool)
pub struct MssqlManager {
    config: tiberius::Config,
    named_instance: bool,
    connect_timeout: Duration,
}

impl fmt::Debug for MssqlManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MssqlManager")
            .field("addr", &self.config.get_addr())
            .field("named_instance", &self.named_instance)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl MssqlManager {
    #[must_use]
    pub fn new(config: tiberius::Config, named_instance: bool, connect_timeout: Duration) -> Self {
        Self {
            config,
            named_instance,
            connect_timeout,
        }
    }

    /// Build a pool from this manager.
    ///
    /// # Errors
    /// Returns `DriverError::ConnectionError` if pool creation fails.
    pub fn build_pool(self, max_size: usize) -> Result<Pool<MssqlManager>, DriverError> {
        Pool::builder(self)
            .max_size(max_size.max(1))
            .build()
            .map_err(|e| {
                DriverError::ConnectionError(format!("Failed to create SQL Server pool: {e}"))
            })
    }
}

impl Manager for MssqlManager {
    type Type = MssqlClient;
    type Error = tiberius::error::Error;

    #[allow(clippy::manual_async_fn)]
    fn create(&self) -> impl Future<Output = Result<Self::Type, Self::Error>> + Send {
        async move {
            create_mssql_client(&self.config, self.named_instance, self.connect_timeout)
                .await
                .map_err(|e| match e {
                    DriverError::MssqlError(inner) => inner,
                    other => tiberius::error::Error::Io {
                        kind: std::io::ErrorKind::Other,
                        message: other.to_string(),
                    },
                })
        }
    }

    // A connection dropped mid-transaction comes back with @@TRANCOUNT > 0.
    #[allow(clippy::manual_async_fn)]
    fn recycle(
        &self,
        client: &mut Self::Type,
        _metrics: &Metrics,
    ) -> impl Future<Output = RecycleResult<Self::Error>> + Send {
        async move {
            tiberius::Query::new("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION")
                .execute(client)
                .await
                .map(|_| ())
                .map_err(RecycleError::Backend)
        }
    }
}

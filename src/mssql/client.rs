use std::future::Future;
use std::time::Duration;

use tiberius::{AuthMethod, Client, Config, EncryptionLevel, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use crate::config::MssqlTxnConfig;
use crate::error::DriverError;

/// Type alias for SQL Server client
pub type MssqlClient = Client<Compat<TcpStream>>;

/// Translate a config record into tiberius connection settings.
#[must_use]
pub fn build_tiberius_config(cfg: &MssqlTxnConfig) -> Config {
    let mut config = Config::new();
    config.host(&cfg.server);
    config.database(&cfg.database);
    config.port(cfg.port);
    config.authentication(AuthMethod::sql_server(&cfg.user, &cfg.password));
    if !cfg.options.instance_name.is_empty() {
        config.instance_name(&cfg.options.instance_name);
    }
    config.encryption(if cfg.options.encrypt {
        EncryptionLevel::Required
    } else {
        EncryptionLevel::Off
    });
    if cfg.options.trust_server_certificate {
        config.trust_cert();
    }
    config
}

/// Open a dedicated client: TCP connect (through SQL Browser for named
/// instances) plus login, bounded by `timeout`.
///
/// # Errors
/// Returns `DriverError::Timeout` when the deadline passes,
/// `DriverError::ConnectionError` for socket failures and
/// `DriverError::MssqlError` when the server rejects the login.
pub async fn create_mssql_client(
    config: &Config,
    named_instance: bool,
    timeout: Duration,
) -> Result<MssqlClient, DriverError> {
    with_timeout("connect", timeout, async {
        let tcp = if named_instance {
            TcpStream::connect_named(config).await?
        } else {
            TcpStream::connect(config.get_addr())
                .await
                .map_err(|e| DriverError::ConnectionError(format!("TCP connection error: {e}")))?
        };
        tcp.set_nodelay(true)
            .map_err(|e| DriverError::ConnectionError(format!("TCP setup error: {e}")))?;

        Ok::<_, DriverError>(Client::connect(config.clone(), tcp.compat_write()).await?)
    })
    .await
}

/// Run `fut` with a deadline of `timeout`; zero means no deadline.
///
/// # Errors
/// `DriverError::Timeout` naming `operation`, or whatever `fut` returns.
pub async fn with_timeout<T, F>(
    operation: &'static str,
    timeout: Duration,
    fut: F,
) -> Result<T, DriverError>
where
    F: Future<Output = Result<T, DriverError>>,
{
    if timeout.is_zero() {
        return fut.await;
    }
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| DriverError::Timeout {
            operation,
            millis: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_translation() {
        let cfg = MssqlTxnConfig::builder("db.local", "app", "sa", "pw")
            .port(14330)
            .finish();
        let config = build_tiberius_config(&cfg);
        assert_eq!(config.get_addr(), "db.local:14330");
    }

    #[tokio::test]
    async fn timeout_is_reported() {
        let err = with_timeout("execute", Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, DriverError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            DriverError::Timeout {
                operation: "execute",
                millis: 5
            }
        ));
    }

    #[tokio::test]
    async fn zero_timeout_waits() {
        let value = with_timeout("execute", Duration::ZERO, async { Ok::<_, DriverError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}

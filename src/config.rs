//! Connection and execution settings for the SQL Server driver.
//!
//! A config record can be built fluently or loaded from JSON using the
//! camelCase field names below; every field has a default, so `{}` is a valid
//! (if not very useful) document.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value as JsonValue;

use crate::error::SqlTxnError;
use crate::types::ConnectionMode;

/// Session and transport options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MssqlSessionOptions {
    /// Issue `SET XACT_ABORT ON` after `BEGIN TRANSACTION`.
    pub abort_transaction_on_error: bool,
    /// Issue `SET ARITHABORT ON` after `BEGIN TRANSACTION`.
    pub enable_arith_abort: bool,
    /// Convert `datetimeoffset` values to UTC instead of local wall time.
    #[serde(rename = "useUTC")]
    pub use_utc: bool,
    pub encrypt: bool,
    pub trust_server_certificate: bool,
    /// Named instance; empty means the default instance.
    pub instance_name: String,
}

impl Default for MssqlSessionOptions {
    fn default() -> Self {
        Self {
            abort_transaction_on_error: true,
            enable_arith_abort: true,
            use_utc: false,
            encrypt: false,
            trust_server_certificate: false,
            instance_name: String::new(),
        }
    }
}

/// Pool sizing. Only `max` bounds the pool; `min` and `idle_timeout_millis` are
/// carried for callers that inspect the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MssqlPoolOptions {
    pub max: usize,
    pub min: usize,
    pub idle_timeout_millis: u64,
}

impl Default for MssqlPoolOptions {
    fn default() -> Self {
        Self {
            max: 10,
            min: 0,
            idle_timeout_millis: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MssqlTxnConfig {
    #[serde(deserialize_with = "connection_type")]
    pub connection_type: ConnectionMode,
    pub user: String,
    pub password: String,
    pub server: String,
    pub port: u16,
    pub database: String,
    /// Milliseconds allowed for TCP connect, login and pool checkout.
    pub connection_timeout: u64,
    /// Milliseconds allowed for each statement round trip.
    pub request_timeout: u64,
    /// Collect rows through the streaming path.
    pub stream: bool,
    /// Serialize rows as arrays instead of objects.
    pub array_row_mode: bool,
    /// Parse `FOR JSON` output into JSON values.
    #[serde(rename = "parseJSON")]
    pub parse_json: bool,
    pub options: MssqlSessionOptions,
    pub pool: MssqlPoolOptions,
}

impl Default for MssqlTxnConfig {
    fn default() -> Self {
        Self {
            connection_type: ConnectionMode::Pooled,
            user: String::new(),
            password: String::new(),
            server: "localhost".to_string(),
            port: 1433,
            database: String::new(),
            connection_timeout: 15_000,
            request_timeout: 15_000,
            stream: false,
            array_row_mode: false,
            parse_json: true,
            options: MssqlSessionOptions::default(),
            pool: MssqlPoolOptions::default(),
        }
    }
}

impl MssqlTxnConfig {
    #[must_use]
    pub fn builder(
        server: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> MssqlTxnConfigBuilder {
        MssqlTxnConfigBuilder::new(server, database, user, password)
    }

    /// Load a config record from JSON text.
    ///
    /// # Errors
    /// Returns `ConfigError` if the text is not valid JSON or a field has the
    /// wrong type.
    pub fn from_json_str(text: &str) -> Result<Self, SqlTxnError> {
        serde_json::from_str(text)
            .map_err(|e| SqlTxnError::ConfigError(format!("invalid config record: {e}")))
    }

    /// Load a config record from an already parsed JSON value.
    ///
    /// # Errors
    /// Returns `ConfigError` if a field has the wrong type.
    pub fn from_json(value: JsonValue) -> Result<Self, SqlTxnError> {
        serde_json::from_value(value)
            .map_err(|e| SqlTxnError::ConfigError(format!("invalid config record: {e}")))
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout)
    }

    /// Statements issued right after `BEGIN TRANSACTION`.
    #[must_use]
    pub fn session_statements(&self) -> Vec<&'static str> {
        let mut stmts = Vec::new();
        if self.options.abort_transaction_on_error {
            stmts.push("SET XACT_ABORT ON");
        }
        if self.options.enable_arith_abort {
            stmts.push("SET ARITHABORT ON");
        }
        stmts
    }
}

/// Fluent builder for [`MssqlTxnConfig`].
#[derive(Debug, Clone)]
pub struct MssqlTxnConfigBuilder {
    cfg: MssqlTxnConfig,
}

impl MssqlTxnConfigBuilder {
    #[must_use]
    pub fn new(
        server: impl Into<String>,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            cfg: MssqlTxnConfig {
                server: server.into(),
                database: database.into(),
                user: user.into(),
                password: password.into(),
                ..MssqlTxnConfig::default()
            },
        }
    }

    #[must_use]
    pub fn connection_mode(mut self, mode: ConnectionMode) -> Self {
        self.cfg.connection_type = mode;
        self
    }

    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.cfg.port = port;
        self
    }

    #[must_use]
    pub fn instance_name(mut self, instance_name: impl Into<String>) -> Self {
        self.cfg.options.instance_name = instance_name.into();
        self
    }

    #[must_use]
    pub fn connection_timeout(mut self, millis: u64) -> Self {
        self.cfg.connection_timeout = millis;
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, millis: u64) -> Self {
        self.cfg.request_timeout = millis;
        self
    }

    #[must_use]
    pub fn stream(mut self, stream: bool) -> Self {
        self.cfg.stream = stream;
        self
    }

    #[must_use]
    pub fn array_row_mode(mut self, array_row_mode: bool) -> Self {
        self.cfg.array_row_mode = array_row_mode;
        self
    }

    #[must_use]
    pub fn parse_json(mut self, parse_json: bool) -> Self {
        self.cfg.parse_json = parse_json;
        self
    }

    #[must_use]
    pub fn encrypt(mut self, encrypt: bool) -> Self {
        self.cfg.options.encrypt = encrypt;
        self
    }

    #[must_use]
    pub fn trust_server_certificate(mut self, trust: bool) -> Self {
        self.cfg.options.trust_server_certificate = trust;
        self
    }

    #[must_use]
    pub fn use_utc(mut self, use_utc: bool) -> Self {
        self.cfg.options.use_utc = use_utc;
        self
    }

    #[must_use]
    pub fn session_options(mut self, options: MssqlSessionOptions) -> Self {
        self.cfg.options = options;
        self
    }

    #[must_use]
    pub fn pool_max(mut self, max: usize) -> Self {
        self.cfg.pool.max = max;
        self
    }

    #[must_use]
    pub fn finish(self) -> MssqlTxnConfig {
        self.cfg
    }
}

// Accepts the numeric form (1 pooled, 2 direct) as well as the enum name.
fn connection_type<'de, D: Deserializer<'de>>(de: D) -> Result<ConnectionMode, D::Error> {
    match JsonValue::deserialize(de)? {
        JsonValue::Number(n) => n
            .as_i64()
            .map(ConnectionMode::from_code)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid connectionType {n}"))),
        JsonValue::String(s) => match s.to_ascii_lowercase().as_str() {
            "pooled" | "1" => Ok(ConnectionMode::Pooled),
            "direct" | "2" => Ok(ConnectionMode::Direct),
            _ => Err(serde::de::Error::custom(format!("invalid connectionType {s:?}"))),
        },
        JsonValue::Null => Ok(ConnectionMode::Pooled),
        other => Err(serde::de::Error::custom(format!(
            "invalid connectionType {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn empty_document_uses_defaults() {
        let cfg = MssqlTxnConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, MssqlTxnConfig::default());
        assert_eq!(cfg.port, 1433);
        assert_eq!(cfg.connection_timeout, 15_000);
        assert!(cfg.parse_json);
        assert!(cfg.options.abort_transaction_on_error);
        assert_eq!(cfg.pool.max, 10);
        assert_eq!(cfg.pool.idle_timeout_millis, 30_000);
    }

    #[test]
    fn camel_case_record() {
        let cfg = MssqlTxnConfig::from_json_str(
            r#"{
                "connectionType": 2,
                "user": "sa",
                "password": "pw",
                "server": "db.local",
                "database": "app",
                "requestTimeout": 500,
                "arrayRowMode": true,
                "parseJSON": false,
                "options": {"useUTC": true, "encrypt": true, "instanceName": "SQLEXPRESS"},
                "pool": {"max": 3}
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.connection_type, ConnectionMode::Direct);
        assert_eq!(cfg.request_timeout(), Duration::from_millis(500));
        assert!(cfg.array_row_mode);
        assert!(!cfg.parse_json);
        assert!(cfg.options.use_utc);
        assert!(cfg.options.encrypt);
        assert!(cfg.options.enable_arith_abort);
        assert_eq!(cfg.options.instance_name, "SQLEXPRESS");
        assert_eq!(cfg.pool.max, 3);
        assert_eq!(cfg.pool.min, 0);
    }

    #[test]
    fn connection_type_by_name() {
        let cfg = MssqlTxnConfig::from_json_str(r#"{"connectionType": "Direct"}"#).unwrap();
        assert_eq!(cfg.connection_type, ConnectionMode::Direct);
        let cfg = MssqlTxnConfig::from_json_str(r#"{"connectionType": 1}"#).unwrap();
        assert_eq!(cfg.connection_type, ConnectionMode::Pooled);
    }

    #[test]
    fn wrong_types_are_config_errors() {
        let err = MssqlTxnConfig::from_json_str(r#"{"port": "x"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
        let err = MssqlTxnConfig::from_json_str(r#"{"connectionType": "sometimes"}"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigError);
    }

    #[test]
    fn builder_and_session_statements() {
        let cfg = MssqlTxnConfig::builder("srv", "db", "u", "p")
            .port(14330)
            .connection_mode(ConnectionMode::Direct)
            .session_options(MssqlSessionOptions {
                abort_transaction_on_error: false,
                ..MssqlSessionOptions::default()
            })
            .finish();
        assert_eq!(cfg.server, "srv");
        assert_eq!(cfg.port, 14330);
        assert_eq!(cfg.session_statements(), vec!["SET ARITHABORT ON"]);
        assert_eq!(
            MssqlTxnConfig::default().session_statements(),
            vec!["SET XACT_ABORT ON", "SET ARITHABORT ON"]
        );
    }
}

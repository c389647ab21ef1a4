use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value as JsonValue;

/// Values that can be bound as parameters or read back from a row.
///
/// The same enum is used for input bindings, output parameters and recordset
/// cells, so callers never branch on driver types:
/// ```rust
/// use sql_txn_middleware::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        match self {
            RowValues::Int(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RowValues::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Numeric view; integers are widened.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            RowValues::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            RowValues::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    /// Build a value from caller-supplied JSON.
    ///
    /// Integral numbers become `Int`, other numbers `Float`; arrays and objects
    /// are kept as `JSON` and bound as their serialized text.
    #[must_use]
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => RowValues::Null,
            JsonValue::Bool(b) => RowValues::Bool(*b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => RowValues::Int(i),
                None => RowValues::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => RowValues::Text(s.clone()),
            JsonValue::Array(_) | JsonValue::Object(_) => RowValues::JSON(value.clone()),
        }
    }

    /// Render this value as JSON for result payloads.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            RowValues::Int(i) => JsonValue::from(*i),
            RowValues::Float(f) => JsonValue::from(*f),
            RowValues::Text(s) => JsonValue::String(s.clone()),
            RowValues::Bool(b) => JsonValue::Bool(*b),
            RowValues::Timestamp(dt) => {
                JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.3f").to_string())
            }
            RowValues::Null => JsonValue::Null,
            RowValues::JSON(value) => value.clone(),
            RowValues::Blob(bytes) => {
                JsonValue::Array(bytes.iter().map(|b| JsonValue::from(*b)).collect())
            }
        }
    }
}

impl Serialize for RowValues {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// How the lifecycle manager obtains a connection for each transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
pub enum ConnectionMode {
    /// Check a connection out of the shared pool (the default).
    #[default]
    Pooled,
    /// Open a dedicated connection for one call and close it afterwards.
    Direct,
}

impl ConnectionMode {
    /// Map the numeric `connectionType` used in configuration records
    /// (`2` = direct, anything else = pooled).
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        if code == 2 {
            ConnectionMode::Direct
        } else {
            ConnectionMode::Pooled
        }
    }
}

/// Whether the request text is a literal batch or the name of a stored procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Literal SQL text (`formato: 1`)
    Statement,
    /// Named stored procedure (`formato: 2`)
    StoredProcedure,
}

impl ExecutionMode {
    /// Resolve the wire code; anything other than 1 or 2 is unrecognized.
    #[must_use]
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(ExecutionMode::Statement),
            2 => Some(ExecutionMode::StoredProcedure),
            _ => None,
        }
    }

    #[must_use]
    pub fn code(self) -> i64 {
        match self {
            ExecutionMode::Statement => 1,
            ExecutionMode::StoredProcedure => 2,
        }
    }
}

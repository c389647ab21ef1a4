//! Caller-facing request descriptor.
//!
//! The wire shape is
//! `{ "formato": 1 | 2, "dados": { "executar": "...", "input": [...], "output": [...] } }`
//! where `formato` 1 is a literal statement and 2 a stored procedure.

use serde_json::Value as JsonValue;

use crate::binder::{
    BoundRequest, OutputBinding, ParameterBinding, bind, input_from_tuple, output_from_tuple,
};
use crate::error::SqlTxnError;
use crate::types::ExecutionMode;

/// A fully typed request ready for binding.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub mode: ExecutionMode,
    pub inputs: Vec<ParameterBinding>,
    pub outputs: Vec<OutputBinding>,
    /// SQL text or procedure name.
    pub text: String,
}

impl ExecutionRequest {
    #[must_use]
    pub fn statement(text: impl Into<String>) -> Self {
        Self {
            mode: ExecutionMode::Statement,
            inputs: Vec::new(),
            outputs: Vec::new(),
            text: text.into(),
        }
    }

    #[must_use]
    pub fn procedure(name: impl Into<String>) -> Self {
        Self {
            mode: ExecutionMode::StoredProcedure,
            inputs: Vec::new(),
            outputs: Vec::new(),
            text: name.into(),
        }
    }

    #[must_use]
    pub fn input(mut self, binding: ParameterBinding) -> Self {
        self.inputs.push(binding);
        self
    }

    #[must_use]
    pub fn output(mut self, binding: OutputBinding) -> Self {
        self.outputs.push(binding);
        self
    }

    /// Parse the JSON descriptor.
    ///
    /// # Errors
    /// - `MalformedRequest` when `formato`/`dados` or `dados.executar` is missing
    ///   (or `executar` is not a string, or `input`/`output` are not arrays)
    /// - `InvalidExecutionMode` when `formato` is not 1 or 2
    /// - `InvalidParameterShape` for input/output tuples of the wrong arity
    pub fn from_json(descriptor: &JsonValue) -> Result<Self, SqlTxnError> {
        let (Some(formato), Some(dados)) = (descriptor.get("formato"), descriptor.get("dados"))
        else {
            return Err(SqlTxnError::MalformedRequest(
                "Format and/or data not correctly defined in the JSON parameters".to_string(),
            ));
        };

        let text = match dados.get("executar") {
            Some(JsonValue::String(text)) => text.clone(),
            Some(other) => {
                return Err(SqlTxnError::MalformedRequest(format!(
                    "Execute must be a string, got {other}"
                )));
            }
            None => {
                return Err(SqlTxnError::MalformedRequest(
                    "Execute not correctly defined in the JSON parameters".to_string(),
                ));
            }
        };

        let inputs = tuples(dados, "input")?
            .iter()
            .map(input_from_tuple)
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = tuples(dados, "output")?
            .iter()
            .map(output_from_tuple)
            .collect::<Result<Vec<_>, _>>()?;

        let mode = format_code(formato)
            .and_then(ExecutionMode::from_code)
            .ok_or_else(|| {
                SqlTxnError::InvalidExecutionMode(format!(
                    "Format {formato} not correctly defined in the JSON parameters, it only works with the following values: 1 (local queries) or 2 (stored procedure)"
                ))
            })?;

        Ok(Self {
            mode,
            inputs,
            outputs,
            text,
        })
    }

    /// Resolve every binding into a request the dispatcher can run.
    ///
    /// # Errors
    /// Returns the binder's `InvalidParameterType` / `InvalidParameterName`.
    pub fn to_bound(&self) -> Result<BoundRequest, SqlTxnError> {
        let mut bound = BoundRequest::new(self.mode, self.text.clone());
        bind(&mut bound, &self.inputs, &self.outputs)?;
        Ok(bound)
    }
}

// JSON numbers compare by value: `1.0` is the same format as `1`. Strings are
// never coerced.
#[allow(clippy::cast_possible_truncation)]
fn format_code(formato: &JsonValue) -> Option<i64> {
    formato.as_i64().or_else(|| {
        formato
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() <= 2.0_f64.powi(53))
            .map(|f| f as i64)
    })
}

fn tuples<'a>(dados: &'a JsonValue, key: &str) -> Result<&'a [JsonValue], SqlTxnError> {
    match dados.get(key) {
        None | Some(JsonValue::Null) => Ok(&[]),
        Some(JsonValue::Array(items)) => Ok(items.as_slice()),
        Some(other) => Err(SqlTxnError::MalformedRequest(format!(
            "{key} must be an array of tuples, got {other}"
        ))),
    }
}

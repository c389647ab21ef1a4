//! Attaches typed input and output bindings to a pending request.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value as JsonValue;

use crate::error::SqlTxnError;
use crate::type_resolver::{ParamType, resolve_type};
use crate::types::{ExecutionMode, RowValues};

static PARAM_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid parameter name regex"));

static TYPE_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("valid type literal regex"));

/// One input parameter as the caller described it.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterBinding {
    /// Bound by value; the driver picks the type.
    Untyped { name: String, value: RowValues },
    /// Bound with an explicit type descriptor such as `"Decimal(18,2)"`.
    Typed {
        name: String,
        type_text: String,
        value: RowValues,
    },
}

impl ParameterBinding {
    #[must_use]
    pub fn untyped(name: impl Into<String>, value: RowValues) -> Self {
        ParameterBinding::Untyped {
            name: name.into(),
            value,
        }
    }

    #[must_use]
    pub fn typed(name: impl Into<String>, type_text: impl Into<String>, value: RowValues) -> Self {
        ParameterBinding::Typed {
            name: name.into(),
            type_text: type_text.into(),
            value,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            ParameterBinding::Untyped { name, .. } | ParameterBinding::Typed { name, .. } => name,
        }
    }
}

/// One output parameter: a name and its type descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputBinding {
    pub name: String,
    pub type_text: String,
}

impl OutputBinding {
    #[must_use]
    pub fn new(name: impl Into<String>, type_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_text: type_text.into(),
        }
    }
}

/// An input attached to a request. `param_type` is `None` for untyped bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundInput {
    pub name: String,
    pub param_type: Option<ParamType>,
    pub value: RowValues,
}

/// An output parameter attached to a request.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundOutput {
    pub name: String,
    pub param_type: ParamType,
}

/// A request being prepared for one execution on a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundRequest {
    pub mode: ExecutionMode,
    /// SQL text or procedure name.
    pub text: String,
    pub inputs: Vec<BoundInput>,
    pub outputs: Vec<BoundOutput>,
}

impl BoundRequest {
    #[must_use]
    pub fn new(mode: ExecutionMode, text: impl Into<String>) -> Self {
        Self {
            mode,
            text: text.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn input(&mut self, name: impl Into<String>, param_type: Option<ParamType>, value: RowValues) {
        self.inputs.push(BoundInput {
            name: name.into(),
            param_type,
            value,
        });
    }

    pub fn output(&mut self, name: impl Into<String>, param_type: ParamType) {
        self.outputs.push(BoundOutput {
            name: name.into(),
            param_type,
        });
    }
}

/// Resolve and attach every input and output binding to `request`.
///
/// # Errors
/// Returns `InvalidParameterType` when a type descriptor is not in the catalog
/// (or carries an unsafe literal argument) and `InvalidParameterName` when a
/// name is not a plain identifier. Bindings attached before the failing one stay
/// on the request.
pub fn bind(
    request: &mut BoundRequest,
    inputs: &[ParameterBinding],
    outputs: &[OutputBinding],
) -> Result<(), SqlTxnError> {
    for binding in inputs {
        match binding {
            ParameterBinding::Typed {
                name,
                type_text,
                value,
            } => {
                let name = check_name(name)?;
                let param_type = resolve_param_type(type_text, "query input")?;
                request.input(name, Some(param_type), value.clone());
            }
            ParameterBinding::Untyped { name, value } => {
                let name = check_name(name)?;
                request.input(name, None, value.clone());
            }
        }
    }

    for binding in outputs {
        let name = check_name(&binding.name)?;
        let param_type = resolve_param_type(&binding.type_text, "query output")?;
        request.output(name, param_type);
    }

    Ok(())
}

/// Like [`bind`], but for raw JSON tuples: `[name, value]` / `[name, type, value]`
/// inputs and `[name, type]` outputs.
///
/// # Errors
/// Returns `InvalidParameterShape` for tuples of the wrong length, plus every
/// error [`bind`] can return.
pub fn bind_tuples(
    request: &mut BoundRequest,
    inputs: &[JsonValue],
    outputs: &[JsonValue],
) -> Result<(), SqlTxnError> {
    let inputs = inputs
        .iter()
        .map(input_from_tuple)
        .collect::<Result<Vec<_>, _>>()?;
    let outputs = outputs
        .iter()
        .map(output_from_tuple)
        .collect::<Result<Vec<_>, _>>()?;
    bind(request, &inputs, &outputs)
}

/// Build the tagged binding for one JSON input tuple.
///
/// # Errors
/// Returns `InvalidParameterShape` unless the tuple is an array of 2 or 3
/// elements whose first element is a string.
pub fn input_from_tuple(tuple: &JsonValue) -> Result<ParameterBinding, SqlTxnError> {
    let invalid = || {
        SqlTxnError::InvalidParameterShape(format!(
            "Format {{ {tuple} }} is invalid (query input), requires two or three keys depending on the calling model"
        ))
    };
    let items = tuple.as_array().ok_or_else(invalid)?;
    match items.as_slice() {
        [name, value] => Ok(ParameterBinding::untyped(
            name.as_str().ok_or_else(invalid)?,
            RowValues::from_json(value),
        )),
        [name, type_text, value] => Ok(ParameterBinding::typed(
            name.as_str().ok_or_else(invalid)?,
            type_text_of(type_text),
            RowValues::from_json(value),
        )),
        _ => Err(invalid()),
    }
}

/// Build the output binding for one JSON output tuple.
///
/// # Errors
/// Returns `InvalidParameterShape` unless the tuple is a `[name, type]` array.
pub fn output_from_tuple(tuple: &JsonValue) -> Result<OutputBinding, SqlTxnError> {
    let invalid = || {
        SqlTxnError::InvalidParameterShape(format!(
            "Format {{ {tuple} }} is invalid (query output), requires two keys"
        ))
    };
    match tuple.as_array().map(Vec::as_slice) {
        Some([name, type_text]) => Ok(OutputBinding::new(
            name.as_str().ok_or_else(invalid)?,
            type_text_of(type_text),
        )),
        _ => Err(invalid()),
    }
}

// Non-string descriptors are coerced to text (null to empty) and then fail the
// catalog lookup like any other unknown type.
fn type_text_of(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

fn check_name(name: &str) -> Result<&str, SqlTxnError> {
    let bare = name.strip_prefix('@').unwrap_or(name);
    if PARAM_NAME.is_match(bare) {
        Ok(bare)
    } else {
        Err(SqlTxnError::InvalidParameterName(format!(
            "{name:?} is not a valid parameter name"
        )))
    }
}

fn resolve_param_type(type_text: &str, context: &str) -> Result<ParamType, SqlTxnError> {
    let not_found = || {
        SqlTxnError::InvalidParameterType(format!(
            "{type_text} data type defined ({context}) was not found in method, please correct or notify an administrator"
        ))
    };
    let param_type = resolve_type(type_text).to_param_type().ok_or_else(not_found)?;
    if param_type.literal_args().any(|lit| !TYPE_LITERAL.is_match(lit)) {
        return Err(not_found());
    }
    Ok(param_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::type_resolver::{SqlType, TypeArg};
    use serde_json::json;

    fn pending() -> BoundRequest {
        BoundRequest::new(ExecutionMode::StoredProcedure, "sp_test")
    }

    #[test]
    fn binds_typed_untyped_and_outputs() {
        let mut req = pending();
        bind(
            &mut req,
            &[
                ParameterBinding::typed("id", "Int", RowValues::Int(7)),
                ParameterBinding::typed("@amount", "Decimal(10,2)", RowValues::Float(1.5)),
                ParameterBinding::untyped("note", RowValues::Text("x".into())),
            ],
            &[OutputBinding::new("total", "Decimal(10,2)")],
        )
        .unwrap();

        assert_eq!(req.inputs.len(), 3);
        assert_eq!(req.inputs[0].param_type, Some(ParamType::bare(SqlType::Int)));
        assert_eq!(req.inputs[1].name, "amount");
        assert_eq!(
            req.inputs[1].param_type,
            Some(ParamType::parametric(
                SqlType::Decimal,
                vec![TypeArg::Number(10.0), TypeArg::Number(2.0)]
            ))
        );
        assert_eq!(req.inputs[2].param_type, None);
        assert_eq!(req.outputs[0].name, "total");
    }

    #[test]
    fn unknown_input_type_is_rejected() {
        let mut req = pending();
        let err = bind(
            &mut req,
            &[ParameterBinding::typed("id", "Integer", RowValues::Int(1))],
            &[],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameterType);
        assert!(err.to_string().contains("Integer"));
    }

    #[test]
    fn unknown_output_type_is_rejected() {
        let mut req = pending();
        let err = bind(&mut req, &[], &[OutputBinding::new("total", "Decimal2")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameterType);
    }

    #[test]
    fn unsafe_literal_argument_is_rejected() {
        let mut req = pending();
        let err = bind(
            &mut req,
            &[ParameterBinding::typed(
                "x",
                "VarChar(10, x; DROP TABLE t)",
                RowValues::Null,
            )],
            &[],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameterType);
    }

    #[test]
    fn bad_names_are_rejected() {
        let mut req = pending();
        let err = bind(
            &mut req,
            &[ParameterBinding::untyped("id; --", RowValues::Int(1))],
            &[],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameterName);
    }

    #[test]
    fn tuple_shapes() {
        assert_eq!(
            input_from_tuple(&json!(["id", 5])).unwrap(),
            ParameterBinding::untyped("id", RowValues::Int(5))
        );
        assert_eq!(
            input_from_tuple(&json!(["id", "Int", 5])).unwrap(),
            ParameterBinding::typed("id", "Int", RowValues::Int(5))
        );
        let err = input_from_tuple(&json!(["id", "Int", 5, 6])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameterShape);
        assert!(err.to_string().contains(r#"["id","Int",5,6]"#));

        let err = output_from_tuple(&json!(["total"])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameterShape);
    }

    #[test]
    fn untyped_tuple_binds_raw_value() {
        let mut req = pending();
        bind_tuples(&mut req, &[json!(["flag", true])], &[]).unwrap();
        assert_eq!(req.inputs[0].param_type, None);
        assert_eq!(req.inputs[0].value, RowValues::Bool(true));
    }

    #[test]
    fn numeric_type_text_is_coerced_and_rejected() {
        let mut req = pending();
        let err = bind_tuples(&mut req, &[json!(["id", 5, 1])], &[]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameterType);
    }
}

//! Composes the T-SQL batch sent for one bound request.
//!
//! Every input becomes a declared variable initialised from a positional
//! parameter (`@P1`, `@P2`, ...), so the caller's text can refer to inputs by
//! name. Output parameters and a procedure's return value are read back via a
//! trailing single-row SELECT whose first column is [`OUTPUT_MARKER`].

use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;

use super::params::inferred_type;
use crate::binder::BoundRequest;
use crate::error::DriverError;
use crate::types::{ExecutionMode, RowValues};

/// First column of the recordset that carries output values.
pub const OUTPUT_MARKER: &str = "__sqltx_output";

/// Column (and variable) holding a procedure's return status.
pub const RETURN_COLUMN: &str = "__sqltx_return";

// One to four dot-separated parts, each a plain or bracketed identifier.
static PROCEDURE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:\[[^\[\]]+\]|[A-Za-z_#][A-Za-z0-9_@#$]*)(?:\.(?:\[[^\[\]]+\]|[A-Za-z_][A-Za-z0-9_@#$]*)){0,3}$",
    )
    .expect("valid procedure name regex")
});

// Names tiberius reserves for positional parameters.
static POSITIONAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[Pp][0-9]+$").expect("valid positional name regex"));

/// SQL text plus the values for its positional parameters, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<'a> {
    pub sql: String,
    pub params: Vec<&'a RowValues>,
    /// Whether the batch ends with the output recordset.
    pub reads_outputs: bool,
}

/// Build the batch for `request`.
///
/// # Errors
/// Returns `ExecutionError` for a procedure name that is not a (possibly
/// qualified) identifier, or for a parameter named like a positional one.
pub fn compose(request: &BoundRequest) -> Result<Batch<'_>, DriverError> {
    for name in request
        .inputs
        .iter()
        .map(|i| i.name.as_str())
        .chain(request.outputs.iter().map(|o| o.name.as_str()))
    {
        if POSITIONAL.is_match(name) || name.eq_ignore_ascii_case(RETURN_COLUMN) {
            return Err(DriverError::ExecutionError(format!(
                "parameter name @{name} is reserved"
            )));
        }
    }

    let mut sql = String::new();
    let mut params = Vec::with_capacity(request.inputs.len());

    for (idx, input) in request.inputs.iter().enumerate() {
        let decl = input
            .param_type
            .as_ref()
            .map_or_else(|| inferred_type(&input.value).declaration(), |t| t.declaration());
        let _ = writeln!(sql, "DECLARE @{} {decl} = @P{};", input.name, idx + 1);
        params.push(&input.value);
    }
    for output in &request.outputs {
        let _ = writeln!(sql, "DECLARE @{} {};", output.name, output.param_type.declaration());
    }

    let reads_outputs = match request.mode {
        ExecutionMode::Statement => {
            sql.push_str(&request.text);
            if request.outputs.is_empty() {
                false
            } else {
                sql.push_str("\n;");
                push_output_select(&mut sql, request, false);
                true
            }
        }
        ExecutionMode::StoredProcedure => {
            let name = request.text.trim();
            if !PROCEDURE_NAME.is_match(name) {
                return Err(DriverError::ExecutionError(format!(
                    "{name:?} is not a valid procedure name"
                )));
            }
            let _ = writeln!(sql, "DECLARE @{RETURN_COLUMN} INT;");
            let _ = write!(sql, "EXEC @{RETURN_COLUMN} = {name}");
            let args = request
                .inputs
                .iter()
                .map(|i| format!("@{0} = @{0}", i.name))
                .chain(
                    request
                        .outputs
                        .iter()
                        .map(|o| format!("@{0} = @{0} OUTPUT", o.name)),
                )
                .collect::<Vec<_>>();
            if !args.is_empty() {
                sql.push(' ');
                sql.push_str(&args.join(", "));
            }
            sql.push_str(";\n");
            push_output_select(&mut sql, request, true);
            true
        }
    };

    Ok(Batch {
        sql,
        params,
        reads_outputs,
    })
}

fn push_output_select(sql: &mut String, request: &BoundRequest, with_return: bool) {
    let _ = write!(sql, "SELECT N'{OUTPUT_MARKER}' AS [{OUTPUT_MARKER}]");
    if with_return {
        let _ = write!(sql, ", @{RETURN_COLUMN} AS [{RETURN_COLUMN}]");
    }
    for output in &request.outputs {
        let _ = write!(sql, ", @{0} AS [{0}]", output.name);
    }
    sql.push(';');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_resolver::{ParamType, SqlType, TypeArg};

    #[test]
    fn plain_statement_is_sent_as_is() {
        let req = BoundRequest::new(ExecutionMode::Statement, "SELECT 1 AS one");
        let batch = compose(&req).unwrap();
        assert_eq!(batch.sql, "SELECT 1 AS one");
        assert!(batch.params.is_empty());
        assert!(!batch.reads_outputs);
    }

    #[test]
    fn statement_with_inputs_and_outputs() {
        let mut req = BoundRequest::new(ExecutionMode::Statement, "SET @total = @a * 2");
        req.input("a", Some(ParamType::bare(SqlType::Int)), RowValues::Int(21));
        req.input("note", None, RowValues::Text("x".into()));
        req.output(
            "total",
            ParamType::parametric(
                SqlType::Decimal,
                vec![TypeArg::Number(10.0), TypeArg::Number(2.0)],
            ),
        );

        let batch = compose(&req).unwrap();
        assert_eq!(
            batch.sql,
            "DECLARE @a INT = @P1;\n\
             DECLARE @note NVARCHAR(MAX) = @P2;\n\
             DECLARE @total DECIMAL(10,2);\n\
             SET @total = @a * 2\n\
             ;SELECT N'__sqltx_output' AS [__sqltx_output], @total AS [total];"
        );
        assert_eq!(batch.params, vec![&RowValues::Int(21), &RowValues::Text("x".into())]);
        assert!(batch.reads_outputs);
    }

    #[test]
    fn procedure_call_reads_return_value() {
        let mut req = BoundRequest::new(ExecutionMode::StoredProcedure, "dbo.sp_test");
        req.input("id", Some(ParamType::bare(SqlType::Int)), RowValues::Int(7));
        req.output("msg", ParamType::bare(SqlType::NVarChar));

        let batch = compose(&req).unwrap();
        assert_eq!(
            batch.sql,
            "DECLARE @id INT = @P1;\n\
             DECLARE @msg NVARCHAR(MAX);\n\
             DECLARE @__sqltx_return INT;\n\
             EXEC @__sqltx_return = dbo.sp_test @id = @id, @msg = @msg OUTPUT;\n\
             SELECT N'__sqltx_output' AS [__sqltx_output], @__sqltx_return AS [__sqltx_return], @msg AS [msg];"
        );
    }

    #[test]
    fn procedure_without_parameters() {
        let req = BoundRequest::new(ExecutionMode::StoredProcedure, "[dbo].[sp list]");
        let batch = compose(&req).unwrap();
        assert!(batch.sql.contains("EXEC @__sqltx_return = [dbo].[sp list];\n"));
    }

    #[test]
    fn rejects_unsafe_procedure_names() {
        for name in ["sp_x; DROP TABLE t", "a.b.c.d.e", "", "sp x"] {
            let req = BoundRequest::new(ExecutionMode::StoredProcedure, name);
            assert!(compose(&req).is_err(), "{name}");
        }
    }

    #[test]
    fn rejects_positional_names() {
        let mut req = BoundRequest::new(ExecutionMode::Statement, "SELECT @P1");
        req.input("P1", None, RowValues::Int(1));
        assert!(compose(&req).is_err());
    }
}

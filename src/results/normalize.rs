use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value as JsonValue};

use super::row::{CustomDbRow, Recordset};
use crate::driver::RawDriverResult;
use crate::types::RowValues;

/// Recordsets in the shape callers see.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordsetShape {
    /// Exactly one statement produced exactly one recordset.
    Single {
        recordset: Recordset,
        rows_affected: u64,
    },
    /// Anything else: zero or several recordsets, kept as the driver gave them.
    Multiple {
        recordsets: Vec<Recordset>,
        rows_affected: Vec<u64>,
    },
}

/// Uniform result of one execution.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResult {
    pub recordsets: RecordsetShape,
    /// Output parameters; `None` when the call produced none.
    pub output: Option<BTreeMap<String, RowValues>>,
    /// Procedure return code; `None` when absent or zero.
    pub return_value: Option<i64>,
}

/// Reshape a driver result.
///
/// The singular shape is used only when both the recordset list and the
/// rows-affected list have exactly one entry; mismatched lengths fall through to
/// the plural shape. A zero return value is treated as absent.
#[must_use]
pub fn normalize(raw: RawDriverResult) -> NormalizedResult {
    let RawDriverResult {
        mut recordsets,
        rows_affected,
        output,
        return_value,
    } = raw;

    let shape = if rows_affected.len() == 1 && recordsets.len() == 1 {
        RecordsetShape::Single {
            recordset: recordsets.pop().unwrap_or_default(),
            rows_affected: rows_affected[0],
        }
    } else {
        RecordsetShape::Multiple {
            recordsets,
            rows_affected,
        }
    };

    NormalizedResult {
        recordsets: shape,
        output: (!output.is_empty()).then_some(output),
        return_value: return_value.filter(|rv| *rv != 0),
    }
}

impl NormalizedResult {
    /// The single recordset, when the result has the singular shape.
    #[must_use]
    pub fn recordset(&self) -> Option<&Recordset> {
        match &self.recordsets {
            RecordsetShape::Single { recordset, .. } => Some(recordset),
            RecordsetShape::Multiple { .. } => None,
        }
    }

    /// All recordsets regardless of shape.
    #[must_use]
    pub fn all_recordsets(&self) -> Vec<&Recordset> {
        match &self.recordsets {
            RecordsetShape::Single { recordset, .. } => vec![recordset],
            RecordsetShape::Multiple { recordsets, .. } => recordsets.iter().collect(),
        }
    }

    /// Per-statement row counts regardless of shape.
    #[must_use]
    pub fn rows_affected(&self) -> Vec<u64> {
        match &self.recordsets {
            RecordsetShape::Single { rows_affected, .. } => vec![*rows_affected],
            RecordsetShape::Multiple { rows_affected, .. } => rows_affected.clone(),
        }
    }

    #[must_use]
    pub fn output_value(&self, name: &str) -> Option<&RowValues> {
        self.output.as_ref().and_then(|out| out.get(name))
    }

    /// Render the wire shape: `recordset`/`rowsAffected` or
    /// `recordsets`/`rowsAffected`, plus `output` and `returnValue` when present.
    ///
    /// With `array_rows` set, each row is a positional array instead of an object.
    #[must_use]
    pub fn to_json(&self, array_rows: bool) -> JsonValue {
        let render_row = |row: &CustomDbRow| {
            if array_rows {
                row.to_json_array()
            } else {
                row.to_json_object()
            }
        };
        let render_set = |set: &Recordset| JsonValue::Array(set.iter().map(render_row).collect());

        let mut map = Map::new();
        match &self.recordsets {
            RecordsetShape::Single {
                recordset,
                rows_affected,
            } => {
                map.insert("recordset".into(), render_set(recordset));
                map.insert("rowsAffected".into(), JsonValue::from(*rows_affected));
            }
            RecordsetShape::Multiple {
                recordsets,
                rows_affected,
            } => {
                map.insert(
                    "recordsets".into(),
                    JsonValue::Array(recordsets.iter().map(render_set).collect()),
                );
                map.insert("rowsAffected".into(), JsonValue::from(rows_affected.clone()));
            }
        }

        if let Some(output) = &self.output {
            let out = output
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect::<Map<_, _>>();
            map.insert("output".into(), JsonValue::Object(out));
        }
        if let Some(rv) = self.return_value {
            map.insert("returnValue".into(), JsonValue::from(rv));
        }

        JsonValue::Object(map)
    }
}

impl Serialize for NormalizedResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json(false).serialize(serializer)
    }
}

//! Turns a tiberius result stream into rows, per-recordset counts and output
//! values.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use tiberius::{ColumnData, FromSql, QueryItem, Row};

use super::batch::{OUTPUT_MARKER, RETURN_COLUMN};
use crate::driver::StreamSummary;
use crate::error::DriverError;
use crate::results::CustomDbRow;
use crate::results::row::build_index;
use crate::types::RowValues;

/// Column name SQL Server gives `FOR JSON` output.
pub const JSON_COLUMN: &str = "JSON_F52E2B61-18A1-11d1-B105-00805F49916B";

/// How cell values are read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    pub parse_json: bool,
    pub use_utc: bool,
}

#[derive(Debug)]
enum SetKind {
    Rows,
    Outputs,
    Json(String),
}

/// Incremental reader over [`QueryItem`]s.
///
/// Rows come out one at a time; output-marker recordsets are absorbed into
/// the summary, and `FOR JSON` chunks are joined into a single row when their
/// recordset ends.
#[derive(Debug)]
pub struct ResultAssembler {
    opts: ReadOptions,
    columns: Arc<Vec<String>>,
    index: Arc<HashMap<String, usize>>,
    kind: SetKind,
    counts: Vec<u64>,
    output: BTreeMap<String, RowValues>,
    return_value: Option<i64>,
}

impl ResultAssembler {
    #[must_use]
    pub fn new(opts: ReadOptions) -> Self {
        Self {
            opts,
            columns: Arc::new(Vec::new()),
            index: Arc::new(HashMap::new()),
            kind: SetKind::Rows,
            counts: Vec::new(),
            output: BTreeMap::new(),
            return_value: None,
        }
    }

    /// Feed one item; returns the row to emit, if any.
    ///
    /// # Errors
    /// Returns `ExecutionError` if a `FOR JSON` result is not valid JSON.
    pub fn push(&mut self, item: QueryItem) -> Result<Option<CustomDbRow>, DriverError> {
        match item {
            QueryItem::Metadata(meta) => {
                let names = meta
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect();
                let flushed = self.flush_json()?;
                self.start_set(names);
                Ok(flushed)
            }
            QueryItem::Row(row) => self.push_row(row),
        }
    }

    fn start_set(&mut self, names: Vec<String>) {
        self.kind = if names.first().is_some_and(|n| n == OUTPUT_MARKER) {
            SetKind::Outputs
        } else if self.opts.parse_json && names.len() == 1 && names[0] == JSON_COLUMN {
            SetKind::Json(String::new())
        } else {
            SetKind::Rows
        };
        if !matches!(self.kind, SetKind::Outputs) {
            self.counts.push(0);
        }
        self.index = Arc::new(build_index(&names));
        self.columns = Arc::new(names);
    }

    fn push_row(&mut self, row: Row) -> Result<Option<CustomDbRow>, DriverError> {
        let values = row
            .into_iter()
            .map(|cell| to_row_value(cell, self.opts.use_utc))
            .collect::<Vec<_>>();

        match &mut self.kind {
            SetKind::Rows => {
                if let Some(count) = self.counts.last_mut() {
                    *count += 1;
                }
                Ok(Some(CustomDbRow::with_cache(
                    Arc::clone(&self.columns),
                    Arc::clone(&self.index),
                    values,
                )))
            }
            SetKind::Json(buf) => {
                if let Some(RowValues::Text(chunk)) = values.first() {
                    buf.push_str(chunk);
                }
                Ok(None)
            }
            SetKind::Outputs => {
                for (name, value) in self.columns.iter().zip(values).skip(1) {
                    if name == RETURN_COLUMN {
                        self.return_value = value.as_int().copied();
                    } else {
                        self.output.insert(name.clone(), value);
                    }
                }
                Ok(None)
            }
        }
    }

    fn flush_json(&mut self) -> Result<Option<CustomDbRow>, DriverError> {
        let SetKind::Json(buf) = std::mem::replace(&mut self.kind, SetKind::Rows) else {
            return Ok(None);
        };
        if buf.is_empty() {
            return Ok(None);
        }
        let parsed = serde_json::from_str(&buf).map_err(|e| {
            DriverError::ExecutionError(format!("FOR JSON result is not valid JSON: {e}"))
        })?;
        if let Some(count) = self.counts.last_mut() {
            *count += 1;
        }
        Ok(Some(CustomDbRow::new(
            Arc::clone(&self.columns),
            vec![RowValues::JSON(parsed)],
        )))
    }

    /// Close the last recordset and hand back whatever it still held.
    ///
    /// # Errors
    /// As [`ResultAssembler::push`].
    pub fn finish(mut self) -> Result<(Option<CustomDbRow>, StreamSummary), DriverError> {
        let last = self.flush_json()?;
        Ok((
            last,
            StreamSummary {
                rows_affected: Some(self.counts),
                output: self.output,
                return_value: self.return_value,
            },
        ))
    }
}

/// Convert one cell. Date and time types become timestamps (a bare time on
/// 1970-01-01); `datetimeoffset` is shifted to UTC when `use_utc` is set and
/// kept at its own offset's wall time otherwise.
#[must_use]
pub fn to_row_value(cell: ColumnData<'static>, use_utc: bool) -> RowValues {
    let value = match &cell {
        ColumnData::U8(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I16(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I32(v) => v.map(|v| RowValues::Int(i64::from(v))),
        ColumnData::I64(v) => v.map(RowValues::Int),
        ColumnData::F32(v) => v.map(|v| RowValues::Float(f64::from(v))),
        ColumnData::F64(v) => v.map(RowValues::Float),
        ColumnData::Bit(v) => v.map(RowValues::Bool),
        ColumnData::String(v) => v.as_ref().map(|s| RowValues::Text(s.to_string())),
        ColumnData::Guid(v) => v.map(|g| RowValues::Text(g.to_string())),
        ColumnData::Binary(v) => v.as_ref().map(|b| RowValues::Blob(b.to_vec())),
        ColumnData::Numeric(v) => v.map(|n| RowValues::Float(f64::from(n))),
        ColumnData::Xml(v) => v.as_ref().map(|x| RowValues::Text(x.to_string())),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            NaiveDateTime::from_sql(&cell)
                .ok()
                .flatten()
                .map(RowValues::Timestamp)
        }
        ColumnData::Date(_) => NaiveDate::from_sql(&cell)
            .ok()
            .flatten()
            .map(|d| RowValues::Timestamp(d.and_time(NaiveTime::default()))),
        ColumnData::Time(_) => NaiveTime::from_sql(&cell).ok().flatten().map(|t| {
            RowValues::Timestamp(NaiveDateTime::new(NaiveDate::default(), t))
        }),
        ColumnData::DateTimeOffset(_) => DateTime::<FixedOffset>::from_sql(&cell)
            .ok()
            .flatten()
            .map(|dt| {
                RowValues::Timestamp(if use_utc {
                    dt.naive_utc()
                } else {
                    dt.naive_local()
                })
            }),
    };
    value.unwrap_or(RowValues::Null)
}

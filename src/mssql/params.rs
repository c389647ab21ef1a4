use std::borrow::Cow;

use tiberius::{ColumnData, IntoSql};

use crate::type_resolver::{ParamType, SqlType, TypeArg};
use crate::types::RowValues;

/// Bind a [`RowValues`] by reference; text and binary are borrowed, not copied.
impl<'a> IntoSql<'a> for &'a RowValues {
    fn into_sql(self) -> ColumnData<'a> {
        match self {
            RowValues::Int(i) => ColumnData::I64(Some(*i)),
            RowValues::Float(f) => ColumnData::F64(Some(*f)),
            RowValues::Text(s) => ColumnData::String(Some(Cow::Borrowed(s.as_str()))),
            RowValues::Bool(b) => ColumnData::Bit(Some(*b)),
            RowValues::Timestamp(dt) => (*dt).into_sql(),
            RowValues::Null => ColumnData::String(None),
            RowValues::JSON(jsval) => ColumnData::String(Some(Cow::Owned(jsval.to_string()))),
            RowValues::Blob(bytes) => ColumnData::Binary(Some(Cow::Borrowed(bytes.as_slice()))),
        }
    }
}

/// Declared type for an input bound without one, picked from its value.
#[must_use]
pub fn inferred_type(value: &RowValues) -> ParamType {
    match value {
        RowValues::Int(_) => ParamType::bare(SqlType::BigInt),
        RowValues::Float(_) => ParamType::bare(SqlType::Float),
        RowValues::Bool(_) => ParamType::bare(SqlType::Bit),
        RowValues::Timestamp(_) => ParamType::bare(SqlType::DateTime2),
        RowValues::Blob(_) => ParamType::parametric(SqlType::VarBinary, vec![TypeArg::Max]),
        RowValues::Text(_) | RowValues::Null | RowValues::JSON(_) => {
            ParamType::parametric(SqlType::NVarChar, vec![TypeArg::Max])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn values_map_to_column_data() {
        let text = RowValues::Text("abc".into());
        assert!(matches!((&text).into_sql(), ColumnData::String(Some(s)) if s == "abc"));
        assert!(matches!((&RowValues::Null).into_sql(), ColumnData::String(None)));
        assert!(matches!((&RowValues::Int(4)).into_sql(), ColumnData::I64(Some(4))));

        let ts = RowValues::Timestamp(
            NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(3, 4, 5)
                .unwrap(),
        );
        assert!(matches!((&ts).into_sql(), ColumnData::DateTime2(Some(_))));
    }

    #[test]
    fn inferred_declarations() {
        assert_eq!(inferred_type(&RowValues::Int(1)).declaration(), "BIGINT");
        assert_eq!(inferred_type(&RowValues::Null).declaration(), "NVARCHAR(MAX)");
        assert_eq!(
            inferred_type(&RowValues::Blob(vec![1])).declaration(),
            "VARBINARY(MAX)"
        );
    }
}

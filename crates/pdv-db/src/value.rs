//! JSON values in and out of SQLite for the generic `query` / `execute`
//! surface.
//!
//! ```text
//!   parameter (serde_json)          SQLite             row value (serde_json)
//!   ──────────────────────          ──────             ──────────────────────
//!   null                      ──►   NULL       ──►     null
//!   true / false              ──►   INTEGER    ──►     1 / 0
//!   integer                   ──►   INTEGER    ──►     number
//!   float                     ──►   REAL       ──►     number
//!   string                    ──►   TEXT       ──►     string
//!   array / object            ──►   TEXT (json)
//!                                   BLOB       ──►     array of bytes
//! ```

use serde_json::{Map, Number, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row as _, TypeInfo, ValueRef};

use crate::error::{DbError, DbResult};
use crate::pool::SqliteQuery;

/// One result row: column name to value.
pub type Row = Map<String, Value>;

/// Binds JSON parameters positionally.
pub(crate) fn bind_all<'q>(mut query: SqliteQuery<'q>, params: &[Value]) -> DbResult<SqliteQuery<'q>> {
    for (position, param) in params.iter().enumerate() {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(i64::from(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    query.bind(i)
                } else if let Some(f) = n.as_f64() {
                    query.bind(f)
                } else {
                    return Err(DbError::UnsupportedParameter {
                        position: position + 1,
                        reason: format!("number {n} does not fit in i64 or f64"),
                    });
                }
            }
            Value::String(s) => query.bind(s.clone()),
            Value::Array(_) | Value::Object(_) => query.bind(param.to_string()),
        };
    }
    Ok(query)
}

/// Converts a SQLite row into a JSON object using each value's storage class.
pub(crate) fn decode_row(row: &SqliteRow) -> DbResult<Row> {
    let mut out = Map::with_capacity(row.columns().len());

    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(index)?),
                "REAL" => Number::from_f64(row.try_get_unchecked::<f64, _>(index)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "BLOB" => Value::from(row.try_get_unchecked::<Vec<u8>, _>(index)?),
                _ => Value::String(row.try_get_unchecked::<String, _>(index)?),
            }
        };
        out.insert(column.name().to_string(), value);
    }

    Ok(out)
}

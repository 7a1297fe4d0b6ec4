//! Small helpers for building multi-row statements.

use rusqlite::Row;
use rusqlite::types::{Type, Value as SqlValue};
use std::str::FromStr;

/// Rows per multi-row statement. Keeps every statement well under SQLite's
/// bound-parameter limit for the widest table (7 columns).
pub(crate) const MAX_ROWS_PER_STATEMENT: usize = 500;

/// `?, ?, ?` for `n` parameters.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// `(?, ?), (?, ?)` for `rows` tuples of `cols` parameters.
pub(crate) fn row_placeholders(rows: usize, cols: usize) -> String {
    let row = format!("({})", placeholders(cols));
    vec![row; rows].join(", ")
}

pub(crate) fn text<T: ToString>(v: T) -> SqlValue {
    SqlValue::Text(v.to_string())
}

pub(crate) fn opt_text<T: ToString>(v: Option<T>) -> SqlValue {
    v.map_or(SqlValue::Null, text)
}

/// Reads a UUID-backed id stored as text.
pub(crate) fn id_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = uuid::Error>,
{
    let s: String = row.get(idx)?;
    s.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Reads a nullable UUID-backed id stored as text.
pub(crate) fn opt_id_at<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = uuid::Error>,
{
    let s: Option<String> = row.get(idx)?;
    s.map(|s| {
        s.parse()
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_shapes() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(row_placeholders(2, 2), "(?, ?), (?, ?)");
    }
}

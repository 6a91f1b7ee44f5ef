//! SQL text rendering
//!
//! Statements are handed to the orchestrator as plain text, so every value is
//! rendered as an SQLite literal here rather than bound as a parameter.

use stowage_core::{ColumnKind, ExError, ExErrorKind, Value};

use crate::errors::Result;

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escape text for use inside a single-quoted SQL string
pub fn sanitize(text: &str) -> String {
    text.replace('\'', "''")
}

/// Render a value as an SQLite literal
///
/// Booleans become 0/1, timestamps epoch nanoseconds and blobs `X'..'`.
/// Text holding NUL cannot be written as a quoted string, so it is cast from
/// its UTF-8 bytes instead.
///
/// # Errors
///
/// `InvalidInput` for a timestamp outside the nanosecond range (1677 to 2262).
pub fn literal(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(v) => v.to_string(),
        Value::Real(v) if v.is_nan() => "NULL".to_string(),
        Value::Real(v) if v.is_infinite() => {
            if v.is_sign_positive() {
                "9e999".to_string()
            } else {
                "-9e999".to_string()
            }
        }
        Value::Real(v) => format!("{:?}", v),
        Value::Text(s) if s.contains('\0') => {
            format!("CAST(X'{}' AS TEXT)", hex::encode_upper(s.as_bytes()))
        }
        Value::Text(s) => format!("'{}'", sanitize(s)),
        Value::Boolean(b) => i64::from(*b).to_string(),
        Value::Blob(bytes) => format!("X'{}'", hex::encode_upper(bytes)),
        Value::Timestamp(ts) => ts
            .timestamp_nanos_opt()
            .ok_or_else(|| {
                ExError::new(ExErrorKind::InvalidInput)
                    .with_message(format!("Timestamp {} cannot be stored in nanoseconds", ts))
            })?
            .to_string(),
    })
}

/// Declared SQLite type of a column kind
pub fn column_type(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Integer | ColumnKind::Boolean | ColumnKind::Timestamp => "INTEGER",
        ColumnKind::Real => "REAL",
        ColumnKind::Text => "TEXT",
        ColumnKind::Blob => "BLOB",
    }
}

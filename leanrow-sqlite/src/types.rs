//! Conversions between leanrow values and SQLite values.

use leanrow_query::{ColumnType, Value};
use rusqlite::types::{Value as SqliteValue, ValueRef};

/// Convert a bound parameter to a SQLite value.
///
/// Booleans become 0/1 and JSON is stored as text. Lists are expanded into
/// placeholders before they reach the driver; one that gets here is stored
/// as a JSON array.
pub fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Int(i) => SqliteValue::Integer(*i),
        Value::Float(f) => SqliteValue::Real(*f),
        Value::String(s) => SqliteValue::Text(s.clone()),
        Value::Bytes(b) => SqliteValue::Blob(b.clone()),
        Value::Json(j) => SqliteValue::Text(j.to_string()),
        Value::List(_) => SqliteValue::Text(value.to_json().to_string()),
    }
}

/// Map a declared column type to a [`ColumnType`], following SQLite's
/// affinity rules. Booleans and JSON are recognised by name.
pub fn column_type(decl_type: Option<&str>) -> ColumnType {
    let Some(decl) = decl_type else {
        return ColumnType::Unknown;
    };
    let decl = decl.to_ascii_uppercase();

    if decl.starts_with("BOOL") {
        ColumnType::Bool
    } else if decl.starts_with("JSON") {
        ColumnType::Json
    } else if decl.contains("INT") {
        ColumnType::Int
    } else if decl.contains("CHAR") || decl.contains("CLOB") || decl.contains("TEXT") {
        ColumnType::Text
    } else if decl.contains("BLOB") {
        ColumnType::Bytes
    } else if decl.contains("REAL") || decl.contains("FLOA") || decl.contains("DOUB") {
        ColumnType::Float
    } else if decl.contains("NUMERIC") || decl.contains("DECIMAL") {
        ColumnType::Float
    } else {
        ColumnType::Unknown
    }
}

/// Convert a fetched SQLite value, guided by the column's declared type.
pub fn from_sqlite(value: ValueRef<'_>, column_type: ColumnType) -> Value {
    match (value, column_type) {
        (ValueRef::Null, _) => Value::Null,
        (ValueRef::Integer(i), ColumnType::Bool) => Value::Bool(i != 0),
        (ValueRef::Integer(i), ColumnType::Float) => Value::Float(i as f64),
        (ValueRef::Integer(i), _) => Value::Int(i),
        (ValueRef::Real(f), _) => Value::Float(f),
        (ValueRef::Text(bytes), ColumnType::Json) => {
            let text = String::from_utf8_lossy(bytes);
            serde_json::from_str(&text)
                .map(Value::Json)
                .unwrap_or_else(|_| Value::String(text.into_owned()))
        }
        (ValueRef::Text(bytes), _) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        (ValueRef::Blob(bytes), _) => Value::Bytes(bytes.to_vec()),
    }
}

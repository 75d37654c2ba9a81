// ABOUTME: SQLite storage classes and column affinity
// ABOUTME: Converts values to and from rusqlite and predicts what SQLite stores

use rusqlite::types::Value as SqliteValue;

use crate::value::Value;

/// Column affinity as derived from the declared type.
///
/// Follows the rules of section 3.1 of the SQLite datatype documentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    Integer,
    Text,
    Blob,
    Real,
    Numeric,
}

impl Affinity {
    pub fn from_declared_type(declared: &str) -> Self {
        let upper = declared.to_uppercase();
        if upper.contains("INT") {
            Affinity::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Affinity::Text
        } else if upper.contains("BLOB") || upper.trim().is_empty() {
            Affinity::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Affinity::Real
        } else {
            Affinity::Numeric
        }
    }
}

pub fn from_sqlite(value: SqliteValue) -> Value {
    match value {
        SqliteValue::Null => Value::Null,
        SqliteValue::Integer(i) => Value::Integer(i),
        SqliteValue::Real(f) => Value::Real(f),
        SqliteValue::Text(s) => Value::Text(s),
        SqliteValue::Blob(b) => Value::Blob(b),
    }
}

/// Map a value onto one of SQLite's five storage classes.
///
/// Booleans become 0/1; uuids, dates, timestamps and JSON become text.
pub fn to_sqlite(value: &Value) -> SqliteValue {
    match value {
        Value::Null => SqliteValue::Null,
        Value::Bool(b) => SqliteValue::Integer(i64::from(*b)),
        Value::Integer(i) => SqliteValue::Integer(*i),
        Value::Real(f) => SqliteValue::Real(*f),
        Value::Text(s) => SqliteValue::Text(s.clone()),
        Value::Blob(b) => SqliteValue::Blob(b.clone()),
        other => SqliteValue::Text(other.to_text().unwrap_or_default()),
    }
}

/// Predict the value SQLite hands back after storing `value` in a column
/// with the given declared type.
pub fn coerce(value: &Value, declared_type: &str) -> Value {
    let stored = from_sqlite(to_sqlite(value));
    apply_affinity(stored, Affinity::from_declared_type(declared_type))
}

fn apply_affinity(value: Value, affinity: Affinity) -> Value {
    match (affinity, value) {
        (Affinity::Integer | Affinity::Numeric, Value::Text(s)) => match parse_numeric(&s) {
            Some(number) => integral_if_exact(number),
            None => Value::Text(s),
        },
        (Affinity::Integer | Affinity::Numeric, Value::Real(f)) => integral_if_exact(Value::Real(f)),
        (Affinity::Real, Value::Integer(i)) => Value::Real(i as f64),
        (Affinity::Real, Value::Text(s)) => match parse_numeric(&s) {
            Some(Value::Integer(i)) => Value::Real(i as f64),
            Some(number) => number,
            None => Value::Text(s),
        },
        (Affinity::Text, Value::Integer(i)) => Value::Text(i.to_string()),
        (Affinity::Text, Value::Real(f)) => Value::Text(format_real(f)),
        (_, value) => value,
    }
}

/// Parse text that SQLite considers a well-formed numeric literal.
fn parse_numeric(s: &str) -> Option<Value> {
    let trimmed = s.trim();
    if !trimmed.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Value::Integer(i));
    }
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() => Some(Value::Real(f)),
        _ => None,
    }
}

// Reals without a fractional part that fit in an i64 are stored as integers.
fn integral_if_exact(value: Value) -> Value {
    match value {
        Value::Real(f) if f.fract() == 0.0 && f.abs() < 9.2e18 => Value::Integer(f as i64),
        other => other,
    }
}

// SQLite renders reals with "%!.15g", which always keeps a decimal point.
fn format_real(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{:.1}", f)
    } else {
        f.to_string()
    }
}

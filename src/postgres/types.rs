// ABOUTME: Mapping between PostgreSQL column types and backend-neutral values
// ABOUTME: Typed decoding for common types, text-cast round trip for everything else

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tokio_postgres::types::ToSql;
use tokio_postgres::Row;

use crate::utils::quote_ident;
use crate::value::Value;

/// How a PostgreSQL column is read and written.
///
/// Types without a dedicated variant are read as `col::text` and written back
/// as `$n::text::<type>`, which round-trips any type with a text form
/// (numeric, arrays, enums, intervals, domains, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgKind {
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Bool,
    Text,
    Uuid,
    /// Fractional-second digits kept by the column, 0 to 6.
    Timestamp(u8),
    TimestampTz(u8),
    Date,
    Json,
    Bytea,
    Other,
}

impl PgKind {
    /// Classify a type name as returned by `format_type()`.
    pub fn from_type_name(type_name: &str) -> Self {
        match base_type_name(type_name).as_str() {
            "smallint" | "int2" => PgKind::Int2,
            "integer" | "int" | "int4" => PgKind::Int4,
            "bigint" | "int8" => PgKind::Int8,
            "real" | "float4" => PgKind::Float4,
            "double precision" | "float8" => PgKind::Float8,
            "boolean" | "bool" => PgKind::Bool,
            "text" | "character varying" | "varchar" | "character" | "char" | "bpchar"
            | "name" => PgKind::Text,
            "uuid" => PgKind::Uuid,
            "timestamp without time zone" | "timestamp" => {
                PgKind::Timestamp(timestamp_precision(type_name))
            }
            "timestamp with time zone" | "timestamptz" => {
                PgKind::TimestampTz(timestamp_precision(type_name))
            }
            "date" => PgKind::Date,
            "json" | "jsonb" => PgKind::Json,
            "bytea" => PgKind::Bytea,
            _ => PgKind::Other,
        }
    }
}

/// Drop type modifiers: `character varying(20)` → `character varying`,
/// `timestamp(3) without time zone` → `timestamp without time zone`.
///
/// Array types keep their `[]` suffix and therefore classify as `Other`.
fn base_type_name(type_name: &str) -> String {
    let mut base = String::with_capacity(type_name.len());
    let mut depth = 0usize;
    for ch in type_name.chars() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => base.push(ch),
            _ => {}
        }
    }
    base.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Default and maximum fractional-second digits of a timestamp column.
const MAX_TIMESTAMP_PRECISION: u8 = 6;

/// Precision modifier of a timestamp type: `timestamp(3) with time zone` → 3.
fn timestamp_precision(type_name: &str) -> u8 {
    type_name
        .split_once('(')
        .and_then(|(_, rest)| rest.split_once(')'))
        .and_then(|(digits, _)| digits.trim().parse::<u8>().ok())
        .map_or(MAX_TIMESTAMP_PRECISION, |p| p.min(MAX_TIMESTAMP_PRECISION))
}

/// SELECT-list expression for a column.
pub fn select_expr(column: &str, kind: PgKind) -> String {
    match kind {
        PgKind::Other => format!("{}::text", quote_ident(column)),
        _ => quote_ident(column),
    }
}

/// Bind placeholder for parameter `index` (1-based) of a column.
pub fn placeholder(index: usize, kind: PgKind, type_name: &str) -> String {
    match kind {
        PgKind::Other => format!("${}::text::{}", index, type_name),
        _ => format!("${}", index),
    }
}

/// Decode column `idx` of `row` according to its kind.
pub fn decode(row: &Row, idx: usize, kind: PgKind) -> Result<Value> {
    let value = match kind {
        PgKind::Int2 => row.try_get::<_, Option<i16>>(idx)?.map(|v| Value::Integer(v.into())),
        PgKind::Int4 => row.try_get::<_, Option<i32>>(idx)?.map(|v| Value::Integer(v.into())),
        PgKind::Int8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::Integer),
        PgKind::Float4 => row.try_get::<_, Option<f32>>(idx)?.map(|v| Value::Real(v.into())),
        PgKind::Float8 => row.try_get::<_, Option<f64>>(idx)?.map(Value::Real),
        PgKind::Bool => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        PgKind::Text | PgKind::Other => row.try_get::<_, Option<String>>(idx)?.map(Value::Text),
        PgKind::Uuid => row.try_get::<_, Option<uuid::Uuid>>(idx)?.map(Value::Uuid),
        PgKind::Timestamp(_) => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map(Value::Timestamp),
        PgKind::TimestampTz(_) => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map(Value::TimestampTz),
        PgKind::Date => row.try_get::<_, Option<NaiveDate>>(idx)?.map(Value::Date),
        PgKind::Json => row
            .try_get::<_, Option<serde_json::Value>>(idx)?
            .map(Value::Json),
        PgKind::Bytea => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Blob),
    };
    Ok(value.unwrap_or(Value::Null))
}

/// Convert `value` into the value PostgreSQL hands back after storing it in a
/// column of `kind`.
///
/// Same-kind values pass through (with range checks); values coming from a
/// different backend are converted where the meaning is unambiguous, e.g.
/// SQLite integers into booleans or ISO-8601 text into timestamps.
pub fn coerce(value: &Value, kind: PgKind) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    let coerced = match kind {
        PgKind::Int2 => {
            let v = to_i64(value, kind)?;
            i16::try_from(v).with_context(|| format!("{} is out of range for smallint", v))?;
            Value::Integer(v)
        }
        PgKind::Int4 => {
            let v = to_i64(value, kind)?;
            i32::try_from(v).with_context(|| format!("{} is out of range for integer", v))?;
            Value::Integer(v)
        }
        PgKind::Int8 => Value::Integer(to_i64(value, kind)?),
        PgKind::Float4 => Value::Real((to_f64(value, kind)? as f32).into()),
        PgKind::Float8 => Value::Real(to_f64(value, kind)?),
        PgKind::Bool => Value::Bool(to_bool(value, kind)?),
        PgKind::Text | PgKind::Other => match value {
            Value::Text(s) => Value::Text(s.clone()),
            other => Value::Text(other.to_text().unwrap_or_default()),
        },
        PgKind::Uuid => match value {
            Value::Uuid(u) => Value::Uuid(*u),
            Value::Text(s) => Value::Uuid(
                uuid::Uuid::parse_str(s.trim())
                    .with_context(|| format!("'{}' is not a valid uuid", s))?,
            ),
            Value::Blob(b) => Value::Uuid(
                uuid::Uuid::from_slice(b).context("blob is not a 16-byte uuid")?,
            ),
            other => return Err(mismatch(other, kind)),
        },
        PgKind::Timestamp(precision) => match value {
            Value::Timestamp(ts) => Value::Timestamp(round_timestamp(*ts, precision)),
            Value::TimestampTz(ts) => {
                Value::Timestamp(round_timestamp(ts.naive_utc(), precision))
            }
            Value::Date(d) => Value::Timestamp(d.and_hms_opt(0, 0, 0).unwrap_or_default()),
            Value::Text(s) => {
                Value::Timestamp(round_timestamp(parse_naive_timestamp(s)?, precision))
            }
            other => return Err(mismatch(other, kind)),
        },
        PgKind::TimestampTz(precision) => match value {
            Value::TimestampTz(ts) => {
                Value::TimestampTz(round_timestamp(ts.naive_utc(), precision).and_utc())
            }
            Value::Timestamp(ts) => Value::TimestampTz(round_timestamp(*ts, precision).and_utc()),
            Value::Date(d) => {
                Value::TimestampTz(d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc())
            }
            Value::Text(s) => Value::TimestampTz(
                round_timestamp(parse_utc_timestamp(s)?.naive_utc(), precision).and_utc(),
            ),
            other => return Err(mismatch(other, kind)),
        },
        PgKind::Date => match value {
            Value::Date(d) => Value::Date(*d),
            Value::Timestamp(ts) => Value::Date(ts.date()),
            Value::TimestampTz(ts) => Value::Date(ts.date_naive()),
            Value::Text(s) => Value::Date(
                NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .with_context(|| format!("'{}' is not a valid date", s))?,
            ),
            other => return Err(mismatch(other, kind)),
        },
        PgKind::Json => match value {
            Value::Json(j) => Value::Json(j.clone()),
            Value::Text(s) => Value::Json(
                serde_json::from_str(s).with_context(|| format!("'{}' is not valid JSON", s))?,
            ),
            Value::Bool(b) => Value::Json(serde_json::Value::Bool(*b)),
            Value::Integer(i) => Value::Json((*i).into()),
            Value::Real(f) => Value::Json(
                serde_json::Number::from_f64(*f)
                    .map(serde_json::Value::Number)
                    .ok_or_else(|| anyhow!("{} cannot be stored as a JSON number", f))?,
            ),
            other => return Err(mismatch(other, kind)),
        },
        PgKind::Bytea => match value {
            Value::Blob(b) => Value::Blob(b.clone()),
            Value::Text(s) => Value::Blob(s.as_bytes().to_vec()),
            other => return Err(mismatch(other, kind)),
        },
    };
    Ok(coerced)
}

/// Build a bind parameter for `value` stored in a column of `kind`.
///
/// The value is coerced first, so any value accepted by [`coerce`] binds.
pub fn to_sql(value: &Value, kind: PgKind) -> Result<Box<dyn ToSql + Sync + Send>> {
    let value = coerce(value, kind)?;
    let param: Box<dyn ToSql + Sync + Send> = match (kind, value) {
        (PgKind::Int2, Value::Null) => Box::new(None::<i16>),
        (PgKind::Int2, Value::Integer(i)) => Box::new(Some(i as i16)),
        (PgKind::Int4, Value::Null) => Box::new(None::<i32>),
        (PgKind::Int4, Value::Integer(i)) => Box::new(Some(i as i32)),
        (PgKind::Int8, Value::Null) => Box::new(None::<i64>),
        (PgKind::Int8, Value::Integer(i)) => Box::new(Some(i)),
        (PgKind::Float4, Value::Null) => Box::new(None::<f32>),
        (PgKind::Float4, Value::Real(f)) => Box::new(Some(f as f32)),
        (PgKind::Float8, Value::Null) => Box::new(None::<f64>),
        (PgKind::Float8, Value::Real(f)) => Box::new(Some(f)),
        (PgKind::Bool, Value::Null) => Box::new(None::<bool>),
        (PgKind::Bool, Value::Bool(b)) => Box::new(Some(b)),
        (PgKind::Text | PgKind::Other, Value::Null) => Box::new(None::<String>),
        (PgKind::Text | PgKind::Other, Value::Text(s)) => Box::new(Some(s)),
        (PgKind::Uuid, Value::Null) => Box::new(None::<uuid::Uuid>),
        (PgKind::Uuid, Value::Uuid(u)) => Box::new(Some(u)),
        (PgKind::Timestamp(_), Value::Null) => Box::new(None::<NaiveDateTime>),
        (PgKind::Timestamp(_), Value::Timestamp(ts)) => Box::new(Some(ts)),
        (PgKind::TimestampTz(_), Value::Null) => Box::new(None::<DateTime<Utc>>),
        (PgKind::TimestampTz(_), Value::TimestampTz(ts)) => Box::new(Some(ts)),
        (PgKind::Date, Value::Null) => Box::new(None::<NaiveDate>),
        (PgKind::Date, Value::Date(d)) => Box::new(Some(d)),
        (PgKind::Json, Value::Null) => Box::new(None::<serde_json::Value>),
        (PgKind::Json, Value::Json(j)) => Box::new(Some(j)),
        (PgKind::Bytea, Value::Null) => Box::new(None::<Vec<u8>>),
        (PgKind::Bytea, Value::Blob(b)) => Box::new(Some(b)),
        (kind, other) => return Err(mismatch(&other, kind)),
    };
    Ok(param)
}

fn mismatch(value: &Value, kind: PgKind) -> anyhow::Error {
    anyhow!(
        "cannot store a {} value ({}) in a {:?} column",
        value.type_name(),
        value,
        kind
    )
}

fn to_i64(value: &Value, kind: PgKind) -> Result<i64> {
    match value {
        Value::Integer(i) => Ok(*i),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Real(f) if f.fract() == 0.0 && f.is_finite() => Ok(*f as i64),
        Value::Text(s) => s
            .trim()
            .parse::<i64>()
            .with_context(|| format!("'{}' is not a valid integer", s)),
        other => Err(mismatch(other, kind)),
    }
}

fn to_f64(value: &Value, kind: PgKind) -> Result<f64> {
    match value {
        Value::Real(f) => Ok(*f),
        Value::Integer(i) => Ok(*i as f64),
        Value::Text(s) => s
            .trim()
            .parse::<f64>()
            .with_context(|| format!("'{}' is not a valid number", s)),
        other => Err(mismatch(other, kind)),
    }
}

fn to_bool(value: &Value, kind: PgKind) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Integer(0) => Ok(false),
        Value::Integer(1) => Ok(true),
        Value::Text(s) => match s.trim().to_lowercase().as_str() {
            "t" | "true" | "y" | "yes" | "on" | "1" => Ok(true),
            "f" | "false" | "n" | "no" | "off" | "0" => Ok(false),
            _ => bail!("'{}' is not a valid boolean", s),
        },
        other => Err(mismatch(other, kind)),
    }
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

fn parse_naive_timestamp(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| anyhow!("'{}' is not a valid timestamp", s))
}

fn parse_utc_timestamp(s: &str) -> Result<DateTime<Utc>> {
    let trimmed = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(ts.with_timezone(&Utc));
    }
    // Naive text is taken as UTC.
    parse_naive_timestamp(trimmed).map(|ts| ts.and_utc())
}

/// Microseconds between the Unix epoch and 2000-01-01, PostgreSQL's epoch.
const POSTGRES_EPOCH_MICROS: i64 = 946_684_800_000_000;

/// The timestamp PostgreSQL stores for `ts` in a column keeping `precision`
/// fractional digits.
///
/// Bound values arrive truncated to microseconds; the server then rounds half
/// away from its own epoch to the column precision.
fn round_timestamp(ts: NaiveDateTime, precision: u8) -> NaiveDateTime {
    let ts = chrono::DurationRound::duration_trunc(ts, chrono::Duration::microseconds(1))
        .unwrap_or(ts);
    if precision >= MAX_TIMESTAMP_PRECISION {
        return ts;
    }

    let scale = 10i64.pow(u32::from(MAX_TIMESTAMP_PRECISION - precision));
    let micros = ts.and_utc().timestamp_micros() - POSTGRES_EPOCH_MICROS;
    let rounded = if micros >= 0 {
        (micros + scale / 2) / scale * scale
    } else {
        -((-micros + scale / 2) / scale * scale)
    };
    let rounded = rounded + POSTGRES_EPOCH_MICROS;

    DateTime::from_timestamp(
        rounded.div_euclid(1_000_000),
        (rounded.rem_euclid(1_000_000) * 1_000) as u32,
    )
    .map_or(ts, |rounded| rounded.naive_utc())
}

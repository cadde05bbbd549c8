//! The closed sum type over supported value kinds, plus SQL-literal
//! rendering.
//!
//! Rendering rules:
//! - strings single-quoted, embedded quotes doubled (`''`)
//! - booleans rendered `TRUE` / `FALSE`
//! - byte arrays and int arrays base64-encoded and quoted (int arrays
//!   serialize each i32 little-endian)
//! - CALENDAR as epoch-millisecond integer
//! - DATE / TIME as quoted ISO text
//! - enums as quoted `tag:constant`

use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, Time};

use crate::base64;
use crate::data_type::DataType;
use crate::enum_codec::DbEnum;

const DATE_FORMAT: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const TIME_FORMAT: &[FormatItem<'static>] = format_description!("[hour]:[minute]:[second]");

/// A typed value, one variant per [`DataType`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Id(i64),
    Str(String),
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Bytes(Vec<u8>),
    IntArray(Vec<i32>),
    Calendar(OffsetDateTime),
    Date(Date),
    Time(Time),
    Enum { tag: String, constant: String },
}

impl Value {
    /// Build an enum value from a [`DbEnum`] implementation.
    pub fn from_enum<E: DbEnum>(value: &E) -> Self {
        Value::Enum {
            tag: E::TAG.to_string(),
            constant: value.constant().to_string(),
        }
    }

    /// The [`DataType`] this value inhabits.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Id(_) => DataType::Id,
            Value::Str(_) => DataType::Str,
            Value::Bool(_) => DataType::Bool,
            Value::Byte(_) => DataType::Byte,
            Value::Short(_) => DataType::Short,
            Value::Int(_) => DataType::Int,
            Value::Long(_) => DataType::Long,
            Value::Float(_) => DataType::Float,
            Value::Double(_) => DataType::Double,
            Value::Bytes(_) => DataType::Bytes,
            Value::IntArray(_) => DataType::IntArray,
            Value::Calendar(_) => DataType::Calendar,
            Value::Date(_) => DataType::Date,
            Value::Time(_) => DataType::Time,
            Value::Enum { .. } => DataType::Enum,
        }
    }

    /// Render this value as an SQL literal.
    pub fn render_literal(&self) -> String {
        match self {
            Value::Id(v) => v.to_string(),
            Value::Str(s) => quote_str(s),
            Value::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Value::Byte(v) => v.to_string(),
            Value::Short(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Long(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::Bytes(b) => quote_str(&base64::encode(b)),
            Value::IntArray(xs) => quote_str(&base64::encode(&int_array_bytes(xs))),
            Value::Calendar(odt) => epoch_millis(odt).to_string(),
            Value::Date(d) => match d.format(DATE_FORMAT) {
                Ok(s) => quote_str(&s),
                Err(_) => "'1970-01-01'".to_string(),
            },
            Value::Time(t) => match t.format(TIME_FORMAT) {
                Ok(s) => quote_str(&s),
                Err(_) => "'00:00:00'".to_string(),
            },
            Value::Enum { tag, constant } => quote_str(&format!("{tag}:{constant}")),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

/// Single-quote a string for SQL, doubling embedded quotes.
pub fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Epoch milliseconds of a timestamp (the CALENDAR wire representation).
pub fn epoch_millis(odt: &OffsetDateTime) -> i64 {
    (odt.unix_timestamp_nanos() / 1_000_000) as i64
}

/// Rebuild a timestamp from epoch milliseconds. `None` if out of range.
pub fn from_epoch_millis(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000).ok()
}

/// Little-endian byte serialization of an i32 array.
pub fn int_array_bytes(xs: &[i32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(xs.len() * 4);
    for x in xs {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

/// Inverse of [`int_array_bytes`]. `None` if the length is not a multiple
/// of four.
pub fn int_array_from_bytes(bytes: &[u8]) -> Option<Vec<i32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// Parse a DATE cell (`YYYY-MM-DD`).
pub fn parse_date(text: &str) -> Option<Date> {
    Date::parse(text, DATE_FORMAT).ok()
}

/// Parse a TIME cell (`HH:MM:SS`).
pub fn parse_time(text: &str) -> Option<Time> {
    Time::parse(text, TIME_FORMAT).ok()
}

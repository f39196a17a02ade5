//! Cell values and the lenient conversions applied to them.
//!
//! Every conversion here returns `Option`: a value that cannot be read as a
//! number or a date becomes `None` and the caller decides whether that means
//! null or zero. Nothing in this module fails a row.

use std::{cmp::Ordering, fmt};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    DateTime(NaiveDateTime),
}

/// A single cell; `None` is null.
pub type Cell = Option<Value>;

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::DateTime(dt) => format_datetime(dt),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) if f.is_finite() => Some(*f),
            Value::Float(_) => None,
            Value::String(s) => parse_f64(s),
            Value::DateTime(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Some(*f as i64),
            Value::Float(_) => None,
            Value::String(s) => parse_i64(s),
            Value::DateTime(_) => None,
        }
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::String(_) => ValueKind::Text,
            Value::Integer(_) => ValueKind::Integer,
            Value::Float(_) => ValueKind::Float,
            Value::DateTime(_) => ValueKind::Timestamp,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Ordering used when sorting filter options and years. Numbers sort
/// numerically, everything else by its display text.
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    match (left, right) {
        (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
        (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
        (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
            let a = left.as_f64().unwrap_or(f64::NAN);
            let b = right.as_f64().unwrap_or(f64::NAN);
            a.total_cmp(&b)
        }
        _ => left.as_display().cmp(&right.as_display()),
    }
}

/// Storage type a column settles on when every non-null cell agrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Integer,
    Float,
    Timestamp,
    Text,
}

impl ValueKind {
    /// Widens two kinds the way a column accumulates them.
    pub fn merge(self, other: ValueKind) -> ValueKind {
        use ValueKind::*;
        match (self, other) {
            (a, b) if a == b => a,
            (Integer, Float) | (Float, Integer) => Float,
            _ => Text,
        }
    }
}

/// Infers the storage kind of a column from its typed cells. A column
/// without any non-null cell is text.
pub fn infer_kind<'a, I>(cells: I) -> ValueKind
where
    I: IntoIterator<Item = &'a Cell>,
{
    cells
        .into_iter()
        .flatten()
        .map(Value::kind)
        .reduce(ValueKind::merge)
        .unwrap_or(ValueKind::Text)
}

/// Which component comes first in an ambiguous `a/b/yyyy` date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    DayFirst,
    MonthFirst,
}

const ISO_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
];
const ISO_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d"];
const DAY_FIRST_DATETIME_FORMATS: &[&str] = &[
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%d-%m-%Y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
];
const DAY_FIRST_DATE_FORMATS: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];
const MONTH_FIRST_DATETIME_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m-%d-%Y %H:%M:%S",
];
const MONTH_FIRST_DATE_FORMATS: &[&str] = &["%m/%d/%Y", "%m-%d-%Y"];

/// Parses text as a timestamp. ISO forms are tried first, then the
/// preferred ambiguous order, then the other order so that `25/12/1996`
/// still parses when month-first is preferred.
pub fn parse_datetime(raw: &str, order: DateOrder) -> Option<NaiveDateTime> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if let Some(parsed) = try_formats(value, ISO_DATETIME_FORMATS, ISO_DATE_FORMATS) {
        return Some(parsed);
    }
    let day_first = (DAY_FIRST_DATETIME_FORMATS, DAY_FIRST_DATE_FORMATS);
    let month_first = (MONTH_FIRST_DATETIME_FORMATS, MONTH_FIRST_DATE_FORMATS);
    let (preferred, fallback) = match order {
        DateOrder::DayFirst => (day_first, month_first),
        DateOrder::MonthFirst => (month_first, day_first),
    };
    try_formats(value, preferred.0, preferred.1).or_else(|| try_formats(value, fallback.0, fallback.1))
}

fn try_formats(value: &str, datetimes: &[&str], dates: &[&str]) -> Option<NaiveDateTime> {
    datetimes
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            dates
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
                .map(|date| date.and_time(NaiveTime::MIN))
        })
}

/// Coerces a cell to a timestamp; timestamps pass through untouched.
pub fn coerce_datetime(cell: Option<&Value>, order: DateOrder) -> Option<NaiveDateTime> {
    match cell? {
        Value::DateTime(dt) => Some(*dt),
        Value::String(s) => parse_datetime(s, order),
        Value::Integer(_) | Value::Float(_) => None,
    }
}

/// Coerces a cell to a finite float.
pub fn coerce_f64(cell: Option<&Value>) -> Option<f64> {
    cell?.as_f64()
}

pub fn parse_f64(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
}

pub fn parse_i64(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok()
}

/// Midnight timestamps render as a bare date.
pub fn format_datetime(dt: &NaiveDateTime) -> String {
    if dt.time() == NaiveTime::MIN {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Reads raw CSV text into the narrowest value it represents. Integers with
/// a leading zero stay text so identifiers such as `007` survive.
pub fn infer_value(raw: &str) -> Cell {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let leading_zero = trimmed.len() > 1 && trimmed.starts_with('0') && !trimmed.starts_with("0.");
    if !leading_zero {
        if let Some(int) = parse_i64(trimmed) {
            return Some(Value::Integer(int));
        }
        if let Some(float) = parse_f64(trimmed) {
            return Some(Value::Float(float));
        }
    }
    if let Some(dt) = try_formats(trimmed, ISO_DATETIME_FORMATS, ISO_DATE_FORMATS) {
        return Some(Value::DateTime(dt));
    }
    Some(Value::String(raw.to_string()))
}

//! The result of evaluating an expression, and the fixed conversion table
//! between value kinds.
//!
//! | from \ to   | series list            | scalar                  | scalar set | string | duration |
//! |-------------|------------------------|-------------------------|------------|--------|----------|
//! | series list | identity               |                         |            |        |          |
//! | scalar      | constant series        | identity                |            |        |          |
//! | scalar set  | per-tagset constants   | single untagged entry   | identity   |        |          |
//! | string      |                        |                         |            | identity | parsed |
//! | duration    |                        |                         |            |        | identity |
//!
//! Every blank cell is a [`ConversionError`].

use std::fmt;

use mqe_core::series::{ScalarSet, SeriesList, Timeseries};
use mqe_core::tagset::TagSet;
use mqe_core::timerange::Timerange;

use crate::error::ConversionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    SeriesList,
    Scalar,
    ScalarSet,
    String,
    Duration,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueKind::SeriesList => "series list",
            ValueKind::Scalar => "scalar",
            ValueKind::ScalarSet => "scalar set",
            ValueKind::String => "string",
            ValueKind::Duration => "duration",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    SeriesList(SeriesList),
    Scalar(f64),
    ScalarSet(ScalarSet),
    String(String),
    /// Signed milliseconds.
    Duration(i64),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::SeriesList(_) => ValueKind::SeriesList,
            Value::Scalar(_) => ValueKind::Scalar,
            Value::ScalarSet(_) => ValueKind::ScalarSet,
            Value::String(_) => ValueKind::String,
            Value::Duration(_) => ValueKind::Duration,
        }
    }

    fn fail(&self, to: ValueKind, context: &str) -> ConversionError {
        ConversionError {
            from: self.kind(),
            to,
            context: context.to_string(),
        }
    }

    /// Scalars and scalar sets become constant series over `timerange`.
    pub fn into_series_list(
        self,
        timerange: Timerange,
        context: &str,
    ) -> Result<SeriesList, ConversionError> {
        match self {
            Value::SeriesList(list) => Ok(list),
            Value::Scalar(v) => Ok(SeriesList::new(
                vec![Timeseries::new(vec![v; timerange.slots()], TagSet::new())],
                timerange,
            )),
            Value::ScalarSet(set) => Ok(set.to_series_list(timerange)),
            other => Err(other.fail(ValueKind::SeriesList, context)),
        }
    }

    /// A scalar set converts only when it holds exactly one untagged entry.
    pub fn to_scalar(&self, context: &str) -> Result<f64, ConversionError> {
        match self {
            Value::Scalar(v) => Ok(*v),
            Value::ScalarSet(set) => match set.0.as_slice() {
                [only] if only.tagset.is_empty() => Ok(only.value),
                _ => Err(self.fail(ValueKind::Scalar, context)),
            },
            other => Err(other.fail(ValueKind::Scalar, context)),
        }
    }

    pub fn into_scalar_set(self, context: &str) -> Result<ScalarSet, ConversionError> {
        match self {
            Value::ScalarSet(set) => Ok(set),
            other => Err(other.fail(ValueKind::ScalarSet, context)),
        }
    }

    pub fn into_string(self, context: &str) -> Result<String, ConversionError> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(other.fail(ValueKind::String, context)),
        }
    }

    /// Durations pass through; strings are parsed with [`parse_duration`].
    pub fn to_duration(&self, context: &str) -> Result<i64, ConversionError> {
        match self {
            Value::Duration(ms) => Ok(*ms),
            Value::String(s) => {
                parse_duration(s).ok_or_else(|| self.fail(ValueKind::Duration, context))
            }
            other => Err(other.fail(ValueKind::Duration, context)),
        }
    }
}

impl From<SeriesList> for Value {
    fn from(list: SeriesList) -> Self {
        Value::SeriesList(list)
    }
}

impl From<ScalarSet> for Value {
    fn from(set: ScalarSet) -> Self {
        Value::ScalarSet(set)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

/// Parse `[+-]N<unit>` into signed milliseconds.
///
/// Units: `ms`, `s`, `m`, `h`/`hr`, `d`, `w`, `M`/`mo` (30 days),
/// `y`/`yr` (365 days). Returns `None` for anything else, including overflow.
pub fn parse_duration(text: &str) -> Option<i64> {
    let unsigned = text.trim_start_matches(['+', '-']);
    if text.len() - unsigned.len() > 1 {
        return None;
    }
    let split = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    let (digits, unit) = unsigned.split_at(split);
    if digits.is_empty() {
        return None;
    }
    const DAY: i64 = 24 * 60 * 60 * 1000;
    let scale = match unit {
        "ms" => 1,
        "s" => 1000,
        "m" => 60 * 1000,
        "h" | "hr" => 60 * 60 * 1000,
        "d" => DAY,
        "w" => 7 * DAY,
        "M" | "mo" => 30 * DAY,
        "y" | "yr" => 365 * DAY,
        _ => return None,
    };
    let magnitude: i64 = digits.parse().ok()?;
    let millis = magnitude.checked_mul(scale)?;
    Some(if text.starts_with('-') { -millis } else { millis })
}

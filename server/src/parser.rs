//! Normalizes raw upstream snapshot JSON into validated balloon points.
//!
//! Upstream records are `[lat, lon]` or `[lat, lon, alt]`, with entries that
//! may be numbers or numeric strings. Bad records are skipped one at a time,
//! a bad altitude only drops the altitude.

use serde_json::Value;
use shared::models::BalloonPoint;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ParseWarning {
    #[error("snapshot is not an array (got {0})")]
    NotAnArray(&'static str),
    #[error("record {index} is not an array")]
    RecordNotArray { index: usize },
    #[error("record {index} has {len} entries, expected at least 2")]
    RecordTooShort { index: usize, len: usize },
    #[error("record {index} has a non-numeric coordinate")]
    InvalidCoordinate { index: usize },
    #[error("record {index} has a non-numeric altitude, kept without it")]
    InvalidAltitude { index: usize },
}

#[derive(Debug, Default, PartialEq)]
pub struct ParseOutcome {
    pub points: Vec<BalloonPoint>,
    pub warnings: Vec<ParseWarning>,
}

/// Parse one snapshot. Never fails: every rejected record is reported as a
/// warning, logged, and skipped.
pub fn parse_points(raw: &Value) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();

    let records = match raw.as_array() {
        Some(records) => records,
        None => {
            outcome.warnings.push(ParseWarning::NotAnArray(kind(raw)));
            log_warnings(&outcome.warnings);
            return outcome;
        }
    };

    for (index, record) in records.iter().enumerate() {
        match parse_record(index, record) {
            Ok((point, warning)) => {
                outcome.points.push(point);
                outcome.warnings.extend(warning);
            }
            Err(warning) => outcome.warnings.push(warning),
        }
    }

    log_warnings(&outcome.warnings);
    outcome
}

fn parse_record(
    index: usize,
    record: &Value,
) -> Result<(BalloonPoint, Option<ParseWarning>), ParseWarning> {
    let entries = record
        .as_array()
        .ok_or(ParseWarning::RecordNotArray { index })?;
    if entries.len() < 2 {
        return Err(ParseWarning::RecordTooShort {
            index,
            len: entries.len(),
        });
    }

    let (lat, lon) = match (to_number(&entries[0]), to_number(&entries[1])) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => return Err(ParseWarning::InvalidCoordinate { index }),
    };

    let (alt, warning) = match entries.get(2) {
        None => (None, None),
        Some(raw_alt) => match to_number(raw_alt) {
            Some(alt) => (Some(alt), None),
            None => (None, Some(ParseWarning::InvalidAltitude { index })),
        },
    };

    let point =
        BalloonPoint::new(lat, lon, alt).ok_or(ParseWarning::InvalidCoordinate { index })?;
    Ok((point, warning))
}

/// Numbers and numeric strings are accepted; anything non-finite is not.
fn to_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn log_warnings(warnings: &[ParseWarning]) {
    for warning in warnings {
        log::warn!("Skipping malformed balloon data: {}", warning);
    }
}

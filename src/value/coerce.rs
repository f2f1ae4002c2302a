//! Boundary coercion of loose client values to field types

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};

use super::types::FieldType;
use super::value::Value;

/// A value could not be interpreted as the requested field type
#[derive(Debug, Clone, PartialEq)]
pub struct CoercionError {
    pub expected: FieldType,
    pub found: &'static str,
    pub detail: Option<String>,
}

impl CoercionError {
    fn new(expected: &FieldType, found: &Value) -> Self {
        Self {
            expected: expected.clone(),
            found: found.kind_name(),
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl fmt::Display for CoercionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected {}, found {}", self.expected, self.found)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for CoercionError {}

impl Value {
    /// Interprets this value as `target`.
    ///
    /// Widening and textual encodings are accepted (int to float, RFC 3339
    /// strings to timestamps, base64 to bytes and so on). Anything else is an
    /// error; nothing is silently truncated.
    pub fn coerce_to(&self, target: &FieldType) -> Result<Value, CoercionError> {
        let mismatch = || CoercionError::new(target, self);

        match (target, self) {
            (FieldType::Bool, Value::Bool(_)) => Ok(self.clone()),

            (FieldType::Int32, _) => {
                let i = integral(self).ok_or_else(mismatch)?;
                if i < i64::from(i32::MIN) || i > i64::from(i32::MAX) {
                    return Err(mismatch().with_detail(format!("{} out of int32 range", i)));
                }
                Ok(Value::Int(i))
            }
            (FieldType::Int64, _) => integral(self).map(Value::Int).ok_or_else(mismatch),

            (FieldType::Float32 | FieldType::Float64, Value::Int(i)) => Ok(Value::Float(*i as f64)),
            (FieldType::Float32 | FieldType::Float64, Value::Float(_)) => Ok(self.clone()),

            (FieldType::String, Value::String(_)) => Ok(self.clone()),
            (FieldType::String, Value::Identifier(s)) => Ok(Value::String(s.clone())),

            (FieldType::Bytes, Value::Bytes(_)) => Ok(self.clone()),
            (FieldType::Bytes, Value::String(s)) => BASE64
                .decode(s.as_bytes())
                .map(Value::Bytes)
                .map_err(|e| mismatch().with_detail(format!("invalid base64: {}", e))),

            (FieldType::Identifier, Value::Identifier(_)) => Ok(self.clone()),
            (FieldType::Identifier, Value::String(s)) => {
                if s.is_empty() {
                    Err(mismatch().with_detail("identifier must not be empty"))
                } else {
                    Ok(Value::Identifier(s.clone()))
                }
            }

            (FieldType::Timestamp, Value::Timestamp(_)) => Ok(self.clone()),
            (FieldType::Timestamp, Value::String(s)) => DateTime::parse_from_rfc3339(s)
                .map(|t| Value::Timestamp(t.with_timezone(&Utc)))
                .map_err(|e| mismatch().with_detail(format!("not RFC 3339: {}", e))),
            (FieldType::Timestamp, Value::Int(ms)) => Utc
                .timestamp_millis_opt(*ms)
                .single()
                .map(Value::Timestamp)
                .ok_or_else(|| mismatch().with_detail("epoch millis out of range")),

            (FieldType::Date, Value::Date(_)) => Ok(self.clone()),
            (FieldType::Date, Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|e| mismatch().with_detail(format!("expected YYYY-MM-DD: {}", e))),

            (FieldType::Time, Value::Time(_)) => Ok(self.clone()),
            (FieldType::Time, Value::String(s)) => NaiveTime::parse_from_str(s, "%H:%M:%S%.f")
                .map(Value::Time)
                .map_err(|e| mismatch().with_detail(format!("expected HH:MM:SS: {}", e))),

            (FieldType::Duration, Value::Duration(_)) => Ok(self.clone()),
            (FieldType::Duration, Value::Int(ms)) => Ok(Value::Duration(*ms)),
            (FieldType::Duration, Value::String(s)) => parse_duration(s)
                .map(Value::Duration)
                .ok_or_else(|| mismatch().with_detail("expected <n>ms|s|m|h|d")),

            (FieldType::Array(element), Value::Array(items)) => items
                .iter()
                .map(|item| item.coerce_to(element))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),

            _ => Err(mismatch()),
        }
    }
}

/// Integer view of an int or an integral float
fn integral(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Float(f) if f.fract() == 0.0 && f.is_finite() => {
            if *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                Some(*f as i64)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Parses `"250ms"`, `"30s"`, `"5m"`, `"2h"`, `"1d"` into milliseconds
fn parse_duration(text: &str) -> Option<i64> {
    let text = text.trim();
    let split = text.find(|c: char| !c.is_ascii_digit() && c != '-')?;
    let (digits, unit) = text.split_at(split);
    let amount: i64 = digits.parse().ok()?;
    let factor = match unit {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => return None,
    };
    amount.checked_mul(factor)
}

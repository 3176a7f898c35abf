//! Lenient field deserializers shared by the models
//!
//! The API is not consistent about types: IDs and counts sometimes arrive as strings, and
//! optional fields are sometimes `null` instead of absent. These accept every shape the API
//! produces and reject values that cannot be coerced.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::de::{DeserializeOwned, Error};
use serde::{Deserialize, Deserializer};
use serde_json::{Number, Value};

fn number_from<E: Error>(value: Value) -> Result<Option<Number>, E> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(Some(n)),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<Number>()
            .map(Some)
            .map_err(|_| E::custom(format!("expected a number, found \"{s}\""))),
        other => Err(E::custom(format!("expected a number, found {other}"))),
    }
}

fn as_u64<E: Error>(n: &Number) -> Result<u64, E> {
    n.as_u64()
        .or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        })
        .ok_or_else(|| E::custom(format!("expected a non-negative integer, found {n}")))
}

/// Integer from a number or numeric string; `null` becomes 0
pub fn int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    opt_int(deserializer).map(Option::unwrap_or_default)
}

/// Optional integer from a number or numeric string
pub fn opt_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match number_from(Value::deserialize(deserializer)?)? {
        Some(n) => as_u64(&n).map(Some),
        None => Ok(None),
    }
}

/// Optional float from a number or numeric string
pub fn opt_float<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(number_from::<D::Error>(Value::deserialize(deserializer)?)?.and_then(|n| n.as_f64()))
}

/// List of integers, each a number or numeric string; `null` becomes empty
pub fn int_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u64>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| number_from::<D::Error>(item).transpose())
            .map(|n| as_u64(&n?))
            .collect(),
        other => Err(D::Error::custom(format!("expected a list of IDs, found {other}"))),
    }
}

/// Boolean that may arrive as a string; `null` becomes `None`
pub fn opt_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(b)),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "" => Ok(None),
            "true" | "1" | "yes" => Ok(Some(true)),
            "false" | "0" | "no" => Ok(Some(false)),
            _ => Err(D::Error::custom(format!("expected a boolean, found \"{s}\""))),
        },
        Value::Number(n) => Ok(Some(n.as_f64().is_some_and(|f| f != 0.0))),
        other => Err(D::Error::custom(format!("expected a boolean, found {other}"))),
    }
}

/// Any value where `null` means the type's default
pub fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Timestamp in RFC 3339 form, or a bare date taken as midnight UTC
pub fn opt_datetime<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<FixedOffset>>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => parse_datetime(s.trim())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp \"{s}\""))),
    }
}

/// Date from `YYYY-MM-DD`, or the date part of a timestamp
pub fn opt_date<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => {
            let s = s.trim();
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .or_else(|| parse_datetime(s).map(|dt| dt.date_naive()))
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid date \"{s}\"")))
        }
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s)
        .or_else(|_| DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S %z"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc().fixed_offset())
        })
}

/// Drop `null` members from objects, recursively
pub fn compact(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, compact(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(compact).collect()),
        other => other,
    }
}

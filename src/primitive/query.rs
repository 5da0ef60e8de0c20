//! Query-string form of request parameters used by the HTTP binding.

use super::codes::{DiscResType, ResultContent};
use super::filter::FilterCriteria;
use crate::error::CseError;
use serde_json::{Map, Value};

/// Keys that are request-level parameters rather than filter criteria.
const PRIMITIVE_KEYS: [&str; 2] = ["rcn", "drt"];

/// Keys whose values are numeric on the wire.
const NUMERIC_KEYS: [&str; 12] = [
    "rcn", "drt", "sts", "stb", "ty", "sza", "szb", "fu", "lim", "lvl", "ofst", "dst",
];

/// Keys that may be repeated and always decode to a list.
const LIST_KEYS: [&str; 3] = ["ty", "lbl", "cty"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    pub rcn: Option<ResultContent>,
    pub drt: Option<DiscResType>,
    pub fc: Option<FilterCriteria>,
}

impl QueryParams {
    pub fn parse(query: &str) -> Result<Self, CseError> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
            .map_err(|e| CseError::Validation(format!("malformed query string: {}", e)))?;

        let mut primitive = Map::new();
        let mut filter = Map::new();

        for (key, raw) in pairs {
            let value = coerce(&key, &raw)?;
            let target = if PRIMITIVE_KEYS.contains(&key.as_str()) {
                &mut primitive
            } else {
                &mut filter
            };
            match target.get_mut(&key) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, value]);
                }
                None if LIST_KEYS.contains(&key.as_str()) => {
                    target.insert(key, Value::Array(vec![value]));
                }
                None => {
                    target.insert(key, value);
                }
            }
        }

        let rcn = decode_field(&primitive, "rcn")?;
        let drt = decode_field(&primitive, "drt")?;
        let fc = if filter.is_empty() {
            None
        } else {
            Some(
                serde_json::from_value(Value::Object(filter))
                    .map_err(|e| CseError::Validation(format!("invalid filter criteria: {}", e)))?,
            )
        };

        Ok(Self { rcn, drt, fc })
    }

    /// Inverse of [`QueryParams::parse`], used by the HTTP client side.
    pub fn encode(rcn: Option<ResultContent>, drt: Option<DiscResType>, fc: Option<&FilterCriteria>) -> String {
        let mut pairs: Vec<(String, String)> = Vec::new();
        if let Some(rcn) = rcn {
            pairs.push(("rcn".into(), rcn.code().to_string()));
        }
        if let Some(drt) = drt {
            pairs.push(("drt".into(), drt.code().to_string()));
        }
        if let Some(Value::Object(map)) = fc.and_then(|fc| serde_json::to_value(fc).ok()) {
            for (key, value) in map {
                match value {
                    Value::Array(items) => {
                        for item in items {
                            pairs.push((key.clone(), scalar_text(&item)));
                        }
                    }
                    other => pairs.push((key, scalar_text(&other))),
                }
            }
        }
        serde_urlencoded::to_string(pairs).unwrap_or_default()
    }
}

fn coerce(key: &str, raw: &str) -> Result<Value, CseError> {
    if NUMERIC_KEYS.contains(&key) {
        raw.trim()
            .parse::<u64>()
            .map(Value::from)
            .map_err(|_| CseError::Validation(format!("'{}' must be numeric, got '{}'", key, raw)))
    } else {
        Ok(Value::String(raw.to_string()))
    }
}

fn decode_field<T: serde::de::DeserializeOwned>(
    map: &Map<String, Value>,
    key: &str,
) -> Result<Option<T>, CseError> {
    match map.get(key) {
        None => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| CseError::Validation(format!("invalid {}: {}", key, e))),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

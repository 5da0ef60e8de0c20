//! oneM2M basic time format (`20240131T235959`), always UTC.

use chrono::{DateTime, NaiveDateTime, Utc};

pub type Timestamp = DateTime<Utc>;

const FORMAT: &str = "%Y%m%dT%H%M%S";

pub fn now() -> Timestamp {
    Utc::now()
}

pub fn format_timestamp(ts: &Timestamp) -> String {
    ts.format(FORMAT).to_string()
}

/// Parses the basic format, tolerating a fractional-second suffix
/// (`.123` or `,123`) which some peers append.
pub fn parse_timestamp(text: &str) -> Option<Timestamp> {
    let text = text.trim();
    let whole = text.split(|c| c == '.' || c == ',').next().unwrap_or(text);
    NaiveDateTime::parse_from_str(whole, FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

pub mod serde_ts {
    use super::{format_timestamp, parse_timestamp, Timestamp};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &Timestamp, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Timestamp, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_timestamp(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", text)))
    }
}

pub mod serde_ts_opt {
    use super::{format_timestamp, parse_timestamp, Timestamp};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        ts: &Option<Timestamp>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match ts {
            Some(ts) => serializer.serialize_str(&format_timestamp(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Timestamp>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(text) => parse_timestamp(&text)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", text))),
        }
    }
}

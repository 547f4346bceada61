//! Serialization utilities for common data types

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Parse an ISO-8601 timestamp into UTC.
///
/// Accepts RFC 3339 timestamps with an offset, and naive timestamps
/// (`2024-05-01T10:15:00.123456`, as written by older clients) which are
/// interpreted in the local timezone.
///
/// # Errors
/// Returns a description of the parse failure.
pub fn parse_iso8601(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map_err(|e| format!("invalid ISO-8601 timestamp '{raw}': {e}"))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| format!("timestamp '{raw}' does not exist in the local timezone"))
}

/// Custom serialization module for optional ISO-8601 timestamps
///
/// `None` serializes as `null`; values are written as RFC 3339 in UTC.
///
/// # Usage
/// ```rust
/// use audilink_common::iso8601_opt;
/// use chrono::{DateTime, Utc};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Example {
///     #[serde(with = "iso8601_opt", default)]
///     expiry: Option<DateTime<Utc>>,
/// }
/// ```
pub mod iso8601_opt {
    use super::{parse_iso8601, DateTime, Deserialize, Deserializer, Serializer, Utc};

    /// Serde serialization result type
    type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

    /// Serialize an optional timestamp as an RFC 3339 string or `null`
    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        match value {
            Some(timestamp) => serializer.serialize_some(&timestamp.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize an ISO-8601 string (or `null`) into an optional timestamp
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|value| parse_iso8601(&value).map_err(serde::de::Error::custom)).transpose()
    }
}

/// Utility functions
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer};

/// Timestamp formats observed in USGS M2M responses. Scene timestamps come
/// back without a timezone designator and are treated as UTC.
const USGS_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse a USGS timestamp string, trying RFC 3339 first and then the
/// naive formats the M2M API actually emits.
pub fn parse_usgs_datetime(s: &str) -> Option<DateTime<Utc>> {
    let trimmed = s.trim();
    if let Ok(dt) = trimmed.parse::<DateTime<Utc>>() {
        return Some(dt);
    }
    for format in USGS_DATETIME_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }
    None
}

/// Serde adapter over [`parse_usgs_datetime`] for wire structs.
pub fn deserialize_usgs_datetime<'de, D: Deserializer<'de>>(
    d: D,
) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    parse_usgs_datetime(&raw)
        .ok_or_else(|| de::Error::custom(format!("unrecognized USGS timestamp \"{raw}\"")))
}

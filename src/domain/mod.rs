/// Domain models for the application
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The two Landsat satellites that alternate over a given path/row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Satellite {
    Landsat8,
    Landsat9,
}

impl Satellite {
    /// Satellite number as used in USGS metadata filters.
    pub fn number(self) -> u8 {
        match self {
            Satellite::Landsat8 => 8,
            Satellite::Landsat9 => 9,
        }
    }
}

impl fmt::Display for Satellite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Landsat {}", self.number())
    }
}

/// WRS-2 grid coordinates identifying a fixed ground footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PathRow {
    pub path: i32,
    pub row: i32,
}

/// Date sample extracted from one scene record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneDateInfo {
    pub publish_date: DateTime<Utc>,
    pub acquisition_start: DateTime<Utc>,
    pub acquisition_end: DateTime<Utc>,
}

/// Forecast for the next acquisition over a path/row.
///
/// The confidence values come from a heuristic decay curve over gap variance,
/// not a statistical confidence interval. They can go below zero when the
/// observed cadence is extremely irregular.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub predicted_acquisition_date: DateTime<Utc>,
    #[serde(with = "duration_micros")]
    pub avg_acquisition_interval: Duration,
    pub acquisition_confidence: f64,
    pub predicted_publish_date: DateTime<Utc>,
    #[serde(with = "duration_micros")]
    pub avg_publish_interval: Duration,
    pub publish_confidence: f64,
    pub predicted_satellite: Satellite,
}

/// A user account. Authentication lives outside this service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
}

/// A user's subscription to acquisition notifications for a path/row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: Uuid,
    pub path: i32,
    pub row: i32,
    pub latitude: f64,
    pub longitude: f64,
    pub min_cloud_cover: Option<f64>,
    pub max_cloud_cover: Option<f64>,
    /// How far ahead of the predicted acquisition the owner wants to be told.
    #[serde(with = "duration_seconds")]
    pub notification_offset: Duration,
}

/// Key identifying one notification opportunity. A fresh prediction cycle
/// produces a new predicted date and therefore a new key, which reopens the
/// opportunity for the same target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationKey {
    pub path: i32,
    pub row: i32,
    pub user_id: Uuid,
    pub target_id: Uuid,
    pub predicted_acquisition: DateTime<Utc>,
}

/// Dedup ledger row for a notification opportunity.
#[derive(Debug, Clone, Copy)]
pub struct NotificationRecord {
    pub key: NotificationKey,
    pub has_been_notified: bool,
}

/// Health check response
#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub now: DateTime<Utc>,
}

/// Serialize a `chrono::Duration` as whole microseconds.
pub mod duration_micros {
    use chrono::Duration;
    use serde::{ser, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        let micros = d
            .num_microseconds()
            .ok_or_else(|| ser::Error::custom("duration overflows microseconds"))?;
        s.serialize_i64(micros)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let micros = i64::deserialize(d)?;
        Ok(Duration::microseconds(micros))
    }
}

/// Serialize a `chrono::Duration` as whole seconds.
pub mod duration_seconds {
    use chrono::Duration;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(d)?;
        Duration::try_seconds(secs).ok_or_else(|| de::Error::custom("duration overflows seconds"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_prediction_round_trips_through_json() {
        let prediction = Prediction {
            predicted_acquisition_date: Utc.with_ymd_and_hms(2024, 1, 16, 18, 24, 46).unwrap(),
            avg_acquisition_interval: Duration::days(8) + Duration::microseconds(123),
            acquisition_confidence: 0.97,
            predicted_publish_date: Utc.with_ymd_and_hms(2024, 1, 17, 2, 0, 0).unwrap(),
            avg_publish_interval: Duration::days(8) + Duration::seconds(42),
            publish_confidence: 0.91,
            predicted_satellite: Satellite::Landsat9,
        };

        let json = serde_json::to_string(&prediction).unwrap();
        let back: Prediction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, prediction);
    }

    #[test]
    fn test_satellite_numbers() {
        assert_eq!(Satellite::Landsat8.number(), 8);
        assert_eq!(Satellite::Landsat9.number(), 9);
        assert_eq!(Satellite::Landsat9.to_string(), "Landsat 9");
    }

    #[test]
    fn test_path_row_ordering_is_stable() {
        let mut pairs = vec![
            PathRow { path: 14, row: 28 },
            PathRow { path: 13, row: 33 },
            PathRow { path: 14, row: 27 },
        ];
        pairs.sort();
        assert_eq!(pairs[0], PathRow { path: 13, row: 33 });
        assert_eq!(pairs[1], PathRow { path: 14, row: 27 });
    }
}

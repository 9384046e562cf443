//! Wire types for the Open-Meteo historical archive (`/v1/archive`).
//!
//! Scope: the subset of the response needed for hourly ingest. The archive returns
//! column-oriented arrays (`hourly.time[i]` pairs with `hourly.temperature_2m[i]`, …);
//! [`ArchiveResponse::into_readings`] zips them into row-oriented [`HourlyReading`]s.

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer};

use crate::models::weather::HourlyReading;

/// Hourly variables requested from the archive, in request order.
pub const HOURLY_VARIABLES: [&str; 5] = [
    "temperature_2m",
    "relative_humidity_2m",
    "dew_point_2m",
    "wind_speed_10m",
    "precipitation",
];

/// Local timestamps as emitted with `timezone=auto` (e.g. `2019-01-01T00:00`).
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveResponse {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub utc_offset_seconds: Option<i32>,
    pub hourly: HourlyColumns,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HourlyColumns {
    #[serde(deserialize_with = "deserialize_times")]
    pub time: Vec<NaiveDateTime>,
    pub temperature_2m: Vec<Option<f64>>,
    pub relative_humidity_2m: Vec<Option<f64>>,
    pub dew_point_2m: Vec<Option<f64>>,
    pub wind_speed_10m: Vec<Option<f64>>,
    pub precipitation: Vec<Option<f64>>,
}

/// Error body returned by the API for rejected requests.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

/// A column whose length disagrees with `hourly.time`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnLengthMismatch {
    pub column: &'static str,
    pub expected: usize,
    pub actual: usize,
}

fn deserialize_times<'de, D>(deserializer: D) -> Result<Vec<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<String> = Vec::deserialize(deserializer)?;
    raw.iter()
        .map(|s| {
            NaiveDateTime::parse_from_str(s, TIME_FORMAT)
                .map_err(|e| serde::de::Error::custom(format!("invalid timestamp {:?}: {}", s, e)))
        })
        .collect()
}

impl ArchiveResponse {
    /// Zip the column arrays into readings, in archive order.
    pub fn into_readings(self) -> Result<Vec<HourlyReading>, ColumnLengthMismatch> {
        let HourlyColumns {
            time,
            temperature_2m,
            relative_humidity_2m,
            dew_point_2m,
            wind_speed_10m,
            precipitation,
        } = self.hourly;

        let expected = time.len();
        for (column, actual) in [
            ("temperature_2m", temperature_2m.len()),
            ("relative_humidity_2m", relative_humidity_2m.len()),
            ("dew_point_2m", dew_point_2m.len()),
            ("wind_speed_10m", wind_speed_10m.len()),
            ("precipitation", precipitation.len()),
        ] {
            if actual != expected {
                return Err(ColumnLengthMismatch {
                    column,
                    expected,
                    actual,
                });
            }
        }

        let readings = time
            .into_iter()
            .enumerate()
            .map(|(i, timestamp)| HourlyReading {
                timestamp,
                temperature_c: temperature_2m[i],
                humidity_pct: relative_humidity_2m[i],
                dew_point_c: dew_point_2m[i],
                wind_speed_kmh: wind_speed_10m[i],
                precipitation_mm: precipitation[i],
            })
            .collect();
        Ok(readings)
    }
}

/// Drop trailing hours for which the archive has not published anything yet.
///
/// Returns the number of readings removed. Interior empty hours are kept so the
/// aggregator can reject them.
pub fn trim_unpublished_tail(readings: &mut Vec<HourlyReading>) -> usize {
    let keep = readings
        .iter()
        .rposition(|r| !r.is_empty())
        .map(|idx| idx + 1)
        .unwrap_or(0);
    let removed = readings.len() - keep;
    readings.truncate(keep);
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_fixture() -> ArchiveResponse {
        let json = std::fs::read_to_string("tests/data/archive-sample.json").expect("fixture present");
        serde_json::from_str(&json).expect("parse archive response")
    }

    #[test]
    fn parses_fixture_into_ordered_readings() {
        let response = load_fixture();
        assert_eq!(response.timezone.as_deref(), Some("Asia/Baghdad"));
        let readings = response.into_readings().expect("columns aligned");
        assert_eq!(readings.len(), 30);
        assert!(readings.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(readings[0].timestamp.to_string(), "2024-01-01 00:00:00");
        assert_eq!(readings[0].humidity_pct, Some(91.0));
    }

    #[test]
    fn fixture_tail_is_unpublished() {
        let mut readings = load_fixture().into_readings().expect("columns aligned");
        let removed = trim_unpublished_tail(&mut readings);
        assert_eq!(removed, 2);
        assert_eq!(readings.len(), 28);
        assert!(!readings.last().expect("non-empty").is_empty());
    }

    #[test]
    fn rejects_misaligned_columns() {
        let json = r#"{
            "latitude": 32.5, "longitude": 45.75,
            "hourly": {
                "time": ["2024-01-01T00:00", "2024-01-01T01:00"],
                "temperature_2m": [1.0, 2.0],
                "relative_humidity_2m": [50.0],
                "dew_point_2m": [0.0, 0.0],
                "wind_speed_10m": [3.0, 3.0],
                "precipitation": [0.0, 0.0]
            }
        }"#;
        let response: ArchiveResponse = serde_json::from_str(json).expect("parse");
        let err = response.into_readings().expect_err("mismatch");
        assert_eq!(err.column, "relative_humidity_2m");
        assert_eq!(err.expected, 2);
        assert_eq!(err.actual, 1);
    }

    #[test]
    fn rejects_bad_timestamps() {
        let json = r#"{
            "latitude": 32.5, "longitude": 45.75,
            "hourly": {
                "time": ["yesterday"],
                "temperature_2m": [1.0],
                "relative_humidity_2m": [50.0],
                "dew_point_2m": [0.0],
                "wind_speed_10m": [3.0],
                "precipitation": [0.0]
            }
        }"#;
        assert!(serde_json::from_str::<ArchiveResponse>(json).is_err());
    }

    #[test]
    fn trim_keeps_interior_gaps() {
        let ts = |h: u32| {
            chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
                .and_then(|d| d.and_hms_opt(h, 0, 0))
                .expect("valid")
        };
        let empty = |h| HourlyReading {
            timestamp: ts(h),
            temperature_c: None,
            humidity_pct: None,
            dew_point_c: None,
            wind_speed_kmh: None,
            precipitation_mm: None,
        };
        let mut readings = vec![
            HourlyReading::complete(ts(0), 10.0, 50.0, 0.0, 5.0, 0.0),
            empty(1),
            HourlyReading::complete(ts(2), 10.0, 50.0, 0.0, 5.0, 0.0),
            empty(3),
        ];
        assert_eq!(trim_unpublished_tail(&mut readings), 1);
        assert_eq!(readings.len(), 3);
        assert!(readings[1].is_empty());
    }
}

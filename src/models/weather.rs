//! Domain records flowing through the yield pipeline.
//!
//! Hourly readings are produced by the ingest layer (or the synthetic generator),
//! reduced into [`DailySummary`] rows, labelled into [`YieldRecord`] rows and finally
//! viewed through the report types.
//!
//! Timestamps are local to the observed site (the archive is queried with
//! `timezone=auto`), so a reading's calendar day is simply `timestamp.date()`.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Measured fields of an hourly reading, used to name the field in errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Field {
    Temperature,
    Humidity,
    DewPoint,
    WindSpeed,
    Precipitation,
}

impl Field {
    /// Column name used by the archive API.
    pub fn api_name(self) -> &'static str {
        match self {
            Field::Temperature => "temperature_2m",
            Field::Humidity => "relative_humidity_2m",
            Field::DewPoint => "dew_point_2m",
            Field::WindSpeed => "wind_speed_10m",
            Field::Precipitation => "precipitation",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.api_name())
    }
}

/// Missing or malformed fields in input records.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataFormatError {
    #[error("reading at {timestamp} is missing {field}")]
    MissingField { timestamp: NaiveDateTime, field: Field },
    #[error("reading at {timestamp} has {field}={value}, outside the physical range")]
    OutOfRange {
        timestamp: NaiveDateTime,
        field: Field,
        value: f64,
    },
    #[error("reading at {timestamp} does not follow {previous}; timestamps must be strictly increasing")]
    OutOfOrder {
        previous: NaiveDateTime,
        timestamp: NaiveDateTime,
    },
}

/// One hourly observation. Any measured value may be absent when the archive has no data.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyReading {
    pub timestamp: NaiveDateTime,
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub dew_point_c: Option<f64>,
    pub wind_speed_kmh: Option<f64>,
    pub precipitation_mm: Option<f64>,
}

impl HourlyReading {
    /// A reading with every measured field present.
    pub fn complete(
        timestamp: NaiveDateTime,
        temperature_c: f64,
        humidity_pct: f64,
        dew_point_c: f64,
        wind_speed_kmh: f64,
        precipitation_mm: f64,
    ) -> Self {
        HourlyReading {
            timestamp,
            temperature_c: Some(temperature_c),
            humidity_pct: Some(humidity_pct),
            dew_point_c: Some(dew_point_c),
            wind_speed_kmh: Some(wind_speed_kmh),
            precipitation_mm: Some(precipitation_mm),
        }
    }

    /// True when the archive reported nothing at all for this hour.
    pub fn is_empty(&self) -> bool {
        self.temperature_c.is_none()
            && self.humidity_pct.is_none()
            && self.dew_point_c.is_none()
            && self.wind_speed_kmh.is_none()
            && self.precipitation_mm.is_none()
    }

    pub fn day(&self) -> NaiveDate {
        self.timestamp.date()
    }
}

/// Reduced statistics for one calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub temp_max: f64,
    pub temp_min: f64,
    pub temp_mean: f64,
    pub humidity_mean: f64,
    pub wind_max: f64,
    pub precip_sum: f64,
    pub dewpoint_mean: f64,
    /// Number of hourly readings reduced into this row.
    pub hours: u32,
}

impl DailySummary {
    pub fn temp_spread(&self) -> f64 {
        self.temp_max - self.temp_min
    }
}

/// A daily summary labelled with the dew and fog yields (L/m²).
#[derive(Debug, Clone, PartialEq)]
pub struct YieldRecord {
    pub summary: DailySummary,
    pub dew_yield: f64,
    pub fog_yield: f64,
}

impl YieldRecord {
    pub fn date(&self) -> NaiveDate {
        self.summary.date
    }

    pub fn total_yield(&self) -> f64 {
        self.dew_yield + self.fog_yield
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnualSummary {
    pub year: i32,
    pub dew_yield: f64,
    pub fog_yield: f64,
    pub total: f64,
}

/// Cross-year mean for one month of the year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlySummary {
    pub month: u32,
    pub dew_yield: f64,
    pub fog_yield: f64,
    pub days: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DewConditions {
    pub humidity_mean: f64,
    pub temp_max: f64,
    pub temp_min: f64,
    pub days: usize,
}

impl DewConditions {
    pub fn temp_drop(&self) -> f64 {
        self.temp_max - self.temp_min
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FogConditions {
    pub humidity_mean: f64,
    pub wind_max: f64,
    pub days: usize,
}

/// Mean weather on yield-positive days. `None` means the mechanism never triggered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimalConditions {
    pub dew: Option<DewConditions>,
    pub fog: Option<FogConditions>,
}

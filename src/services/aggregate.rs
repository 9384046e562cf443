//! Hourly → daily reduction.

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use std::collections::BTreeMap;

use crate::models::weather::{DailySummary, DataFormatError, Field, HourlyReading};

pub const HOURS_PER_DAY: u32 = 24;

/// How to treat calendar days with fewer than [`HOURS_PER_DAY`] readings at the edges of the range.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum PartialDayPolicy {
    /// Reduce whatever readings exist for every day.
    #[default]
    Include,
    /// Drop the first and/or last day of the input when incomplete. Interior days are always kept.
    DropIncompleteBoundary,
}

impl std::str::FromStr for PartialDayPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "include" => Ok(PartialDayPolicy::Include),
            "drop-boundary" | "drop_boundary" => Ok(PartialDayPolicy::DropIncompleteBoundary),
            other => Err(format!(
                "unknown partial day policy {:?} (expected include or drop-boundary)",
                other
            )),
        }
    }
}

/// A reading whose every value is present and physically plausible.
struct CheckedReading {
    temperature_c: f64,
    humidity_pct: f64,
    dew_point_c: f64,
    wind_speed_kmh: f64,
    precipitation_mm: f64,
}

fn require(timestamp: NaiveDateTime, field: Field, value: Option<f64>) -> Result<f64, DataFormatError> {
    let value = value.ok_or(DataFormatError::MissingField { timestamp, field })?;
    let plausible = value.is_finite()
        && match field {
            Field::Humidity => (0.0..=100.0).contains(&value),
            Field::WindSpeed | Field::Precipitation => value >= 0.0,
            Field::Temperature | Field::DewPoint => true,
        };
    if plausible {
        Ok(value)
    } else {
        Err(DataFormatError::OutOfRange { timestamp, field, value })
    }
}

fn check(reading: &HourlyReading) -> Result<CheckedReading, DataFormatError> {
    let ts = reading.timestamp;
    Ok(CheckedReading {
        temperature_c: require(ts, Field::Temperature, reading.temperature_c)?,
        humidity_pct: require(ts, Field::Humidity, reading.humidity_pct)?,
        dew_point_c: require(ts, Field::DewPoint, reading.dew_point_c)?,
        wind_speed_kmh: require(ts, Field::WindSpeed, reading.wind_speed_kmh)?,
        precipitation_mm: require(ts, Field::Precipitation, reading.precipitation_mm)?,
    })
}

#[derive(Default)]
struct DayAccumulator {
    hours: u32,
    temp_max: f64,
    temp_min: f64,
    temp_sum: f64,
    humidity_sum: f64,
    wind_max: f64,
    precip_sum: f64,
    dewpoint_sum: f64,
}

impl DayAccumulator {
    fn push(&mut self, r: &CheckedReading) {
        if self.hours == 0 {
            self.temp_max = r.temperature_c;
            self.temp_min = r.temperature_c;
            self.wind_max = r.wind_speed_kmh;
        } else {
            self.temp_max = self.temp_max.max(r.temperature_c);
            self.temp_min = self.temp_min.min(r.temperature_c);
            self.wind_max = self.wind_max.max(r.wind_speed_kmh);
        }
        self.hours += 1;
        self.temp_sum += r.temperature_c;
        self.humidity_sum += r.humidity_pct;
        self.precip_sum += r.precipitation_mm;
        self.dewpoint_sum += r.dew_point_c;
    }

    fn finish(self, date: NaiveDate) -> DailySummary {
        let n = self.hours as f64;
        DailySummary {
            date,
            temp_max: self.temp_max,
            temp_min: self.temp_min,
            temp_mean: self.temp_sum / n,
            // Rounding can push a mean of all-100% readings a hair past the bound.
            humidity_mean: (self.humidity_sum / n).clamp(0.0, 100.0),
            wind_max: self.wind_max,
            precip_sum: self.precip_sum,
            dewpoint_mean: self.dewpoint_sum / n,
            hours: self.hours,
        }
    }
}

/// Reduce ordered hourly readings to one summary per calendar day, ascending by date.
///
/// Fails on the first reading with a missing or implausible value, or when timestamps are
/// not strictly increasing. Empty input yields an empty result.
pub fn aggregate_daily(
    readings: &[HourlyReading],
    policy: PartialDayPolicy,
) -> Result<Vec<DailySummary>, DataFormatError> {
    let mut days: BTreeMap<NaiveDate, DayAccumulator> = BTreeMap::new();
    let mut previous: Option<NaiveDateTime> = None;

    for reading in readings {
        if let Some(prev) = previous
            && reading.timestamp <= prev
        {
            return Err(DataFormatError::OutOfOrder {
                previous: prev,
                timestamp: reading.timestamp,
            });
        }
        previous = Some(reading.timestamp);

        let checked = check(reading)?;
        days.entry(reading.day()).or_default().push(&checked);
    }

    let mut summaries: Vec<DailySummary> = days.into_iter().map(|(date, acc)| acc.finish(date)).collect();

    if policy == PartialDayPolicy::DropIncompleteBoundary {
        drop_incomplete_boundary_days(&mut summaries);
    }

    let partial = summaries.iter().filter(|d| d.hours < HOURS_PER_DAY).count();
    if partial > 0 {
        debug!("Aggregate: {} day(s) have fewer than {} readings", partial, HOURS_PER_DAY);
    }
    info!(
        "Aggregate: reduced {} hourly reading(s) into {} day(s)",
        readings.len(),
        summaries.len()
    );
    Ok(summaries)
}

fn drop_incomplete_boundary_days(summaries: &mut Vec<DailySummary>) {
    if summaries.last().is_some_and(|d| d.hours < HOURS_PER_DAY)
        && let Some(last) = summaries.pop()
    {
        info!("Aggregate: dropping incomplete last day {} ({}h)", last.date, last.hours);
    }
    if summaries.first().is_some_and(|d| d.hours < HOURS_PER_DAY) {
        let first = summaries.remove(0);
        info!("Aggregate: dropping incomplete first day {} ({}h)", first.date, first.hours);
    }
}

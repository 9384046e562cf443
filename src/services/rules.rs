//! Rule-based dew and fog yield labels.
//!
//! Both mechanisms are evaluated independently; a day can register both, one or neither.
//! Comparisons are strict except where noted on the field.

use log::info;

use crate::models::weather::{DailySummary, YieldRecord};

/// Thresholds and per-mechanism yield constants (L/m²/day).
#[derive(Debug, Clone, PartialEq)]
pub struct YieldRules {
    /// Dew requires `humidity_mean >` this.
    pub dew_humidity_min: f64,
    /// Dew requires `temp_max - temp_min >` this.
    pub dew_temp_spread_min: f64,
    /// Dew requires `wind_max <` this.
    pub dew_wind_max: f64,
    /// Dew requires `precip_sum <=` this; the default of 0 means a dry day.
    pub dew_precip_max: f64,
    pub dew_yield: f64,
    /// Fog requires `humidity_mean >` this.
    pub fog_humidity_min: f64,
    /// Fog requires `fog_wind_min <= wind_max <= fog_wind_max`.
    pub fog_wind_min: f64,
    pub fog_wind_max: f64,
    pub fog_yield: f64,
}

impl Default for YieldRules {
    fn default() -> Self {
        YieldRules {
            dew_humidity_min: 80.0,
            dew_temp_spread_min: 5.0,
            dew_wind_max: 15.0,
            dew_precip_max: 0.0,
            // 1 L/m²/day at 75% collection efficiency
            dew_yield: 0.75,
            fog_humidity_min: 85.0,
            fog_wind_min: 5.0,
            fog_wind_max: 35.0,
            // 3 L/m²/day at 60% collection efficiency
            fog_yield: 1.8,
        }
    }
}

impl YieldRules {
    pub fn validate(&self) -> Result<(), String> {
        let values = [
            ("dew_humidity_min", self.dew_humidity_min),
            ("dew_temp_spread_min", self.dew_temp_spread_min),
            ("dew_wind_max", self.dew_wind_max),
            ("dew_precip_max", self.dew_precip_max),
            ("dew_yield", self.dew_yield),
            ("fog_humidity_min", self.fog_humidity_min),
            ("fog_wind_min", self.fog_wind_min),
            ("fog_wind_max", self.fog_wind_max),
            ("fog_yield", self.fog_yield),
        ];
        if let Some((name, _)) = values.iter().find(|(_, v)| !v.is_finite()) {
            return Err(format!("yield rule {} must be a finite number", name));
        }
        if self.dew_yield < 0.0 || self.fog_yield < 0.0 {
            return Err("yield constants must not be negative".to_string());
        }
        if self.dew_precip_max < 0.0 {
            return Err("dew_precip_max must not be negative".to_string());
        }
        if self.fog_wind_min > self.fog_wind_max {
            return Err(format!(
                "fog wind bounds are inverted ({} > {})",
                self.fog_wind_min, self.fog_wind_max
            ));
        }
        Ok(())
    }

    pub fn dew_favorable(&self, day: &DailySummary) -> bool {
        day.humidity_mean > self.dew_humidity_min
            && day.temp_spread() > self.dew_temp_spread_min
            && day.wind_max < self.dew_wind_max
            && day.precip_sum <= self.dew_precip_max
    }

    pub fn fog_favorable(&self, day: &DailySummary) -> bool {
        day.humidity_mean > self.fog_humidity_min
            && day.wind_max >= self.fog_wind_min
            && day.wind_max <= self.fog_wind_max
    }

    pub fn apply(&self, day: DailySummary) -> YieldRecord {
        let dew_yield = if self.dew_favorable(&day) { self.dew_yield } else { 0.0 };
        let fog_yield = if self.fog_favorable(&day) { self.fog_yield } else { 0.0 };
        YieldRecord {
            summary: day,
            dew_yield,
            fog_yield,
        }
    }
}

/// Label every day, preserving order.
pub fn label_days(rules: &YieldRules, days: Vec<DailySummary>) -> Vec<YieldRecord> {
    let records: Vec<YieldRecord> = days.into_iter().map(|d| rules.apply(d)).collect();
    let dew_days = records.iter().filter(|r| r.dew_yield > 0.0).count();
    let fog_days = records.iter().filter(|r| r.fog_yield > 0.0).count();
    info!(
        "Rules: labelled {} day(s) (dew-favorable={}, fog-favorable={})",
        records.len(),
        dew_days,
        fog_days
    );
    records
}

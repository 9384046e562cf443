//! Deterministic synthetic hourly weather for offline runs and tests.
//!
//! Shapes loosely follow a hot-arid river plain: dry summers with large diurnal swings,
//! mild winters with humid nights, occasional rain and humid spells.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use log::info;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;

use crate::models::weather::HourlyReading;

pub const DEFAULT_SEED: u64 = 0x0420_1337_DEAD_BEEFu64;

/// Per-day weather regime drawn once, shared by that day's hours.
struct DayRegime {
    humid_spell: bool,
    rain: bool,
    wind_level: f64,
}

/// Hourly readings for `start..=end` (local calendar days), strictly increasing.
pub fn generate_hourly(start: NaiveDate, end: NaiveDate, seed: u64) -> Result<Vec<HourlyReading>, String> {
    if start > end {
        return Err(format!("Fake data requires start {} not after end {}", start, end));
    }
    let mut rng = SmallRng::seed_from_u64(seed);
    let days = (end - start).num_days() + 1;
    let mut readings = Vec::with_capacity(days as usize * 24);

    let mut day = start;
    while day <= end {
        let annual_fraction = day.ordinal0() as f64 / 365.0;
        let regime = draw_regime(annual_fraction, &mut rng);
        let midnight = NaiveDateTime::new(day, NaiveTime::MIN);
        for hour in 0..24 {
            let timestamp = midnight + TimeDelta::hours(hour);
            readings.push(compute_hour(timestamp, annual_fraction, hour as f64 / 24.0, &regime, &mut rng));
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }

    info!(
        "Fake data: generated {} hourly reading(s) from {} to {}",
        readings.len(),
        start,
        end
    );
    Ok(readings)
}

/// 1.0 in mid-winter (mid January), -1.0 in mid-summer.
fn winterness(annual_fraction: f64) -> f64 {
    ((annual_fraction - 0.04) * 2.0 * PI).cos()
}

fn draw_regime(annual_fraction: f64, rng: &mut SmallRng) -> DayRegime {
    let winter = winterness(annual_fraction).max(0.0);
    DayRegime {
        humid_spell: rng.random_bool(0.05 + 0.35 * winter),
        rain: rng.random_bool(0.01 + 0.12 * winter),
        wind_level: rng.random_range(3.0..=22.0),
    }
}

fn compute_hour(
    timestamp: NaiveDateTime,
    annual_fraction: f64,
    day_fraction: f64,
    regime: &DayRegime,
    rng: &mut SmallRng,
) -> HourlyReading {
    let winter = winterness(annual_fraction);
    // Peaks mid afternoon, bottoms before dawn.
    let diurnal = ((day_fraction - 0.375) * 2.0 * PI).sin();

    let seasonal_mean = 24.0 - 13.0 * winter;
    let amplitude = 7.5 - 1.5 * winter;
    let temperature = seasonal_mean + amplitude * diurnal + rng.random_range(-1.2..=1.2);

    let base_humidity = 42.0 + 22.0 * winter;
    let spell = if regime.humid_spell { 28.0 } else { 0.0 };
    let rain_boost = if regime.rain { 15.0 } else { 0.0 };
    let humidity =
        (base_humidity + spell + rain_boost - 14.0 * diurnal + rng.random_range(-5.0..=5.0)).clamp(5.0, 100.0);

    let wind = (regime.wind_level * (1.0 + 0.35 * diurnal) + rng.random_range(-2.0..=2.0)).max(0.0);

    let precipitation = if regime.rain && rng.random_bool(0.3) {
        (rng.random_range(0.1..=3.0_f64) * 10.0).round() / 10.0
    } else {
        0.0
    };

    HourlyReading::complete(
        timestamp,
        round1(temperature),
        humidity.round(),
        round1(dew_point(temperature, humidity)),
        round1(wind),
        precipitation,
    )
}

/// Magnus-Tetens approximation.
fn dew_point(temp_c: f64, rh_pct: f64) -> f64 {
    const A: f64 = 17.62;
    const B: f64 = 243.12;
    let gamma = (rh_pct.max(1.0) / 100.0).ln() + A * temp_c / (B + temp_c);
    B * gamma / (A - gamma)
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

//! Runtime configuration read from the environment.
//! Defaults reproduce the Kut (Iraq) study site.

use chrono::NaiveDate;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::services::aggregate::PartialDayPolicy;
use crate::services::rules::YieldRules;
use crate::services::serving::YieldBands;

pub const DEFAULT_SITE: &str = "kut";
pub const DEFAULT_LATITUDE: f64 = 32.51;
pub const DEFAULT_LONGITUDE: f64 = 45.77;
pub const DEFAULT_START_DATE: &str = "2019-01-01";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_REQUEST_RETRIES: u32 = 3;

#[derive(Debug, Clone)]
pub struct Config {
    /// Short name used in chart titles, file names and the database key.
    pub site: String,
    pub latitude: f64,
    pub longitude: f64,
    pub start_date: NaiveDate,
    /// `None` means today at run time.
    pub end_date: Option<NaiveDate>,
    /// IANA name or `auto` for the coordinate's local zone.
    pub timezone: String,
    pub output_csv: PathBuf,
    pub chart_dir: PathBuf,
    pub charts_enabled: bool,
    /// Daily yields are also upserted to PostgreSQL when set.
    pub database_url: Option<String>,
    pub model_path: PathBuf,
    pub max_request_retries: NonZeroU32,
    pub request_timeout: Duration,
    pub partial_days: PartialDayPolicy,
    pub rules: YieldRules,
    pub bands: YieldBands,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let site = get("SITE_NAME").unwrap_or_else(|| DEFAULT_SITE.to_string());
        if site.chars().any(|c| c == '/' || c == '\\') {
            return Err(format!("SITE_NAME must not contain path separators: {}", site));
        }

        let latitude = parse_or(&get, "LATITUDE", DEFAULT_LATITUDE)?;
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(format!("LATITUDE must be within -90..=90, got {}", latitude));
        }
        let longitude = parse_or(&get, "LONGITUDE", DEFAULT_LONGITUDE)?;
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(format!("LONGITUDE must be within -180..=180, got {}", longitude));
        }

        let start_date = match get("START_DATE") {
            Some(s) => parse_date("START_DATE", &s)?,
            None => parse_date("START_DATE", DEFAULT_START_DATE)?,
        };
        let end_date = get("END_DATE").map(|s| parse_date("END_DATE", &s)).transpose()?;
        if let Some(end) = end_date
            && end < start_date
        {
            return Err(format!("END_DATE {} is before START_DATE {}", end, start_date));
        }

        let max_request_retries = NonZeroU32::new(parse_or(&get, "MAX_REQUEST_RETRIES", DEFAULT_MAX_REQUEST_RETRIES)?)
            .ok_or_else(|| "MAX_REQUEST_RETRIES must be at least 1".to_string())?;
        let timeout_secs = parse_or(&get, "REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err("REQUEST_TIMEOUT_SECS must be at least 1".to_string());
        }

        let defaults = YieldRules::default();
        let rules = YieldRules {
            dew_humidity_min: parse_or(&get, "DEW_HUMIDITY_MIN", defaults.dew_humidity_min)?,
            dew_temp_spread_min: parse_or(&get, "DEW_TEMP_SPREAD_MIN", defaults.dew_temp_spread_min)?,
            dew_wind_max: parse_or(&get, "DEW_WIND_MAX", defaults.dew_wind_max)?,
            dew_precip_max: parse_or(&get, "DEW_PRECIP_MAX", defaults.dew_precip_max)?,
            dew_yield: parse_or(&get, "DEW_YIELD", defaults.dew_yield)?,
            fog_humidity_min: parse_or(&get, "FOG_HUMIDITY_MIN", defaults.fog_humidity_min)?,
            fog_wind_min: parse_or(&get, "FOG_WIND_MIN", defaults.fog_wind_min)?,
            fog_wind_max: parse_or(&get, "FOG_WIND_MAX", defaults.fog_wind_max)?,
            fog_yield: parse_or(&get, "FOG_YIELD", defaults.fog_yield)?,
        };
        rules.validate()?;

        let default_bands = YieldBands::default();
        let bands = YieldBands {
            excellent_above: parse_or(&get, "BAND_EXCELLENT_ABOVE", default_bands.excellent_above)?,
            marginal_above: parse_or(&get, "BAND_MARGINAL_ABOVE", default_bands.marginal_above)?,
        };
        bands.validate()?;

        Ok(Config {
            output_csv: get("OUTPUT_CSV")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(format!("{}_water_analysis.csv", site))),
            chart_dir: get("CHART_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            charts_enabled: parse_bool(&get, "CHARTS_ENABLED", true)?,
            database_url: get("DATABASE_URL"),
            model_path: get("MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(format!("{}_dew_predictor.json", site))),
            timezone: get("TIMEZONE").unwrap_or_else(|| "auto".to_string()),
            partial_days: parse_or(&get, "PARTIAL_DAYS", PartialDayPolicy::default())?,
            request_timeout: Duration::from_secs(timeout_secs),
            site,
            latitude,
            longitude,
            start_date,
            end_date,
            max_request_retries,
            rules,
            bands,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(s) => s.parse::<T>().map_err(|e| format!("{} is invalid ({}): {}", key, s, e)),
        None => Ok(default),
    }
}

fn parse_bool(get: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool, String> {
    match get(key).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "TRUE" | "yes") => Ok(true),
        Some("0" | "false" | "FALSE" | "no") => Ok(false),
        Some(other) => Err(format!("{} must be true or false, got {}", key, other)),
    }
}

fn parse_date(key: &str, s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| format!("{} must be in YYYY-MM-DD format, got {}", key, s))
}

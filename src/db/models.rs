//! Diesel model structs for persisted daily yields.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;

use crate::models::weather::{DailySummary, YieldRecord};
use crate::schema;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = schema::daily_yields)]
pub struct DailyYield {
    pub site: String,
    pub day: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
    pub temp_max_c: f64,
    pub temp_min_c: f64,
    pub temp_mean_c: f64,
    pub humidity_mean_pct: f64,
    pub wind_max_kmh: f64,
    pub precip_sum_mm: f64,
    pub dewpoint_mean_c: f64,
    pub hours: i32,
    pub dew_yield: f64,
    pub fog_yield: f64,
    pub updated_at: DateTime<Utc>,
}

impl DailyYield {
    pub fn into_record(self) -> YieldRecord {
        YieldRecord {
            summary: DailySummary {
                date: self.day,
                temp_max: self.temp_max_c,
                temp_min: self.temp_min_c,
                temp_mean: self.temp_mean_c,
                humidity_mean: self.humidity_mean_pct,
                wind_max: self.wind_max_kmh,
                precip_sum: self.precip_sum_mm,
                dewpoint_mean: self.dewpoint_mean_c,
                hours: self.hours.max(0) as u32,
            },
            dew_yield: self.dew_yield,
            fog_yield: self.fog_yield,
        }
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::daily_yields)]
pub struct NewDailyYield {
    pub site: String,
    pub day: NaiveDate,
    pub latitude: f64,
    pub longitude: f64,
    pub temp_max_c: f64,
    pub temp_min_c: f64,
    pub temp_mean_c: f64,
    pub humidity_mean_pct: f64,
    pub wind_max_kmh: f64,
    pub precip_sum_mm: f64,
    pub dewpoint_mean_c: f64,
    pub hours: i32,
    pub dew_yield: f64,
    pub fog_yield: f64,
}

impl NewDailyYield {
    pub fn new(site: &str, latitude: f64, longitude: f64, record: &YieldRecord) -> Self {
        let s = &record.summary;
        NewDailyYield {
            site: site.to_string(),
            day: s.date,
            latitude,
            longitude,
            temp_max_c: s.temp_max,
            temp_min_c: s.temp_min,
            temp_mean_c: s.temp_mean,
            humidity_mean_pct: s.humidity_mean,
            wind_max_kmh: s.wind_max,
            precip_sum_mm: s.precip_sum,
            dewpoint_mean_c: s.dewpoint_mean,
            hours: i32::try_from(s.hours).unwrap_or(i32::MAX),
            dew_yield: record.dew_yield,
            fog_yield: record.fog_yield,
        }
    }
}

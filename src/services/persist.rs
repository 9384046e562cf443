//! Persistence of labelled days: a CSV table (always) and an optional PostgreSQL table.

use chrono::{NaiveDate, Utc};
use diesel::PgConnection;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::db::models::{DailyYield, NewDailyYield};
use crate::models::weather::{DailySummary, YieldRecord};
use crate::schema;
use crate::utils::write_atomically;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Rows per INSERT; keeps well below PostgreSQL's bind parameter limit.
const INSERT_CHUNK: usize = 1000;

/// One CSV row. Column names are part of the file format and must stay stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    temperature_2m_max: f64,
    temperature_2m_min: f64,
    temperature_2m_mean: f64,
    relative_humidity_2m_mean: f64,
    wind_speed_10m_max: f64,
    precipitation_sum: f64,
    dew_point_2m_mean: f64,
    hours: u32,
    dew_yield: f64,
    fog_yield: f64,
}

impl From<&YieldRecord> for CsvRow {
    fn from(r: &YieldRecord) -> Self {
        let s = &r.summary;
        CsvRow {
            date: s.date,
            temperature_2m_max: s.temp_max,
            temperature_2m_min: s.temp_min,
            temperature_2m_mean: s.temp_mean,
            relative_humidity_2m_mean: s.humidity_mean,
            wind_speed_10m_max: s.wind_max,
            precipitation_sum: s.precip_sum,
            dew_point_2m_mean: s.dewpoint_mean,
            hours: s.hours,
            dew_yield: r.dew_yield,
            fog_yield: r.fog_yield,
        }
    }
}

impl From<CsvRow> for YieldRecord {
    fn from(row: CsvRow) -> Self {
        YieldRecord {
            summary: DailySummary {
                date: row.date,
                temp_max: row.temperature_2m_max,
                temp_min: row.temperature_2m_min,
                temp_mean: row.temperature_2m_mean,
                humidity_mean: row.relative_humidity_2m_mean,
                wind_max: row.wind_speed_10m_max,
                precip_sum: row.precipitation_sum,
                dewpoint_mean: row.dew_point_2m_mean,
                hours: row.hours,
            },
            dew_yield: row.dew_yield,
            fog_yield: row.fog_yield,
        }
    }
}

/// Write the full table, replacing `path` only after every row was written.
pub fn write_csv(path: &Path, records: &[YieldRecord]) -> Result<(), String> {
    write_atomically(path, |file| {
        let mut writer = csv::Writer::from_writer(file);
        for r in records {
            writer
                .serialize(CsvRow::from(r))
                .map_err(|e| format!("write row {} failed: {}", r.date(), e))?;
        }
        writer.flush().map_err(|e| format!("flush csv failed: {}", e))
    })?;
    info!("Persist: wrote {} day(s) to {}", records.len(), path.display());
    Ok(())
}

pub fn read_csv(path: &Path) -> Result<Vec<YieldRecord>, String> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| format!("open {} failed: {}", path.display(), e))?;
    reader
        .deserialize::<CsvRow>()
        .enumerate()
        .map(|(i, row)| {
            row.map(YieldRecord::from)
                .map_err(|e| format!("{}: row {}: {}", path.display(), i + 1, e))
        })
        .collect()
}

pub fn connect(database_url: &str) -> Result<PgConnection, String> {
    let mut conn = PgConnection::establish(database_url).map_err(|e| format!("DB connection failed: {}", e))?;
    info!("Connected to database");
    apply_database_migrations(&mut conn)?;
    Ok(conn)
}

fn apply_database_migrations(conn: &mut PgConnection) -> Result<(), String> {
    match conn.run_pending_migrations(MIGRATIONS) {
        Ok(applied) => {
            if applied.is_empty() {
                info!("Database schema is up to date; no migrations were applied");
            } else {
                let names = applied.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                info!("Applied {} database migration(s): {}", applied.len(), names);
            }
            Ok(())
        }
        Err(e) => Err(format!("Applying database migrations failed: {}", e)),
    }
}

/// Insert or overwrite the given days for `site` in one transaction.
pub fn upsert_daily_yields(
    conn: &mut PgConnection,
    site: &str,
    latitude: f64,
    longitude: f64,
    records: &[YieldRecord],
) -> Result<usize, String> {
    if records.is_empty() {
        return Ok(0);
    }

    use schema::daily_yields::dsl as D;

    let rows: Vec<NewDailyYield> = records
        .iter()
        .map(|r| NewDailyYield::new(site, latitude, longitude, r))
        .collect();

    let written = conn
        .transaction::<usize, diesel::result::Error, _>(|conn| {
            let mut written = 0;
            for chunk in rows.chunks(INSERT_CHUNK) {
                written += diesel::insert_into(D::daily_yields)
                    .values(chunk)
                    .on_conflict((D::site, D::day))
                    .do_update()
                    .set((
                        D::latitude.eq(excluded(D::latitude)),
                        D::longitude.eq(excluded(D::longitude)),
                        D::temp_max_c.eq(excluded(D::temp_max_c)),
                        D::temp_min_c.eq(excluded(D::temp_min_c)),
                        D::temp_mean_c.eq(excluded(D::temp_mean_c)),
                        D::humidity_mean_pct.eq(excluded(D::humidity_mean_pct)),
                        D::wind_max_kmh.eq(excluded(D::wind_max_kmh)),
                        D::precip_sum_mm.eq(excluded(D::precip_sum_mm)),
                        D::dewpoint_mean_c.eq(excluded(D::dewpoint_mean_c)),
                        D::hours.eq(excluded(D::hours)),
                        D::dew_yield.eq(excluded(D::dew_yield)),
                        D::fog_yield.eq(excluded(D::fog_yield)),
                        D::updated_at.eq(Utc::now()),
                    ))
                    .execute(conn)?;
            }
            Ok(written)
        })
        .map_err(|e| format!("upsert daily yields failed: {}", e))?;

    info!("Persist: upserted {} day(s) for site {}", written, site);
    Ok(written)
}

pub fn load_daily_yields(conn: &mut PgConnection, site: &str) -> Result<Vec<YieldRecord>, String> {
    use schema::daily_yields::dsl as D;

    let rows: Vec<DailyYield> = D::daily_yields
        .filter(D::site.eq(site))
        .order(D::day.asc())
        .select(DailyYield::as_select())
        .load(conn)
        .map_err(|e| format!("load daily yields failed: {}", e))?;
    Ok(rows.into_iter().map(DailyYield::into_record).collect())
}

//! Ingest → aggregate → label → report, one pass per run.

use log::info;

use crate::client::{ArchiveQuery, IngestError, ObservationSource};
use crate::models::open_meteo::trim_unpublished_tail;
use crate::models::weather::{DataFormatError, HourlyReading, YieldRecord};
use crate::services::aggregate::{PartialDayPolicy, aggregate_daily};
use crate::services::fake_data;
use crate::services::report::{YieldReport, build_report};
use crate::services::rules::{YieldRules, label_days};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("ingest failed: {0}")]
    Ingest(#[from] IngestError),
    #[error("malformed observations: {0}")]
    DataFormat(#[from] DataFormatError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub records: Vec<YieldRecord>,
    pub report: YieldReport,
    /// Trailing hours dropped because the archive had not published them yet.
    pub unpublished_hours: usize,
}

/// Seeded synthetic weather in place of the archive.
pub struct SyntheticSource {
    pub seed: u64,
}

impl ObservationSource for SyntheticSource {
    fn fetch_hourly(&self, query: &ArchiveQuery) -> Result<Vec<HourlyReading>, IngestError> {
        fake_data::generate_hourly(query.start_date, query.end_date, self.seed).map_err(|message| IngestError::Payload {
            path: "start_date".to_string(),
            message,
        })
    }
}

/// Reduce already-fetched hourly readings to labelled days and their report.
pub fn process_readings(
    mut readings: Vec<HourlyReading>,
    policy: PartialDayPolicy,
    rules: &YieldRules,
) -> Result<PipelineOutput, DataFormatError> {
    let unpublished_hours = trim_unpublished_tail(&mut readings);
    if unpublished_hours > 0 {
        info!("Ingest: dropped {} unpublished trailing hour(s)", unpublished_hours);
    }
    let days = aggregate_daily(&readings, policy)?;
    let records = label_days(rules, days);
    let report = build_report(&records);
    info!(
        "Report: {} year(s), {} month(s) with data",
        report.annual.len(),
        report.monthly.len()
    );
    Ok(PipelineOutput {
        records,
        report,
        unpublished_hours,
    })
}

pub fn run(
    source: &dyn ObservationSource,
    query: &ArchiveQuery,
    policy: PartialDayPolicy,
    rules: &YieldRules,
) -> Result<PipelineOutput, PipelineError> {
    info!(
        "Ingest: fetching ({}, {}) {}..={} timezone={}",
        query.latitude, query.longitude, query.start_date, query.end_date, query.timezone
    );
    let readings = source.fetch_hourly(query)?;
    info!("Ingest: received {} hourly reading(s)", readings.len());
    Ok(process_readings(readings, policy, rules)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::parse_archive;
    use chrono::NaiveDate;

    struct FixtureSource;

    impl ObservationSource for FixtureSource {
        fn fetch_hourly(&self, _query: &ArchiveQuery) -> Result<Vec<HourlyReading>, IngestError> {
            let body = std::fs::read_to_string("tests/data/archive-sample.json").expect("fixture present");
            let archive = parse_archive(&body)?;
            Ok(archive.into_readings().expect("aligned columns"))
        }
    }

    struct FailingSource;

    impl ObservationSource for FailingSource {
        fn fetch_hourly(&self, _query: &ArchiveQuery) -> Result<Vec<HourlyReading>, IngestError> {
            Err(IngestError::Http {
                status: 400,
                message: "Parameter 'start_date' is out of allowed range".to_string(),
            })
        }
    }

    fn query(start: NaiveDate, end: NaiveDate) -> ArchiveQuery {
        ArchiveQuery {
            latitude: 32.51,
            longitude: 45.77,
            start_date: start,
            end_date: end,
            timezone: "auto".to_string(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn fixture_runs_end_to_end() {
        let out = run(
            &FixtureSource,
            &query(date(2024, 1, 1), date(2024, 1, 2)),
            PartialDayPolicy::Include,
            &YieldRules::default(),
        )
        .expect("fixture is well formed");
        assert_eq!(out.unpublished_hours, 2);
        assert_eq!(out.records.len(), 2);
        let first = &out.records[0];
        assert_eq!(first.summary.hours, 24);
        assert_eq!((first.dew_yield, first.fog_yield), (0.75, 1.8));
        assert_eq!(out.report.annual.len(), 1);
        assert_eq!(out.report.annual[0].year, 2024);
    }

    #[test]
    fn dropping_boundary_keeps_complete_days_only() {
        let out = run(
            &FixtureSource,
            &query(date(2024, 1, 1), date(2024, 1, 2)),
            PartialDayPolicy::DropIncompleteBoundary,
            &YieldRules::default(),
        )
        .expect("fixture is well formed");
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].date(), date(2024, 1, 1));
    }

    #[test]
    fn rerunning_is_idempotent() {
        let source = SyntheticSource {
            seed: fake_data::DEFAULT_SEED,
        };
        let q = query(date(2021, 1, 1), date(2021, 12, 31));
        let rules = YieldRules::default();
        let a = run(&source, &q, PartialDayPolicy::Include, &rules).expect("synthetic data is valid");
        let b = run(&source, &q, PartialDayPolicy::Include, &rules).expect("synthetic data is valid");
        assert_eq!(a, b);
        assert_eq!(a.records.len(), 365);
        assert_eq!(a.report.monthly.len(), 12);
    }

    #[test]
    fn ingest_errors_propagate() {
        let err = run(
            &FailingSource,
            &query(date(1900, 1, 1), date(1900, 1, 2)),
            PartialDayPolicy::Include,
            &YieldRules::default(),
        )
        .expect_err("source fails");
        assert!(matches!(err, PipelineError::Ingest(IngestError::Http { status: 400, .. })));
    }

    #[test]
    fn interior_gaps_are_rejected() {
        let mut readings = fake_data::generate_hourly(date(2022, 3, 1), date(2022, 3, 2), 1).expect("valid range");
        readings[5].humidity_pct = None;
        let err = process_readings(readings, PartialDayPolicy::Include, &YieldRules::default()).expect_err("gap");
        assert!(matches!(err, DataFormatError::MissingField { .. }));
    }
}

//! Read-only views over labelled days: annual totals, cross-year monthly means and the
//! mean conditions observed on yield-positive days.

use chrono::Datelike;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::models::weather::{
    AnnualSummary, DewConditions, FogConditions, MonthlySummary, OptimalConditions, YieldRecord,
};
use crate::utils::mean;

#[derive(Debug, Clone, PartialEq)]
pub struct YieldReport {
    pub annual: Vec<AnnualSummary>,
    pub monthly: Vec<MonthlySummary>,
    pub optimal: OptimalConditions,
    pub best_dew_month: Option<u32>,
    pub best_fog_month: Option<u32>,
}

/// Sum per calendar year, ascending. Only years with at least one record appear.
pub fn annual_summary(records: &[YieldRecord]) -> Vec<AnnualSummary> {
    let mut years: BTreeMap<i32, (f64, f64)> = BTreeMap::new();
    for r in records {
        let entry = years.entry(r.date().year()).or_insert((0.0, 0.0));
        entry.0 += r.dew_yield;
        entry.1 += r.fog_yield;
    }
    years
        .into_iter()
        .map(|(year, (dew_yield, fog_yield))| AnnualSummary {
            year,
            dew_yield,
            fog_yield,
            total: dew_yield + fog_yield,
        })
        .collect()
}

/// Mean yield per month of year across every year present, ascending by month.
pub fn monthly_summary(records: &[YieldRecord]) -> Vec<MonthlySummary> {
    let mut months: BTreeMap<u32, (f64, f64, usize)> = BTreeMap::new();
    for r in records {
        let entry = months.entry(r.date().month()).or_insert((0.0, 0.0, 0));
        entry.0 += r.dew_yield;
        entry.1 += r.fog_yield;
        entry.2 += 1;
    }
    months
        .into_iter()
        .map(|(month, (dew, fog, days))| MonthlySummary {
            month,
            dew_yield: dew / days as f64,
            fog_yield: fog / days as f64,
            days,
        })
        .collect()
}

pub fn optimal_conditions(records: &[YieldRecord]) -> OptimalConditions {
    let dew_days: Vec<&YieldRecord> = records.iter().filter(|r| r.dew_yield > 0.0).collect();
    let fog_days: Vec<&YieldRecord> = records.iter().filter(|r| r.fog_yield > 0.0).collect();

    let dew = match (
        mean(dew_days.iter().map(|r| r.summary.humidity_mean)),
        mean(dew_days.iter().map(|r| r.summary.temp_max)),
        mean(dew_days.iter().map(|r| r.summary.temp_min)),
    ) {
        (Some(humidity_mean), Some(temp_max), Some(temp_min)) => Some(DewConditions {
            humidity_mean,
            temp_max,
            temp_min,
            days: dew_days.len(),
        }),
        _ => None,
    };

    let fog = match (
        mean(fog_days.iter().map(|r| r.summary.humidity_mean)),
        mean(fog_days.iter().map(|r| r.summary.wind_max)),
    ) {
        (Some(humidity_mean), Some(wind_max)) => Some(FogConditions {
            humidity_mean,
            wind_max,
            days: fog_days.len(),
        }),
        _ => None,
    };

    OptimalConditions { dew, fog }
}

/// Month with the highest mean; earliest month wins ties. `None` if no month is positive.
pub fn best_month<F>(monthly: &[MonthlySummary], value: F) -> Option<u32>
where
    F: Fn(&MonthlySummary) -> f64,
{
    let mut best: Option<(u32, f64)> = None;
    for m in monthly {
        let v = value(m);
        if v > 0.0 && best.is_none_or(|(_, b)| v > b) {
            best = Some((m.month, v));
        }
    }
    best.map(|(month, _)| month)
}

pub fn build_report(records: &[YieldRecord]) -> YieldReport {
    let annual = annual_summary(records);
    let monthly = monthly_summary(records);
    let optimal = optimal_conditions(records);
    let best_dew_month = best_month(&monthly, |m| m.dew_yield);
    let best_fog_month = best_month(&monthly, |m| m.fog_yield);
    YieldReport {
        annual,
        monthly,
        optimal,
        best_dew_month,
        best_fog_month,
    }
}

fn month_or_dash(month: Option<u32>) -> String {
    month.map(|m| m.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Plain-text rendering for the console.
pub fn render_text(report: &YieldReport) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    write_report(&mut out, report).map(|_| out).unwrap_or_default()
}

fn write_report(out: &mut String, report: &YieldReport) -> std::fmt::Result {
    writeln!(out, "Annual water collection potential (L/m²):")?;
    writeln!(out, "{:>6} {:>10} {:>10} {:>10}", "year", "dew", "fog", "total")?;
    for a in &report.annual {
        writeln!(
            out,
            "{:>6} {:>10.2} {:>10.2} {:>10.2}",
            a.year, a.dew_yield, a.fog_yield, a.total
        )?;
    }

    writeln!(out)?;
    writeln!(out, "Best collection months:")?;
    writeln!(out, "Dew: month {}", month_or_dash(report.best_dew_month))?;
    writeln!(out, "Fog: month {}", month_or_dash(report.best_fog_month))?;

    writeln!(out)?;
    writeln!(out, "Optimal conditions:")?;
    match &report.optimal.dew {
        Some(d) => writeln!(
            out,
            "Dew ({} day(s)): humidity {:.1}%, temp max {:.1}°C, temp min {:.1}°C",
            d.days, d.humidity_mean, d.temp_max, d.temp_min
        )?,
        None => writeln!(out, "Dew: no qualifying days")?,
    }
    match &report.optimal.fog {
        Some(f) => writeln!(
            out,
            "Fog ({} day(s)): humidity {:.1}%, wind max {:.1} km/h",
            f.days, f.humidity_mean, f.wind_max
        )?,
        None => writeln!(out, "Fog: no qualifying days")?,
    }
    Ok(())
}

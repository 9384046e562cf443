//! SVG charts for the yield report.

use log::info;
use plotters::coord::Shift;
use plotters::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::models::weather::{AnnualSummary, MonthlySummary, OptimalConditions};
use crate::services::report::YieldReport;
use crate::utils::write_atomically;

const DEW_COLOR: RGBColor = RGBColor(31, 119, 180);
const FOG_COLOR: RGBColor = RGBColor(255, 127, 14);
const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// One bar group: label plus (dew, fog) heights.
struct Group {
    label: String,
    dew: f64,
    fog: f64,
}

fn chart_err<E: std::fmt::Display>(what: &str) -> impl FnOnce(E) -> String + '_ {
    move |e| format!("draw {} failed: {}", what, e)
}

fn y_limit(values: impl Iterator<Item = f64>) -> f64 {
    let max = values.fold(0.0_f64, f64::max);
    if max > 0.0 { max * 1.15 } else { 1.0 }
}

fn segment_label(labels: &[String], v: &SegmentValue<u32>) -> String {
    match v {
        SegmentValue::CenterOf(i) => labels.get(*i as usize).cloned().unwrap_or_default(),
        _ => String::new(),
    }
}

/// Bars per group, stacked (fog on top of dew) or side by side.
fn draw_groups<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    title: &str,
    y_desc: &str,
    groups: &[Group],
    stacked: bool,
    series: (&str, &str),
) -> Result<(), String> {
    let labels: Vec<String> = groups.iter().map(|g| g.label.clone()).collect();
    let n = groups.len().max(1) as u32;
    let top = if stacked {
        y_limit(groups.iter().map(|g| g.dew + g.fog))
    } else {
        y_limit(groups.iter().flat_map(|g| [g.dew, g.fog]))
    };

    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 24))
        .margin(12)
        .x_label_area_size(36)
        .y_label_area_size(56)
        .build_cartesian_2d((0u32..n).into_segmented(), 0f64..top)
        .map_err(chart_err(title))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(groups.len().max(1))
        .x_label_formatter(&|v| segment_label(&labels, v))
        .y_desc(y_desc)
        .draw()
        .map_err(chart_err(title))?;

    let dew_bars = groups.iter().enumerate().map(|(i, g)| {
        let i = i as u32;
        let (x0, x1) = if stacked {
            (SegmentValue::Exact(i), SegmentValue::Exact(i + 1))
        } else {
            (SegmentValue::Exact(i), SegmentValue::CenterOf(i))
        };
        let mut bar = Rectangle::new([(x0, 0.0), (x1, g.dew)], DEW_COLOR.filled());
        bar.set_margin(0, 0, 6, if stacked { 6 } else { 1 });
        bar
    });
    chart
        .draw_series(dew_bars)
        .map_err(chart_err(title))?
        .label(series.0)
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], DEW_COLOR.filled()));

    let fog_bars = groups.iter().enumerate().map(|(i, g)| {
        let i = i as u32;
        let (x0, x1, base) = if stacked {
            (SegmentValue::Exact(i), SegmentValue::Exact(i + 1), g.dew)
        } else {
            (SegmentValue::CenterOf(i), SegmentValue::Exact(i + 1), 0.0)
        };
        let mut bar = Rectangle::new([(x0, base), (x1, base + g.fog)], FOG_COLOR.filled());
        bar.set_margin(0, 0, if stacked { 6 } else { 1 }, 6);
        bar
    });
    chart
        .draw_series(fog_bars)
        .map_err(chart_err(title))?
        .label(series.1)
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], FOG_COLOR.filled()));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .position(SeriesLabelPosition::UpperRight)
        .draw()
        .map_err(chart_err(title))?;
    Ok(())
}

fn annual_groups(annual: &[AnnualSummary]) -> Vec<Group> {
    annual
        .iter()
        .map(|a| Group {
            label: a.year.to_string(),
            dew: a.dew_yield,
            fog: a.fog_yield,
        })
        .collect()
}

fn monthly_groups(monthly: &[MonthlySummary]) -> Vec<Group> {
    monthly
        .iter()
        .map(|m| Group {
            label: MONTHS
                .get(m.month.saturating_sub(1) as usize)
                .map(|s| s.to_string())
                .unwrap_or_else(|| m.month.to_string()),
            dew: m.dew_yield,
            fog: m.fog_yield,
        })
        .collect()
}

/// Humidity and "temperature drop / wind speed" per mechanism; missing mechanisms plot as empty.
fn optimal_groups(optimal: &OptimalConditions) -> Vec<Group> {
    vec![
        Group {
            label: "Humidity (%)".to_string(),
            dew: optimal.dew.as_ref().map_or(0.0, |d| d.humidity_mean),
            fog: optimal.fog.as_ref().map_or(0.0, |f| f.humidity_mean),
        },
        Group {
            label: "Temp drop (°C) / Wind (km/h)".to_string(),
            dew: optimal.dew.as_ref().map_or(0.0, |d| d.temp_drop()),
            fog: optimal.fog.as_ref().map_or(0.0, |f| f.wind_max),
        },
    ]
}

/// Annual (stacked) bars above cross-year monthly bars.
pub fn render_yield_chart(path: &Path, site: &str, report: &YieldReport) -> Result<(), String> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (1200, 1000)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_err("background"))?;
        let (upper, lower) = root.split_vertically(500);
        draw_groups(
            &upper,
            &format!("Annual water collection potential in {}", site),
            "Liters per m²",
            &annual_groups(&report.annual),
            true,
            ("dew_yield", "fog_yield"),
        )?;
        draw_groups(
            &lower,
            "Average monthly yield",
            "Liters per m²/day",
            &monthly_groups(&report.monthly),
            true,
            ("dew_yield", "fog_yield"),
        )?;
        root.present().map_err(chart_err("yield chart"))?;
    }
    write_svg(path, &svg)
}

pub fn render_optimal_chart(path: &Path, optimal: &OptimalConditions) -> Result<(), String> {
    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (1000, 600)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_err("background"))?;
        draw_groups(
            &root,
            "Optimal collection conditions",
            "Value",
            &optimal_groups(optimal),
            false,
            ("Dew", "Fog"),
        )?;
        root.present().map_err(chart_err("optimal chart"))?;
    }
    write_svg(path, &svg)
}

fn write_svg(path: &Path, svg: &str) -> Result<(), String> {
    write_atomically(path, |f| {
        f.write_all(svg.as_bytes())
            .map_err(|e| format!("write {} failed: {}", path.display(), e))
    })
}

/// Render both charts into `dir`, returning the written paths.
pub fn render_all(dir: &Path, site: &str, report: &YieldReport) -> Result<Vec<PathBuf>, String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("create {} failed: {}", dir.display(), e))?;
    let yield_path = dir.join(format!("{}_annual_yield.svg", site));
    let optimal_path = dir.join(format!("{}_optimal_conditions.svg", site));
    render_yield_chart(&yield_path, site, report)?;
    render_optimal_chart(&optimal_path, &report.optimal)?;
    info!(
        "Charts: wrote {} and {}",
        yield_path.display(),
        optimal_path.display()
    );
    Ok(vec![yield_path, optimal_path])
}

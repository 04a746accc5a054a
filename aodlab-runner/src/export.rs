//! Export of aligned series: JSON, long-format CSV, and a text summary.
//!
//! The JSON document carries a `schema_version` so presenters can reject
//! layouts they do not understand.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use aodlab_core::data::{BucketedSeries, InterpolatedSeries};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::display::{AxisRange, DisplayBounds};
use crate::pipeline::{DashboardReport, MeteorologySeries, SiteSeries};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Serialize)]
struct ReportDocument<'a> {
    schema_version: u32,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    timezone: &'a str,
    aod_cadence: String,
    wind_cadence: String,
    display: &'a DisplayBounds,
    aod_axis: AxisRange,
    wind_axis: AxisRange,
    sites: &'a [SiteSeries],
    #[serde(skip_serializing_if = "Option::is_none")]
    meteorology: Option<&'a MeteorologySeries>,
    failures: Vec<FailureEntry<'a>>,
}

#[derive(Serialize)]
struct FailureEntry<'a> {
    source: &'a str,
    error: String,
}

/// Serialize a report to pretty JSON.
pub fn export_json(report: &DashboardReport) -> Result<String> {
    let doc = ReportDocument {
        schema_version: SCHEMA_VERSION,
        window_start: report.window.start(),
        window_end: report.window.end(),
        timezone: report.timezone.name(),
        aod_cadence: report.aod_cadence.to_string(),
        wind_cadence: report.wind_cadence.to_string(),
        display: &report.display,
        aod_axis: report.display.aod_axis(),
        wind_axis: report.display.wind_axis(),
        sites: &report.sites,
        meteorology: report.meteorology.as_ref(),
        failures: report
            .failures
            .iter()
            .map(|(source, e)| FailureEntry {
                source,
                error: e.to_string(),
            })
            .collect(),
    };
    serde_json::to_string_pretty(&doc).context("failed to serialize report to JSON")
}

// ─── CSV export ─────────────────────────────────────────────────────

fn write_buckets(
    wtr: &mut csv::Writer<Vec<u8>>,
    source: &str,
    series_name: &str,
    series: &BucketedSeries,
) -> Result<()> {
    for b in &series.buckets {
        wtr.write_record([
            source,
            series_name,
            &b.start.to_rfc3339(),
            &b.value.map(|v| format!("{v:.6}")).unwrap_or_default(),
            &b.count.to_string(),
        ])?;
    }
    Ok(())
}

fn write_points(
    wtr: &mut csv::Writer<Vec<u8>>,
    source: &str,
    series_name: &str,
    series: &InterpolatedSeries,
) -> Result<()> {
    for (t, v) in &series.points {
        wtr.write_record([
            source,
            series_name,
            &t.to_rfc3339(),
            &v.map(|v| format!("{v:.6}")).unwrap_or_default(),
            "",
        ])?;
    }
    Ok(())
}

/// Long-format CSV of every aligned series.
///
/// Columns: site, series, bucket_start, value, count. Empty buckets have an
/// empty value; interpolated rows have an empty count.
pub fn export_series_csv(report: &DashboardReport) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["site", "series", "bucket_start", "value", "count"])?;

    for site in &report.sites {
        write_buckets(&mut wtr, &site.name, &site.aod.quantity.key(), &site.aod)?;
    }

    if let Some(met) = &report.meteorology {
        for series in met.series() {
            write_buckets(&mut wtr, &met.name, &series.quantity.key(), series)?;
        }
        for series in [&met.wind_east_on_aod_grid, &met.wind_north_on_aod_grid]
            .into_iter()
            .flatten()
        {
            let name = format!("{}_on_aod_grid", series.quantity.key());
            write_points(&mut wtr, &met.name, &name, series)?;
        }
    }

    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Save `report.json` and `series.csv` under
/// `{output_dir}/{start}_{end}/`, replacing an earlier run for the same window.
pub fn save_report(report: &DashboardReport, output_dir: &Path) -> Result<PathBuf> {
    let tz = report.timezone;
    let dirname = format!(
        "{}_{}",
        report.window.start().with_timezone(&tz).format("%Y%m%d"),
        report.window.end().with_timezone(&tz).format("%Y%m%d")
    );
    let run_dir = output_dir.join(dirname);
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create output dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("report.json"), export_json(report)?)?;
    std::fs::write(run_dir.join("series.csv"), export_series_csv(report)?)?;

    Ok(run_dir)
}

// ─── Text summary ───────────────────────────────────────────────────

/// Fixed-width table of per-source results.
pub fn format_summary(report: &DashboardReport) -> String {
    let tz = report.timezone;
    let mut out = String::with_capacity(1024);
    let _ = writeln!(
        out,
        "Window:   {} to {} ({})",
        report.window.start().with_timezone(&tz).format("%Y-%m-%d %H:%M"),
        report.window.end().with_timezone(&tz).format("%Y-%m-%d %H:%M"),
        tz.name()
    );
    let _ = writeln!(
        out,
        "Cadence:  AOD {} / wind {}",
        report.aod_cadence, report.wind_cadence
    );
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:<16} {:<14} {:>8} {:>8} {:>8}",
        "Source", "Series", "Buckets", "Filled", "Mean"
    );
    let _ = writeln!(out, "{}", "-".repeat(58));

    let mut row = |source: &str, series: &BucketedSeries| {
        let _ = writeln!(
            out,
            "{:<16} {:<14} {:>8} {:>8} {:>8}",
            source,
            series.quantity.key(),
            series.len(),
            series.filled(),
            mean(series).map_or_else(|| "-".to_string(), |m| format!("{m:.3}"))
        );
    };
    for site in &report.sites {
        row(&site.name, &site.aod);
    }
    if let Some(met) = &report.meteorology {
        for series in met.series() {
            row(&met.name, series);
        }
    }

    for (source, e) in &report.failures {
        let _ = writeln!(out, "FAILED {source}: {e}");
    }
    out
}

fn mean(series: &BucketedSeries) -> Option<f64> {
    let (sum, n) = series
        .buckets
        .iter()
        .filter_map(|b| b.value)
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

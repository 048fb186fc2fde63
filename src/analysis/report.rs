//! Report generation for relay bandwidth analysis.
//!
//! Writes the per-relay series as CSV, the full fleet report as JSON, and a
//! human-readable text summary.

use std::fs;
use std::path::Path;

use color_eyre::eyre::{Context, Result};
use serde::Serialize;

use super::input::is_valid_fingerprint;
use super::pipeline::FleetReport;
use super::statistics::UnitScale;
use super::types::*;

/// Flat fleet summary row for CSV output
#[derive(Debug, Serialize)]
struct FleetCsvRow<'a> {
    #[serde(rename = "Relay")]
    relay: &'a str,
    #[serde(rename = "Samples")]
    samples: usize,
    #[serde(rename = "Mean")]
    mean: f64,
    #[serde(rename = "Standard Deviation")]
    std_dev: Option<f64>,
    #[serde(rename = "Median")]
    median: f64,
    #[serde(rename = "IQR")]
    iqr: Option<f64>,
    #[serde(rename = "Skewness")]
    skewness: Option<f64>,
    #[serde(rename = "Kurtosis")]
    kurtosis: Option<f64>,
    #[serde(rename = "Coefficient of Variation")]
    cov: String,
    #[serde(rename = "Frequency of Outliers")]
    outliers: Option<usize>,
    #[serde(rename = "Advertised Bandwidth (B/s)")]
    advertised: Option<f64>,
}

/// Write a relay's series as `Timestamp, Type, Bandwidth (B/s)` CSV
pub fn write_series_csv(series: &Series, output_path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;

    if series.is_empty() {
        writer.write_record(["Timestamp", "Type", "Bandwidth (B/s)"])?;
    }
    for row in series.rows() {
        writer.serialize(row).context("Failed to write series row")?;
    }
    writer.flush()?;

    log::debug!("Series written to {}", output_path.display());
    Ok(())
}

const FLEET_CSV_HEADER: [&str; 11] = [
    "Relay",
    "Samples",
    "Mean",
    "Standard Deviation",
    "Median",
    "IQR",
    "Skewness",
    "Kurtosis",
    "Coefficient of Variation",
    "Frequency of Outliers",
    "Advertised Bandwidth (B/s)",
];

/// Write every relay's series as `<fingerprint>.csv` under `series_dir`.
///
/// Relays whose identifier is not a fingerprint are skipped, as is any file
/// that fails to write; both are logged. Returns the number of files written.
pub fn export_series(report: &FleetReport, series_dir: &Path) -> Result<usize> {
    fs::create_dir_all(series_dir)
        .with_context(|| format!("Failed to create series directory: {}", series_dir.display()))?;

    let mut written = 0;
    for relay in &report.relays {
        if !is_valid_fingerprint(&relay.relay_id) {
            log::warn!("Not exporting series for '{}': not a relay fingerprint", relay.relay_id);
            continue;
        }
        let path = series_dir.join(format!("{}.csv", relay.relay_id));
        match write_series_csv(&relay.series, &path) {
            Ok(()) => written += 1,
            Err(e) => log::warn!("Series export failed for {}: {:#}", relay.relay_id, e),
        }
    }

    log::info!("Series for {} relays written to {}", written, series_dir.display());
    Ok(written)
}

/// Write the fleet summary table as CSV
pub fn write_fleet_csv(summary: &FleetSummary, output_path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;

    if summary.rows.is_empty() {
        writer.write_record(FLEET_CSV_HEADER)?;
    }
    for row in &summary.rows {
        writer
            .serialize(FleetCsvRow {
                relay: &row.relay_id,
                samples: row.sample_count,
                mean: row.mean,
                std_dev: row.std_dev,
                median: row.median,
                iqr: row.iqr,
                skewness: row.skewness,
                kurtosis: row.kurtosis,
                cov: row
                    .coefficient_of_variation
                    .map(|cov| cov.to_string())
                    .unwrap_or_else(|| "n/a".to_string()),
                outliers: row.outlier_count,
                advertised: row.advertised_bandwidth,
            })
            .context("Failed to write fleet row")?;
    }
    writer.flush()?;

    log::info!("Fleet summary written to {}", output_path.display());
    Ok(())
}

/// Generate JSON report
pub fn generate_json_report(report: &FleetReport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")?;

    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;

    log::info!("JSON report written to {}", output_path.display());
    Ok(())
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{:.4}", v)).unwrap_or_else(|| "n/a".to_string())
}

fn partition_lines(stats: &PartitionStatistics, unit: &str) -> Vec<String> {
    let mut lines = vec![
        format!("  {} ({} samples)", stats.partition, stats.sample_count),
        format!("    Mean ({}): {:.4}", unit, stats.mean),
        format!("    Standard Deviation ({}): {}", unit, fmt_opt(stats.std_dev)),
        format!("    Range ({}): {:.4}", unit, stats.range),
        format!("    Median ({}): {:.4}", unit, stats.median),
        format!("    IQR ({}): {}", unit, fmt_opt(stats.iqr)),
        format!(
            "    Coefficient of Variation: {}",
            stats
                .coefficient_of_variation
                .map(|c| c.to_string())
                .unwrap_or_else(|| "n/a".to_string())
        ),
        format!("    Skewness: {}", fmt_opt(stats.skewness)),
        format!("    Kurtosis: {}", fmt_opt(stats.kurtosis)),
    ];
    if let Some(outliers) = stats.outlier_count {
        lines.push(format!("    Frequency of Outliers: {}", outliers));
    }
    if let Some(ref acf) = stats.acf {
        lines.push(format!("    ACF: {} lags", acf.len().saturating_sub(1)));
    }
    lines
}

/// Render the text report
pub fn render_text_report(report: &FleetReport, unit: UnitScale) -> String {
    let unit = unit.label();
    let mut lines: Vec<String> = Vec::new();

    // Header
    lines.push("=".repeat(80));
    lines.push("                       RELAY BANDWIDTH ANALYSIS".to_string());
    lines.push("=".repeat(80));
    lines.push(String::new());

    match report.window {
        Some(window) => lines.push(format!("Window: {}", window)),
        None => lines.push("Window: all available history".to_string()),
    }
    lines.push(format!("Relays: {}", report.relays.len()));
    lines.push(format!("Included in summary: {}", report.summary.rows.len()));
    lines.push(format!("Excluded: {}", report.summary.excluded.len()));
    lines.push(String::new());

    for relay in &report.relays {
        lines.push("-".repeat(80));
        match relay.nickname {
            Some(ref nick) => lines.push(format!("Relay {} ({})", relay.relay_id, nick)),
            None => lines.push(format!("Relay {}", relay.relay_id)),
        }
        if relay.statistics.is_empty() {
            lines.push("  No bandwidth data available for the specified period.".to_string());
        }
        for partition in Partition::ALL {
            if let Some(stats) = relay.statistics.get(partition) {
                lines.extend(partition_lines(stats, unit));
            }
        }
        for diagnostic in &relay.diagnostics {
            lines.push(format!("  ! {}", diagnostic));
        }
    }
    lines.push(String::new());

    lines.push("=".repeat(80));
    lines.push("                            FLEET SUMMARY".to_string());
    lines.push("=".repeat(80));
    lines.push(String::new());

    let summary = &report.summary;
    if summary.is_empty() {
        lines.push("No data available.".to_string());
    } else {
        lines.push(format!("Mean of relay means ({}): {}", unit, fmt_opt(summary.mean_of_means())));
        lines.push(format!("Median of relay means ({}): {}", unit, fmt_opt(summary.median_of_means())));
        lines.push(format!("Mean CoV (defined only): {}", fmt_opt(summary.mean_cov())));
        lines.push(String::new());

        let (ranked, unavailable) = summary.cov_ranking();
        if !ranked.is_empty() {
            lines.push("Most variable relays:".to_string());
            for (i, (relay, cov)) in ranked.iter().take(10).enumerate() {
                lines.push(format!("  {}. {}: CoV {:.4}", i + 1, relay, cov));
            }
        }
        if !unavailable.is_empty() {
            lines.push(format!("CoV not available for {} relays", unavailable.len()));
        }
    }

    if !summary.excluded.is_empty() {
        lines.push(String::new());
        for excluded in &summary.excluded {
            lines.push(format!("  {}: {}", excluded.relay_id, excluded.reason));
        }
    }
    lines.push(String::new());

    lines.join("\n")
}

/// Generate human-readable text report
pub fn generate_text_report(report: &FleetReport, unit: UnitScale, output_path: &Path) -> Result<()> {
    fs::write(output_path, render_text_report(report, unit))
        .with_context(|| format!("Failed to write text report to {}", output_path.display()))?;

    log::info!("Text report written to {}", output_path.display());
    Ok(())
}

/// Print a short summary to stdout
pub fn print_summary(report: &FleetReport) {
    let summary = &report.summary;

    println!("\n=== RELAY BANDWIDTH SUMMARY ===\n");
    println!("Relays: {}", report.relays.len());
    println!("  Included: {}", summary.rows.len());
    println!("  Excluded (no data): {}", summary.excluded_count(ExclusionReason::NoData));
    println!(
        "  Excluded (decode failed): {}",
        summary.excluded_count(ExclusionReason::DecodeFailed)
    );
    println!(
        "  Excluded (insufficient samples): {}",
        summary.excluded_count(ExclusionReason::InsufficientSamples)
    );

    if let Some(mean) = summary.mean_of_means() {
        println!("\nMean of relay means: {:.2}", mean);
    }
    if let Some(cov) = summary.mean_cov() {
        println!("Mean CoV: {:.4}", cov);
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::pipeline::{process_fleet, PipelineSettings};
    use tempfile::TempDir;

    fn sample_report() -> FleetReport {
        let block = HistoryBlock {
            first: "2024-09-01 00:00:00".into(),
            last: None,
            interval: Lenient::Valid(3600),
            factor: Lenient::Valid(1.0),
            count: None,
            values: vec![Some(1.0), Some(2.0), Some(4.0)],
        };
        let relays = vec![
            RelayHistory {
                fingerprint: "AAAA".to_string(),
                nickname: Some("alpha".to_string()),
                write_history: Some(HistoryRecord::new().with_tier("1_month", block)),
                read_history: None,
                advertised_bandwidth: None,
            },
            RelayHistory {
                fingerprint: "BBBB".to_string(),
                nickname: None,
                write_history: None,
                read_history: None,
                advertised_bandwidth: None,
            },
        ];
        process_fleet(relays, &PipelineSettings::default()).unwrap()
    }

    #[test]
    fn test_empty_fleet_csv_has_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fleet.csv");
        write_fleet_csv(&FleetSummary::default(), &path).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some(
                "Relay,Samples,Mean,Standard Deviation,Median,IQR,Skewness,Kurtosis,\
                 Coefficient of Variation,Frequency of Outliers,Advertised Bandwidth (B/s)"
            )
        );
        assert_eq!(lines.next(), None);

        // same header as a populated table
        let populated = dir.path().join("populated.csv");
        write_fleet_csv(&sample_report().summary, &populated).unwrap();
        assert_eq!(
            fs::read_to_string(&populated).unwrap().lines().next(),
            text.lines().next()
        );
    }

    #[test]
    fn test_series_export_skips_unsafe_identifiers() {
        let mut report = sample_report();
        let good = "0011BD2485AD45D984EC4159C88FC066E5E3300E";
        report.relays[0].relay_id = "../escaped".to_string();
        report.relays[1].relay_id = good.to_string();
        let mut nested = report.relays[1].clone();
        nested.relay_id = "a/b".to_string();
        report.relays.push(nested);

        let dir = TempDir::new().unwrap();
        let series_dir = dir.path().join("series");
        let written = export_series(&report, &series_dir).unwrap();

        assert_eq!(written, 1);
        assert!(series_dir.join(format!("{}.csv", good)).exists());
        assert!(!dir.path().join("escaped.csv").exists());
        assert_eq!(fs::read_dir(&series_dir).unwrap().count(), 1);
    }

    #[test]
    fn test_text_report_mentions_exclusions() {
        let text = render_text_report(&sample_report(), UnitScale::BytesPerSecond);
        assert!(text.contains("Relay AAAA (alpha)"));
        assert!(text.contains("BBBB: excluded: no data"));
        assert!(text.contains("No bandwidth data available for the specified period."));
    }

    #[test]
    fn test_write_outputs() {
        let dir = TempDir::new().unwrap();
        let report = sample_report();

        let series_path = dir.path().join("AAAA.csv");
        write_series_csv(&report.relays[0].series, &series_path).unwrap();
        let csv_text = fs::read_to_string(&series_path).unwrap();
        let mut lines = csv_text.lines();
        assert_eq!(lines.next(), Some("Timestamp,Type,Bandwidth (B/s)"));
        assert_eq!(lines.next(), Some("2024-09-01 00:00:00,Write,1.0"));

        let empty_path = dir.path().join("BBBB.csv");
        write_series_csv(&report.relays[1].series, &empty_path).unwrap();
        assert_eq!(fs::read_to_string(&empty_path).unwrap().trim(), "Timestamp,Type,Bandwidth (B/s)");

        let fleet_path = dir.path().join("fleet.csv");
        write_fleet_csv(&report.summary, &fleet_path).unwrap();
        assert_eq!(fs::read_to_string(&fleet_path).unwrap().lines().count(), 2);

        let json_path = dir.path().join("report.json");
        generate_json_report(&report, &json_path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json["summary"]["rows"][0]["relay_id"], "AAAA");
        assert_eq!(json["summary"]["excluded"][0]["reason"], "no_data");
    }
}

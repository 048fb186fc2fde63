//! Relay bandwidth analysis CLI.
//!
//! Reads bandwidth documents fetched from the measurement service, rebuilds
//! per-relay series and writes statistics and a fleet summary.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use env_logger::Env;
use log::info;

use relaystats::analysis::{self, decoder::parse_history_time, FleetReport};
use relaystats::config_loader;

#[derive(Parser, Debug)]
#[command(name = "relaystats")]
#[command(about = "Bandwidth history statistics for network relays")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the pipeline configuration YAML file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory for reports
    #[arg(short, long, default_value = "analysis_output")]
    output: PathBuf,

    /// Reference time for lookback windows, "YYYY-MM-DD HH:MM:SS" UTC (default: now)
    #[arg(long)]
    now: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Number of parallel workers (0 = use configuration)
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Full analysis: per-relay statistics, fleet summary and reports
    Analyze {
        /// Bandwidth documents (JSON)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Also write each relay's series as CSV
        #[arg(long)]
        export_series: bool,
    },

    /// Print the fleet summary only
    Summary {
        /// Bandwidth documents (JSON)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    let config = config_loader::load_config_or_default(cli.config.as_deref())?;

    let now = match cli.now {
        Some(ref s) => parse_history_time(s).ok_or_else(|| eyre!("Invalid --now value '{}'", s))?,
        None => chrono::Utc::now(),
    };

    let mut settings = config.settings(now)?;
    if cli.threads > 0 {
        settings.threads = cli.threads;
    }
    if let Some(window) = settings.window {
        info!("Analysis window: {}", window);
    }

    match cli.command {
        Commands::Analyze { inputs, export_series } => {
            let relays = analysis::load_documents(&inputs);
            let report = analysis::process_fleet(relays, &settings)?;
            write_reports(&report, &cli.output, settings.statistics.unit_scale, export_series)?;
            analysis::report::print_summary(&report);
        }
        Commands::Summary { inputs } => {
            let relays = analysis::load_documents(&inputs);
            let report = analysis::process_fleet(relays, &settings)?;
            analysis::report::print_summary(&report);
        }
    }

    Ok(())
}

fn write_reports(
    report: &FleetReport,
    output_dir: &Path,
    unit: analysis::UnitScale,
    export_series: bool,
) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;

    analysis::generate_json_report(report, &output_dir.join("relay_report.json"))?;
    analysis::generate_text_report(report, unit, &output_dir.join("relay_report.txt"))?;
    analysis::write_fleet_csv(&report.summary, &output_dir.join("fleet_summary.csv"))?;

    if export_series {
        analysis::report::export_series(report, &output_dir.join("series"))?;
    }

    info!("Analysis complete. Reports written to {}", output_dir.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::parse_from(["relaystats", "analyze", "relays.json", "--export-series"]);

        assert_eq!(cli.output, PathBuf::from("analysis_output"));
        assert_eq!(cli.threads, 0);
        match cli.command {
            Commands::Analyze { inputs, export_series } => {
                assert_eq!(inputs, vec![PathBuf::from("relays.json")]);
                assert!(export_series);
            }
            _ => panic!("expected analyze"),
        }
    }

    #[test]
    fn test_global_options() {
        let cli = Cli::parse_from([
            "relaystats",
            "--config",
            "relaystats.yaml",
            "--now",
            "2024-10-01 00:00:00",
            "-j",
            "4",
            "summary",
            "a.json",
            "b.json",
        ]);

        assert_eq!(cli.config, Some(PathBuf::from("relaystats.yaml")));
        assert_eq!(cli.now.as_deref(), Some("2024-10-01 00:00:00"));
        assert_eq!(cli.threads, 4);
        assert!(matches!(cli.command, Commands::Summary { ref inputs } if inputs.len() == 2));
    }
}

//! Per-relay pipeline and fleet batch processing.
//!
//! Each relay goes through decode -> filter -> assemble -> statistics on its
//! own, so relays are processed in parallel and only meet again in the fleet
//! aggregation step.

use color_eyre::eyre::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;

use super::assembler::assemble;
use super::decoder::{decode, DecodeOutcome, TierPolicy};
use super::fleet::{aggregate, FleetEntry};
use super::statistics::{compute, StatisticsOptions};
use super::time_window::{filter_samples, TimeWindow};
use super::types::*;

/// Parameters shared by every relay of a run
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub window: Option<TimeWindow>,
    pub tier_policy: TierPolicy,
    pub statistics: StatisticsOptions,
    /// Fewest Total samples a relay needs to appear in the fleet summary
    pub min_samples: usize,
    /// Worker threads, 0 = rayon default
    pub threads: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            window: None,
            tier_policy: TierPolicy::default(),
            statistics: StatisticsOptions::default(),
            min_samples: 1,
            threads: 0,
        }
    }
}

/// Result of a whole batch
#[derive(Debug, Clone, Serialize)]
pub struct FleetReport {
    pub window: Option<TimeWindow>,
    pub relays: Vec<RelayReport>,
    pub summary: FleetSummary,
}

fn decode_direction(
    record: Option<&HistoryRecord>,
    direction: Direction,
    settings: &PipelineSettings,
) -> DecodeOutcome {
    match record {
        Some(record) => decode(record, direction, &settings.tier_policy, settings.window.as_ref()),
        None => DecodeOutcome::default(),
    }
}

/// Run one relay through the pipeline. Never fails: tier-level problems end
/// up in the report's diagnostics.
pub fn process_relay(relay: RelayHistory, settings: &PipelineSettings) -> RelayReport {
    let write = decode_direction(relay.write_history.as_ref(), Direction::Write, settings);
    let read = decode_direction(relay.read_history.as_ref(), Direction::Read, settings);

    let diagnostics: Vec<String> = write
        .errors
        .iter()
        .map(|e| format!("write history: {}", e))
        .chain(read.errors.iter().map(|e| format!("read history: {}", e)))
        .collect();

    // Failed only if something was attempted and nothing decoded
    let attempted = !write.errors.is_empty() || !read.errors.is_empty();
    let decode_failed = attempted && write.tiers_decoded.is_empty() && read.tiers_decoded.is_empty();

    let write_samples = filter_samples(write.samples, settings.window.as_ref());
    let read_samples = filter_samples(read.samples, settings.window.as_ref());
    let series = assemble(write_samples, read_samples);

    if series.is_empty() {
        log::info!("No bandwidth data for relay {} in the requested period", relay.fingerprint);
    }

    let statistics = compute(&series, &settings.statistics);

    log::debug!(
        "Relay {}: {} samples, {} diagnostics",
        relay.fingerprint,
        series.len(),
        diagnostics.len()
    );

    RelayReport {
        relay_id: relay.fingerprint,
        nickname: relay.nickname,
        advertised_bandwidth: relay.advertised_bandwidth,
        sample_count: series.len(),
        statistics,
        diagnostics,
        decode_failed,
        series,
    }
}

/// Process every relay on a worker pool and aggregate the results.
///
/// Relays may arrive in any order; the fleet summary is sorted by relay
/// identifier and `relays` keeps input order.
pub fn process_fleet(relays: Vec<RelayHistory>, settings: &PipelineSettings) -> Result<FleetReport> {
    log::info!("Processing {} relays", relays.len());

    let run = || -> Vec<RelayReport> {
        relays
            .into_par_iter()
            .map(|relay| process_relay(relay, settings))
            .collect()
    };

    let reports = if settings.threads > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.threads)
            .build()
            .context("Failed to configure thread pool")?;
        pool.install(run)
    } else {
        run()
    };

    let summary = aggregate(reports.iter().map(FleetEntry::from), settings.min_samples);

    Ok(FleetReport {
        window: settings.window,
        relays: reports,
        summary,
    })
}

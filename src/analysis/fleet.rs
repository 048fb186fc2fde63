//! Fleet-level aggregation of per-relay statistics.
//!
//! Produces one row per relay with usable Total-partition statistics, ordered
//! by relay identifier, and keeps a record of every relay that was left out.

use super::types::*;

/// Input to [`aggregate`]: what the pipeline learned about one relay
#[derive(Debug, Clone)]
pub struct FleetEntry {
    pub relay_id: String,
    pub nickname: Option<String>,
    pub statistics: RelayStatistics,
    pub advertised_bandwidth: Option<f64>,
    pub decode_failed: bool,
}

impl From<&RelayReport> for FleetEntry {
    fn from(report: &RelayReport) -> Self {
        Self {
            relay_id: report.relay_id.clone(),
            nickname: report.nickname.clone(),
            statistics: report.statistics.clone(),
            advertised_bandwidth: report.advertised_bandwidth,
            decode_failed: report.decode_failed,
        }
    }
}

/// Build the fleet summary.
///
/// A relay needs a Total partition with at least `min_samples` samples to get
/// a row. Rows and exclusions are both sorted by relay identifier, so the
/// result does not depend on the order relays arrived in.
pub fn aggregate<I>(entries: I, min_samples: usize) -> FleetSummary
where
    I: IntoIterator<Item = FleetEntry>,
{
    let mut summary = FleetSummary::default();

    for entry in entries {
        let Some(total) = entry.statistics.total else {
            let reason = if entry.decode_failed {
                ExclusionReason::DecodeFailed
            } else {
                ExclusionReason::NoData
            };
            log::warn!("Relay {} {}", entry.relay_id, reason);
            summary.excluded.push(ExcludedRelay {
                relay_id: entry.relay_id,
                reason,
                sample_count: 0,
            });
            continue;
        };

        if total.sample_count < min_samples {
            log::warn!(
                "Relay {} {} ({} < {})",
                entry.relay_id,
                ExclusionReason::InsufficientSamples,
                total.sample_count,
                min_samples
            );
            summary.excluded.push(ExcludedRelay {
                relay_id: entry.relay_id,
                reason: ExclusionReason::InsufficientSamples,
                sample_count: total.sample_count,
            });
            continue;
        }

        summary.rows.push(FleetRow {
            relay_id: entry.relay_id,
            nickname: entry.nickname,
            sample_count: total.sample_count,
            mean: total.mean,
            median: total.median,
            range: total.range,
            std_dev: total.std_dev,
            iqr: total.iqr,
            skewness: total.skewness,
            kurtosis: total.kurtosis,
            coefficient_of_variation: total.coefficient_of_variation,
            outlier_count: total.outlier_count,
            advertised_bandwidth: entry.advertised_bandwidth,
        });
    }

    summary.rows.sort_by(|a, b| a.relay_id.cmp(&b.relay_id));
    summary.excluded.sort_by(|a, b| a.relay_id.cmp(&b.relay_id));

    log::info!(
        "Fleet summary: {} relays included, {} excluded",
        summary.rows.len(),
        summary.excluded.len()
    );

    summary
}

/// Empirical CDF of the finite values: sorted, probability `(i + 1) / n`
pub fn empirical_cdf<I>(values: I) -> Vec<CdfPoint>
where
    I: IntoIterator<Item = f64>,
{
    let mut sorted: Vec<f64> = values.into_iter().filter(|v| v.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let n = sorted.len() as f64;
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, value)| CdfPoint {
            value,
            probability: (i + 1) as f64 / n,
        })
        .collect()
}

impl FleetSummary {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn excluded_count(&self, reason: ExclusionReason) -> usize {
        self.excluded.iter().filter(|e| e.reason == reason).count()
    }

    /// Relays ordered by CoV, highest first, and the relays whose CoV is
    /// undefined or was not computed
    pub fn cov_ranking(&self) -> (Vec<(&str, f64)>, Vec<&str>) {
        let mut ranked = Vec::new();
        let mut unavailable = Vec::new();

        for row in &self.rows {
            match row.coefficient_of_variation.and_then(|cov| cov.value()) {
                Some(cov) => ranked.push((row.relay_id.as_str(), cov)),
                None => unavailable.push(row.relay_id.as_str()),
            }
        }

        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        (ranked, unavailable)
    }

    pub fn mean_cdf(&self) -> Vec<CdfPoint> {
        empirical_cdf(self.rows.iter().map(|r| r.mean))
    }

    pub fn std_dev_cdf(&self) -> Vec<CdfPoint> {
        empirical_cdf(self.rows.iter().filter_map(|r| r.std_dev))
    }

    /// Only relays with a defined CoV contribute
    pub fn cov_cdf(&self) -> Vec<CdfPoint> {
        empirical_cdf(
            self.rows
                .iter()
                .filter_map(|r| r.coefficient_of_variation.and_then(|cov| cov.value())),
        )
    }

    pub fn advertised_cdf(&self) -> Vec<CdfPoint> {
        empirical_cdf(self.rows.iter().filter_map(|r| r.advertised_bandwidth))
    }

    pub fn mean_of_means(&self) -> Option<f64> {
        if self.rows.is_empty() {
            return None;
        }
        Some(self.rows.iter().map(|r| r.mean).sum::<f64>() / self.rows.len() as f64)
    }

    pub fn median_of_means(&self) -> Option<f64> {
        if self.rows.is_empty() {
            return None;
        }
        let mut means: Vec<f64> = self.rows.iter().map(|r| r.mean).collect();
        means.sort_by(|a, b| a.total_cmp(b));
        let n = means.len();
        if n % 2 == 0 {
            Some((means[n / 2 - 1] + means[n / 2]) / 2.0)
        } else {
            Some(means[n / 2])
        }
    }

    /// Mean CoV over relays where it is defined
    pub fn mean_cov(&self) -> Option<f64> {
        let defined: Vec<f64> = self
            .rows
            .iter()
            .filter_map(|r| r.coefficient_of_variation.and_then(|cov| cov.value()))
            .collect();
        if defined.is_empty() {
            None
        } else {
            Some(defined.iter().sum::<f64>() / defined.len() as f64)
        }
    }
}

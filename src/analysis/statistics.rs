//! Descriptive and time-series statistics for relay bandwidth series.
//!
//! All statistics are computed in bytes/second and only converted to the
//! configured unit scale at the end. Nothing here reads global state, so the
//! same series always yields the same result.

use serde::{Deserialize, Serialize};

use super::types::*;

/// Fewest samples a partition needs for spread statistics
/// (standard deviation, quartiles, outliers, shape, autocorrelation).
pub const MIN_SPREAD_SAMPLES: usize = 2;

/// Fewest samples for the bias-adjusted skewness
pub const MIN_SKEWNESS_SAMPLES: usize = 3;

/// Fewest samples for the bias-adjusted kurtosis
pub const MIN_KURTOSIS_SAMPLES: usize = 4;

/// Default cap on autocorrelation lags
pub const DEFAULT_MAX_LAGS: usize = 40;

/// Factor for the Tukey outlier fences
pub const OUTLIER_IQR_MULTIPLIER: f64 = 1.5;

const MEBIBYTE: f64 = 1024.0 * 1024.0;

/// Unit that location and spread statistics are reported in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitScale {
    #[default]
    BytesPerSecond,
    /// MB/s as 1024*1024 bytes per second
    MebibytesPerSecond,
}

impl UnitScale {
    pub fn divisor(self) -> f64 {
        match self {
            UnitScale::BytesPerSecond => 1.0,
            UnitScale::MebibytesPerSecond => MEBIBYTE,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            UnitScale::BytesPerSecond => "B/s",
            UnitScale::MebibytesPerSecond => "MB/s",
        }
    }
}

/// Which statistics to compute, and how to present them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsOptions {
    pub unit_scale: UnitScale,
    /// Upper bound on ACF/PACF lags; the effective count is `min(n/2, max_lags)`
    pub max_lags: usize,
    /// ACF and PACF
    pub autocorrelation: bool,
    /// Skewness and kurtosis
    pub distribution_shape: bool,
    /// Quartiles, IQR and outlier count
    pub quartiles: bool,
}

impl Default for StatisticsOptions {
    fn default() -> Self {
        Self {
            unit_scale: UnitScale::default(),
            max_lags: DEFAULT_MAX_LAGS,
            autocorrelation: true,
            distribution_shape: true,
            quartiles: true,
        }
    }
}

/// Compute statistics for the Read, Write and Total partitions of a series.
/// Partitions without samples are left out.
pub fn compute(series: &Series, options: &StatisticsOptions) -> RelayStatistics {
    let mut stats = RelayStatistics::default();
    for partition in Partition::ALL {
        let values = series.values(partition);
        let computed = partition_statistics(partition, &values, options);
        match partition {
            Partition::Read => stats.read = computed,
            Partition::Write => stats.write = computed,
            Partition::Total => stats.total = computed,
        }
    }
    stats
}

/// Statistics over raw bytes/second values, `None` when `values` is empty
pub fn partition_statistics(
    partition: Partition,
    values: &[f64],
    options: &StatisticsOptions,
) -> Option<PartitionStatistics> {
    if values.is_empty() {
        return None;
    }

    let n = values.len();
    let scale = options.unit_scale.divisor();

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mean = mean(values);
    let min = sorted[0];
    let max = sorted[n - 1];
    let median = quantile(&sorted, 0.5);

    let mut stats = PartitionStatistics {
        partition,
        sample_count: n,
        mean: mean / scale,
        min: min / scale,
        max: max / scale,
        range: (max - min) / scale,
        median: median / scale,
        std_dev: None,
        coefficient_of_variation: None,
        q1: None,
        q3: None,
        iqr: None,
        outlier_count: None,
        skewness: None,
        kurtosis: None,
        acf: None,
        pacf: None,
    };

    if n < MIN_SPREAD_SAMPLES {
        return Some(stats);
    }

    let std_dev = sample_std_dev(values, mean);
    stats.std_dev = Some(std_dev / scale);
    stats.coefficient_of_variation = Some(Ratio::from_parts(std_dev, mean));

    if options.quartiles {
        let q1 = quantile(&sorted, 0.25);
        let q3 = quantile(&sorted, 0.75);
        let iqr = q3 - q1;
        stats.q1 = Some(q1 / scale);
        stats.q3 = Some(q3 / scale);
        stats.iqr = Some(iqr / scale);
        stats.outlier_count = Some(count_outliers(values, q1, q3));
    }

    if options.distribution_shape {
        let (skewness, kurtosis) = shape(values, mean);
        stats.skewness = skewness;
        stats.kurtosis = kurtosis;
    }

    if options.autocorrelation {
        let lags = lag_count(n, options.max_lags);
        stats.acf = autocorrelation(values, lags);
        stats.pacf = partial_autocorrelation(values, lags);
    }

    Some(stats)
}

/// Number of ACF/PACF lags for a partition of `n` samples
pub fn lag_count(n: usize, max_lags: usize) -> usize {
    (n / 2).min(max_lags)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Standard deviation with Bessel's correction (n - 1)
fn sample_std_dev(values: &[f64], mean: f64) -> f64 {
    let sum_sq = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Linearly interpolated quantile of already sorted values
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Values outside `[q1 - 1.5*IQR, q3 + 1.5*IQR]`
pub fn count_outliers(values: &[f64], q1: f64, q3: f64) -> usize {
    let iqr = q3 - q1;
    let lower = q1 - OUTLIER_IQR_MULTIPLIER * iqr;
    let upper = q3 + OUTLIER_IQR_MULTIPLIER * iqr;
    values.iter().filter(|v| **v < lower || **v > upper).count()
}

/// Bias-adjusted skewness G1 and excess kurtosis G2.
///
/// Starts from the moment ratios `g1 = m3 / m2^1.5` and `g2 = m4 / m2^2 - 3`
/// and applies the sample-size corrections, so the values agree with the usual
/// dataframe `skew()`/`kurt()`. Both undefined for a constant partition.
fn shape(values: &[f64], mean: f64) -> (Option<f64>, Option<f64>) {
    let count = values.len();
    let n = count as f64;
    let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
    for v in values {
        let d = v - mean;
        let d2 = d * d;
        m2 += d2;
        m3 += d2 * d;
        m4 += d2 * d2;
    }
    m2 /= n;
    m3 /= n;
    m4 /= n;

    if m2 == 0.0 {
        return (None, None);
    }

    let skewness = (count >= MIN_SKEWNESS_SAMPLES).then(|| {
        let g1 = m3 / m2.powf(1.5);
        g1 * (n * (n - 1.0)).sqrt() / (n - 2.0)
    });
    let kurtosis = (count >= MIN_KURTOSIS_SAMPLES).then(|| {
        let g2 = m4 / (m2 * m2) - 3.0;
        ((n + 1.0) * g2 + 6.0) * (n - 1.0) / ((n - 2.0) * (n - 3.0))
    });
    (skewness, kurtosis)
}

/// Autocovariance for lags `0..=nlags` divided by `c0`.
///
/// The lag-k sum is divided by `n` when `adjusted` is false and by `n - k`
/// otherwise. `None` for a constant series.
fn normalized_autocovariance(values: &[f64], nlags: usize, adjusted: bool) -> Option<Vec<f64>> {
    let n = values.len();
    let mean = mean(values);
    let centered: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let c0 = centered.iter().map(|d| d * d).sum::<f64>() / n as f64;
    if c0 == 0.0 {
        return None;
    }

    let ratios = (0..=nlags.min(n - 1))
        .map(|k| {
            let divisor = if adjusted { n - k } else { n };
            let ck = centered[..n - k]
                .iter()
                .zip(&centered[k..])
                .map(|(a, b)| a * b)
                .sum::<f64>()
                / divisor as f64;
            ck / c0
        })
        .collect();
    Some(ratios)
}

/// Sample autocorrelation for lags `0..=nlags`, using the biased (1/n)
/// autocovariance. Empty when `nlags` is 0; `None` for a constant series.
pub fn autocorrelation(values: &[f64], nlags: usize) -> Option<Vec<f64>> {
    if nlags == 0 {
        return Some(Vec::new());
    }
    normalized_autocovariance(values, nlags, false)
}

/// Partial autocorrelation for lags `0..=nlags` by Yule-Walker with the
/// adjusted (1/(n-k)) autocovariance, solved with the Durbin-Levinson
/// recursion. Empty when `nlags` is 0; `None` for a constant series or when
/// the recursion degenerates.
pub fn partial_autocorrelation(values: &[f64], nlags: usize) -> Option<Vec<f64>> {
    if nlags == 0 {
        return Some(Vec::new());
    }
    let rho = normalized_autocovariance(values, nlags, true)?;
    durbin_levinson(&rho)
}

/// Last coefficient of each AR(k) fit to the correlations `rho`, with 1 at lag 0
fn durbin_levinson(rho: &[f64]) -> Option<Vec<f64>> {
    let mut pacf = Vec::with_capacity(rho.len());
    pacf.push(1.0);

    // phi[j - 1] holds phi_{k-1, j}
    let mut phi: Vec<f64> = Vec::new();
    for k in 1..rho.len() {
        let num = rho[k] - (1..k).map(|j| phi[j - 1] * rho[k - j]).sum::<f64>();
        let den = 1.0 - (1..k).map(|j| phi[j - 1] * rho[j]).sum::<f64>();
        if den.abs() <= f64::EPSILON {
            return None;
        }
        let phi_kk = num / den;

        let mut next: Vec<f64> = (1..k).map(|j| phi[j - 1] - phi_kk * phi[k - j - 1]).collect();
        next.push(phi_kk);
        phi = next;
        pacf.push(phi_kk);
    }

    Some(pacf)
}

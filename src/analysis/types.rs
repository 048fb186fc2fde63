//! Core data types for relay bandwidth analysis.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Absolute instant, always UTC.
pub type Timestamp = DateTime<Utc>;

/// Traffic direction of a history record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Bytes read by the relay
    Read,
    /// Bytes written by the relay
    Write,
}

impl Direction {
    /// Tie-break rank used when two samples share a timestamp.
    /// Write sorts before Read, matching the order the directions are decoded in.
    pub fn assembly_rank(self) -> u8 {
        match self {
            Direction::Write => 0,
            Direction::Read => 1,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Read => write!(f, "Read"),
            Direction::Write => write!(f, "Write"),
        }
    }
}

/// A history header field as it appeared in the document.
///
/// Values of the wrong JSON type are kept as `Invalid` so the decoder can
/// reject that one tier instead of the whole document failing to parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Lenient<T> {
    Valid(T),
    Invalid(serde_json::Value),
}

impl<T> Lenient<T> {
    pub fn valid(&self) -> Option<&T> {
        match self {
            Lenient::Valid(v) => Some(v),
            Lenient::Invalid(_) => None,
        }
    }
}

/// A missing field reads as `null`
impl<T> Default for Lenient<T> {
    fn default() -> Self {
        Lenient::Invalid(serde_json::Value::Null)
    }
}

impl<T: std::fmt::Display> std::fmt::Display for Lenient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lenient::Valid(v) => write!(f, "{}", v),
            Lenient::Invalid(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for Lenient<String> {
    fn from(s: &str) -> Self {
        Lenient::Valid(s.to_string())
    }
}

impl From<i64> for Lenient<i64> {
    fn from(v: i64) -> Self {
        Lenient::Valid(v)
    }
}

impl From<f64> for Lenient<f64> {
    fn from(v: f64) -> Self {
        Lenient::Valid(v)
    }
}

fn default_factor() -> Lenient<f64> {
    Lenient::Valid(1.0)
}

/// One resolution tier of a history record, as published by the measurement service.
///
/// The i-th value covers `[first + i*interval, first + (i+1)*interval)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryBlock {
    /// Start of the first slot, `"YYYY-MM-DD HH:MM:SS"` UTC
    #[serde(default)]
    pub first: Lenient<String>,
    /// End of the last slot, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last: Option<Lenient<String>>,
    /// Slot width in seconds
    #[serde(default)]
    pub interval: Lenient<i64>,
    /// Multiplier recovering bytes/second from the stored values
    #[serde(default = "default_factor")]
    pub factor: Lenient<f64>,
    /// Number of slots, informational only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<Lenient<u64>>,
    /// Raw values; `None` means no measurement for that slot
    #[serde(default)]
    pub values: Vec<Option<f64>>,
}

/// Tier name -> block, for one direction of one relay.
///
/// Backed by a `BTreeMap` so iteration order is the same on every run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HistoryRecord {
    pub tiers: BTreeMap<String, HistoryBlock>,
}

impl HistoryRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion, mostly for fixtures.
    pub fn with_tier(mut self, name: &str, block: HistoryBlock) -> Self {
        self.tiers.insert(name.to_string(), block);
        self
    }

    pub fn get(&self, tier: &str) -> Option<&HistoryBlock> {
        self.tiers.get(tier)
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }
}

/// Raw per-relay input handed over by the retrieval layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayHistory {
    pub fingerprint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default)]
    pub write_history: Option<HistoryRecord>,
    #[serde(default)]
    pub read_history: Option<HistoryRecord>,
    /// Self-reported capacity in bytes/second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertised_bandwidth: Option<f64>,
}

/// A bandwidth document as served by the measurement service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BandwidthDocument {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub relays_published: Option<String>,
    #[serde(default)]
    pub relays: Vec<RelayHistory>,
}

/// A single decoded measurement. Bandwidth is in bytes/second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub direction: Direction,
    pub bandwidth: f64,
}

impl Sample {
    pub fn new(timestamp: Timestamp, direction: Direction, bandwidth: f64) -> Self {
        Self {
            timestamp,
            direction,
            bandwidth,
        }
    }
}

/// Time-ordered samples of one relay, both directions interleaved.
///
/// An empty series means "no data for the requested period". That is not the
/// same thing as a series of zero-valued samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    samples: Vec<Sample>,
}

impl Series {
    /// Wrap samples that are already in assembly order.
    pub(crate) fn from_ordered(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Bandwidth values of one partition, in series order
    pub fn values(&self, partition: Partition) -> Vec<f64> {
        self.samples
            .iter()
            .filter(|s| partition.includes(s.direction))
            .map(|s| s.bandwidth)
            .collect()
    }

    /// Tabular form: `Timestamp, Type, Bandwidth`
    pub fn rows(&self) -> Vec<SeriesRow> {
        self.samples
            .iter()
            .map(|s| SeriesRow {
                timestamp: s.timestamp.format(crate::analysis::decoder::HISTORY_TIME_FORMAT).to_string(),
                kind: s.direction,
                bandwidth: s.bandwidth,
            })
            .collect()
    }
}

/// One row of the exported series table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesRow {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Type")]
    pub kind: Direction,
    #[serde(rename = "Bandwidth (B/s)")]
    pub bandwidth: f64,
}

/// Subset of a series that statistics are computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Partition {
    Read,
    Write,
    /// Read and Write together
    Total,
}

impl Partition {
    pub const ALL: [Partition; 3] = [Partition::Read, Partition::Write, Partition::Total];

    pub fn includes(self, direction: Direction) -> bool {
        match self {
            Partition::Read => direction == Direction::Read,
            Partition::Write => direction == Direction::Write,
            Partition::Total => true,
        }
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Partition::Read => write!(f, "Read"),
            Partition::Write => write!(f, "Write"),
            Partition::Total => write!(f, "Total"),
        }
    }
}

/// A ratio that may have no value because its divisor was exactly zero
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum Ratio {
    Defined(f64),
    Undefined,
}

impl Ratio {
    pub fn from_parts(numerator: f64, denominator: f64) -> Self {
        if denominator == 0.0 {
            Ratio::Undefined
        } else {
            Ratio::Defined(numerator / denominator)
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Ratio::Defined(_))
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Ratio::Defined(v) => Some(*v),
            Ratio::Undefined => None,
        }
    }
}

impl std::fmt::Display for Ratio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ratio::Defined(v) => write!(f, "{:.4}", v),
            Ratio::Undefined => write!(f, "n/a"),
        }
    }
}

/// Statistics for one partition of a relay's series.
///
/// Location and spread fields are in the unit scale the engine was configured
/// with. Fields that need more samples than the partition has, or that were
/// not requested, are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionStatistics {
    pub partition: Partition,
    pub sample_count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub median: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coefficient_of_variation: Option<Ratio>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q1: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q3: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iqr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outlier_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skewness: Option<f64>,
    /// Excess kurtosis (normal distribution = 0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kurtosis: Option<f64>,
    /// Lags 0..=L
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acf: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pacf: Option<Vec<f64>>,
}

/// Per-relay statistics; partitions without samples are absent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayStatistics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<PartitionStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write: Option<PartitionStatistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<PartitionStatistics>,
}

impl RelayStatistics {
    pub fn get(&self, partition: Partition) -> Option<&PartitionStatistics> {
        match partition {
            Partition::Read => self.read.as_ref(),
            Partition::Write => self.write.as_ref(),
            Partition::Total => self.total.as_ref(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.read.is_none() && self.write.is_none() && self.total.is_none()
    }
}

/// Everything the pipeline produced for one relay
#[derive(Debug, Clone, Serialize)]
pub struct RelayReport {
    pub relay_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertised_bandwidth: Option<f64>,
    pub sample_count: usize,
    pub statistics: RelayStatistics,
    /// Tier-level decode failures, formatted for display
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<String>,
    /// Every tier that was attempted failed to decode
    pub decode_failed: bool,
    #[serde(skip)]
    pub series: Series,
}

/// Why a relay has no row in the fleet summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    /// No samples in the requested window
    NoData,
    /// Fewer samples than the summary requires
    InsufficientSamples,
    /// Every attempted tier was malformed
    DecodeFailed,
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExclusionReason::NoData => write!(f, "excluded: no data"),
            ExclusionReason::InsufficientSamples => write!(f, "excluded: insufficient samples"),
            ExclusionReason::DecodeFailed => write!(f, "excluded: decode failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedRelay {
    pub relay_id: String,
    pub reason: ExclusionReason,
    pub sample_count: usize,
}

/// One fleet summary row: a relay's Total-partition statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetRow {
    pub relay_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    pub sample_count: usize,
    pub mean: f64,
    pub median: f64,
    pub range: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_dev: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iqr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skewness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kurtosis: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coefficient_of_variation: Option<Ratio>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outlier_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertised_bandwidth: Option<f64>,
}

/// Fleet-wide table, rows ordered by relay identifier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetSummary {
    pub rows: Vec<FleetRow>,
    pub excluded: Vec<ExcludedRelay>,
}

/// A point of an empirical cumulative distribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CdfPoint {
    pub value: f64,
    pub probability: f64,
}

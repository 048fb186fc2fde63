//! Bandwidth history decoding.
//!
//! Expands the multi-resolution, factor-scaled history blocks published by the
//! measurement service into absolute-time samples in bytes/second.

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use super::time_window::TimeWindow;
use super::types::*;

/// Format of `first`/`last` in history blocks
pub const HISTORY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A tier that cannot be decoded. Scoped to that tier only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MalformedHistoryError {
    #[error("tier {tier}: cannot parse start time '{value}'")]
    InvalidFirst { tier: String, value: String },

    #[error("tier {tier}: interval must be a positive whole number of seconds, got {value}")]
    InvalidInterval { tier: String, value: String },

    #[error("tier {tier}: factor must be a finite number, got {value}")]
    InvalidFactor { tier: String, value: String },
}

impl MalformedHistoryError {
    pub fn tier(&self) -> &str {
        match self {
            MalformedHistoryError::InvalidFirst { tier, .. } => tier,
            MalformedHistoryError::InvalidInterval { tier, .. } => tier,
            MalformedHistoryError::InvalidFactor { tier, .. } => tier,
        }
    }
}

/// Which tiers of a record get decoded
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TierPolicy {
    /// Decode every tier present, overlapping slots included
    All,
    /// Finest tier covering the window; every tier when there is no window
    #[default]
    Finest,
    /// First tier of the list that exists and is well-formed; nothing otherwise
    Preferred(Vec<String>),
}

/// Result of decoding one record. Partial success is normal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeOutcome {
    /// Unsorted samples
    pub samples: Vec<Sample>,
    /// Tiers that contributed samples (possibly zero of them)
    pub tiers_decoded: Vec<String>,
    pub errors: Vec<MalformedHistoryError>,
}

impl DecodeOutcome {
    /// True when tiers were attempted and every one of them was malformed
    pub fn all_malformed(&self) -> bool {
        self.tiers_decoded.is_empty() && !self.errors.is_empty()
    }
}

/// A block whose header has been validated
#[derive(Debug, Clone, Copy)]
struct ParsedTier<'a> {
    name: &'a str,
    first: Timestamp,
    interval: i64,
    factor: f64,
    block: &'a HistoryBlock,
}

impl ParsedTier<'_> {
    /// End of the last slot
    fn end(&self) -> Timestamp {
        let slots = self.block.values.len() as i64;
        self.interval
            .checked_mul(slots)
            .and_then(TimeDelta::try_seconds)
            .and_then(|span| self.first.checked_add_signed(span))
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC)
    }

    fn covers(&self, window: &TimeWindow) -> bool {
        self.first <= window.start && self.end() >= window.end
    }
}

/// Parse a history timestamp (`"YYYY-MM-DD HH:MM:SS"`, UTC)
pub fn parse_history_time(s: &str) -> Option<Timestamp> {
    NaiveDateTime::parse_from_str(s.trim(), HISTORY_TIME_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}

fn parse_tier<'a>(name: &'a str, block: &'a HistoryBlock) -> Result<ParsedTier<'a>, MalformedHistoryError> {
    let first = block
        .first
        .valid()
        .and_then(|s| parse_history_time(s))
        .ok_or_else(|| MalformedHistoryError::InvalidFirst {
            tier: name.to_string(),
            value: block.first.to_string(),
        })?;

    let interval = block
        .interval
        .valid()
        .copied()
        .filter(|i| *i > 0)
        .ok_or_else(|| MalformedHistoryError::InvalidInterval {
            tier: name.to_string(),
            value: block.interval.to_string(),
        })?;

    let factor = block
        .factor
        .valid()
        .copied()
        .filter(|f| f.is_finite())
        .ok_or_else(|| MalformedHistoryError::InvalidFactor {
            tier: name.to_string(),
            value: block.factor.to_string(),
        })?;

    Ok(ParsedTier {
        name,
        first,
        interval,
        factor,
        block,
    })
}

/// Emit one sample per present value. Nulls are skipped, never zero-filled.
fn expand_tier(tier: &ParsedTier<'_>, direction: Direction, out: &mut Vec<Sample>) {
    let factor = tier.factor;
    let before = out.len();

    for (i, value) in tier.block.values.iter().enumerate() {
        let Some(raw) = value else {
            continue;
        };
        let timestamp = (i as i64)
            .checked_mul(tier.interval)
            .and_then(TimeDelta::try_seconds)
            .and_then(|offset| tier.first.checked_add_signed(offset));
        let Some(timestamp) = timestamp else {
            log::warn!("tier {}: slot {} is out of the representable time range", tier.name, i);
            break;
        };
        out.push(Sample::new(timestamp, direction, raw * factor));
    }

    log::debug!(
        "Decoded {} {} samples from tier {} ({} slots)",
        out.len() - before,
        direction,
        tier.name,
        tier.block.values.len()
    );
}

/// Pick the tier whose span best matches the window: the finest one covering
/// it entirely, otherwise the one overlapping it the most.
fn finest_for_window<'a>(tiers: &[ParsedTier<'a>], window: &TimeWindow) -> Option<ParsedTier<'a>> {
    let covering = tiers
        .iter()
        .filter(|t| t.covers(window))
        .min_by_key(|t| t.interval);
    if let Some(tier) = covering {
        return Some(*tier);
    }

    tiers
        .iter()
        .map(|t| (t, window.overlap(t.first, t.end())))
        .filter(|(_, overlap)| *overlap > TimeDelta::zero())
        .max_by(|(a, oa), (b, ob)| oa.cmp(ob).then(b.interval.cmp(&a.interval)))
        .map(|(t, _)| *t)
}

/// Decode one history record into samples of the given direction.
///
/// Malformed tiers are reported in the outcome and do not prevent the other
/// tiers from decoding. `window` only influences tier selection under
/// [`TierPolicy::Finest`]; samples are not filtered here.
pub fn decode(
    record: &HistoryRecord,
    direction: Direction,
    policy: &TierPolicy,
    window: Option<&TimeWindow>,
) -> DecodeOutcome {
    let mut outcome = DecodeOutcome::default();

    let selected: Vec<ParsedTier<'_>> = match policy {
        TierPolicy::Preferred(names) => {
            let mut chosen = None;
            for name in names {
                let Some((key, block)) = record.tiers.get_key_value(name) else {
                    continue;
                };
                match parse_tier(key, block) {
                    Ok(tier) => {
                        chosen = Some(tier);
                        break;
                    }
                    Err(e) => {
                        log::warn!("{} history: {}", direction, e);
                        outcome.errors.push(e);
                    }
                }
            }
            if chosen.is_none() {
                log::debug!("{} history has none of the preferred tiers {:?}", direction, names);
            }
            chosen.into_iter().collect()
        }
        TierPolicy::All | TierPolicy::Finest => {
            let mut parsed = Vec::new();
            for (name, block) in &record.tiers {
                match parse_tier(name, block) {
                    Ok(tier) => parsed.push(tier),
                    Err(e) => {
                        log::warn!("{} history: {}", direction, e);
                        outcome.errors.push(e);
                    }
                }
            }
            match (policy, window) {
                (TierPolicy::Finest, Some(window)) => finest_for_window(&parsed, window).into_iter().collect(),
                _ => parsed,
            }
        }
    };

    for tier in &selected {
        expand_tier(tier, direction, &mut outcome.samples);
        outcome.tiers_decoded.push(tier.name.to_string());
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(first: &str, interval: i64, factor: f64, values: Vec<Option<f64>>) -> HistoryBlock {
        HistoryBlock {
            first: first.into(),
            last: None,
            interval: interval.into(),
            factor: factor.into(),
            count: Some(Lenient::Valid(values.len() as u64)),
            values,
        }
    }

    fn t(s: &str) -> Timestamp {
        parse_history_time(s).unwrap()
    }

    #[test]
    fn test_decode_skips_nulls_and_applies_factor() {
        let record = HistoryRecord::new().with_tier(
            "1_month",
            block("2024-09-01 00:00:00", 60, 2.0, vec![Some(1.0), None, Some(3.0)]),
        );

        let outcome = decode(&record, Direction::Read, &TierPolicy::All, None);
        let t0 = t("2024-09-01 00:00:00");

        assert_eq!(
            outcome.samples,
            vec![
                Sample::new(t0, Direction::Read, 2.0),
                Sample::new(t0 + TimeDelta::seconds(120), Direction::Read, 6.0),
            ]
        );
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_zero_values_are_kept() {
        let record = HistoryRecord::new().with_tier(
            "1_week",
            block("2024-09-01 00:00:00", 3600, 1.0, vec![Some(0.0), Some(0.0)]),
        );
        let outcome = decode(&record, Direction::Write, &TierPolicy::All, None);
        assert_eq!(outcome.samples.len(), 2);
        assert!(outcome.samples.iter().all(|s| s.bandwidth == 0.0));
    }

    #[test]
    fn test_malformed_tier_does_not_block_others() {
        let record = HistoryRecord::new()
            .with_tier("1_month", block("not a date", 3600, 1.0, vec![Some(1.0)]))
            .with_tier("1_week", block("2024-09-01 00:00:00", 0, 1.0, vec![Some(1.0)]))
            .with_tier("3_months", block("2024-09-01 00:00:00", 86400, 1.0, vec![Some(5.0)]));

        let outcome = decode(&record, Direction::Read, &TierPolicy::All, None);

        assert_eq!(outcome.samples.len(), 1);
        assert_eq!(outcome.tiers_decoded, vec!["3_months".to_string()]);
        assert_eq!(outcome.errors.len(), 2);
        assert!(!outcome.all_malformed());
        assert!(outcome
            .errors
            .iter()
            .any(|e| matches!(e, MalformedHistoryError::InvalidInterval { value, .. } if value == "0")));
        assert!(outcome.errors.iter().any(|e| e.tier() == "1_month"));
    }

    #[test]
    fn test_wrongly_typed_header_fields_are_tier_errors() {
        let mut no_first = block("2024-09-01 00:00:00", 3600, 1.0, vec![Some(1.0)]);
        no_first.first = Lenient::Invalid(serde_json::Value::Null);
        let mut text_interval = block("2024-09-01 00:00:00", 3600, 1.0, vec![Some(1.0)]);
        text_interval.interval = Lenient::Invalid(serde_json::json!("3600"));
        let mut null_factor = block("2024-09-01 00:00:00", 3600, 1.0, vec![Some(1.0)]);
        null_factor.factor = Lenient::Invalid(serde_json::Value::Null);

        let record = HistoryRecord::new()
            .with_tier("1_week", no_first)
            .with_tier("1_month", text_interval)
            .with_tier("3_months", null_factor)
            .with_tier("1_year", block("2024-01-01 00:00:00", 86400, 2.0, vec![Some(4.0)]));

        let outcome = decode(&record, Direction::Write, &TierPolicy::All, None);
        assert_eq!(outcome.tiers_decoded, vec!["1_year".to_string()]);
        assert_eq!(outcome.samples[0].bandwidth, 8.0);
        assert_eq!(outcome.errors.len(), 3);
        assert!(outcome.errors.iter().any(|e| matches!(
            e,
            MalformedHistoryError::InvalidFirst { value, .. } if value == "null"
        )));
        assert!(outcome.errors.iter().any(|e| matches!(
            e,
            MalformedHistoryError::InvalidInterval { value, .. } if value == "\"3600\""
        )));
        assert!(outcome.errors.iter().any(|e| e.tier() == "3_months"));
    }

    #[test]
    fn test_default_policy_with_window_avoids_overlapping_tiers() {
        // 1_week: four hourly slots, 1_month: one 4-hour slot, same span
        let record = HistoryRecord::new()
            .with_tier("1_week", block("2024-09-01 00:00:00", 3600, 1.0, vec![Some(1.0); 4]))
            .with_tier("1_month", block("2024-09-01 00:00:00", 14400, 1.0, vec![Some(1.0)]));
        let window = TimeWindow::new(t("2024-09-01 00:00:00"), t("2024-09-01 04:00:00"));

        let outcome = decode(&record, Direction::Read, &TierPolicy::default(), Some(&window));
        assert_eq!(outcome.tiers_decoded, vec!["1_week".to_string()]);
        assert_eq!(outcome.samples.len(), 4);
        let mut stamps: Vec<Timestamp> = outcome.samples.iter().map(|s| s.timestamp).collect();
        stamps.dedup();
        assert_eq!(stamps.len(), 4);
    }

    #[test]
    fn test_all_malformed() {
        let record = HistoryRecord::new().with_tier("1_month", block("2024/09/01", 3600, 1.0, vec![Some(1.0)]));
        let outcome = decode(&record, Direction::Read, &TierPolicy::All, None);
        assert!(outcome.samples.is_empty());
        assert!(outcome.all_malformed());
    }

    #[test]
    fn test_preferred_policy_falls_back_in_order() {
        let record = HistoryRecord::new()
            .with_tier("1_week", block("2024-09-01 00:00:00", 900, 1.0, vec![Some(1.0)]))
            .with_tier("3_months", block("2024-06-01 00:00:00", 43200, 1.0, vec![Some(2.0), Some(3.0)]));

        let policy = TierPolicy::Preferred(vec!["1_month".into(), "3_months".into(), "1_week".into()]);
        let outcome = decode(&record, Direction::Write, &policy, None);

        assert_eq!(outcome.tiers_decoded, vec!["3_months".to_string()]);
        assert_eq!(outcome.samples.len(), 2);
    }

    #[test]
    fn test_preferred_policy_without_match_yields_nothing() {
        let record = HistoryRecord::new().with_tier("1_week", block("2024-09-01 00:00:00", 900, 1.0, vec![Some(1.0)]));
        let outcome = decode(&record, Direction::Write, &TierPolicy::Preferred(vec!["3_months".into()]), None);
        assert!(outcome.samples.is_empty());
        assert!(outcome.errors.is_empty());
        assert!(!outcome.all_malformed());
    }

    #[test]
    fn test_finest_policy_picks_finest_covering_tier() {
        // 1_week: 2024-09-01 .. 2024-09-08, 1_month: 2024-08-10 .. 2024-09-09
        let record = HistoryRecord::new()
            .with_tier("1_week", block("2024-09-01 00:00:00", 3600, 1.0, vec![Some(1.0); 168]))
            .with_tier("1_month", block("2024-08-10 00:00:00", 14400, 1.0, vec![Some(2.0); 180]));

        let inside_week = TimeWindow::new(t("2024-09-02 00:00:00"), t("2024-09-03 00:00:00"));
        let outcome = decode(&record, Direction::Read, &TierPolicy::Finest, Some(&inside_week));
        assert_eq!(outcome.tiers_decoded, vec!["1_week".to_string()]);

        let spanning = TimeWindow::new(t("2024-08-20 00:00:00"), t("2024-09-05 00:00:00"));
        let outcome = decode(&record, Direction::Read, &TierPolicy::Finest, Some(&spanning));
        assert_eq!(outcome.tiers_decoded, vec!["1_month".to_string()]);
    }

    #[test]
    fn test_finest_policy_without_window_decodes_everything() {
        let record = HistoryRecord::new()
            .with_tier("1_week", block("2024-09-01 00:00:00", 3600, 1.0, vec![Some(1.0)]))
            .with_tier("1_month", block("2024-08-10 00:00:00", 14400, 1.0, vec![Some(2.0)]));
        let outcome = decode(&record, Direction::Read, &TierPolicy::Finest, None);
        assert_eq!(outcome.tiers_decoded.len(), 2);
        assert_eq!(outcome.samples.len(), 2);
    }

    #[test]
    fn test_parse_history_time() {
        assert!(parse_history_time("2024-09-01 12:30:00").is_some());
        assert!(parse_history_time("2024-09-01T12:30:00Z").is_none());
        assert!(parse_history_time("").is_none());
    }
}

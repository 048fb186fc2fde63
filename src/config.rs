use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::analysis::decoder::{parse_history_time, TierPolicy};
use crate::analysis::pipeline::PipelineSettings;
use crate::analysis::statistics::StatisticsOptions;
use crate::analysis::time_window::TimeWindow;
use crate::analysis::types::Timestamp;

/// Pipeline configuration, usually read from YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Time range to analyse; all available history when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<WindowConfig>,
    pub tiers: TierConfig,
    pub statistics: StatisticsOptions,
    /// Fewest Total samples a relay needs to get a fleet summary row
    pub min_samples: usize,
    /// Worker threads, 0 = one per core
    pub threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window: None,
            tiers: TierConfig::default(),
            statistics: StatisticsOptions::default(),
            min_samples: 1,
            threads: 0,
        }
    }
}

/// Either an explicit `[start, end)` or a lookback relative to "now"
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// `"YYYY-MM-DD HH:MM:SS"`, UTC
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    /// Window length, e.g. "180days"
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub lookback: Option<Duration>,
    /// How long before "now" the window ends
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub offset: Option<Duration>,
}

/// Tier selection policy as written in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierPolicyKind {
    All,
    #[default]
    Finest,
    Preferred,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub policy: TierPolicyKind,
    /// Tier names in order of preference, used by `preferred`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub preferred: Vec<String>,
}

impl TierConfig {
    pub fn to_policy(&self) -> TierPolicy {
        match self.policy {
            TierPolicyKind::All => TierPolicy::All,
            TierPolicyKind::Finest => TierPolicy::Finest,
            TierPolicyKind::Preferred => TierPolicy::Preferred(self.preferred.clone()),
        }
    }
}

fn to_delta(duration: Duration, field: &str) -> Result<TimeDelta, ValidationError> {
    TimeDelta::from_std(duration)
        .map_err(|_| ValidationError::InvalidWindow(format!("{} is out of range", field)))
}

fn parse_bound(value: &str, field: &str) -> Result<Timestamp, ValidationError> {
    parse_history_time(value).ok_or_else(|| {
        ValidationError::InvalidWindow(format!(
            "{} '{}' is not a \"YYYY-MM-DD HH:MM:SS\" timestamp",
            field, value
        ))
    })
}

impl WindowConfig {
    /// Turn the configuration into a concrete window. `now` is only used for
    /// lookback windows.
    pub fn resolve(&self, now: Timestamp) -> Result<TimeWindow, ValidationError> {
        match (&self.start, &self.end, self.lookback) {
            (Some(start), Some(end), None) => {
                if self.offset.is_some() {
                    return Err(ValidationError::InvalidWindow(
                        "offset only applies to lookback windows".to_string(),
                    ));
                }
                Ok(TimeWindow::new(parse_bound(start, "start")?, parse_bound(end, "end")?))
            }
            (None, None, Some(lookback)) => {
                if lookback.is_zero() {
                    return Err(ValidationError::InvalidWindow("lookback cannot be zero".to_string()));
                }
                let offset = to_delta(self.offset.unwrap_or_default(), "offset")?;
                let length = to_delta(lookback, "lookback")?;
                let end = now.checked_sub_signed(offset);
                let start = end.and_then(|end| end.checked_sub_signed(length));
                match (start, end) {
                    (Some(start), Some(end)) => Ok(TimeWindow::new(start, end)),
                    _ => Err(ValidationError::InvalidWindow(
                        "lookback and offset reach outside the supported time range".to_string(),
                    )),
                }
            }
            (_, _, Some(_)) => Err(ValidationError::InvalidWindow(
                "use either start/end or lookback, not both".to_string(),
            )),
            (Some(_), None, None) | (None, Some(_), None) => Err(ValidationError::InvalidWindow(
                "start and end must be given together".to_string(),
            )),
            (None, None, None) => Err(ValidationError::InvalidWindow(
                "window needs start/end or lookback".to_string(),
            )),
        }
    }
}

impl PipelineConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(window) = &self.window {
            // Any instant will do; only the shape of the window is checked here
            window.resolve(Timestamp::default())?;
        }

        if self.tiers.policy == TierPolicyKind::Preferred && self.tiers.preferred.is_empty() {
            return Err(ValidationError::InvalidTiers(
                "preferred policy needs at least one tier name".to_string(),
            ));
        }
        if self.tiers.preferred.iter().any(|t| t.trim().is_empty()) {
            return Err(ValidationError::InvalidTiers("tier names cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Settings for one run, with the window anchored at `now`
    pub fn settings(&self, now: Timestamp) -> Result<PipelineSettings, ValidationError> {
        let window = self.window.as_ref().map(|w| w.resolve(now)).transpose()?;
        Ok(PipelineSettings {
            window,
            tier_policy: self.tiers.to_policy(),
            statistics: self.statistics.clone(),
            min_samples: self.min_samples,
            threads: self.threads,
        })
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid window configuration: {0}")]
    InvalidWindow(String),
    #[error("Invalid tier configuration: {0}")]
    InvalidTiers(String),
}

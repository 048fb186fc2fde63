//! # RelayStats - Bandwidth history statistics for network relays
//!
//! This library reconstructs per-relay bandwidth time series from the
//! multi-resolution history documents published by a relay measurement
//! service, and characterises relay behaviour across a fleet.
//!
//! ## Overview
//!
//! History documents store, per relay and per direction, several resolution
//! tiers ("1_week", "1_month", "3_months", ...). Each tier holds a start time,
//! a slot interval, a scale factor and a list of nullable values. RelayStats
//! turns these into a uniform series of samples in bytes/second and computes
//! statistics over it.
//!
//! ## Pipeline
//!
//! - `analysis::decoder`: tier selection and expansion into samples
//! - `analysis::time_window`: half-open `[start, end)` filtering
//! - `analysis::assembler`: merges write and read samples into one series
//! - `analysis::statistics`: mean, spread, quartiles, outliers, shape, ACF/PACF
//! - `analysis::fleet`: one summary row per relay, CDFs and CoV ranking
//! - `analysis::pipeline`: runs relays in parallel and aggregates the results
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use relaystats::{analysis, config_loader};
//!
//! let config = config_loader::load_config("relaystats.yaml".as_ref())?;
//! let settings = config.settings(chrono::Utc::now())?;
//!
//! let relays = analysis::load_documents(&[std::path::PathBuf::from("bandwidth.json")]);
//! let report = analysis::process_fleet(relays, &settings)?;
//!
//! for row in &report.summary.rows {
//!     println!("{}: mean {:.2}", row.relay_id, row.mean);
//! }
//! # Ok::<(), color_eyre::Report>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! window:
//!   lookback: "180days"
//! tiers:
//!   policy: preferred      # all / finest / preferred
//!   preferred: ["3_months", "1_month"]
//! statistics:
//!   unit_scale: mebibytes_per_second
//!   max_lags: 40
//! min_samples: 2
//! ```
//!
//! ## Error Handling
//!
//! Domain errors are `thiserror` enums. File and configuration boundaries
//! return `color_eyre` results. A relay that fails to decode never aborts a
//! batch; it is reported as excluded from the fleet summary instead.

pub mod config;
pub mod config_loader;
pub mod analysis;

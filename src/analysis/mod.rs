//! Bandwidth history reconstruction and statistics.
//!
//! Data flows one way: raw history -> decoded samples -> windowed samples ->
//! assembled series -> per-relay statistics -> fleet summary.

pub mod types;
pub mod decoder;
pub mod time_window;
pub mod assembler;
pub mod statistics;
pub mod fleet;
pub mod pipeline;
pub mod input;
pub mod report;

pub use types::*;
pub use decoder::{decode, DecodeOutcome, MalformedHistoryError, TierPolicy};
pub use time_window::{filter_samples, TimeWindow};
pub use assembler::assemble;
pub use statistics::{compute, StatisticsOptions, UnitScale};
pub use fleet::{aggregate, FleetEntry};
pub use pipeline::{process_fleet, process_relay, FleetReport, PipelineSettings};
pub use input::{load_document, load_documents};
pub use report::{export_series, generate_json_report, generate_text_report, write_fleet_csv, write_series_csv};

//! Series assembly.
//!
//! Merges the decoded, windowed samples of both directions into one
//! time-ordered series.

use super::types::*;

/// Concatenate write then read samples and order them by timestamp.
///
/// Equal timestamps are ordered Write before Read; within one direction the
/// input order is kept (the sort is stable).
pub fn assemble(write_samples: Vec<Sample>, read_samples: Vec<Sample>) -> Series {
    let mut samples = write_samples;
    samples.extend(read_samples);
    samples.sort_by_key(|s| (s.timestamp, s.direction.assembly_rank()));
    Series::from_ordered(samples)
}

//! Scan ranges restricting which regions get scanned.
//!
//! Ranges are user-declared address spans, either literal bounds or bounds
//! resolved from backing-file substrings. A region is scanned when no
//! ranges are configured at all, or when at least one range overlaps it.

use crate::maps::Region;
use serde::{Deserialize, Serialize};

/// An immutable half-open address span.
///
/// `end == None` means "no upper bound", produced when a substring-derived
/// range found no end boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ScanRange {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    /// Overlap test against a region: `region.start < range.end` and
    /// `region.end > range.start`, an unset end being unbounded.
    pub fn overlaps(&self, region: &Region) -> bool {
        region.start < self.end.unwrap_or(u64::MAX) && region.end > self.start
    }
}

/// Whether the configured ranges admit a region into the scan.
pub fn admits(ranges: &[ScanRange], region: &Region) -> bool {
    ranges.is_empty() || ranges.iter().any(|range| range.overlaps(region))
}

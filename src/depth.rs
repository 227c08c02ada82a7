//! Per-position depth aggregation and alignment summary report parsing

use crate::{CovconError, CovconResult};
use std::io::BufRead;

/// Marker of the mapped-read line in a `samtools flagstat` report
const MAPPED_MARKER: &str = "mapped (";

/// Running totals over a depth stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepthSummary {
    pub total_bases: u64,
    pub covered_bases: u64,
    pub total_depth: u64,
}

impl DepthSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account for one observed reference position
    pub fn observe(&mut self, depth: u64) {
        self.total_bases += 1;
        self.total_depth += depth;
        if depth > 0 {
            self.covered_bases += 1;
        }
    }

    /// Parse a `contig<TAB>position<TAB>depth` line, returning the depth.
    /// Anything else is treated as malformed and yields `None`.
    pub fn parse_line(line: &str) -> Option<u64> {
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        if fields.len() != 3 {
            return None;
        }

        fields[1].trim().parse::<u64>().ok()?;
        fields[2].trim().parse::<u64>().ok()
    }

    /// Stream a depth table, skipping malformed lines
    pub fn from_reader<R: BufRead>(reader: R) -> CovconResult<Self> {
        let mut summary = Self::new();
        let mut skipped = 0usize;

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match Self::parse_line(&line) {
                Some(depth) => summary.observe(depth),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            log::debug!("Skipped {} malformed depth lines", skipped);
        }

        Ok(summary)
    }
}

/// Extract the mapped-read count from an alignment summary report.
///
/// The first line containing `mapped (` is used; its leading integer is the count.
pub fn parse_mapped_reads<R: BufRead>(reader: R) -> CovconResult<u64> {
    for line in reader.lines() {
        let line = line?;
        if !line.contains(MAPPED_MARKER) {
            continue;
        }

        let first = line.split_whitespace().next().unwrap_or("");
        return first.parse::<u64>().map_err(|_| {
            CovconError::ExternalTool(format!("Invalid mapped read count in report line: {}", line))
        });
    }

    Err(CovconError::ExternalTool(
        "No mapped read count found in alignment summary report".to_string(),
    ))
}

//! Coverage extraction: turns one alignment's mapped-read count and depth
//! stream into a persisted `CoverageRecord`

use crate::depth::DepthSummary;
use crate::stats::AlignmentStats;
use crate::utils::format_count;
use crate::{CovconError, CovconResult, CoverageRecord};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Number of comma-separated fields in a persisted coverage record
pub const RECORD_FIELD_COUNT: usize = 10;

/// Identifying metadata of one alignment run
#[derive(Debug, Clone)]
pub struct RunInfo {
    pub sample_id: String,
    pub sra_accession: String,
    pub subsample: String,
    pub total_reads: u64,
}

/// `numerator / denominator`, or 0 when the denominator is 0
pub fn safe_ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// `numerator / denominator * 100`, or 0 when the denominator is 0
pub fn safe_percentage(numerator: u64, denominator: u64) -> f64 {
    safe_ratio(numerator, denominator) * 100.0
}

/// Round to 2 decimal places using the exact decimal value of `value`
pub fn round2(value: f64) -> f64 {
    format!("{:.2}", value).parse::<f64>().unwrap_or(value)
}

/// Shortest round-trip rendering that always keeps a fractional part (`90.0`, `85.33`)
pub fn format_decimal(value: f64) -> String {
    format!("{:?}", value)
}

impl CoverageRecord {
    /// Derive the coverage metrics of a run. All ratios are rounded to 2
    /// decimals; the rounded values are the values of record.
    pub fn from_stats(run: &RunInfo, mapped_reads: u64, depth: &DepthSummary) -> Self {
        Self {
            sample_id: run.sample_id.clone(),
            sra_accession: run.sra_accession.clone(),
            subsample: run.subsample.clone(),
            total_reads: run.total_reads,
            mapped_reads,
            mapping_rate: round2(safe_percentage(mapped_reads, run.total_reads)),
            breadth_coverage: round2(safe_percentage(depth.covered_bases, depth.total_bases)),
            mean_depth: round2(safe_ratio(depth.total_depth, depth.total_bases)),
            covered_bases: depth.covered_bases,
            total_bases: depth.total_bases,
        }
    }

    /// Render the persisted single-line form
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{}",
            self.sample_id,
            self.sra_accession,
            self.subsample,
            self.total_reads,
            self.mapped_reads,
            format_decimal(self.mapping_rate),
            format_decimal(self.breadth_coverage),
            format_decimal(self.mean_depth),
            self.covered_bases,
            self.total_bases,
        )
    }

    /// Parse the persisted single-line form
    pub fn from_line(line: &str) -> CovconResult<Self> {
        let fields: Vec<&str> = line.trim().split(',').collect();

        if fields.len() != RECORD_FIELD_COUNT {
            return Err(CovconError::MalformedRecord(format!(
                "Expected {} fields, found {}: {}",
                RECORD_FIELD_COUNT,
                fields.len(),
                line.trim()
            )));
        }

        Ok(CoverageRecord {
            sample_id: fields[0].to_string(),
            sra_accession: fields[1].to_string(),
            subsample: fields[2].to_string(),
            total_reads: parse_field(fields[3], "total_reads")?,
            mapped_reads: parse_field(fields[4], "mapped_reads")?,
            mapping_rate: parse_field(fields[5], "mapping_rate")?,
            breadth_coverage: parse_field(fields[6], "breadth_coverage")?,
            mean_depth: parse_field(fields[7], "mean_depth")?,
            covered_bases: parse_field(fields[8], "covered_bases")?,
            total_bases: parse_field(fields[9], "total_bases")?,
        })
    }

    /// Write the record line to `path`, replacing any previous content
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> CovconResult<()> {
        let mut file = File::create(path)?;
        writeln!(file, "{}", self.to_line())?;
        Ok(())
    }

    /// Read a record file written by `write_to`
    pub fn read_from<P: AsRef<Path>>(path: P) -> CovconResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_line(&content)
    }

    /// Human-readable statistics block for the operator
    pub fn format_summary(&self) -> String {
        let mut out = format!("=== COVERAGE STATISTICS for {} ===\n", self.sample_id);
        out.push_str(&format!("Total SRA reads: {}\n", format_count(self.total_reads)));
        out.push_str(&format!("Mapped reads: {}\n", format_count(self.mapped_reads)));
        out.push_str(&format!("Mapping rate: {:.2}%\n", self.mapping_rate));
        out.push_str(&format!("Breadth coverage: {:.2}%\n", self.breadth_coverage));
        out.push_str(&format!("Mean depth: {:.2}x\n", self.mean_depth));
        out.push_str(&format!("Covered bases: {}\n", format_count(self.covered_bases)));
        out.push_str(&format!("Total bases: {}", format_count(self.total_bases)));
        out
    }
}

fn parse_field<T: std::str::FromStr>(value: &str, name: &str) -> CovconResult<T> {
    value.trim().parse::<T>().map_err(|_| {
        CovconError::MalformedRecord(format!("Invalid {} value: {}", name, value))
    })
}

/// Collect both alignment artifacts for `bam_path` and derive its record.
///
/// Any failure of the statistics source aborts the run; nothing is written here.
pub fn extract_coverage<S: AlignmentStats + ?Sized>(
    stats: &S,
    bam_path: &Path,
    run: &RunInfo,
) -> CovconResult<CoverageRecord> {
    let mapped_reads = stats.mapped_reads(bam_path)?;
    log::info!("Mapped reads: {}", mapped_reads);

    let depth = stats.depth_summary(bam_path)?;
    log::info!(
        "Depth stream: {} positions, {} covered",
        depth.total_bases,
        depth.covered_bases
    );

    Ok(CoverageRecord::from_stats(run, mapped_reads, &depth))
}

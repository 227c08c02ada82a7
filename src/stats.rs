//! Alignment statistics sources: mapped-read counts and depth streams for one BAM

use crate::depth::{parse_mapped_reads, DepthSummary};
use crate::utils::open_reader;
use crate::{CovconError, CovconResult};
use rust_htslib::bam::{self, Read};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Produces the two alignment artifacts the coverage extractor consumes
pub trait AlignmentStats {
    /// Number of mapped reads reported for the alignment
    fn mapped_reads(&self, bam_path: &Path) -> CovconResult<u64>;

    /// Aggregated per-position depth over the alignment
    fn depth_summary(&self, bam_path: &Path) -> CovconResult<DepthSummary>;
}

/// Runs `samtools flagstat` and `samtools depth`
#[derive(Debug, Clone)]
pub struct SamtoolsStats {
    pub samtools: PathBuf,
}

impl Default for SamtoolsStats {
    fn default() -> Self {
        Self {
            samtools: PathBuf::from("samtools"),
        }
    }
}

impl SamtoolsStats {
    pub fn new<P: Into<PathBuf>>(samtools: P) -> Self {
        Self {
            samtools: samtools.into(),
        }
    }
}

impl AlignmentStats for SamtoolsStats {
    fn mapped_reads(&self, bam_path: &Path) -> CovconResult<u64> {
        log::info!("Running samtools flagstat on {:?}", bam_path);

        let output = Command::new(&self.samtools)
            .arg("flagstat")
            .arg(bam_path)
            .output()
            .map_err(|e| {
                CovconError::ExternalTool(format!(
                    "Failed to execute samtools flagstat: {}. Is samtools installed?",
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(CovconError::ExternalTool(format!(
                "samtools flagstat exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        if output.stdout.is_empty() {
            return Err(CovconError::ExternalTool(
                "samtools flagstat produced no output".to_string(),
            ));
        }

        parse_mapped_reads(&output.stdout[..])
    }

    fn depth_summary(&self, bam_path: &Path) -> CovconResult<DepthSummary> {
        log::info!("Running samtools depth on {:?}", bam_path);

        let mut child = Command::new(&self.samtools)
            .arg("depth")
            .arg(bam_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                CovconError::ExternalTool(format!(
                    "Failed to execute samtools depth: {}. Is samtools installed?",
                    e
                ))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            CovconError::ExternalTool("Failed to capture samtools depth output".to_string())
        })?;

        // The child must be reaped even when reading its output failed
        let summary = DepthSummary::from_reader(BufReader::new(stdout));
        let status = child.wait()?;

        if !status.success() {
            return Err(CovconError::ExternalTool(format!(
                "samtools depth exited with {}",
                status
            )));
        }

        summary
    }
}

/// Computes flagstat-style mapped counts and depth in-process with htslib
#[derive(Debug, Clone, Default)]
pub struct HtslibStats;

/// Upper bound on reads stacked per pileup column
const MAX_PILEUP_DEPTH: u32 = 1_000_000;

impl AlignmentStats for HtslibStats {
    fn mapped_reads(&self, bam_path: &Path) -> CovconResult<u64> {
        let mut reader = bam::Reader::from_path(bam_path)?;
        let mut mapped = 0u64;

        for record in reader.records() {
            let record = record?;
            // flagstat's first column only counts QC-passed reads
            if !record.is_unmapped() && !record.is_quality_check_failed() {
                mapped += 1;
            }
        }

        Ok(mapped)
    }

    fn depth_summary(&self, bam_path: &Path) -> CovconResult<DepthSummary> {
        let mut reader = bam::Reader::from_path(bam_path)?;
        let mut pileups = reader.pileup();
        pileups.set_max_depth(MAX_PILEUP_DEPTH);

        let mut summary = DepthSummary::new();
        for pileup in pileups {
            let pileup = pileup?;
            let depth = pileup
                .alignments()
                .filter(|a| !a.is_del() && !a.is_refskip())
                .count() as u64;

            // samtools depth omits zero-depth positions unless asked for them
            if depth > 0 {
                summary.observe(depth);
            }
        }

        Ok(summary)
    }
}

/// Reads a previously captured flagstat report and depth table
#[derive(Debug, Clone)]
pub struct PrecomputedStats {
    pub flagstat_report: PathBuf,
    pub depth_table: PathBuf,
}

impl PrecomputedStats {
    pub fn new<P: Into<PathBuf>>(flagstat_report: P, depth_table: P) -> Self {
        Self {
            flagstat_report: flagstat_report.into(),
            depth_table: depth_table.into(),
        }
    }
}

impl AlignmentStats for PrecomputedStats {
    fn mapped_reads(&self, _bam_path: &Path) -> CovconResult<u64> {
        let reader = open_reader(&self.flagstat_report)?;
        parse_mapped_reads(reader)
    }

    fn depth_summary(&self, _bam_path: &Path) -> CovconResult<DepthSummary> {
        let reader = open_reader(&self.depth_table)?;
        DepthSummary::from_reader(reader)
    }
}

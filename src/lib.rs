//! # covcon - Subsampling coverage and variant concordance
//!
//! Summarizes sequencing-depth coverage for aligned reads and measures how
//! closely variant calls made from subsampled read sets agree with the calls
//! made from the full read set.

pub mod concordance;
pub mod coverage;
pub mod depth;
pub mod plots;
pub mod stats;
pub mod summary;
pub mod utils;
pub mod variants;

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Label used for the full, unreduced read set.
pub const ALL_READS_LEVEL: &str = "all";

/// Variants at or below this alternate-allele frequency are ignored by the
/// concordance analysis.
pub const ALT_FREQ_THRESHOLD: f64 = 0.1;

/// A subsampling level: either a read count or the full read set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SubsampleLevel {
    Reads(u64),
    All,
}

impl FromStr for SubsampleLevel {
    type Err = CovconError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == ALL_READS_LEVEL {
            return Ok(SubsampleLevel::All);
        }
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse::<u64>()
                .map(SubsampleLevel::Reads)
                .map_err(|_| CovconError::MalformedRecord(format!("Subsample level out of range: {}", s)));
        }
        Err(CovconError::MalformedRecord(format!(
            "Invalid subsample level: {}",
            s
        )))
    }
}

impl fmt::Display for SubsampleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubsampleLevel::Reads(n) => write!(f, "{}", n),
            SubsampleLevel::All => f.write_str(ALL_READS_LEVEL),
        }
    }
}

/// Coverage summary of one (sample, subsample level) alignment run.
///
/// The subsample label is kept as the raw token so that records round-trip
/// unchanged through the aggregator, whatever the label looks like.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageRecord {
    pub sample_id: String,
    pub sra_accession: String,
    pub subsample: String,
    pub total_reads: u64,
    pub mapped_reads: u64,
    pub mapping_rate: f64,
    pub breadth_coverage: f64,
    pub mean_depth: f64,
    pub covered_bases: u64,
    pub total_bases: u64,
}

/// Identity of a called variant, used as the join key between call sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VariantKey {
    pub region: String,
    pub pos: u64,
    pub ref_allele: String,
    pub alt_allele: String,
}

impl VariantKey {
    pub fn new(region: &str, pos: u64, ref_allele: &str, alt_allele: &str) -> Self {
        Self {
            region: region.to_string(),
            pos,
            ref_allele: ref_allele.to_string(),
            alt_allele: alt_allele.to_string(),
        }
    }
}

/// One row of a variant-call table. An empty ALT_FREQ cell reads as `None`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VariantRecord {
    #[serde(rename = "REGION")]
    pub region: String,
    #[serde(rename = "POS")]
    pub pos: u64,
    #[serde(rename = "REF")]
    pub ref_allele: String,
    #[serde(rename = "ALT")]
    pub alt_allele: String,
    #[serde(rename = "ALT_FREQ")]
    pub alt_freq: Option<f64>,
}

impl VariantRecord {
    pub fn new(region: &str, pos: u64, ref_allele: &str, alt_allele: &str, alt_freq: f64) -> Self {
        Self {
            region: region.to_string(),
            pos,
            ref_allele: ref_allele.to_string(),
            alt_allele: alt_allele.to_string(),
            alt_freq: Some(alt_freq),
        }
    }

    /// True when the alternate-allele frequency is known and above `ALT_FREQ_THRESHOLD`
    pub fn passes_filter(&self) -> bool {
        self.alt_freq.map_or(false, |f| f > ALT_FREQ_THRESHOLD)
    }

    pub fn key(&self) -> VariantKey {
        VariantKey::new(&self.region, self.pos, &self.ref_allele, &self.alt_allele)
    }
}

/// Agreement between one subsampled call set and its reference call set.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcordanceResult {
    pub sample_id: String,
    pub subsample_level: u64,
    pub total_variants_subsample: usize,
    pub filtered_variants_subsample: usize,
    pub total_variants_reference: usize,
    pub filtered_variants_reference: usize,
    pub common_variants: usize,
    pub r2_score: f64,
}

/// Configuration for the variant concordance analysis
#[derive(Debug, Clone)]
pub struct ConcordanceConfig {
    pub file_suffix: String,     // Suffix identifying variant tables
    pub histogram_bins: usize,   // Bins for frequency histograms
    pub output_dir: std::path::PathBuf,
}

impl Default for ConcordanceConfig {
    fn default() -> Self {
        Self {
            file_suffix: "_genome_variants.tsv".to_string(),
            histogram_bins: 30,
            output_dir: std::path::PathBuf::from("output"),
        }
    }
}

/// Error types for the covcon library
#[derive(Debug, thiserror::Error)]
pub enum CovconError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTSlib error: {0}")]
    Htslib(#[from] rust_htslib::errors::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("External tool failed: {0}")]
    ExternalTool(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type CovconResult<T> = Result<T, CovconError>;

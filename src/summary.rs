//! Coverage aggregation: groups per-run coverage records into one table per
//! SRA accession, ordered by subsample level

use crate::utils::{mean, validate_dir_exists};
use crate::{CovconResult, CoverageRecord, ALL_READS_LEVEL};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// One row of a persisted accession table
#[derive(Debug, Serialize)]
struct AccessionRow<'a> {
    subsample: &'a str,
    total_reads: u64,
    mapped_reads: u64,
    mapping_rate: f64,
    breadth_coverage: f64,
    mean_depth: f64,
    covered_bases: u64,
    total_bases: u64,
}

impl<'a> From<&'a CoverageRecord> for AccessionRow<'a> {
    fn from(record: &'a CoverageRecord) -> Self {
        Self {
            subsample: &record.subsample,
            total_reads: record.total_reads,
            mapped_reads: record.mapped_reads,
            mapping_rate: record.mapping_rate,
            breadth_coverage: record.breadth_coverage,
            mean_depth: record.mean_depth,
            covered_bases: record.covered_bases,
            total_bases: record.total_bases,
        }
    }
}

/// Sort key for subsample labels: numeric labels ascend, `all` sorts last.
///
/// Any other label sorts as level 0.
pub fn subsample_sort_key(label: &str) -> (bool, i128) {
    if label == ALL_READS_LEVEL {
        return (true, 0);
    }
    (false, label.trim().parse::<i128>().unwrap_or(0))
}

/// Descriptive statistics over one accession table
#[derive(Debug, Clone, PartialEq)]
pub struct TableRollup {
    pub mean_mapping_rate: f64,
    pub mean_breadth_coverage: f64,
    pub min_mean_depth: f64,
    pub max_mean_depth: f64,
}

/// Coverage records sharing one SRA accession
#[derive(Debug, Clone, PartialEq)]
pub struct AccessionTable {
    pub sra_accession: String,
    pub rows: Vec<CoverageRecord>,
}

impl AccessionTable {
    /// Build a table, enforcing one row per (sample, subsample) and the row order
    pub fn new(sra_accession: &str, records: Vec<CoverageRecord>) -> Self {
        let mut rows: Vec<CoverageRecord> = Vec::with_capacity(records.len());

        for record in records {
            if let Some(existing) = rows
                .iter_mut()
                .find(|r| r.sample_id == record.sample_id && r.subsample == record.subsample)
            {
                log::warn!(
                    "Duplicate record for {} subsample {} in {}, keeping the later one",
                    record.sample_id,
                    record.subsample,
                    sra_accession
                );
                *existing = record;
            } else {
                rows.push(record);
            }
        }

        rows.sort_by_key(|r| subsample_sort_key(&r.subsample));

        Self {
            sra_accession: sra_accession.to_string(),
            rows,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}_coverage_stats.csv", self.sra_accession)
    }

    pub fn subsamples(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.subsample.as_str()).collect()
    }

    /// Write the table into `output_dir`, which must already exist
    pub fn write_csv<P: AsRef<Path>>(&self, output_dir: P) -> CovconResult<PathBuf> {
        let path = output_dir.as_ref().join(self.file_name());
        let mut writer = csv::Writer::from_path(&path)?;

        for record in &self.rows {
            writer.serialize(AccessionRow::from(record))?;
        }
        writer.flush()?;

        Ok(path)
    }

    pub fn rollup(&self) -> Option<TableRollup> {
        let mapping_rates: Vec<f64> = self.rows.iter().map(|r| r.mapping_rate).collect();
        let breadths: Vec<f64> = self.rows.iter().map(|r| r.breadth_coverage).collect();
        let depths = self.rows.iter().map(|r| r.mean_depth);

        Some(TableRollup {
            mean_mapping_rate: mean(&mapping_rates)?,
            mean_breadth_coverage: mean(&breadths)?,
            min_mean_depth: depths.clone().fold(f64::INFINITY, f64::min),
            max_mean_depth: depths.fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

/// Load coverage record files, skipping missing or malformed ones
pub fn load_records(paths: &[PathBuf]) -> Vec<CoverageRecord> {
    let mut records = Vec::new();

    for path in paths {
        if !path.exists() {
            log::warn!("Stats file {:?} does not exist, skipping", path);
            continue;
        }

        match CoverageRecord::read_from(path) {
            Ok(record) => {
                log::info!(
                    "Loaded: {} (SRA: {}, Subsample: {})",
                    record.sample_id,
                    record.sra_accession,
                    record.subsample
                );
                records.push(record);
            }
            Err(e) => {
                log::error!("Invalid format in {:?}: {}", path, e);
            }
        }
    }

    records
}

/// Group records by accession; tables appear in first-seen accession order
pub fn group_by_accession(records: Vec<CoverageRecord>) -> Vec<AccessionTable> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<CoverageRecord>> = HashMap::new();

    for record in records {
        if !groups.contains_key(&record.sra_accession) {
            order.push(record.sra_accession.clone());
        }
        groups
            .entry(record.sra_accession.clone())
            .or_default()
            .push(record);
    }

    order
        .into_iter()
        .filter_map(|acc| {
            let rows = groups.remove(&acc)?;
            Some(AccessionTable::new(&acc, rows))
        })
        .collect()
}

/// Outcome of one aggregation batch
#[derive(Debug, Default)]
pub struct AggregationReport {
    pub records_loaded: usize,
    pub tables: Vec<(AccessionTable, PathBuf)>,
}

/// Load, group and persist. With no valid records nothing is written.
pub fn summarize_coverage<P: AsRef<Path>>(
    stats_files: &[PathBuf],
    output_dir: P,
) -> CovconResult<AggregationReport> {
    let records = load_records(stats_files);
    let records_loaded = records.len();

    if records.is_empty() {
        log::warn!("No data loaded");
        return Ok(AggregationReport::default());
    }

    validate_dir_exists(&output_dir)?;

    let tables = group_by_accession(records);
    log::info!("Grouped into {} SRA accessions", tables.len());

    let mut written = Vec::with_capacity(tables.len());
    for table in tables {
        let path = table.write_csv(&output_dir)?;
        log::info!("Saved {} rows to {:?}", table.rows.len(), path);
        written.push((table, path));
    }

    Ok(AggregationReport {
        records_loaded,
        tables: written,
    })
}

//! Variant concordance between subsampled call sets and the full-read-set
//! reference of each sample

use crate::plots::{LevelPlotData, PlotSink};
use crate::utils::mean;
use crate::variants::{join_on_identity, read_variant_table, FrequencyPair, SampleFiles, VariantTable};
use crate::{
    ConcordanceConfig, ConcordanceResult, CovconError, CovconResult, ALT_FREQ_THRESHOLD,
};
use anyhow::Context;
use std::path::Path;

/// Coefficient of determination of the subsample frequencies (observed)
/// predicted by the reference frequencies.
///
/// Returns `None` for fewer than two pairs. When the observed series has no
/// variance the score is 1.0 for an exact match and 0.0 otherwise.
pub fn r2_score(pairs: &[FrequencyPair]) -> Option<f64> {
    if pairs.len() < 2 {
        return None;
    }

    let ss_res: f64 = pairs.iter().map(|(obs, pred)| (obs - pred).powi(2)).sum();

    // Compare values directly: the mean of a constant series can be inexact
    let first = pairs[0].0;
    if pairs.iter().all(|(obs, _)| *obs == first) {
        return Some(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }

    let n = pairs.len() as f64;
    let observed_mean = pairs.iter().map(|(obs, _)| obs).sum::<f64>() / n;
    let ss_tot: f64 = pairs.iter().map(|(obs, _)| (obs - observed_mean).powi(2)).sum();

    Some(1.0 - ss_res / ss_tot)
}

/// Validate concordance configuration parameters
pub fn validate_concordance_config(config: &ConcordanceConfig) -> CovconResult<()> {
    if config.histogram_bins == 0 {
        return Err(CovconError::InvalidConfig(
            "histogram_bins must be at least 1".to_string(),
        ));
    }

    if config.file_suffix.is_empty() {
        return Err(CovconError::InvalidConfig(
            "file_suffix must not be empty".to_string(),
        ));
    }

    Ok(())
}

/// What happened to one subsample level of a sample
#[derive(Debug, Clone, PartialEq)]
pub enum LevelOutcome {
    Scored(ConcordanceResult),
    /// No subsample variant passed the frequency filter
    NoFilteredVariants { level: u64, total_variants: usize },
    /// One or zero common variants, nothing to score
    InsufficientData { level: u64, common_variants: usize },
    Failed { level: u64, message: String },
}

impl LevelOutcome {
    pub fn level(&self) -> u64 {
        match self {
            LevelOutcome::Scored(result) => result.subsample_level,
            LevelOutcome::NoFilteredVariants { level, .. }
            | LevelOutcome::InsufficientData { level, .. }
            | LevelOutcome::Failed { level, .. } => *level,
        }
    }
}

/// Why a whole sample was not analyzed
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoReference,
    ReferenceUnreadable(String),
    EmptyReference,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoReference => f.write_str("no 'all' reference file found"),
            SkipReason::ReferenceUnreadable(msg) => write!(f, "reference unreadable: {}", msg),
            SkipReason::EmptyReference => write!(
                f,
                "no reference variants with ALT_FREQ > {}",
                ALT_FREQ_THRESHOLD
            ),
        }
    }
}

/// Per-level outcomes for one sample
#[derive(Debug, Clone, PartialEq)]
pub struct SampleReport {
    pub sample_id: String,
    pub total_variants_reference: usize,
    pub filtered_variants_reference: usize,
    pub outcomes: Vec<LevelOutcome>,
}

impl SampleReport {
    pub fn results(&self) -> Vec<&ConcordanceResult> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                LevelOutcome::Scored(result) => Some(result),
                _ => None,
            })
            .collect()
    }

    /// Mean R² over the scored levels
    pub fn mean_r2(&self) -> Option<f64> {
        let scores: Vec<f64> = self.results().iter().map(|r| r.r2_score).collect();
        mean(&scores)
    }

    /// Operator summary, `None` when no level could be scored
    pub fn format_summary(&self) -> Option<String> {
        let results = self.results();
        if results.is_empty() {
            return None;
        }

        let mut out = format!("SUMMARY FOR {}:\n", self.sample_id);
        out.push_str(&format!(
            "Reference variants (ALT_FREQ > {}): {}\n",
            ALT_FREQ_THRESHOLD, self.filtered_variants_reference
        ));
        for result in &results {
            out.push_str(&format!(
                "  {} reads: R² = {:.4}, Common variants = {}\n",
                result.subsample_level, result.r2_score, result.common_variants
            ));
        }
        if let Some(mean_r2) = self.mean_r2() {
            out.push_str(&format!("  Mean R² score: {:.4}", mean_r2));
        }
        Some(out)
    }
}

/// Analysis result of one sample
#[derive(Debug, Clone, PartialEq)]
pub enum SampleAnalysis {
    Analyzed(SampleReport),
    Skipped { sample_id: String, reason: SkipReason },
}

/// Filtered reference call set of a sample
struct Reference {
    total: usize,
    filtered: VariantTable,
}

fn score_level(
    sample_id: &str,
    level: u64,
    label: &str,
    path: &Path,
    reference: &Reference,
    sink: &mut dyn PlotSink,
) -> anyhow::Result<LevelOutcome> {
    let table = read_variant_table(path)
        .with_context(|| format!("Error processing {}", path.display()))?;
    let filtered = table.filtered();
    log::info!(
        "  Subsample data: {} total variants, {} with ALT_FREQ > {}",
        table.len(),
        filtered.len(),
        ALT_FREQ_THRESHOLD
    );

    if filtered.is_empty() {
        return Ok(LevelOutcome::NoFilteredVariants {
            level,
            total_variants: table.len(),
        });
    }

    let matched = join_on_identity(&filtered, &reference.filtered);
    log::info!("  Merged: {} common variants", matched.len());

    let r2 = match r2_score(&matched) {
        Some(r2) => r2,
        None => {
            log::info!("  Not enough common variants for analysis");
            return Ok(LevelOutcome::InsufficientData {
                level,
                common_variants: matched.len(),
            });
        }
    };
    log::info!("  R² score: {:.4}", r2);

    let subsample_frequencies = filtered.frequencies();
    let reference_frequencies = reference.filtered.frequencies();
    sink.plot_level(&LevelPlotData {
        sample_id,
        level,
        label,
        r2_score: r2,
        matched: &matched,
        subsample_frequencies: &subsample_frequencies,
        reference_frequencies: &reference_frequencies,
    })
    .with_context(|| format!("Error processing {}", path.display()))?;

    Ok(LevelOutcome::Scored(ConcordanceResult {
        sample_id: sample_id.to_string(),
        subsample_level: level,
        total_variants_subsample: table.len(),
        filtered_variants_subsample: filtered.len(),
        total_variants_reference: reference.total,
        filtered_variants_reference: reference.filtered.len(),
        common_variants: matched.len(),
        r2_score: r2,
    }))
}

/// Score every numeric subsample level of a sample against its reference.
///
/// Levels are processed in ascending order; a failing level does not stop the others.
pub fn analyze_sample(sample: &SampleFiles, sink: &mut dyn PlotSink) -> SampleAnalysis {
    let skipped = |reason: SkipReason| SampleAnalysis::Skipped {
        sample_id: sample.sample_id.clone(),
        reason,
    };

    let reference_path = match sample.reference() {
        Some(path) => path,
        None => return skipped(SkipReason::NoReference),
    };

    let reference_table = match read_variant_table(reference_path) {
        Ok(table) => table,
        Err(e) => {
            return skipped(SkipReason::ReferenceUnreadable(format!(
                "{}: {}",
                reference_path.display(),
                e
            )))
        }
    };

    let reference = Reference {
        total: reference_table.len(),
        filtered: reference_table.filtered(),
    };
    log::info!(
        "Reference data: {} total variants, {} with ALT_FREQ > {}",
        reference.total,
        reference.filtered.len(),
        ALT_FREQ_THRESHOLD
    );

    if reference.filtered.is_empty() {
        return skipped(SkipReason::EmptyReference);
    }

    let mut outcomes = Vec::new();
    for (level, label, path) in sample.numeric_levels() {
        log::info!("Processing {} reads...", label);

        let outcome = score_level(&sample.sample_id, level, label, path, &reference, sink)
            .unwrap_or_else(|e| {
                log::error!("{:#}", e);
                LevelOutcome::Failed {
                    level,
                    message: format!("{:#}", e),
                }
            });
        outcomes.push(outcome);
    }

    SampleAnalysis::Analyzed(SampleReport {
        sample_id: sample.sample_id.clone(),
        total_variants_reference: reference.total,
        filtered_variants_reference: reference.filtered.len(),
        outcomes,
    })
}

/// Analyze each sample in turn
pub fn analyze_samples(samples: &[SampleFiles], sink: &mut dyn PlotSink) -> Vec<SampleAnalysis> {
    samples
        .iter()
        .map(|sample| {
            log::info!("=== Processing {} ===", sample.sample_id);
            analyze_sample(sample, sink)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingSink {
        levels: Vec<(String, u64, usize)>,
        fail: bool,
    }

    impl PlotSink for RecordingSink {
        fn plot_level(&mut self, data: &LevelPlotData) -> CovconResult<()> {
            if self.fail {
                return Err(CovconError::InvalidConfig("plotting disabled".to_string()));
            }
            self.levels
                .push((data.sample_id.to_string(), data.level, data.matched.len()));
            Ok(())
        }
    }

    fn write_table(dir: &Path, name: &str, rows: &[(&str, u64, &str, &str, f64)]) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "REGION\tPOS\tREF\tALT\tALT_FREQ").unwrap();
        for (region, pos, r, a, freq) in rows {
            writeln!(file, "{}\t{}\t{}\t{}\t{}", region, pos, r, a, freq).unwrap();
        }
        path
    }

    fn sample(levels: &[(&str, PathBuf)]) -> SampleFiles {
        SampleFiles {
            sample_id: "s1".to_string(),
            levels: levels
                .iter()
                .map(|(l, p)| (l.to_string(), p.clone()))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_validate_concordance_config() {
        let config = ConcordanceConfig::default();
        assert!(validate_concordance_config(&config).is_ok());

        let invalid = ConcordanceConfig {
            histogram_bins: 0,
            ..ConcordanceConfig::default()
        };
        assert!(validate_concordance_config(&invalid).is_err());

        let invalid = ConcordanceConfig {
            file_suffix: String::new(),
            ..ConcordanceConfig::default()
        };
        assert!(validate_concordance_config(&invalid).is_err());
    }

    #[test]
    fn test_r2_perfect_agreement() {
        let r2 = r2_score(&[(0.5, 0.5), (0.6, 0.6), (0.7, 0.7)]).unwrap();
        assert!((r2 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_r2_known_value() {
        // observed mean 0.5, ss_tot = 0.08, ss_res = 0.02
        let r2 = r2_score(&[(0.3, 0.4), (0.5, 0.5), (0.7, 0.6)]).unwrap();
        assert!((r2 - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_r2_degenerate_inputs() {
        assert_eq!(r2_score(&[]), None);
        assert_eq!(r2_score(&[(0.5, 0.5)]), None);

        // Constant observed series
        assert_eq!(r2_score(&[(0.5, 0.5), (0.5, 0.5)]), Some(1.0));
        assert_eq!(r2_score(&[(0.5, 0.4), (0.5, 0.6)]), Some(0.0));
        assert_eq!(r2_score(&[(0.7, 0.5), (0.7, 0.6), (0.7, 0.7)]), Some(0.0));
        assert_eq!(r2_score(&[(0.7, 0.7), (0.7, 0.7), (0.7, 0.7)]), Some(1.0));

        // Constant reference series
        let r2 = r2_score(&[(0.4, 0.5), (0.6, 0.5)]).unwrap();
        assert!(r2.is_finite());
        assert!((r2 - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_analyze_sample_scores_levels_in_order() {
        let dir = TempDir::new().unwrap();
        let reference = write_table(
            dir.path(),
            "s1_all_genome_variants.tsv",
            &[
                ("chr1", 100, "A", "T", 0.5),
                ("chr1", 200, "C", "G", 0.6),
                ("chr1", 300, "G", "A", 0.7),
                ("chr1", 400, "T", "C", 0.05),
            ],
        );
        let level_1000 = write_table(
            dir.path(),
            "s1_1000_genome_variants.tsv",
            &[
                ("chr1", 100, "A", "T", 0.5),
                ("chr1", 200, "C", "G", 0.6),
                ("chr1", 300, "G", "A", 0.7),
            ],
        );
        let level_50 = write_table(
            dir.path(),
            "s1_50_genome_variants.tsv",
            &[("chr1", 100, "A", "T", 0.4), ("chr1", 999, "A", "T", 0.6)],
        );

        let files = sample(&[("all", reference), ("1000", level_1000), ("50", level_50)]);
        let mut sink = RecordingSink::default();

        let report = match analyze_sample(&files, &mut sink) {
            SampleAnalysis::Analyzed(report) => report,
            other => panic!("Expected analyzed sample, got {:?}", other),
        };

        assert_eq!(report.total_variants_reference, 4);
        assert_eq!(report.filtered_variants_reference, 3);
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.outcomes[0], LevelOutcome::InsufficientData { level: 50, common_variants: 1 });

        let results = report.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].subsample_level, 1000);
        assert_eq!(results[0].common_variants, 3);
        assert_eq!(results[0].filtered_variants_subsample, 3);
        assert!((results[0].r2_score - 1.0).abs() < 1e-12);
        assert!((report.mean_r2().unwrap() - 1.0).abs() < 1e-12);

        assert_eq!(sink.levels, vec![("s1".to_string(), 1000, 3)]);

        let summary = report.format_summary().unwrap();
        assert!(summary.contains("SUMMARY FOR s1:"));
        assert!(summary.contains("1000 reads: R² = 1.0000, Common variants = 3"));
        assert!(summary.contains("Mean R² score: 1.0000"));
    }

    #[test]
    fn test_analyze_sample_without_reference() {
        let dir = TempDir::new().unwrap();
        let level = write_table(dir.path(), "s1_100_genome_variants.tsv", &[("chr1", 1, "A", "T", 0.5)]);

        let analysis = analyze_sample(&sample(&[("100", level)]), &mut RecordingSink::default());
        assert_eq!(
            analysis,
            SampleAnalysis::Skipped {
                sample_id: "s1".to_string(),
                reason: SkipReason::NoReference
            }
        );
    }

    #[test]
    fn test_analyze_sample_empty_reference() {
        let dir = TempDir::new().unwrap();
        let reference = write_table(dir.path(), "s1_all_genome_variants.tsv", &[("chr1", 1, "A", "T", 0.1)]);

        let analysis = analyze_sample(&sample(&[("all", reference)]), &mut RecordingSink::default());
        assert!(matches!(
            analysis,
            SampleAnalysis::Skipped { reason: SkipReason::EmptyReference, .. }
        ));
    }

    #[test]
    fn test_analyze_sample_isolates_failures() {
        let dir = TempDir::new().unwrap();
        let reference = write_table(
            dir.path(),
            "s1_all_genome_variants.tsv",
            &[("chr1", 1, "A", "T", 0.5), ("chr1", 2, "A", "T", 0.6)],
        );
        let broken = dir.path().join("s1_10_genome_variants.tsv");
        std::fs::write(&broken, "REGION\tPOS\tREF\tALT\tALT_FREQ\nchr1\tx\tA\tT\t0.5\n").unwrap();
        let empty = write_table(dir.path(), "s1_20_genome_variants.tsv", &[("chr1", 1, "A", "T", 0.01)]);
        let good = write_table(
            dir.path(),
            "s1_30_genome_variants.tsv",
            &[("chr1", 1, "A", "T", 0.4), ("chr1", 2, "A", "T", 0.7)],
        );

        let files = sample(&[("all", reference), ("10", broken), ("20", empty), ("30", good)]);
        let report = match analyze_sample(&files, &mut RecordingSink::default()) {
            SampleAnalysis::Analyzed(report) => report,
            other => panic!("Expected analyzed sample, got {:?}", other),
        };

        let levels: Vec<u64> = report.outcomes.iter().map(|o| o.level()).collect();
        assert_eq!(levels, vec![10, 20, 30]);
        assert!(matches!(&report.outcomes[0], LevelOutcome::Failed { message, .. } if message.contains("Error processing")));
        assert_eq!(report.outcomes[1], LevelOutcome::NoFilteredVariants { level: 20, total_variants: 1 });
        assert!(matches!(report.outcomes[2], LevelOutcome::Scored(_)));
    }

    #[test]
    fn test_analyze_samples_writes_series() {
        use crate::plots::SeriesPlotWriter;
        use crate::variants::{find_variant_files, group_by_sample};

        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        let rows = [("chr1", 1, "A", "T", 0.3), ("chr1", 2, "A", "T", 0.8)];
        write_table(input.path(), "s1_all_genome_variants.tsv", &rows);
        write_table(input.path(), "s1_500_genome_variants.tsv", &rows);
        write_table(input.path(), "s2_500_genome_variants.tsv", &rows);

        let config = ConcordanceConfig::default();
        let files = find_variant_files(input.path(), &config.file_suffix).unwrap();
        let samples = group_by_sample(&files, &config.file_suffix);
        let mut sink = SeriesPlotWriter::new(output.path(), config.histogram_bins);

        let analyses = analyze_samples(&samples, &mut sink);
        assert_eq!(analyses.len(), 2);
        assert!(matches!(
            analyses.iter().find(|a| matches!(a, SampleAnalysis::Skipped { .. })),
            Some(SampleAnalysis::Skipped { reason: SkipReason::NoReference, .. })
        ));

        let sample_dir = output.path().join("s1");
        for name in ["scatter_500.tsv", "bar_500.tsv", "hist_500.tsv"] {
            assert!(sample_dir.join(name).exists(), "missing {}", name);
        }
        assert!(!output.path().join("s2").exists());
    }

    #[test]
    fn test_plot_failure_marks_level_failed() {
        let dir = TempDir::new().unwrap();
        let reference = write_table(
            dir.path(),
            "s1_all_genome_variants.tsv",
            &[("chr1", 1, "A", "T", 0.5), ("chr1", 2, "A", "T", 0.6)],
        );
        let level = write_table(
            dir.path(),
            "s1_30_genome_variants.tsv",
            &[("chr1", 1, "A", "T", 0.5), ("chr1", 2, "A", "T", 0.6)],
        );

        let mut sink = RecordingSink {
            fail: true,
            ..Default::default()
        };
        let analysis = analyze_sample(&sample(&[("all", reference), ("30", level)]), &mut sink);

        match analysis {
            SampleAnalysis::Analyzed(report) => {
                assert!(matches!(report.outcomes[0], LevelOutcome::Failed { level: 30, .. }));
                assert_eq!(report.mean_r2(), None);
                assert!(report.format_summary().is_none());
            }
            other => panic!("Expected analyzed sample, got {:?}", other),
        }
    }
}

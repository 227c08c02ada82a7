//! Plot artifacts for the concordance analysis.
//!
//! Figures are emitted as the tab-separated series they are drawn from, one
//! file per figure, so any plotting front end can render them.

use crate::variants::FrequencyPair;
use crate::CovconResult;
use std::path::{Path, PathBuf};

/// Series backing the three figures of one subsample level
#[derive(Debug, Clone)]
pub struct LevelPlotData<'a> {
    pub sample_id: &'a str,
    pub level: u64,
    /// Level token as written in the file name, used to name the artifacts
    pub label: &'a str,
    pub r2_score: f64,
    pub matched: &'a [FrequencyPair],
    pub subsample_frequencies: &'a [f64],
    pub reference_frequencies: &'a [f64],
}

/// Consumer of computed concordance series
pub trait PlotSink {
    fn plot_level(&mut self, data: &LevelPlotData) -> CovconResult<()>;
}

/// Counts of `values` in `bins` equal-width bins over [0, 1].
/// Out-of-range values land in the first or last bin.
pub fn histogram(values: &[f64], bins: usize) -> Vec<usize> {
    let mut counts = vec![0usize; bins];
    if bins == 0 {
        return counts;
    }

    for &v in values {
        let idx = (v * bins as f64).floor();
        let idx = if idx.is_nan() || idx < 0.0 {
            0
        } else {
            (idx as usize).min(bins - 1)
        };
        counts[idx] += 1;
    }

    counts
}

/// Writes `scatter_<label>.tsv`, `bar_<label>.tsv` and `hist_<label>.tsv`
/// under `<output_dir>/<sample_id>/`
#[derive(Debug, Clone)]
pub struct SeriesPlotWriter {
    output_dir: PathBuf,
    histogram_bins: usize,
}

impl SeriesPlotWriter {
    pub fn new<P: Into<PathBuf>>(output_dir: P, histogram_bins: usize) -> Self {
        Self {
            output_dir: output_dir.into(),
            histogram_bins,
        }
    }

    pub fn sample_dir(&self, sample_id: &str) -> PathBuf {
        self.output_dir.join(sample_id)
    }

    fn tsv_writer(path: &Path) -> CovconResult<csv::Writer<std::fs::File>> {
        Ok(csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?)
    }

    fn write_scatter(&self, dir: &Path, data: &LevelPlotData) -> CovconResult<()> {
        let mut writer = Self::tsv_writer(&dir.join(format!("scatter_{}.tsv", data.label)))?;
        writer.write_record([format!("ALT_FREQ_{}", data.label), "ALT_FREQ_all".to_string()])?;
        for (sub, reference) in data.matched {
            writer.write_record([sub.to_string(), reference.to_string()])?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_bar(&self, dir: &Path, data: &LevelPlotData) -> CovconResult<()> {
        let mut writer = Self::tsv_writer(&dir.join(format!("bar_{}.tsv", data.label)))?;
        writer.write_record(["label", "variants"])?;
        writer.write_record([
            format!("{} reads", data.label),
            data.subsample_frequencies.len().to_string(),
        ])?;
        writer.write_record([
            "All reads".to_string(),
            data.reference_frequencies.len().to_string(),
        ])?;
        writer.flush()?;
        Ok(())
    }

    fn write_histogram(&self, dir: &Path, data: &LevelPlotData) -> CovconResult<()> {
        let bins = self.histogram_bins;
        let sub_counts = histogram(data.subsample_frequencies, bins);
        let ref_counts = histogram(data.reference_frequencies, bins);

        let mut writer = Self::tsv_writer(&dir.join(format!("hist_{}.tsv", data.label)))?;
        writer.write_record(["bin_start", "bin_end", "subsample", "reference"])?;
        for i in 0..bins {
            writer.write_record([
                format!("{:.4}", i as f64 / bins as f64),
                format!("{:.4}", (i + 1) as f64 / bins as f64),
                sub_counts[i].to_string(),
                ref_counts[i].to_string(),
            ])?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl PlotSink for SeriesPlotWriter {
    fn plot_level(&mut self, data: &LevelPlotData) -> CovconResult<()> {
        let dir = self.sample_dir(data.sample_id);
        std::fs::create_dir_all(&dir)?;

        self.write_scatter(&dir, data)?;
        self.write_bar(&dir, data)?;
        self.write_histogram(&dir, data)?;

        log::debug!(
            "Wrote plot series for {} level {} (R² = {:.4}) to {:?}",
            data.sample_id,
            data.label,
            data.r2_score,
            dir
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_histogram() {
        let counts = histogram(&[0.0, 0.05, 0.15, 0.99, 1.0, 1.5, -0.2], 10);
        assert_eq!(counts.len(), 10);
        assert_eq!(counts[0], 3);
        assert_eq!(counts[1], 1);
        assert_eq!(counts[9], 3);
        assert_eq!(counts.iter().sum::<usize>(), 7);

        assert!(histogram(&[0.5], 0).is_empty());
    }

    #[test]
    fn test_series_plot_writer() {
        let dir = TempDir::new().unwrap();
        let mut writer = SeriesPlotWriter::new(dir.path(), 4);

        let matched = vec![(0.4, 0.5), (0.6, 0.7)];
        let sub = vec![0.4, 0.6, 0.9];
        let reference = vec![0.5, 0.7];
        let data = LevelPlotData {
            sample_id: "s1",
            level: 1000,
            label: "1000",
            r2_score: 0.5,
            matched: &matched,
            subsample_frequencies: &sub,
            reference_frequencies: &reference,
        };
        writer.plot_level(&data).unwrap();

        let sample_dir = dir.path().join("s1");
        let scatter = std::fs::read_to_string(sample_dir.join("scatter_1000.tsv")).unwrap();
        assert_eq!(scatter, "ALT_FREQ_1000\tALT_FREQ_all\n0.4\t0.5\n0.6\t0.7\n");

        let bar = std::fs::read_to_string(sample_dir.join("bar_1000.tsv")).unwrap();
        assert_eq!(bar, "label\tvariants\n1000 reads\t3\nAll reads\t2\n");

        let hist = std::fs::read_to_string(sample_dir.join("hist_1000.tsv")).unwrap();
        let lines: Vec<&str> = hist.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[2], "0.2500\t0.5000\t1\t0");
        assert_eq!(lines[3], "0.5000\t0.7500\t1\t2");
        assert_eq!(lines[4], "0.7500\t1.0000\t1\t0");
    }

    #[test]
    fn test_series_named_by_level_token() {
        let dir = TempDir::new().unwrap();
        let mut writer = SeriesPlotWriter::new(dir.path(), 2);

        let matched = vec![(0.4, 0.5), (0.6, 0.7)];
        let freqs = vec![0.4, 0.6];
        for label in ["7", "007"] {
            let data = LevelPlotData {
                sample_id: "s1",
                level: 7,
                label,
                r2_score: 0.5,
                matched: &matched,
                subsample_frequencies: &freqs,
                reference_frequencies: &freqs,
            };
            writer.plot_level(&data).unwrap();
        }

        let sample_dir = dir.path().join("s1");
        for name in ["scatter_7.tsv", "scatter_007.tsv", "bar_7.tsv", "bar_007.tsv", "hist_7.tsv", "hist_007.tsv"] {
            assert!(sample_dir.join(name).exists(), "missing {}", name);
        }
        let bar = std::fs::read_to_string(sample_dir.join("bar_007.tsv")).unwrap();
        assert!(bar.contains("007 reads\t2"));
    }
}

//! Variant table handling: loading, frequency filtering, identity joins and
//! sample/subsample inference from file names

use crate::utils::open_reader;
use crate::{CovconResult, SubsampleLevel, VariantKey, VariantRecord, ALL_READS_LEVEL};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Sample identifier used when a file name carries no subsample token
pub const UNKNOWN_SAMPLE: &str = "unknown";

/// A loaded variant-call table
#[derive(Debug, Clone, Default)]
pub struct VariantTable {
    pub records: Vec<VariantRecord>,
}

impl VariantTable {
    pub fn new(records: Vec<VariantRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows whose alternate-allele frequency exceeds `ALT_FREQ_THRESHOLD`
    pub fn filtered(&self) -> VariantTable {
        VariantTable::new(
            self.records
                .iter()
                .filter(|r| r.passes_filter())
                .cloned()
                .collect(),
        )
    }

    /// Known alternate-allele frequencies, in row order
    pub fn frequencies(&self) -> Vec<f64> {
        self.records.iter().filter_map(|r| r.alt_freq).collect()
    }
}

/// Read a tab-separated variant table with at least REGION, POS, REF, ALT and
/// ALT_FREQ columns. Other columns are ignored; an empty ALT_FREQ is kept as
/// an unknown frequency that never passes the filter.
pub fn read_variant_table<P: AsRef<Path>>(path: P) -> CovconResult<VariantTable> {
    let reader = open_reader(&path)?;
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .from_reader(reader);

    let mut records = Vec::new();
    for result in csv_reader.deserialize() {
        let record: VariantRecord = result?;
        records.push(record);
    }

    Ok(VariantTable::new(records))
}

/// A pair of matched frequencies: (subsample, reference)
pub type FrequencyPair = (f64, f64);

/// Inner join of `subsample` against `reference` on variant identity.
///
/// Duplicate identities on either side produce every combination. Output
/// follows subsample row order, then reference row order. Rows without a
/// known frequency take no part.
pub fn join_on_identity(subsample: &VariantTable, reference: &VariantTable) -> Vec<FrequencyPair> {
    let mut index: HashMap<VariantKey, Vec<f64>> = HashMap::new();
    for record in &reference.records {
        if let Some(freq) = record.alt_freq {
            index.entry(record.key()).or_default().push(freq);
        }
    }

    let mut matched = Vec::new();
    for record in &subsample.records {
        let freq = match record.alt_freq {
            Some(freq) => freq,
            None => continue,
        };
        if let Some(ref_freqs) = index.get(&record.key()) {
            matched.extend(ref_freqs.iter().map(|&f| (freq, f)));
        }
    }

    matched
}

/// Infer (sample id, subsample level) from a variant table file name.
///
/// After removing `suffix`, the name is split on `_`; the first token that is
/// all digits or exactly `all` is the level and the tokens before it form the
/// sample id. Without such a token the sample is `unknown` and the level absent.
pub fn infer_sample_level(file_name: &str, suffix: &str) -> (String, Option<String>) {
    let stem = file_name.replace(suffix, "");
    let parts: Vec<&str> = stem.split('_').collect();

    for (i, part) in parts.iter().enumerate() {
        if is_level_token(part) {
            let sample_id = if i == 0 {
                UNKNOWN_SAMPLE.to_string()
            } else {
                parts[..i].join("_")
            };
            return (sample_id, Some(part.to_string()));
        }
    }

    (UNKNOWN_SAMPLE.to_string(), None)
}

fn is_level_token(token: &str) -> bool {
    token == ALL_READS_LEVEL || (!token.is_empty() && token.chars().all(|c| c.is_ascii_digit()))
}

/// Find variant tables directly in `dir` and in its immediate subdirectories
pub fn find_variant_files<P: AsRef<Path>>(dir: P, suffix: &str) -> CovconResult<Vec<PathBuf>> {
    let mut files = matching_files(dir.as_ref(), suffix)?;

    let mut subdirs: Vec<PathBuf> = std::fs::read_dir(dir.as_ref())?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    subdirs.sort();

    for subdir in subdirs {
        files.extend(matching_files(&subdir, suffix)?);
    }

    Ok(files)
}

fn matching_files(dir: &Path, suffix: &str) -> CovconResult<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(suffix))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Variant tables of one sample keyed by subsample level token
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleFiles {
    pub sample_id: String,
    pub levels: HashMap<String, PathBuf>,
}

impl SampleFiles {
    pub fn reference(&self) -> Option<&PathBuf> {
        self.levels.get(ALL_READS_LEVEL)
    }

    /// Numeric subsample levels in ascending order, with their raw tokens.
    ///
    /// Tokens such as `007` and `7` share a read count but stay separate levels.
    pub fn numeric_levels(&self) -> Vec<(u64, &str, &PathBuf)> {
        let mut levels: Vec<(u64, &str, &PathBuf)> = self
            .levels
            .iter()
            .filter_map(|(token, path)| match token.parse::<SubsampleLevel>() {
                Ok(SubsampleLevel::Reads(n)) => Some((n, token.as_str(), path)),
                Ok(SubsampleLevel::All) => None,
                Err(e) => {
                    log::warn!("{}, ignoring {:?}", e, path);
                    None
                }
            })
            .collect();
        levels.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        for pair in levels.windows(2) {
            if pair[0].0 == pair[1].0 {
                log::warn!(
                    "{} level tokens {} and {} both mean {} reads",
                    self.sample_id,
                    pair[0].1,
                    pair[1].1,
                    pair[0].0
                );
            }
        }

        levels
    }
}

/// Group variant tables by inferred sample, in first-seen sample order.
/// Files without a subsample token are left out.
pub fn group_by_sample(files: &[PathBuf], suffix: &str) -> Vec<SampleFiles> {
    let mut samples: Vec<SampleFiles> = Vec::new();

    for file in files {
        let file_name = match file.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };

        let (sample_id, level) = infer_sample_level(file_name, suffix);
        let level = match level {
            Some(level) => level,
            None => {
                log::warn!("No subsample level in {:?}, skipping", file);
                continue;
            }
        };
        log::info!("Found: {} - {} -> {:?}", sample_id, level, file);

        let position = match samples.iter().position(|s| s.sample_id == sample_id) {
            Some(position) => position,
            None => {
                samples.push(SampleFiles {
                    sample_id: sample_id.clone(),
                    levels: HashMap::new(),
                });
                samples.len() - 1
            }
        };

        if let Some(previous) = samples[position].levels.insert(level.clone(), file.clone()) {
            log::warn!(
                "{:?} replaces {:?} for {} level {}",
                file,
                previous,
                sample_id,
                level
            );
        }
    }

    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CovconError;
    use std::io::Write;
    use tempfile::TempDir;

    const SUFFIX: &str = "_genome_variants.tsv";

    fn write_table(path: &Path, rows: &[&str]) {
        let mut file = std::fs::File::create(path).unwrap();
        writeln!(file, "REGION\tPOS\tREF\tALT\tREF_DP\tALT_DP\tALT_FREQ").unwrap();
        for row in rows {
            writeln!(file, "{}", row).unwrap();
        }
    }

    #[test]
    fn test_infer_sample_level() {
        assert_eq!(
            infer_sample_level("sampleA_1000_genome_variants.tsv", SUFFIX),
            ("sampleA".to_string(), Some("1000".to_string()))
        );
        assert_eq!(
            infer_sample_level("sampleA_all_genome_variants.tsv", SUFFIX),
            ("sampleA".to_string(), Some("all".to_string()))
        );
        assert_eq!(
            infer_sample_level("my_sample_B_500_genome_variants.tsv", SUFFIX),
            ("my_sample_B".to_string(), Some("500".to_string()))
        );
        assert_eq!(
            infer_sample_level("sampleA_full_genome_variants.tsv", SUFFIX),
            ("unknown".to_string(), None)
        );
        assert_eq!(
            infer_sample_level("sampleA_ALL_genome_variants.tsv", SUFFIX),
            ("unknown".to_string(), None)
        );
    }

    #[test]
    fn test_infer_level_first_token() {
        assert_eq!(
            infer_sample_level("1000_x_genome_variants.tsv", SUFFIX),
            ("unknown".to_string(), Some("1000".to_string()))
        );
    }

    #[test]
    fn test_join_on_identity() {
        let reference = VariantTable::new(vec![VariantRecord::new("chr1", 100, "A", "T", 0.5)]);
        let subsample = VariantTable::new(vec![
            VariantRecord::new("chr1", 100, "A", "T", 0.4),
            VariantRecord::new("chr1", 200, "A", "T", 0.6),
        ]);

        assert_eq!(join_on_identity(&subsample, &reference), vec![(0.4, 0.5)]);
    }

    #[test]
    fn test_join_cross_product() {
        let reference = VariantTable::new(vec![
            VariantRecord::new("chr1", 100, "A", "T", 0.5),
            VariantRecord::new("chr1", 100, "A", "T", 0.7),
        ]);
        let subsample = VariantTable::new(vec![
            VariantRecord::new("chr1", 100, "A", "T", 0.4),
            VariantRecord::new("chr1", 100, "A", "T", 0.3),
            VariantRecord::new("chr1", 100, "A", "G", 0.9),
        ]);

        let matched = join_on_identity(&subsample, &reference);
        assert_eq!(matched, vec![(0.4, 0.5), (0.4, 0.7), (0.3, 0.5), (0.3, 0.7)]);
    }

    #[test]
    fn test_filtered() {
        let table = VariantTable::new(vec![
            VariantRecord::new("chr1", 1, "A", "T", 0.1),
            VariantRecord::new("chr1", 2, "A", "T", 0.11),
            VariantRecord::new("chr1", 3, "A", "T", 0.05),
        ]);

        let filtered = table.filtered();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.records[0].pos, 2);
    }

    #[test]
    fn test_read_variant_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s_all_genome_variants.tsv");
        write_table(&path, &["chr1\t100\tA\tT\t10\t10\t0.5", "chr1\t150\tG\t+C\t18\t2\t0.1"]);

        let table = read_variant_table(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.records[1].alt_allele, "+C");
        assert_eq!(table.frequencies(), vec![0.5, 0.1]);
    }

    #[test]
    fn test_read_variant_table_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s_all_genome_variants.tsv");
        write_table(&path, &["chr1\t100\tA\tT\t10\t10\tnot_a_number"]);
        assert!(matches!(read_variant_table(&path), Err(CovconError::Csv(_))));

        let empty_freq = dir.path().join("s_10_genome_variants.tsv");
        write_table(&empty_freq, &["chr1\t100\tA\tT\t10\t10\t", "chr1\t200\tC\tG\t10\t10\t0.5"]);
        let table = read_variant_table(&empty_freq).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.records[0].alt_freq, None);
        assert_eq!(table.frequencies(), vec![0.5]);
        let filtered = table.filtered();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.records[0].pos, 200);

        let missing_column = dir.path().join("s_100_genome_variants.tsv");
        std::fs::write(&missing_column, "REGION\tPOS\tREF\tALT\nchr1\t1\tA\tT\n").unwrap();
        assert!(read_variant_table(&missing_column).is_err());
    }

    #[test]
    fn test_find_and_group_files() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("nested");
        std::fs::create_dir(&sub).unwrap();

        write_table(&dir.path().join("s1_all_genome_variants.tsv"), &[]);
        write_table(&dir.path().join("s1_1000_genome_variants.tsv"), &[]);
        write_table(&sub.join("s1_200_genome_variants.tsv"), &[]);
        write_table(&sub.join("s2_all_genome_variants.tsv"), &[]);
        write_table(&dir.path().join("notes_genome_variants.tsv"), &[]);
        std::fs::write(dir.path().join("s1_all_other.tsv"), "x").unwrap();

        let files = find_variant_files(dir.path(), SUFFIX).unwrap();
        assert_eq!(files.len(), 5);

        let samples = group_by_sample(&files, SUFFIX);
        assert_eq!(samples.len(), 2);

        let s1 = samples.iter().find(|s| s.sample_id == "s1").unwrap();
        assert!(s1.reference().is_some());
        let levels: Vec<u64> = s1.numeric_levels().iter().map(|(n, _, _)| *n).collect();
        assert_eq!(levels, vec![200, 1000]);

        let s2 = samples.iter().find(|s| s.sample_id == "s2").unwrap();
        assert!(s2.numeric_levels().is_empty());
        assert!(samples.iter().all(|s| s.sample_id != "unknown"));
    }

    #[test]
    fn test_numeric_levels_keep_raw_tokens() {
        let levels = [("all", "a.tsv"), ("7", "b.tsv"), ("007", "c.tsv"), ("50", "d.tsv")];
        let sample = SampleFiles {
            sample_id: "s1".to_string(),
            levels: levels
                .iter()
                .map(|(token, path)| (token.to_string(), PathBuf::from(path)))
                .collect(),
        };

        let tokens: Vec<(u64, &str)> = sample
            .numeric_levels()
            .iter()
            .map(|(n, token, _)| (*n, *token))
            .collect();
        assert_eq!(tokens, vec![(7, "007"), (7, "7"), (50, "50")]);
    }
}

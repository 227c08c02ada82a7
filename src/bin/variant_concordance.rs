//! CLI binary for variant concordance - subsampled call sets vs. the full read set

use clap::Parser;
use env_logger::Env;
use std::path::PathBuf;
use covcon_rs::{
    concordance::{analyze_samples, validate_concordance_config, SampleAnalysis},
    plots::SeriesPlotWriter,
    utils::{validate_dir_exists, Timer},
    variants::{find_variant_files, group_by_sample},
    ConcordanceConfig, CovconError, CovconResult,
};

#[derive(Parser)]
#[command(name = "variant_concordance")]
#[command(about = "Compare variant calls from subsampled reads against the full read set")]
#[command(long_about = "
Finds *_genome_variants.tsv tables in VARIANTS_DIR and its immediate
subdirectories and groups them by sample using the file name:
<sample>_<level>_genome_variants.tsv, where <level> is a read count or \"all\".

For each sample, every subsampled table is joined with the \"all\" table on
REGION, POS, REF and ALT (variants with ALT_FREQ > 0.1 only) and the R² of
the allele frequencies is reported. Scatter, count and histogram series are
written to <output-dir>/<sample>/.
")]
struct Args {
    /// Directory containing variant TSV files
    variants_dir: PathBuf,

    /// Directory receiving one subdirectory of plot series per sample
    #[arg(long, value_name = "DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Number of bins in the frequency histograms
    #[arg(long, default_value_t = 30)]
    histogram_bins: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn run() -> CovconResult<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();

    validate_dir_exists(&args.variants_dir)?;

    let config = ConcordanceConfig {
        histogram_bins: args.histogram_bins,
        output_dir: args.output_dir.clone(),
        ..ConcordanceConfig::default()
    };
    validate_concordance_config(&config)?;

    let variant_files = find_variant_files(&args.variants_dir, &config.file_suffix)?;
    println!(
        "Found {} variant files in {}",
        variant_files.len(),
        args.variants_dir.display()
    );

    if variant_files.is_empty() {
        println!(
            "No variant files found. Make sure the directory contains *{} files.",
            config.file_suffix
        );
        return Ok(());
    }

    let samples = group_by_sample(&variant_files, &config.file_suffix);
    let mut sink = SeriesPlotWriter::new(config.output_dir.clone(), config.histogram_bins);

    let _timer = Timer::new("Analyzing variant concordance");
    let analyses = analyze_samples(&samples, &mut sink);

    for analysis in &analyses {
        match analysis {
            SampleAnalysis::Skipped { sample_id, reason } => {
                println!();
                println!("=== {} skipped: {} ===", sample_id, reason);
            }
            SampleAnalysis::Analyzed(report) => {
                if let Some(summary) = report.format_summary() {
                    println!();
                    println!("{}", summary);
                    println!(
                        "Generated {} analysis sets for {} in {}",
                        report.results().len(),
                        report.sample_id,
                        sink.sample_dir(&report.sample_id).display()
                    );
                } else {
                    println!();
                    println!("=== {}: no subsample level could be scored ===", report.sample_id);
                }
            }
        }
    }

    Ok(())
}

/// Handle application errors and provide user-friendly messages
fn handle_error(error: CovconError) -> ! {
    match error {
        CovconError::FileNotFound(path) => {
            eprintln!("Error: Directory '{}' does not exist.", path);
        }
        CovconError::InvalidConfig(msg) => {
            eprintln!("Error: Invalid configuration: {}", msg);
            eprintln!("Please check --histogram-bins.");
        }
        CovconError::Io(ref e) => {
            eprintln!("Error: I/O error: {}", e);
            eprintln!("Please check file permissions and disk space.");
        }
        other => {
            eprintln!("Error: {}", other);
        }
    }
    std::process::exit(1);
}

fn main() {
    if let Err(e) = run() {
        handle_error(e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["variant_concordance", "variants"]).unwrap();
        assert_eq!(args.variants_dir, PathBuf::from("variants"));
        assert_eq!(args.output_dir, PathBuf::from("output"));
        assert_eq!(args.histogram_bins, 30);
    }

    #[test]
    fn test_args_require_variants_dir() {
        assert!(Args::try_parse_from(["variant_concordance"]).is_err());
    }
}

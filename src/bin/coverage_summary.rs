//! CLI binary for coverage aggregation - one CSV table per SRA accession

use clap::Parser;
use env_logger::Env;
use std::path::PathBuf;
use covcon_rs::{
    summary::summarize_coverage,
    utils::Timer,
    CovconError, CovconResult,
};

#[derive(Parser)]
#[command(name = "coverage_summary")]
#[command(about = "Create CSV summaries grouped by SRA accession")]
#[command(long_about = "
Collects coverage statistics lines written by coverage_stats, groups them by
SRA accession and writes <accession>_coverage_stats.csv for each accession,
rows ordered by subsample level with the full read set (\"all\") last.

Missing or malformed stats files are reported and skipped. The output
directory must already exist.
")]
struct Args {
    /// List of stats files
    #[arg(long, value_name = "FILE", num_args = 1.., required = true)]
    stats_files: Vec<PathBuf>,

    /// Output directory for CSV files
    #[arg(long, value_name = "DIR")]
    output_dir: PathBuf,

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

    println!("Processing {} stats files", args.stats_files.len());

    let _timer = Timer::new("Summarizing coverage");
    let report = summarize_coverage(&args.stats_files, &args.output_dir)?;

    if report.tables.is_empty() {
        println!("No data loaded");
        return Ok(());
    }

    println!();
    println!("Grouped into {} SRA accessions", report.tables.len());

    for (table, path) in &report.tables {
        println!();
        println!(
            "Processing SRA: {} ({} subsamples)",
            table.sra_accession,
            table.rows.len()
        );
        println!("  Saved to: {}", path.display());
        println!("  Subsamples: {}", table.subsamples().join(", "));

        if let Some(rollup) = table.rollup() {
            println!("  Mean mapping rate: {:.2}%", rollup.mean_mapping_rate);
            println!("  Mean breadth coverage: {:.2}%", rollup.mean_breadth_coverage);
            println!(
                "  Mean depth range: {:.1}x - {:.1}x",
                rollup.min_mean_depth, rollup.max_mean_depth
            );
        }
    }

    println!();
    println!("=== SUMMARY ===");
    println!(
        "Created {} CSV files for {} total samples",
        report.tables.len(),
        report.records_loaded
    );

    Ok(())
}

/// Handle application errors and provide user-friendly messages
fn handle_error(error: CovconError) -> ! {
    match error {
        CovconError::FileNotFound(path) => {
            eprintln!("Error: Directory not found: {}", path);
            eprintln!("Please create the output directory before running the summary.");
        }
        CovconError::Io(ref e) => {
            eprintln!("Error: I/O error: {}", e);
            eprintln!("Please check file permissions and disk space.");
        }
        CovconError::Csv(ref e) => {
            eprintln!("Error: CSV writing error: {}", e);
        }
        CovconError::MalformedRecord(msg) => {
            eprintln!("Error: Malformed record: {}", msg);
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

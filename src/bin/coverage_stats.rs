//! CLI binary for coverage extraction - one alignment in, one coverage record out

use clap::{Parser, ValueEnum};
use env_logger::Env;
use std::path::PathBuf;
use covcon_rs::{
    coverage::{extract_coverage, RunInfo},
    stats::{AlignmentStats, HtslibStats, PrecomputedStats, SamtoolsStats},
    utils::{format_count, validate_file_readable, Timer},
    CovconError, CovconResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Run `samtools flagstat` and `samtools depth`
    Samtools,
    /// Compute the same statistics in-process with htslib
    Htslib,
}

#[derive(Parser)]
#[command(name = "coverage_stats")]
#[command(about = "Calculate coverage statistics from a BAM file")]
#[command(long_about = "
Calculates mapping rate, breadth of coverage and mean depth for one alignment
of a (sample, subsample level) run and writes them as a single comma-separated
line:

  sample_id,sra_accession,subsample,total_reads,mapped_reads,mapping_rate,
  breadth_coverage,mean_depth,covered_bases,total_bases

The mapped read count comes from the alignment summary report and the
coverage from the per-position depth stream. Both are produced by samtools by
default; pass --flagstat-report and --depth-table to use captured outputs
instead.
")]
struct Args {
    /// Input BAM file
    #[arg(long, value_name = "FILE")]
    bam: PathBuf,

    /// Reference FASTA file
    #[arg(long, value_name = "FILE")]
    reference: PathBuf,

    /// Sample identifier
    #[arg(long)]
    sample_id: String,

    /// SRA accession
    #[arg(long)]
    sra_accession: String,

    /// Subsample level (read count or "all")
    #[arg(long)]
    subsample: String,

    /// Total read count from SRA
    #[arg(long)]
    total_reads: u64,

    /// Output stats file
    #[arg(long, value_name = "FILE")]
    output: PathBuf,

    /// How alignment statistics are computed
    #[arg(long, value_enum, default_value = "samtools")]
    backend: Backend,

    /// samtools executable
    #[arg(long, value_name = "PATH", default_value = "samtools")]
    samtools: PathBuf,

    /// Previously captured `samtools flagstat` report
    #[arg(long, value_name = "FILE", requires = "depth_table")]
    flagstat_report: Option<PathBuf>,

    /// Previously captured `samtools depth` output (plain or gzip)
    #[arg(long, value_name = "FILE", requires = "flagstat_report")]
    depth_table: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn build_stats(args: &Args) -> Box<dyn AlignmentStats> {
    if let (Some(report), Some(depth)) = (&args.flagstat_report, &args.depth_table) {
        return Box::new(PrecomputedStats::new(report.clone(), depth.clone()));
    }

    match args.backend {
        Backend::Samtools => Box::new(SamtoolsStats::new(args.samtools.clone())),
        Backend::Htslib => Box::new(HtslibStats),
    }
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

    // Validate input files before any work
    validate_file_readable(&args.bam)?;
    validate_file_readable(&args.reference)?;
    if let (Some(report), Some(depth)) = (&args.flagstat_report, &args.depth_table) {
        validate_file_readable(report)?;
        validate_file_readable(depth)?;
    }

    println!("Processing sample: {}", args.sample_id);
    println!("SRA: {}, Subsample: {}", args.sra_accession, args.subsample);
    println!("Total SRA reads: {}", format_count(args.total_reads));
    println!("BAM file: {}", args.bam.display());
    println!("Reference: {}", args.reference.display());

    let run = RunInfo {
        sample_id: args.sample_id.clone(),
        sra_accession: args.sra_accession.clone(),
        subsample: args.subsample.clone(),
        total_reads: args.total_reads,
    };

    let stats = build_stats(&args);
    let _timer = Timer::new("Calculating coverage statistics");
    let record = extract_coverage(&*stats, &args.bam, &run)?;

    println!();
    println!("{}", record.format_summary());

    record.write_to(&args.output)?;
    println!("Results saved to: {}", args.output.display());

    Ok(())
}

/// Handle application errors and provide user-friendly messages
fn handle_error(error: CovconError) -> ! {
    match error {
        CovconError::FileNotFound(path) => {
            eprintln!("Error: File not found: {}", path);
            eprintln!("Please check that the BAM and reference files exist and are readable.");
        }
        CovconError::ExternalTool(msg) => {
            eprintln!("Error: Alignment statistics failed: {}", msg);
            eprintln!("No statistics were written for this run.");
        }
        CovconError::MalformedRecord(msg) => {
            eprintln!("Error: Malformed input: {}", msg);
        }
        CovconError::InvalidConfig(msg) => {
            eprintln!("Error: Invalid configuration: {}", msg);
        }
        CovconError::Htslib(ref e) => {
            eprintln!("Error: BAM processing error: {}", e);
            eprintln!("Please check that your BAM file is valid.");
        }
        CovconError::Io(ref e) => {
            eprintln!("Error: I/O error: {}", e);
            eprintln!("Please check that the output directory exists and is writable.");
        }
        CovconError::Csv(ref e) => {
            eprintln!("Error: CSV processing error: {}", e);
        }
    }
    std::process::exit(1);
}

fn main() {
    if let Err(e) = run() {
        handle_error(e);
    }
}

fn main() {
    println!("covcon-rs - Subsampling coverage and variant concordance tools");
    println!();
    println!("📋 Pipeline stages, run in order by your workflow:");
    println!("  coverage_stats      - Coverage statistics for one alignment (BAM → stats line)");
    println!("  coverage_summary    - Per-accession coverage tables (stats lines → CSV per SRA)");
    println!("  variant_concordance - Subsample vs. full read set variant agreement (TSV → R²)");
    println!();
    println!("📖 For help with each tool:");
    println!("  cargo run --bin coverage_stats -- --help");
    println!("  cargo run --bin coverage_summary -- --help");
    println!("  cargo run --bin variant_concordance -- --help");
    println!();
    println!("🚀 Quick start example:");
    println!("  cargo run --bin coverage_stats -- --bam s1_1000.bam --reference ref.fa \\");
    println!("      --sample-id s1 --sra-accession SRR000001 --subsample 1000 \\");
    println!("      --total-reads 250000 --output s1_1000_stats.csv");
}

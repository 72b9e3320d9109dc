//! CLI binary for subtype QC - annotates subtyping results with a QC status and message

use clap::Parser;
use env_logger::Env;
use std::path::PathBuf;
use subtype_qc_rs::{
    checks::validate_subtyping_params,
    qc::{annotate_samples, summarize_verdicts},
    registry::CheckRegistry,
    tsv::{read_subtype_summaries, read_tile_results, write_qc_report},
    utils::{ensure_parent_dirs, get_num_cpus, validate_file_readable, Timer},
    QcError, QcResult, QcStatus, SubtypingParams,
};

#[derive(Parser)]
#[command(name = "subtype_qc")]
#[command(about = "Quality control of tile-based genomic subtyping results")]
#[command(long_about = "
Judges whether each subtype call can be trusted, given the per-sample subtyping
summary and the per-tile matching results it was derived from.

Each sample is run through a fixed series of checks (missing tiles, mixed
subtype, missing target sites, missing downstream targets, possible
intermediate subtype, low coverage). The most severe outcome becomes the
sample's QC status (FAIL > WARNING > PASS) and the messages of every check that
fired are joined with ' | ' into the QC message.

Samples without a subtype call or without any tile results fail immediately
with the message 'no subtype result'.

The output TSV repeats the subtyping summary with two columns filled in:
- qc_status: PASS, WARNING or FAIL
- qc_message: pipe-delimited diagnostic messages (empty on a clean PASS)
")]
struct Args {
    /// Path to the subtyping summary TSV (one row per sample)
    #[arg(long, value_name = "FILE")]
    subtype_summary: PathBuf,

    /// Path to the per-tile results TSV (one row per tile per sample)
    #[arg(long, value_name = "FILE")]
    tile_results: PathBuf,

    /// Path to the output QC report TSV (gzip compressed if it ends in .gz)
    #[arg(long, value_name = "FILE")]
    output: PathBuf,

    /// Fraction above the expected tile count that marks a mixed subtype
    #[arg(long, default_value = "0.01")]
    mixed_subtype_overage: f64,

    /// Fraction below the expected tile count that marks too few tiles
    #[arg(long, default_value = "0.05")]
    min_tiles_shortfall: f64,

    /// Minimum k-mer frequency for a tile to count as matched
    #[arg(long, default_value = "8")]
    min_kmer_freq: u64,

    /// Maximum fraction of target sites allowed without any matched tile
    #[arg(long, default_value = "0.05")]
    max_missing_target_sites: f64,

    /// Maximum fraction of downstream target sites allowed without any matched tile
    #[arg(long, default_value = "0.05")]
    max_missing_downstream: f64,

    /// Positive downstream tile matches that suggest an intermediate subtype
    #[arg(long, default_value = "3")]
    min_ambiguous_tiles: usize,

    /// Mean tile coverage below which coverage is reported as low
    #[arg(long, default_value = "20")]
    low_coverage_depth: f64,

    /// Number of threads to use for parallel processing
    #[arg(long, default_value_t = get_num_cpus())]
    num_processes: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Force overwrite of output file if it exists
    #[arg(short, long)]
    force: bool,
}

impl Args {
    fn subtyping_params(&self) -> SubtypingParams {
        SubtypingParams {
            mixed_subtype_overage: self.mixed_subtype_overage,
            min_tiles_shortfall: self.min_tiles_shortfall,
            min_kmer_freq: self.min_kmer_freq,
            max_perc_missing_target_sites: self.max_missing_target_sites,
            max_perc_missing_downstream: self.max_missing_downstream,
            min_ambiguous_tiles: self.min_ambiguous_tiles,
            low_coverage_depth_freq: self.low_coverage_depth,
        }
    }
}

fn run() -> QcResult<()> {
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

    log::info!("Starting subtype QC");
    log::info!("Subtype summary: {:?}", args.subtype_summary);
    log::info!("Tile results: {:?}", args.tile_results);
    log::info!("Output report: {:?}", args.output);
    log::info!("Number of processes: {}", args.num_processes);

    validate_file_readable(&args.subtype_summary)?;
    validate_file_readable(&args.tile_results)?;

    if args.output.exists() && !args.force {
        return Err(QcError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("Output file {:?} already exists. Use --force to overwrite.", args.output),
        )));
    }
    ensure_parent_dirs(&args.output)?;

    let params = args.subtyping_params();
    validate_subtyping_params(&params)?;
    log::info!("Configuration: {:?}", params);

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.num_processes.max(1))
        .build_global()
        .map_err(|e| QcError::InvalidConfig(format!("Could not start thread pool: {}", e)))?;

    let timer = Timer::new("Reading subtyping results");
    let mut subtypes = read_subtype_summaries(&args.subtype_summary)?;
    let tables = read_tile_results(&args.tile_results)?;
    drop(timer);
    log::info!(
        "Read {} subtyping results and tile results for {} samples",
        subtypes.len(),
        tables.len()
    );

    if subtypes.is_empty() {
        log::warn!("No samples found in the subtyping summary");
    }

    let timer = Timer::new("Running quality checks");
    let registry = CheckRegistry::default();
    let verdicts = annotate_samples(&mut subtypes, &tables, &params, &registry);
    drop(timer);

    if !verdicts.is_empty() {
        let counts = summarize_verdicts(&verdicts);
        log::info!("QC summary:");
        for status in [QcStatus::Pass, QcStatus::Warning, QcStatus::Fail] {
            let n = counts.get(&status).copied().unwrap_or(0);
            log::info!(
                "  {}: {} ({:.1}%)",
                status,
                n,
                (n as f64 / verdicts.len() as f64) * 100.0
            );
        }
    }

    let _timer = Timer::new("Writing QC report");
    write_qc_report(&subtypes, &args.output)?;
    log::info!("QC report written to: {:?}", args.output);

    Ok(())
}

/// Handle application errors and provide user-friendly messages
fn handle_error(error: QcError) -> ! {
    match error {
        QcError::FileNotFound(path) => {
            eprintln!("Error: File not found: {}", path);
            eprintln!("Please check that the file exists and is readable.");
        }
        QcError::InvalidExpectedTiles(value) => {
            eprintln!("Error: Invalid expected tiles field: {:?}", value);
            eprintln!("The n_tiles_matching_all_expected column must start with a non-negative integer.");
        }
        QcError::InvalidConfig(msg) => {
            eprintln!("Error: Invalid configuration: {}", msg);
            eprintln!("Please check your QC threshold parameters.");
        }
        QcError::Csv(ref e) => {
            eprintln!("Error: Could not parse input table: {}", e);
            eprintln!("Please check that your TSV files have the expected header and columns.");
        }
        QcError::Io(ref e) => {
            eprintln!("Error: I/O error: {}", e);
            eprintln!("Please check file permissions and disk space.");
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
    use std::io::Write;
    use subtype_qc_rs::qc::perform_quality_checks;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_args_match_default_params() {
        let args = Args::parse_from([
            "subtype_qc",
            "--subtype-summary",
            "summary.tsv",
            "--tile-results",
            "tiles.tsv",
            "--output",
            "qc.tsv",
        ]);
        assert_eq!(args.subtyping_params(), SubtypingParams::default());
    }

    #[test]
    fn test_config_validation() {
        let args = Args::parse_from([
            "subtype_qc",
            "--subtype-summary",
            "summary.tsv",
            "--tile-results",
            "tiles.tsv",
            "--output",
            "qc.tsv",
            "--min-tiles-shortfall",
            "1.5",
        ]);
        assert!(validate_subtyping_params(&args.subtyping_params()).is_err());
    }

    #[test]
    fn test_qc_workflow_integration() {
        let mut summary = NamedTempFile::new().unwrap();
        writeln!(summary, "sample\tsubtype\tn_tiles_matching_all\tn_tiles_matching_all_expected\tare_subtypes_consistent\tinconsistent_subtypes").unwrap();
        writeln!(summary, "clean\t2.1\t4\t4\ttrue\t").unwrap();
        writeln!(summary, "mixed\t2.1\t4\t4\ttrue\t2").unwrap();
        writeln!(summary, "uncalled\t\t0\t4\t\t").unwrap();

        let mut tiles = NamedTempFile::new().unwrap();
        writeln!(tiles, "sample\ttile_id\ttarget_site\tsubtype\tis_pos_tile\tfreq").unwrap();
        for sample in ["clean", "mixed", "uncalled"] {
            for site in 1..=4 {
                writeln!(tiles, "{}\t{}-2.1\t{}\t2.1\ttrue\t40", sample, site, site).unwrap();
            }
        }

        let mut subtypes = read_subtype_summaries(summary.path()).unwrap();
        let tables = read_tile_results(tiles.path()).unwrap();
        let params = SubtypingParams::default();
        let registry = CheckRegistry::default();

        let verdicts = annotate_samples(&mut subtypes, &tables, &params, &registry);
        assert_eq!(verdicts.len(), 3);
        assert_eq!(subtypes[0].qc_status, Some(QcStatus::Pass));
        assert_eq!(subtypes[0].qc_message, "");
        assert_eq!(subtypes[1].qc_status, Some(QcStatus::Fail));
        assert!(subtypes[1].qc_message.starts_with("FAIL: Mixed subtypes found"));
        assert_eq!(subtypes[2].qc_status, Some(QcStatus::Fail));
        assert_eq!(subtypes[2].qc_message, "no subtype result");

        let again = perform_quality_checks(&subtypes[1], tables.get("mixed"), &params, &registry);
        assert_eq!(again, verdicts[1]);

        let output_file = NamedTempFile::new().unwrap();
        write_qc_report(&subtypes, output_file.path()).unwrap();
        let output_content = std::fs::read_to_string(output_file.path()).unwrap();
        assert_eq!(output_content.lines().count(), 4);
        assert!(output_content.contains("no subtype result"));
    }
}

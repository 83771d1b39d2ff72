use clap::Parser;
use ja4_correlate::{
    source, CorrelationMode, CorrelatorConfig, DatabaseFormat, Ja4Correlator, RecordFormat,
    ReportFormat,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// JA4+ reference database (JSON)
    #[arg(short = 'd', long)]
    database: PathBuf,

    /// Fingerprint records, `-` for standard input
    #[arg(short = 'r', long)]
    records: PathBuf,

    /// Database layout: entries or foxio
    #[arg(long, default_value = "entries")]
    database_format: DatabaseFormat,

    /// Record layout: json (array) or jsonl (capture lines)
    #[arg(long, default_value = "json")]
    record_format: RecordFormat,

    /// How capture lines are keyed: per-kind, ja4-only, ja4-ja4s or ja4-ja4s-ja4ts
    #[arg(short = 'm', long, default_value = "per-kind")]
    mode: CorrelationMode,

    /// Report layout: json, json-pretty or text
    #[arg(short = 'f', long, default_value = "json-pretty")]
    format: ReportFormat,

    /// Report destination, standard output when omitted
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Worker threads used for matching
    #[arg(short = 'w', long, default_value_t = 1)]
    workers: usize,

    /// Unmatched and invalid examples kept in the report
    #[arg(long, default_value_t = 10)]
    samples: usize,

    /// Log file path
    #[arg(short = 'l', long = "log-file")]
    log_file: Option<PathBuf>,
}

fn initialize_logging(log_file: Option<&PathBuf>) -> Option<WorkerGuard> {
    let (result, guard) = match log_file {
        Some(path) => {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty());
            let file_name = path.file_name().map(PathBuf::from).unwrap_or_else(|| path.clone());
            let appender = tracing_appender::rolling::never(
                directory.map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
                file_name,
            );
            let (file_writer, guard) = tracing_appender::non_blocking(appender);
            let subscriber = fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_writer(io::stderr.and(file_writer))
                .finish();
            (tracing::subscriber::set_global_default(subscriber), Some(guard))
        }
        None => {
            let subscriber = fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_writer(io::stderr)
                .finish();
            (tracing::subscriber::set_global_default(subscriber), None)
        }
    };

    if let Err(e) = result {
        eprintln!("Failed to set subscriber: {e}");
        std::process::exit(1);
    }
    guard
}

fn run(args: Args) -> Result<(), ja4_correlate::Ja4CorrelateError> {
    let config = CorrelatorConfig::default()
        .with_workers(args.workers)
        .with_sample_limit(args.samples)
        .with_database_format(args.database_format)
        .with_record_format(args.record_format)
        .with_mode(args.mode)
        .with_report_format(args.format);

    let correlator = Ja4Correlator::from_path(&args.database, config)?;
    let mut records = source::open_path(&args.records, args.record_format, args.mode)?;
    let report = correlator.correlate(&mut *records)?;

    match &args.output {
        Some(path) => {
            let mut sink = BufWriter::new(File::create(path)?);
            correlator.emit(&report, &mut sink)?;
            sink.flush()?;
            info!("Report written to {}", path.display());
        }
        None => {
            let stdout = io::stdout();
            let mut sink = stdout.lock();
            correlator.emit(&report, &mut sink)?;
        }
    }
    Ok(())
}

fn main() {
    let args = Args::parse();
    let guard = initialize_logging(args.log_file.as_ref());

    info!("Starting JA4+ correlation");

    if let Err(e) = run(args) {
        error!("Correlation failed: {e}");
        drop(guard);
        std::process::exit(1);
    }
}

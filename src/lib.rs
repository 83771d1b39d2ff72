#![forbid(unsafe_code)]

//! # ja4-correlate
//!
//! Correlates observed JA4+ fingerprints against a JA4+ reference database and folds the
//! identifications into a per-application summary report.
//!
//! This crate provides:
//! - Parsing of JA4+ fingerprints and wildcard patterns
//! - A segment-indexed reference database (native entries or FoxIO rows)
//! - Specificity-ranked matching with explicit ambiguity
//! - Streaming aggregation, mergeable across worker threads
//! - Deterministic JSON and text reports
//!
//! Fingerprints are produced upstream by a capture and log-conversion pipeline; this crate
//! only consumes them through [`FingerprintSource`].

pub mod aggregate;
pub mod config;
pub mod db;
mod display;
pub mod error;
pub mod fingerprint;
pub mod matcher;
pub mod parallel;
pub mod record;
pub mod report;
pub mod source;

// Re-exports
pub use aggregate::{Aggregator, OutcomeCounts};
pub use config::{CorrelationMode, CorrelatorConfig, DatabaseFormat, RecordFormat};
pub use db::{DatabaseEntry, Identity, ReferenceDatabase};
pub use error::Ja4CorrelateError;
pub use fingerprint::{Fingerprint, FingerprintKind, Pattern, Segment};
pub use matcher::{Confidence, MatchOutcome, MatchResult, Matcher, OutcomeKind};
pub use record::{FingerprintRecord, MalformedRecord, RecordInput};
pub use report::{ReportEmitter, ReportFormat, SummaryReport};
pub use source::FingerprintSource;

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A JA4+ correlation engine bound to one reference database.
///
/// The database is loaded once and shared read-only; every run builds its own
/// [`Aggregator`], so one correlator can serve any number of sources.
pub struct Ja4Correlator {
    database: Arc<ReferenceDatabase>,
    config: CorrelatorConfig,
}

impl Ja4Correlator {
    /// Creates a correlator over an already loaded database.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        database: Arc<ReferenceDatabase>,
        config: CorrelatorConfig,
    ) -> Result<Self, Ja4CorrelateError> {
        config.validate()?;
        Ok(Self { database, config })
    }

    /// Loads the database at `path` in the configured format.
    ///
    /// # Errors
    ///
    /// Returns `MalformedDatabase` if the file is unreadable or any entry is malformed.
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        config: CorrelatorConfig,
    ) -> Result<Self, Ja4CorrelateError> {
        config.validate()?;
        let database = ReferenceDatabase::load_from_path(path, config.database_format)?;
        Self::new(Arc::new(database), config)
    }

    pub fn database(&self) -> &ReferenceDatabase {
        &self.database
    }

    pub fn shared_database(&self) -> Arc<ReferenceDatabase> {
        Arc::clone(&self.database)
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.config
    }

    pub fn matcher(&self) -> Matcher<'_> {
        Matcher::new(&self.database)
    }

    /// Consumes `source` and returns the summary of everything it yielded.
    pub fn correlate<S: FingerprintSource + ?Sized>(
        &self,
        source: &mut S,
    ) -> Result<SummaryReport, Ja4CorrelateError> {
        self.correlate_with_cancel(source, None)
    }

    /// Like [`Ja4Correlator::correlate`], stopping early once `cancel_signal` is set. The
    /// report then covers the records consumed before the signal.
    pub fn correlate_with_cancel<S: FingerprintSource + ?Sized>(
        &self,
        source: &mut S,
        cancel_signal: Option<Arc<AtomicBool>>,
    ) -> Result<SummaryReport, Ja4CorrelateError> {
        let cancelled = || cancel_signal.as_ref().is_some_and(|c| c.load(Ordering::Relaxed));

        let aggregator = if self.config.workers > 1 {
            let mut inputs = Vec::new();
            while let Some(input) = source.next_record() {
                if cancelled() {
                    debug!("Cancellation signal received, stopping record intake");
                    break;
                }
                log_malformed(&input);
                inputs.push(input);
            }
            parallel::correlate_batches(
                &self.database,
                &inputs,
                self.config.workers,
                self.config.sample_limit,
            )?
        } else {
            let matcher = self.matcher();
            let mut aggregator = Aggregator::new(self.config.sample_limit);
            while let Some(input) = source.next_record() {
                if cancelled() {
                    debug!("Cancellation signal received, stopping record processing");
                    break;
                }
                log_malformed(&input);
                aggregator.ingest(&matcher, &input);
            }
            aggregator
        };

        let outcomes = aggregator.outcomes();
        info!(
            "Correlated {} records: matched={}, ambiguous={}, unmatched={}, invalid={}",
            aggregator.total(),
            outcomes.matched,
            outcomes.ambiguous,
            outcomes.unmatched,
            outcomes.invalid
        );
        Ok(aggregator.report())
    }

    /// Writes `report` to `sink` in the configured format.
    pub fn emit<W: Write>(
        &self,
        report: &SummaryReport,
        sink: &mut W,
    ) -> Result<(), Ja4CorrelateError> {
        ReportEmitter::new(self.config.report_format).emit(report, sink)
    }
}

fn log_malformed(input: &RecordInput) {
    if let Err(malformed) = input {
        debug!("Malformed record {}: {}", malformed.index, malformed.reason);
    }
}

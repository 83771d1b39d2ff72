use crate::error::Ja4CorrelateError;
use crate::report::ReportFormat;
use std::str::FromStr;

/// Layout of the reference database document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DatabaseFormat {
    /// Array of `{kind, pattern, identity, note}` objects.
    #[default]
    Entries,
    /// Rows of the FoxIO `ja4+_db.json` document.
    FoxIo,
}

impl FromStr for DatabaseFormat {
    type Err = Ja4CorrelateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "entries" => Ok(DatabaseFormat::Entries),
            "foxio" => Ok(DatabaseFormat::FoxIo),
            other => Err(Ja4CorrelateError::Misconfiguration(format!(
                "unknown database format `{other}` (expected entries or foxio)"
            ))),
        }
    }
}

/// Layout of the fingerprint record stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecordFormat {
    /// One JSON array of `{kind, fingerprint, application}` objects.
    #[default]
    Json,
    /// Newline-delimited capture lines carrying several fingerprints per connection.
    JsonLines,
}

impl FromStr for RecordFormat {
    type Err = Ja4CorrelateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(RecordFormat::Json),
            "jsonl" | "json-lines" | "ndjson" => Ok(RecordFormat::JsonLines),
            other => Err(Ja4CorrelateError::Misconfiguration(format!(
                "unknown record format `{other}` (expected json or jsonl)"
            ))),
        }
    }
}

/// How a capture line carrying several fingerprints of one connection becomes records.
///
/// Record documents that already name a kind per record are not affected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CorrelationMode {
    /// One record per fingerprint present on the line, each matched on its own.
    #[default]
    PerKind,
    /// Only the ja4 fingerprint.
    Ja4Only,
    /// One `ja4|ja4s` key per line.
    Ja4Ja4S,
    /// One `ja4|ja4s|ja4ts` key per line; ja4t stands in when ja4ts is absent.
    Ja4Ja4STs,
}

impl FromStr for CorrelationMode {
    type Err = Ja4CorrelateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "per-kind" | "per_kind" | "all" => Ok(CorrelationMode::PerKind),
            "ja4" | "ja4-only" | "ja4_only" => Ok(CorrelationMode::Ja4Only),
            "ja4-ja4s" | "ja4_ja4s" => Ok(CorrelationMode::Ja4Ja4S),
            "ja4-ja4s-ja4ts" | "ja4_ja4s_ja4ts" => Ok(CorrelationMode::Ja4Ja4STs),
            other => Err(Ja4CorrelateError::Misconfiguration(format!(
                "unknown correlation mode `{other}` (expected per-kind, ja4-only, ja4-ja4s or ja4-ja4s-ja4ts)"
            ))),
        }
    }
}

/// Configuration for a correlation run
#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    /// Worker threads used for matching. 1 runs sequentially.
    pub workers: usize,
    /// How many unmatched and invalid examples the report keeps, in arrival order.
    pub sample_limit: usize,
    pub database_format: DatabaseFormat,
    pub record_format: RecordFormat,
    pub mode: CorrelationMode,
    pub report_format: ReportFormat,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            sample_limit: 10,
            database_format: DatabaseFormat::default(),
            record_format: RecordFormat::default(),
            mode: CorrelationMode::default(),
            report_format: ReportFormat::JsonPretty,
        }
    }
}

impl CorrelatorConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_sample_limit(mut self, sample_limit: usize) -> Self {
        self.sample_limit = sample_limit;
        self
    }

    pub fn with_database_format(mut self, format: DatabaseFormat) -> Self {
        self.database_format = format;
        self
    }

    pub fn with_record_format(mut self, format: RecordFormat) -> Self {
        self.record_format = format;
        self
    }

    pub fn with_mode(mut self, mode: CorrelationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_report_format(mut self, format: ReportFormat) -> Self {
        self.report_format = format;
        self
    }

    /// Rejects settings no run can honour.
    pub fn validate(&self) -> Result<(), Ja4CorrelateError> {
        if self.workers == 0 {
            return Err(Ja4CorrelateError::Misconfiguration(
                "Worker count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

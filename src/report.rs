use crate::aggregate::{Aggregator, InvalidSample, OutcomeCounts, UnmatchedSample};
use crate::error::Ja4CorrelateError;
use crate::fingerprint::FingerprintKind;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::str::FromStr;

/// Finalized summary of a correlation run.
///
/// Every collection is either an ordered map or a pre-sorted list, so two reports built
/// from the same records serialize identically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryReport {
    pub total_records: u64,
    pub outcomes: OutcomeCounts,
    /// Matched records whose identity equals their source application label.
    pub agreements: u64,
    /// Ambiguous records whose tied identities include their source application label.
    pub ambiguous_agreements: u64,
    pub distinct_fingerprints: u64,
    /// Distinct fingerprints that had at least one database match (matched or ambiguous).
    pub distinct_matched_fingerprints: u64,
    pub by_kind: BTreeMap<FingerprintKind, OutcomeCounts>,
    /// Sorted by application label.
    pub applications: Vec<ApplicationSummary>,
    /// Ranked by record count, ties by identity label.
    pub identities: Vec<IdentityFrequency>,
    /// Identity sets reported as ambiguous, ranked like `identities`.
    pub collisions: Vec<CollisionGroup>,
    pub unmatched_samples: Vec<UnmatchedSample>,
    pub invalid_samples: Vec<InvalidSample>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicationSummary {
    pub application: String,
    pub records: u64,
    pub outcomes: OutcomeCounts,
    pub agreements: u64,
    pub ambiguous_agreements: u64,
    pub identities: Vec<IdentityCount>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityCount {
    pub identity: String,
    pub records: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityFrequency {
    /// 1-based position in the ranking.
    pub rank: usize,
    pub identity: String,
    pub records: u64,
    pub exact: u64,
    pub partial: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollisionGroup {
    pub identities: Vec<String>,
    pub records: u64,
}

/// Orders by descending count, then by label.
fn rank<'a, I>(counts: I) -> Vec<(&'a String, u64)>
where
    I: IntoIterator<Item = (&'a String, u64)>,
{
    let mut ranked: Vec<(&String, u64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
}

impl SummaryReport {
    pub fn from_aggregator(aggregator: &Aggregator) -> Self {
        let applications = aggregator
            .applications
            .iter()
            .map(|(application, tally)| ApplicationSummary {
                application: application.clone(),
                records: tally.outcomes.total(),
                outcomes: tally.outcomes,
                agreements: tally.agreements,
                ambiguous_agreements: tally.ambiguous_agreements,
                identities: rank(tally.identities.iter().map(|(k, v)| (k, *v)))
                    .into_iter()
                    .map(|(identity, records)| IdentityCount { identity: identity.clone(), records })
                    .collect(),
            })
            .collect();

        let identities = rank(aggregator.identities.iter().map(|(k, v)| (k, v.records)))
            .into_iter()
            .enumerate()
            .map(|(position, (identity, records))| {
                let tally = aggregator.identities.get(identity).copied().unwrap_or_default();
                IdentityFrequency {
                    rank: position.saturating_add(1),
                    identity: identity.clone(),
                    records,
                    exact: tally.exact,
                    partial: tally.partial,
                }
            })
            .collect();

        let mut collisions: Vec<CollisionGroup> = aggregator
            .collisions
            .iter()
            .map(|(group, records)| CollisionGroup { identities: group.clone(), records: *records })
            .collect();
        collisions.sort_by(|a, b| b.records.cmp(&a.records).then_with(|| a.identities.cmp(&b.identities)));

        Self {
            total_records: aggregator.total,
            outcomes: aggregator.outcomes,
            agreements: aggregator.agreements,
            ambiguous_agreements: aggregator.ambiguous_agreements,
            distinct_fingerprints: aggregator.fingerprints.len() as u64,
            distinct_matched_fingerprints: aggregator.found_fingerprints.len() as u64,
            by_kind: aggregator.by_kind.clone(),
            applications,
            identities,
            collisions,
            unmatched_samples: aggregator.unmatched_samples.clone(),
            invalid_samples: aggregator.invalid_samples.clone(),
        }
    }

    pub fn application(&self, name: &str) -> Option<&ApplicationSummary> {
        self.applications.iter().find(|summary| summary.application == name)
    }
}

impl From<&Aggregator> for SummaryReport {
    fn from(aggregator: &Aggregator) -> Self {
        SummaryReport::from_aggregator(aggregator)
    }
}

impl Aggregator {
    /// Snapshot of the records folded in so far.
    pub fn report(&self) -> SummaryReport {
        SummaryReport::from_aggregator(self)
    }
}

/// Output rendering of a summary report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// Compact single-line JSON.
    Json,
    #[default]
    JsonPretty,
    /// Human-readable boxed layout.
    Text,
}

impl FromStr for ReportFormat {
    type Err = Ja4CorrelateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ReportFormat::Json),
            "json-pretty" | "pretty" => Ok(ReportFormat::JsonPretty),
            "text" => Ok(ReportFormat::Text),
            other => Err(Ja4CorrelateError::Misconfiguration(format!(
                "unknown report format `{other}` (expected json, json-pretty or text)"
            ))),
        }
    }
}

/// Writes summary reports to a sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReportEmitter {
    format: ReportFormat,
}

impl ReportEmitter {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> ReportFormat {
        self.format
    }

    /// Renders `report` into `sink`. Nothing besides the sink is touched.
    pub fn emit<W: Write>(&self, report: &SummaryReport, sink: &mut W) -> Result<(), Ja4CorrelateError> {
        match self.format {
            ReportFormat::Json => serde_json::to_writer(&mut *sink, report)?,
            ReportFormat::JsonPretty => serde_json::to_writer_pretty(&mut *sink, report)?,
            ReportFormat::Text => write!(sink, "{report}")?,
        }
        writeln!(sink)?;
        sink.flush()?;
        Ok(())
    }

    pub fn render(&self, report: &SummaryReport) -> Result<String, Ja4CorrelateError> {
        let mut buffer = Vec::new();
        self.emit(report, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            Ja4CorrelateError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }
}

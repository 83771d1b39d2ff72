use crate::db::{DatabaseEntry, ReferenceDatabase};
use crate::fingerprint::Fingerprint;
use crate::record::FingerprintRecord;
use serde::Serialize;
use tracing::trace;

/// How much of an observed fingerprint a resolved identity accounts for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Every segment of the matching pattern is a literal.
    Exact,
    /// At least one segment matched through a wildcard.
    Partial,
}

/// Outcome category, used as a counter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Matched,
    Unmatched,
    Ambiguous,
    Invalid,
}

/// Resolution of one fingerprint record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// A single identity holds the highest specificity.
    Matched { identity: String, confidence: Confidence, specificity: usize },
    /// Several distinct identities share the highest specificity; none is preferred.
    Ambiguous { identities: Vec<String>, specificity: usize },
    /// Well formed, but no pattern in the database matches.
    Unmatched,
    /// The record does not follow the segment layout of its declared kind.
    Invalid { reason: String },
}

impl MatchOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            MatchOutcome::Matched { .. } => OutcomeKind::Matched,
            MatchOutcome::Ambiguous { .. } => OutcomeKind::Ambiguous,
            MatchOutcome::Unmatched => OutcomeKind::Unmatched,
            MatchOutcome::Invalid { .. } => OutcomeKind::Invalid,
        }
    }
}

/// A database entry that matched, with its specificity score.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<'a> {
    pub entry: &'a DatabaseEntry,
    pub specificity: usize,
}

/// What the matcher found for one record. Only the most specific tier of candidates
/// is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult<'a> {
    /// The parsed fingerprint, absent for invalid records.
    pub fingerprint: Option<Fingerprint>,
    pub candidates: Vec<Candidate<'a>>,
    pub outcome: MatchOutcome,
}

impl MatchResult<'_> {
    fn invalid(reason: String) -> Self {
        Self { fingerprint: None, candidates: Vec::new(), outcome: MatchOutcome::Invalid { reason } }
    }
}

/// Resolves fingerprints against a borrowed reference database.
#[derive(Debug, Clone, Copy)]
pub struct Matcher<'a> {
    database: &'a ReferenceDatabase,
}

impl<'a> Matcher<'a> {
    pub fn new(database: &'a ReferenceDatabase) -> Self {
        Self { database }
    }

    pub fn database(&self) -> &'a ReferenceDatabase {
        self.database
    }

    /// Validates the record against its declared kind, then resolves it.
    pub fn match_record(&self, record: &FingerprintRecord) -> MatchResult<'a> {
        match Fingerprint::parse(record.kind, &record.fingerprint) {
            Ok(fingerprint) => self.match_fingerprint(fingerprint),
            Err(e) => {
                trace!("Invalid {} record from {}: {}", record.kind, record.application, e);
                MatchResult::invalid(e.to_string())
            }
        }
    }

    /// Resolves an already validated fingerprint.
    pub fn match_fingerprint(&self, fingerprint: Fingerprint) -> MatchResult<'a> {
        let found = self.database.candidates(&fingerprint);
        let Some(top) = found.first().map(|entry| entry.specificity()) else {
            return MatchResult {
                fingerprint: Some(fingerprint),
                candidates: Vec::new(),
                outcome: MatchOutcome::Unmatched,
            };
        };

        let candidates: Vec<Candidate<'a>> = found
            .into_iter()
            .take_while(|entry| entry.specificity() == top)
            .map(|entry| Candidate { entry, specificity: top })
            .collect();

        // duplicate rows of one identity are not a conflict
        let mut identities: Vec<String> = Vec::new();
        for candidate in &candidates {
            let label = &candidate.entry.identity.label;
            if !identities.contains(label) {
                identities.push(label.clone());
            }
        }

        let outcome = if identities.len() == 1 {
            let confidence = if top == fingerprint.kind().segment_count() {
                Confidence::Exact
            } else {
                Confidence::Partial
            };
            MatchOutcome::Matched {
                identity: identities.remove(0),
                confidence,
                specificity: top,
            }
        } else {
            MatchOutcome::Ambiguous { identities, specificity: top }
        };

        MatchResult { fingerprint: Some(fingerprint), candidates, outcome }
    }
}

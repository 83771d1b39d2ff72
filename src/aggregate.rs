use crate::fingerprint::FingerprintKind;
use crate::matcher::{Confidence, MatchOutcome, MatchResult, Matcher, OutcomeKind};
use crate::record::{FingerprintRecord, MalformedRecord, RecordInput};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Application label used for records whose source label could not be recovered.
pub const UNKNOWN_APPLICATION: &str = "<unknown>";

/// Record counts per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub matched: u64,
    pub unmatched: u64,
    pub ambiguous: u64,
    pub invalid: u64,
}

impl OutcomeCounts {
    pub fn add(&mut self, kind: OutcomeKind) {
        let counter = match kind {
            OutcomeKind::Matched => &mut self.matched,
            OutcomeKind::Unmatched => &mut self.unmatched,
            OutcomeKind::Ambiguous => &mut self.ambiguous,
            OutcomeKind::Invalid => &mut self.invalid,
        };
        *counter = counter.saturating_add(1);
    }

    pub fn get(&self, kind: OutcomeKind) -> u64 {
        match kind {
            OutcomeKind::Matched => self.matched,
            OutcomeKind::Unmatched => self.unmatched,
            OutcomeKind::Ambiguous => self.ambiguous,
            OutcomeKind::Invalid => self.invalid,
        }
    }

    pub fn total(&self) -> u64 {
        self.matched
            .saturating_add(self.unmatched)
            .saturating_add(self.ambiguous)
            .saturating_add(self.invalid)
    }

    pub fn merge(&mut self, other: &OutcomeCounts) {
        self.matched = self.matched.saturating_add(other.matched);
        self.unmatched = self.unmatched.saturating_add(other.unmatched);
        self.ambiguous = self.ambiguous.saturating_add(other.ambiguous);
        self.invalid = self.invalid.saturating_add(other.invalid);
    }
}

/// Per-application breakdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationTally {
    pub outcomes: OutcomeCounts,
    /// Matched records whose identity equals the application label.
    pub agreements: u64,
    /// Ambiguous records whose tied identities include the application label.
    pub ambiguous_agreements: u64,
    /// Resolved identity -> records.
    pub identities: BTreeMap<String, u64>,
}

/// Per-identity statistics over matched records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IdentityTally {
    pub records: u64,
    pub exact: u64,
    pub partial: u64,
}

/// An unmatched record kept for operator review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmatchedSample {
    /// Arrival position of the record.
    pub position: u64,
    pub application: String,
    pub kind: FingerprintKind,
    pub fingerprint: String,
}

/// An invalid record kept for operator review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidSample {
    pub position: u64,
    pub application: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FingerprintKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    pub reason: String,
}

/// Streaming fold of match results into summary state.
///
/// The state is a consistent summary of everything recorded so far. All counters are
/// independent of arrival order; only the samples follow it.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    pub(crate) sample_limit: usize,
    pub(crate) total: u64,
    pub(crate) outcomes: OutcomeCounts,
    pub(crate) by_kind: BTreeMap<FingerprintKind, OutcomeCounts>,
    pub(crate) applications: BTreeMap<String, ApplicationTally>,
    pub(crate) identities: BTreeMap<String, IdentityTally>,
    pub(crate) collisions: BTreeMap<Vec<String>, u64>,
    pub(crate) agreements: u64,
    pub(crate) ambiguous_agreements: u64,
    pub(crate) fingerprints: HashSet<(FingerprintKind, String)>,
    pub(crate) found_fingerprints: HashSet<(FingerprintKind, String)>,
    pub(crate) unmatched_samples: Vec<UnmatchedSample>,
    pub(crate) invalid_samples: Vec<InvalidSample>,
}

impl Aggregator {
    pub fn new(sample_limit: usize) -> Self {
        Self { sample_limit, ..Self::default() }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn outcomes(&self) -> OutcomeCounts {
        self.outcomes
    }

    /// Matches one stream input and folds the result in. Malformed inputs count as invalid.
    pub fn ingest(&mut self, matcher: &Matcher<'_>, input: &RecordInput) {
        match input {
            Ok(record) => {
                let result = matcher.match_record(record);
                self.record(record, &result);
            }
            Err(malformed) => self.record_malformed(malformed),
        }
    }

    /// Folds in the result the matcher produced for `record`.
    pub fn record(&mut self, record: &FingerprintRecord, result: &MatchResult<'_>) {
        let position = self.total;
        let kind = result.outcome.kind();
        self.count(&record.application, Some(record.kind), kind);

        if let Some(fingerprint) = &result.fingerprint {
            let key = (fingerprint.kind(), fingerprint.to_string());
            if matches!(kind, OutcomeKind::Matched | OutcomeKind::Ambiguous) {
                self.found_fingerprints.insert(key.clone());
            }
            self.fingerprints.insert(key);
        }

        match &result.outcome {
            MatchOutcome::Matched { identity, confidence, .. } => {
                let tally = self.identities.entry(identity.clone()).or_default();
                tally.records = tally.records.saturating_add(1);
                match confidence {
                    Confidence::Exact => tally.exact = tally.exact.saturating_add(1),
                    Confidence::Partial => tally.partial = tally.partial.saturating_add(1),
                }

                let agrees = identity == &record.application;
                let application =
                    self.applications.entry(record.application.clone()).or_default();
                let seen = application.identities.entry(identity.clone()).or_insert(0);
                *seen = seen.saturating_add(1);
                if agrees {
                    application.agreements = application.agreements.saturating_add(1);
                    self.agreements = self.agreements.saturating_add(1);
                }
            }
            MatchOutcome::Ambiguous { identities, .. } => {
                let mut group = identities.clone();
                group.sort();
                let seen = self.collisions.entry(group).or_insert(0);
                *seen = seen.saturating_add(1);

                if identities.contains(&record.application) {
                    let application =
                        self.applications.entry(record.application.clone()).or_default();
                    application.ambiguous_agreements =
                        application.ambiguous_agreements.saturating_add(1);
                    self.ambiguous_agreements = self.ambiguous_agreements.saturating_add(1);
                }
            }
            MatchOutcome::Unmatched => {
                if self.unmatched_samples.len() < self.sample_limit {
                    self.unmatched_samples.push(UnmatchedSample {
                        position,
                        application: record.application.clone(),
                        kind: record.kind,
                        fingerprint: record.fingerprint.clone(),
                    });
                }
            }
            MatchOutcome::Invalid { reason } => {
                if self.invalid_samples.len() < self.sample_limit {
                    self.invalid_samples.push(InvalidSample {
                        position,
                        application: record.application.clone(),
                        kind: Some(record.kind),
                        fingerprint: Some(record.fingerprint.clone()),
                        reason: reason.clone(),
                    });
                }
            }
        }
    }

    /// Folds in a record that never reached the matcher.
    pub fn record_malformed(&mut self, malformed: &MalformedRecord) {
        let position = self.total;
        let application =
            malformed.application.clone().unwrap_or_else(|| UNKNOWN_APPLICATION.to_string());
        self.count(&application, None, OutcomeKind::Invalid);

        if self.invalid_samples.len() < self.sample_limit {
            self.invalid_samples.push(InvalidSample {
                position,
                application,
                kind: None,
                fingerprint: None,
                reason: malformed.reason.clone(),
            });
        }
    }

    /// Adds the state of a partial aggregator that saw the records following this one's.
    ///
    /// Counters add, tables union. Samples of `other` are shifted past this aggregator's
    /// records and appended, so merging contiguous batches in order reproduces the
    /// sequential samples.
    pub fn merge(&mut self, other: Aggregator) {
        let offset = self.total;
        self.total = self.total.saturating_add(other.total);
        self.outcomes.merge(&other.outcomes);
        self.agreements = self.agreements.saturating_add(other.agreements);
        self.ambiguous_agreements =
            self.ambiguous_agreements.saturating_add(other.ambiguous_agreements);

        for (kind, counts) in other.by_kind {
            self.by_kind.entry(kind).or_default().merge(&counts);
        }

        for (name, tally) in other.applications {
            let mine = self.applications.entry(name).or_default();
            mine.outcomes.merge(&tally.outcomes);
            mine.agreements = mine.agreements.saturating_add(tally.agreements);
            mine.ambiguous_agreements =
                mine.ambiguous_agreements.saturating_add(tally.ambiguous_agreements);
            for (identity, count) in tally.identities {
                let seen = mine.identities.entry(identity).or_insert(0);
                *seen = seen.saturating_add(count);
            }
        }

        for (identity, tally) in other.identities {
            let mine = self.identities.entry(identity).or_default();
            mine.records = mine.records.saturating_add(tally.records);
            mine.exact = mine.exact.saturating_add(tally.exact);
            mine.partial = mine.partial.saturating_add(tally.partial);
        }

        for (group, count) in other.collisions {
            let seen = self.collisions.entry(group).or_insert(0);
            *seen = seen.saturating_add(count);
        }

        self.fingerprints.extend(other.fingerprints);
        self.found_fingerprints.extend(other.found_fingerprints);

        let room = self.sample_limit.saturating_sub(self.unmatched_samples.len());
        self.unmatched_samples.extend(other.unmatched_samples.into_iter().take(room).map(
            |mut sample| {
                sample.position = sample.position.saturating_add(offset);
                sample
            },
        ));

        let room = self.sample_limit.saturating_sub(self.invalid_samples.len());
        self.invalid_samples.extend(other.invalid_samples.into_iter().take(room).map(
            |mut sample| {
                sample.position = sample.position.saturating_add(offset);
                sample
            },
        ));
    }

    fn count(&mut self, application: &str, kind: Option<FingerprintKind>, outcome: OutcomeKind) {
        self.total = self.total.saturating_add(1);
        self.outcomes.add(outcome);
        if let Some(kind) = kind {
            self.by_kind.entry(kind).or_default().add(outcome);
        }
        self.application_mut(application).outcomes.add(outcome);
    }

    fn application_mut(&mut self, application: &str) -> &mut ApplicationTally {
        self.applications.entry(application.to_string()).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_without_label_goes_to_unknown_application() {
        let mut aggregator = Aggregator::new(5);
        aggregator.record_malformed(&MalformedRecord {
            index: 0,
            application: None,
            reason: "missing field `kind`".to_string(),
        });

        assert_eq!(aggregator.total(), 1);
        assert_eq!(aggregator.outcomes().invalid, 1);
        assert_eq!(aggregator.applications[UNKNOWN_APPLICATION].outcomes.invalid, 1);
        assert_eq!(aggregator.invalid_samples.len(), 1);
    }

    #[test]
    fn test_sample_limit_zero_keeps_nothing() {
        let mut aggregator = Aggregator::new(0);
        aggregator.record_malformed(&MalformedRecord {
            index: 0,
            application: Some("Slack".to_string()),
            reason: "bad".to_string(),
        });
        assert!(aggregator.invalid_samples.is_empty());
        assert_eq!(aggregator.outcomes().invalid, 1);
    }
}

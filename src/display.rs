use core::fmt;

use crate::fingerprint::{
    Fingerprint, FingerprintKind, Pattern, Segment, COMPONENT_DELIMITER, SEGMENT_DELIMITER,
    WILDCARD,
};
use crate::matcher::{Confidence, MatchOutcome, OutcomeKind};
use crate::report::SummaryReport;

impl fmt::Display for FingerprintKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Writes `segments` in the layout of `kind`: `_` inside a component, `|` between
/// components. A component whose segments are all absent is written empty.
fn write_components<T: fmt::Display>(
    f: &mut fmt::Formatter,
    kind: FingerprintKind,
    segments: &[T],
    is_absent: fn(&T) -> bool,
) -> fmt::Result {
    let mut rest = segments;
    for (i, component) in kind.components().iter().enumerate() {
        if i > 0 {
            write!(f, "{COMPONENT_DELIMITER}")?;
        }
        let (part, tail) = rest.split_at(component.segment_count().min(rest.len()));
        rest = tail;
        if part.iter().all(is_absent) {
            continue;
        }
        for (j, segment) in part.iter().enumerate() {
            if j > 0 {
                write!(f, "{SEGMENT_DELIMITER}")?;
            }
            write!(f, "{segment}")?;
        }
    }
    Ok(())
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_components(f, self.kind(), self.segments(), |segment: &String| {
            segment.is_empty()
        })
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Segment::Wildcard => f.write_str(WILDCARD),
            Segment::Literal(value) => f.write_str(value),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_components(f, self.kind(), self.segments(), |_: &Segment| false)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Confidence::Exact => "exact",
            Confidence::Partial => "partial",
        })
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            OutcomeKind::Matched => "matched",
            OutcomeKind::Unmatched => "unmatched",
            OutcomeKind::Ambiguous => "ambiguous",
            OutcomeKind::Invalid => "invalid",
        })
    }
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MatchOutcome::Matched { identity, confidence, specificity } => {
                write!(f, "matched {identity} ({confidence}, specificity {specificity})")
            }
            MatchOutcome::Ambiguous { identities, specificity } => {
                write!(f, "ambiguous [{}] (specificity {specificity})", identities.join(", "))
            }
            MatchOutcome::Unmatched => f.write_str("unmatched"),
            MatchOutcome::Invalid { reason } => write!(f, "invalid: {reason}"),
        }
    }
}

impl fmt::Display for SummaryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            ".-[ ja4+ correlation summary ]-\n\
            |\n\
            | records     = {}\n\
            | matched     = {}\n\
            | ambiguous   = {}\n\
            | unmatched   = {}\n\
            | invalid     = {}\n\
            | agreements  = {} ({} more among ambiguous)\n\
            | distinct    = {} ({} with a database match)\n",
            self.total_records,
            self.outcomes.matched,
            self.outcomes.ambiguous,
            self.outcomes.unmatched,
            self.outcomes.invalid,
            self.agreements,
            self.ambiguous_agreements,
            self.distinct_fingerprints,
            self.distinct_matched_fingerprints,
        )?;

        if !self.by_kind.is_empty() {
            writeln!(f, "|\n| by kind:")?;
            for (kind, counts) in &self.by_kind {
                writeln!(
                    f,
                    "|   {kind:<7} matched={} ambiguous={} unmatched={} invalid={}",
                    counts.matched, counts.ambiguous, counts.unmatched, counts.invalid
                )?;
            }
        }

        for app in &self.applications {
            writeln!(f, "|\n| app = {}", app.application)?;
            writeln!(
                f,
                "|   records={} matched={} ambiguous={} unmatched={} invalid={} agreements={} ambiguous_agreements={}",
                app.records,
                app.outcomes.matched,
                app.outcomes.ambiguous,
                app.outcomes.unmatched,
                app.outcomes.invalid,
                app.agreements,
                app.ambiguous_agreements
            )?;
            for identity in &app.identities {
                writeln!(f, "|   -> {} x{}", identity.identity, identity.records)?;
            }
        }

        if !self.identities.is_empty() {
            writeln!(f, "|\n| identities:")?;
            for identity in &self.identities {
                writeln!(
                    f,
                    "|   {:>3}. {} x{} (exact={}, partial={})",
                    identity.rank, identity.identity, identity.records, identity.exact, identity.partial
                )?;
            }
        }

        if !self.collisions.is_empty() {
            writeln!(f, "|\n| collisions:")?;
            for group in &self.collisions {
                writeln!(f, "|   [{}] x{}", group.identities.join(", "), group.records)?;
            }
        }

        if !self.unmatched_samples.is_empty() {
            writeln!(f, "|\n| unmatched samples:")?;
            for sample in &self.unmatched_samples {
                writeln!(
                    f,
                    "|   #{} {} {} ({})",
                    sample.position, sample.kind, sample.fingerprint, sample.application
                )?;
            }
        }

        if !self.invalid_samples.is_empty() {
            writeln!(f, "|\n| invalid samples:")?;
            for sample in &self.invalid_samples {
                writeln!(f, "|   #{} {}: {}", sample.position, sample.application, sample.reason)?;
            }
        }

        write!(f, "`----")
    }
}

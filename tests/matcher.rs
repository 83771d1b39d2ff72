use ja4_correlate::{
    Confidence, FingerprintKind, FingerprintRecord, MatchOutcome, Matcher, OutcomeKind,
    ReferenceDatabase,
};
use proptest::prelude::*;

const DATABASE: &str = r#"[
    {"kind":"ja4","pattern":"t13d1516h2_8daaf6152771_e5627efa2ab1","identity":"ChromeDesktop"},
    {"kind":"ja4","pattern":"t13d1516h2_8daaf6152771_*","identity":"ChromeFamily"},
    {"kind":"ja4","pattern":"t13d1516h2_*_*","identity":"LibA"},
    {"kind":"ja4","pattern":"t13d1516h2_*_*","identity":"LibB"},
    {"kind":"ja4","pattern":"t13d1715h2_*_*","identity":"Curl"},
    {"kind":"ja4","pattern":"*_5b57614c22b0_*","identity":"Curl"},
    {"kind":"ja4s","pattern":"t130200_1301_a56c5b993250","identity":"Sliver"},
    {"kind":"ja4t","pattern":"1024_2_1460_*","identity":"Nmap"}
]"#;

fn database() -> ReferenceDatabase {
    ReferenceDatabase::load(DATABASE.as_bytes())
        .unwrap_or_else(|e| panic!("Failed to load reference database: {e}"))
}

fn record(kind: FingerprintKind, fingerprint: &str) -> FingerprintRecord {
    FingerprintRecord::new(kind, fingerprint, "capture")
}

#[test]
fn test_exact_match() {
    let db = database();
    let result = Matcher::new(&db)
        .match_record(&record(FingerprintKind::Ja4S, "t130200_1301_a56c5b993250"));
    assert_eq!(
        result.outcome,
        MatchOutcome::Matched {
            identity: "Sliver".to_string(),
            confidence: Confidence::Exact,
            specificity: 3,
        }
    );
    assert_eq!(result.outcome.kind(), OutcomeKind::Matched);
    assert!(result.fingerprint.is_some());
}

#[test]
fn test_most_specific_wins() {
    let db = database();
    let matcher = Matcher::new(&db);

    let exact = matcher
        .match_record(&record(FingerprintKind::Ja4, "t13d1516h2_8daaf6152771_e5627efa2ab1"));
    assert_eq!(exact.candidates.len(), 1);
    assert_eq!(exact.candidates[0].entry.identity.label, "ChromeDesktop");

    let family = matcher
        .match_record(&record(FingerprintKind::Ja4, "t13d1516h2_8daaf6152771_aaaaaaaaaaaa"));
    assert_eq!(
        family.outcome,
        MatchOutcome::Matched {
            identity: "ChromeFamily".to_string(),
            confidence: Confidence::Partial,
            specificity: 2,
        }
    );
}

#[test]
fn test_tie_between_identities_is_ambiguous() {
    let db = database();
    let result = Matcher::new(&db)
        .match_record(&record(FingerprintKind::Ja4, "t13d1516h2_000000000000_111111111111"));
    assert_eq!(
        result.outcome,
        MatchOutcome::Ambiguous {
            identities: vec!["LibA".to_string(), "LibB".to_string()],
            specificity: 1,
        }
    );
    assert!(result.candidates.iter().all(|c| c.specificity == 1));
}

#[test]
fn test_tie_within_one_identity_is_matched() {
    let db = database();
    let result = Matcher::new(&db)
        .match_record(&record(FingerprintKind::Ja4, "t13d1715h2_5b57614c22b0_3d5424432f57"));
    assert_eq!(result.candidates.len(), 2);
    assert_eq!(
        result.outcome,
        MatchOutcome::Matched {
            identity: "Curl".to_string(),
            confidence: Confidence::Partial,
            specificity: 1,
        }
    );
}

#[test]
fn test_unmatched() {
    let db = database();
    let matcher = Matcher::new(&db);

    let result =
        matcher.match_record(&record(FingerprintKind::Ja4, "q13d0310h3_55b375c5d22e_cd85d2d88918"));
    assert_eq!(result.outcome, MatchOutcome::Unmatched);
    assert!(result.candidates.is_empty());

    // a pattern of another kind never matches
    let other_kind =
        matcher.match_record(&record(FingerprintKind::Ja4TS, "1024_2_1460_00"));
    assert_eq!(other_kind.outcome, MatchOutcome::Unmatched);
}

#[test]
fn test_invalid_records() {
    let db = database();
    let matcher = Matcher::new(&db);

    for (kind, raw) in [
        (FingerprintKind::Ja4, "t13d1516h2_8daaf6152771"),
        (FingerprintKind::Ja4, ""),
        (FingerprintKind::Ja4, "t13d1516h2_*_*"),
        (FingerprintKind::Ja4T, "1024_2_1460"),
        (FingerprintKind::Ja4H, "ge11cn20enus__ac95b44401d9_8df6a44f726c"),
    ] {
        let result = matcher.match_record(&record(kind, raw));
        assert_eq!(result.outcome.kind(), OutcomeKind::Invalid, "{kind} `{raw}`");
        assert!(result.fingerprint.is_none());
        assert!(result.candidates.is_empty());
    }
}

#[test]
fn test_outcome_display() {
    let db = database();
    let result = Matcher::new(&db)
        .match_record(&record(FingerprintKind::Ja4T, "1024_2_1460_00"));
    assert_eq!(result.outcome.to_string(), "matched Nmap (partial, specificity 3)");
}

fn observed() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("t13d1516h2".to_string()),
        Just("t13d1715h2".to_string()),
        "[a-z0-9]{10}",
    ]
    .prop_flat_map(|first| {
        (
            Just(first),
            prop_oneof![Just("8daaf6152771".to_string()), Just("5b57614c22b0".to_string()), "[a-f0-9]{12}"],
            prop_oneof![Just("e5627efa2ab1".to_string()), "[a-f0-9]{12}"],
        )
    })
    .prop_map(|(a, b, c)| format!("{a}_{b}_{c}"))
}

proptest! {
    #[test]
    fn prop_matching_is_deterministic(fp in observed()) {
        let db = database();
        let matcher = Matcher::new(&db);
        let r = record(FingerprintKind::Ja4, &fp);
        prop_assert_eq!(matcher.match_record(&r).outcome, matcher.match_record(&r).outcome);
    }

    #[test]
    fn prop_only_the_top_tier_is_kept(fp in observed()) {
        let db = database();
        let result = Matcher::new(&db).match_record(&record(FingerprintKind::Ja4, &fp));
        let Some(parsed) = result.fingerprint.as_ref() else {
            return Err(TestCaseError::fail("observed fingerprints are well formed"));
        };

        let best = db
            .entries()
            .iter()
            .filter(|entry| entry.pattern.matches(parsed))
            .map(|entry| entry.specificity())
            .max();

        match (&result.outcome, best) {
            (MatchOutcome::Unmatched, None) => {}
            (MatchOutcome::Matched { specificity, .. }, Some(best))
            | (MatchOutcome::Ambiguous { specificity, .. }, Some(best)) => {
                prop_assert_eq!(*specificity, best);
                prop_assert!(result.candidates.iter().all(|c| c.specificity == best));
            }
            (outcome, best) => {
                return Err(TestCaseError::fail(format!("{outcome} with best specificity {best:?}")));
            }
        }
    }
}

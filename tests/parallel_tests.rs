use ja4_correlate::parallel::correlate_batches;
use ja4_correlate::source::{from_records, CaptureLinesSource};
use ja4_correlate::{
    Aggregator, CorrelatorConfig, FingerprintKind, FingerprintRecord, Ja4CorrelateError,
    Ja4Correlator, MalformedRecord, Matcher, RecordInput, ReferenceDatabase,
};
use std::io::Cursor;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

fn database() -> ReferenceDatabase {
    ReferenceDatabase::load(
        r#"[
            {"kind":"ja4","pattern":"t13d1516h2_8daaf6152771_*","identity":"Chrome"},
            {"kind":"ja4","pattern":"t13d1715h2_*_*","identity":"LibA"},
            {"kind":"ja4","pattern":"t13d1715h2_*_*","identity":"LibB"},
            {"kind":"ja4s","pattern":"t130200_1301_*","identity":"Slack"}
        ]"#
        .as_bytes(),
    )
    .unwrap_or_else(|e| panic!("Failed to load reference database: {e}"))
}

fn workload(size: usize) -> Vec<RecordInput> {
    (0..size)
        .map(|i| match i % 6 {
            0 => Ok(FingerprintRecord::new(
                FingerprintKind::Ja4,
                format!("t13d1516h2_8daaf6152771_{i:012x}"),
                "Chrome",
            )),
            1 => Ok(FingerprintRecord::new(
                FingerprintKind::Ja4,
                format!("t13d1715h2_{i:012x}_000000000000"),
                "curl",
            )),
            2 => Ok(FingerprintRecord::new(
                FingerprintKind::Ja4S,
                format!("t130200_1301_{i:012x}"),
                "Slack",
            )),
            3 => Ok(FingerprintRecord::new(
                FingerprintKind::Ja4,
                format!("q13d0310h3_{i:012x}_cd85d2d88918"),
                "Teams",
            )),
            4 => Ok(FingerprintRecord::new(FingerprintKind::Ja4T, "1024_2", "Teams")),
            _ => Err(MalformedRecord {
                index: i,
                application: None,
                reason: "missing field `kind`".to_string(),
            }),
        })
        .collect()
}

fn sequential(db: &ReferenceDatabase, inputs: &[RecordInput], sample_limit: usize) -> Aggregator {
    let matcher = Matcher::new(db);
    let mut aggregator = Aggregator::new(sample_limit);
    for input in inputs {
        aggregator.ingest(&matcher, input);
    }
    aggregator
}

#[test]
fn test_parallel_equals_sequential() {
    let db = database();
    let inputs = workload(250);
    let expected = sequential(&db, &inputs, 8).report();

    for workers in [1, 2, 3, 4, 7, 16] {
        let aggregator = correlate_batches(&db, &inputs, workers, 8)
            .unwrap_or_else(|e| panic!("{workers} workers: {e}"));
        assert_eq!(aggregator.report(), expected, "{workers} workers");
    }
}

#[test]
fn test_more_workers_than_records() {
    let db = database();
    let inputs = workload(3);
    let aggregator = correlate_batches(&db, &inputs, 8, 10).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(aggregator.report(), sequential(&db, &inputs, 10).report());
}

#[test]
fn test_empty_input() {
    let db = database();
    let aggregator = correlate_batches(&db, &[], 4, 10).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(aggregator.total(), 0);
}

#[test]
fn test_zero_workers_is_misconfiguration() {
    let db = database();
    let result = correlate_batches(&db, &workload(4), 0, 10);
    assert!(matches!(result, Err(Ja4CorrelateError::Misconfiguration(_))));

    let correlator =
        Ja4Correlator::new(Arc::new(database()), CorrelatorConfig::default().with_workers(0));
    assert!(matches!(correlator, Err(Ja4CorrelateError::Misconfiguration(_))));
}

#[test]
fn test_correlator_worker_count_does_not_change_report() {
    let db = Arc::new(database());
    let lines = concat!(
        r#"{"application":"Chrome","ja4":"t13d1516h2_8daaf6152771_02713d6af862","ja4s":"-"}"#,
        "\n",
        r#"{"application":"Slack","ja4":"t13d1715h2_5b57614c22b0_3d5424432f57","ja4s":"t130200_1301_a56c5b993250","ja4t":"(empty)"}"#,
        "\n",
        "{broken\n",
        r#"{"application":"Zoom","ja4":"t13d1516h2_8daaf6152771","sni":"zoom.us"}"#,
        "\n",
    );

    let single = Ja4Correlator::new(Arc::clone(&db), CorrelatorConfig::default())
        .unwrap_or_else(|e| panic!("{e}"))
        .correlate(&mut CaptureLinesSource::new(Cursor::new(lines)))
        .unwrap_or_else(|e| panic!("{e}"));
    let pooled = Ja4Correlator::new(Arc::clone(&db), CorrelatorConfig::default().with_workers(3))
        .unwrap_or_else(|e| panic!("{e}"))
        .correlate(&mut CaptureLinesSource::new(Cursor::new(lines)))
        .unwrap_or_else(|e| panic!("{e}"));

    assert_eq!(single, pooled);
    assert_eq!(single.total_records, 5);
    assert_eq!(single.outcomes.matched, 2);
    assert_eq!(single.outcomes.ambiguous, 1);
    assert_eq!(single.outcomes.invalid, 2);
    assert_eq!(single.agreements, 2);
}

#[test]
fn test_cancelled_run_reports_nothing() {
    let correlator = Ja4Correlator::new(Arc::new(database()), CorrelatorConfig::default())
        .unwrap_or_else(|e| panic!("{e}"));
    let records = vec![FingerprintRecord::new(
        FingerprintKind::Ja4,
        "t13d1516h2_8daaf6152771_02713d6af862",
        "Chrome",
    )];

    let report = correlator
        .correlate_with_cancel(&mut from_records(records), Some(Arc::new(AtomicBool::new(true))))
        .unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(report.total_records, 0);
}

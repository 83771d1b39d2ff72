use crate::config::CorrelationMode;
use crate::fingerprint::{FingerprintKind, COMPONENT_DELIMITER};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One observed fingerprint tied to the application or capture session that produced it.
///
/// The fingerprint string is kept as observed; segment validation belongs to the matcher,
/// which reports a layout violation as an `Invalid` outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FingerprintRecord {
    pub kind: FingerprintKind,
    pub fingerprint: String,
    #[serde(alias = "source")]
    pub application: String,
}

impl FingerprintRecord {
    pub fn new(
        kind: FingerprintKind,
        fingerprint: impl Into<String>,
        application: impl Into<String>,
    ) -> Self {
        Self { kind, fingerprint: fingerprint.into(), application: application.into() }
    }
}

/// A record that could not be decoded from its source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedRecord {
    /// Position of the record in the source, counted from zero.
    pub index: usize,
    /// Source label, when it could still be recovered from the broken record.
    pub application: Option<String>,
    pub reason: String,
}

/// What a fingerprint source yields for each position of its stream.
pub type RecordInput = Result<FingerprintRecord, MalformedRecord>;

/// Decodes one element of a record document, keeping whatever application label it carries
/// so that per-application invalid counts stay accurate.
pub fn decode_record(index: usize, value: Value) -> RecordInput {
    let application = value
        .get("application")
        .or_else(|| value.get("source"))
        .and_then(Value::as_str)
        .map(str::to_string);

    serde_json::from_value::<FingerprintRecord>(value)
        .map_err(|e| MalformedRecord { index, application, reason: e.to_string() })
}

/// One connection as emitted by the Zeek log conversion step: an application label plus
/// every JA4+ fingerprint observed for that connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CaptureLine {
    pub application: String,
    #[serde(default)]
    pub ja4: Option<String>,
    #[serde(default)]
    pub ja4s: Option<String>,
    #[serde(default)]
    pub ja4h: Option<String>,
    #[serde(default)]
    pub ja4x: Option<String>,
    #[serde(default)]
    pub ja4t: Option<String>,
    #[serde(default)]
    pub ja4ts: Option<String>,
    #[serde(default)]
    pub ja4ssh: Option<String>,
}

/// Zeek writes `-` for unset fields and `(empty)` for empty containers.
fn present(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "-" && *v != "(empty)")
}

impl CaptureLine {
    /// Expands the line into records as `mode` asks: one per present fingerprint, or one
    /// combined key for the whole connection. A line without any fingerprint the mode
    /// uses yields nothing.
    pub fn into_records(self, mode: CorrelationMode) -> Vec<FingerprintRecord> {
        match mode {
            CorrelationMode::PerKind => self.per_kind(),
            CorrelationMode::Ja4Only => self.combined(FingerprintKind::Ja4, &[present(&self.ja4)]),
            CorrelationMode::Ja4Ja4S => self.combined(
                FingerprintKind::Ja4Ja4S,
                &[present(&self.ja4), present(&self.ja4s)],
            ),
            CorrelationMode::Ja4Ja4STs => self.combined(
                FingerprintKind::Ja4Ja4STs,
                &[
                    present(&self.ja4),
                    present(&self.ja4s),
                    present(&self.ja4ts).or_else(|| present(&self.ja4t)),
                ],
            ),
        }
    }

    fn per_kind(&self) -> Vec<FingerprintRecord> {
        let fields = [
            (FingerprintKind::Ja4, &self.ja4),
            (FingerprintKind::Ja4S, &self.ja4s),
            (FingerprintKind::Ja4H, &self.ja4h),
            (FingerprintKind::Ja4X, &self.ja4x),
            (FingerprintKind::Ja4T, &self.ja4t),
            (FingerprintKind::Ja4TS, &self.ja4ts),
            (FingerprintKind::Ja4Ssh, &self.ja4ssh),
        ];

        fields
            .iter()
            .filter_map(|(kind, value)| {
                present(value)
                    .map(|fp| FingerprintRecord::new(*kind, fp, self.application.as_str()))
            })
            .collect()
    }

    /// Joins `parts` into one key of `kind`, leaving absent components empty.
    fn combined(&self, kind: FingerprintKind, parts: &[Option<&str>]) -> Vec<FingerprintRecord> {
        if parts.iter().all(Option::is_none) {
            return Vec::new();
        }
        let key = parts
            .iter()
            .map(|part| part.unwrap_or_default())
            .collect::<Vec<_>>()
            .join(COMPONENT_DELIMITER.to_string().as_str());
        vec![FingerprintRecord::new(kind, key, self.application.as_str())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_keeps_application_of_broken_record() {
        let result = decode_record(3, json!({"application": "Slack", "fingerprint": 7}));
        let err = result.unwrap_err();
        assert_eq!(err.index, 3);
        assert_eq!(err.application.as_deref(), Some("Slack"));
    }

    #[test]
    fn test_capture_line_skips_zeek_placeholders() {
        let line = CaptureLine {
            application: "Outlook".to_string(),
            ja4: Some("t13d1516h2_8daaf6152771_e5627efa2ab1".to_string()),
            ja4s: Some("-".to_string()),
            ja4t: Some("(empty)".to_string()),
            ja4ts: Some("14600_2-4-8-1-3_1460_3".to_string()),
            ..CaptureLine::default()
        };

        let records = line.into_records(CorrelationMode::PerKind);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, FingerprintKind::Ja4);
        assert_eq!(records[1].kind, FingerprintKind::Ja4TS);
        assert!(records.iter().all(|r| r.application == "Outlook"));
    }

    #[test]
    fn test_capture_line_ignores_connection_columns() {
        let line: CaptureLine = serde_json::from_str(
            r#"{"uid":"CHhAvVGS1DHFjwGM9","sni":"zoom.us","application":"Zoom","ja4":"t13d1516h2_8daaf6152771_e5627efa2ab1"}"#,
        )
        .unwrap();
        assert_eq!(line.application, "Zoom");
        assert_eq!(line.into_records(CorrelationMode::PerKind).len(), 1);
    }

    #[test]
    fn test_capture_line_combined_keys() {
        let line = CaptureLine {
            application: "Teams".to_string(),
            ja4: Some("t13d1516h2_8daaf6152771_e5627efa2ab1".to_string()),
            ja4s: Some("-".to_string()),
            ja4t: Some("1024_2_1460_00".to_string()),
            ..CaptureLine::default()
        };

        let pair = line.clone().into_records(CorrelationMode::Ja4Ja4S);
        assert_eq!(pair.len(), 1);
        assert_eq!(pair[0].kind, FingerprintKind::Ja4Ja4S);
        assert_eq!(pair[0].fingerprint, "t13d1516h2_8daaf6152771_e5627efa2ab1|");

        // ja4t stands in for the missing ja4ts
        let triple = line.clone().into_records(CorrelationMode::Ja4Ja4STs);
        assert_eq!(triple[0].fingerprint, "t13d1516h2_8daaf6152771_e5627efa2ab1||1024_2_1460_00");

        let only = line.into_records(CorrelationMode::Ja4Only);
        assert_eq!(only[0].kind, FingerprintKind::Ja4);
        assert_eq!(only[0].fingerprint, "t13d1516h2_8daaf6152771_e5627efa2ab1");

        let bare = CaptureLine { application: "Zoom".to_string(), ..CaptureLine::default() };
        assert!(bare.into_records(CorrelationMode::Ja4Ja4S).is_empty());
    }

    #[test]
    fn test_kind_names_are_case_insensitive() {
        let record = decode_record(
            0,
            json!({"kind": "JA4S", "fingerprint": "t130200_1301_a56c5b993250", "application": "Slack"}),
        )
        .unwrap();
        assert_eq!(record.kind, FingerprintKind::Ja4S);
    }
}

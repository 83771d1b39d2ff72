use crate::config::DatabaseFormat;
use crate::error::Ja4CorrelateError;
use crate::fingerprint::{Fingerprint, FingerprintKind, Pattern, Segment, COMPONENT_DELIMITER};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{debug, info};

/// Who a reference pattern identifies: an application, device or library, with optional
/// descriptive fields carried over from the database row.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Identity {
    /// Label the correlator reports and ranks by.
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
}

impl Identity {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), ..Self::default() }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// A reference pattern and the identity it maps to. Immutable once loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseEntry {
    /// Position in load order; ties between equally specific matches are broken by it.
    pub id: usize,
    pub pattern: Pattern,
    pub identity: Identity,
}

impl DatabaseEntry {
    pub fn kind(&self) -> FingerprintKind {
        self.pattern.kind()
    }

    pub fn specificity(&self) -> usize {
        self.pattern.specificity()
    }
}

/// Lookup structure for the entries of one fingerprint kind.
///
/// For each segment position: literal value -> ids, and the ids holding a wildcard there.
/// An entry is in exactly one of the two at every position.
#[derive(Debug, Default)]
struct KindIndex {
    literals: Vec<HashMap<String, Vec<usize>>>,
    wildcards: Vec<Vec<usize>>,
}

impl KindIndex {
    fn new(segment_count: usize) -> Self {
        Self {
            literals: vec![HashMap::new(); segment_count],
            wildcards: vec![Vec::new(); segment_count],
        }
    }

    fn insert(&mut self, id: usize, pattern: &Pattern) {
        for (position, segment) in pattern.segments().iter().enumerate() {
            match segment {
                Segment::Wildcard => self.wildcards[position].push(id),
                Segment::Literal(value) => {
                    self.literals[position].entry(value.clone()).or_default().push(id)
                }
            }
        }
    }

    /// Ids that can match `fingerprint` at the most selective position.
    fn narrowest(&self, fingerprint: &Fingerprint) -> Vec<usize> {
        let mut best: Option<(&[usize], &[usize])> = None;
        for (position, value) in fingerprint.segments().iter().enumerate() {
            let (Some(literals), Some(wildcards)) =
                (self.literals.get(position), self.wildcards.get(position))
            else {
                return Vec::new();
            };
            let literal_ids = literals.get(value).map(Vec::as_slice).unwrap_or(&[]);
            let size = literal_ids.len().saturating_add(wildcards.len());
            if best.map_or(true, |(l, w)| size < l.len().saturating_add(w.len())) {
                best = Some((literal_ids, wildcards.as_slice()));
            }
            if size == 0 {
                break;
            }
        }

        best.map(|(literal_ids, wildcard_ids)| {
            literal_ids.iter().chain(wildcard_ids.iter()).copied().collect()
        })
        .unwrap_or_default()
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEntry {
    #[serde(default)]
    kind: FingerprintKind,
    pattern: String,
    identity: String,
    #[serde(default)]
    note: Option<String>,
}

/// Row of the FoxIO `ja4+_db.json` document. Unknown columns are ignored.
#[derive(Deserialize)]
struct FoxIoRow {
    #[serde(default)]
    application: Option<String>,
    #[serde(default)]
    library: Option<String>,
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    os: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    ja4_fingerprint: Option<String>,
    #[serde(default)]
    ja4s_fingerprint: Option<String>,
    #[serde(default)]
    ja4h_fingerprint: Option<String>,
    #[serde(default)]
    ja4x_fingerprint: Option<String>,
    #[serde(default)]
    ja4t_fingerprint: Option<String>,
    #[serde(default)]
    ja4ts_fingerprint: Option<String>,
    #[serde(default)]
    ja4ssh_fingerprint: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

impl FoxIoRow {
    fn fingerprints(&self) -> Vec<(FingerprintKind, String)> {
        [
            (FingerprintKind::Ja4, &self.ja4_fingerprint),
            (FingerprintKind::Ja4S, &self.ja4s_fingerprint),
            (FingerprintKind::Ja4H, &self.ja4h_fingerprint),
            (FingerprintKind::Ja4X, &self.ja4x_fingerprint),
            (FingerprintKind::Ja4T, &self.ja4t_fingerprint),
            (FingerprintKind::Ja4TS, &self.ja4ts_fingerprint),
            (FingerprintKind::Ja4Ssh, &self.ja4ssh_fingerprint),
        ]
        .into_iter()
        .filter_map(|(kind, value)| non_blank(value).map(|fp| (kind, fp)))
        .collect()
    }

    /// Combined keys for the row; absent components become all-wildcard components.
    fn combined(&self) -> Vec<(FingerprintKind, String)> {
        let ja4 = non_blank(&self.ja4_fingerprint);
        let ja4s = non_blank(&self.ja4s_fingerprint);
        let tcp = non_blank(&self.ja4ts_fingerprint).or_else(|| non_blank(&self.ja4t_fingerprint));

        let delimiter = COMPONENT_DELIMITER.to_string();
        let mut keys = Vec::new();
        for (kind, parts) in [
            (FingerprintKind::Ja4Ja4S, vec![&ja4, &ja4s]),
            (FingerprintKind::Ja4Ja4STs, vec![&ja4, &ja4s, &tcp]),
        ] {
            if parts.iter().any(|part| part.is_some()) {
                let parts: Vec<&str> =
                    parts.iter().map(|part| part.as_deref().unwrap_or_default()).collect();
                keys.push((kind, parts.join(delimiter.as_str())));
            }
        }
        keys
    }

    fn identity(&self) -> Option<Identity> {
        let application = non_blank(&self.application);
        let library = non_blank(&self.library);
        let device = non_blank(&self.device);
        let os = non_blank(&self.os);
        let label = application.clone().or(library.clone()).or(device.clone()).or(os.clone())?;

        Some(Identity { label, note: non_blank(&self.notes), application, library, device, os })
    }
}

/// The JA4+ reference database: entries in load order plus a per-kind segment index.
///
/// Built once and read-only afterwards, so it can be shared between worker threads
/// without locking.
#[derive(Debug, Default)]
pub struct ReferenceDatabase {
    entries: Vec<DatabaseEntry>,
    index: HashMap<FingerprintKind, KindIndex>,
}

impl ReferenceDatabase {
    /// Loads a document in the default `entries` format.
    pub fn load<R: Read>(reader: R) -> Result<Self, Ja4CorrelateError> {
        Self::load_with_format(reader, DatabaseFormat::Entries)
    }

    /// Loads a document in the given format. Any entry that fails to decode or to parse
    /// aborts the whole load.
    pub fn load_with_format<R: Read>(
        reader: R,
        format: DatabaseFormat,
    ) -> Result<Self, Ja4CorrelateError> {
        let rows: Vec<Value> = serde_json::from_reader(reader)
            .map_err(|e| Ja4CorrelateError::malformed_document(e.to_string()))?;

        let pairs = match format {
            DatabaseFormat::Entries => Self::decode_entries(rows)?,
            DatabaseFormat::FoxIo => Self::decode_foxio_rows(rows)?,
        };

        let database = Self::from_entries(pairs);
        info!(
            "Loaded {} JA4+ reference entries ({})",
            database.len(),
            database
                .count_by_kind()
                .iter()
                .map(|(kind, count)| format!("{kind}={count}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(database)
    }

    /// Opens and loads a database file.
    pub fn load_from_path<P: AsRef<Path>>(
        path: P,
        format: DatabaseFormat,
    ) -> Result<Self, Ja4CorrelateError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            Ja4CorrelateError::malformed_document(format!("cannot read {}: {e}", path.display()))
        })?;
        debug!("Loading reference database from {}", path.display());
        Self::load_with_format(BufReader::new(file), format)
    }

    /// Builds the database from already parsed patterns, keeping their order.
    pub fn from_entries(pairs: Vec<(Pattern, Identity)>) -> Self {
        let mut index: HashMap<FingerprintKind, KindIndex> = HashMap::new();
        let entries: Vec<DatabaseEntry> = pairs
            .into_iter()
            .enumerate()
            .map(|(id, (pattern, identity))| {
                index
                    .entry(pattern.kind())
                    .or_insert_with(|| KindIndex::new(pattern.kind().segment_count()))
                    .insert(id, &pattern);
                DatabaseEntry { id, pattern, identity }
            })
            .collect();

        Self { entries, index }
    }

    fn decode_entries(rows: Vec<Value>) -> Result<Vec<(Pattern, Identity)>, Ja4CorrelateError> {
        rows.into_iter()
            .enumerate()
            .map(|(position, row)| {
                let raw: RawEntry = serde_json::from_value(row)
                    .map_err(|e| Ja4CorrelateError::malformed_entry(position, e.to_string()))?;
                let pattern = Pattern::parse(raw.kind, &raw.pattern)
                    .map_err(|e| Ja4CorrelateError::malformed_entry(position, e.to_string()))?;
                let label = raw.identity.trim();
                if label.is_empty() {
                    return Err(Ja4CorrelateError::malformed_entry(position, "empty identity"));
                }

                let mut identity = Identity::new(label);
                identity.note = non_blank(&raw.note);
                Ok((pattern, identity))
            })
            .collect()
    }

    fn decode_foxio_rows(
        rows: Vec<Value>,
    ) -> Result<Vec<(Pattern, Identity)>, Ja4CorrelateError> {
        let mut pairs = Vec::new();
        let mut skipped = 0usize;

        for (position, row) in rows.into_iter().enumerate() {
            let row: FoxIoRow = serde_json::from_value(row)
                .map_err(|e| Ja4CorrelateError::malformed_entry(position, e.to_string()))?;

            let fingerprints = row.fingerprints();
            if fingerprints.is_empty() {
                skipped = skipped.saturating_add(1);
                continue;
            }

            let identity = row.identity().ok_or_else(|| {
                Ja4CorrelateError::malformed_entry(
                    position,
                    "row has fingerprints but no application, library, device or os",
                )
            })?;

            for (kind, raw) in fingerprints.into_iter().chain(row.combined()) {
                let pattern = Pattern::parse(kind, &raw)
                    .map_err(|e| Ja4CorrelateError::malformed_entry(position, e.to_string()))?;
                pairs.push((pattern, identity.clone()));
            }
        }

        debug!("Skipped {} FoxIO rows without any fingerprint", skipped);
        Ok(pairs)
    }

    /// Every entry whose pattern matches `fingerprint`, most specific first, ties in
    /// database order.
    pub fn candidates(&self, fingerprint: &Fingerprint) -> Vec<&DatabaseEntry> {
        let Some(index) = self.index.get(&fingerprint.kind()) else {
            return Vec::new();
        };

        let mut found: Vec<&DatabaseEntry> = index
            .narrowest(fingerprint)
            .into_iter()
            .filter_map(|id| self.entries.get(id))
            .filter(|entry| entry.pattern.matches(fingerprint))
            .collect();

        found.sort_by_key(|entry| (Reverse(entry.specificity()), entry.id));
        found
    }

    pub fn entries(&self) -> &[DatabaseEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count_by_kind(&self) -> BTreeMap<FingerprintKind, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.kind()).or_insert(0) += 1;
        }
        counts
    }
}

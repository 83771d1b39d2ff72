use crate::config::{CorrelationMode, RecordFormat};
use crate::error::Ja4CorrelateError;
use crate::record::{decode_record, CaptureLine, FingerprintRecord, MalformedRecord, RecordInput};
use serde_json::Value;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;
use tracing::debug;

/// Anything that yields fingerprint records in arrival order.
///
/// The capture and log-conversion pipeline lives outside this crate; it is consumed
/// through this trait only, never invoked.
pub trait FingerprintSource {
    /// Next record, a per-record decoding failure, or `None` once the stream is exhausted.
    fn next_record(&mut self) -> Option<RecordInput>;
}

/// Records from a JSON document holding an array of `{kind, fingerprint, application}` objects.
pub struct JsonArraySource {
    values: std::vec::IntoIter<Value>,
    index: usize,
}

impl JsonArraySource {
    /// Reads the whole document. Only a document that is not a JSON array fails here;
    /// malformed elements are reported one by one by [`FingerprintSource::next_record`].
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, Ja4CorrelateError> {
        let values: Vec<Value> = serde_json::from_reader(reader)?;
        debug!("Record document holds {} elements", values.len());
        Ok(Self { values: values.into_iter(), index: 0 })
    }

    pub fn from_document(document: &str) -> Result<Self, Ja4CorrelateError> {
        Self::from_reader(document.as_bytes())
    }
}

impl FingerprintSource for JsonArraySource {
    fn next_record(&mut self) -> Option<RecordInput> {
        let value = self.values.next()?;
        let index = self.index;
        self.index = self.index.saturating_add(1);
        Some(decode_record(index, value))
    }
}

/// Records from newline-delimited capture lines, each line expanding into records as the
/// correlation mode asks. Blank lines are ignored; a line that cannot be decoded is reported
/// on its own and reading goes on with the next one.
pub struct CaptureLinesSource<R> {
    reader: R,
    mode: CorrelationMode,
    line_number: usize,
    pending: VecDeque<FingerprintRecord>,
    exhausted: bool,
}

impl<R: BufRead> CaptureLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_mode(reader, CorrelationMode::default())
    }

    pub fn with_mode(reader: R, mode: CorrelationMode) -> Self {
        Self { reader, mode, line_number: 0, pending: VecDeque::new(), exhausted: false }
    }

    fn decode_line(&mut self, index: usize, bytes: Vec<u8>) -> Option<MalformedRecord> {
        let line = match String::from_utf8(bytes) {
            Ok(line) => line,
            Err(e) => {
                return Some(MalformedRecord { index, application: None, reason: e.to_string() })
            }
        };
        if line.trim().is_empty() {
            return None;
        }

        match serde_json::from_str::<CaptureLine>(&line) {
            Ok(capture) => {
                self.pending.extend(capture.into_records(self.mode));
                None
            }
            Err(e) => {
                let application = serde_json::from_str::<Value>(&line).ok().and_then(|v| {
                    v.get("application").and_then(Value::as_str).map(str::to_string)
                });
                Some(MalformedRecord { index, application, reason: e.to_string() })
            }
        }
    }
}

impl<R: BufRead> FingerprintSource for CaptureLinesSource<R> {
    fn next_record(&mut self) -> Option<RecordInput> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(record));
            }
            if self.exhausted {
                return None;
            }

            let index = self.line_number;
            let mut bytes = Vec::new();
            match self.reader.read_until(b'\n', &mut bytes) {
                Ok(0) => self.exhausted = true,
                Ok(_) => {
                    self.line_number = self.line_number.saturating_add(1);
                    if let Some(malformed) = self.decode_line(index, bytes) {
                        return Some(Err(malformed));
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(MalformedRecord {
                        index,
                        application: None,
                        reason: format!("read failed: {e}"),
                    }));
                }
            }
        }
    }
}

/// Adapts any iterator of record inputs, mostly useful for in-memory streams and tests.
pub struct IterSource<I> {
    inner: I,
}

impl<I: Iterator<Item = RecordInput>> IterSource<I> {
    pub fn new(inner: I) -> Self {
        Self { inner }
    }
}

/// Source over already decoded records.
pub fn from_records(
    records: Vec<FingerprintRecord>,
) -> IterSource<impl Iterator<Item = RecordInput>> {
    IterSource::new(records.into_iter().map(Ok))
}

impl<I: Iterator<Item = RecordInput>> FingerprintSource for IterSource<I> {
    fn next_record(&mut self) -> Option<RecordInput> {
        self.inner.next()
    }
}

/// Drains a source into memory, preserving arrival order.
pub fn collect_inputs<S: FingerprintSource + ?Sized>(source: &mut S) -> Vec<RecordInput> {
    let mut inputs = Vec::new();
    while let Some(input) = source.next_record() {
        inputs.push(input);
    }
    inputs
}

/// Opens a record source on a file, or on standard input when `path` is `-`. `mode` applies
/// to capture lines only.
pub fn open_path(
    path: &Path,
    format: RecordFormat,
    mode: CorrelationMode,
) -> Result<Box<dyn FingerprintSource>, Ja4CorrelateError> {
    let stdin = path.as_os_str() == "-";
    debug!("Opening {:?} record source {}", format, path.display());

    let source: Box<dyn FingerprintSource> = match (format, stdin) {
        (RecordFormat::Json, true) => Box::new(JsonArraySource::from_reader(std::io::stdin().lock())?),
        (RecordFormat::Json, false) => {
            Box::new(JsonArraySource::from_reader(BufReader::new(File::open(path)?))?)
        }
        (RecordFormat::JsonLines, true) => {
            Box::new(CaptureLinesSource::with_mode(std::io::stdin().lock(), mode))
        }
        (RecordFormat::JsonLines, false) => {
            Box::new(CaptureLinesSource::with_mode(BufReader::new(File::open(path)?), mode))
        }
    };
    Ok(source)
}

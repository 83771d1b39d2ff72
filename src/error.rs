use thiserror::Error;

/// Error handling for reference database loading, record decoding and report emission.
#[derive(Error, Debug)]
pub enum Ja4CorrelateError {
    /// The reference database could not be loaded.
    ///
    /// This variant is fatal: a partially loaded database is never returned.
    /// `entry` is the zero-based position of the offending entry in the source document,
    /// or `None` when the document itself could not be decoded.
    #[error("Malformed database (entry {}): {reason}", display_position(.entry))]
    MalformedDatabase { entry: Option<usize>, reason: String },

    /// A fingerprint or pattern string is not well formed for its kind.
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// Configuration is missing or invalid.
    #[error("Invalid configuration: {0}")]
    Misconfiguration(String),

    /// A worker thread ended without producing its partial summary.
    #[error("Worker failed: {0}")]
    Worker(String),

    /// Reading a source or writing a report failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed outside of a per-entry context.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn display_position(entry: &Option<usize>) -> String {
    match entry {
        Some(index) => index.to_string(),
        None => "-".to_string(),
    }
}

impl Ja4CorrelateError {
    pub(crate) fn malformed_entry(entry: usize, reason: impl Into<String>) -> Self {
        Ja4CorrelateError::MalformedDatabase { entry: Some(entry), reason: reason.into() }
    }

    pub(crate) fn malformed_document(reason: impl Into<String>) -> Self {
        Ja4CorrelateError::MalformedDatabase { entry: None, reason: reason.into() }
    }
}

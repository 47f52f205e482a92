//! Error types for the brain core domain

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable error kinds surfaced to API consumers.
///
/// Every persistence or translation failure maps to exactly one kind so
/// callers can branch without string matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Config file contents could not be parsed as JSON
    ParseError,
    /// Config violated the schema or an invariant
    ValidationError,
    /// Underlying filesystem operation failed
    IoError,
    /// A lock could not be acquired or released
    LockError,
    /// A path failed safety validation
    PathUnsafe,
    /// A snapshot's stored checksum does not match its config
    SnapshotCorrupted,
    /// A recomputed file checksum does not match the recorded one
    ChecksumMismatch,
    /// A project could not be projected to the upstream format
    TranslationError,
}

impl ErrorKind {
    /// Get the kind name as a stable string
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::ParseError => "parse-error",
            ErrorKind::ValidationError => "validation-error",
            ErrorKind::IoError => "io-error",
            ErrorKind::LockError => "lock-error",
            ErrorKind::PathUnsafe => "path-unsafe",
            ErrorKind::SnapshotCorrupted => "snapshot-corrupted",
            ErrorKind::ChecksumMismatch => "checksum-mismatch",
            ErrorKind::TranslationError => "translation-error",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Unsafe path: {0}")]
    PathUnsafe(String),

    #[error("Snapshot {id} is corrupted: stored checksum does not match its config")]
    SnapshotCorrupted { id: String },

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Translation failed for project '{project}': {message}")]
    Translation { project: String, message: String },
}

impl Error {
    /// Get the machine-readable kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Parse(_) => ErrorKind::ParseError,
            Error::Validation(_) => ErrorKind::ValidationError,
            Error::Io(_) => ErrorKind::IoError,
            Error::Lock(_) => ErrorKind::LockError,
            Error::PathUnsafe(_) => ErrorKind::PathUnsafe,
            Error::SnapshotCorrupted { .. } => ErrorKind::SnapshotCorrupted,
            Error::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            Error::Translation { .. } => ErrorKind::TranslationError,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

//! Error types for the engine.
//!
//! `OxidbError` follows the taxonomy of the query execution core: each
//! variant names a kind (Database/Transaction/Query/Function/IO) and carries
//! the fully-qualified name of the affected object plus a human-readable
//! message, so that failures are always traceable back to a concrete schema,
//! entity, column, or index.

use std::fmt;
use std::io;

/// The single error type returned by every fallible operation in the crate.
#[derive(Debug, Clone, PartialEq)]
pub enum OxidbError {
    // --- Database kind ---
    SchemaExists(String),
    SchemaMissing(String),
    EntityExists(String),
    EntityMissing(String),
    ColumnMissing(String),
    IndexExists(String),
    IndexMissing(String),
    IndexNotSupported(String),
    DuplicateColumn(String),
    DataCorruption(String),
    ReservedValue(String),
    VersionMismatch(String),

    // --- Transaction kind ---
    ClosedDbo(String),
    Deadlock(String),
    Aborted(String),
    Cancelled(String),

    // --- Query kind ---
    Syntax(String),
    TypeMismatch(String),
    UnsupportedPredicate(String),
    BindingUnknown(String),
    PolicyViolation(String),

    // --- Function kind ---
    NotSupported(String),
    SignatureMismatch(String),

    // --- IO kind ---
    StoreMissing(String),
    OutOfDiskSpace(String),
    Io(String),

    /// Catch-all for conditions not covered by the taxonomy above (kept
    /// narrow; new call sites should prefer a named variant).
    Other(String),
}

impl fmt::Display for OxidbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchemaExists(n) => write!(f, "schema already exists: {n}"),
            Self::SchemaMissing(n) => write!(f, "schema not found: {n}"),
            Self::EntityExists(n) => write!(f, "entity already exists: {n}"),
            Self::EntityMissing(n) => write!(f, "entity not found: {n}"),
            Self::ColumnMissing(n) => write!(f, "column not found: {n}"),
            Self::IndexExists(n) => write!(f, "index already exists: {n}"),
            Self::IndexMissing(n) => write!(f, "index not found: {n}"),
            Self::IndexNotSupported(n) => write!(f, "index does not support operation: {n}"),
            Self::DuplicateColumn(n) => write!(f, "duplicate column: {n}"),
            Self::DataCorruption(n) => write!(f, "data corruption detected: {n}"),
            Self::ReservedValue(n) => write!(f, "reserved value rejected: {n}"),
            Self::VersionMismatch(n) => write!(f, "version mismatch: {n}"),
            Self::ClosedDbo(n) => write!(f, "object is closed: {n}"),
            Self::Deadlock(n) => write!(f, "deadlock detected: {n}"),
            Self::Aborted(n) => write!(f, "transaction aborted: {n}"),
            Self::Cancelled(n) => write!(f, "query cancelled: {n}"),
            Self::Syntax(n) => write!(f, "syntax error: {n}"),
            Self::TypeMismatch(n) => write!(f, "type mismatch: {n}"),
            Self::UnsupportedPredicate(n) => write!(f, "unsupported predicate: {n}"),
            Self::BindingUnknown(n) => write!(f, "unknown binding: {n}"),
            Self::PolicyViolation(n) => write!(f, "policy violation: {n}"),
            Self::NotSupported(n) => write!(f, "function not supported: {n}"),
            Self::SignatureMismatch(n) => write!(f, "function signature mismatch: {n}"),
            Self::StoreMissing(n) => write!(f, "store missing: {n}"),
            Self::OutOfDiskSpace(n) => write!(f, "out of disk space: {n}"),
            Self::Io(n) => write!(f, "I/O error: {n}"),
            Self::Other(n) => write!(f, "error: {n}"),
        }
    }
}

impl std::error::Error for OxidbError {}

impl From<io::Error> for OxidbError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::StoreMissing(err.to_string()),
            _ => Self::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for OxidbError {
    fn from(err: serde_json::Error) -> Self {
        Self::DataCorruption(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_affected_object() {
        let err = OxidbError::EntityMissing("warren.main.features".to_string());
        assert_eq!(err.to_string(), "entity not found: warren.main.features");
    }

    #[test]
    fn io_not_found_maps_to_store_missing() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "no such file");
        let err: OxidbError = io_err.into();
        assert!(matches!(err, OxidbError::StoreMissing(_)));
    }
}

#![forbid(unsafe_code)]

//! Core identifiers and error types shared by the store and the audit engine.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::primitives::address::{encode_address, AddressParseError};

/// Store-assigned physical address of a persistent record.
///
/// Stable for the lifetime of the record and stored as an 8-byte big-endian
/// unsigned integer on disk.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Address(pub u64);

impl Address {
    /// Builds an address from its raw big-endian byte form.
    pub fn from_bytes(raw: [u8; 8]) -> Self {
        Address(u64::from_be_bytes(raw))
    }

    /// Returns the raw big-endian byte form.
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode_address(*self))
    }
}

/// Ordered sequence of path segments from the store root.
///
/// The empty path names the root itself.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectPath(Vec<String>);

impl ObjectPath {
    /// The store root.
    pub fn root() -> Self {
        ObjectPath(Vec::new())
    }

    /// Builds a path from its segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ObjectPath(segments.into_iter().map(Into::into).collect())
    }

    /// Parses an operator-supplied path.
    ///
    /// Segments are split on both `.` and `/`; empty segments are dropped and a
    /// leading `root_name` segment is stripped because the root has no name of
    /// its own inside the store.
    pub fn parse(raw: &str, root_name: &str) -> Self {
        let mut segments: Vec<String> = raw
            .split(['.', '/'])
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if segments.first().map(String::as_str) == Some(root_name) {
            segments.remove(0);
        }
        ObjectPath(segments)
    }

    /// Returns the path segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// True for the store root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Final segment, if any.
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Path with the final segment removed. The root is its own parent.
    pub fn parent(&self) -> ObjectPath {
        let mut segments = self.0.clone();
        segments.pop();
        ObjectPath(segments)
    }

    /// Path extended by one segment.
    pub fn child(&self, name: &str) -> ObjectPath {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        ObjectPath(segments)
    }

    /// Dotted form used in reports, e.g. `app.zport.dmd`.
    pub fn dotted(&self, root_name: &str) -> String {
        let mut out = root_name.to_string();
        for segment in &self.0 {
            out.push('.');
            out.push_str(segment);
        }
        out
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// The three kinds of diagnosable breakage.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub enum FailureKind {
    /// A stored reference points at an address with no record behind it.
    ReferenceMissing,
    /// A structural lookup inside the store's own bookkeeping failed.
    KeyMissing,
    /// A listed child name does not resolve to any attribute of its parent.
    AttributeMissing,
}

impl FailureKind {
    /// Name used in report lines.
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::ReferenceMissing => "ReferenceMissing",
            FailureKind::KeyMissing => "KeyMissing",
            FailureKind::AttributeMissing => "AttributeMissing",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recognized failure raised while dereferencing stored state.
#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
pub struct Failure {
    /// Which kind of breakage was observed.
    pub kind: FailureKind,
    /// Raw payload; for [`FailureKind::ReferenceMissing`] the missing address in hex.
    pub detail: String,
}

impl Failure {
    /// A reference to `address` could not be resolved.
    pub fn reference_missing(address: Address) -> Self {
        Self {
            kind: FailureKind::ReferenceMissing,
            detail: format!("{:08x}", address.0),
        }
    }

    /// A bookkeeping lookup for `key` failed.
    pub fn key_missing(key: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::KeyMissing,
            detail: key.into(),
        }
    }

    /// `name` is not an attribute of its parent.
    pub fn attribute_missing(name: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::AttributeMissing,
            detail: name.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Errors raised by store implementations.
///
/// Only [`StoreError::Broken`] is diagnosable breakage; every other variant is
/// fatal to an audit run.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Diagnosable breakage.
    #[error("{0}")]
    Broken(Failure),
    /// No object exists at the given path.
    #[error("path not found: {0}")]
    PathNotFound(ObjectPath),
    /// Another writer committed since this store last loaded or committed.
    #[error("commit conflict: expected generation {expected}, found {found}")]
    CommitConflict {
        /// Generation this store last saw.
        expected: u64,
        /// Generation currently on disk.
        found: u64,
    },
    /// The node does not support the requested operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    /// A snapshot file could not be interpreted.
    #[error("invalid snapshot {path}: {reason}")]
    Snapshot {
        /// Snapshot location.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
    /// Malformed address in a failure payload.
    #[error(transparent)]
    Address(#[from] AddressParseError),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// JSON encoding error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns the failure when this error is diagnosable breakage.
    pub fn as_failure(&self) -> Option<&Failure> {
        match self {
            StoreError::Broken(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<Failure> for StoreError {
    fn from(failure: Failure) -> Self {
        StoreError::Broken(failure)
    }
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

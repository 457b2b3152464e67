//! Recoverable problems met while walking the directory tree.
//!
//! None of these stop the walk of the volume. Each one names the directory it was
//! found in and, when known, the absolute byte offset of the offending slot.

use getset::Getters;
use log::{info, warn};
use std::fmt;

/// What went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// The chain of the directory ended before its end-of-directory slot.
    Truncated { bytes_read: usize },
    /// A new long name started before the previous one reached its 8.3 entry.
    OverwrittenLongName { discarded: String },
    /// A long name continuation record does not share the checksum of its first record.
    /// The rest of the directory is not parsed.
    ChecksumMismatch { expected: u8, found: u8 },
    /// The long name does not belong to the 8.3 entry following it; the 8.3 name is used.
    LongNameMismatch { long_name: String },
    /// A name could not be decoded; the entry is dropped and never traversed.
    NameDecode,
    /// A date or time field does not form a valid calendar value; the entry is dropped.
    InvalidTimestamp(String),
    /// The volume label entry.
    VolumeLabel(String),
    /// The directory starts on a cluster that was already walked.
    CyclicDirectory { cluster: u32 },
    /// The walk stopped at the configured directory limit.
    TraversalLimit { pending: usize },
}

/// One recoverable problem, attributed to a directory path.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
#[get = "pub"]
pub struct Diagnostic {
    path: String,
    offset: Option<u64>,
    kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn new(path: &str, offset: Option<u64>, kind: DiagnosticKind) -> Self {
        Self {
            path: path.to_string(),
            offset,
            kind,
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticKind::Truncated { bytes_read } => write!(
                f,
                "cluster chain ended before the end of the directory ({bytes_read} trailing bytes)"
            ),
            DiagnosticKind::OverwrittenLongName { discarded } => {
                write!(f, "unfinished long name {discarded:?} overwritten")
            }
            DiagnosticKind::ChecksumMismatch { expected, found } => write!(
                f,
                "long name checksum 0x{found:02X} does not match 0x{expected:02X}, rest of the directory skipped"
            ),
            DiagnosticKind::LongNameMismatch { long_name } => {
                write!(f, "long name {long_name:?} does not belong to its 8.3 entry")
            }
            DiagnosticKind::NameDecode => write!(f, "undecodable name"),
            DiagnosticKind::InvalidTimestamp(detail) => write!(f, "invalid timestamp: {detail}"),
            DiagnosticKind::VolumeLabel(label) => write!(f, "volume label {label:?}"),
            DiagnosticKind::CyclicDirectory { cluster } => {
                write!(f, "cluster {cluster} already walked")
            }
            DiagnosticKind::TraversalLimit { pending } => {
                write!(f, "directory limit reached, {pending} directories left unwalked")
            }
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(offset) => write!(f, "{} @0x{:X}: {}", self.path, offset, self.kind),
            None => write!(f, "{}: {}", self.path, self.kind),
        }
    }
}

/// Receiver of the diagnostics produced by a directory walk.
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

impl<F: FnMut(Diagnostic)> DiagnosticSink for F {
    fn report(&mut self, diagnostic: Diagnostic) {
        self(diagnostic)
    }
}

/// Forwards diagnostics to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.kind {
            DiagnosticKind::VolumeLabel(_) => info!("{diagnostic}"),
            _ => warn!("{diagnostic}"),
        }
    }
}

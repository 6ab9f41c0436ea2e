//! Typed per-file outcomes and their counts.
//!
//! Every attempted file operation yields at most one [`ErrorKind`]. An
//! [`ErrorSummary`] counts them by kind. Some kinds are informational (an
//! identical file was already in place, a conflict was settled by renaming);
//! only [`ErrorKind::is_failure`] kinds count as errors.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// The fixed outcome taxonomy shared by the whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ErrorKind {
    /// The destination already held an identical file; nothing was written.
    NameConflictUnchanged,
    /// Move found an identical file at the destination and trashed the source.
    NameConflictDuplicateDiscarded,
    /// The file was written under a suffixed name.
    NameConflictResolvedByRename,
    /// Every suffixed name was taken by a different file.
    NameConflictUnresolved,
    /// The source disappeared between enumeration and processing.
    SourceVanished,
    /// Any other filesystem failure.
    UnknownTransferError,
    /// Inputs rejected before any I/O.
    InvalidConfiguration,
}

impl ErrorKind {
    /// Whether the file was left unprocessed.
    #[must_use]
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::NameConflictUnresolved
                | Self::SourceVanished
                | Self::UnknownTransferError
                | Self::InvalidConfiguration
        )
    }

    /// Short human description.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::NameConflictUnchanged => "identical file already at destination",
            Self::NameConflictDuplicateDiscarded => "identical file at destination, source trashed",
            Self::NameConflictResolvedByRename => "written under a numbered name",
            Self::NameConflictUnresolved => "no free name found",
            Self::SourceVanished => "source vanished",
            Self::UnknownTransferError => "unexpected filesystem error",
            Self::InvalidConfiguration => "invalid configuration",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Count of outcomes by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ErrorSummary {
    counts: BTreeMap<ErrorKind, usize>,
}

impl ErrorSummary {
    /// An empty summary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence of `kind`.
    pub fn record(&mut self, kind: ErrorKind) {
        *self.counts.entry(kind).or_insert(0) += 1;
    }

    /// Occurrences of `kind`.
    #[must_use]
    pub fn count(&self, kind: ErrorKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Occurrences of failure kinds only.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.counts
            .iter()
            .filter(|(kind, _)| kind.is_failure())
            .map(|(_, n)| n)
            .sum()
    }

    /// Occurrences of every kind.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Add another summary's counts to this one.
    pub fn merge(&mut self, other: &Self) {
        for (kind, n) in &other.counts {
            *self.counts.entry(*kind).or_insert(0) += n;
        }
    }

    /// Recorded kinds with their counts, in taxonomy order.
    pub fn iter(&self) -> impl Iterator<Item = (ErrorKind, usize)> + '_ {
        self.counts.iter().map(|(k, n)| (*k, *n))
    }
}

impl fmt::Display for ErrorSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "no conflicts or errors");
        }
        let parts: Vec<String> = self
            .iter()
            .map(|(kind, n)| format!("{kind}: {n}"))
            .collect();
        write!(f, "{}", parts.join(", "))
    }
}

//! Content-aware resolution of destination name collisions.
//!
//! When the destination name is taken, the existing file is compared byte
//! for byte with the source (sizes and timestamps are not trusted):
//!
//! - identical: Copy leaves both alone, Move trashes the redundant source
//! - different: try `"<stem> (1).<ext>"`, `"<stem> (2).<ext>"`, ... up to the
//!   retry limit. A free name gets the file. A taken name holding an
//!   identical file ends the search as if it were the original name.
//!
//! # Example
//!
//! ```no_run
//! use copyall::actions::conflict::{resolve, ConflictMode, ConflictOutcome};
//! use std::path::Path;
//!
//! let outcome = resolve(Path::new("in/x.jpg"), Path::new("out"), ConflictMode::Copy, 100)
//!     .expect("destination directory usable");
//! if let ConflictOutcome::Renamed(path) = outcome {
//!     println!("stored as {}", path.display());
//! }
//! ```

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::ops::{self, OpError};
use super::summary::ErrorKind;
use crate::scanner::{extension_of, files_identical};

/// Operations that can collide with an existing destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictMode {
    /// The source stays where it is.
    Copy,
    /// The source leaves its original location.
    Move,
}

/// How a collision was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictOutcome {
    /// There was no collision; the file went in under its own name.
    Placed(PathBuf),
    /// Copy: an identical file was already in place.
    Unchanged,
    /// Move: an identical file was in place, the source went to the trash.
    ExtraCopyDiscarded,
    /// The file was written under this suffixed path.
    Renamed(PathBuf),
    /// Every suffixed name held a different file.
    GaveUp,
    /// A comparison or write failed.
    Unresolved,
    /// The source disappeared.
    SourceMissing,
}

impl ConflictOutcome {
    /// The summary kind for this outcome, `None` for a plain placement.
    #[must_use]
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Placed(_) => None,
            Self::Unchanged => Some(ErrorKind::NameConflictUnchanged),
            Self::ExtraCopyDiscarded => Some(ErrorKind::NameConflictDuplicateDiscarded),
            Self::Renamed(_) => Some(ErrorKind::NameConflictResolvedByRename),
            Self::GaveUp => Some(ErrorKind::NameConflictUnresolved),
            Self::Unresolved => Some(ErrorKind::UnknownTransferError),
            Self::SourceMissing => Some(ErrorKind::SourceVanished),
        }
    }
}

/// The destination directory could not be created.
///
/// This is fatal for a whole run: no later file can land there either.
#[derive(Debug, thiserror::Error)]
#[error("Destination directory unavailable: {path}: {source}")]
pub struct DestinationUnavailable {
    /// Directory that could not be created
    pub path: PathBuf,
    /// The underlying I/O error
    #[source]
    pub source: io::Error,
}

/// Create `dir` (recursively) if it is missing.
///
/// # Errors
///
/// [`DestinationUnavailable`] if the directory cannot be created.
pub fn ensure_dir(dir: &Path) -> Result<(), DestinationUnavailable> {
    if dir.is_dir() {
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|source| DestinationUnavailable {
        path: dir.to_path_buf(),
        source,
    })
}

/// `name` with ` (n)` inserted before its extension.
///
/// ```
/// use copyall::actions::conflict::suffixed_name;
/// use std::ffi::OsStr;
///
/// assert_eq!(suffixed_name(OsStr::new("photo.jpg"), 2), "photo (2).jpg");
/// assert_eq!(suffixed_name(OsStr::new("Makefile"), 1), "Makefile (1)");
/// assert_eq!(suffixed_name(OsStr::new(".env"), 3), ".env (3)");
/// ```
#[must_use]
pub fn suffixed_name(name: &std::ffi::OsStr, n: usize) -> OsString {
    match name.to_str() {
        Some(name) => match extension_of(name) {
            Some(ext) => {
                let stem = &name[..name.len() - ext.len()];
                OsString::from(format!("{stem} ({n}){ext}"))
            }
            None => OsString::from(format!("{name} ({n})")),
        },
        None => {
            let mut suffixed = name.to_os_string();
            suffixed.push(format!(" ({n})"));
            suffixed
        }
    }
}

/// Put `source` into `destination_dir`, settling a collision with a
/// same-named file there.
///
/// A free name gets the file directly ([`ConflictOutcome::Placed`]).
/// Otherwise at most `max_retries` suffixed names are tried.
///
/// # Errors
///
/// [`DestinationUnavailable`] if `destination_dir` is missing and cannot be
/// created. Every per-file problem is reported as an outcome instead.
pub fn resolve(
    source: &Path,
    destination_dir: &Path,
    mode: ConflictMode,
    max_retries: usize,
) -> Result<ConflictOutcome, DestinationUnavailable> {
    ensure_dir(destination_dir)?;

    if !source.exists() {
        return Ok(ConflictOutcome::SourceMissing);
    }
    let Some(file_name) = source.file_name() else {
        return Ok(ConflictOutcome::Unresolved);
    };

    let target = destination_dir.join(file_name);
    if target.symlink_metadata().is_err() {
        match write(source, &target, mode) {
            Ok(_) => return Ok(ConflictOutcome::Placed(target)),
            // Taken between the check and the write; compare below
            Err(OpError::AlreadyExists(_)) => {}
            Err(OpError::NotFound(_)) => return Ok(ConflictOutcome::SourceMissing),
            Err(e) => {
                log::warn!("Failed to write {}: {}", target.display(), e);
                return Ok(ConflictOutcome::Unresolved);
            }
        }
    }

    match compare(source, &target) {
        Some(true) => return Ok(identical_outcome(source, &target, mode)),
        Some(false) => {}
        None => return Ok(missing_or_unresolved(source)),
    }

    for n in 1..=max_retries {
        let candidate = destination_dir.join(suffixed_name(file_name, n));
        if candidate.symlink_metadata().is_err() {
            match write(source, &candidate, mode) {
                Ok(_) => {
                    log::debug!("Resolved {} as {}", source.display(), candidate.display());
                    return Ok(ConflictOutcome::Renamed(candidate));
                }
                // Taken between the check and the write; keep looking
                Err(OpError::AlreadyExists(_)) => {}
                Err(OpError::NotFound(_)) => return Ok(ConflictOutcome::SourceMissing),
                Err(e) => {
                    log::warn!("Failed to write {}: {}", candidate.display(), e);
                    return Ok(ConflictOutcome::Unresolved);
                }
            }
        }
        match compare(source, &candidate) {
            Some(true) => return Ok(identical_outcome(source, &candidate, mode)),
            Some(false) => {}
            None if !source.exists() => return Ok(ConflictOutcome::SourceMissing),
            // Unreadable candidate: treat the name as taken
            None => {}
        }
    }

    log::warn!(
        "Gave up on {} after {} numbered names",
        source.display(),
        max_retries
    );
    Ok(ConflictOutcome::GaveUp)
}

fn write(source: &Path, target: &Path, mode: ConflictMode) -> Result<u64, OpError> {
    match mode {
        ConflictMode::Copy => ops::copy_file(source, target),
        ConflictMode::Move => ops::move_file(source, target),
    }
}

fn compare(source: &Path, existing: &Path) -> Option<bool> {
    match files_identical(source, existing) {
        Ok(same) => Some(same),
        Err(e) => {
            log::warn!(
                "Failed to compare {} with {}: {}",
                source.display(),
                existing.display(),
                e
            );
            None
        }
    }
}

fn missing_or_unresolved(source: &Path) -> ConflictOutcome {
    if source.exists() {
        ConflictOutcome::Unresolved
    } else {
        ConflictOutcome::SourceMissing
    }
}

fn identical_outcome(source: &Path, existing: &Path, mode: ConflictMode) -> ConflictOutcome {
    match mode {
        ConflictMode::Copy => {
            log::trace!("{} already present as {}", source.display(), existing.display());
            ConflictOutcome::Unchanged
        }
        ConflictMode::Move => match ops::trash_file(source) {
            Ok(_) => {
                log::debug!(
                    "Trashed {} (identical to {})",
                    source.display(),
                    existing.display()
                );
                ConflictOutcome::ExtraCopyDiscarded
            }
            Err(OpError::NotFound(_)) => ConflictOutcome::SourceMissing,
            Err(e) => {
                log::warn!("Failed to discard {}: {}", source.display(), e);
                ConflictOutcome::Unresolved
            }
        },
    }
}

//! Raw per-file operations.
//!
//! # Overview
//!
//! Thin wrappers over the filesystem that classify failures:
//! - [`copy_file`]: never overwrites; keeps permissions and modification time
//! - [`move_file`]: never overwrites; link + unlink, copy + remove across volumes
//! - [`trash_file`]: recoverable delete via the system trash
//! - [`delete_file`]: permanent delete
//!
//! Each returns the number of bytes the file held. Policy (conflicts,
//! retries, accounting) lives in the callers.
//!
//! # Example
//!
//! ```no_run
//! use copyall::actions::ops::{copy_file, OpError};
//! use std::path::Path;
//!
//! match copy_file(Path::new("a.txt"), Path::new("backup/a.txt")) {
//!     Ok(bytes) => println!("copied {bytes} bytes"),
//!     Err(OpError::AlreadyExists(p)) => println!("{} is taken", p.display()),
//!     Err(e) => eprintln!("Failed: {e}"),
//! }
//! ```

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use filetime::FileTime;
use thiserror::Error;

/// Error type for raw file operations.
#[derive(Debug, Error)]
pub enum OpError {
    /// The source file does not exist (anymore).
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// The destination name is already taken.
    #[error("destination already exists: {0}")]
    AlreadyExists(PathBuf),

    /// Permission denied on source or destination.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The trash could not take the file.
    #[error("trash operation failed for {path}: {message}")]
    TrashFailed {
        /// File that was being trashed
        path: PathBuf,
        /// Message from the trash backend
        message: String,
    },

    /// Any other I/O failure.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl OpError {
    /// Classify an I/O error for `path`.
    fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }

    /// Path the error refers to.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(p)
            | Self::AlreadyExists(p)
            | Self::PermissionDenied(p)
            | Self::TrashFailed { path: p, .. }
            | Self::Io { path: p, .. } => p,
        }
    }
}

fn source_size(path: &Path) -> Result<(fs::Metadata, u64), OpError> {
    let metadata = fs::metadata(path).map_err(|e| OpError::from_io(path, e))?;
    let size = metadata.len();
    Ok((metadata, size))
}

/// Copy `source` to `target`, which must not exist.
///
/// Permissions and modification time are carried over. A partially written
/// target is removed on failure.
///
/// # Errors
///
/// - [`OpError::NotFound`] if the source is gone
/// - [`OpError::AlreadyExists`] if `target` is taken
/// - [`OpError::PermissionDenied`] or [`OpError::Io`] otherwise
pub fn copy_file(source: &Path, target: &Path) -> Result<u64, OpError> {
    let (metadata, _) = source_size(source)?;
    let mut reader = File::open(source).map_err(|e| OpError::from_io(source, e))?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
        .map_err(|e| match e.kind() {
            // The source was just opened, so a missing path here is the target directory
            io::ErrorKind::NotFound => OpError::Io {
                path: target.to_path_buf(),
                source: e,
            },
            _ => OpError::from_io(target, e),
        })?;

    let copied = match io::copy(&mut reader, &mut writer) {
        Ok(n) => n,
        Err(e) => {
            drop(writer);
            let _ = fs::remove_file(target);
            return Err(OpError::Io {
                path: target.to_path_buf(),
                source: e,
            });
        }
    };
    drop(writer);

    if let Err(e) = fs::set_permissions(target, metadata.permissions()) {
        log::debug!("Could not copy permissions to {}: {}", target.display(), e);
    }
    let mtime = FileTime::from_last_modification_time(&metadata);
    if let Err(e) = filetime::set_file_mtime(target, mtime) {
        log::debug!("Could not copy mtime to {}: {}", target.display(), e);
    }

    log::trace!("Copied {} -> {} ({} bytes)", source.display(), target.display(), copied);
    Ok(copied)
}

/// Move `source` to `target`, which must not exist.
///
/// The file is hard linked under the new name, then unlinked from the old
/// one. Linking never replaces an existing file, so concurrent movers of
/// the same name see [`OpError::AlreadyExists`] instead of overwriting each
/// other. Across volumes (or where links are unsupported) the file is
/// copied with [`copy_file`] and the source removed; if that removal fails
/// the copy is deleted again.
///
/// # Errors
///
/// Same classification as [`copy_file`].
pub fn move_file(source: &Path, target: &Path) -> Result<u64, OpError> {
    let (_, size) = source_size(source)?;

    match fs::hard_link(source, target) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(source) {
                let _ = fs::remove_file(target);
                return Err(OpError::from_io(source, e));
            }
            log::trace!("Moved {} -> {}", source.display(), target.display());
            Ok(size)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(OpError::AlreadyExists(target.to_path_buf()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if source.exists() {
                Err(OpError::Io {
                    path: target.to_path_buf(),
                    source: e,
                })
            } else {
                Err(OpError::NotFound(source.to_path_buf()))
            }
        }
        Err(e) if needs_copy(&e) => {
            log::debug!(
                "Cannot link {} -> {} ({}), copying instead",
                source.display(),
                target.display(),
                e
            );
            let copied = copy_file(source, target)?;
            if let Err(e) = fs::remove_file(source) {
                let _ = fs::remove_file(target);
                return Err(OpError::from_io(source, e));
            }
            Ok(copied)
        }
        Err(e) => Err(OpError::from_io(target, e)),
    }
}

fn needs_copy(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::CrossesDevices | io::ErrorKind::Unsupported
    )
}

/// Send `path` to the system trash.
///
/// # Errors
///
/// - [`OpError::NotFound`] if the file is gone
/// - [`OpError::TrashFailed`] if the trash refuses it
pub fn trash_file(path: &Path) -> Result<u64, OpError> {
    let (_, size) = source_size(path)?;
    trash::delete(path).map_err(|e| {
        log::error!("Trash operation failed for {}: {}", path.display(), e);
        OpError::TrashFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    })?;
    log::trace!("Moved to trash: {} ({} bytes)", path.display(), size);
    Ok(size)
}

/// Permanently delete `path`.
///
/// **WARNING**: this cannot be undone.
///
/// # Errors
///
/// - [`OpError::NotFound`] if the file is gone
/// - [`OpError::PermissionDenied`] or [`OpError::Io`] otherwise
pub fn delete_file(path: &Path) -> Result<u64, OpError> {
    let (_, size) = source_size(path)?;
    fs::remove_file(path).map_err(|e| OpError::from_io(path, e))?;
    log::trace!("Permanently deleted: {} ({} bytes)", path.display(), size);
    Ok(size)
}

/// Whether `a` and `b` live on the same storage volume.
///
/// Paths that do not exist yet are resolved through their nearest existing
/// ancestor. When nothing can be resolved the answer is `false`, which makes
/// callers assume the more expensive cross-volume behaviour.
#[must_use]
pub fn same_volume(a: &Path, b: &Path) -> bool {
    match (volume_id(a), volume_id(b)) {
        (Some(va), Some(vb)) => va == vb,
        _ => false,
    }
}

fn existing_ancestor(path: &Path) -> Option<&Path> {
    path.ancestors().find(|p| p.exists())
}

#[cfg(unix)]
fn volume_id(path: &Path) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    let existing = existing_ancestor(path)?;
    fs::metadata(existing).ok().map(|m| m.dev())
}

#[cfg(not(unix))]
fn volume_id(path: &Path) -> Option<std::ffi::OsString> {
    use std::path::Component;
    let existing = existing_ancestor(path)?;
    let absolute = std::path::absolute(existing).ok()?;
    match absolute.components().next() {
        Some(Component::Prefix(prefix)) => Some(prefix.as_os_str().to_ascii_uppercase()),
        _ => Some(std::ffi::OsString::new()),
    }
}

//! Scanner module for subtree enumeration and file hashing.
//!
//! This module provides functionality for:
//! - Walking a directory subtree once and caching the filtered file list
//! - Lazily derived views: sizes, extension set, full digests, "has any files"
//! - Content hashing with BLAKE3 (prehash and full hash)
//! - Byte-for-byte file comparison
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`filelist`]: the lazy enumeration engine and its [`Filters`]
//! - [`hasher`]: BLAKE3 file hashing (streaming) and [`files_identical`]
//!
//! # Example
//!
//! ```no_run
//! use copyall::scanner::{Filelist, Filters};
//!
//! let filters = Filters::default()
//!     .with_extensions(vec![".jpg".into(), ".png".into()])
//!     .with_min_size(1024);
//!
//! let filelist = Filelist::new("/home/user/Pictures", filters).unwrap();
//! for (path, size) in filelist.sized_paths().iter().zip(filelist.sizes()) {
//!     println!("{}: {} bytes", path.display(), size);
//! }
//! println!("extensions: {:?}", filelist.extensions());
//! ```

pub mod filelist;
pub mod hasher;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// Re-export main types
pub use filelist::{extension_of, Filelist, Filters, IoCounters};
pub use hasher::{files_identical, hash_to_hex, Hash, Hasher, PREHASH_SIZE};

/// Errors raised while constructing a [`Filelist`].
///
/// All of these are configuration errors caught before any walk happens.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FilelistError {
    /// The maximum size bound is below the minimum.
    #[error("Invalid size range: max_size {max} is less than min_size {min}")]
    InvalidRange {
        /// Requested minimum size
        min: u64,
        /// Requested maximum size
        max: u64,
    },

    /// The input root does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// The input root exists but is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug, Clone)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: Arc<io::Error>,
    },
}

impl HashError {
    /// Classify an I/O error raised for `path`.
    pub(crate) fn from_io(path: &Path, error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: Arc::new(error),
            },
        }
    }
}

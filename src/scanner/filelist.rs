//! Lazy, write-once enumeration of a directory subtree.
//!
//! # Overview
//!
//! [`Filelist`] owns an input root and a set of [`Filters`]. Construction does
//! no I/O beyond validating the root. The first accessor that needs the file
//! list walks the subtree once; every derived view (sizes, extensions, digests,
//! "has any files") is computed at most once and cached afterwards.
//!
//! Filters run cheapest first:
//! 1. extension suffix match (string)
//! 2. filename prefix match (string)
//! 3. size bounds (one `stat` per surviving file, only when bounds are set)
//!
//! # Concurrency
//!
//! Each cached view sits in a [`OnceLock`]: uncomputed, being computed, or
//! cached. Concurrent callers of the same accessor block on the in-flight
//! computation instead of repeating it, so a `Filelist` may be shared across
//! threads. Cached values are never mutated once set.
//!
//! # Example
//!
//! ```no_run
//! use copyall::scanner::{Filelist, Filters};
//!
//! let filelist = Filelist::new(".", Filters::default()).unwrap();
//! if filelist.has_files() {
//!     println!("{} files, {} bytes", filelist.len(), filelist.total_size());
//! }
//! ```

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use rayon::prelude::*;
use walkdir::WalkDir;

use super::{FilelistError, Hash, Hasher};

/// Paths per parallel group when collecting the extension set.
const EXTENSION_CHUNK_SIZE: usize = 20_000;

/// Paths per parallel group for the stat pass.
const STAT_CHUNK_SIZE: usize = 20_000;

/// Paths per parallel group when hashing.
const HASH_CHUNK_SIZE: usize = 256;

/// Filter inputs consumed verbatim by the enumeration engine.
///
/// Empty `extensions` or `prefixes` mean "no filter". Size bounds are
/// inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    /// Accepted filename suffixes, each expected to start with `.` (logical OR).
    pub extensions: Vec<String>,
    /// Accepted filename prefixes (logical OR).
    pub prefixes: Vec<String>,
    /// Minimum file size in bytes (inclusive).
    pub min_size: u64,
    /// Maximum file size in bytes (inclusive).
    pub max_size: u64,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            extensions: Vec::new(),
            prefixes: Vec::new(),
            min_size: 0,
            max_size: u64::MAX,
        }
    }
}

impl Filters {
    /// Restrict to files whose name ends with one of `extensions`.
    #[must_use]
    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Restrict to files whose name starts with one of `prefixes`.
    #[must_use]
    pub fn with_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.prefixes = prefixes;
        self
    }

    /// Set the inclusive minimum size.
    #[must_use]
    pub fn with_min_size(mut self, min_size: u64) -> Self {
        self.min_size = min_size;
        self
    }

    /// Set the inclusive maximum size.
    #[must_use]
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Check that `min_size <= max_size`.
    ///
    /// # Errors
    ///
    /// Returns [`FilelistError::InvalidRange`] otherwise.
    pub fn validate(&self) -> Result<(), FilelistError> {
        if self.max_size < self.min_size {
            return Err(FilelistError::InvalidRange {
                min: self.min_size,
                max: self.max_size,
            });
        }
        Ok(())
    }

    /// Whether the size filter would reject anything at all.
    #[must_use]
    pub fn has_size_bounds(&self) -> bool {
        self.min_size != 0 || self.max_size != u64::MAX
    }

    /// Extension check on a bare file name.
    #[must_use]
    pub fn matches_extension(&self, file_name: &str) -> bool {
        self.extensions.is_empty() || self.extensions.iter().any(|e| file_name.ends_with(e))
    }

    /// Prefix check on a bare file name.
    #[must_use]
    pub fn matches_prefix(&self, file_name: &str) -> bool {
        self.prefixes.is_empty() || self.prefixes.iter().any(|p| file_name.starts_with(p))
    }

    /// Size check against the inclusive bounds.
    #[must_use]
    pub fn matches_size(&self, size: u64) -> bool {
        (self.min_size..=self.max_size).contains(&size)
    }

    /// The two string predicates, in cost order.
    fn matches_name(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        self.matches_extension(&name) && self.matches_prefix(&name)
    }
}

/// The extension of a file name as the scanner understands it.
///
/// This is the suffix from the final `.` (dot included). Dotfiles, names
/// without a dot, a trailing dot and suffixes containing a space are noise
/// and yield `None`.
///
/// ```
/// use copyall::scanner::extension_of;
///
/// assert_eq!(extension_of("photo.tar.gz"), Some(".gz"));
/// assert_eq!(extension_of(".bashrc"), None);
/// assert_eq!(extension_of("Makefile"), None);
/// assert_eq!(extension_of("notes.final draft"), None);
/// ```
#[must_use]
pub fn extension_of(file_name: &str) -> Option<&str> {
    if file_name.starts_with('.') {
        return None;
    }
    let idx = file_name.rfind('.')?;
    let ext = &file_name[idx..];
    if ext.len() == 1 || ext.contains(' ') {
        return None;
    }
    Some(ext)
}

/// Count of filesystem calls made by a [`Filelist`].
#[derive(Debug, Default)]
pub struct IoCounters {
    walks: AtomicUsize,
    stats: AtomicUsize,
    hashes: AtomicUsize,
}

impl IoCounters {
    /// Number of subtree walks started (full or shallow).
    #[must_use]
    pub fn walks(&self) -> usize {
        self.walks.load(Ordering::Relaxed)
    }

    /// Number of per-file `stat` calls.
    #[must_use]
    pub fn stats(&self) -> usize {
        self.stats.load(Ordering::Relaxed)
    }

    /// Number of per-file full digests computed.
    #[must_use]
    pub fn hashes(&self) -> usize {
        self.hashes.load(Ordering::Relaxed)
    }
}

/// Paths and sizes kept index-aligned.
#[derive(Debug, Default)]
struct SizedFiles {
    paths: Vec<PathBuf>,
    sizes: Vec<u64>,
}

/// Lazily enumerated, filtered set of files under one root.
///
/// Usage constraint: the subtree is snapshotted on first access. Files that
/// appear later are not seen; files that vanish before their `stat` are
/// dropped from the sized view.
#[derive(Debug)]
pub struct Filelist {
    root: PathBuf,
    filters: Filters,
    paths: OnceLock<Vec<PathBuf>>,
    sized: OnceLock<SizedFiles>,
    extensions: OnceLock<BTreeSet<String>>,
    has_files: OnceLock<bool>,
    hashes: OnceLock<Vec<Option<Hash>>>,
    counters: IoCounters,
}

impl Filelist {
    /// Create a filelist for `root`. Performs no walk.
    ///
    /// # Errors
    ///
    /// - [`FilelistError::InvalidRange`] if `max_size < min_size`
    /// - [`FilelistError::PathNotFound`] if `root` does not exist
    /// - [`FilelistError::NotADirectory`] if `root` is not a directory
    pub fn new(root: impl AsRef<Path>, filters: Filters) -> Result<Self, FilelistError> {
        filters.validate()?;

        let root = root.as_ref();
        if !root.exists() {
            return Err(FilelistError::PathNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(FilelistError::NotADirectory(root.to_path_buf()));
        }
        let root = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());

        Ok(Self {
            root,
            filters,
            paths: OnceLock::new(),
            sized: OnceLock::new(),
            extensions: OnceLock::new(),
            has_files: OnceLock::new(),
            hashes: OnceLock::new(),
            counters: IoCounters::default(),
        })
    }

    /// Absolute input root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filters applied by this filelist.
    #[must_use]
    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    /// Filesystem call counters, for observing cache behaviour.
    #[must_use]
    pub fn io_counters(&self) -> &IoCounters {
        &self.counters
    }

    /// The filtered file paths, walking the subtree on first call.
    ///
    /// Paths are absolute and sorted by directory walk order (names sorted
    /// within each directory).
    pub fn paths(&self) -> &[PathBuf] {
        self.paths.get_or_init(|| self.walk())
    }

    /// Sizes aligned with [`sized_paths`](Self::sized_paths).
    pub fn sizes(&self) -> &[u64] {
        &self.sized().sizes
    }

    /// Paths aligned with [`sizes`](Self::sizes).
    ///
    /// Identical to [`paths`](Self::paths) except that files which vanished
    /// before they could be stat'ed are missing.
    pub fn sized_paths(&self) -> &[PathBuf] {
        &self.sized().paths
    }

    /// Number of filtered files.
    pub fn len(&self) -> usize {
        self.paths().len()
    }

    /// Whether the filtered set is empty. Walks the full subtree; prefer
    /// [`has_files`](Self::has_files) when only the answer matters.
    pub fn is_empty(&self) -> bool {
        self.paths().is_empty()
    }

    /// Sum of all sizes in the sized view.
    pub fn total_size(&self) -> u64 {
        self.sizes().iter().sum()
    }

    /// Distinct extensions among the filtered files (see [`extension_of`]).
    pub fn extensions(&self) -> &BTreeSet<String> {
        self.extensions.get_or_init(|| {
            let paths = self.paths();
            let found: HashSet<String> = paths
                .par_chunks(EXTENSION_CHUNK_SIZE)
                .map(|chunk| {
                    chunk
                        .iter()
                        .filter_map(|p| p.file_name())
                        .filter_map(|n| n.to_str())
                        .filter_map(extension_of)
                        .map(str::to_owned)
                        .collect::<HashSet<String>>()
                })
                .reduce(HashSet::new, |mut acc, set| {
                    acc.extend(set);
                    acc
                });
            log::debug!(
                "Found {} distinct extensions under {}",
                found.len(),
                self.root.display()
            );
            found.into_iter().collect()
        })
    }

    /// Whether at least one file passes the filters.
    ///
    /// Uses the cached list when it exists; otherwise walks only until the
    /// first match.
    pub fn has_files(&self) -> bool {
        if let Some(paths) = self.paths.get() {
            return !paths.is_empty();
        }
        *self.has_files.get_or_init(|| self.shallow_check())
    }

    /// Full BLAKE3 digests aligned with [`sized_paths`](Self::sized_paths).
    ///
    /// An unreadable file yields `None`.
    pub fn hashes(&self) -> &[Option<Hash>] {
        self.hashes.get_or_init(|| {
            let hasher = Hasher::new();
            self.sized_paths()
                .par_chunks(HASH_CHUNK_SIZE)
                .flat_map_iter(|chunk| {
                    chunk
                        .iter()
                        .map(|path| {
                            self.counters.hashes.fetch_add(1, Ordering::Relaxed);
                            match hasher.full_hash(path) {
                                Ok(hash) => Some(hash),
                                Err(e) => {
                                    log::warn!("Failed to hash {}: {}", path.display(), e);
                                    None
                                }
                            }
                        })
                        .collect::<Vec<_>>()
                })
                .collect()
        })
    }

    fn sized(&self) -> &SizedFiles {
        // Size-bounded walks fill this as a side effect.
        let paths = self.paths();
        self.sized.get_or_init(|| {
            let pairs: Vec<(PathBuf, u64)> = paths
                .par_chunks(STAT_CHUNK_SIZE)
                .flat_map_iter(|chunk| {
                    chunk
                        .iter()
                        .filter_map(|p| self.stat(p).map(|size| (p.clone(), size)))
                        .collect::<Vec<_>>()
                })
                .collect();
            let (paths, sizes) = pairs.into_iter().unzip();
            SizedFiles { paths, sizes }
        })
    }

    fn stat(&self, path: &Path) -> Option<u64> {
        self.counters.stats.fetch_add(1, Ordering::Relaxed);
        match fs::metadata(path) {
            Ok(meta) => Some(meta.len()),
            Err(e) => {
                log::debug!("Dropping {} (stat failed: {})", path.display(), e);
                None
            }
        }
    }

    fn walker(&self) -> impl Iterator<Item = PathBuf> + '_ {
        self.counters.walks.fetch_add(1, Ordering::Relaxed);
        WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) if entry.file_type().is_file() => Some(entry.into_path()),
                Ok(_) => None,
                Err(e) => {
                    log::warn!("Walker error: {}", e);
                    None
                }
            })
    }

    fn walk(&self) -> Vec<PathBuf> {
        log::debug!("Walking {}", self.root.display());
        let named: Vec<PathBuf> = self
            .walker()
            .filter(|p| self.filters.matches_name(p))
            .collect();

        if !self.filters.has_size_bounds() {
            log::info!("Found {} files under {}", named.len(), self.root.display());
            return named;
        }

        let sized: Vec<(PathBuf, u64)> = named
            .par_chunks(STAT_CHUNK_SIZE)
            .flat_map_iter(|chunk| {
                chunk
                    .iter()
                    .filter_map(|p| self.stat(p).map(|size| (p.clone(), size)))
                    .filter(|(_, size)| self.filters.matches_size(*size))
                    .collect::<Vec<_>>()
            })
            .collect();

        let (paths, sizes): (Vec<PathBuf>, Vec<u64>) = sized.into_iter().unzip();
        let _ = self.sized.set(SizedFiles {
            paths: paths.clone(),
            sizes,
        });
        log::info!(
            "Found {} files under {} within size bounds",
            paths.len(),
            self.root.display()
        );
        paths
    }

    fn shallow_check(&self) -> bool {
        let found = self
            .walker()
            .filter(|p| self.filters.matches_name(p))
            .any(|p| {
                !self.filters.has_size_bounds()
                    || self.stat(&p).is_some_and(|s| self.filters.matches_size(s))
            });
        log::trace!("Shallow check of {}: {}", self.root.display(), found);
        found
    }
}

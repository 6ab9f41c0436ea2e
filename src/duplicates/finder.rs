//! Staged duplicate detection over one or two file universes.
//!
//! # Overview
//!
//! Each stage is a function from one immutable bucket map to a narrower one.
//! A stage only starts once the previous stage's map is complete:
//!
//! 1. **Size**: [`stat_candidates`] then [`bucket_by_size`]. Zero-length files
//!    and buckets that cannot hold a match are dropped.
//! 2. **Prehash**: [`refine_by_prehash`] sub-buckets by the BLAKE3 digest of
//!    the first [`PREHASH_SIZE`](crate::scanner::PREHASH_SIZE) bytes.
//! 3. **Full hash**: [`refine_by_full_hash`] sub-buckets by the digest of the
//!    whole file.
//! 4. **Verify**: [`verify_buckets`] splits buckets by extension (unless
//!    disabled) and confirms membership byte for byte.
//!
//! Per-file work in stages 1 to 3 runs on a bounded rayon pool in fixed-size
//! batches. A file that vanishes or cannot be read is dropped, never fatal.
//!
//! # Example
//!
//! ```no_run
//! use copyall::duplicates::{DuplicateFinder, FinderConfig};
//! use copyall::scanner::{Filelist, Filters};
//!
//! let photos = Filelist::new("/home/user/Pictures", Filters::default()).unwrap();
//! let finder = DuplicateFinder::new(FinderConfig::default().with_io_threads(8));
//!
//! let (groups, stats) = finder.find_in_filelists(&photos, &photos).unwrap();
//! println!(
//!     "{} groups, {} removable files, {} bytes wasted ({} files hashed)",
//!     groups.len(),
//!     groups.duplicate_count(),
//!     groups.wasted_space(),
//!     stats.fullhash_candidates
//! );
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rayon::prelude::*;

use super::groups::{bucket_is_viable, Bucket, Candidate, DuplicateGroup, DuplicateGroupSet, Side};
use crate::progress::{ProgressCallback, ProgressTracker, RateModel};
use crate::scanner::{extension_of, files_identical, Filelist, Hash, HashError, Hasher, PREHASH_SIZE};
use crate::signal::{self, CancelToken};

/// Candidates grouped by exact size.
pub type SizeBuckets = HashMap<u64, Bucket>;

/// Key after the prehash stage.
pub type PrehashKey = (u64, Hash);

/// Candidates grouped by size and prehash.
pub type PrehashBuckets = HashMap<PrehashKey, Bucket>;

/// Key after the full hash stage.
pub type FullHashKey = (u64, Hash, Hash);

/// Candidates grouped by size, prehash and full hash.
pub type FullHashBuckets = HashMap<FullHashKey, Bucket>;

/// Configuration for the duplicate finder.
#[derive(Clone)]
pub struct FinderConfig {
    /// Worker threads for stat and hashing. Default 4 to avoid disk thrashing.
    pub io_threads: usize,
    /// Files per batch for the stat pass.
    pub stat_batch_size: usize,
    /// Files per batch for hashing.
    pub hash_batch_size: usize,
    /// Only report files with the same extension as duplicates.
    pub match_extensions: bool,
    /// Confirm full-hash matches byte for byte.
    pub verify_bytes: bool,
    /// Optional cancellation token.
    pub cancel: Option<CancelToken>,
    /// Optional progress callback.
    pub progress: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for FinderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FinderConfig")
            .field("io_threads", &self.io_threads)
            .field("stat_batch_size", &self.stat_batch_size)
            .field("hash_batch_size", &self.hash_batch_size)
            .field("match_extensions", &self.match_extensions)
            .field("verify_bytes", &self.verify_bytes)
            .field("cancel", &self.cancel)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl Default for FinderConfig {
    fn default() -> Self {
        Self {
            io_threads: 4,
            stat_batch_size: 20_000,
            hash_batch_size: 256,
            match_extensions: true,
            verify_bytes: true,
            cancel: None,
            progress: None,
        }
    }
}

impl FinderConfig {
    /// Set the worker thread count (at least 1).
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the stat batch size (at least 1).
    #[must_use]
    pub fn with_stat_batch_size(mut self, size: usize) -> Self {
        self.stat_batch_size = size.max(1);
        self
    }

    /// Set the hash batch size (at least 1).
    #[must_use]
    pub fn with_hash_batch_size(mut self, size: usize) -> Self {
        self.hash_batch_size = size.max(1);
        self
    }

    /// Require matching extensions within a group.
    #[must_use]
    pub fn with_match_extensions(mut self, enabled: bool) -> Self {
        self.match_extensions = enabled;
        self
    }

    /// Confirm groups byte for byte.
    #[must_use]
    pub fn with_verify_bytes(mut self, enabled: bool) -> Self {
        self.verify_bytes = enabled;
        self
    }

    /// Set the cancellation token.
    #[must_use]
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(callback);
        self
    }

    fn is_cancelled(&self) -> bool {
        signal::is_cancelled(self.cancel.as_ref())
    }

    fn hasher(&self) -> Hasher {
        match self.cancel {
            Some(ref token) => Hasher::new().with_shutdown_flag(token.flag()),
            None => Hasher::new(),
        }
    }

    fn check_cancelled(&self) -> Result<(), FinderError> {
        if self.is_cancelled() {
            log::info!("Duplicate search interrupted");
            return Err(FinderError::Interrupted);
        }
        Ok(())
    }
}

/// Statistics for one detection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinderStats {
    /// Distinct files across both universes.
    pub input_files: usize,
    /// Whether the universes were the same set.
    pub same_universe: bool,
    /// Files in viable size buckets.
    pub size_candidates: usize,
    /// Files in viable prehash buckets.
    pub prehash_candidates: usize,
    /// Files in viable full-hash buckets.
    pub fullhash_candidates: usize,
    /// Confirmed groups.
    pub duplicate_groups: usize,
    /// Removable files.
    pub duplicate_files: usize,
    /// Bytes reclaimed by removing the removable files.
    pub wasted_space: u64,
    /// Files dropped because they vanished or could not be read.
    pub unreadable_files: usize,
    /// Bytes read by the two hashing stages.
    pub bytes_hashed: u64,
    /// Wall-clock time of the run.
    pub duration: Duration,
}

impl FinderStats {
    /// Percentage of input files eliminated before verification.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.input_files == 0 {
            0.0
        } else {
            let eliminated = self.input_files.saturating_sub(self.fullhash_candidates);
            (eliminated as f64 / self.input_files as f64) * 100.0
        }
    }
}

/// Result of one stage.
#[derive(Debug, Clone, Default)]
pub struct Stage<T> {
    /// What the stage produced.
    pub output: T,
    /// Files dropped because they vanished or could not be read.
    pub dropped: usize,
    /// Bytes read while hashing.
    pub bytes_read: u64,
}

/// Errors that end a detection run.
#[derive(thiserror::Error, Debug)]
pub enum FinderError {
    /// The run was cancelled.
    #[error("Duplicate search interrupted by user")]
    Interrupted,

    /// The worker pool could not be created.
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Build a bounded pool for I/O heavy work.
pub(crate) fn build_io_pool(threads: usize) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .thread_name(|i| format!("copyall-io-{i}"))
        .build()
}

/// Per-phase progress reporting shared by the batch workers.
struct PhaseReporter<'a> {
    callback: Option<&'a Arc<dyn ProgressCallback>>,
    phase: &'static str,
    total: u64,
    done: AtomicU64,
    tracker: Mutex<ProgressTracker>,
}

impl<'a> PhaseReporter<'a> {
    fn start(config: &'a FinderConfig, phase: &'static str, total: usize) -> Self {
        let callback = config.progress.as_ref();
        if let Some(cb) = callback {
            cb.on_phase_start(phase, total as u64, RateModel::Files);
        }
        Self {
            callback,
            phase,
            total: total as u64,
            done: AtomicU64::new(0),
            tracker: Mutex::new(ProgressTracker::new(RateModel::Files)),
        }
    }

    fn batch_done(&self, files: usize) {
        let done = self.done.fetch_add(files as u64, Ordering::Relaxed) + files as u64;
        if let Some(cb) = self.callback {
            if let Ok(mut tracker) = self.tracker.lock() {
                cb.on_update(&tracker.snapshot(done, self.total));
            }
        }
    }

    fn end(self) {
        if let Some(cb) = self.callback {
            cb.on_phase_end(self.phase);
        }
    }
}

/// Stat every file once, in parallel batches.
///
/// Files that cannot be stat'ed are dropped and counted.
///
/// # Errors
///
/// [`FinderError::Interrupted`] when cancelled, [`FinderError::ThreadPool`]
/// when the pool cannot be built.
pub fn stat_candidates(
    universe: Vec<(PathBuf, Side)>,
    config: &FinderConfig,
) -> Result<Stage<Vec<Candidate>>, FinderError> {
    if universe.is_empty() {
        return Ok(Stage::default());
    }
    log::info!("Size stage: stat'ing {} files", universe.len());

    let pool = build_io_pool(config.io_threads)?;
    let reporter = PhaseReporter::start(config, "size", universe.len());

    let batches: Vec<(Vec<Candidate>, usize)> = pool.install(|| {
        universe
            .par_chunks(config.stat_batch_size.max(1))
            .map(|batch| {
                let mut sized = Vec::with_capacity(batch.len());
                let mut dropped = 0;
                for (path, side) in batch {
                    if config.is_cancelled() {
                        break;
                    }
                    match std::fs::metadata(path) {
                        Ok(meta) => sized.push(Candidate::new(path.clone(), meta.len(), *side)),
                        Err(e) => {
                            log::warn!("Dropping {} (stat failed: {})", path.display(), e);
                            dropped += 1;
                        }
                    }
                }
                reporter.batch_done(batch.len());
                (sized, dropped)
            })
            .collect()
    });
    reporter.end();
    config.check_cancelled()?;

    let mut stage: Stage<Vec<Candidate>> = Stage::default();
    for (sized, dropped) in batches {
        stage.output.extend(sized);
        stage.dropped += dropped;
    }
    Ok(stage)
}

/// Group candidates by exact size and keep only viable buckets.
///
/// Zero-length files never participate.
#[must_use]
pub fn bucket_by_size(candidates: Vec<Candidate>) -> SizeBuckets {
    let mut buckets: SizeBuckets = HashMap::new();
    for candidate in candidates {
        if candidate.size == 0 {
            log::trace!("Skipping empty file {}", candidate.path.display());
            continue;
        }
        buckets.entry(candidate.size).or_default().push(candidate);
    }
    buckets.retain(|_, bucket| bucket_is_viable(bucket));
    log::debug!(
        "Size stage: {} viable buckets, {} candidates",
        buckets.len(),
        count_candidates(&buckets)
    );
    buckets
}

/// Sub-bucket by the digest of each file's first chunk.
///
/// # Errors
///
/// See [`stat_candidates`].
pub fn refine_by_prehash(
    buckets: SizeBuckets,
    config: &FinderConfig,
) -> Result<Stage<PrehashBuckets>, FinderError> {
    let hasher = config.hasher();
    refine(
        buckets,
        config,
        "prehash",
        |path| hasher.prehash(path),
        |size| size.min(PREHASH_SIZE as u64),
        |&size, digest| (size, digest),
    )
}

/// Sub-bucket by the digest of the whole file.
///
/// # Errors
///
/// See [`stat_candidates`].
pub fn refine_by_full_hash(
    buckets: PrehashBuckets,
    config: &FinderConfig,
) -> Result<Stage<FullHashBuckets>, FinderError> {
    let hasher = config.hasher();
    refine(
        buckets,
        config,
        "fullhash",
        |path| hasher.full_hash(path),
        |size| size,
        |&(size, prehash), digest| (size, prehash, digest),
    )
}

/// Shared body of the two hashing stages.
fn refine<K, K2, H, B, C>(
    buckets: HashMap<K, Bucket>,
    config: &FinderConfig,
    phase: &'static str,
    hash: H,
    bytes_for: B,
    combine: C,
) -> Result<Stage<HashMap<K2, Bucket>>, FinderError>
where
    K: Send + Sync,
    K2: Eq + std::hash::Hash + Send,
    H: Fn(&Path) -> Result<Hash, HashError> + Sync,
    B: Fn(u64) -> u64 + Sync,
    C: Fn(&K, Hash) -> K2 + Sync,
{
    let work: Vec<(&K, &Candidate)> = buckets
        .iter()
        .flat_map(|(key, bucket)| bucket.iter().map(move |c| (key, c)))
        .collect();
    if work.is_empty() {
        return Ok(Stage {
            output: HashMap::new(),
            dropped: 0,
            bytes_read: 0,
        });
    }
    log::info!("{} stage: hashing {} files", phase, work.len());

    let pool = build_io_pool(config.io_threads)?;
    let reporter = PhaseReporter::start(config, phase, work.len());

    let batches: Vec<(Vec<(K2, Candidate)>, usize, u64)> = pool.install(|| {
        work.par_chunks(config.hash_batch_size.max(1))
            .map(|batch| {
                let mut hashed = Vec::with_capacity(batch.len());
                let mut dropped = 0;
                let mut bytes = 0;
                for &(key, candidate) in batch {
                    if config.is_cancelled() {
                        break;
                    }
                    match hash(&candidate.path) {
                        Ok(digest) => {
                            log::trace!("{} computed: {}", phase, candidate.path.display());
                            bytes += bytes_for(candidate.size);
                            hashed.push((combine(key, digest), candidate.clone()));
                        }
                        Err(e) => {
                            log::warn!("Failed to {} {}: {}", phase, candidate.path.display(), e);
                            dropped += 1;
                        }
                    }
                }
                reporter.batch_done(batch.len());
                (hashed, dropped, bytes)
            })
            .collect()
    });
    reporter.end();
    config.check_cancelled()?;

    let mut refined: HashMap<K2, Bucket> = HashMap::new();
    let mut dropped = 0;
    let mut bytes_read = 0;
    for (hashed, batch_dropped, batch_bytes) in batches {
        dropped += batch_dropped;
        bytes_read += batch_bytes;
        for (key, candidate) in hashed {
            refined.entry(key).or_default().push(candidate);
        }
    }
    refined.retain(|_, bucket| bucket_is_viable(bucket));
    log::debug!(
        "{} stage: {} viable buckets, {} candidates, {} dropped",
        phase,
        refined.len(),
        count_candidates(&refined),
        dropped
    );

    Ok(Stage {
        output: refined,
        dropped,
        bytes_read,
    })
}

/// Confirm full-hash buckets and turn them into groups.
///
/// Candidates are split by extension when `match_extensions` is set. Within a
/// split each file is compared against the first member of every cluster
/// found so far and joins the first one it matches, so confirmed members are
/// never compared against each other again.
///
/// # Errors
///
/// See [`stat_candidates`].
pub fn verify_buckets(
    buckets: FullHashBuckets,
    config: &FinderConfig,
) -> Result<Stage<Vec<DuplicateGroup>>, FinderError> {
    if buckets.is_empty() {
        return Ok(Stage::default());
    }
    log::info!("Verify stage: confirming {} buckets", buckets.len());

    let pool = build_io_pool(config.io_threads)?;
    let reporter = PhaseReporter::start(config, "verify", buckets.len());

    let results: Vec<(Vec<DuplicateGroup>, usize)> = pool.install(|| {
        buckets
            .into_par_iter()
            .map(|((size, _, _), bucket)| {
                let result = if config.is_cancelled() {
                    (Vec::new(), 0)
                } else {
                    verify_bucket(size, bucket, config)
                };
                reporter.batch_done(1);
                result
            })
            .collect()
    });
    reporter.end();
    config.check_cancelled()?;

    let mut stage: Stage<Vec<DuplicateGroup>> = Stage::default();
    for (groups, dropped) in results {
        stage.output.extend(groups);
        stage.dropped += dropped;
    }
    Ok(stage)
}

fn verify_bucket(size: u64, mut bucket: Bucket, config: &FinderConfig) -> (Vec<DuplicateGroup>, usize) {
    bucket.sort_by(|a, b| a.path.cmp(&b.path));

    let mut partitions: BTreeMap<Option<String>, Vec<Candidate>> = BTreeMap::new();
    for candidate in bucket {
        let key = if config.match_extensions {
            candidate
                .path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(extension_of)
                .map(str::to_owned)
        } else {
            None
        };
        partitions.entry(key).or_default().push(candidate);
    }

    let mut groups = Vec::new();
    let mut dropped = 0;
    for (ext, partition) in partitions {
        if !bucket_is_viable(&partition) {
            log::trace!("Extension {:?} cannot form a group of size {}", ext, size);
            continue;
        }
        let mut clusters: Vec<Vec<Candidate>> = Vec::new();
        'candidates: for candidate in partition {
            for cluster in &mut clusters {
                if !config.verify_bytes {
                    cluster.push(candidate);
                    continue 'candidates;
                }
                match files_identical(&cluster[0].path, &candidate.path) {
                    Ok(true) => {
                        cluster.push(candidate);
                        continue 'candidates;
                    }
                    Ok(false) => {
                        log::debug!(
                            "Digest collision: {} differs from {}",
                            candidate.path.display(),
                            cluster[0].path.display()
                        );
                    }
                    Err(e) => {
                        log::warn!("Failed to compare {}: {}", candidate.path.display(), e);
                        dropped += 1;
                        continue 'candidates;
                    }
                }
            }
            clusters.push(vec![candidate]);
        }
        groups.extend(
            clusters
                .iter()
                .filter(|cluster| bucket_is_viable(cluster))
                .map(|cluster| DuplicateGroup::from_candidates(size, cluster)),
        );
    }
    (groups, dropped)
}

fn count_candidates<K>(buckets: &HashMap<K, Bucket>) -> usize {
    buckets.values().map(Vec::len).sum()
}

/// Runs the four stages end to end.
#[derive(Debug, Default)]
pub struct DuplicateFinder {
    config: FinderConfig,
}

impl DuplicateFinder {
    /// Create a finder.
    #[must_use]
    pub fn new(config: FinderConfig) -> Self {
        Self { config }
    }

    /// Create a finder with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// The finder's configuration.
    #[must_use]
    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Find content-identical files between two path universes.
    ///
    /// When both slices contain the same set of paths, this is a self search
    /// and each file is read once.
    ///
    /// # Errors
    ///
    /// [`FinderError::Interrupted`] when cancelled, or
    /// [`FinderError::ThreadPool`].
    pub fn find_duplicates(
        &self,
        left: &[PathBuf],
        right: &[PathBuf],
    ) -> Result<(DuplicateGroupSet, FinderStats), FinderError> {
        let start = Instant::now();
        let same_universe = same_set(left, right);

        let universe: Vec<(PathBuf, Side)> = merge_universes(
            left.iter().map(|p| (p.clone(), Side::Left)),
            right.iter().map(|p| (p.clone(), Side::Right)),
            same_universe,
        );

        let mut stats = FinderStats {
            input_files: universe.len(),
            same_universe,
            ..FinderStats::default()
        };
        log::info!(
            "Starting duplicate search over {} files ({})",
            stats.input_files,
            if same_universe { "self" } else { "cross" }
        );
        self.config.check_cancelled()?;

        let sized = stat_candidates(universe, &self.config)?;
        stats.unreadable_files += sized.dropped;
        self.run_stages(sized.output, same_universe, stats, start)
    }

    /// Find duplicates between two filelists, reusing their cached sizes.
    ///
    /// Passing the same filelist twice runs a self search.
    ///
    /// # Errors
    ///
    /// See [`find_duplicates`](Self::find_duplicates).
    pub fn find_in_filelists(
        &self,
        left: &Filelist,
        right: &Filelist,
    ) -> Result<(DuplicateGroupSet, FinderStats), FinderError> {
        let start = Instant::now();
        let same_universe =
            std::ptr::eq(left, right) || same_set(left.sized_paths(), right.sized_paths());

        let sized_side = |list: &Filelist, side: Side| -> Vec<(PathBuf, u64, Side)> {
            list.sized_paths()
                .iter()
                .zip(list.sizes())
                .map(|(p, s)| (p.clone(), *s, side))
                .collect()
        };
        let mut merged: BTreeMap<PathBuf, (u64, Side)> = BTreeMap::new();
        for (path, size, side) in sized_side(left, Side::Left)
            .into_iter()
            .chain(if same_universe { Vec::new() } else { sized_side(right, Side::Right) })
        {
            let side = if same_universe { Side::Both } else { side };
            merged
                .entry(path)
                .and_modify(|(_, existing)| *existing = existing.merge(side))
                .or_insert((size, side));
        }

        let stats = FinderStats {
            input_files: merged.len(),
            same_universe,
            ..FinderStats::default()
        };
        log::info!(
            "Starting duplicate search over {} listed files ({})",
            stats.input_files,
            if same_universe { "self" } else { "cross" }
        );
        self.config.check_cancelled()?;

        let candidates = merged
            .into_iter()
            .map(|(path, (size, side))| Candidate::new(path, size, side))
            .collect();
        self.run_stages(candidates, same_universe, stats, start)
    }

    fn run_stages(
        &self,
        candidates: Vec<Candidate>,
        same_universe: bool,
        mut stats: FinderStats,
        start: Instant,
    ) -> Result<(DuplicateGroupSet, FinderStats), FinderError> {
        let by_size = bucket_by_size(candidates);
        stats.size_candidates = count_candidates(&by_size);

        let prehashed = refine_by_prehash(by_size, &self.config)?;
        stats.prehash_candidates = count_candidates(&prehashed.output);
        stats.unreadable_files += prehashed.dropped;
        stats.bytes_hashed += prehashed.bytes_read;

        let full = refine_by_full_hash(prehashed.output, &self.config)?;
        stats.fullhash_candidates = count_candidates(&full.output);
        stats.unreadable_files += full.dropped;
        stats.bytes_hashed += full.bytes_read;

        let verified = verify_buckets(full.output, &self.config)?;
        stats.unreadable_files += verified.dropped;

        let groups = DuplicateGroupSet::new(verified.output, same_universe);
        stats.duplicate_groups = groups.len();
        stats.duplicate_files = groups.duplicate_count();
        stats.wasted_space = groups.wasted_space();
        stats.duration = start.elapsed();

        log::info!(
            "Duplicate search complete: {} groups, {} removable files, {} bytes reclaimable ({:.1}% eliminated before verify) in {:.2?}",
            stats.duplicate_groups,
            stats.duplicate_files,
            stats.wasted_space,
            stats.elimination_rate(),
            stats.duration
        );
        Ok((groups, stats))
    }
}

fn same_set(left: &[PathBuf], right: &[PathBuf]) -> bool {
    let left: HashSet<&PathBuf> = left.iter().collect();
    let right: HashSet<&PathBuf> = right.iter().collect();
    left == right
}

fn merge_universes(
    left: impl Iterator<Item = (PathBuf, Side)>,
    right: impl Iterator<Item = (PathBuf, Side)>,
    same_universe: bool,
) -> Vec<(PathBuf, Side)> {
    let mut merged: BTreeMap<PathBuf, Side> = BTreeMap::new();
    if same_universe {
        merged.extend(left.map(|(p, _)| (p, Side::Both)));
    } else {
        for (path, side) in left.chain(right) {
            merged
                .entry(path)
                .and_modify(|existing| *existing = existing.merge(side))
                .or_insert(side);
        }
    }
    merged.into_iter().collect()
}

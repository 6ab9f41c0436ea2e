//! Bulk copy, move, trash and delete over a filtered file set.
//!
//! # Overview
//!
//! [`TransferEngine::run`] enumerates an input subtree through a
//! [`Filelist`], then processes the files in fixed-size batches on a bounded
//! rayon pool. Per file:
//!
//! - the destination directory is the output root, plus the file's relative
//!   subdirectory when `keep_structure` is set
//! - a free destination name gets the raw operation
//! - a taken name goes through [`conflict::resolve`]
//! - every per-file failure is classified into an [`ErrorKind`] and counted
//!
//! Each batch reports a [`BatchDelta`] over a channel. Only the coordinating
//! thread owns the running totals, so concurrent batches never share a
//! mutable counter. A file that fails is removed from both the processed
//! count and the total, so the progress fraction never exceeds 1.
//!
//! A destination directory that cannot be created stops the run with
//! [`TransferError::DestinationUnavailable`]; nothing else does.
//!
//! # Example
//!
//! ```no_run
//! use copyall::actions::{TransferConfig, TransferEngine, TransferMode};
//! use copyall::scanner::Filters;
//! use std::path::Path;
//!
//! let engine = TransferEngine::new(TransferConfig::new(TransferMode::Copy));
//! let report = engine
//!     .run(Path::new("/media/card"), Some(Path::new("/backup/photos")), Filters::default())
//!     .unwrap();
//!
//! println!("{} files copied, {}", report.processed_files, report.summary);
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;

use super::conflict::{self, ConflictMode, DestinationUnavailable};
use super::ops::{self, OpError};
use super::summary::{ErrorKind, ErrorSummary};
use crate::duplicates::finder::build_io_pool;
use crate::progress::{progress_fraction, ProgressCallback, ProgressTracker};
use crate::scanner::{FilelistError, Filelist, Filters};
use crate::signal::{self, CancelToken};

pub use crate::progress::RateModel;

/// The operation applied to every selected file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferMode {
    /// Copy into the output root.
    Copy,
    /// Move into the output root.
    Move,
    /// Send to the system trash.
    Trash,
    /// Delete irreversibly. Requires explicit confirmation.
    PermanentDelete,
}

impl TransferMode {
    /// Whether the mode writes into an output root.
    #[must_use]
    pub fn needs_output(self) -> bool {
        matches!(self, Self::Copy | Self::Move)
    }

    /// The collision behaviour for modes with a destination.
    #[must_use]
    pub fn conflict_mode(self) -> Option<ConflictMode> {
        match self {
            Self::Copy => Some(ConflictMode::Copy),
            Self::Move => Some(ConflictMode::Move),
            Self::Trash | Self::PermanentDelete => None,
        }
    }

    /// Lowercase verb for log lines.
    #[must_use]
    pub fn verb(self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Move => "move",
            Self::Trash => "trash",
            Self::PermanentDelete => "delete",
        }
    }
}

/// Configuration for a transfer run.
#[derive(Clone)]
pub struct TransferConfig {
    /// Operation to perform.
    pub mode: TransferMode,
    /// Mirror subdirectories under the output root.
    pub keep_structure: bool,
    /// Explicit consent for [`TransferMode::PermanentDelete`].
    pub confirm_permanent_delete: bool,
    /// Worker threads.
    pub io_threads: usize,
    /// Files per batch.
    pub batch_size: usize,
    /// Numbered names tried per collision.
    pub max_retries: usize,
    /// Optional cancellation token.
    pub cancel: Option<CancelToken>,
    /// Optional progress callback.
    pub progress: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for TransferConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferConfig")
            .field("mode", &self.mode)
            .field("keep_structure", &self.keep_structure)
            .field("confirm_permanent_delete", &self.confirm_permanent_delete)
            .field("io_threads", &self.io_threads)
            .field("batch_size", &self.batch_size)
            .field("max_retries", &self.max_retries)
            .field("cancel", &self.cancel)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl TransferConfig {
    /// Defaults for `mode`: keep structure, 4 threads, batches of 512,
    /// 100 rename attempts, no delete confirmation.
    #[must_use]
    pub fn new(mode: TransferMode) -> Self {
        Self {
            mode,
            keep_structure: true,
            confirm_permanent_delete: false,
            io_threads: 4,
            batch_size: 512,
            max_retries: 100,
            cancel: None,
            progress: None,
        }
    }

    /// Mirror (true) or flatten (false) subdirectories.
    #[must_use]
    pub fn with_keep_structure(mut self, keep: bool) -> Self {
        self.keep_structure = keep;
        self
    }

    /// Consent to permanent deletion.
    #[must_use]
    pub fn with_confirm_permanent_delete(mut self, confirm: bool) -> Self {
        self.confirm_permanent_delete = confirm;
        self
    }

    /// Set the worker thread count (at least 1).
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the batch size (at least 1).
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set the number of numbered names tried per collision.
    #[must_use]
    pub fn with_max_retries(mut self, retries: usize) -> Self {
        self.max_retries = retries;
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
}

/// Errors that stop a run.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Permanent deletion was requested without confirmation.
    #[error("Permanent deletion requires explicit confirmation")]
    ConfirmationRequired,

    /// Copy or move without an output root.
    #[error("An output directory is required to {}", .0.verb())]
    MissingOutput(TransferMode),

    /// An explicit path list only supports trash and delete.
    #[error("Cannot {} an explicit path list; use trash or delete", .0.verb())]
    UnsupportedMode(TransferMode),

    /// Inverted size bounds.
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

    /// The input root is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A destination directory could not be created.
    #[error(transparent)]
    DestinationUnavailable(#[from] DestinationUnavailable),

    /// The run was cancelled.
    #[error("Transfer interrupted by user")]
    Interrupted,

    /// The worker pool could not be created.
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl TransferError {
    /// Summary kind for this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        if self.is_configuration() {
            ErrorKind::InvalidConfiguration
        } else {
            ErrorKind::UnknownTransferError
        }
    }

    /// Whether the error was raised before any I/O.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ConfirmationRequired
                | Self::MissingOutput(_)
                | Self::UnsupportedMode(_)
                | Self::InvalidRange { .. }
                | Self::PathNotFound(_)
                | Self::NotADirectory(_)
        )
    }
}

impl From<FilelistError> for TransferError {
    fn from(err: FilelistError) -> Self {
        match err {
            FilelistError::InvalidRange { min, max } => Self::InvalidRange { min, max },
            FilelistError::PathNotFound(p) => Self::PathNotFound(p),
            FilelistError::NotADirectory(p) => Self::NotADirectory(p),
        }
    }
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferReport {
    /// Operation performed.
    pub mode: TransferMode,
    /// Unit progress was reported in.
    pub rate_model: RateModel,
    /// Outcome counts by kind.
    pub summary: ErrorSummary,
    /// Files selected.
    pub total_files: usize,
    /// Files handled (including unchanged, discarded and renamed).
    pub processed_files: usize,
    /// Files that failed.
    pub failed_files: usize,
    /// Bytes selected.
    pub total_bytes: u64,
    /// Bytes handled.
    pub processed_bytes: u64,
    /// Bytes of files that failed.
    pub failed_bytes: u64,
    /// Wall-clock seconds.
    pub duration_secs: f64,
}

impl TransferReport {
    fn empty(mode: TransferMode, rate_model: RateModel) -> Self {
        Self {
            mode,
            rate_model,
            summary: ErrorSummary::new(),
            total_files: 0,
            processed_files: 0,
            failed_files: 0,
            total_bytes: 0,
            processed_bytes: 0,
            failed_bytes: 0,
            duration_secs: 0.0,
        }
    }

    /// Number of failed files as counted by the summary.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.summary.failure_count()
    }

    /// Whether every file was handled.
    #[must_use]
    pub fn is_complete_success(&self) -> bool {
        self.error_count() == 0
    }

    /// Final progress fraction in the run's unit.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        match self.rate_model {
            RateModel::Bytes => progress_fraction(
                self.processed_bytes,
                self.total_bytes.saturating_sub(self.failed_bytes),
            ),
            RateModel::Files => progress_fraction(
                self.processed_files as u64,
                (self.total_files - self.failed_files) as u64,
            ),
        }
    }
}

/// Totals produced by one batch.
#[derive(Debug, Default)]
pub struct BatchDelta {
    /// Outcome counts.
    pub summary: ErrorSummary,
    /// Files handled.
    pub files_done: usize,
    /// Bytes handled.
    pub bytes_done: u64,
    /// Files that failed.
    pub files_failed: usize,
    /// Bytes of files that failed.
    pub bytes_failed: u64,
    /// Run-level failure that stopped this batch.
    pub fatal: Option<DestinationUnavailable>,
}

impl BatchDelta {
    fn record(&mut self, item: &WorkItem, kind: Option<ErrorKind>) {
        if let Some(kind) = kind {
            self.summary.record(kind);
            if kind.is_failure() {
                self.files_failed += 1;
                self.bytes_failed += item.size;
                return;
            }
        }
        self.files_done += 1;
        self.bytes_done += item.size;
    }
}

/// One file to process.
#[derive(Debug, Clone)]
struct WorkItem {
    source: PathBuf,
    size: u64,
    destination_dir: Option<PathBuf>,
}

/// Totals owned by the coordinating thread.
struct Accumulator {
    report: TransferReport,
    tracker: ProgressTracker,
    fatal: Option<DestinationUnavailable>,
}

impl Accumulator {
    fn apply(&mut self, delta: BatchDelta) {
        self.report.summary.merge(&delta.summary);
        self.report.processed_files += delta.files_done;
        self.report.processed_bytes += delta.bytes_done;
        self.report.failed_files += delta.files_failed;
        self.report.failed_bytes += delta.bytes_failed;
        if self.fatal.is_none() {
            self.fatal = delta.fatal;
        }
    }

    fn progress_counts(&self) -> (u64, u64) {
        let r = &self.report;
        match r.rate_model {
            RateModel::Bytes => (r.processed_bytes, r.total_bytes.saturating_sub(r.failed_bytes)),
            RateModel::Files => (
                r.processed_files as u64,
                (r.total_files - r.failed_files) as u64,
            ),
        }
    }
}

/// Runs transfers according to a [`TransferConfig`].
#[derive(Debug)]
pub struct TransferEngine {
    config: TransferConfig,
}

impl TransferEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(config: TransferConfig) -> Self {
        Self { config }
    }

    /// The engine's configuration.
    #[must_use]
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Apply the configured mode to every file under `input_root` passing
    /// `filters`.
    ///
    /// `output_root` is required for Copy and Move and ignored otherwise.
    ///
    /// # Errors
    ///
    /// Configuration errors are returned before any filesystem change.
    /// [`TransferError::DestinationUnavailable`] and
    /// [`TransferError::Interrupted`] stop a run midway.
    pub fn run(
        &self,
        input_root: &Path,
        output_root: Option<&Path>,
        filters: Filters,
    ) -> Result<TransferReport, TransferError> {
        self.validate(output_root)?;
        let filelist = Filelist::new(input_root, filters)?;
        self.run_filelist(&filelist, output_root)
    }

    /// Like [`run`](Self::run) over an existing filelist.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn run_filelist(
        &self,
        filelist: &Filelist,
        output_root: Option<&Path>,
    ) -> Result<TransferReport, TransferError> {
        self.validate(output_root)?;
        let mode = self.config.mode;

        let output_root = match output_root {
            Some(out) if mode.needs_output() => {
                Some(std::path::absolute(out).unwrap_or_else(|_| out.to_path_buf()))
            }
            _ => None,
        };
        let rate_model = rate_model_for(mode, filelist.root(), output_root.as_deref());

        if !filelist.has_files() {
            log::info!(
                "Nothing to {} under {}",
                mode.verb(),
                filelist.root().display()
            );
            return Ok(TransferReport::empty(mode, rate_model));
        }

        if let Some(ref out) = output_root {
            conflict::ensure_dir(out)?;
        }

        let items: Vec<WorkItem> = filelist
            .sized_paths()
            .iter()
            .zip(filelist.sizes())
            .map(|(source, &size)| WorkItem {
                destination_dir: output_root
                    .as_deref()
                    .map(|out| self.destination_dir(filelist.root(), out, source)),
                source: source.clone(),
                size,
            })
            .collect();

        log::info!(
            "Starting {} of {} files from {}{}",
            mode.verb(),
            items.len(),
            filelist.root().display(),
            output_root
                .as_ref()
                .map(|o| format!(" to {}", o.display()))
                .unwrap_or_default()
        );
        self.execute(items, rate_model)
    }

    /// Trash or delete an explicit list of files, such as the removable
    /// members of a duplicate search.
    ///
    /// # Errors
    ///
    /// [`TransferError::UnsupportedMode`] for Copy and Move,
    /// [`TransferError::ConfirmationRequired`] for an unconfirmed permanent
    /// delete, and the run-level errors of [`run`](Self::run).
    pub fn discard(&self, paths: &[PathBuf]) -> Result<TransferReport, TransferError> {
        let mode = self.config.mode;
        if mode.needs_output() {
            return Err(TransferError::UnsupportedMode(mode));
        }
        self.validate(None)?;

        let items: Vec<WorkItem> = paths
            .iter()
            .map(|p| WorkItem {
                source: p.clone(),
                size: std::fs::metadata(p).map(|m| m.len()).unwrap_or(0),
                destination_dir: None,
            })
            .collect();
        if items.is_empty() {
            return Ok(TransferReport::empty(mode, RateModel::Files));
        }
        log::info!("Starting {} of {} listed files", mode.verb(), items.len());
        self.execute(items, RateModel::Files)
    }

    fn validate(&self, output_root: Option<&Path>) -> Result<(), TransferError> {
        let mode = self.config.mode;
        if mode == TransferMode::PermanentDelete && !self.config.confirm_permanent_delete {
            return Err(TransferError::ConfirmationRequired);
        }
        if mode.needs_output() && output_root.is_none() {
            return Err(TransferError::MissingOutput(mode));
        }
        Ok(())
    }

    fn destination_dir(&self, input_root: &Path, output_root: &Path, source: &Path) -> PathBuf {
        if !self.config.keep_structure {
            return output_root.to_path_buf();
        }
        source
            .strip_prefix(input_root)
            .ok()
            .and_then(Path::parent)
            .map_or_else(|| output_root.to_path_buf(), |rel| output_root.join(rel))
    }

    fn execute(
        &self,
        items: Vec<WorkItem>,
        rate_model: RateModel,
    ) -> Result<TransferReport, TransferError> {
        let start = Instant::now();
        let mode = self.config.mode;
        let pool = build_io_pool(self.config.io_threads)?;

        let mut report = TransferReport::empty(mode, rate_model);
        report.total_files = items.len();
        report.total_bytes = items.iter().map(|i| i.size).sum();

        let total_units = match rate_model {
            RateModel::Bytes => report.total_bytes,
            RateModel::Files => report.total_files as u64,
        };
        if let Some(ref cb) = self.config.progress {
            cb.on_phase_start("transfer", total_units, rate_model);
        }

        let mut acc = Accumulator {
            report,
            tracker: ProgressTracker::new(rate_model),
            fatal: None,
        };
        let abort = AtomicBool::new(false);
        let (tx, rx) = mpsc::channel::<BatchDelta>();

        std::thread::scope(|scope| {
            let items = &items;
            let pool = &pool;
            let abort = &abort;
            scope.spawn(move || {
                pool.install(|| {
                    items
                        .par_chunks(self.config.batch_size.max(1))
                        .for_each_with(tx, |tx, batch| {
                            let delta = self.process_batch(batch, abort);
                            if delta.fatal.is_some() {
                                abort.store(true, Ordering::SeqCst);
                            }
                            let _ = tx.send(delta);
                        });
                });
            });

            for delta in rx {
                log::debug!(
                    "Batch done: {} ok, {} failed",
                    delta.files_done,
                    delta.files_failed
                );
                acc.apply(delta);
                if let Some(ref cb) = self.config.progress {
                    let (processed, total) = acc.progress_counts();
                    cb.on_update(&acc.tracker.snapshot(processed, total));
                }
            }
        });

        if let Some(ref cb) = self.config.progress {
            cb.on_phase_end("transfer");
        }
        if let Some(fatal) = acc.fatal {
            log::error!("{}", fatal);
            return Err(TransferError::DestinationUnavailable(fatal));
        }
        if self.config.is_cancelled() {
            log::info!("Transfer interrupted");
            return Err(TransferError::Interrupted);
        }

        let mut report = acc.report;
        report.duration_secs = start.elapsed().as_secs_f64();
        log::info!(
            "{} finished: {} of {} files handled, {} failed ({}) in {:.2}s",
            mode.verb(),
            report.processed_files,
            report.total_files,
            report.failed_files,
            report.summary,
            report.duration_secs
        );
        Ok(report)
    }

    fn process_batch(&self, batch: &[WorkItem], abort: &AtomicBool) -> BatchDelta {
        let mut delta = BatchDelta::default();
        for item in batch {
            if abort.load(Ordering::SeqCst) || self.config.is_cancelled() {
                break;
            }
            match self.process_one(item) {
                Ok(kind) => delta.record(item, kind),
                Err(fatal) => {
                    delta.fatal = Some(fatal);
                    break;
                }
            }
        }
        delta
    }

    /// `Ok(None)` for a plain success, `Ok(Some(kind))` for anything worth
    /// counting, `Err` for a run-level failure.
    fn process_one(&self, item: &WorkItem) -> Result<Option<ErrorKind>, DestinationUnavailable> {
        let source = &item.source;
        let result = match (self.config.mode.conflict_mode(), &item.destination_dir) {
            (Some(conflict_mode), Some(dir)) => {
                return self.place(source, dir, conflict_mode);
            }
            (None, _) if self.config.mode == TransferMode::Trash => ops::trash_file(source),
            (None, _) => ops::delete_file(source),
            // Modes with a destination always get one
            (Some(_), None) => return Ok(Some(ErrorKind::UnknownTransferError)),
        };
        Ok(classify(source, result))
    }

    fn place(
        &self,
        source: &Path,
        dir: &Path,
        mode: ConflictMode,
    ) -> Result<Option<ErrorKind>, DestinationUnavailable> {
        let Some(name) = source.file_name() else {
            return Ok(Some(ErrorKind::UnknownTransferError));
        };
        conflict::ensure_dir(dir)?;
        let target = dir.join(name);

        if target.symlink_metadata().is_err() {
            let result = match mode {
                ConflictMode::Copy => ops::copy_file(source, &target),
                ConflictMode::Move => ops::move_file(source, &target),
            };
            match result {
                Err(OpError::AlreadyExists(_)) => {
                    // Another batch wrote the same name first
                }
                other => return Ok(classify(source, other)),
            }
        }

        let outcome = conflict::resolve(source, dir, mode, self.config.max_retries)?;
        log::trace!("Conflict on {}: {:?}", target.display(), outcome);
        Ok(outcome.error_kind())
    }
}

fn classify(source: &Path, result: Result<u64, OpError>) -> Option<ErrorKind> {
    match result {
        Ok(_) => None,
        Err(OpError::NotFound(_)) => {
            log::warn!("Source vanished: {}", source.display());
            Some(ErrorKind::SourceVanished)
        }
        Err(e) => {
            log::warn!("Failed to process {}: {}", source.display(), e);
            Some(ErrorKind::UnknownTransferError)
        }
    }
}

/// Unit progress is measured in for `mode`.
///
/// Copies and cross-volume moves are bandwidth bound; everything else is a
/// metadata operation per file.
#[must_use]
pub fn rate_model_for(mode: TransferMode, input_root: &Path, output_root: Option<&Path>) -> RateModel {
    match (mode, output_root) {
        (TransferMode::Copy, _) => RateModel::Bytes,
        (TransferMode::Move, Some(out)) if !ops::same_volume(input_root, out) => RateModel::Bytes,
        _ => RateModel::Files,
    }
}

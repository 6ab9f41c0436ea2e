//! Progress and ETA reporting.
//!
//! The engines never print. They hand a [`ProgressCallback`] three numbers on
//! every update (fraction complete, estimated seconds remaining, current
//! rate) wrapped in a [`ProgressSnapshot`]. How those are shown is up to the
//! callback:
//!
//! - [`TerminalProgress`] draws an indicatif bar whose message is the
//!   [`TextBar`] rendering
//! - [`NoProgress`] discards everything
//!
//! # Rate models
//!
//! Copying (and moving across volumes) is bandwidth bound, so progress is
//! counted in bytes. Renames within a volume, trashing and deleting are
//! metadata operations with a roughly constant per-file cost, so progress is
//! counted in files. See [`RateModel`].
//!
//! # Example
//!
//! ```
//! use copyall::progress::{ProgressTracker, RateModel, TextBar};
//!
//! let mut tracker = ProgressTracker::new(RateModel::Files);
//! let snapshot = tracker.snapshot(5, 10);
//! assert_eq!(snapshot.fraction, 0.5);
//!
//! let line = TextBar::new(10).render(&snapshot);
//! assert!(line.starts_with("~<{/////-----}>~"));
//! ```

use std::sync::Mutex;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

const SECONDS_PER_MINUTE: f64 = 60.0;
const SECONDS_PER_HOUR: f64 = 60.0 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: f64 = 24.0 * SECONDS_PER_HOUR;
const SECONDS_PER_YEAR: f64 = 365.0 * SECONDS_PER_DAY;

/// Unit in which work is measured for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateModel {
    /// Work is proportional to bytes moved.
    Bytes,
    /// Work is proportional to the number of files touched.
    Files,
}

impl RateModel {
    /// Label used when rendering a rate.
    #[must_use]
    pub fn unit_label(self) -> &'static str {
        match self {
            Self::Bytes => "bytes",
            Self::Files => "files",
        }
    }
}

/// Elapsed-time based ETA estimator.
///
/// The start instant is fixed at construction. The most recent estimate is
/// kept so callers can re-render without recomputing.
#[derive(Debug, Clone)]
pub struct Eta {
    start: Instant,
    last_estimate: Option<f64>,
}

impl Default for Eta {
    fn default() -> Self {
        Self::new()
    }
}

impl Eta {
    /// Start the clock now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            last_estimate: None,
        }
    }

    /// Time since construction.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Seconds remaining if `fraction` of the work took the elapsed time.
    ///
    /// `fraction` is clamped to `[0, 1]`. Returns `None` at zero progress.
    #[must_use]
    pub fn time_remaining(&self, fraction: f64) -> Option<f64> {
        remaining_for(self.elapsed().as_secs_f64(), fraction)
    }

    /// Compute and remember a new estimate.
    pub fn update(&mut self, fraction: f64) -> Option<f64> {
        self.last_estimate = self.time_remaining(fraction);
        self.last_estimate
    }

    /// The estimate stored by the last [`update`](Self::update).
    #[must_use]
    pub fn last_estimate(&self) -> Option<f64> {
        self.last_estimate
    }
}

fn remaining_for(elapsed: f64, fraction: f64) -> Option<f64> {
    let fraction = fraction.clamp(0.0, 1.0);
    if fraction <= 0.0 || fraction.is_nan() {
        return None;
    }
    Some((elapsed / fraction - elapsed).max(0.0))
}

/// The three numbers every progress update carries, plus the raw counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    /// Fraction complete in `[0, 1]`.
    pub fraction: f64,
    /// Estimated seconds remaining, if any progress has been made.
    pub eta_secs: Option<f64>,
    /// Units processed per second, if any time has elapsed.
    pub rate: Option<f64>,
    /// What `processed`, `total` and `rate` count.
    pub units: RateModel,
    /// Units processed so far.
    pub processed: u64,
    /// Units expected in total (already corrected for failures).
    pub total: u64,
}

/// Turns processed/total counts into [`ProgressSnapshot`]s for one session.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    eta: Eta,
    units: RateModel,
}

impl ProgressTracker {
    /// Begin a session counted in `units`.
    #[must_use]
    pub fn new(units: RateModel) -> Self {
        Self {
            eta: Eta::new(),
            units,
        }
    }

    /// Units of this session.
    #[must_use]
    pub fn units(&self) -> RateModel {
        self.units
    }

    /// Build a snapshot for the given counts.
    ///
    /// A zero `total` counts as complete.
    pub fn snapshot(&mut self, processed: u64, total: u64) -> ProgressSnapshot {
        let fraction = progress_fraction(processed, total);
        let eta_secs = self.eta.update(fraction);
        let elapsed = self.eta.elapsed().as_secs_f64();
        let rate = (elapsed > 0.0).then(|| processed as f64 / elapsed);
        ProgressSnapshot {
            fraction,
            eta_secs,
            rate,
            units: self.units,
            processed,
            total,
        }
    }
}

/// `processed / total`, clamped to `[0, 1]`; `1.0` when there is nothing to do.
#[must_use]
pub fn progress_fraction(processed: u64, total: u64) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (processed as f64 / total as f64).clamp(0.0, 1.0)
}

/// Break seconds down into years, days, hours, minutes and seconds.
///
/// Years are 365 days.
///
/// ```
/// use copyall::progress::format_duration;
///
/// assert_eq!(
///     format_duration(90061.5),
///     " 0 years,   1 days,  1 hours,  1 minutes,  1.50 seconds"
/// );
/// ```
#[must_use]
pub fn format_duration(secs: f64) -> String {
    let mut rest = secs.max(0.0);
    let years = (rest / SECONDS_PER_YEAR).floor();
    rest -= years * SECONDS_PER_YEAR;
    let days = (rest / SECONDS_PER_DAY).floor();
    rest -= days * SECONDS_PER_DAY;
    let hours = (rest / SECONDS_PER_HOUR).floor();
    rest -= hours * SECONDS_PER_HOUR;
    let minutes = (rest / SECONDS_PER_MINUTE).floor();
    rest -= minutes * SECONDS_PER_MINUTE;

    format!(
        "{:2} years, {:3} days, {:2} hours, {:2} minutes, {:5.2} seconds",
        years as u64, days as u64, hours as u64, minutes as u64, rest
    )
}

/// Plain-text progress line.
///
/// ```text
/// ~<{//////////----------}>~  50.00% | <eta> remaining | 12.50 files/s
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextBar {
    width: usize,
}

impl Default for TextBar {
    fn default() -> Self {
        Self { width: 100 }
    }
}

impl TextBar {
    /// A bar `width` characters wide between the braces.
    #[must_use]
    pub fn new(width: usize) -> Self {
        Self { width }
    }

    /// Render one line for `snapshot`.
    #[must_use]
    pub fn render(&self, snapshot: &ProgressSnapshot) -> String {
        let fraction = snapshot.fraction.clamp(0.0, 1.0);
        let filled = ((fraction * self.width as f64).round() as usize).min(self.width);
        let bar = format!("{}{}", "/".repeat(filled), "-".repeat(self.width - filled));

        let eta = snapshot
            .eta_secs
            .map_or_else(|| "N/A".to_string(), format_duration);
        let rate = snapshot
            .rate
            .map_or_else(|| "N/A".to_string(), |r| format!("{r:8.2}"));

        format!(
            "~<{{{bar}}}>~ {:6.2}% | {eta} remaining | {rate} {}/s",
            fraction * 100.0,
            snapshot.units.unit_label()
        )
    }
}

/// Receives progress from the duplicate finder and the transfer engine.
///
/// Implementations must be cheap; they are called from worker threads after
/// every batch.
pub trait ProgressCallback: Send + Sync {
    /// A phase ("size", "prehash", "fullhash", "verify", "transfer") starts
    /// with `total` units of work.
    fn on_phase_start(&self, phase: &str, total: u64, units: RateModel);

    /// New numbers for the running phase.
    fn on_update(&self, snapshot: &ProgressSnapshot);

    /// The running phase completed.
    fn on_phase_end(&self, phase: &str);

    /// Free-form status text.
    fn on_message(&self, _message: &str) {}
}

/// Callback that ignores every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_phase_start(&self, _phase: &str, _total: u64, _units: RateModel) {}
    fn on_update(&self, _snapshot: &ProgressSnapshot) {}
    fn on_phase_end(&self, _phase: &str) {}
}

/// Terminal progress using indicatif, one bar per phase.
pub struct TerminalProgress {
    bar: Mutex<Option<ProgressBar>>,
    text: TextBar,
    quiet: bool,
}

impl std::fmt::Debug for TerminalProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalProgress")
            .field("text", &self.text)
            .field("quiet", &self.quiet)
            .finish_non_exhaustive()
    }
}

impl TerminalProgress {
    /// Create a reporter. Nothing is drawn when `quiet` is set.
    ///
    /// ```
    /// use copyall::progress::TerminalProgress;
    ///
    /// let progress = TerminalProgress::new(false, 60);
    /// ```
    #[must_use]
    pub fn new(quiet: bool, bar_width: usize) -> Self {
        Self {
            bar: Mutex::new(None),
            text: TextBar::new(bar_width),
            quiet,
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::with_template("{prefix:>8} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_phase_start(&self, phase: &str, total: u64, _units: RateModel) {
        if self.quiet {
            return;
        }
        let pb = ProgressBar::new(total);
        pb.set_style(Self::style());
        pb.set_prefix(phase.to_string());
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(previous) = slot.replace(pb) {
                previous.finish_and_clear();
            }
        }
    }

    fn on_update(&self, snapshot: &ProgressSnapshot) {
        if self.quiet {
            return;
        }
        if let Ok(slot) = self.bar.lock() {
            if let Some(ref pb) = *slot {
                pb.set_length(snapshot.total);
                pb.set_position(snapshot.processed.min(snapshot.total));
                pb.set_message(self.text.render(snapshot));
            }
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(pb) = slot.take() {
                pb.finish_with_message(format!("{phase} complete"));
            }
        }
    }

    fn on_message(&self, message: &str) {
        if self.quiet {
            return;
        }
        if let Ok(slot) = self.bar.lock() {
            match *slot {
                Some(ref pb) => pb.set_message(message.to_string()),
                None => log::info!("{}", message),
            }
        }
    }
}

//! Live progress for sync and embedding runs.
//!
//! Two complementary mechanisms:
//!
//! - [`ProgressTracker`] holds the `{active, total, done, failed}` counters a
//!   UI polls through [`ProgressTracker::snapshot`]. Counters can only be
//!   touched through the [`ActiveRun`] handle returned by
//!   [`ProgressTracker::start`], so recording outside a run is impossible.
//! - [`ProgressReporter`] receives [`RunEvent`]s for logging or event streams,
//!   decoupled from the counters.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::AppError;

/// Point-in-time view of a run's progress.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProgressState {
    /// True between `start` and `finish`.
    pub active: bool,
    /// Number of units (products) the run will account for.
    pub total: usize,
    /// Units processed successfully.
    pub done: usize,
    /// Units that failed or were never processed.
    pub failed: usize,
}

impl ProgressState {
    /// Units accounted for so far.
    pub fn processed(&self) -> usize {
        self.done + self.failed
    }

    /// Units not yet accounted for.
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.processed())
    }

    /// True once every unit has been accounted for.
    pub fn is_complete(&self) -> bool {
        self.processed() == self.total
    }
}

/// Shared progress counters for one run at a time.
///
/// Share it behind an `Arc` when a UI task polls it while a run executes.
///
/// # Example
///
/// ```
/// use foodflow_core::progress::ProgressTracker;
///
/// let tracker = ProgressTracker::new();
/// let run = tracker.start(3).unwrap();
/// run.record_success(2);
/// run.record_failure(1);
/// let state = run.finish();
///
/// assert!(!state.active);
/// assert_eq!(state.done + state.failed, state.total);
/// ```
#[derive(Debug, Default)]
pub struct ProgressTracker {
    state: Mutex<ProgressState>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a run of `total` units.
    ///
    /// Resets `done` and `failed` to zero and marks the tracker active.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::RunInProgress`] if a run is already active.
    pub fn start(&self, total: usize) -> Result<ActiveRun<'_>, AppError> {
        let mut state = self.lock();
        if state.active {
            return Err(AppError::RunInProgress);
        }
        *state = ProgressState {
            active: true,
            total,
            done: 0,
            failed: 0,
        };
        Ok(ActiveRun {
            tracker: self,
            finished: false,
        })
    }

    /// Returns a consistent copy of the current counters.
    pub fn snapshot(&self) -> ProgressState {
        *self.lock()
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    fn lock(&self) -> MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, n: usize, success: bool) -> ProgressState {
        let mut state = self.lock();
        let applied = n.min(state.remaining());
        if applied < n {
            tracing::warn!(
                requested = n,
                applied,
                total = state.total,
                "Progress update exceeds run total, clamping"
            );
        }
        if success {
            state.done += applied;
        } else {
            state.failed += applied;
        }
        *state
    }

    fn deactivate(&self) -> ProgressState {
        let mut state = self.lock();
        state.active = false;
        *state
    }
}

/// Handle to the active run of a [`ProgressTracker`].
///
/// Safe to share across lanes by reference; every update is applied under
/// the tracker's lock so concurrent increments are never lost. Dropping the
/// handle without calling [`finish`](Self::finish) still ends the run.
#[derive(Debug)]
pub struct ActiveRun<'a> {
    tracker: &'a ProgressTracker,
    finished: bool,
}

impl ActiveRun<'_> {
    /// Adds `n` successful units. Returns the updated counters.
    pub fn record_success(&self, n: usize) -> ProgressState {
        self.tracker.record(n, true)
    }

    /// Adds `n` failed units. Returns the updated counters.
    pub fn record_failure(&self, n: usize) -> ProgressState {
        self.tracker.record(n, false)
    }

    pub fn snapshot(&self) -> ProgressState {
        self.tracker.snapshot()
    }

    /// Ends the run, leaving `done` and `failed` untouched.
    pub fn finish(mut self) -> ProgressState {
        self.finished = true;
        self.tracker.deactivate()
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.tracker.deactivate();
        }
    }
}

/// Which orchestrator produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    /// Importing remote-only products.
    Sync,
    /// Generating embeddings for local products.
    Embedding,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync => write!(f, "sync"),
            Self::Embedding => write!(f, "embedding"),
        }
    }
}

/// Events emitted during sync and embedding runs.
#[derive(Debug, Clone)]
pub enum RunEvent<'a> {
    /// A run started.
    RunStarted {
        kind: RunKind,
        /// Units the run accounts for.
        total: usize,
    },

    /// Selected products were left out of an embedding run.
    SelectionSkipped {
        kind: RunKind,
        /// Number of skipped products.
        count: usize,
    },

    /// One pool unit (a product or a batch) produced its outcome.
    UnitCompleted {
        kind: RunKind,
        /// Position of the unit in the run.
        index: usize,
        /// Products covered by the unit.
        size: usize,
        /// Failure reason, if the unit failed.
        error: Option<&'a AppError>,
        /// Counters after applying this unit.
        progress: ProgressState,
    },

    /// A run finished; counters are final.
    RunFinished {
        kind: RunKind,
        progress: ProgressState,
        /// True if the run stopped early on cancellation.
        cancelled: bool,
    },

    /// Merged records are provisional; the caller should reload its view
    /// from the backend.
    RefreshRequested,
}

/// Trait for reporting run progress.
///
/// The default implementation does nothing (silent mode), which suits
/// library usage where the caller only needs the final summary.
///
/// # Example
///
/// ```
/// use foodflow_core::progress::{ProgressReporter, RunEvent};
///
/// struct PrintReporter;
///
/// impl ProgressReporter for PrintReporter {
///     fn report(&self, event: RunEvent<'_>) {
///         if let RunEvent::RunFinished { kind, progress, .. } = event {
///             println!("{kind}: {}/{} done", progress.done, progress.total);
///         }
///     }
/// }
/// ```
pub trait ProgressReporter: Send + Sync {
    /// Called when a run event occurs.
    fn report(&self, event: RunEvent<'_>) {
        let _ = event;
    }
}

/// A no-op reporter that ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// A reporter that logs events using the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ProgressReporter for TracingReporter {
    fn report(&self, event: RunEvent<'_>) {
        use tracing::{debug, info, warn};

        match event {
            RunEvent::RunStarted { kind, total } => {
                info!("Starting {} run for {} product(s)", kind, total);
            }
            RunEvent::SelectionSkipped { kind, count } => {
                info!("{} run: skipping {} selected product(s)", kind, count);
            }
            RunEvent::UnitCompleted {
                kind,
                index,
                size,
                error,
                progress,
            } => match error {
                Some(e) => warn!(
                    run = %kind,
                    unit = index,
                    size,
                    error = %e,
                    "[{}/{}] unit failed",
                    progress.processed(),
                    progress.total
                ),
                None => debug!(
                    run = %kind,
                    unit = index,
                    size,
                    "[{}/{}] unit completed",
                    progress.processed(),
                    progress.total
                ),
            },
            RunEvent::RunFinished {
                kind,
                progress,
                cancelled,
            } => {
                if cancelled {
                    warn!(
                        "{} run cancelled: {} done, {} failed of {}",
                        kind, progress.done, progress.failed, progress.total
                    );
                } else {
                    info!(
                        "{} run complete: {} done, {} failed of {}",
                        kind, progress.done, progress.failed, progress.total
                    );
                }
            }
            RunEvent::RefreshRequested => {
                debug!("Refresh of product view requested");
            }
        }
    }
}

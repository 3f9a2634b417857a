//! Progress reporting and cancellation support.
//!
//! This module provides [`ProgressCallback`] for observing a render,
//! [`CancellationToken`] for cooperative cancellation, [`ProgressInfo`] for
//! per-frame snapshots and [`JobResult`] for the terminal notification.
//!
//! The same observer serves any front end: the bundled CLI drives a terminal
//! progress bar from it, and a graphical shell can forward the snapshots to a
//! progress widget.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sisr::{JobResult, ProgressCallback, ProgressInfo, RenderOptions, Renderer};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("[{:?}] {pct:.1}% complete", info.stage);
//!         }
//!     }
//!
//!     fn on_complete(&self, result: &JobResult) {
//!         println!("finished: {:?}", result.status);
//!     }
//! }
//!
//! let options = RenderOptions::new().with_progress(Arc::new(PrintProgress));
//! let renderer = Renderer::new(options)?;
//! renderer.render("frames/", "out/frames.mp4")?;
//! # Ok::<(), sisr::RenderError>(())
//! ```

use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// The stage of a render currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum RenderStage {
    /// Decoding, overlaying and transforming source images.
    FrameRendering,
    /// Waiting on the external encoder.
    Encoding,
}

/// A snapshot of render progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// What kind of work is being performed.
    pub stage: RenderStage,
    /// How many frames have been processed so far.
    pub current: u64,
    /// Total frames expected, if known ahead of time.
    pub total: Option<u64>,
    /// Completion percentage (0.0 to 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time elapsed since the stage started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// The sequence index parsed from the source file name, when the
    /// snapshot refers to a single source frame.
    pub sequence_index: Option<u64>,
}

/// Terminal state of a render job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// The output file was written.
    Succeeded,
    /// The run aborted.
    Failed {
        /// Human-readable diagnostic (the error's `Display`).
        message: String,
        /// Intermediate frames kept for diagnosis, if any.
        preserved_frames: Option<PathBuf>,
    },
}

/// Final outcome of one render, handed to [`ProgressCallback::on_complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    /// Output file the run targeted.
    pub output: PathBuf,
    /// Success or failure with diagnostics.
    pub status: JobStatus,
}

impl JobResult {
    /// Returns `true` if the job succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self.status, JobStatus::Succeeded)
    }
}

/// Trait for receiving progress updates during a render.
///
/// Implementations must be [`Send`] and [`Sync`] because callbacks may be
/// invoked from worker threads when frames are rendered in parallel, and
/// from the encoder's stderr reader.
///
/// Progress callbacks are **infallible**: they observe but cannot halt
/// the operation. Use [`CancellationToken`] for cooperative cancellation.
pub trait ProgressCallback: Send + Sync {
    /// Called after each rendered frame and for each encoder progress line.
    fn on_progress(&self, info: &ProgressInfo);

    /// Called exactly once when the run finishes, successfully or not.
    fn on_complete(&self, _result: &JobResult) {}
}

/// A no-op implementation that discards all progress notifications.
///
/// This is the default when no callback is configured.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone this token and share it between threads; call
/// [`cancel`](CancellationToken::cancel) from any thread to stop the
/// associated render. The pipeline checks the token before each frame and
/// the encoder invoker kills the subprocess once it observes cancellation.
///
/// # Example
///
/// ```
/// use sisr::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// // From another thread (or a signal handler, etc.):
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation.
    ///
    /// All clones of this token will observe the cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Internal helper that tracks progress timing and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    stage: RenderStage,
    total: Option<u64>,
    current: u64,
    start_time: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        stage: RenderStage,
        total: Option<u64>,
    ) -> Self {
        Self {
            callback,
            stage,
            total,
            current: 0,
            start_time: Instant::now(),
        }
    }

    /// Record one completed frame and fire the callback.
    pub(crate) fn advance(&mut self, sequence_index: Option<u64>) {
        self.current += 1;
        self.report(sequence_index);
    }

    /// Jump to an absolute position (used for encoder `frame=` lines) and
    /// fire the callback when the position moved forward.
    pub(crate) fn set_position(&mut self, current: u64) {
        let current = self.total.map_or(current, |total| current.min(total));
        if current > self.current {
            self.current = current;
            self.report(None);
        }
    }

    fn report(&self, sequence_index: Option<u64>) {
        let elapsed = self.start_time.elapsed();

        let percentage = self
            .total
            .filter(|&t| t > 0)
            .map(|t| (self.current as f32 / t as f32) * 100.0);

        let estimated_remaining = if self.current > 0 {
            self.total.map(|t| {
                let remaining = t.saturating_sub(self.current);
                let per_item = elapsed / self.current as u32;
                per_item * remaining as u32
            })
        } else {
            None
        };

        let info = ProgressInfo {
            stage: self.stage,
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            sequence_index,
        };

        self.callback.on_progress(&info);
    }
}

//! Progress reporting and cooperative cancellation.
//!
//! Long operations report through a [`ProgressCallback`] and stop when a
//! shared [`CancellationToken`] is cancelled. Both are carried by
//! [`ExtractOptions`](crate::ExtractOptions).

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

/// The operation a progress report belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationType {
    /// Decoding a selection into the frame cache.
    FrameCaching,
    /// Writing a selection to an output file.
    Export,
    /// Decoding preview thumbnails.
    Thumbnails,
}

/// A progress snapshot.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Operation in progress.
    pub operation: OperationType,
    /// Work done so far, in the unit of `total`.
    pub current: u64,
    /// Expected amount of work, when known.
    pub total: Option<u64>,
    /// `current / total` as a percentage, when `total` is known and positive.
    pub percentage: Option<f32>,
    /// Time since the operation started.
    pub elapsed: Duration,
    /// Remaining time extrapolated from the pace so far.
    pub estimated_remaining: Option<Duration>,
    /// Frames handled so far.
    pub frames: u64,
    /// Timestamp of the last frame handled.
    pub current_timestamp: Option<i64>,
}

/// Receiver of progress snapshots.
///
/// Callbacks observe only; use a [`CancellationToken`] to stop the work.
pub trait ProgressCallback: Send + Sync {
    /// Called every batch of frames and once at the end.
    fn on_progress(&self, info: &ProgressInfo);
}

pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Shared cancellation flag.
///
/// Clones observe the same flag, so one clone can be handed to the worker and
/// another kept by the thread that decides to cancel.
///
/// ```
/// use scrubcache::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_copy = token.clone();
/// token.cancel();
/// assert!(worker_copy.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Batches per-frame updates into callback invocations.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    operation: OperationType,
    total: Option<u64>,
    current: u64,
    frames: u64,
    batch_size: u64,
    pending: u64,
    last_timestamp: Option<i64>,
    started: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(
        callback: Arc<dyn ProgressCallback>,
        operation: OperationType,
        total: Option<u64>,
        batch_size: u64,
    ) -> Self {
        Self {
            callback,
            operation,
            total,
            current: 0,
            frames: 0,
            batch_size: batch_size.max(1),
            pending: 0,
            last_timestamp: None,
            started: Instant::now(),
        }
    }

    /// Record one frame and set the absolute amount of work done.
    pub(crate) fn record(&mut self, done: u64, timestamp: i64) {
        self.frames += 1;
        self.current = done;
        self.last_timestamp = Some(timestamp);
        self.pending += 1;
        if self.pending >= self.batch_size {
            self.pending = 0;
            self.report();
        }
    }

    /// Replace the expected amount of work.
    pub(crate) fn set_total(&mut self, total: Option<u64>) {
        self.total = total;
    }

    /// Emit a final report.
    pub(crate) fn finish(&mut self) {
        self.report();
    }

    fn report(&self) {
        let elapsed = self.started.elapsed();
        let total = self.total.filter(|&total| total > 0);

        let percentage = total.map(|total| (self.current.min(total) as f32 / total as f32) * 100.0);
        let estimated_remaining = match total {
            Some(total) if self.current > 0 => {
                let remaining = total.saturating_sub(self.current) as f64;
                Some(elapsed.mul_f64(remaining / self.current as f64))
            }
            _ => None,
        };

        self.callback.on_progress(&ProgressInfo {
            operation: self.operation,
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            frames: self.frames,
            current_timestamp: self.last_timestamp,
        });
    }
}

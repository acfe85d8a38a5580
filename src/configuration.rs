//! Configuration builders.
//!
//! [`LoadOptions`] holds the defaults applied every time a file is loaded,
//! [`ExtractOptions`] threads progress reporting and cancellation through the
//! long-running operations, and [`CacheBudget`] bounds how much of a video may
//! be cached in memory.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use scrubcache::{CancellationToken, ExtractOptions, ProgressCallback, ProgressInfo};
//!
//! struct LogProgress;
//! impl ProgressCallback for LogProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         println!("{:?}: {} frames", info.operation, info.current);
//!     }
//! }
//!
//! let token = CancellationToken::new();
//! let options = ExtractOptions::new()
//!     .with_progress(Arc::new(LogProgress))
//!     .with_cancellation(token.clone())
//!     .with_batch_size(25);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::metadata::{AspectRatioMode, ScalingQuality, VideoInfo};
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};
use crate::selection;

/// Settings applied when a file is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[must_use]
pub struct LoadOptions {
    /// Aspect-ratio mode for newly loaded files.
    pub aspect_ratio_mode: AspectRatioMode,
    /// Whether pictures are deinterlaced.
    pub deinterlace: bool,
    /// Scaling filter.
    pub scaling: ScalingQuality,
}

impl LoadOptions {
    /// Auto-detected aspect ratio, no deinterlacing, fast bilinear scaling.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the aspect-ratio mode.
    pub fn with_aspect_ratio(mut self, mode: AspectRatioMode) -> Self {
        self.aspect_ratio_mode = mode;
        self
    }

    /// Enable or disable deinterlacing.
    pub fn with_deinterlace(mut self, deinterlace: bool) -> Self {
        self.deinterlace = deinterlace;
        self
    }

    /// Set the scaling filter.
    pub fn with_scaling(mut self, scaling: ScalingQuality) -> Self {
        self.scaling = scaling;
        self
    }
}

/// Progress and cancellation for [`extract_to_memory`](crate::VideoFile::extract_to_memory)
/// and [`save`](crate::VideoFile::save).
#[derive(Clone)]
pub struct ExtractOptions {
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
    pub(crate) batch_size: u64,
}

impl Debug for ExtractOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("ExtractOptions")
            .field("has_cancellation", &self.cancellation.is_some())
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractOptions {
    /// No progress reporting, no cancellation, a report for every frame.
    pub fn new() -> Self {
        Self {
            progress: Arc::new(NoOpProgress),
            cancellation: None,
            batch_size: 1,
        }
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token, polled once per frame.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Report progress every `size` frames (at least 1).
    #[must_use]
    pub fn with_batch_size(mut self, size: u64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Current batch size.
    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

/// Upper bounds for an in-memory selection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[must_use]
pub struct CacheBudget {
    /// Longest selection, in seconds.
    pub max_seconds: f64,
    /// Largest memory footprint, in MiB.
    pub max_memory_mib: f64,
}

impl Default for CacheBudget {
    fn default() -> Self {
        Self {
            max_seconds: 12.0,
            max_memory_mib: 512.0,
        }
    }
}

impl CacheBudget {
    /// Default budget: 12 seconds, 512 MiB.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the longest selection.
    pub fn with_max_seconds(mut self, seconds: f64) -> Self {
        self.max_seconds = seconds;
        self
    }

    /// Set the memory ceiling.
    pub fn with_max_memory_mib(mut self, mebibytes: f64) -> Self {
        self.max_memory_mib = mebibytes;
        self
    }

    /// Whether `[start, end]` fits this budget.
    pub fn allows(&self, info: &VideoInfo, start: i64, end: i64) -> bool {
        selection::can_extract_to_memory(info, start, end, self.max_seconds, self.max_memory_mib)
    }
}

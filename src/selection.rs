//! Selection cache management.
//!
//! When the user moves the selection window, the cache is reshaped with as
//! little decoding as possible: frames that fell outside the window are
//! trimmed, and only a newly uncovered head or tail is decoded. Only one
//! direction is extended per request; a window that grows on both sides gets
//! its tail (or failing that its head) filled in and needs a second request
//! for the other side.

use std::ops::Range;

use crate::cache::FrameCache;
use crate::decoder::RangeFilter;
use crate::metadata::VideoInfo;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// How a selection request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStrategy {
    /// Decode the whole window into a fresh cache.
    Complete,
    /// Only trim; nothing new to decode.
    Reduction,
    /// Decode frames before the cached range and prepend them.
    InsertionBefore,
    /// Decode frames after the cached range and append them.
    InsertionAfter,
}

/// Result of planning a selection request against the current cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionPlan {
    /// Chosen strategy.
    pub strategy: ImportStrategy,
    /// First timestamp to decode.
    pub decode_start: i64,
    /// Last timestamp to decode; non-positive means the end of the stream.
    pub decode_end: i64,
    /// Indices of the current cache that survive the request.
    pub keep: Range<usize>,
    /// Cached timestamps before the request, when there was a cache.
    pub previous_range: Option<(i64, i64)>,
}

impl SelectionPlan {
    /// Number of cached frames the plan drops.
    pub fn frames_trimmed(&self, cached: usize) -> usize {
        cached.saturating_sub(self.keep.len())
    }

    /// Whether frames have to be decoded.
    pub fn needs_decoding(&self) -> bool {
        self.strategy != ImportStrategy::Reduction
    }

    pub(crate) fn filter(&self) -> RangeFilter {
        match (self.strategy, self.previous_range) {
            (ImportStrategy::InsertionBefore, Some((old_start, _))) => RangeFilter::Before(old_start),
            (ImportStrategy::InsertionAfter, Some((_, old_end))) => RangeFilter::After(old_end),
            _ => RangeFilter::All,
        }
    }
}

/// Cursor state of the primary selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimarySelection {
    /// Whether navigation is served from the cache.
    pub analysis_mode: bool,
    /// Index of the current frame in the cache, when it is valid.
    pub current_frame: Option<usize>,
    /// Timestamp of the current frame.
    pub current_timestamp: i64,
    /// Number of cached frames.
    pub duration_frames: usize,
    /// Whether a filter view is active on the selection.
    pub filtered: bool,
}

/// Summary of a completed [`extract_to_memory`](crate::VideoFile::extract_to_memory).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionOutcome {
    /// Strategy that was applied.
    pub strategy: ImportStrategy,
    /// Frames decoded and added.
    pub frames_decoded: usize,
    /// Frames trimmed from the previous cache.
    pub frames_trimmed: usize,
    /// Frames in the cache afterwards.
    pub cached_frames: usize,
}

/// Decide how to serve `[start, end]` given the current cache.
///
/// Pure: the cache is not touched. Tail trimming is evaluated before head
/// trimming, and an extension wins over a pure reduction.
pub fn plan_selection(
    cache: &FrameCache,
    analysis_mode: bool,
    average_timestamps_per_frame: i64,
    start: i64,
    end: i64,
    force_reload: bool,
) -> SelectionPlan {
    let (Some(old_start), Some(old_end)) = (cache.start(), cache.end()) else {
        return complete_plan(start, end);
    };
    if !analysis_mode || force_reload {
        return complete_plan(start, end);
    }

    let step = average_timestamps_per_frame.max(1);
    let mut keep = 0..cache.len();
    if end < old_end {
        keep.end = cache.frame_number_for(end) + 1;
    }
    if start > old_start {
        keep.start = cache.frame_number_for(start).min(keep.end - 1);
    }

    let mut plan = SelectionPlan {
        strategy: ImportStrategy::Reduction,
        decode_start: start,
        decode_end: end,
        keep,
        previous_range: Some((old_start, old_end)),
    };

    if end >= old_end + step {
        plan.strategy = ImportStrategy::InsertionAfter;
        plan.decode_start = old_end;
    } else if start <= old_start - step {
        plan.strategy = ImportStrategy::InsertionBefore;
        plan.decode_end = old_start;
    }

    log::debug!(
        "Selection [{start}, {end}] against cached [{old_start}, {old_end}]: {:?}, keeping {:?}",
        plan.strategy,
        plan.keep,
    );
    plan
}

fn complete_plan(start: i64, end: i64) -> SelectionPlan {
    log::debug!("Selection [{start}, {end}] needs a complete decode");
    SelectionPlan {
        strategy: ImportStrategy::Complete,
        decode_start: start,
        decode_end: end,
        keep: 0..0,
        previous_range: None,
    }
}

/// Expected number of frames in `[start, end]`; a negative `end` means the
/// end of the file.
pub fn estimate_frame_count(info: &VideoInfo, start: i64, end: i64) -> i64 {
    let span = if end < 0 {
        info.duration_timestamps - start
    } else {
        end - start
    };
    (span / info.average_timestamps_per_frame.max(1)).max(0)
}

/// Whether `[start, end]` is short enough and small enough to cache.
///
/// Both bounds are required: the span must last more than zero and at most
/// `max_seconds`, and its estimated footprint must not exceed
/// `max_memory_mib`.
pub fn can_extract_to_memory(info: &VideoInfo, start: i64, end: i64, max_seconds: f64, max_memory_mib: f64) -> bool {
    if info.timestamps_per_second <= 0.0 {
        return false;
    }

    let seconds = (end - start) as f64 / info.timestamps_per_second;
    if seconds <= 0.0 || seconds > max_seconds {
        return false;
    }

    let frame_mib = info.frame_bytes() as f64 / BYTES_PER_MIB;
    let footprint = (estimate_frame_count(info, start, end) as f64 * frame_mib).trunc();
    footprint <= max_memory_mib
}

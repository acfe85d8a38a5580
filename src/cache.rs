//! The in-memory frame cache.
//!
//! A [`FrameCache`] holds a contiguous run of converted frames ordered by
//! timestamp, all at the decoding geometry that was current when they were
//! decoded. It also answers the timestamp/frame-index questions used for
//! navigation while analysis mode is on.

use std::ops::Range;

use image::RgbImage;

/// A converted frame and the timestamp it was decoded at.
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Timestamp in the stream time base.
    pub timestamp: i64,
    /// Packed RGB24 picture at the decoding geometry.
    pub image: RgbImage,
}

/// Frames ordered by strictly increasing timestamp.
#[derive(Debug, Clone, Default)]
pub struct FrameCache {
    frames: Vec<DecodedFrame>,
}

impl FrameCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache from frames in any order; duplicate timestamps keep the
    /// first occurrence.
    pub fn from_frames(mut frames: Vec<DecodedFrame>) -> Self {
        frames.sort_by_key(|frame| frame.timestamp);
        frames.dedup_by_key(|frame| frame.timestamp);
        Self { frames }
    }

    /// Number of cached frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the cache holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// All cached frames.
    pub fn frames(&self) -> &[DecodedFrame] {
        &self.frames
    }

    /// Frame at `index`.
    pub fn get(&self, index: usize) -> Option<&DecodedFrame> {
        self.frames.get(index)
    }

    /// Timestamp of the first frame.
    pub fn start(&self) -> Option<i64> {
        self.frames.first().map(|frame| frame.timestamp)
    }

    /// Timestamp of the last frame.
    pub fn end(&self) -> Option<i64> {
        self.frames.last().map(|frame| frame.timestamp)
    }

    /// Index of the first frame at or after `timestamp`.
    ///
    /// Falls back to the last index when every frame is earlier, and to 0 on
    /// an empty cache.
    pub fn frame_number_for(&self, timestamp: i64) -> usize {
        let index = self.frames.partition_point(|frame| frame.timestamp < timestamp);
        index.min(self.frames.len().saturating_sub(1))
    }

    /// Timestamp of the frame at `index`, clamped to the cached range.
    pub fn timestamp_at(&self, index: i64) -> Option<i64> {
        let last = self.frames.len().checked_sub(1)?;
        let clamped = usize::try_from(index.max(0)).unwrap_or(usize::MAX).min(last);
        Some(self.frames[clamped].timestamp)
    }

    /// Largest gap between two neighbouring timestamps, 0 below two frames.
    pub fn max_gap(&self) -> i64 {
        self.frames
            .windows(2)
            .map(|pair| pair[1].timestamp - pair[0].timestamp)
            .max()
            .unwrap_or(0)
    }

    /// Whether timestamps strictly increase.
    pub fn is_strictly_increasing(&self) -> bool {
        self.frames.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp)
    }

    /// Keep only `range`, releasing the other frames.
    pub(crate) fn retain_range(&mut self, range: Range<usize>) {
        let end = range.end.min(self.frames.len());
        let start = range.start.min(end);
        self.frames.truncate(end);
        self.frames.drain(..start);
    }

    /// Replace the whole content.
    pub(crate) fn replace(&mut self, frames: Vec<DecodedFrame>) {
        self.frames = frames;
    }

    /// Insert earlier frames in front.
    pub(crate) fn prepend(&mut self, mut frames: Vec<DecodedFrame>) {
        frames.append(&mut self.frames);
        self.frames = frames;
    }

    /// Append later frames.
    pub(crate) fn append(&mut self, mut frames: Vec<DecodedFrame>) {
        self.frames.append(&mut frames);
    }

    /// Drop every frame.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.frames.shrink_to_fit();
    }
}

//! Frame sources.
//!
//! Navigation and export read frames the same way whether they come from the
//! cache or from the decoder. [`CachedSource`] walks the cache by index;
//! [`LiveDecodeSource`] seeks and decodes.

use image::RgbImage;

use crate::backend::{Demuxer, PictureConverter};
use crate::cache::FrameCache;
use crate::decoder::DecodeSession;
use crate::error::ReadError;
use crate::metadata::VideoInfo;

/// How to reach the next frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRequest {
    /// The first frame at or after a timestamp.
    Seek(i64),
    /// Move by a number of frames; negative moves backward.
    Advance(i32),
}

/// Something frames can be read from.
pub trait FrameSource {
    /// Move to a frame and return its timestamp.
    fn fetch(&mut self, request: FrameRequest) -> Result<i64, ReadError>;

    /// Picture of the current frame.
    fn current_image(&self) -> Option<&RgbImage>;

    /// Timestamp of the current frame.
    fn current_timestamp(&self) -> i64;

    /// Whether the current frame is the last one up to `selection_end`.
    fn is_finished(&self, selection_end: i64) -> bool;

    /// `(done, total)` for progress reporting over a selection.
    fn progress(&self, selection_start: i64, selection_end: i64) -> (u64, u64);
}

/// Frames served from the cache by index arithmetic.
#[derive(Debug)]
pub struct CachedSource<'a> {
    cache: &'a FrameCache,
    index: usize,
}

impl<'a> CachedSource<'a> {
    /// A source positioned on frame `index`.
    pub fn new(cache: &'a FrameCache, index: usize) -> Self {
        Self { cache, index }
    }

    /// Index of the current frame.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl FrameSource for CachedSource<'_> {
    fn fetch(&mut self, request: FrameRequest) -> Result<i64, ReadError> {
        let last = self.cache.len().checked_sub(1).ok_or(ReadError::FrameNotRead)?;
        self.index = match request {
            FrameRequest::Seek(timestamp) => self.cache.frame_number_for(timestamp),
            FrameRequest::Advance(frames) => {
                let moved = self.index as i64 + i64::from(frames);
                moved.clamp(0, last as i64) as usize
            }
        };
        Ok(self.current_timestamp())
    }

    fn current_image(&self) -> Option<&RgbImage> {
        self.cache.get(self.index).map(|frame| &frame.image)
    }

    fn current_timestamp(&self) -> i64 {
        self.cache.get(self.index).map_or(0, |frame| frame.timestamp)
    }

    fn is_finished(&self, selection_end: i64) -> bool {
        self.index + 1 >= self.cache.len() || (selection_end > 0 && self.current_timestamp() >= selection_end)
    }

    fn progress(&self, _selection_start: i64, _selection_end: i64) -> (u64, u64) {
        ((self.index + 1) as u64, self.cache.len() as u64)
    }
}

/// Frames decoded on demand.
///
/// Backward moves count from the source's own cursor, which may differ from
/// the last frame the session decoded.
pub struct LiveDecodeSource<'a, D: Demuxer, C> {
    session: &'a mut DecodeSession<D, C>,
    info: &'a mut VideoInfo,
    cursor: i64,
}

impl<'a, D, C> LiveDecodeSource<'a, D, C>
where
    D: Demuxer,
    C: PictureConverter<D::Picture>,
{
    /// A source decoding with `session` at the geometry in `info`, positioned
    /// on `cursor`.
    pub fn new(session: &'a mut DecodeSession<D, C>, info: &'a mut VideoInfo, cursor: i64) -> Self {
        Self { session, info, cursor }
    }
}

impl<D, C> FrameSource for LiveDecodeSource<'_, D, C>
where
    D: Demuxer,
    C: PictureConverter<D::Picture>,
{
    fn fetch(&mut self, request: FrameRequest) -> Result<i64, ReadError> {
        let timestamp = match request {
            FrameRequest::Seek(timestamp) => self.session.read_frame(self.info, Some(timestamp), 1, self.cursor)?,
            FrameRequest::Advance(frames) => self.session.read_frame(self.info, None, frames, self.cursor)?,
        };
        self.cursor = timestamp;
        Ok(timestamp)
    }

    fn current_image(&self) -> Option<&RgbImage> {
        self.session.current_image()
    }

    fn current_timestamp(&self) -> i64 {
        self.cursor
    }

    fn is_finished(&self, selection_end: i64) -> bool {
        selection_end > 0 && self.current_timestamp() >= selection_end
    }

    fn progress(&self, selection_start: i64, selection_end: i64) -> (u64, u64) {
        let done = (self.current_timestamp() - selection_start).max(0) as u64;
        let total = (selection_end - selection_start).max(0) as u64;
        (done, total)
    }
}

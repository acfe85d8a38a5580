//! Decoding session.
//!
//! [`DecodeSession`] owns the demuxer, the converter and the picture most
//! recently converted. It implements the two decode loops: reaching a single
//! frame for navigation and decoding a timestamp range for the cache.

use image::RgbImage;

use crate::backend::{Decoded, Demuxer, PacketInfo, PictureConverter};
use crate::cache::DecodedFrame;
use crate::configuration::ExtractOptions;
use crate::conversion::convert_picture;
use crate::error::{DemuxError, ReadError};
use crate::metadata::{AspectRatioMode, VideoInfo};
use crate::progress::ProgressTracker;
use crate::seek::{SeekCorrection, SeekStep};

/// Which frames of a range decode are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RangeFilter {
    /// Every frame inside the range.
    All,
    /// Only frames strictly before the given timestamp.
    Before(i64),
    /// Only frames strictly after the given timestamp.
    After(i64),
}

impl RangeFilter {
    fn accepts(self, timestamp: i64) -> bool {
        match self {
            RangeFilter::All => true,
            RangeFilter::Before(limit) => timestamp < limit,
            RangeFilter::After(limit) => timestamp > limit,
        }
    }
}

/// Demuxer, converter and last converted picture of a loaded file.
pub struct DecodeSession<D: Demuxer, C> {
    demuxer: D,
    converter: C,
    video_stream: usize,
    metadata_stream: Option<usize>,
    draining: bool,
    current_image: Option<RgbImage>,
}

impl<D, C> DecodeSession<D, C>
where
    D: Demuxer,
    C: PictureConverter<D::Picture>,
{
    pub(crate) fn new(demuxer: D, converter: C, video_stream: usize, metadata_stream: Option<usize>) -> Self {
        Self {
            demuxer,
            converter,
            video_stream,
            metadata_stream,
            draining: false,
            current_image: None,
        }
    }

    /// Index of the decoded video stream.
    pub fn video_stream(&self) -> usize {
        self.video_stream
    }

    /// Index of the metadata stream, if any.
    pub fn metadata_stream(&self) -> Option<usize> {
        self.metadata_stream
    }

    /// Picture of the last frame reached.
    pub fn current_image(&self) -> Option<&RgbImage> {
        self.current_image.as_ref()
    }

    /// Seek the video stream backward to `timestamp` and flush the decoder.
    ///
    /// Seek failures are logged; decoding then continues from wherever the
    /// demuxer stands.
    pub(crate) fn seek_to(&mut self, timestamp: i64) {
        log::debug!("Seeking stream {} to {timestamp}", self.video_stream);
        if let Err(error) = self.demuxer.seek(self.video_stream, timestamp, true) {
            log::warn!("Seek to {timestamp} failed: {error}");
        }
        self.demuxer.flush();
        self.draining = false;
    }

    /// Next complete video picture, or `None` once the stream is exhausted.
    fn next_picture(&mut self) -> Option<Decoded<D::Picture>> {
        loop {
            if self.draining {
                return match self.demuxer.drain_video() {
                    Ok(picture) => picture,
                    Err(error) => {
                        log::warn!("Draining the decoder failed: {error}");
                        None
                    }
                };
            }

            let packet = match self.demuxer.read_packet() {
                Ok(packet) => packet,
                Err(DemuxError::EndOfStream) => {
                    self.draining = true;
                    continue;
                }
                Err(DemuxError::Failed(reason)) => {
                    log::warn!("Reading packets stopped: {reason}");
                    return None;
                }
            };

            if packet.stream_index() != self.video_stream {
                continue;
            }

            match self.demuxer.decode_video(&packet) {
                Ok(Some(picture)) => return Some(picture),
                Ok(None) => {}
                Err(error) => {
                    log::warn!("Skipping undecodable packet (dts {:?}): {error}", packet.dts());
                }
            }
        }
    }

    /// Reach a frame by seeking or by decoding forward.
    ///
    /// With `target`, or with a negative `advance`, the stream is sought and
    /// decoded until a picture at or after the target; a backward move counts
    /// from `from`, the caller's cursor. Otherwise `advance` pictures are
    /// decoded (at least one). A conversion failure with a stretched geometry
    /// switches `info` to square pixels and tries again.
    pub(crate) fn read_frame(
        &mut self,
        info: &mut VideoInfo,
        target: Option<i64>,
        advance: i32,
        from: i64,
    ) -> Result<i64, ReadError> {
        if info.decoding_width == 0 || info.decoding_height == 0 {
            return Err(ReadError::MemoryAllocationFailed {
                width: info.decoding_width,
                height: info.decoding_height,
            });
        }

        let seek_target = match target {
            Some(timestamp) => Some(timestamp),
            None if advance < 0 => Some((from + i64::from(advance) * info.average_timestamps_per_frame).max(0)),
            None => None,
        };

        let mut correction = match seek_target {
            Some(timestamp) => {
                self.seek_to(timestamp);
                SeekCorrection::seeking(timestamp)
            }
            None => SeekCorrection::Linear,
        };

        let wanted = advance.max(1).unsigned_abs();
        let mut decoded = 0u32;
        let one_second = info.one_second();

        loop {
            let Some(picture) = self.next_picture() else {
                log::debug!("Stream exhausted before reaching {seek_target:?} (decoded {decoded})");
                return Err(ReadError::FrameNotRead);
            };
            let timestamp = picture.timestamp.unwrap_or(0);

            if let SeekStep::Reseek(earlier) = correction.observe(timestamp, one_second) {
                log::warn!("Seek landed at {timestamp}, after target {seek_target:?}; retrying from {earlier}");
                self.seek_to(earlier);
                continue;
            }

            decoded += 1;
            let reached = match seek_target {
                Some(goal) => timestamp >= goal,
                None => decoded >= wanted,
            };
            if !reached {
                continue;
            }

            let image = self.convert_with_fallback(&picture.picture, info, timestamp)?;
            self.current_image = Some(image);
            return Ok(timestamp);
        }
    }

    fn convert_with_fallback(&mut self, picture: &D::Picture, info: &mut VideoInfo, timestamp: i64) -> Result<RgbImage, ReadError> {
        match convert_picture(&mut self.converter, picture, info, timestamp) {
            Ok(image) => Ok(image),
            Err(error) if !info.has_square_pixels() => {
                log::warn!("Conversion failed at {timestamp} ({error}); retrying with square pixels");
                info.apply_aspect_ratio(AspectRatioMode::ForceSquare);
                convert_picture(&mut self.converter, picture, info, timestamp).map_err(|error| {
                    ReadError::ImageConversionFailed {
                        timestamp,
                        reason: error.to_string(),
                    }
                })
            }
            Err(error) => Err(ReadError::ImageConversionFailed {
                timestamp,
                reason: error.to_string(),
            }),
        }
    }

    /// Decode `[start, end]` into owned frames.
    ///
    /// Frames before `start` are skipped, and so are frames `filter`
    /// rejects. Decoding stops after the first frame at or past `end` when
    /// `end` is positive, otherwise at the end of the stream. Nothing outside
    /// the returned vector is modified besides the demuxer position.
    pub(crate) fn decode_range(
        &mut self,
        info: &VideoInfo,
        start: i64,
        end: i64,
        filter: RangeFilter,
        options: &ExtractOptions,
        tracker: &mut ProgressTracker,
    ) -> Result<Vec<DecodedFrame>, ReadError> {
        let mut frames = Vec::new();
        let one_second = info.one_second();

        self.seek_to(start);
        let mut correction = SeekCorrection::seeking(start);

        while let Some(picture) = self.next_picture() {
            if options.is_cancelled() {
                log::info!("Frame caching cancelled after {} frames", frames.len());
                return Err(ReadError::Cancelled);
            }

            let timestamp = picture.timestamp.unwrap_or(0);
            if let SeekStep::Reseek(earlier) = correction.observe(timestamp, one_second) {
                log::warn!("Range seek landed at {timestamp}, after start {start}; retrying from {earlier}");
                self.seek_to(earlier);
                continue;
            }

            if timestamp >= start && filter.accepts(timestamp) {
                let image = convert_picture(&mut self.converter, &picture.picture, info, timestamp).map_err(|error| {
                    log::error!("Frame caching aborted at {timestamp}: {error}");
                    ReadError::ImageConversionFailed {
                        timestamp,
                        reason: error.to_string(),
                    }
                })?;
                frames.push(DecodedFrame { timestamp, image });
                tracker.record(frames.len() as u64, timestamp);
            }

            if end > 0 && timestamp >= end {
                break;
            }
        }

        tracker.finish();
        Ok(frames)
    }

    /// Text of the first packet on the metadata stream.
    ///
    /// The video stream is sought back to `rewind_to` afterwards.
    pub(crate) fn read_metadata(&mut self, rewind_to: i64) -> Option<String> {
        let stream = self.metadata_stream?;

        let mut text = None;
        loop {
            match self.demuxer.read_packet() {
                Ok(packet) if packet.stream_index() == stream => {
                    let payload = String::from_utf8_lossy(packet.payload());
                    text = Some(payload.trim_end_matches('\0').to_string());
                    break;
                }
                Ok(_) => {}
                Err(error) => {
                    log::debug!("No metadata packet found: {error}");
                    break;
                }
            }
        }

        self.seek_to(rewind_to);
        text
    }
}

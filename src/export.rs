//! Export pipeline.
//!
//! Frames of the selection are copied, handed to a [`FrameOverlay`] and
//! written to an [`OutputWriter`]. Output never runs faster than 8 frames per
//! second: longer requested intervals are met by writing each frame several
//! times at a shorter interval.

use std::path::PathBuf;

use image::imageops::{self, FilterType};

use crate::backend::{FrameOverlay, OutputWriter};
use crate::configuration::ExtractOptions;
use crate::error::{ReadError, SaveError};
use crate::metadata::VideoInfo;
use crate::progress::{OperationType, ProgressTracker};
use crate::source::{FrameRequest, FrameSource};

/// Longest interval written to the output, in milliseconds (8 fps).
pub const MAX_WRITTEN_INTERVAL_MS: i32 = 125;

/// Interval used when the request carries none.
pub const DEFAULT_INTERVAL_MS: i32 = 40;

/// How source frames map onto written frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportPacing {
    /// Copies written per (key) frame.
    pub duplicate_factor: u32,
    /// Interval between written frames, in milliseconds.
    pub written_interval_ms: i32,
}

impl ExportPacing {
    /// Pacing for a requested interval.
    ///
    /// In paused-video mode the output keeps the native interval and only
    /// key frames are held, `requested / native` copies each.
    pub fn for_interval(requested_ms: i32, paused_video: bool, native_interval_ms: i32) -> Self {
        if requested_ms <= 0 {
            return Self {
                duplicate_factor: 1,
                written_interval_ms: DEFAULT_INTERVAL_MS,
            };
        }

        if paused_video {
            let native = if native_interval_ms > 0 { native_interval_ms } else { DEFAULT_INTERVAL_MS };
            return Self {
                duplicate_factor: (requested_ms / native).max(1).unsigned_abs(),
                written_interval_ms: native,
            };
        }

        let factor = requested_ms
            .unsigned_abs()
            .div_ceil(MAX_WRITTEN_INTERVAL_MS.unsigned_abs())
            .max(1);
        Self {
            duplicate_factor: factor,
            written_interval_ms: requested_ms / factor as i32,
        }
    }
}

/// What to export and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveRequest {
    /// Output file.
    pub path: PathBuf,
    /// Interval between source frames in the output, in milliseconds.
    pub frame_interval_ms: i32,
    /// First timestamp of the selection.
    pub selection_start: i64,
    /// Last timestamp of the selection; non-positive means the end of the file.
    pub selection_end: i64,
    /// Metadata text stored next to the video; empty for none.
    pub metadata: String,
    /// Passed to the overlay: flatten drawings into the picture.
    pub flush_drawings: bool,
    /// Write only the frames the overlay marks as key frames.
    pub keyframes_only: bool,
    /// Hold key frames while the rest plays at normal speed.
    pub paused_video: bool,
}

impl SaveRequest {
    /// Export `[selection_start, selection_end]` to `path` at 40 ms per frame.
    pub fn new(path: impl Into<PathBuf>, selection_start: i64, selection_end: i64) -> Self {
        Self {
            path: path.into(),
            frame_interval_ms: DEFAULT_INTERVAL_MS,
            selection_start,
            selection_end,
            metadata: String::new(),
            flush_drawings: false,
            keyframes_only: false,
            paused_video: false,
        }
    }

    /// Set the interval between source frames.
    #[must_use]
    pub fn with_frame_interval(mut self, milliseconds: i32) -> Self {
        self.frame_interval_ms = milliseconds;
        self
    }

    /// Attach metadata text.
    #[must_use]
    pub fn with_metadata(mut self, text: impl Into<String>) -> Self {
        self.metadata = text.into();
        self
    }

    /// Set the flush flag passed to the overlay.
    #[must_use]
    pub fn with_flush_drawings(mut self, flush: bool) -> Self {
        self.flush_drawings = flush;
        self
    }

    /// Write only key frames.
    #[must_use]
    pub fn with_keyframes_only(mut self, keyframes_only: bool) -> Self {
        self.keyframes_only = keyframes_only;
        self
    }

    /// Hold key frames instead of slowing the whole video.
    #[must_use]
    pub fn with_paused_video(mut self, paused: bool) -> Self {
        self.paused_video = paused;
        self
    }
}

/// Counters of a finished export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SaveReport {
    /// Source frames read.
    pub frames_read: u64,
    /// Frames written, duplicates included.
    pub frames_written: u64,
    /// Writes (and the final close) that failed.
    pub write_failures: u64,
    /// Pacing used.
    pub duplicate_factor: u32,
    /// Interval handed to the writer.
    pub written_interval_ms: i32,
}

/// Open `writer`, stream the selection through it and close it.
pub(crate) fn save_selection<S, W, O>(
    source: &mut S,
    writer: &mut W,
    overlay: &mut O,
    request: &SaveRequest,
    native_interval_ms: i32,
    options: &ExtractOptions,
    info: &VideoInfo,
) -> Result<SaveReport, SaveError>
where
    S: FrameSource,
    W: OutputWriter,
    O: FrameOverlay,
{
    let pacing = ExportPacing::for_interval(request.frame_interval_ms, request.paused_video, native_interval_ms);
    let has_metadata = !request.metadata.is_empty();

    log::info!(
        "Exporting [{}, {}] to {} (interval {} ms x{}, paused={}, keyframes_only={})",
        request.selection_start,
        request.selection_end,
        request.path.display(),
        pacing.written_interval_ms,
        pacing.duplicate_factor,
        request.paused_video,
        request.keyframes_only,
    );

    writer
        .open(&request.path, info, pacing.written_interval_ms, has_metadata)
        .map_err(SaveError::OutputNotOpened)?;

    let mut report = SaveReport {
        duplicate_factor: pacing.duplicate_factor,
        written_interval_ms: pacing.written_interval_ms,
        ..SaveReport::default()
    };

    let metadata_written = if has_metadata {
        writer
            .write_metadata(&request.metadata)
            .map_err(SaveError::MetadataNotSaved)
    } else {
        Ok(())
    };
    let geometry = (info.decoding_width, info.decoding_height);
    let result = metadata_written
        .and_then(|()| write_frames(source, writer, overlay, request, pacing, geometry, options, &mut report));

    if let Err(error) = writer.close(true) {
        log::error!("Closing {} failed: {error}", request.path.display());
        report.write_failures += 1;
    }

    result.map(|()| {
        log::info!(
            "Export finished: {} frames read, {} written, {} failures",
            report.frames_read,
            report.frames_written,
            report.write_failures,
        );
        report
    })
}

#[allow(clippy::too_many_arguments)]
fn write_frames<S, W, O>(
    source: &mut S,
    writer: &mut W,
    overlay: &mut O,
    request: &SaveRequest,
    pacing: ExportPacing,
    geometry: (u32, u32),
    options: &ExtractOptions,
    report: &mut SaveReport,
) -> Result<(), SaveError>
where
    S: FrameSource,
    W: OutputWriter,
    O: FrameOverlay,
{
    let mut tracker = ProgressTracker::new(options.progress.clone(), OperationType::Export, None, options.batch_size);
    let mut request_next = FrameRequest::Seek(request.selection_start);

    loop {
        if options.is_cancelled() {
            log::info!("Export cancelled after {} frames", report.frames_read);
            return Err(SaveError::Cancelled);
        }

        let timestamp = match source.fetch(request_next) {
            Ok(timestamp) => timestamp,
            Err(ReadError::FrameNotRead) => break,
            Err(error) => {
                log::error!("Export aborted after {} frames: {error}", report.frames_read);
                return Err(SaveError::Reading(error));
            }
        };
        request_next = FrameRequest::Advance(1);

        let Some(mut surface) = source.current_image().cloned() else {
            return Err(SaveError::Reading(ReadError::FrameNotRead));
        };
        report.frames_read += 1;

        // The writer was opened at `geometry`; a square-pixel fallback while
        // decoding changes the size of later frames.
        if surface.dimensions() != geometry {
            log::debug!(
                "Frame at {timestamp} is {:?}, resizing to the output's {geometry:?}",
                surface.dimensions()
            );
            surface = imageops::resize(&surface, geometry.0, geometry.1, FilterType::Triangle);
        }

        let is_key = overlay.apply(&mut surface, timestamp, request.flush_drawings, request.keyframes_only);
        if !request.keyframes_only || is_key {
            let copies = if request.paused_video && !is_key { 1 } else { pacing.duplicate_factor };
            for _ in 0..copies {
                match writer.write_frame(&surface) {
                    Ok(()) => report.frames_written += 1,
                    Err(error) => {
                        log::error!("Writing frame at {timestamp} failed: {error}");
                        report.write_failures += 1;
                    }
                }
            }
        }

        let (done, total) = source.progress(request.selection_start, request.selection_end);
        tracker.set_total(Some(total));
        tracker.record(done, timestamp);

        if source.is_finished(request.selection_end) {
            break;
        }
    }

    tracker.finish();
    Ok(())
}

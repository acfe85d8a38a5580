//! The [`VideoFile`] facade.
//!
//! `VideoFile` owns everything about one loaded video: the decode session,
//! the derived [`VideoInfo`], the frame cache and the selection cursor. All
//! navigation, caching and export goes through it.

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::backend::{Demuxer, FrameOverlay, MediaBackend, OutputWriter};
use crate::cache::FrameCache;
use crate::configuration::{ExtractOptions, LoadOptions};
use crate::decoder::DecodeSession;
use crate::error::{LoadError, ReadError, SaveError};
use crate::export::{self, SaveReport, SaveRequest};
use crate::input::FfmpegBackend;
use crate::metadata::{AspectRatioMode, ScalingQuality, VideoInfo};
use crate::probe::probe_container;
use crate::progress::{OperationType, ProgressTracker};
use crate::selection::{self, ExtractionOutcome, ImportStrategy, PrimarySelection, SelectionPlan};
use crate::source::{CachedSource, FrameRequest, FrameSource, LiveDecodeSource};

/// A video opened for scrubbing, caching and export.
///
/// # Example
///
/// ```no_run
/// use scrubcache::{ExtractOptions, LoadError, VideoFile};
///
/// let mut video = VideoFile::new();
/// let info = video.load("input.mp4")?.clone();
///
/// // Cache the first two seconds, then step through them without decoding.
/// let end = info.first_timestamp + 2 * info.one_second();
/// if video.can_extract_to_memory(info.first_timestamp, end, 12.0, 512.0) {
///     video
///         .extract_to_memory(info.first_timestamp, end, false, &ExtractOptions::new())
///         .expect("cache build failed");
///     video.read_frame(None, 1).expect("next frame");
/// }
/// # Ok::<(), LoadError>(())
/// ```
pub struct VideoFile<B: MediaBackend = FfmpegBackend> {
    backend: B,
    options: LoadOptions,
    path: Option<PathBuf>,
    session: Option<DecodeSession<B::Demuxer, B::Converter>>,
    info: VideoInfo,
    selection: PrimarySelection,
    cache: FrameCache,
}

impl<B: MediaBackend> Debug for VideoFile<B> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VideoFile")
            .field("path", &self.path)
            .field("info", &self.info)
            .field("selection", &self.selection)
            .field("cached_frames", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl VideoFile<FfmpegBackend> {
    /// An unloaded video using the FFmpeg backend.
    pub fn new() -> Self {
        Self::with_backend(FfmpegBackend::new())
    }
}

impl Default for VideoFile<FfmpegBackend> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: MediaBackend> VideoFile<B> {
    /// An unloaded video using `backend`.
    pub fn with_backend(backend: B) -> Self {
        Self {
            backend,
            options: LoadOptions::default(),
            path: None,
            session: None,
            info: VideoInfo::default(),
            selection: PrimarySelection::default(),
            cache: FrameCache::new(),
        }
    }

    /// Settings applied by the next [`load`](Self::load).
    pub fn set_default_settings(&mut self, options: LoadOptions) {
        self.options = options;
    }

    /// Settings applied at load.
    pub fn default_settings(&self) -> LoadOptions {
        self.options
    }

    /// The backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Open `path`, replacing any loaded file.
    ///
    /// # Errors
    ///
    /// Any [`LoadError`]; the video is left unloaded.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<&VideoInfo, LoadError> {
        self.unload();
        let path = path.as_ref();
        log::debug!("Loading {}", path.display());

        let mut demuxer = self.backend.open(path)?;
        let probed = probe_container(demuxer.container(), &self.options)?;
        demuxer.open_decoder(probed.video_stream)?;

        let converter = {
            let video = demuxer
                .container()
                .streams
                .iter()
                .find(|stream| stream.index == probed.video_stream)
                .ok_or(LoadError::NoVideoStream)?;
            self.backend.converter(video)
        };

        let mut info = probed.info;
        info.file_size = fs::metadata(path).map(|metadata| metadata.len()).unwrap_or(0);

        log::info!(
            "Loaded {}: {}x{} ({}), {:.3} fps, {} ms",
            path.display(),
            info.width,
            info.height,
            info.codec_name,
            info.fps,
            info.duration_ms(),
        );

        self.session = Some(DecodeSession::new(
            demuxer,
            converter,
            probed.video_stream,
            probed.metadata_stream,
        ));
        self.info = info;
        self.path = Some(path.to_path_buf());
        Ok(&self.info)
    }

    /// Close the file and reset all derived state.
    pub fn unload(&mut self) {
        if let Some(path) = self.path.take() {
            log::debug!("Unloading {}", path.display());
        }
        self.session = None;
        self.cache.clear();
        self.info = VideoInfo::default();
        self.selection = PrimarySelection::default();
    }

    /// Whether a file is loaded.
    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    /// Path of the loaded file.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Derived information; reset values while unloaded.
    pub fn info(&self) -> &VideoInfo {
        &self.info
    }

    /// Selection cursor.
    pub fn selection(&self) -> &PrimarySelection {
        &self.selection
    }

    /// Cached frames.
    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    /// Index of the metadata stream, if the file has one.
    pub fn metadata_stream(&self) -> Option<usize> {
        self.session.as_ref().and_then(|session| session.metadata_stream())
    }

    /// Mark the selection as filtered or not.
    pub fn set_filtered(&mut self, filtered: bool) {
        self.selection.filtered = filtered;
    }

    /// Picture of the current frame.
    pub fn current_image(&self) -> Option<&RgbImage> {
        if self.selection.analysis_mode {
            let index = self.selection.current_frame?;
            return self.cache.get(index).map(|frame| &frame.image);
        }
        self.session.as_ref().and_then(|session| session.current_image())
    }

    /// Timestamp of the current frame.
    pub fn current_timestamp(&self) -> i64 {
        self.selection.current_timestamp
    }

    /// Move the cursor.
    ///
    /// With `target`, go to the first frame at or after that timestamp.
    /// Otherwise move by `advance` frames (a negative value moves backward).
    /// In analysis mode this only moves inside the cache.
    pub fn read_frame(&mut self, target: Option<i64>, advance: i32) -> Result<(), ReadError> {
        let session = self.session.as_mut().ok_or(ReadError::NotLoaded)?;
        let request = match target {
            Some(timestamp) => FrameRequest::Seek(timestamp),
            None => FrameRequest::Advance(advance),
        };

        if self.selection.analysis_mode {
            let mut source = CachedSource::new(&self.cache, self.selection.current_frame.unwrap_or(0));
            let timestamp = source.fetch(request)?;
            self.selection.current_frame = Some(source.index());
            self.selection.current_timestamp = timestamp;
        } else {
            let mut source = LiveDecodeSource::new(session, &mut self.info, self.selection.current_timestamp);
            self.selection.current_timestamp = source.fetch(request)?;
        }
        Ok(())
    }

    /// Cache index of the first frame at or after `timestamp`.
    pub fn frame_number_for(&self, timestamp: i64) -> usize {
        self.cache.frame_number_for(timestamp)
    }

    /// Timestamp of cache frame `frame` in analysis mode; otherwise `frame`
    /// is already a timestamp and is returned as is.
    pub fn timestamp_for(&self, frame: i64) -> i64 {
        if self.selection.analysis_mode {
            return self.cache.timestamp_at(frame).unwrap_or(frame);
        }
        frame
    }

    /// Switch the aspect-ratio mode, discarding the cache if it holds frames.
    pub fn change_aspect_ratio(&mut self, mode: AspectRatioMode) {
        self.info.apply_aspect_ratio(mode);
        if !self.cache.is_empty() {
            log::debug!("Aspect ratio changed to {mode:?}; discarding {} cached frames", self.cache.len());
            self.discard_cache();
        }
    }

    /// Enable or disable deinterlacing for frames decoded from now on.
    pub fn set_deinterlace(&mut self, deinterlace: bool) {
        self.info.deinterlaced = deinterlace;
    }

    /// Set the scaling filter for frames decoded from now on.
    pub fn set_scaling(&mut self, scaling: ScalingQuality) {
        self.info.scaling = scaling;
    }

    /// Plan `[start, end]` against the cache and apply the trimming now.
    ///
    /// A `Complete` plan discards the cache and leaves analysis mode.
    pub fn prepare_selection(&mut self, start: i64, end: i64, force_reload: bool) -> ImportStrategy {
        let plan = self.plan(start, end, force_reload);
        if plan.strategy == ImportStrategy::Complete {
            self.discard_cache();
        } else {
            self.cache.retain_range(plan.keep.clone());
            self.commit_selection();
        }
        plan.strategy
    }

    /// Bring the cache to `[start, end]`, decoding only what is missing.
    ///
    /// A `Complete` plan discards the cache before decoding. Otherwise the
    /// new frames are staged and committed at the end: on cancellation or
    /// conversion failure the cache and cursor are exactly as before the
    /// call.
    ///
    /// # Errors
    ///
    /// [`ReadError::NotLoaded`], [`ReadError::Cancelled`] or
    /// [`ReadError::ImageConversionFailed`].
    pub fn extract_to_memory(
        &mut self,
        start: i64,
        end: i64,
        force_reload: bool,
        options: &ExtractOptions,
    ) -> Result<ExtractionOutcome, ReadError> {
        if self.session.is_none() {
            return Err(ReadError::NotLoaded);
        }

        let plan = self.plan(start, end, force_reload);
        let frames_trimmed = plan.frames_trimmed(self.cache.len());
        if plan.strategy == ImportStrategy::Complete && !self.cache.is_empty() {
            log::debug!("Discarding {} cached frames before a complete decode", self.cache.len());
            self.discard_cache();
        }

        let staged = if plan.needs_decoding() {
            let estimate = selection::estimate_frame_count(&self.info, plan.decode_start, plan.decode_end);
            let mut tracker = ProgressTracker::new(
                options.progress.clone(),
                OperationType::FrameCaching,
                Some(estimate.max(0) as u64),
                options.batch_size,
            );
            let session = self.session.as_mut().ok_or(ReadError::NotLoaded)?;
            session.decode_range(&self.info, plan.decode_start, plan.decode_end, plan.filter(), options, &mut tracker)?
        } else {
            Vec::new()
        };
        let frames_decoded = staged.len();

        match plan.strategy {
            ImportStrategy::Complete => self.cache.replace(staged),
            ImportStrategy::Reduction => self.cache.retain_range(plan.keep.clone()),
            ImportStrategy::InsertionBefore => {
                self.cache.retain_range(plan.keep.clone());
                self.cache.prepend(staged);
            }
            ImportStrategy::InsertionAfter => {
                self.cache.retain_range(plan.keep.clone());
                self.cache.append(staged);
            }
        }
        self.commit_selection();

        log::info!(
            "Selection [{start}, {end}] cached with {:?}: {frames_decoded} decoded, {frames_trimmed} trimmed, {} total",
            plan.strategy,
            self.cache.len(),
        );

        Ok(ExtractionOutcome {
            strategy: plan.strategy,
            frames_decoded,
            frames_trimmed,
            cached_frames: self.cache.len(),
        })
    }

    /// Whether `[start, end]` fits in `max_seconds` and `max_memory_mib`.
    pub fn can_extract_to_memory(&self, start: i64, end: i64, max_seconds: f64, max_memory_mib: f64) -> bool {
        selection::can_extract_to_memory(&self.info, start, end, max_seconds, max_memory_mib)
    }

    /// Expected frame count of `[start, end]`; a negative `end` means the
    /// end of the file.
    pub fn estimate_frame_count(&self, start: i64, end: i64) -> i64 {
        selection::estimate_frame_count(&self.info, start, end)
    }

    /// Export the selection described by `request` through `writer`.
    ///
    /// Frames come from the cache in analysis mode and are decoded otherwise.
    /// Individual write failures are logged and counted in the report; the
    /// writer is closed whenever it was opened.
    pub fn save<W, O>(
        &mut self,
        writer: &mut W,
        request: &SaveRequest,
        overlay: &mut O,
        options: &ExtractOptions,
    ) -> Result<SaveReport, SaveError>
    where
        W: OutputWriter,
        O: FrameOverlay,
    {
        let session = self.session.as_mut().ok_or(SaveError::NotLoaded)?;
        let info = self.info.clone();
        let native_interval_ms = info.frame_interval_ms;

        if self.selection.analysis_mode {
            let mut source = CachedSource::new(&self.cache, 0);
            export::save_selection(&mut source, writer, overlay, request, native_interval_ms, options, &info)
        } else {
            let mut source = LiveDecodeSource::new(session, &mut self.info, self.selection.current_timestamp);
            let report = export::save_selection(&mut source, writer, overlay, request, native_interval_ms, options, &info);
            self.selection.current_timestamp = source.current_timestamp();
            report
        }
    }

    /// Text stored in the metadata stream, if the file has one.
    ///
    /// The decoder is sought back to the first frame afterwards.
    pub fn read_metadata(&mut self) -> Option<String> {
        let first_timestamp = self.info.first_timestamp;
        self.session.as_mut()?.read_metadata(first_timestamp)
    }

    fn plan(&self, start: i64, end: i64, force_reload: bool) -> SelectionPlan {
        selection::plan_selection(
            &self.cache,
            self.selection.analysis_mode,
            self.info.average_timestamps_per_frame,
            start,
            end,
            force_reload,
        )
    }

    fn discard_cache(&mut self) {
        self.cache.clear();
        self.commit_selection();
    }

    /// Derive the cursor from the cache content.
    fn commit_selection(&mut self) {
        let Some(last) = self.cache.len().checked_sub(1) else {
            self.selection.analysis_mode = false;
            self.selection.current_frame = None;
            self.selection.duration_frames = 0;
            return;
        };

        let index = self.cache.frame_number_for(self.selection.current_timestamp).min(last);
        self.selection.analysis_mode = true;
        self.selection.duration_frames = self.cache.len();
        self.selection.current_frame = Some(index);
        if let Some(frame) = self.cache.get(index) {
            self.selection.current_timestamp = frame.timestamp;
        }
    }
}

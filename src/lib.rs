//! # scrubcache
//!
//! Frame-accurate video navigation with an in-memory selection cache, and
//! export of the selection to a new video file.
//!
//! A [`VideoFile`] opens a container, picks its best video stream and works
//! out frame rate, duration and display geometry. Frames can then be read by
//! timestamp or stepped through one at a time. A selection of a few seconds
//! can be decoded once into a [`FrameCache`]; navigation inside it is then
//! served from memory, and moving the selection only decodes what is new.
//! The selection is exported through an [`OutputWriter`], optionally passing
//! every frame through a [`FrameOverlay`] first.
//!
//! Demuxing, decoding and encoding sit behind the traits in [`backend`]. The
//! default backend uses FFmpeg through
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next).
//!
//! ## Quick Start
//!
//! ### Step through a file
//!
//! ```no_run
//! use scrubcache::VideoFile;
//!
//! let mut video = VideoFile::new();
//! let info = video.load("input.mkv")?;
//! println!("{}x{} at {:.2} fps", info.width, info.height, info.fps);
//!
//! video.read_frame(Some(0), 1)?;
//! video.read_frame(None, 1)?;
//! if let Some(image) = video.current_image() {
//!     image.save("second_frame.png")?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Cache a selection and export it
//!
//! ```no_run
//! use scrubcache::{CacheBudget, ExtractOptions, FfmpegVideoWriter, NoOverlay, SaveRequest, VideoFile};
//!
//! let mut video = VideoFile::new();
//! video.load("input.mkv")?;
//! let second = video.info().one_second();
//! let (start, end) = (2 * second, 5 * second);
//!
//! if CacheBudget::default().allows(video.info(), start, end) {
//!     video.extract_to_memory(start, end, false, &ExtractOptions::new())?;
//! }
//!
//! let request = SaveRequest::new("clip.mkv", start, end).with_frame_interval(200);
//! let mut writer = FfmpegVideoWriter::default();
//! video.save(&mut writer, &request, &mut NoOverlay, &ExtractOptions::new())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on the system.

pub mod backend;
pub mod cache;
pub mod configuration;
pub mod conversion;
pub mod converter;
mod decoder;
pub mod encode;
pub mod error;
pub mod export;
pub mod ffmpeg;
pub mod input;
pub mod metadata;
pub mod probe;
pub mod progress;
pub mod seek;
pub mod selection;
mod source;
pub mod thumbnail;
pub mod video_file;

pub use backend::{
    ContainerInfo, Decoded, Demuxer, FrameOverlay, MediaBackend, NoOverlay, OutputWriter, PacketInfo, PictureConverter,
    StreamCodec, StreamInfo, StreamKind,
};
pub use cache::{DecodedFrame, FrameCache};
pub use configuration::{CacheBudget, ExtractOptions, LoadOptions};
pub use converter::FfmpegConverter;
pub use encode::{FfmpegVideoWriter, VideoCodec, VideoEncoderOptions};
pub use error::{ConvertError, DemuxError, LoadError, ReadError, SaveError, WriteError};
pub use export::{ExportPacing, SaveReport, SaveRequest};
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use input::{FfmpegBackend, FfmpegInput};
pub use metadata::{AspectRatioMode, FpsSource, ScalingQuality, VideoInfo};
pub use probe::ProbedVideo;
pub use progress::{CancellationToken, NoOpProgress, OperationType, ProgressCallback, ProgressInfo};
pub use selection::{ExtractionOutcome, ImportStrategy, PrimarySelection, SelectionPlan};
pub use thumbnail::ThumbnailSet;
pub use video_file::VideoFile;

//! Error types for `scrubcache`.
//!
//! Each component reports its own error enum so callers can tell a file that
//! never opened apart from a frame that could not be reached or an export
//! that lost its output. Messages carry the path, timestamp or backend reason
//! needed to diagnose the failure without extra logging at the call site.

use std::path::PathBuf;

use ffmpeg_next::Error as FfmpegError;
use thiserror::Error;

/// Failures while opening and probing a video file.
///
/// A failed load always leaves the [`VideoFile`](crate::VideoFile) unloaded.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LoadError {
    /// The container could not be opened.
    #[error("Failed to open video file at {path}: {reason}")]
    FileNotOpened {
        /// Path passed to [`VideoFile::load`](crate::VideoFile::load).
        path: PathBuf,
        /// Reason reported by the backend.
        reason: String,
    },

    /// The container opened but its streams could not be described.
    #[error("Stream information unavailable: {0}")]
    StreamInfoUnavailable(String),

    /// No stream of the container carries video.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// The backend has no decoder for the selected video codec.
    #[error("No decoder available for codec {0}")]
    NoDecoder(String),

    /// A decoder exists but refused to open.
    #[error("Failed to open video decoder: {0}")]
    DecoderOpenFailed(String),
}

/// Failures while positioning on or decoding a single frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ReadError {
    /// No file is loaded.
    #[error("No video file is loaded")]
    NotLoaded,

    /// The read loop ended before reaching the requested frame.
    #[error("Frame could not be read (stream exhausted before the target)")]
    FrameNotRead,

    /// The decoding geometry leaves no room for a picture.
    #[error("Cannot allocate a {width}x{height} picture")]
    MemoryAllocationFailed {
        /// Requested decoding width.
        width: u32,
        /// Requested decoding height.
        height: u32,
    },

    /// The decoded picture could not be converted to RGB.
    #[error("Image conversion failed at timestamp {timestamp}: {reason}")]
    ImageConversionFailed {
        /// Timestamp of the picture that failed.
        timestamp: i64,
        /// Reason reported by the converter.
        reason: String,
    },

    /// A cache build was cancelled through its
    /// [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,
}

/// Failures inside the picture converter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConvertError {
    /// Deinterlacing failed; callers fall back to the interlaced picture.
    #[error("Deinterlace failed: {0}")]
    Deinterlace(String),

    /// Scaling or pixel format conversion failed.
    #[error("Scale/convert failed: {0}")]
    Scale(String),
}

/// Failures from the demuxer and decoder.
///
/// End of stream is its own variant: it terminates read loops normally,
/// whereas [`DemuxError::Failed`] is a genuine backend error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DemuxError {
    /// No packets remain.
    #[error("End of stream")]
    EndOfStream,

    /// The backend reported an error.
    #[error("Demuxer error: {0}")]
    Failed(String),
}

impl From<FfmpegError> for DemuxError {
    fn from(error: FfmpegError) -> Self {
        match error {
            FfmpegError::Eof => DemuxError::EndOfStream,
            other => DemuxError::Failed(other.to_string()),
        }
    }
}

/// Failure reported by an [`OutputWriter`](crate::OutputWriter).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Output writer error: {0}")]
pub struct WriteError(pub String);

impl WriteError {
    /// Build an error from any displayable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl From<FfmpegError> for WriteError {
    fn from(error: FfmpegError) -> Self {
        Self(error.to_string())
    }
}

/// Failures while exporting a selection.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SaveError {
    /// No file is loaded.
    #[error("No video file is loaded")]
    NotLoaded,

    /// The output writer could not be opened.
    #[error("Output file could not be opened: {0}")]
    OutputNotOpened(WriteError),

    /// The metadata text could not be written.
    #[error("Metadata could not be saved: {0}")]
    MetadataNotSaved(WriteError),

    /// A source frame could not be read.
    #[error("Reading error during export: {0}")]
    Reading(#[from] ReadError),

    /// The export was cancelled.
    #[error("Export cancelled")]
    Cancelled,
}

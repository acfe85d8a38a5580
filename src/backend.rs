//! Collaborator traits.
//!
//! The caching and export logic never talks to FFmpeg directly. It drives a
//! [`MediaBackend`] that opens a [`Demuxer`] and hands out a
//! [`PictureConverter`], writes through an [`OutputWriter`], and lets a
//! [`FrameOverlay`] stamp annotations on exported frames. The FFmpeg
//! implementations live in [`input`](crate::input),
//! [`converter`](crate::converter) and [`encode`](crate::encode).

use std::path::Path;

use ffmpeg_next::Rational;
use image::RgbImage;

use crate::error::{ConvertError, DemuxError, LoadError, WriteError};
use crate::metadata::{ScalingQuality, VideoInfo};

/// Media type of a container stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Video.
    Video,
    /// Audio.
    Audio,
    /// Subtitles (and the XML metadata track).
    Subtitle,
    /// Anything else (data, attachments).
    Other,
}

/// Codec of a stream, as far as this crate cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamCodec {
    /// MPEG-2 video, whose aspect field holds a display ratio.
    Mpeg2Video,
    /// Plain text subtitles.
    Text,
    /// Any other codec, by short name.
    Other(String),
}

impl StreamCodec {
    /// Short codec name.
    pub fn name(&self) -> &str {
        match self {
            StreamCodec::Mpeg2Video => "mpeg2video",
            StreamCodec::Text => "text",
            StreamCodec::Other(name) => name,
        }
    }
}

/// Description of one container stream.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// Index inside the container.
    pub index: usize,
    /// Media type.
    pub kind: StreamKind,
    /// Codec.
    pub codec: StreamCodec,
    /// Whether the backend can decode this codec.
    pub decoder_available: bool,
    /// Language tag, if any.
    pub language: Option<String>,
    /// Frame count declared by the container, 0 when unknown.
    pub frame_count: i64,
    /// Stream time base.
    pub time_base: Rational,
    /// Codec time base.
    pub codec_time_base: Rational,
    /// Stored picture width (video only).
    pub width: u32,
    /// Stored picture height (video only).
    pub height: u32,
    /// Sample aspect ratio (video only), `0/1` when unset.
    pub sample_aspect_ratio: Rational,
}

/// Container-level description produced when a file is opened.
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    /// Duration in microseconds, 0 or negative when unknown.
    pub duration_micros: i64,
    /// Start time in microseconds, 0 or negative when unknown.
    pub start_time_micros: i64,
    /// Every stream in container order.
    pub streams: Vec<StreamInfo>,
}

/// A demuxed packet.
pub trait PacketInfo {
    /// Index of the stream the packet belongs to.
    fn stream_index(&self) -> usize;
    /// Decoding timestamp, if present.
    fn dts(&self) -> Option<i64>;
    /// Raw payload.
    fn payload(&self) -> &[u8];
}

/// A complete picture handed back by the decoder.
#[derive(Debug, Clone)]
pub struct Decoded<P> {
    /// Backend picture.
    pub picture: P,
    /// Timestamp of the picture in the stream time base, if known.
    pub timestamp: Option<i64>,
}

/// An opened container plus its video decoder.
///
/// Closing happens on drop.
pub trait Demuxer {
    /// Packet type produced by [`read_packet`](Demuxer::read_packet).
    type Packet: PacketInfo;
    /// Decoded picture type.
    type Picture;

    /// Streams and container timing.
    fn container(&self) -> &ContainerInfo;

    /// Open the decoder for `stream`.
    fn open_decoder(&mut self, stream: usize) -> Result<(), LoadError>;

    /// Seek `stream` to `timestamp`; with `backward`, land on the last
    /// keyframe at or before it.
    fn seek(&mut self, stream: usize, timestamp: i64, backward: bool) -> Result<(), DemuxError>;

    /// Drop every picture buffered in the decoder.
    fn flush(&mut self);

    /// Read the next packet of any stream.
    fn read_packet(&mut self) -> Result<Self::Packet, DemuxError>;

    /// Feed a video packet; returns a picture once one is complete.
    fn decode_video(&mut self, packet: &Self::Packet) -> Result<Option<Decoded<Self::Picture>>, DemuxError>;

    /// After end of stream, return pictures still held by the decoder.
    fn drain_video(&mut self) -> Result<Option<Decoded<Self::Picture>>, DemuxError> {
        Ok(None)
    }
}

/// Deinterlacing and scaling of decoded pictures.
pub trait PictureConverter<P> {
    /// Deinterlace at source size and format.
    fn deinterlace(&mut self, picture: &P) -> Result<P, ConvertError>;

    /// Scale to `width` x `height` and convert to packed RGB24.
    fn scale_convert(
        &mut self,
        picture: &P,
        width: u32,
        height: u32,
        quality: ScalingQuality,
    ) -> Result<RgbImage, ConvertError>;
}

/// Factory for demuxers and converters.
pub trait MediaBackend {
    /// Demuxer type.
    type Demuxer: Demuxer;
    /// Converter for the demuxer's pictures.
    type Converter: PictureConverter<<Self::Demuxer as Demuxer>::Picture>;

    /// Open a container and describe its streams.
    fn open(&self, path: &Path) -> Result<Self::Demuxer, LoadError>;

    /// Create a converter for pictures of the given video stream.
    fn converter(&self, video: &StreamInfo) -> Self::Converter;
}

/// Destination of an export.
pub trait OutputWriter {
    /// Create the output file and write its header.
    fn open(&mut self, path: &Path, info: &VideoInfo, frame_interval_ms: i32, has_metadata: bool) -> Result<(), WriteError>;

    /// Store the metadata text; called once, right after [`open`](OutputWriter::open).
    fn write_metadata(&mut self, text: &str) -> Result<(), WriteError>;

    /// Append one frame.
    fn write_frame(&mut self, image: &RgbImage) -> Result<(), WriteError>;

    /// Finish the file; with `flush`, drain buffered frames first.
    fn close(&mut self, flush: bool) -> Result<(), WriteError>;
}

/// Annotation stamping during export.
///
/// Returns whether the frame is a key frame, i.e. one that carries
/// annotations.
pub trait FrameOverlay {
    /// Draw on `surface`, a private copy of the frame at `timestamp`.
    fn apply(&mut self, surface: &mut RgbImage, timestamp: i64, flush_drawings: bool, keyframes_only: bool) -> bool;
}

impl<F> FrameOverlay for F
where
    F: FnMut(&mut RgbImage, i64, bool, bool) -> bool,
{
    fn apply(&mut self, surface: &mut RgbImage, timestamp: i64, flush_drawings: bool, keyframes_only: bool) -> bool {
        self(surface, timestamp, flush_drawings, keyframes_only)
    }
}

/// Overlay that draws nothing and marks no key frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOverlay;

impl FrameOverlay for NoOverlay {
    fn apply(&mut self, _surface: &mut RgbImage, _timestamp: i64, _flush_drawings: bool, _keyframes_only: bool) -> bool {
        false
    }
}

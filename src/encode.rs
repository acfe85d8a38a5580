//! FFmpeg output writer.
//!
//! [`FfmpegVideoWriter`] encodes exported frames into any container FFmpeg can
//! infer from the output extension. Metadata text goes into a `text` subtitle
//! stream tagged with the language `XML`, which the prober recognises when the
//! file is loaded again.
//!
//! # Example
//!
//! ```no_run
//! use scrubcache::{
//!     ExtractOptions, FfmpegVideoWriter, NoOverlay, SaveRequest, VideoCodec, VideoEncoderOptions, VideoFile,
//! };
//!
//! let mut video = VideoFile::new();
//! video.load("input.mkv")?;
//! let mut writer = FfmpegVideoWriter::new(VideoEncoderOptions::default().codec(VideoCodec::H264));
//! let request = SaveRequest::new("clip.mkv", 0, 90_000);
//! video.save(&mut writer, &request, &mut NoOverlay, &ExtractOptions::new())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::path::Path;

use ffmpeg_next::codec::Id;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::codec::encoder::video::Encoder as VideoEncoder;
use ffmpeg_next::format::context::Output;
use ffmpeg_next::format::{Flags as FormatFlags, Pixel};
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::{Dictionary, Packet, Rational};
use ffmpeg_sys_next::{AVCodecID, AVMediaType};
use image::RgbImage;
use image::imageops::{self, FilterType};

use crate::backend::OutputWriter;
use crate::error::WriteError;
use crate::metadata::VideoInfo;
use crate::probe::METADATA_LANGUAGE;

/// Encoder settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoEncoderOptions {
    /// Codec to use. Default is MPEG-4 Part 2.
    pub codec: VideoCodec,
    /// Bitrate in bits per second; `None` leaves the codec default.
    pub bitrate: Option<usize>,
    /// Distance between intra frames.
    pub gop_size: u32,
}

impl Default for VideoEncoderOptions {
    fn default() -> Self {
        Self {
            codec: VideoCodec::Mpeg4,
            bitrate: Some(4_000_000),
            gop_size: 12,
        }
    }
}

impl VideoEncoderOptions {
    /// Set the codec.
    #[must_use]
    pub fn codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the target bitrate in bits per second.
    #[must_use]
    pub fn bitrate(mut self, bitrate: usize) -> Self {
        self.bitrate = Some(bitrate);
        self
    }

    /// Set the intra frame distance.
    #[must_use]
    pub fn gop_size(mut self, frames: u32) -> Self {
        self.gop_size = frames.max(1);
        self
    }
}

/// Supported output video codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    /// H.264 / AVC.
    H264,
    /// H.265 / HEVC.
    H265,
    /// MPEG-4 Part 2.
    Mpeg4,
}

impl VideoCodec {
    fn codec_id(self) -> Id {
        match self {
            VideoCodec::H264 => Id::H264,
            VideoCodec::H265 => Id::HEVC,
            VideoCodec::Mpeg4 => Id::MPEG4,
        }
    }
}

struct Encoding {
    output: Output,
    encoder: VideoEncoder,
    scaler: ScalingContext,
    width: u32,
    height: u32,
    video_stream: usize,
    metadata_stream: Option<usize>,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    next_pts: i64,
}

impl Encoding {
    fn write_pending_packets(&mut self) -> Result<(), WriteError> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.video_stream);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .map_err(|error| WriteError::new(format!("write packet failed: {error}")))?;
        }
        Ok(())
    }
}

/// [`OutputWriter`] backed by FFmpeg encoders and muxers.
///
/// Pictures are encoded at the selection's decoding geometry; frames of a
/// different size are resized first.
pub struct FfmpegVideoWriter {
    options: VideoEncoderOptions,
    encoding: Option<Encoding>,
}

impl FfmpegVideoWriter {
    /// Create a writer; nothing is opened until [`OutputWriter::open`].
    pub fn new(options: VideoEncoderOptions) -> Self {
        Self { options, encoding: None }
    }

    /// Whether an output file is currently open.
    pub fn is_open(&self) -> bool {
        self.encoding.is_some()
    }

    fn encoding(&mut self) -> Result<&mut Encoding, WriteError> {
        self.encoding
            .as_mut()
            .ok_or_else(|| WriteError::new("no output file is open"))
    }
}

impl Default for FfmpegVideoWriter {
    fn default() -> Self {
        Self::new(VideoEncoderOptions::default())
    }
}

fn add_metadata_stream(output: &mut Output) -> Result<usize, WriteError> {
    let mut stream = output
        .add_stream(Id::TEXT)
        .map_err(|error| WriteError::new(format!("cannot add metadata stream: {error}")))?;

    let mut parameters = stream.parameters();
    // SAFETY: `parameters` points at the codec parameters owned by the new stream.
    unsafe {
        let raw = parameters.as_mut_ptr();
        (*raw).codec_type = AVMediaType::AVMEDIA_TYPE_SUBTITLE;
        (*raw).codec_id = AVCodecID::AV_CODEC_ID_TEXT;
    }
    stream.set_time_base(Rational::new(1, 1000));

    let mut tags = Dictionary::new();
    tags.set("language", METADATA_LANGUAGE);
    stream.set_metadata(tags);

    Ok(stream.index())
}

impl OutputWriter for FfmpegVideoWriter {
    fn open(&mut self, path: &Path, info: &VideoInfo, frame_interval_ms: i32, has_metadata: bool) -> Result<(), WriteError> {
        if self.encoding.is_some() {
            return Err(WriteError::new("an output file is already open"));
        }

        let width = info.decoding_width;
        let height = info.decoding_height;
        let codec_id = self.options.codec.codec_id();
        let time_base = Rational::new(frame_interval_ms.max(1), 1000);
        log::info!(
            "Opening {} for writing ({width}x{height}, {:?}, {frame_interval_ms} ms per frame)",
            path.display(),
            self.options.codec,
        );

        let mut output = ffmpeg_next::format::output(&path)
            .map_err(|error| WriteError::new(format!("cannot open output: {error}")))?;
        let needs_global_header = output.format().flags().contains(FormatFlags::GLOBAL_HEADER);

        let codec = ffmpeg_next::encoder::find(codec_id)
            .ok_or_else(|| WriteError::new(format!("codec {codec_id:?} not available")))?;

        let mut stream = output
            .add_stream(codec)
            .map_err(|error| WriteError::new(format!("cannot add video stream: {error}")))?;
        let video_stream = stream.index();

        let mut encoder = CodecContext::from_parameters(stream.parameters())
            .and_then(|context| context.encoder().video())
            .map_err(|error| WriteError::new(format!("cannot create video encoder: {error}")))?;

        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(time_base);
        encoder.set_frame_rate(Some(time_base.invert()));
        encoder.set_gop(self.options.gop_size);
        if let Some(bitrate) = self.options.bitrate {
            encoder.set_bit_rate(bitrate);
        }
        if needs_global_header {
            // SAFETY: flag update on an encoder context that is not open yet.
            unsafe {
                (*encoder.as_mut_ptr()).flags |= ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let encoder = encoder
            .open_as(codec)
            .map_err(|error| WriteError::new(format!("cannot open encoder: {error}")))?;
        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);

        let metadata_stream = if has_metadata {
            Some(add_metadata_stream(&mut output)?)
        } else {
            None
        };

        output
            .write_header()
            .map_err(|error| WriteError::new(format!("cannot write header: {error}")))?;
        let stream_time_base = output
            .stream(video_stream)
            .map(|stream| stream.time_base())
            .ok_or_else(|| WriteError::new("video stream vanished after the header"))?;

        let scaler = ScalingContext::get(Pixel::RGB24, width, height, Pixel::YUV420P, width, height, ScalingFlags::BILINEAR)
            .map_err(|error| WriteError::new(format!("cannot create scaler: {error}")))?;

        self.encoding = Some(Encoding {
            output,
            encoder,
            scaler,
            width,
            height,
            video_stream,
            metadata_stream,
            encoder_time_base: time_base,
            stream_time_base,
            next_pts: 0,
        });
        Ok(())
    }

    fn write_metadata(&mut self, text: &str) -> Result<(), WriteError> {
        let encoding = self.encoding()?;
        let stream = encoding
            .metadata_stream
            .ok_or_else(|| WriteError::new("output was opened without a metadata stream"))?;

        let mut packet = Packet::copy(text.as_bytes());
        packet.set_stream(stream);
        packet.set_pts(Some(0));
        packet.set_dts(Some(0));
        packet.set_duration(1);
        packet
            .write_interleaved(&mut encoding.output)
            .map_err(|error| WriteError::new(format!("cannot write metadata: {error}")))
    }

    fn write_frame(&mut self, image: &RgbImage) -> Result<(), WriteError> {
        let encoding = self.encoding()?;
        let (width, height) = (encoding.width, encoding.height);

        let resized;
        let rgb = if image.width() != width || image.height() != height {
            resized = imageops::resize(image, width, height, FilterType::Triangle);
            &resized
        } else {
            image
        };

        let mut source = VideoFrame::new(Pixel::RGB24, width, height);
        let stride = source.stride(0);
        let row_length = width as usize * 3;
        for (destination, row) in source
            .data_mut(0)
            .chunks_mut(stride)
            .zip(rgb.as_raw().chunks(row_length))
        {
            destination[..row_length].copy_from_slice(row);
        }

        let mut converted = VideoFrame::empty();
        encoding
            .scaler
            .run(&source, &mut converted)
            .map_err(|error| WriteError::new(format!("scaling failed: {error}")))?;
        converted.set_pts(Some(encoding.next_pts));
        encoding.next_pts += 1;

        encoding
            .encoder
            .send_frame(&converted)
            .map_err(|error| WriteError::new(format!("send_frame failed: {error}")))?;
        encoding.write_pending_packets()
    }

    fn close(&mut self, flush: bool) -> Result<(), WriteError> {
        let Some(mut encoding) = self.encoding.take() else {
            return Ok(());
        };

        if flush {
            encoding
                .encoder
                .send_eof()
                .map_err(|error| WriteError::new(format!("send_eof failed: {error}")))?;
            encoding.write_pending_packets()?;
        }

        log::debug!("Closing output after {} frames", encoding.next_pts);
        encoding
            .output
            .write_trailer()
            .map_err(|error| WriteError::new(format!("cannot write trailer: {error}")))
    }
}

impl Drop for FfmpegVideoWriter {
    fn drop(&mut self) {
        if self.encoding.is_some()
            && let Err(error) = self.close(false)
        {
            log::warn!("Output writer dropped while open: {error}");
        }
    }
}

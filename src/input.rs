//! FFmpeg demuxer and decoder.
//!
//! [`FfmpegBackend`] opens containers with `ffmpeg-next` and describes their
//! streams; [`FfmpegInput`] reads packets, seeks and decodes video.

use std::collections::VecDeque;
use std::path::Path;

use ffmpeg_next::codec::Id;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::codec::decoder::Video as VideoDecoder;
use ffmpeg_next::format::context::Input;
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::media::Type;
use ffmpeg_next::{Error as FfmpegError, Packet, Rational};

use crate::backend::{
    ContainerInfo, Decoded, Demuxer, MediaBackend, PacketInfo, StreamCodec, StreamInfo, StreamKind,
};
use crate::converter::FfmpegConverter;
use crate::error::{DemuxError, LoadError};

/// Backend built on the system FFmpeg libraries.
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    /// Create the backend. FFmpeg itself is initialised on first open.
    pub fn new() -> Self {
        Self
    }
}

impl MediaBackend for FfmpegBackend {
    type Demuxer = FfmpegInput;
    type Converter = FfmpegConverter;

    fn open(&self, path: &Path) -> Result<FfmpegInput, LoadError> {
        ffmpeg_next::init().map_err(|error| LoadError::FileNotOpened {
            path: path.to_path_buf(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let input = ffmpeg_next::format::input(&path).map_err(|error| LoadError::FileNotOpened {
            path: path.to_path_buf(),
            reason: error.to_string(),
        })?;

        let container = describe_container(&input)?;
        Ok(FfmpegInput {
            input,
            container,
            decoder: None,
            pending: VecDeque::new(),
            end_of_stream_sent: false,
        })
    }

    fn converter(&self, video: &StreamInfo) -> FfmpegConverter {
        FfmpegConverter::new(video.time_base)
    }
}

fn describe_container(input: &Input) -> Result<ContainerInfo, LoadError> {
    // SAFETY: the context is open for the lifetime of `input`.
    let start_time_micros = unsafe { (*input.as_ptr()).start_time };

    let streams = input
        .streams()
        .map(|stream| {
            let parameters = stream.parameters();
            let id = parameters.id();
            let kind = match parameters.medium() {
                Type::Video => StreamKind::Video,
                Type::Audio => StreamKind::Audio,
                Type::Subtitle => StreamKind::Subtitle,
                _ => StreamKind::Other,
            };
            let codec = match id {
                Id::MPEG2VIDEO => StreamCodec::Mpeg2Video,
                Id::TEXT => StreamCodec::Text,
                other => StreamCodec::Other(other.name().to_string()),
            };

            // Modern decoders no longer expose a tick rate of their own; the
            // average frame rate stands in for it.
            let average_rate = stream.avg_frame_rate();
            let codec_time_base = if average_rate.numerator() != 0 {
                average_rate.invert()
            } else {
                Rational::new(0, 1)
            };

            let mut info = StreamInfo {
                index: stream.index(),
                kind,
                codec,
                decoder_available: ffmpeg_next::decoder::find(id).is_some(),
                language: stream.metadata().get("language").map(str::to_string),
                frame_count: stream.frames(),
                time_base: stream.time_base(),
                codec_time_base,
                width: 0,
                height: 0,
                sample_aspect_ratio: Rational::new(0, 1),
            };

            if kind == StreamKind::Video {
                let context = CodecContext::from_parameters(parameters)
                    .map_err(|error| LoadError::StreamInfoUnavailable(format!("stream {}: {error}", info.index)))?;
                // SAFETY: plain field reads on a context we own.
                let (width, height, sample_aspect_ratio) = unsafe {
                    let raw = context.as_ptr();
                    ((*raw).width, (*raw).height, Rational::from((*raw).sample_aspect_ratio))
                };
                info.width = width.max(0).unsigned_abs();
                info.height = height.max(0).unsigned_abs();
                info.sample_aspect_ratio = sample_aspect_ratio;
            }
            Ok(info)
        })
        .collect::<Result<Vec<_>, LoadError>>()?;

    Ok(ContainerInfo {
        duration_micros: input.duration(),
        start_time_micros,
        streams,
    })
}

/// An open container with its video decoder.
pub struct FfmpegInput {
    input: Input,
    container: ContainerInfo,
    decoder: Option<VideoDecoder>,
    pending: VecDeque<Decoded<VideoFrame>>,
    end_of_stream_sent: bool,
}

impl FfmpegInput {
    fn decoder(&mut self) -> Result<&mut VideoDecoder, DemuxError> {
        self.decoder
            .as_mut()
            .ok_or_else(|| DemuxError::Failed(String::from("video decoder is not open")))
    }
}

fn receive_pictures(decoder: &mut VideoDecoder, pending: &mut VecDeque<Decoded<VideoFrame>>) {
    let mut frame = VideoFrame::empty();
    while decoder.receive_frame(&mut frame).is_ok() {
        let timestamp = frame.timestamp().or_else(|| frame.pts());
        pending.push_back(Decoded {
            picture: std::mem::replace(&mut frame, VideoFrame::empty()),
            timestamp,
        });
    }
}

impl PacketInfo for Packet {
    fn stream_index(&self) -> usize {
        self.stream()
    }

    fn dts(&self) -> Option<i64> {
        Packet::dts(self)
    }

    fn payload(&self) -> &[u8] {
        self.data().unwrap_or(&[])
    }
}

impl Demuxer for FfmpegInput {
    type Packet = Packet;
    type Picture = VideoFrame;

    fn container(&self) -> &ContainerInfo {
        &self.container
    }

    fn open_decoder(&mut self, stream: usize) -> Result<(), LoadError> {
        let parameters = self
            .input
            .stream(stream)
            .ok_or(LoadError::NoVideoStream)?
            .parameters();
        let context = CodecContext::from_parameters(parameters)
            .map_err(|error| LoadError::DecoderOpenFailed(error.to_string()))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|error| LoadError::DecoderOpenFailed(error.to_string()))?;

        log::debug!("Opened {:?} decoder for stream {stream}", decoder.id());
        self.decoder = Some(decoder);
        Ok(())
    }

    fn seek(&mut self, stream: usize, timestamp: i64, backward: bool) -> Result<(), DemuxError> {
        let flags = if backward { ffmpeg_sys_next::AVSEEK_FLAG_BACKWARD as i32 } else { 0 };
        let stream = i32::try_from(stream).map_err(|_| DemuxError::Failed(format!("stream index {stream} out of range")))?;
        // SAFETY: the context is open and exclusively borrowed.
        let code = unsafe { ffmpeg_sys_next::av_seek_frame(self.input.as_mut_ptr(), stream, timestamp, flags) };
        if code < 0 {
            return Err(DemuxError::from(FfmpegError::from(code)));
        }
        Ok(())
    }

    fn flush(&mut self) {
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.flush();
        }
        self.pending.clear();
        self.end_of_stream_sent = false;
    }

    fn read_packet(&mut self) -> Result<Packet, DemuxError> {
        let mut packet = Packet::empty();
        packet.read(&mut self.input)?;
        Ok(packet)
    }

    fn decode_video(&mut self, packet: &Packet) -> Result<Option<Decoded<VideoFrame>>, DemuxError> {
        let decoder = self.decoder()?;
        decoder.send_packet(packet)?;
        if let Some(decoder) = self.decoder.as_mut() {
            receive_pictures(decoder, &mut self.pending);
        }
        Ok(self.pending.pop_front())
    }

    fn drain_video(&mut self) -> Result<Option<Decoded<VideoFrame>>, DemuxError> {
        if !self.end_of_stream_sent {
            self.end_of_stream_sent = true;
            let decoder = self.decoder()?;
            decoder.send_eof()?;
            if let Some(decoder) = self.decoder.as_mut() {
                receive_pictures(decoder, &mut self.pending);
            }
        }
        Ok(self.pending.pop_front())
    }
}

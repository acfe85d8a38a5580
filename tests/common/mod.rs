//! In-memory backend shared by the integration tests.
//!
//! `SyntheticBackend` serves a deterministic video: frame `i` has timestamp
//! `first_timestamp + i * ticks_per_frame` in a 1/90000 time base, every
//! `keyframe_interval`-th frame is a key frame, and seeks land on the last
//! key frame at or before the target. Every seek, decode and conversion is
//! recorded so tests can check how much work an operation caused.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ffmpeg_next::Rational;
use image::{Rgb, RgbImage};
use scrubcache::{
    ContainerInfo, ConvertError, Decoded, DemuxError, Demuxer, LoadError, MediaBackend, OutputWriter, PacketInfo,
    PictureConverter, ScalingQuality, StreamCodec, StreamInfo, StreamKind, VideoInfo, WriteError,
};

pub const TICKS_PER_SECOND: i32 = 90_000;

/// Something the backend was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Seek(i64),
    Flush,
    Decode(i64),
    Scale { timestamp: i64, width: u32, height: u32 },
    Deinterlace(i64),
}

#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    pub fn decodes(&self) -> usize {
        self.count(|event| matches!(event, Event::Decode(_)))
    }

    pub fn seeks(&self) -> Vec<i64> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                Event::Seek(target) => Some(*target),
                _ => None,
            })
            .collect()
    }

    pub fn scales(&self) -> Vec<(u32, u32)> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                Event::Scale { width, height, .. } => Some((*width, *height)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.0.lock().unwrap().iter().filter(|event| predicate(event)).count()
    }
}

/// Shape of the synthetic file.
#[derive(Debug, Clone)]
pub struct SyntheticVideo {
    pub frame_count: usize,
    pub ticks_per_frame: i64,
    pub first_timestamp: i64,
    pub keyframe_interval: usize,
    pub width: u32,
    pub height: u32,
    pub sample_aspect_ratio: Rational,
    pub codec: StreamCodec,
    pub decoder_available: bool,
    /// Frame count declared by the container (0 = unknown).
    pub declared_frames: i64,
    /// Container duration in microseconds (0 = unknown).
    pub duration_micros: i64,
    /// Pictures held back by the decoder until later packets or the drain.
    pub decoder_delay: usize,
    /// XML metadata text stored in a subtitle stream.
    pub metadata: Option<String>,
    /// Add an audio stream interleaved with the video.
    pub with_audio: bool,
    /// The first seek lands this many frames after where it should.
    pub first_seek_overshoot: Option<usize>,
}

impl SyntheticVideo {
    /// `frame_count` frames at 25 fps, 640x480, a key frame every 10 frames.
    pub fn new(frame_count: usize) -> Self {
        let ticks_per_frame = 3_600;
        Self {
            frame_count,
            ticks_per_frame,
            first_timestamp: 0,
            keyframe_interval: 10,
            width: 640,
            height: 480,
            sample_aspect_ratio: Rational::new(1, 1),
            codec: StreamCodec::Other(String::from("synthetic")),
            decoder_available: true,
            declared_frames: frame_count as i64,
            duration_micros: frame_count as i64 * ticks_per_frame * 1_000_000 / i64::from(TICKS_PER_SECOND),
            decoder_delay: 0,
            metadata: None,
            with_audio: false,
            first_seek_overshoot: None,
        }
    }

    pub fn timestamp(&self, frame: usize) -> i64 {
        self.first_timestamp + frame as i64 * self.ticks_per_frame
    }

    pub fn timestamps(&self) -> Vec<i64> {
        (0..self.frame_count).map(|frame| self.timestamp(frame)).collect()
    }

    pub fn container(&self) -> ContainerInfo {
        let mut streams = vec![StreamInfo {
            index: 0,
            kind: StreamKind::Video,
            codec: self.codec.clone(),
            decoder_available: self.decoder_available,
            language: None,
            frame_count: self.declared_frames,
            time_base: Rational::new(1, TICKS_PER_SECOND),
            codec_time_base: Rational::new(0, 1),
            width: self.width,
            height: self.height,
            sample_aspect_ratio: self.sample_aspect_ratio,
        }];
        if self.metadata.is_some() {
            streams.push(subtitle_stream(1, Some("XML")));
        }
        if self.with_audio {
            streams.push(StreamInfo {
                index: streams.len(),
                kind: StreamKind::Audio,
                codec: StreamCodec::Other(String::from("pcm")),
                decoder_available: true,
                language: None,
                frame_count: 0,
                time_base: Rational::new(1, 48_000),
                codec_time_base: Rational::new(0, 1),
                width: 0,
                height: 0,
                sample_aspect_ratio: Rational::new(0, 1),
            });
        }
        ContainerInfo {
            duration_micros: self.duration_micros,
            start_time_micros: self.first_timestamp * 1_000_000 / i64::from(TICKS_PER_SECOND),
            streams,
        }
    }
}

pub fn subtitle_stream(index: usize, language: Option<&str>) -> StreamInfo {
    StreamInfo {
        index,
        kind: StreamKind::Subtitle,
        codec: StreamCodec::Text,
        decoder_available: true,
        language: language.map(str::to_string),
        frame_count: 1,
        time_base: Rational::new(1, 1000),
        codec_time_base: Rational::new(0, 1),
        width: 0,
        height: 0,
        sample_aspect_ratio: Rational::new(0, 1),
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticPacket {
    stream: usize,
    dts: i64,
    frame: Option<usize>,
    payload: Vec<u8>,
}

impl PacketInfo for SyntheticPacket {
    fn stream_index(&self) -> usize {
        self.stream
    }

    fn dts(&self) -> Option<i64> {
        Some(self.dts)
    }

    fn payload(&self) -> &[u8] {
        &self.payload
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticPicture {
    pub frame: usize,
    pub timestamp: i64,
    pub deinterlaced: bool,
}

pub struct SyntheticDemuxer {
    video: SyntheticVideo,
    container: ContainerInfo,
    packets: Vec<SyntheticPacket>,
    position: usize,
    held: VecDeque<SyntheticPicture>,
    overshoot: Option<usize>,
    events: EventLog,
}

impl SyntheticDemuxer {
    fn new(video: SyntheticVideo, events: EventLog) -> Self {
        let mut packets = Vec::new();
        if let Some(text) = &video.metadata {
            packets.push(SyntheticPacket {
                stream: 1,
                dts: 0,
                frame: None,
                payload: text.as_bytes().to_vec(),
            });
        }
        let audio_stream = if video.metadata.is_some() { 2 } else { 1 };
        for frame in 0..video.frame_count {
            let timestamp = video.timestamp(frame);
            packets.push(SyntheticPacket {
                stream: 0,
                dts: timestamp,
                frame: Some(frame),
                payload: vec![frame as u8],
            });
            if video.with_audio {
                packets.push(SyntheticPacket {
                    stream: audio_stream,
                    dts: timestamp,
                    frame: None,
                    payload: vec![0; 4],
                });
            }
        }

        Self {
            container: video.container(),
            overshoot: video.first_seek_overshoot,
            video,
            packets,
            position: 0,
            held: VecDeque::new(),
            events,
        }
    }

    fn packet_of_frame(&self, frame: usize) -> usize {
        if frame == 0 {
            return 0;
        }
        self.packets
            .iter()
            .position(|packet| packet.frame == Some(frame))
            .unwrap_or(self.packets.len())
    }
}

impl Demuxer for SyntheticDemuxer {
    type Packet = SyntheticPacket;
    type Picture = SyntheticPicture;

    fn container(&self) -> &ContainerInfo {
        &self.container
    }

    fn open_decoder(&mut self, stream: usize) -> Result<(), LoadError> {
        if stream != 0 {
            return Err(LoadError::DecoderOpenFailed(format!("no video at {stream}")));
        }
        Ok(())
    }

    fn seek(&mut self, _stream: usize, timestamp: i64, _backward: bool) -> Result<(), DemuxError> {
        self.events.push(Event::Seek(timestamp));
        let timestamps = self.video.timestamps();
        let at_or_before = timestamps.partition_point(|&candidate| candidate <= timestamp).saturating_sub(1);
        let interval = self.video.keyframe_interval.max(1);
        let mut frame = at_or_before - at_or_before % interval;

        if let Some(extra) = self.overshoot.take() {
            let wanted = timestamps.partition_point(|&candidate| candidate < timestamp);
            frame = (wanted + extra).min(self.video.frame_count.saturating_sub(1));
        }
        self.position = self.packet_of_frame(frame);
        Ok(())
    }

    fn flush(&mut self) {
        self.events.push(Event::Flush);
        self.held.clear();
    }

    fn read_packet(&mut self) -> Result<SyntheticPacket, DemuxError> {
        let packet = self.packets.get(self.position).cloned().ok_or(DemuxError::EndOfStream)?;
        self.position += 1;
        Ok(packet)
    }

    fn decode_video(&mut self, packet: &SyntheticPacket) -> Result<Option<Decoded<SyntheticPicture>>, DemuxError> {
        let frame = packet
            .frame
            .ok_or_else(|| DemuxError::Failed(String::from("not a video packet")))?;
        self.events.push(Event::Decode(packet.dts));
        self.held.push_back(SyntheticPicture {
            frame,
            timestamp: packet.dts,
            deinterlaced: false,
        });
        if self.held.len() > self.video.decoder_delay {
            return Ok(self.held.pop_front().map(to_decoded));
        }
        Ok(None)
    }

    fn drain_video(&mut self) -> Result<Option<Decoded<SyntheticPicture>>, DemuxError> {
        Ok(self.held.pop_front().map(to_decoded))
    }
}

fn to_decoded(picture: SyntheticPicture) -> Decoded<SyntheticPicture> {
    Decoded {
        timestamp: Some(picture.timestamp),
        picture,
    }
}

/// Failure injection for the converter.
#[derive(Debug, Clone, Default)]
pub struct ConverterFaults {
    /// Scaling fails for this timestamp.
    pub fail_at: Option<i64>,
    /// Scaling fails whenever the target height differs from the source.
    pub reject_stretching: bool,
    /// Deinterlacing always fails.
    pub deinterlace_fails: bool,
}

pub struct SyntheticConverter {
    source_height: u32,
    faults: ConverterFaults,
    events: EventLog,
}

/// Colour of a converted frame; the first channel encodes the frame number.
pub fn frame_colour(frame: usize) -> Rgb<u8> {
    Rgb([(frame % 256) as u8, (frame / 256 % 256) as u8, 0x42])
}

impl PictureConverter<SyntheticPicture> for SyntheticConverter {
    fn deinterlace(&mut self, picture: &SyntheticPicture) -> Result<SyntheticPicture, ConvertError> {
        self.events.push(Event::Deinterlace(picture.timestamp));
        if self.faults.deinterlace_fails {
            return Err(ConvertError::Deinterlace(String::from("injected")));
        }
        Ok(SyntheticPicture {
            deinterlaced: true,
            ..picture.clone()
        })
    }

    fn scale_convert(
        &mut self,
        picture: &SyntheticPicture,
        width: u32,
        height: u32,
        _quality: ScalingQuality,
    ) -> Result<RgbImage, ConvertError> {
        self.events.push(Event::Scale {
            timestamp: picture.timestamp,
            width,
            height,
        });
        if self.faults.fail_at == Some(picture.timestamp) {
            return Err(ConvertError::Scale(String::from("injected")));
        }
        if self.faults.reject_stretching && height != self.source_height {
            return Err(ConvertError::Scale(String::from("stretching rejected")));
        }
        let mut image = RgbImage::from_pixel(width, height, frame_colour(picture.frame));
        if picture.deinterlaced {
            image.put_pixel(0, 0, Rgb([0xFF, 0xFF, 0xFF]));
        }
        Ok(image)
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticBackend {
    pub video: SyntheticVideo,
    pub faults: ConverterFaults,
    pub events: EventLog,
}

impl SyntheticBackend {
    pub fn new(video: SyntheticVideo) -> Self {
        Self {
            video,
            faults: ConverterFaults::default(),
            events: EventLog::default(),
        }
    }

    pub fn with_faults(mut self, faults: ConverterFaults) -> Self {
        self.faults = faults;
        self
    }
}

impl MediaBackend for SyntheticBackend {
    type Demuxer = SyntheticDemuxer;
    type Converter = SyntheticConverter;

    fn open(&self, path: &Path) -> Result<SyntheticDemuxer, LoadError> {
        if path.to_string_lossy().contains("missing") {
            return Err(LoadError::FileNotOpened {
                path: path.to_path_buf(),
                reason: String::from("No such file or directory"),
            });
        }
        Ok(SyntheticDemuxer::new(self.video.clone(), self.events.clone()))
    }

    fn converter(&self, video: &StreamInfo) -> SyntheticConverter {
        SyntheticConverter {
            source_height: video.height,
            faults: self.faults.clone(),
            events: self.events.clone(),
        }
    }
}

/// What a [`RecordingWriter`] received.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    pub path: Option<PathBuf>,
    pub frame_interval_ms: i32,
    pub has_metadata: bool,
    pub geometry: (u32, u32),
    pub metadata: Option<String>,
    /// First channel of each written frame, i.e. its frame number.
    pub frames: Vec<u8>,
    /// Dimensions of each written frame.
    pub sizes: Vec<(u32, u32)>,
    pub closed: bool,
    pub flushed: bool,
}

/// Writer that keeps everything in memory.
#[derive(Debug, Default)]
pub struct RecordingWriter {
    pub recording: Recording,
    pub fail_open: bool,
    pub fail_metadata: bool,
    /// Fail the n-th `write_frame` call (0-based).
    pub fail_write_at: Option<usize>,
    writes: usize,
}

impl RecordingWriter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutputWriter for RecordingWriter {
    fn open(&mut self, path: &Path, info: &VideoInfo, frame_interval_ms: i32, has_metadata: bool) -> Result<(), WriteError> {
        if self.fail_open {
            return Err(WriteError::new("cannot create output"));
        }
        self.recording.path = Some(path.to_path_buf());
        self.recording.frame_interval_ms = frame_interval_ms;
        self.recording.has_metadata = has_metadata;
        self.recording.geometry = (info.decoding_width, info.decoding_height);
        Ok(())
    }

    fn write_metadata(&mut self, text: &str) -> Result<(), WriteError> {
        if self.fail_metadata {
            return Err(WriteError::new("metadata rejected"));
        }
        self.recording.metadata = Some(text.to_string());
        Ok(())
    }

    fn write_frame(&mut self, image: &RgbImage) -> Result<(), WriteError> {
        let call = self.writes;
        self.writes += 1;
        if self.fail_write_at == Some(call) {
            return Err(WriteError::new("disk full"));
        }
        self.recording.frames.push(image.get_pixel(image.width() - 1, image.height() - 1).0[0]);
        self.recording.sizes.push(image.dimensions());
        Ok(())
    }

    fn close(&mut self, flush: bool) -> Result<(), WriteError> {
        self.recording.closed = true;
        self.recording.flushed = flush;
        Ok(())
    }
}

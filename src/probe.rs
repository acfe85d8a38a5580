//! Container probing.
//!
//! Picks the video stream (and the optional XML metadata stream) out of a
//! [`ContainerInfo`] and derives the [`VideoInfo`] the rest of the crate works
//! with.

use crate::backend::{ContainerInfo, StreamCodec, StreamInfo, StreamKind};
use crate::configuration::LoadOptions;
use crate::conversion;
use crate::error::LoadError;
use crate::metadata::{self, VideoInfo};

/// Language tag that marks a text subtitle stream as the metadata track.
pub const METADATA_LANGUAGE: &str = "XML";

/// Outcome of [`probe_container`].
#[derive(Debug, Clone)]
pub struct ProbedVideo {
    /// Derived information.
    pub info: VideoInfo,
    /// Index of the selected video stream.
    pub video_stream: usize,
    /// Index of the metadata stream, if the file has one.
    pub metadata_stream: Option<usize>,
}

/// The stream of `kind` with the most frames; ties go to the earliest.
pub fn best_stream(streams: &[StreamInfo], kind: StreamKind) -> Option<&StreamInfo> {
    streams
        .iter()
        .filter(|stream| stream.kind == kind)
        .fold(None, |best: Option<&StreamInfo>, stream| match best {
            Some(current) if current.frame_count >= stream.frame_count => Some(current),
            _ => Some(stream),
        })
}

/// Whether a subtitle stream is the annotation metadata track.
pub fn is_metadata_stream(stream: &StreamInfo) -> bool {
    stream.kind == StreamKind::Subtitle
        && stream.codec == StreamCodec::Text
        && stream.language.as_deref() == Some(METADATA_LANGUAGE)
}

/// Select streams and derive the video information.
pub fn probe_container(container: &ContainerInfo, options: &LoadOptions) -> Result<ProbedVideo, LoadError> {
    if container.streams.is_empty() {
        return Err(LoadError::StreamInfoUnavailable(String::from("container declares no streams")));
    }

    let video = best_stream(&container.streams, StreamKind::Video).ok_or(LoadError::NoVideoStream)?;
    if !video.decoder_available {
        return Err(LoadError::NoDecoder(video.codec.name().to_string()));
    }

    let metadata_stream = best_stream(&container.streams, StreamKind::Subtitle)
        .filter(|stream| is_metadata_stream(stream))
        .map(|stream| stream.index);

    let info = derive_video_info(container, video, options);

    log::debug!(
        "Probed stream {} ({}): {}x{} -> {}x{}, par={:.4}, fps={:.3} ({:?}, reliable={}), tps={}, ticks/frame={}, duration={}, first={}",
        video.index,
        info.codec_name,
        info.width,
        info.height,
        info.decoding_width,
        info.decoding_height,
        info.pixel_aspect_ratio,
        info.fps,
        info.fps_source,
        info.fps_is_reliable,
        info.timestamps_per_second,
        info.average_timestamps_per_frame,
        info.duration_timestamps,
        info.first_timestamp,
    );
    for stream in &container.streams {
        log::debug!(
            "  stream {}: {:?} {} lang={:?} frames={}",
            stream.index,
            stream.kind,
            stream.codec.name(),
            stream.language,
            stream.frame_count,
        );
    }
    if let Some(index) = metadata_stream {
        log::debug!("Metadata stream found at index {index}");
    }

    Ok(ProbedVideo {
        info,
        video_stream: video.index,
        metadata_stream,
    })
}

fn derive_video_info(container: &ContainerInfo, video: &StreamInfo, options: &LoadOptions) -> VideoInfo {
    let estimate = metadata::estimate_fps(
        video.frame_count,
        container.duration_micros,
        video.time_base,
        video.codec_time_base,
    );
    let is_codec_mpeg2 = video.codec == StreamCodec::Mpeg2Video;
    let timestamps_per_second = conversion::timestamps_per_second(video.time_base);

    let duration_timestamps = if container.duration_micros > 0 {
        conversion::micros_to_timestamps(container.duration_micros, timestamps_per_second)
    } else {
        0
    };
    let first_timestamp = if container.start_time_micros > 0 {
        conversion::micros_to_timestamps(container.start_time_micros, timestamps_per_second)
    } else {
        0
    };

    let mut info = VideoInfo {
        width: video.width,
        height: video.height,
        pixel_aspect_ratio: metadata::pixel_aspect_ratio(
            video.sample_aspect_ratio,
            is_codec_mpeg2,
            video.width,
            video.height,
        ),
        sample_aspect_ratio: video.sample_aspect_ratio,
        fps: estimate.fps,
        fps_is_reliable: estimate.reliable,
        fps_source: estimate.source,
        frame_interval_ms: (1000.0 / estimate.fps) as i32,
        timestamps_per_second,
        average_timestamps_per_frame: ((timestamps_per_second / estimate.fps).round() as i64).max(1),
        duration_timestamps,
        first_timestamp,
        deinterlaced: options.deinterlace,
        scaling: options.scaling,
        is_codec_mpeg2,
        codec_name: video.codec.name().to_string(),
        ..VideoInfo::default()
    };
    info.apply_aspect_ratio(options.aspect_ratio_mode);
    info
}

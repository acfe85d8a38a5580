//! Stream selection and load behaviour.

mod common;

use common::{SyntheticBackend, SyntheticVideo, subtitle_stream};
use ffmpeg_next::Rational;
use scrubcache::probe::{best_stream, is_metadata_stream, probe_container};
use scrubcache::{
    AspectRatioMode, ContainerInfo, FpsSource, LoadError, LoadOptions, StreamCodec, StreamKind, VideoFile,
};

fn video_stream(index: usize, frames: i64) -> scrubcache::StreamInfo {
    let mut stream = SyntheticVideo::new(10).container().streams.remove(0);
    stream.index = index;
    stream.frame_count = frames;
    stream
}

// ── Stream selection ───────────────────────────────────────────────

#[test]
fn best_stream_prefers_most_frames() {
    let streams = vec![video_stream(0, 10), video_stream(1, 250), video_stream(2, 250)];
    let best = best_stream(&streams, StreamKind::Video).expect("video stream");
    assert_eq!(best.index, 1, "ties go to the earliest stream");
}

#[test]
fn best_stream_ignores_other_kinds() {
    let streams = vec![subtitle_stream(0, None), video_stream(1, 5)];
    assert_eq!(best_stream(&streams, StreamKind::Video).map(|stream| stream.index), Some(1));
    assert!(best_stream(&streams, StreamKind::Audio).is_none());
}

#[test]
fn metadata_stream_needs_text_codec_and_xml_language() {
    assert!(is_metadata_stream(&subtitle_stream(1, Some("XML"))));
    assert!(!is_metadata_stream(&subtitle_stream(1, Some("eng"))));
    assert!(!is_metadata_stream(&subtitle_stream(1, None)));

    let mut other_codec = subtitle_stream(1, Some("XML"));
    other_codec.codec = StreamCodec::Other(String::from("ass"));
    assert!(!is_metadata_stream(&other_codec));
}

// ── probe_container ────────────────────────────────────────────────

#[test]
fn probe_derives_timing_from_frame_count() {
    let container = SyntheticVideo::new(100).container();
    let probed = probe_container(&container, &LoadOptions::default()).expect("probe");

    let info = probed.info;
    assert_eq!(probed.video_stream, 0);
    assert_eq!(probed.metadata_stream, None);
    assert_eq!(info.fps, 25.0);
    assert_eq!(info.fps_source, FpsSource::FrameCount);
    assert!(info.fps_is_reliable);
    assert_eq!(info.frame_interval_ms, 40);
    assert_eq!(info.timestamps_per_second, 90_000.0);
    assert_eq!(info.average_timestamps_per_frame, 3_600);
    assert_eq!(info.duration_timestamps, 360_000);
    assert_eq!(info.first_timestamp, 0);
    assert_eq!((info.decoding_width, info.decoding_height), (640, 480));
    assert_eq!(info.codec_name, "synthetic");
}

#[test]
fn coarse_time_base_keeps_one_tick_per_frame() {
    let mut video = SyntheticVideo::new(300);
    video.duration_micros = 10_000_000;
    let mut container = video.container();
    container.streams[0].time_base = Rational::new(1, 10);

    let info = probe_container(&container, &LoadOptions::default())
        .expect("probe")
        .info;
    assert_eq!(info.fps, 30.0);
    assert_eq!(info.timestamps_per_second, 10.0);
    assert_eq!(info.average_timestamps_per_frame, 1);
}

#[test]
fn probe_reads_start_time() {
    let mut video = SyntheticVideo::new(50);
    video.first_timestamp = 45_000;
    let probed = probe_container(&video.container(), &LoadOptions::default()).expect("probe");
    assert_eq!(probed.info.first_timestamp, 45_000);
}

#[test]
fn probe_unknown_duration_falls_back() {
    let mut video = SyntheticVideo::new(50);
    video.duration_micros = 0;
    video.declared_frames = 0;
    let info = probe_container(&video.container(), &LoadOptions::default())
        .expect("probe")
        .info;
    assert_eq!(info.duration_timestamps, 0);
    assert_eq!(info.fps_source, FpsSource::Fallback);
    assert!(!info.fps_is_reliable);
}

#[test]
fn probe_finds_metadata_stream() {
    let mut video = SyntheticVideo::new(10);
    video.metadata = Some(String::from("<annotations/>"));
    video.with_audio = true;
    let probed = probe_container(&video.container(), &LoadOptions::default()).expect("probe");
    assert_eq!(probed.metadata_stream, Some(1));
}

#[test]
fn probe_applies_load_options() {
    let mut video = SyntheticVideo::new(10);
    video.sample_aspect_ratio = Rational::new(4, 3);
    let container = video.container();

    let auto = probe_container(&container, &LoadOptions::default()).expect("probe").info;
    assert_eq!(auto.decoding_height, 360);

    let options = LoadOptions::new()
        .with_aspect_ratio(AspectRatioMode::ForceSquare)
        .with_deinterlace(true);
    let square = probe_container(&container, &options).expect("probe").info;
    assert_eq!(square.decoding_height, 480);
    assert!(square.deinterlaced);
}

#[test]
fn mpeg2_flag_follows_codec() {
    let mut video = SyntheticVideo::new(10);
    video.codec = StreamCodec::Mpeg2Video;
    let info = probe_container(&video.container(), &LoadOptions::default()).expect("probe").info;
    assert!(info.is_codec_mpeg2);
    assert_eq!(info.codec_name, "mpeg2video");
}

// ── Probe failures ─────────────────────────────────────────────────

#[test]
fn empty_container_has_no_stream_info() {
    let container = ContainerInfo {
        duration_micros: 0,
        start_time_micros: 0,
        streams: Vec::new(),
    };
    let error = probe_container(&container, &LoadOptions::default()).unwrap_err();
    assert!(matches!(error, LoadError::StreamInfoUnavailable(_)));
}

#[test]
fn audio_only_container_has_no_video() {
    let container = ContainerInfo {
        duration_micros: 1_000_000,
        start_time_micros: 0,
        streams: vec![subtitle_stream(0, Some("XML"))],
    };
    let error = probe_container(&container, &LoadOptions::default()).unwrap_err();
    assert!(matches!(error, LoadError::NoVideoStream));
}

#[test]
fn missing_decoder_is_reported() {
    let mut video = SyntheticVideo::new(10);
    video.decoder_available = false;
    let error = probe_container(&video.container(), &LoadOptions::default()).unwrap_err();
    assert!(matches!(error, LoadError::NoDecoder(ref codec) if codec == "synthetic"));
}

// ── VideoFile::load ────────────────────────────────────────────────

#[test]
fn load_then_unload_resets_state() {
    let mut file = VideoFile::with_backend(SyntheticBackend::new(SyntheticVideo::new(100)));
    assert!(!file.is_loaded());

    let info = file.load("clip.synthetic").expect("load");
    assert_eq!(info.fps, 25.0);
    assert!(file.is_loaded());
    assert_eq!(file.path().map(|path| path.to_string_lossy().into_owned()), Some(String::from("clip.synthetic")));
    assert_eq!(file.info().file_size, 0, "no file on disk");

    file.unload();
    assert!(!file.is_loaded());
    assert_eq!(file.path(), None);
    assert_eq!(file.info().width, 320);
    assert_eq!(file.info().duration_timestamps, 1);
    assert!(!file.selection().analysis_mode);
}

#[test]
fn failed_load_leaves_file_unloaded() {
    let mut file = VideoFile::with_backend(SyntheticBackend::new(SyntheticVideo::new(100)));
    file.load("clip.synthetic").expect("load");

    let error = file.load("missing.synthetic").unwrap_err();
    assert!(matches!(error, LoadError::FileNotOpened { .. }));
    assert!(!file.is_loaded());
    assert_eq!(file.info().width, 320);
}

#[test]
fn default_settings_apply_at_load() {
    let mut video = SyntheticVideo::new(10);
    video.sample_aspect_ratio = Rational::new(4, 3);
    let mut file = VideoFile::with_backend(SyntheticBackend::new(video));
    file.set_default_settings(LoadOptions::new().with_aspect_ratio(AspectRatioMode::Force16x9));

    let info = file.load("clip.synthetic").expect("load");
    assert_eq!(info.aspect_ratio_mode, AspectRatioMode::Force16x9);
    assert_eq!(info.decoding_height, 360);
    assert_eq!(file.default_settings().aspect_ratio_mode, AspectRatioMode::Force16x9);
}

#[test]
fn metadata_text_is_read_from_its_stream() {
    let mut video = SyntheticVideo::new(20);
    video.metadata = Some(String::from("<Annotations/>"));
    let backend = SyntheticBackend::new(video);
    let events = backend.events.clone();
    let mut file = VideoFile::with_backend(backend);
    file.load("clip.synthetic").expect("load");

    assert_eq!(file.metadata_stream(), Some(1));
    assert_eq!(file.read_metadata().as_deref(), Some("<Annotations/>"));
    assert_eq!(events.seeks(), vec![0], "rewinds to the first frame");
}

#[test]
fn no_metadata_without_stream() {
    let mut file = VideoFile::with_backend(SyntheticBackend::new(SyntheticVideo::new(20)));
    file.load("clip.synthetic").expect("load");
    assert_eq!(file.metadata_stream(), None);
    assert_eq!(file.read_metadata(), None);
}

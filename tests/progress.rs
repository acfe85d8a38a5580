//! Progress reporting and cancellation.

mod common;

use std::sync::{Arc, Mutex};
use std::thread;

use common::{RecordingWriter, SyntheticBackend, SyntheticVideo};
use scrubcache::{
    CancellationToken, ExtractOptions, NoOverlay, OperationType, ProgressCallback, ProgressInfo, SaveRequest,
    VideoFile,
};

#[derive(Default)]
struct Collect(Mutex<Vec<ProgressInfo>>);

impl Collect {
    fn reports(&self) -> Vec<ProgressInfo> {
        self.0.lock().unwrap().clone()
    }
}

impl ProgressCallback for Collect {
    fn on_progress(&self, info: &ProgressInfo) {
        self.0.lock().unwrap().push(info.clone());
    }
}

fn loaded(frames: usize) -> VideoFile<SyntheticBackend> {
    let mut file = VideoFile::with_backend(SyntheticBackend::new(SyntheticVideo::new(frames)));
    file.load("clip.synthetic").expect("load");
    file
}

// ── CancellationToken ──────────────────────────────────────────────

#[test]
fn token_starts_clear() {
    assert!(!CancellationToken::new().is_cancelled());
    assert!(!CancellationToken::default().is_cancelled());
}

#[test]
fn token_clones_share_state() {
    let token = CancellationToken::new();
    let clone = token.clone();
    clone.cancel();
    assert!(token.is_cancelled());
}

#[test]
fn token_crosses_threads() {
    let token = CancellationToken::new();
    let worker = token.clone();
    thread::spawn(move || worker.cancel()).join().unwrap();
    assert!(token.is_cancelled());
}

// ── ExtractOptions ─────────────────────────────────────────────────

#[test]
fn batch_size_is_at_least_one() {
    assert_eq!(ExtractOptions::new().batch_size(), 1);
    assert_eq!(ExtractOptions::new().with_batch_size(0).batch_size(), 1);
    assert_eq!(ExtractOptions::new().with_batch_size(8).batch_size(), 8);
}

#[test]
fn options_debug_hides_callback() {
    let text = format!("{:?}", ExtractOptions::new().with_cancellation(CancellationToken::new()));
    assert!(text.contains("has_cancellation: true"));
}

// ── Reports during caching ─────────────────────────────────────────

#[test]
fn caching_reports_every_frame_and_once_at_the_end() {
    let mut file = loaded(100);
    let collect = Arc::new(Collect::default());
    let options = ExtractOptions::new().with_progress(collect.clone());

    file.extract_to_memory(0, 36_000, false, &options).expect("cache");

    let reports = collect.reports();
    assert_eq!(reports.len(), 12);
    assert!(reports.iter().all(|info| info.operation == OperationType::FrameCaching));
    assert!(reports.iter().all(|info| info.total == Some(10)));

    let last = reports.last().unwrap();
    assert_eq!(last.frames, 11);
    assert_eq!(last.current_timestamp, Some(36_000));
    assert_eq!(last.percentage, Some(100.0));

    let frames: Vec<u64> = reports.iter().map(|info| info.frames).collect();
    assert!(frames.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[test]
fn caching_reports_in_batches() {
    let mut file = loaded(100);
    let collect = Arc::new(Collect::default());
    let options = ExtractOptions::new().with_progress(collect.clone()).with_batch_size(5);

    file.extract_to_memory(0, 36_000, false, &options).expect("cache");

    let frames: Vec<u64> = collect.reports().iter().map(|info| info.frames).collect();
    assert_eq!(frames, vec![5, 10, 11]);
}

// ── Reports during export ──────────────────────────────────────────

#[test]
fn cached_export_reports_frame_indices() {
    let mut file = loaded(100);
    file.extract_to_memory(0, 36_000, false, &ExtractOptions::new()).expect("cache");

    let collect = Arc::new(Collect::default());
    let options = ExtractOptions::new().with_progress(collect.clone());
    let mut writer = RecordingWriter::new();
    file.save(&mut writer, &SaveRequest::new("out.mkv", 0, 36_000), &mut NoOverlay, &options)
        .expect("save");

    let reports = collect.reports();
    assert!(reports.iter().all(|info| info.operation == OperationType::Export));
    let last = reports.last().unwrap();
    assert_eq!((last.current, last.total), (11, Some(11)));
    assert_eq!(last.percentage, Some(100.0));
}

#[test]
fn live_export_reports_timestamps_progress() {
    let mut file = loaded(100);
    let collect = Arc::new(Collect::default());
    let options = ExtractOptions::new().with_progress(collect.clone());
    let mut writer = RecordingWriter::new();
    file.save(&mut writer, &SaveRequest::new("out.mkv", 0, 36_000), &mut NoOverlay, &options)
        .expect("save");

    let reports = collect.reports();
    assert_eq!(reports[0].current, 0);
    assert_eq!(reports[0].total, Some(36_000));
    let last = reports.last().unwrap();
    assert_eq!(last.current, 36_000);
    assert_eq!(last.frames, 11);
}

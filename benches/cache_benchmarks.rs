//! Benchmarks for cache lookups, selection planning and decoding.
//!
//! Run with: cargo bench
//!
//! The decoding benchmarks need `tests/fixtures/sample_video.mp4` and are
//! skipped without it.

use std::hint::black_box;
use std::path::Path;

use criterion::Criterion;
use ffmpeg_next::util::log::Level as LogLevel;
use image::RgbImage;
use scrubcache::selection::plan_selection;
use scrubcache::{DecodedFrame, ExportPacing, ExtractOptions, FrameCache, VideoFile};

const SAMPLE_VIDEO: &str = "tests/fixtures/sample_video.mp4";
const TICKS_PER_FRAME: i64 = 3_600;

fn synthetic_cache(frames: i64) -> FrameCache {
    FrameCache::from_frames(
        (0..frames)
            .map(|frame| DecodedFrame {
                timestamp: frame * TICKS_PER_FRAME,
                image: RgbImage::new(1, 1),
            })
            .collect(),
    )
}

fn benchmark_translation(criterion: &mut Criterion) {
    let cache = synthetic_cache(300);
    let end = 300 * TICKS_PER_FRAME;

    criterion.bench_function("frame_number_for (300 frames)", |bencher| {
        bencher.iter(|| {
            let mut timestamp = 0;
            while timestamp < end {
                black_box(cache.frame_number_for(black_box(timestamp)));
                timestamp += 1_000;
            }
        });
    });

    criterion.bench_function("timestamp_at (300 frames)", |bencher| {
        bencher.iter(|| {
            for index in -10..310 {
                black_box(cache.timestamp_at(black_box(index)));
            }
        });
    });
}

fn benchmark_planning(criterion: &mut Criterion) {
    let cache = synthetic_cache(300);
    let start = 100 * TICKS_PER_FRAME;
    let end = 250 * TICKS_PER_FRAME;

    let mut group = criterion.benchmark_group("plan_selection");
    group.bench_function("reduction", |bencher| {
        bencher.iter(|| plan_selection(&cache, true, TICKS_PER_FRAME, black_box(start), black_box(end), false));
    });
    group.bench_function("insertion_after", |bencher| {
        bencher.iter(|| plan_selection(&cache, true, TICKS_PER_FRAME, black_box(start), black_box(2 * end), false));
    });
    group.bench_function("complete", |bencher| {
        bencher.iter(|| plan_selection(&cache, false, TICKS_PER_FRAME, black_box(start), black_box(end), false));
    });
    group.finish();

    criterion.bench_function("export pacing", |bencher| {
        bencher.iter(|| {
            for requested in (0..2_000).step_by(10) {
                black_box(ExportPacing::for_interval(requested, requested % 20 == 0, 40));
            }
        });
    });
}

fn benchmark_live_navigation(criterion: &mut Criterion) {
    ffmpeg_next::util::log::set_level(LogLevel::Error);

    if !Path::new(SAMPLE_VIDEO).exists() {
        eprintln!("Skipping benchmark: fixture not found");
        return;
    }

    let mut video = VideoFile::new();
    let info = video.load(SAMPLE_VIDEO).unwrap().clone();
    let middle = info.first_timestamp + info.duration_timestamps / 2;

    criterion.bench_function("read_frame (seek to middle)", |bencher| {
        bencher.iter(|| video.read_frame(Some(black_box(middle)), 1).unwrap());
    });

    criterion.bench_function("read_frame (next frame)", |bencher| {
        video.read_frame(Some(info.first_timestamp), 1).unwrap();
        bencher.iter(|| {
            if video.read_frame(None, 1).is_err() {
                video.read_frame(Some(info.first_timestamp), 1).unwrap();
            }
        });
    });
}

fn benchmark_caching(criterion: &mut Criterion) {
    if !Path::new(SAMPLE_VIDEO).exists() {
        return;
    }

    let mut group = criterion.benchmark_group("extract_to_memory");
    group.sample_size(10);

    group.bench_function("one second, complete", |bencher| {
        let mut video = VideoFile::new();
        let info = video.load(SAMPLE_VIDEO).unwrap().clone();
        let end = info.first_timestamp + info.one_second();
        bencher.iter(|| {
            video
                .extract_to_memory(info.first_timestamp, end, true, &ExtractOptions::new())
                .unwrap()
        });
    });

    group.bench_function("cached navigation", |bencher| {
        let mut video = VideoFile::new();
        let info = video.load(SAMPLE_VIDEO).unwrap().clone();
        let end = info.first_timestamp + info.one_second();
        video
            .extract_to_memory(info.first_timestamp, end, false, &ExtractOptions::new())
            .unwrap();
        bencher.iter(|| {
            video.read_frame(None, 1).unwrap();
            video.read_frame(None, -1).unwrap();
        });
    });

    group.finish();
}

criterion::criterion_group!(
    benches,
    benchmark_translation,
    benchmark_planning,
    benchmark_live_navigation,
    benchmark_caching,
);
criterion::criterion_main!(benches);

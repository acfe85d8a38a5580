//! Preview thumbnails.

mod common;

use std::path::Path;

use common::{SyntheticBackend, SyntheticVideo, frame_colour};
use scrubcache::LoadError;
use scrubcache::thumbnail::{MAX_THUMBNAILS, thumbnails};

#[test]
fn four_pictures_spread_over_the_file() {
    let backend = SyntheticBackend::new(SyntheticVideo::new(100));
    let set = thumbnails(&backend, Path::new("clip.synthetic"), 160).expect("thumbnails");

    assert_eq!(set.images.len(), MAX_THUMBNAILS);
    assert_eq!(set.timestamps, vec![0, 90_000, 180_000, 270_000]);
    assert_eq!(set.duration_ms, 4_000);
    for (image, frame) in set.images.iter().zip([0, 25, 50, 75]) {
        assert_eq!(image.dimensions(), (160, 120));
        assert_eq!(*image.get_pixel(0, 0), frame_colour(frame));
    }
}

#[test]
fn unknown_duration_gives_one_picture() {
    let mut video = SyntheticVideo::new(100);
    video.duration_micros = 0;
    let set = thumbnails(&SyntheticBackend::new(video), Path::new("clip.synthetic"), 160).expect("thumbnails");

    assert_eq!(set.images.len(), 1);
    assert_eq!(set.timestamps, vec![0]);
    assert_eq!(set.duration_ms, 0);
}

#[test]
fn short_file_skips_missing_pictures() {
    // 2 frames but a container claiming 4 seconds.
    let mut video = SyntheticVideo::new(2);
    video.duration_micros = 4_000_000;
    let set = thumbnails(&SyntheticBackend::new(video), Path::new("clip.synthetic"), 80).expect("thumbnails");

    assert_eq!(set.timestamps, vec![0]);
    assert_eq!(set.images[0].dimensions(), (80, 60));
}

#[test]
fn unopenable_file_is_an_error() {
    let backend = SyntheticBackend::new(SyntheticVideo::new(10));
    let error = thumbnails(&backend, Path::new("missing.synthetic"), 160).unwrap_err();
    assert!(matches!(error, LoadError::FileNotOpened { .. }));
}

#[test]
fn thumbnails_do_not_touch_a_loaded_file() {
    let backend = SyntheticBackend::new(SyntheticVideo::new(100));
    let mut file = scrubcache::VideoFile::with_backend(backend.clone());
    file.load("clip.synthetic").expect("load");
    file.read_frame(Some(7_200), 1).expect("frame");

    thumbnails(&backend, Path::new("clip.synthetic"), 160).expect("thumbnails");

    file.read_frame(None, 1).expect("next frame");
    assert_eq!(file.current_timestamp(), 10_800);
}

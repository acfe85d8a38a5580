//! Preview thumbnails.
//!
//! A handful of evenly spaced pictures for file browsers, decoded through a
//! session of their own so a loaded [`VideoFile`](crate::VideoFile) is not
//! disturbed.
//!
//! # Example
//!
//! ```no_run
//! use scrubcache::{FfmpegBackend, thumbnail};
//!
//! let set = thumbnail::thumbnails(&FfmpegBackend::new(), "input.mkv".as_ref(), 160)?;
//! for (index, image) in set.images.iter().enumerate() {
//!     image.save(format!("thumb_{index}.png"))?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::path::Path;

use image::RgbImage;

use crate::backend::{Demuxer, MediaBackend};
use crate::configuration::LoadOptions;
use crate::decoder::DecodeSession;
use crate::error::LoadError;
use crate::probe::probe_container;

/// Most thumbnails taken from one file.
pub const MAX_THUMBNAILS: usize = 4;

/// Thumbnails of one file.
#[derive(Debug, Clone, Default)]
pub struct ThumbnailSet {
    /// Pictures in file order.
    pub images: Vec<RgbImage>,
    /// Timestamp of each picture.
    pub timestamps: Vec<i64>,
    /// Duration of the file in milliseconds; 0 when unknown.
    pub duration_ms: i64,
}

/// Decode up to [`MAX_THUMBNAILS`] pictures spread over `path`.
///
/// Pictures are scaled to `picture_width` keeping the display aspect ratio.
/// When the duration is unknown only the first picture is taken. Pictures
/// that cannot be decoded are skipped.
pub fn thumbnails<B: MediaBackend>(backend: &B, path: &Path, picture_width: u32) -> Result<ThumbnailSet, LoadError> {
    let mut demuxer = backend.open(path)?;
    let probed = probe_container(demuxer.container(), &LoadOptions::default())?;
    demuxer.open_decoder(probed.video_stream)?;

    let video = demuxer
        .container()
        .streams
        .iter()
        .find(|stream| stream.index == probed.video_stream)
        .ok_or(LoadError::NoVideoStream)?;
    let converter = backend.converter(video);

    let mut info = probed.info;
    let width = picture_width.max(1);
    let height = (f64::from(width) * f64::from(info.decoding_height) / f64::from(info.decoding_width.max(1)))
        .round()
        .max(1.0) as u32;
    info.decoding_width = width;
    info.decoding_height = height;

    let known_duration = info.duration_timestamps > 1;
    let count = if known_duration { MAX_THUMBNAILS } else { 1 };
    let step = info.duration_timestamps / MAX_THUMBNAILS as i64;
    log::debug!("Taking {count} thumbnails of {} at {width}x{height}", path.display());

    let mut session = DecodeSession::new(demuxer, converter, probed.video_stream, None);
    let mut set = ThumbnailSet {
        duration_ms: if known_duration { info.duration_ms() } else { 0 },
        ..ThumbnailSet::default()
    };

    for index in 0..count {
        let target = info.first_timestamp + index as i64 * step;
        match session.read_frame(&mut info, Some(target), 1, target) {
            Ok(timestamp) => {
                if let Some(image) = session.current_image() {
                    set.images.push(image.clone());
                    set.timestamps.push(timestamp);
                }
            }
            Err(error) => log::warn!("No thumbnail at {target}: {error}"),
        }
    }

    Ok(set)
}

//! Internal conversion helpers.
//!
//! Timestamp arithmetic between microseconds, milliseconds and stream ticks,
//! the stride-stripping copy used by the FFmpeg converter, and the
//! deinterlace-then-scale sequence shared by every decode path.

use std::time::Duration;

use ffmpeg_next::{Rational, frame::Video as VideoFrame};
use image::RgbImage;

use crate::backend::PictureConverter;
use crate::error::ConvertError;
use crate::metadata::VideoInfo;

/// Timestamp ticks per second for a stream time base.
pub fn timestamps_per_second(time_base: Rational) -> f64 {
    if time_base.numerator() == 0 {
        return 1.0;
    }
    f64::from(time_base.denominator()) / f64::from(time_base.numerator())
}

/// Convert a microsecond count into stream ticks.
pub fn micros_to_timestamps(micros: i64, timestamps_per_second: f64) -> i64 {
    (micros as f64 / 1_000_000.0 * timestamps_per_second) as i64
}

/// Convert seconds into stream ticks.
pub fn seconds_to_timestamps(seconds: f64, timestamps_per_second: f64) -> i64 {
    (seconds * timestamps_per_second) as i64
}

/// Convert stream ticks into milliseconds.
pub fn timestamps_to_millis(timestamps: i64, timestamps_per_second: f64) -> i64 {
    if timestamps_per_second <= 0.0 {
        return 0;
    }
    (timestamps as f64 * 1000.0 / timestamps_per_second) as i64
}

/// Stream ticks as a [`Duration`], clamped at zero.
pub fn timestamp_to_duration(timestamps: i64, timestamps_per_second: f64) -> Duration {
    if timestamps <= 0 || timestamps_per_second <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(timestamps as f64 / timestamps_per_second)
}

/// Copy the first plane of a packed frame into a tightly packed buffer.
pub(crate) fn frame_to_buffer(video_frame: &VideoFrame, width: u32, height: u32, bytes_per_pixel: usize) -> Vec<u8> {
    let row_length = width as usize * bytes_per_pixel;
    let rows = height as usize;
    let stride = video_frame.stride(0);
    let data = video_frame.data(0);

    if stride == row_length {
        return data[..row_length * rows].to_vec();
    }

    data.chunks(stride)
        .take(rows)
        .flat_map(|row| &row[..row_length])
        .copied()
        .collect()
}

/// Deinterlace when enabled, then scale to the decoding geometry.
///
/// A deinterlace failure is logged and the interlaced picture is used.
pub(crate) fn convert_picture<P, C>(converter: &mut C, picture: &P, info: &VideoInfo, timestamp: i64) -> Result<RgbImage, ConvertError>
where
    C: PictureConverter<P>,
{
    if info.deinterlaced {
        match converter.deinterlace(picture) {
            Ok(progressive) => {
                return converter.scale_convert(&progressive, info.decoding_width, info.decoding_height, info.scaling);
            }
            Err(error) => {
                log::warn!("Deinterlace failed at timestamp {timestamp}, using interlaced picture: {error}");
            }
        }
    }
    converter.scale_convert(picture, info.decoding_width, info.decoding_height, info.scaling)
}

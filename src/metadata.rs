//! Derived video information.
//!
//! [`VideoInfo`] is computed once at load time from whatever the container
//! reports, which is often incomplete or inconsistent. The free functions in
//! this module hold the derivation rules so they can be checked in isolation:
//! the frame-rate ladder, the pixel aspect ratio and the decoding geometry.

use ffmpeg_next::Rational;

/// How the decoding height is derived from the source size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatioMode {
    /// Use the pixel aspect ratio reported by the codec.
    #[default]
    AutoDetect,
    /// Force a 4:3 display.
    Force4x3,
    /// Force a 16:9 display.
    Force16x9,
    /// Ignore any reported ratio and keep the stored height.
    ForceSquare,
}

/// Resampling filter used when converting decoded pictures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalingQuality {
    /// Fast bilinear, the cheapest usable filter.
    #[default]
    FastBilinear,
    /// Bilinear.
    Bilinear,
    /// Bicubic.
    Bicubic,
    /// Nearest neighbour.
    Point,
    /// Area averaging.
    Area,
    /// Lanczos.
    Lanczos,
}

/// Which rung of the frame-rate ladder produced [`VideoInfo::fps`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FpsSource {
    /// Frame count divided by duration.
    FrameCount,
    /// Inverse of the stream time base.
    StreamTimeBase,
    /// Inverse of the codec time base.
    CodecTimeBase,
    /// Nothing usable was reported; a constant was assumed.
    Fallback,
}

/// Result of [`estimate_fps`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FpsEstimate {
    /// Frames per second.
    pub fps: f64,
    /// `false` when the value is the fallback constant.
    pub reliable: bool,
    /// Rung that produced the value.
    pub source: FpsSource,
}

/// Frame rate assumed when the container reports nothing usable.
pub const FALLBACK_FPS: f64 = 25.0;

/// Time-base derived rates at or above this are treated as bogus.
const MAX_PLAUSIBLE_FPS: f64 = 1000.0;

const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Everything the rest of the crate needs to know about the loaded video.
///
/// Timestamps are expressed in the video stream's time base.
#[derive(Debug, Clone)]
#[must_use]
pub struct VideoInfo {
    /// Stored picture width.
    pub width: u32,
    /// Stored picture height.
    pub height: u32,
    /// Width of converted pictures, always a multiple of 4.
    pub decoding_width: u32,
    /// Height of converted pictures after aspect correction.
    pub decoding_height: u32,
    /// Width of one pixel relative to its height.
    pub pixel_aspect_ratio: f64,
    /// Raw sample aspect ratio reported by the codec.
    pub sample_aspect_ratio: Rational,
    /// Current aspect-ratio mode.
    pub aspect_ratio_mode: AspectRatioMode,
    /// Frames per second.
    pub fps: f64,
    /// `false` when the frame rate had to be guessed.
    pub fps_is_reliable: bool,
    /// Rung of the frame-rate ladder that produced [`fps`](Self::fps).
    pub fps_source: FpsSource,
    /// Milliseconds between two frames, truncated.
    pub frame_interval_ms: i32,
    /// Timestamp ticks per second.
    pub timestamps_per_second: f64,
    /// Timestamp ticks per frame, rounded.
    pub average_timestamps_per_frame: i64,
    /// Duration in timestamp ticks, 0 when unknown.
    pub duration_timestamps: i64,
    /// Timestamp of the first frame.
    pub first_timestamp: i64,
    /// Whether pictures are deinterlaced before scaling.
    pub deinterlaced: bool,
    /// Filter used for scaling.
    pub scaling: ScalingQuality,
    /// Whether the codec is MPEG-2 video.
    pub is_codec_mpeg2: bool,
    /// Codec short name.
    pub codec_name: String,
    /// File size in bytes, 0 when unknown.
    pub file_size: u64,
}

impl Default for VideoInfo {
    /// The values reported while no file is loaded.
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            decoding_width: 320,
            decoding_height: 240,
            pixel_aspect_ratio: 1.0,
            sample_aspect_ratio: Rational::new(0, 1),
            aspect_ratio_mode: AspectRatioMode::AutoDetect,
            fps: 1.0,
            fps_is_reliable: false,
            fps_source: FpsSource::Fallback,
            frame_interval_ms: 40,
            timestamps_per_second: 1.0,
            average_timestamps_per_frame: 1,
            duration_timestamps: 1,
            first_timestamp: 0,
            deinterlaced: false,
            scaling: ScalingQuality::FastBilinear,
            is_codec_mpeg2: false,
            codec_name: String::new(),
            file_size: 0,
        }
    }
}

impl VideoInfo {
    /// Recompute the decoding geometry for `mode`.
    pub fn apply_aspect_ratio(&mut self, mode: AspectRatioMode) {
        self.aspect_ratio_mode = mode;
        let (width, height) =
            decoding_geometry(self.width, self.height, self.pixel_aspect_ratio, mode);
        self.decoding_width = width;
        self.decoding_height = height;
    }

    /// Whether converted pictures are stretched relative to the stored size.
    pub fn has_square_pixels(&self) -> bool {
        self.decoding_height == self.height
    }

    /// Number of ticks in one second, at least 1.
    pub fn one_second(&self) -> i64 {
        (self.timestamps_per_second as i64).max(1)
    }

    /// Size in bytes of one converted RGB24 picture.
    pub fn frame_bytes(&self) -> u64 {
        u64::from(self.decoding_width) * u64::from(self.decoding_height) * 3
    }

    /// Duration in milliseconds, 0 when unknown.
    pub fn duration_ms(&self) -> i64 {
        crate::conversion::timestamps_to_millis(self.duration_timestamps, self.timestamps_per_second)
    }
}

/// Walk the frame-rate ladder; the first applicable rung wins.
///
/// 1. `frame_count * 1e6 / duration_micros` when both are positive.
/// 2. The inverse of the stream time base, when below 1000.
/// 3. The inverse of the codec time base, when below 1000.
/// 4. [`FALLBACK_FPS`], marked unreliable.
pub fn estimate_fps(
    frame_count: i64,
    duration_micros: i64,
    stream_time_base: Rational,
    codec_time_base: Rational,
) -> FpsEstimate {
    if frame_count > 0 && duration_micros > 0 {
        return FpsEstimate {
            fps: frame_count as f64 * MICROS_PER_SECOND / duration_micros as f64,
            reliable: true,
            source: FpsSource::FrameCount,
        };
    }

    let candidates = [
        (stream_time_base, FpsSource::StreamTimeBase),
        (codec_time_base, FpsSource::CodecTimeBase),
    ];
    for (time_base, source) in candidates {
        if let Some(rate) = inverse_ratio(time_base)
            && rate > 0.0
            && rate < MAX_PLAUSIBLE_FPS
        {
            return FpsEstimate {
                fps: rate,
                reliable: true,
                source,
            };
        }
    }

    FpsEstimate {
        fps: FALLBACK_FPS,
        reliable: false,
        source: FpsSource::Fallback,
    }
}

/// Pixel aspect ratio from the codec's sample aspect ratio.
///
/// MPEG-2 streams report a display aspect ratio in that field. It is turned
/// into a pixel ratio through the stored size, unless the result drops below
/// 1.0, in which case the raw value is taken as a pixel ratio after all.
pub fn pixel_aspect_ratio(sample_aspect_ratio: Rational, is_mpeg2: bool, width: u32, height: u32) -> f64 {
    let numerator = sample_aspect_ratio.numerator();
    let denominator = sample_aspect_ratio.denominator();
    if numerator == 0 || denominator == 0 || numerator == denominator {
        return 1.0;
    }

    let ratio = f64::from(numerator) / f64::from(denominator);
    if !is_mpeg2 || width == 0 {
        return ratio;
    }

    let corrected = f64::from(height) * ratio / f64::from(width);
    if corrected < 1.0 { ratio } else { corrected }
}

/// Decoding `(width, height)` for a stored size, pixel ratio and mode.
///
/// The width is rounded up to the next multiple of 4; the height follows the
/// mode and is truncated.
pub fn decoding_geometry(width: u32, height: u32, pixel_aspect_ratio: f64, mode: AspectRatioMode) -> (u32, u32) {
    let decoding_height = match mode {
        AspectRatioMode::Force4x3 => (f64::from(width) * 3.0 / 4.0) as u32,
        AspectRatioMode::Force16x9 => (f64::from(width) * 9.0 / 16.0) as u32,
        AspectRatioMode::ForceSquare => height,
        AspectRatioMode::AutoDetect if pixel_aspect_ratio > 0.0 => {
            (f64::from(height) / pixel_aspect_ratio) as u32
        }
        AspectRatioMode::AutoDetect => height,
    };

    let decoding_width = if width % 4 != 0 { 4 * (width / 4 + 1) } else { width };

    (decoding_width, decoding_height)
}

fn inverse_ratio(time_base: Rational) -> Option<f64> {
    if time_base.numerator() == 0 || time_base.denominator() == 0 {
        return None;
    }
    Some(f64::from(time_base.denominator()) / f64::from(time_base.numerator()))
}

//! FFmpeg picture conversion: `yadif` deinterlacing and swscale to RGB24.

use ffmpeg_next::filter::Graph as FilterGraph;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::Rational;
use ffmpeg_sys_next::AVPixelFormat;
use image::RgbImage;

use crate::backend::PictureConverter;
use crate::conversion::frame_to_buffer;
use crate::error::ConvertError;
use crate::metadata::ScalingQuality;

const DEINTERLACE_FILTER: &str = "yadif=mode=send_frame:parity=auto:deint=all";

impl ScalingQuality {
    fn scaling_flags(self) -> ScalingFlags {
        match self {
            ScalingQuality::FastBilinear => ScalingFlags::FAST_BILINEAR,
            ScalingQuality::Bilinear => ScalingFlags::BILINEAR,
            ScalingQuality::Bicubic => ScalingFlags::BICUBIC,
            ScalingQuality::Point => ScalingFlags::POINT,
            ScalingQuality::Area => ScalingFlags::AREA,
            ScalingQuality::Lanczos => ScalingFlags::LANCZOS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ScalerKey {
    format: Pixel,
    source_width: u32,
    source_height: u32,
    width: u32,
    height: u32,
    quality: ScalingQuality,
}

/// Converts decoded FFmpeg frames for one video stream.
///
/// The scaler is reused while the source format, geometry and quality stay
/// the same.
pub struct FfmpegConverter {
    time_base: Rational,
    scaler: Option<(ScalerKey, ScalingContext)>,
}

impl FfmpegConverter {
    /// Converter for a stream with the given time base.
    pub fn new(time_base: Rational) -> Self {
        Self { time_base, scaler: None }
    }

    fn scaler_for(&mut self, key: ScalerKey) -> Result<&mut ScalingContext, ConvertError> {
        let stale = self.scaler.as_ref().is_none_or(|(cached, _)| *cached != key);
        if stale {
            log::debug!(
                "Creating scaler {:?} {}x{} -> {}x{} ({:?})",
                key.format,
                key.source_width,
                key.source_height,
                key.width,
                key.height,
                key.quality,
            );
            let context = ScalingContext::get(
                key.format,
                key.source_width,
                key.source_height,
                Pixel::RGB24,
                key.width,
                key.height,
                key.quality.scaling_flags(),
            )
            .map_err(|error| ConvertError::Scale(format!("cannot create scaler: {error}")))?;
            self.scaler = Some((key, context));
        }

        self.scaler
            .as_mut()
            .map(|(_, context)| context)
            .ok_or_else(|| ConvertError::Scale(String::from("scaler unavailable")))
    }

    /// One-shot `buffer -> yadif -> buffersink` graph sized for `picture`.
    ///
    /// The graph is flushed after a single picture so `yadif` emits it without
    /// waiting for the next one.
    fn deinterlace_graph(&self, picture: &VideoFrame) -> Result<FilterGraph, ConvertError> {
        let mut graph = FilterGraph::new();
        let buffer_args = format!(
            "video_size={}x{}:pix_fmt={}:time_base={}/{}:pixel_aspect=1/1",
            picture.width(),
            picture.height(),
            AVPixelFormat::from(picture.format()) as i32,
            self.time_base.numerator(),
            self.time_base.denominator().max(1),
        );

        let buffer = ffmpeg_next::filter::find("buffer")
            .ok_or_else(|| ConvertError::Deinterlace(String::from("FFmpeg 'buffer' filter not found")))?;
        let buffersink = ffmpeg_next::filter::find("buffersink")
            .ok_or_else(|| ConvertError::Deinterlace(String::from("FFmpeg 'buffersink' filter not found")))?;

        graph
            .add(&buffer, "in", &buffer_args)
            .map_err(|error| ConvertError::Deinterlace(format!("cannot add buffer filter: {error}")))?;
        graph
            .add(&buffersink, "out", "")
            .map_err(|error| ConvertError::Deinterlace(format!("cannot add buffersink filter: {error}")))?;
        graph
            .output("in", 0)
            .and_then(|parser| parser.input("out", 0))
            .and_then(|parser| parser.parse(DEINTERLACE_FILTER))
            .map_err(|error| ConvertError::Deinterlace(format!("cannot link filter graph: {error}")))?;
        graph
            .validate()
            .map_err(|error| ConvertError::Deinterlace(format!("invalid filter graph: {error}")))?;
        Ok(graph)
    }
}

impl PictureConverter<VideoFrame> for FfmpegConverter {
    fn deinterlace(&mut self, picture: &VideoFrame) -> Result<VideoFrame, ConvertError> {
        let mut graph = self.deinterlace_graph(picture)?;

        let mut source = graph
            .get("in")
            .ok_or_else(|| ConvertError::Deinterlace(String::from("buffer filter missing")))?;
        source
            .source()
            .add(picture)
            .map_err(|error| ConvertError::Deinterlace(format!("cannot feed filter: {error}")))?;
        source
            .source()
            .flush()
            .map_err(|error| ConvertError::Deinterlace(format!("cannot flush filter: {error}")))?;

        let mut progressive = VideoFrame::empty();
        graph
            .get("out")
            .ok_or_else(|| ConvertError::Deinterlace(String::from("buffersink filter missing")))?
            .sink()
            .frame(&mut progressive)
            .map_err(|error| ConvertError::Deinterlace(format!("no deinterlaced picture: {error}")))?;
        Ok(progressive)
    }

    fn scale_convert(
        &mut self,
        picture: &VideoFrame,
        width: u32,
        height: u32,
        quality: ScalingQuality,
    ) -> Result<RgbImage, ConvertError> {
        let key = ScalerKey {
            format: picture.format(),
            source_width: picture.width(),
            source_height: picture.height(),
            width,
            height,
            quality,
        };
        let scaler = self.scaler_for(key)?;

        let mut rgb = VideoFrame::empty();
        scaler
            .run(picture, &mut rgb)
            .map_err(|error| ConvertError::Scale(format!("scaling failed: {error}")))?;

        let buffer = frame_to_buffer(&rgb, width, height, 3);
        RgbImage::from_raw(width, height, buffer)
            .ok_or_else(|| ConvertError::Scale(format!("RGB buffer does not fit {width}x{height}")))
    }
}

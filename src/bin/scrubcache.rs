use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use colored::Colorize;
use image::{Rgb, RgbImage};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use scrubcache::{
    AspectRatioMode, CacheBudget, ExtractOptions, FfmpegBackend, FfmpegLogLevel, FfmpegVideoWriter, LoadOptions,
    ProgressCallback, ProgressInfo, SaveRequest, VideoCodec, VideoEncoderOptions, VideoFile, VideoInfo,
    conversion, thumbnail,
};

const CLI_AFTER_HELP: &str = "Examples:\n  scrubcache info input.mkv --json\n  scrubcache export input.mkv --out clip.mkv --start 0:10 --end 0:14 --cache --progress\n  scrubcache export input.mkv --out slow.mkv --start 5 --end 8 --interval-ms 400\n  scrubcache thumbnails input.mkv --out-dir thumbs --width 160\n  scrubcache completions zsh > _scrubcache";

#[derive(Debug, Parser)]
#[command(
    name = "scrubcache",
    version,
    about = "Inspect videos, cache selections and export them frame by frame",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show additional output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar for long operations.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long, global = true)]
    log_level: Option<FfmpegLogLevel>,

    /// Display aspect ratio (auto, 4:3, 16:9, square).
    #[arg(long, global = true, default_value = "auto")]
    aspect: Aspect,

    /// Deinterlace decoded pictures.
    #[arg(long, global = true)]
    deinterlace: bool,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum Aspect {
    #[default]
    Auto,
    #[value(name = "4:3")]
    Standard,
    #[value(name = "16:9")]
    Wide,
    Square,
}

impl From<Aspect> for AspectRatioMode {
    fn from(aspect: Aspect) -> Self {
        match aspect {
            Aspect::Auto => AspectRatioMode::AutoDetect,
            Aspect::Standard => AspectRatioMode::Force4x3,
            Aspect::Wide => AspectRatioMode::Force16x9,
            Aspect::Square => AspectRatioMode::ForceSquare,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Codec {
    Mpeg4,
    H264,
    H265,
}

impl From<Codec> for VideoCodec {
    fn from(codec: Codec) -> Self {
        match codec {
            Codec::Mpeg4 => VideoCodec::Mpeg4,
            Codec::H264 => VideoCodec::H264,
            Codec::H265 => VideoCodec::H265,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print what the prober found.
    #[command(
        about = "Print video information",
        visible_alias = "probe",
        after_help = "Examples:\n  scrubcache info input.mkv\n  scrubcache info input.mkv --json"
    )]
    Info {
        /// Input video path.
        input: PathBuf,

        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Export a selection to a new video file.
    #[command(
        about = "Export a selection",
        after_help = "Times accept seconds (12.5), mm:ss or hh:mm:ss.\n\nExamples:\n  scrubcache export input.mkv --out clip.mkv --start 10 --end 14 --cache\n  scrubcache export input.mkv --out held.mkv --start 10 --end 14 --paused --hold-every 25 --interval-ms 2000"
    )]
    Export {
        /// Input video path.
        input: PathBuf,
        /// Output video path; the container follows the extension.
        #[arg(long)]
        out: PathBuf,
        /// Selection start.
        #[arg(long)]
        start: Option<String>,
        /// Selection end; defaults to the end of the file.
        #[arg(long)]
        end: Option<String>,
        /// Interval between source frames in the output, in milliseconds.
        #[arg(long, default_value_t = 40)]
        interval_ms: i32,
        /// Decode the selection into memory first when it fits the budget.
        #[arg(long)]
        cache: bool,
        /// Longest selection to cache, in seconds.
        #[arg(long, default_value_t = 12.0)]
        max_seconds: f64,
        /// Largest selection to cache, in MiB.
        #[arg(long, default_value_t = 512.0)]
        max_memory: f64,
        /// Hold key frames for the interval while other frames play at normal speed.
        #[arg(long)]
        paused: bool,
        /// Write only key frames.
        #[arg(long)]
        keyframes_only: bool,
        /// Treat every Nth frame of the selection as a key frame and mark it.
        #[arg(long)]
        hold_every: Option<u32>,
        /// Metadata text stored alongside the video.
        #[arg(long)]
        metadata: Option<String>,
        /// Output codec.
        #[arg(long, value_enum, default_value = "mpeg4")]
        codec: Codec,
    },

    /// Write evenly spaced thumbnails as PNG files.
    #[command(
        about = "Generate thumbnails",
        after_help = "Examples:\n  scrubcache thumbnails input.mkv --out-dir thumbs\n  scrubcache thumbnails input.mkv --out-dir thumbs --width 320"
    )]
    Thumbnails {
        /// Input video path.
        input: PathBuf,
        /// Directory receiving thumb_<n>.png files.
        #[arg(long)]
        out_dir: PathBuf,
        /// Thumbnail width in pixels.
        #[arg(long, default_value_t = 160)]
        width: u32,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

fn parse_seconds(value: &str) -> Result<f64, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Ok(seconds.max(0.0));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [minutes, seconds] => (0_u64, minutes.parse::<u64>()?, seconds),
        [hours, minutes, seconds] => (hours.parse::<u64>()?, minutes.parse::<u64>()?, seconds),
        _ => return Err(format!("invalid time format: {trimmed}").into()),
    };

    let seconds = seconds.parse::<f64>()?;
    Ok((hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds).max(0.0))
}

fn to_timestamp(value: &str, info: &VideoInfo) -> Result<i64, Box<dyn std::error::Error>> {
    let seconds = parse_seconds(value)?;
    Ok(info.first_timestamp + conversion::seconds_to_timestamps(seconds, info.timestamps_per_second))
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!("output already exists: {} (use --overwrite to replace)", path.display()).into());
        }
    }
    Ok(())
}

fn open_video(input: &Path, global: &GlobalOptions) -> Result<VideoFile, Box<dyn std::error::Error>> {
    let mut video = VideoFile::new();
    video.set_default_settings(
        LoadOptions::new()
            .with_aspect_ratio(global.aspect.into())
            .with_deinterlace(global.deinterlace),
    );
    video.load(input)?;
    Ok(video)
}

/// Drives an indicatif bar from library progress reports.
struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    fn new(label: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template("{spinner:.green} {msg:12} {bar:40.cyan/blue} {pos}/{len} ({eta})")?;
        bar.set_style(style.progress_chars("##-"));
        bar.set_message(label.to_string());
        Ok(Self { bar })
    }
}

impl ProgressCallback for BarProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        if let Some(total) = info.total {
            self.bar.set_length(total);
        }
        self.bar.set_position(info.current);
    }
}

impl Drop for BarProgress {
    fn drop(&mut self) {
        self.bar.finish_and_clear();
    }
}

fn extract_options(global: &GlobalOptions, label: &str) -> Result<ExtractOptions, Box<dyn std::error::Error>> {
    let options = ExtractOptions::new();
    if global.progress {
        return Ok(options.with_progress(Arc::new(BarProgress::new(label)?)));
    }
    Ok(options)
}

/// Key frame marker for `--hold-every`: a small square in the top-left corner.
fn mark_every(period: u32) -> impl FnMut(&mut RgbImage, i64, bool, bool) -> bool {
    let mut seen = 0u32;
    move |surface, _timestamp, _flush, _keyframes_only| {
        let is_key = seen % period.max(1) == 0;
        seen += 1;
        if is_key {
            let side = surface.width().min(surface.height()).min(12);
            for y in 0..side {
                for x in 0..side {
                    surface.put_pixel(x, y, Rgb([255, 0, 0]));
                }
            }
        }
        is_key
    }
}

fn print_info(video: &VideoFile, input: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let info = video.info();
    if json {
        let payload = json!({
            "path": input.display().to_string(),
            "codec": info.codec_name,
            "width": info.width,
            "height": info.height,
            "decoding_width": info.decoding_width,
            "decoding_height": info.decoding_height,
            "pixel_aspect_ratio": info.pixel_aspect_ratio,
            "fps": info.fps,
            "fps_reliable": info.fps_is_reliable,
            "fps_source": format!("{:?}", info.fps_source),
            "frame_interval_ms": info.frame_interval_ms,
            "timestamps_per_second": info.timestamps_per_second,
            "average_timestamps_per_frame": info.average_timestamps_per_frame,
            "duration_timestamps": info.duration_timestamps,
            "duration_ms": info.duration_ms(),
            "first_timestamp": info.first_timestamp,
            "file_size": info.file_size,
            "metadata_stream": video.metadata_stream(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("File: {} ({} bytes)", input.display(), info.file_size);
    println!(
        "Video: {}x{} [{}], displayed as {}x{}",
        info.width, info.height, info.codec_name, info.decoding_width, info.decoding_height
    );
    let reliability = if info.fps_is_reliable { "" } else { " (estimated)" };
    println!("Frame rate: {:.3} fps{reliability}, {} ms per frame", info.fps, info.frame_interval_ms);
    println!(
        "Duration: {:.3} s ({} ticks from {})",
        info.duration_ms() as f64 / 1000.0,
        info.duration_timestamps,
        info.first_timestamp
    );
    if let Some(stream) = video.metadata_stream() {
        println!("Metadata stream: #{stream}");
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    if let Some(level) = cli.global.log_level {
        scrubcache::set_ffmpeg_log_level(level);
    }

    match cli.command {
        Commands::Info { input, json } => {
            let mut video = open_video(&input, &cli.global)?;
            print_info(&video, &input, json)?;
            if cli.global.verbose
                && let Some(text) = video.read_metadata()
            {
                println!("Metadata:\n{text}");
            }
        }
        Commands::Export {
            input,
            out,
            start,
            end,
            interval_ms,
            cache,
            max_seconds,
            max_memory,
            paused,
            keyframes_only,
            hold_every,
            metadata,
            codec,
        } => {
            if (paused || keyframes_only) && hold_every.is_none() {
                return Err("--paused and --keyframes-only need --hold-every to mark key frames".into());
            }
            ensure_writable_path(&out, cli.global.overwrite)?;

            let mut video = open_video(&input, &cli.global)?;
            let info = video.info().clone();
            let start = match start {
                Some(value) => to_timestamp(&value, &info)?,
                None => info.first_timestamp,
            };
            let end = match end {
                Some(value) => to_timestamp(&value, &info)?,
                None => 0,
            };

            if cache {
                let budget = CacheBudget::new()
                    .with_max_seconds(max_seconds)
                    .with_max_memory_mib(max_memory);
                let cache_end = if end > 0 { end } else { info.first_timestamp + info.duration_timestamps };
                if budget.allows(&info, start, cache_end) {
                    let options = extract_options(&cli.global, "caching")?;
                    let outcome = video.extract_to_memory(start, cache_end, false, &options)?;
                    if cli.global.verbose {
                        eprintln!("cached {} frame(s) ({:?})", outcome.cached_frames, outcome.strategy);
                    }
                } else {
                    eprintln!(
                        "{} {}",
                        "warning:".yellow().bold(),
                        "selection exceeds the cache budget, decoding while exporting".yellow()
                    );
                }
            }

            let request = SaveRequest::new(&out, start, end)
                .with_frame_interval(interval_ms)
                .with_paused_video(paused)
                .with_keyframes_only(keyframes_only)
                .with_metadata(metadata.unwrap_or_default());
            let mut writer = FfmpegVideoWriter::new(VideoEncoderOptions::default().codec(codec.into()));
            let options = extract_options(&cli.global, "exporting")?;

            let report = match hold_every {
                Some(period) => video.save(&mut writer, &request, &mut mark_every(period), &options)?,
                None => video.save(&mut writer, &request, &mut scrubcache::NoOverlay, &options)?,
            };

            if report.write_failures > 0 {
                eprintln!(
                    "{} {}",
                    "warning:".yellow().bold(),
                    format!("{} write(s) failed", report.write_failures).yellow()
                );
            }
            println!(
                "{} {}",
                "success:".green().bold(),
                format!(
                    "Wrote {} frame(s) from {} source frame(s) to {} ({} ms, x{})",
                    report.frames_written,
                    report.frames_read,
                    out.display(),
                    report.written_interval_ms,
                    report.duplicate_factor
                )
                .green()
            );
        }
        Commands::Thumbnails { input, out_dir, width } => {
            if width == 0 {
                return Err("--width must be greater than 0".into());
            }
            fs::create_dir_all(&out_dir)?;

            let set = thumbnail::thumbnails(&FfmpegBackend::new(), &input, width)?;
            for (index, image) in set.images.iter().enumerate() {
                let path = out_dir.join(format!("thumb_{index}.png"));
                ensure_writable_path(&path, cli.global.overwrite)?;
                image.save(&path)?;
                if cli.global.verbose {
                    eprintln!("saved thumbnail at {} -> {}", set.timestamps[index], path.display());
                }
            }
            println!(
                "{} {}",
                "success:".green().bold(),
                format!("Wrote {} thumbnail(s) to {}", set.images.len(), out_dir.display()).green()
            );
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "scrubcache", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

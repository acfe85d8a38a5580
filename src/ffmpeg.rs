//! Verbosity of FFmpeg's own console output.
//!
//! FFmpeg writes to stderr on its own, separately from the `log` facade used
//! by this crate. [`set_ffmpeg_log_level`] tunes or silences it.

use std::fmt;
use std::str::FromStr;

use ffmpeg_next::util::log::Level;

/// FFmpeg log threshold, from silent to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FfmpegLogLevel {
    /// No output.
    Quiet,
    /// Unrecoverable errors only.
    Fatal,
    /// Recoverable errors.
    #[default]
    Error,
    /// Warnings, FFmpeg's own default.
    Warning,
    /// Informational messages.
    Info,
    /// Debugging output.
    Debug,
}

impl FfmpegLogLevel {
    const NAMES: [(&'static str, FfmpegLogLevel); 6] = [
        ("quiet", FfmpegLogLevel::Quiet),
        ("fatal", FfmpegLogLevel::Fatal),
        ("error", FfmpegLogLevel::Error),
        ("warning", FfmpegLogLevel::Warning),
        ("info", FfmpegLogLevel::Info),
        ("debug", FfmpegLogLevel::Debug),
    ];

    fn level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Debug => Level::Debug,
        }
    }

    fn name(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(_, level)| *level == self)
            .map_or("error", |(name, _)| name)
    }
}

impl fmt::Display for FfmpegLogLevel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = String;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let wanted = text.trim().to_ascii_lowercase();
        let wanted = if wanted == "warn" { String::from("warning") } else { wanted };
        Self::NAMES
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, level)| *level)
            .ok_or_else(|| format!("unknown FFmpeg log level '{text}'"))
    }
}

/// Set FFmpeg's console log threshold for the whole process.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    log::debug!("FFmpeg log level set to {level}");
    ffmpeg_next::util::log::set_level(level.level());
}

use crate::core::metadata::MediaSection;
use crate::core::progress::FfmpegProgress;
use crate::core::summary::EncodeSummary;

#[derive(Debug, Clone, PartialEq)]
pub enum LogLevel {
    Progress,
    Input,
    Output,
    Summary,
    Warning,
    Error,
    Prompt,
    Noise,
}

/// Structured events produced while a process runs, in stream order.
#[derive(Debug, Clone, PartialEq)]
pub enum FfmpegEvent {
    Progress(FfmpegProgress),
    Section(MediaSection),
    Summary(EncodeSummary),
    Warning(String),
    Error(String),
    Prompt(String),
}

impl FfmpegEvent {
    pub fn as_progress(&self) -> Option<&FfmpegProgress> {
        match self {
            FfmpegEvent::Progress(progress) => Some(progress),
            _ => None,
        }
    }
}

/// Banner and library version lines printed before any real work.
const BANNER_PREFIXES: &[&str] = &[
    "ffmpeg version",
    "ffprobe version",
    "built with",
    "configuration:",
    "libavutil",
    "libavcodec",
    "libavformat",
    "libavdevice",
    "libavfilter",
    "libswscale",
    "libswresample",
    "libpostproc",
    "cpu capabilities",
    "using cpu capabilities",
];

/// Line prefixes of the x264/x265 encoders' own log output.
const ENCODER_PREFIXES: &[&str] = &["[libx264 @", "[libx265 @", "x264 [info]:", "x265 [info]:"];

/// Statistics the encoders print at info level; only meaningful after an encoder prefix.
const ENCODER_STATS: &[&str] = &[
    "[info]",
    "qp",
    "mb ",
    "psy",
    "cabac",
    "sse2",
    "sse4",
    "avx",
    "mmx",
    "cpu capabilities",
    "profile high",
    "frame i:",
    "frame p:",
    "frame b:",
    "kb/s:",
];

const ERROR_MARKERS: &[&str] = &[
    "error",
    "invalid",
    "no such file",
    "unknown encoder",
    "not found",
];

const WARNING_MARKERS: &[&str] = &["warning", "deprecated"];

fn has_all(line: &str, needles: &[&str]) -> bool {
    needles.iter().all(|needle| line.contains(needle))
}

fn has_any(line: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| line.contains(needle))
}

fn is_encoder_chatter(lower: &str) -> bool {
    ENCODER_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
        && has_any(lower, ENCODER_STATS)
        && !has_any(lower, ERROR_MARKERS)
}

pub fn classify_log_line(line: &str) -> LogLevel {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LogLevel::Noise;
    }
    if trimmed.starts_with("Input #") {
        return LogLevel::Input;
    }
    if trimmed.starts_with("Output #") {
        return LogLevel::Output;
    }
    // The final statistics line also carries frame= and time=.
    if has_all(trimmed, &["Lsize=", "bitrate="]) {
        return LogLevel::Summary;
    }
    if has_all(trimmed, &["frame=", "time="]) {
        return LogLevel::Progress;
    }
    if has_all(trimmed, &["Overwrite?", "[y/N]"]) {
        return LogLevel::Prompt;
    }

    let lower = trimmed.to_ascii_lowercase();
    if BANNER_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) || is_encoder_chatter(&lower) {
        LogLevel::Noise
    } else if has_any(&lower, ERROR_MARKERS) {
        LogLevel::Error
    } else if has_any(&lower, WARNING_MARKERS) {
        LogLevel::Warning
    } else {
        LogLevel::Noise
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_lines() {
        assert_eq!(
            classify_log_line("Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'in.mp4':"),
            LogLevel::Input
        );
        assert_eq!(
            classify_log_line("frame=   10 fps=0.0 q=0.0 size=       0kB time=00:00:00.33 bitrate=   0.0kbits/s"),
            LogLevel::Progress
        );
        assert_eq!(
            classify_log_line("frame=  250 fps=0.0 q=-1.0 Lsize=     512kB time=00:00:10.00 bitrate= 419.4kbits/s"),
            LogLevel::Summary
        );
        assert_eq!(
            classify_log_line("File 'out.mp4' already exists. Overwrite? [y/N]"),
            LogLevel::Prompt
        );
        assert_eq!(
            classify_log_line("missing.mp4: No such file or directory"),
            LogLevel::Error
        );
        assert_eq!(
            classify_log_line("ffmpeg version 6.1 Copyright (c) 2000-2023"),
            LogLevel::Noise
        );
        assert_eq!(
            classify_log_line("[swscaler @ 0x55] deprecated pixel format used"),
            LogLevel::Warning
        );
    }

    #[test]
    fn encoder_statistics_are_noise_but_errors_are_not() {
        assert_eq!(
            classify_log_line("[libx264 @ 0x5581] frame I:1     Avg QP:20.15  size:  4086"),
            LogLevel::Noise
        );
        assert_eq!(
            classify_log_line("[libx264 @ 0x5581] mb I  I16..4: 37.1% 42.0% 20.9%"),
            LogLevel::Noise
        );
        assert_eq!(
            classify_log_line("Error initializing output stream 0:0 -- mb size not supported"),
            LogLevel::Error
        );
        assert_eq!(
            classify_log_line("[libx264 @ 0x5581] Error: invalid qp range"),
            LogLevel::Error
        );
        assert_eq!(
            classify_log_line("Option qpmax not found."),
            LogLevel::Error
        );
    }
}

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    pub frame: u64,
    pub fps: f32,
    pub time: Duration,
    pub bitrate_kbps: f32,
    pub speed: f32,
    pub size_bytes: u64,
}

static RE_FRAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"frame=\s*(\d+)").unwrap());
static RE_FPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"fps=\s*([0-9]*\.?[0-9]+)").unwrap());
static RE_TIME: Lazy<Regex> = Lazy::new(|| Regex::new(r"time=\s*(-?[0-9:\.]+)").unwrap());
static RE_BITRATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"bitrate=\s*([0-9]*\.?[0-9]+)\s*([A-Za-z/]+)").unwrap());
static RE_SPEED: Lazy<Regex> = Lazy::new(|| Regex::new(r"speed=\s*([0-9]*\.?[0-9]+)x").unwrap());
static RE_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"L?size=\s*([0-9]*\.?[0-9]+)\s*([A-Za-z]+)").unwrap());

/// Parses the periodic `frame=... time=...` statistics line the tool writes to stderr.
pub fn parse_progress_line(line: &str) -> Option<FfmpegProgress> {
    if !line.contains("time=") {
        return None;
    }

    let time = RE_TIME
        .captures(line)
        .and_then(|cap| cap.get(1))
        .and_then(|m| parse_ffmpeg_time(m.as_str()));
    let frame = RE_FRAME
        .captures(line)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok());
    let fps = RE_FPS
        .captures(line)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<f32>().ok());
    let bitrate = RE_BITRATE.captures(line).and_then(|cap| {
        let value = cap.get(1)?.as_str().parse::<f32>().ok()?;
        parse_bitrate_to_kbps(value, cap.get(2)?.as_str())
    });
    let speed = RE_SPEED
        .captures(line)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse::<f32>().ok());
    let size = RE_SIZE.captures(line).and_then(|cap| {
        let value = cap.get(1)?.as_str().parse::<f32>().ok()?;
        parse_size_to_bytes(value, cap.get(2)?.as_str())
    });

    if time.is_none() && frame.is_none() && speed.is_none() {
        return None;
    }

    Some(FfmpegProgress {
        frame: frame.unwrap_or(0),
        fps: fps.unwrap_or(0.0),
        time: time.unwrap_or(Duration::from_secs(0)),
        bitrate_kbps: bitrate.unwrap_or(0.0),
        speed: speed.unwrap_or(0.0),
        size_bytes: size.unwrap_or(0),
    })
}

/// `HH:MM:SS.frac` or plain seconds. Negative and `N/A` values yield `None`.
pub fn parse_ffmpeg_time(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() || value.starts_with('-') {
        return None;
    }

    let mut seconds = 0.0f64;
    for part in value.split(':') {
        let parsed = part.parse::<f64>().ok()?;
        seconds = seconds * 60.0 + parsed;
    }

    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(seconds))
}

pub fn parse_bitrate_to_kbps(value: f32, unit: &str) -> Option<f32> {
    let unit = unit.to_ascii_lowercase();
    if unit.starts_with("kbit") || unit.starts_with("kb/") {
        Some(value)
    } else if unit.starts_with("mbit") || unit.starts_with("mb/") {
        Some(value * 1000.0)
    } else if unit.starts_with("gbit") {
        Some(value * 1_000_000.0)
    } else if unit.starts_with("bit") || unit.starts_with("b/") {
        Some(value / 1000.0)
    } else {
        None
    }
}

pub fn parse_size_to_bytes(value: f32, unit: &str) -> Option<u64> {
    let multiplier: f64 = match unit.to_ascii_lowercase().as_str() {
        "b" => 1.0,
        "kb" | "kib" => 1024.0,
        "mb" | "mib" => 1024.0 * 1024.0,
        "gb" | "gib" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((value as f64 * multiplier).round() as u64)
}

/// Collects `key=value` lines from `-progress pipe:1` until a `progress=` marker.
#[derive(Debug, Default)]
pub struct ProgressAccumulator {
    frame: Option<u64>,
    fps: Option<f32>,
    time: Option<Duration>,
    bitrate_kbps: Option<f32>,
    speed: Option<f32>,
    size_bytes: Option<u64>,
}

impl ProgressAccumulator {
    fn set_kv(&mut self, key: &str, value: &str) {
        match key {
            "frame" => {
                self.frame = value.trim().parse::<u64>().ok();
            }
            "fps" => {
                self.fps = value.trim().parse::<f32>().ok();
            }
            "bitrate" => {
                if let Some((num, unit)) = split_number_unit(value) {
                    if let Ok(parsed) = num.parse::<f32>() {
                        self.bitrate_kbps = parse_bitrate_to_kbps(parsed, unit);
                    }
                }
            }
            "speed" => {
                let trimmed = value.trim().trim_end_matches('x');
                self.speed = trimmed.parse::<f32>().ok();
            }
            "total_size" | "size" => {
                self.size_bytes = value.trim().parse::<u64>().ok();
            }
            "out_time" => {
                self.time = parse_ffmpeg_time(value.trim());
            }
            // out_time_ms is reported in microseconds as well
            "out_time_ms" | "out_time_us" => {
                if let Ok(parsed) = value.trim().parse::<u64>() {
                    self.time = Some(Duration::from_micros(parsed));
                }
            }
            _ => {}
        }
    }

    fn to_progress(&self) -> Option<FfmpegProgress> {
        if self.frame.is_none()
            && self.fps.is_none()
            && self.time.is_none()
            && self.bitrate_kbps.is_none()
            && self.speed.is_none()
            && self.size_bytes.is_none()
        {
            return None;
        }

        Some(FfmpegProgress {
            frame: self.frame.unwrap_or(0),
            fps: self.fps.unwrap_or(0.0),
            time: self.time.unwrap_or(Duration::from_secs(0)),
            bitrate_kbps: self.bitrate_kbps.unwrap_or(0.0),
            speed: self.speed.unwrap_or(0.0),
            size_bytes: self.size_bytes.unwrap_or(0),
        })
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    /// Feeds one stdout line; returns a progress update when a block completes.
    pub fn push_line(&mut self, line: &str) -> Option<FfmpegProgress> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some((key, value)) = trimmed.split_once('=') {
            if key.trim() == "progress" {
                let progress = self.to_progress();
                self.reset();
                return progress;
            }

            self.set_kv(key.trim(), value.trim());
            return None;
        }

        parse_progress_line(trimmed)
    }
}

fn split_number_unit(value: &str) -> Option<(&str, &str)> {
    let trimmed = value.trim();
    let mut idx = 0;
    for (pos, ch) in trimmed.char_indices() {
        if !(ch.is_ascii_digit() || ch == '.') {
            idx = pos;
            break;
        }
    }
    if idx == 0 || idx >= trimmed.len() {
        return None;
    }
    Some((&trimmed[..idx], trimmed[idx..].trim()))
}

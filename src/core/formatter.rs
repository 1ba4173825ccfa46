use std::time::Duration;

use crate::core::media::MediaInfo;
use crate::core::progress::FfmpegProgress;
use crate::core::summary::EncodeSummary;

pub fn format_media_line(info: &MediaInfo) -> String {
    let resolution = match (info.width, info.height) {
        (Some(width), Some(height)) => format!("{width}x{height}"),
        _ => "no video".to_string(),
    };
    let fps = info
        .frame_rate
        .map(|fps| format!("{:.2}fps", fps))
        .unwrap_or_else(|| "unknown fps".to_string());
    let codec = info.video_codec.as_deref().unwrap_or("unknown");
    let audio = info.audio_codec.as_deref().unwrap_or("none");
    let container = if info.container.is_empty() {
        "unknown"
    } else {
        info.container.as_str()
    };
    let bitrate = info
        .bitrate_kbps
        .map(|kbps| format!("{:.1} kb/s", kbps))
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "{} ({container}/{codec}+{audio} {resolution} @ {fps}, duration={}, bitrate={bitrate})",
        info.path.display(),
        format_duration(info.duration)
    )
}

pub fn format_summary_line(summary: &EncodeSummary) -> String {
    let size = format_bytes(summary.final_size_bytes);
    let bitrate = if summary.avg_bitrate_kbps > 0.0 {
        format!("{:.1} kbps", summary.avg_bitrate_kbps)
    } else {
        "unknown".to_string()
    };
    let duration = format_duration(summary.duration);
    format!("size={size} avg_bitrate={bitrate} duration={duration}")
}

pub fn format_progress_line(update: &FfmpegProgress, total: Option<Duration>) -> Option<String> {
    if update.frame == 0 && update.speed == 0.0 && update.time == Duration::from_secs(0) {
        return None;
    }

    let elapsed = format_duration(update.time);
    let total = total
        .map(format_duration)
        .unwrap_or_else(|| "--:--:--".to_string());

    Some(format!(
        "progress: time={elapsed}/{total} frame={} speed={}x",
        update.frame, update.speed
    ))
}

pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

/// `HH:MM:SS.mmm`, the form the tool accepts for `-ss` and `-t`.
pub fn format_timestamp(duration: Duration) -> String {
    format!(
        "{}.{:03}",
        format_duration(duration),
        duration.subsec_millis()
    )
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;
    let value = bytes as f64;
    if value >= GB {
        format!("{:.2} GB", value / GB)
    } else if value >= MB {
        format!("{:.2} MB", value / MB)
    } else if value >= KB {
        format!("{:.2} KB", value / KB)
    } else {
        format!("{} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_carry_milliseconds() {
        assert_eq!(format_timestamp(Duration::from_millis(3_723_045)), "01:02:03.045");
        assert_eq!(format_timestamp(Duration::ZERO), "00:00:00.000");
    }

    #[test]
    fn bytes_pick_a_unit() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn idle_progress_is_not_formatted() {
        let idle = FfmpegProgress::default();
        assert!(format_progress_line(&idle, None).is_none());

        let busy = FfmpegProgress {
            frame: 48,
            time: Duration::from_secs(2),
            speed: 1.5,
            ..FfmpegProgress::default()
        };
        assert_eq!(
            format_progress_line(&busy, Some(Duration::from_secs(10))).unwrap(),
            "progress: time=00:00:02/00:00:10 frame=48 speed=1.5x"
        );
    }
}

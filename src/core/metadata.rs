use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::core::progress::parse_ffmpeg_time;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Input,
    Output,
}

/// One `Input #n` or `Output #n` block of the tool's report.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaSection {
    pub kind: SectionKind,
    pub index: u32,
    pub container: String,
    pub path: String,
    pub duration: Option<Duration>,
    pub bitrate_kbps: Option<f32>,
    pub video_codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fps: Option<f32>,
    pub audio_codec: Option<String>,
}

impl MediaSection {
    fn new(kind: SectionKind, index: u32, container: String, path: String) -> Self {
        Self {
            kind,
            index,
            container,
            path,
            duration: None,
            bitrate_kbps: None,
            video_codec: None,
            width: None,
            height: None,
            fps: None,
            audio_codec: None,
        }
    }

    pub fn has_video(&self) -> bool {
        self.width.is_some() && self.height.is_some()
    }
}

static RE_INPUT_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Input #(\d+),\s*(.+),\s*from '(.*)'").unwrap());
static RE_OUTPUT_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^Output #(\d+),\s*([^,]+),\s*to '(.*)'").unwrap());
static RE_DURATION: Lazy<Regex> = Lazy::new(|| Regex::new(r"Duration:\s*([0-9:\.]+)").unwrap());
static RE_BITRATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"bitrate:\s*([0-9]*\.?[0-9]+)\s*kb/s").unwrap());
static RE_STREAM_VIDEO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Stream #\d+:\d+.*?Video:\s*([A-Za-z0-9_\-]+)").unwrap());
static RE_STREAM_AUDIO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Stream #\d+:\d+.*?Audio:\s*([A-Za-z0-9_\-]+)").unwrap());
static RE_RESOLUTION: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*(\d{1,5})x(\d{1,5})").unwrap());
static RE_FPS: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]*\.?[0-9]+)\s*fps").unwrap());

/// Line-at-a-time parser for the human-readable stream report. Lines it does not
/// recognise are ignored.
#[derive(Debug, Default)]
pub struct MetadataParser {
    pending: Option<MediaSection>,
}

impl MetadataParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line. Returns a finished section when a new header closes the
    /// previous one.
    pub fn parse_line(&mut self, line: &str) -> Option<MediaSection> {
        let trimmed = line.trim_start();

        if let Some(capture) = RE_INPUT_HEADER.captures(trimmed) {
            return self.open(SectionKind::Input, &capture);
        }
        if let Some(capture) = RE_OUTPUT_HEADER.captures(trimmed) {
            return self.open(SectionKind::Output, &capture);
        }

        let section = self.pending.as_mut()?;

        if let Some(capture) = RE_DURATION.captures(trimmed) {
            if let Some(value) = capture.get(1) {
                section.duration = parse_ffmpeg_time(value.as_str());
            }
            if let Some(value) = RE_BITRATE.captures(trimmed).and_then(|cap| cap.get(1)) {
                section.bitrate_kbps = value.as_str().parse::<f32>().ok();
            }
            return None;
        }

        if let Some(codec) = RE_STREAM_VIDEO.captures(trimmed).and_then(|cap| cap.get(1)) {
            // only the first video stream describes the file
            if section.video_codec.is_some() {
                return None;
            }
            section.video_codec = Some(codec.as_str().to_string());
            if let Some((width, height)) = RE_RESOLUTION.captures(trimmed).and_then(|cap| {
                let w = cap.get(1)?.as_str().parse::<u32>().ok()?;
                let h = cap.get(2)?.as_str().parse::<u32>().ok()?;
                Some((w, h))
            }) {
                if width > 0 && height > 0 {
                    section.width = Some(width);
                    section.height = Some(height);
                }
            }
            section.fps = RE_FPS
                .captures(trimmed)
                .and_then(|cap| cap.get(1))
                .and_then(|m| m.as_str().parse::<f32>().ok());
            return None;
        }

        if let Some(codec) = RE_STREAM_AUDIO.captures(trimmed).and_then(|cap| cap.get(1)) {
            if section.audio_codec.is_none() {
                section.audio_codec = Some(codec.as_str().to_string());
            }
        }

        None
    }

    /// Flushes the section still being read once the stream has ended.
    pub fn finish(&mut self) -> Option<MediaSection> {
        self.pending.take()
    }

    fn open(&mut self, kind: SectionKind, capture: &regex::Captures<'_>) -> Option<MediaSection> {
        let index = capture
            .get(1)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or(0);
        let container = capture
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .unwrap_or_default();
        let path = capture
            .get(3)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        self.pending
            .replace(MediaSection::new(kind, index, container, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_REPORT: &str = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'it's a clip.mp4':
  Metadata:
    major_brand     : isom
  Duration: 00:00:13.48, start: 0.000000, bitrate: 1205 kb/s
  Stream #0:0[0x1](und): Video: h264 (High) (avc1 / 0x31637661), yuv420p(progressive), 1280x720 [SAR 1:1 DAR 16:9], 1071 kb/s, 29.97 fps, 29.97 tbr, 30k tbn (default)
  Stream #0:1[0x2](und): Audio: aac (LC) (mp4a / 0x6134706D), 48000 Hz, stereo, fltp, 128 kb/s (default)
";

    fn parse_all(report: &str) -> Vec<MediaSection> {
        let mut parser = MetadataParser::new();
        let mut sections: Vec<MediaSection> =
            report.lines().filter_map(|line| parser.parse_line(line)).collect();
        sections.extend(parser.finish());
        sections
    }

    #[test]
    fn parses_probe_report() {
        let sections = parse_all(PROBE_REPORT);
        assert_eq!(sections.len(), 1);
        let input = &sections[0];
        assert_eq!(input.kind, SectionKind::Input);
        assert_eq!(input.container, "mov,mp4,m4a,3gp,3g2,mj2");
        assert_eq!(input.path, "it's a clip.mp4");
        assert_eq!(input.duration, Some(Duration::from_millis(13_480)));
        assert_eq!(input.bitrate_kbps, Some(1205.0));
        assert_eq!(input.video_codec.as_deref(), Some("h264"));
        assert_eq!((input.width, input.height), (Some(1280), Some(720)));
        assert_eq!(input.fps, Some(29.97));
        assert_eq!(input.audio_codec.as_deref(), Some("aac"));
    }

    #[test]
    fn output_header_closes_input_section() {
        let report = format!(
            "{PROBE_REPORT}Stream mapping:\n  Stream #0:0 -> #0:0 (h264 (native) -> theora (libtheora))\n\
Output #0, ogg, to 'out.ogv':\n  Stream #0:0: Video: theora, yuv420p(progressive), 854x480, q=2-31, 29.97 fps, 29.97 tbn\n"
        );
        let sections = parse_all(&report);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].kind, SectionKind::Input);
        assert_eq!(sections[0].width, Some(1280));
        assert_eq!(sections[1].kind, SectionKind::Output);
        assert_eq!(sections[1].container, "ogg");
        assert_eq!(sections[1].path, "out.ogv");
        assert_eq!(sections[1].video_codec.as_deref(), Some("theora"));
        assert_eq!((sections[1].width, sections[1].height), (Some(854), Some(480)));
    }

    #[test]
    fn audio_only_input_has_no_dimensions() {
        let report = "Input #0, mp3, from 'song.mp3':\n  Duration: 00:03:00.05, start: 0.025057, bitrate: 320 kb/s\n  Stream #0:0: Audio: mp3, 44100 Hz, stereo, fltp, 320 kb/s\n";
        let sections = parse_all(report);
        assert_eq!(sections.len(), 1);
        assert!(!sections[0].has_video());
        assert_eq!(sections[0].audio_codec.as_deref(), Some("mp3"));
        assert_eq!(sections[0].duration, Some(Duration::from_millis(180_050)));
    }

    #[test]
    fn lines_outside_sections_are_ignored() {
        let mut parser = MetadataParser::new();
        assert!(parser
            .parse_line("  Stream #0:0: Video: h264, yuv420p, 640x480")
            .is_none());
        assert!(parser.finish().is_none());
    }
}

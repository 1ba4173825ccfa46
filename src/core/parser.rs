use std::path::Path;

use tracing::{debug, trace};

use crate::core::event::{classify_log_line, FfmpegEvent, LogLevel};
use crate::core::media::MediaInfo;
use crate::core::metadata::{MediaSection, MetadataParser, SectionKind};
use crate::core::progress::{parse_progress_line, FfmpegProgress, ProgressAccumulator};
use crate::core::summary::{parse_summary_line, EncodeSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// Everything learned from one process's output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseReport {
    pub sections: Vec<MediaSection>,
    pub last_progress: Option<FfmpegProgress>,
    pub summary: Option<EncodeSummary>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ParseReport {
    pub fn inputs(&self) -> impl Iterator<Item = &MediaSection> {
        self.sections
            .iter()
            .filter(|section| section.kind == SectionKind::Input)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &MediaSection> {
        self.sections
            .iter()
            .filter(|section| section.kind == SectionKind::Output)
    }

    /// Media info for the first input that reported a duration or a frame size.
    pub fn media_info(&self, path: &Path) -> Option<MediaInfo> {
        let section = self
            .inputs()
            .find(|section| section.duration.is_some() || section.has_video())?;
        let mut info = MediaInfo::from_section(section, path);
        info.frame_count = self.last_progress.as_ref().map(|progress| progress.frame);
        Some(info)
    }
}

/// Turns raw output lines into events while building a [`ParseReport`].
#[derive(Debug, Default)]
pub struct OutputParser {
    metadata: MetadataParser,
    accumulator: ProgressAccumulator,
    report: ParseReport,
}

impl OutputParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, stream: StreamKind, line: &str) -> Vec<FfmpegEvent> {
        let mut events = Vec::new();
        trace!(?stream, line, "tool output");

        match stream {
            StreamKind::Stdout => {
                if let Some(progress) = self.accumulator.push_line(line) {
                    self.record_progress(progress, &mut events);
                }
            }
            StreamKind::Stderr => {
                if let Some(section) = self.metadata.parse_line(line) {
                    self.record_section(section, &mut events);
                }

                match classify_log_line(line) {
                    LogLevel::Summary => {
                        if let Some(progress) = parse_progress_line(line) {
                            self.record_progress(progress, &mut events);
                        }
                        if let Some(summary) = parse_summary_line(line) {
                            self.report.summary = Some(summary.clone());
                            events.push(FfmpegEvent::Summary(summary));
                        }
                    }
                    LogLevel::Progress => {
                        if let Some(progress) = parse_progress_line(line) {
                            self.record_progress(progress, &mut events);
                        }
                    }
                    LogLevel::Error => {
                        self.report.errors.push(line.to_string());
                        events.push(FfmpegEvent::Error(line.to_string()));
                    }
                    LogLevel::Warning => {
                        self.report.warnings.push(line.to_string());
                        events.push(FfmpegEvent::Warning(line.to_string()));
                    }
                    LogLevel::Prompt => events.push(FfmpegEvent::Prompt(line.to_string())),
                    LogLevel::Input | LogLevel::Output | LogLevel::Noise => {}
                }
            }
        }

        events
    }

    /// Closes any open report section once both streams have ended.
    pub fn finish(&mut self) -> Vec<FfmpegEvent> {
        let mut events = Vec::new();
        if let Some(section) = self.metadata.finish() {
            self.record_section(section, &mut events);
        }
        events
    }

    pub fn report(&self) -> &ParseReport {
        &self.report
    }

    pub fn into_report(self) -> ParseReport {
        self.report
    }

    fn record_progress(&mut self, progress: FfmpegProgress, events: &mut Vec<FfmpegEvent>) {
        self.report.last_progress = Some(progress.clone());
        events.push(FfmpegEvent::Progress(progress));
    }

    fn record_section(&mut self, section: MediaSection, events: &mut Vec<FfmpegEvent>) {
        debug!(
            kind = ?section.kind,
            index = section.index,
            path = %section.path,
            "parsed report section"
        );
        self.report.sections.push(section.clone());
        events.push(FfmpegEvent::Section(section));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn feed(parser: &mut OutputParser, text: &str) -> Vec<FfmpegEvent> {
        let mut events = Vec::new();
        for line in text.lines() {
            events.extend(parser.push_line(StreamKind::Stderr, line));
        }
        events.extend(parser.finish());
        events
    }

    #[test]
    fn encode_log_yields_sections_progress_and_summary() {
        let log = "\
Input #0, mov,mp4,m4a,3gp,3g2,mj2, from 'in.mp4':
  Duration: 00:00:10.00, start: 0.000000, bitrate: 900 kb/s
  Stream #0:0(und): Video: h264 (High), yuv420p, 640x360, 800 kb/s, 25 fps, 25 tbr
Output #0, mp4, to 'out.mp4':
  Stream #0:0(und): Video: h264 (libx264), yuv420p, 854x480, q=2-31, 25 fps
frame=  100 fps=0.0 q=28.0 size=     128kB time=00:00:04.00 bitrate= 262.1kbits/s speed=8.0x
frame=  250 fps=0.0 q=-1.0 Lsize=     512kB time=00:00:10.00 bitrate= 419.4kbits/s speed=9.1x
";
        let mut parser = OutputParser::new();
        let events = feed(&mut parser, log);

        let progress: Vec<_> = events.iter().filter_map(FfmpegEvent::as_progress).collect();
        assert_eq!(progress.len(), 2);
        assert_eq!(progress[1].frame, 250);
        assert!(events
            .iter()
            .any(|event| matches!(event, FfmpegEvent::Summary(_))));

        let report = parser.into_report();
        assert_eq!(report.inputs().count(), 1);
        assert_eq!(report.outputs().count(), 1);

        let info = report.media_info(Path::new("in.mp4")).unwrap();
        assert_eq!(info.duration, Duration::from_secs(10));
        assert_eq!(info.width, Some(640));
        assert_eq!(info.frame_count, Some(250));
    }

    #[test]
    fn progress_pipe_lines_on_stdout() {
        let mut parser = OutputParser::new();
        assert!(parser.push_line(StreamKind::Stdout, "frame=5").is_empty());
        assert!(parser.push_line(StreamKind::Stdout, "out_time=00:00:00.200000").is_empty());
        let events = parser.push_line(StreamKind::Stdout, "progress=continue");
        assert_eq!(
            events[0].as_progress().map(|p| p.time),
            Some(Duration::from_millis(200))
        );
    }

    #[test]
    fn errors_are_collected() {
        let mut parser = OutputParser::new();
        feed(&mut parser, "nope.mp4: No such file or directory\n");
        assert_eq!(parser.report().errors, vec!["nope.mp4: No such file or directory"]);
        assert!(parser.report().media_info(Path::new("nope.mp4")).is_none());
    }

    #[test]
    fn unknown_lines_are_ignored() {
        let mut parser = OutputParser::new();
        let events = feed(&mut parser, "something new in a future release\n[hevc] thing\n");
        assert!(events.is_empty());
        assert_eq!(parser.into_report(), ParseReport::default());
    }
}

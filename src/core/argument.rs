use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{FfxError, Result};
use crate::core::formatter::format_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgumentKind {
    Input,
    Concat,
    Seek,
    Output,
    Overwrite,
    VideoCodec,
    AudioCodec,
    Scale,
    Size,
    Copy,
    BitStreamFilter,
    ForceFormat,
    Threads,
    FrameRate,
    FrameOutputCount,
    Speed,
    ConstantRateFactor,
    AudioBitrate,
    PixelFormat,
    DurationLimit,
    ProgressPipe,
    Custom,
}

/// Where an argument sits relative to the tool's positional input/output split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Input,
    Output,
    Other,
}

impl ArgumentKind {
    pub fn phase(self) -> Phase {
        match self {
            ArgumentKind::Input | ArgumentKind::Concat => Phase::Input,
            ArgumentKind::Output => Phase::Output,
            _ => Phase::Other,
        }
    }

    /// Kinds that legitimately appear more than once in one invocation.
    pub fn is_repeatable(self) -> bool {
        matches!(
            self,
            ArgumentKind::Input
                | ArgumentKind::Concat
                | ArgumentKind::Copy
                | ArgumentKind::BitStreamFilter
                | ArgumentKind::Custom
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Video,
    Audio,
    Both,
}

impl Channel {
    fn suffix(self) -> &'static str {
        match self {
            Channel::Video => ":v",
            Channel::Audio => ":a",
            Channel::Both => "",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    H264Mp4ToAnnexB,
    AacAdtsToAsc,
}

impl Filter {
    pub fn as_str(self) -> &'static str {
        match self {
            Filter::H264Mp4ToAnnexB => "h264_mp4toannexb",
            Filter::AacAdtsToAsc => "aac_adtstoasc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoCodec {
    LibX264,
    LibVpx,
    LibTheora,
    Png,
    Other(String),
}

impl VideoCodec {
    pub fn as_str(&self) -> &str {
        match self {
            VideoCodec::LibX264 => "libx264",
            VideoCodec::LibVpx => "libvpx",
            VideoCodec::LibTheora => "libtheora",
            VideoCodec::Png => "png",
            VideoCodec::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioCodec {
    Aac,
    LibVorbis,
    LibMp3Lame,
    Other(String),
}

impl AudioCodec {
    pub fn as_str(&self) -> &str {
        match self {
            AudioCodec::Aac => "aac",
            AudioCodec::LibVorbis => "libvorbis",
            AudioCodec::LibMp3Lame => "libmp3lame",
            AudioCodec::Other(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    UltraFast,
    SuperFast,
    VeryFast,
    Faster,
    Fast,
    Medium,
    Slow,
    Slower,
    VerySlow,
}

impl Speed {
    pub fn as_str(self) -> &'static str {
        match self {
            Speed::UltraFast => "ultrafast",
            Speed::SuperFast => "superfast",
            Speed::VeryFast => "veryfast",
            Speed::Faster => "faster",
            Speed::Fast => "fast",
            Speed::Medium => "medium",
            Speed::Slow => "slow",
            Speed::Slower => "slower",
            Speed::VerySlow => "veryslow",
        }
    }
}

/// Target height presets; `Original` leaves the frame size untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoSize {
    Original,
    FullHd,
    Hd,
    Ed,
    Ld,
}

impl VideoSize {
    pub fn height(self) -> Option<u32> {
        match self {
            VideoSize::Original => None,
            VideoSize::FullHd => Some(1080),
            VideoSize::Hd => Some(720),
            VideoSize::Ed => Some(480),
            VideoSize::Ld => Some(360),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoType {
    Mp4,
    Ts,
    Ogv,
    WebM,
}

impl VideoType {
    pub fn extension(self) -> &'static str {
        match self {
            VideoType::Mp4 => "mp4",
            VideoType::Ts => "ts",
            VideoType::Ogv => "ogv",
            VideoType::WebM => "webm",
        }
    }
}

// Payload types. Each one is what `ArgumentContainer::find::<T>()` hands back.

#[derive(Debug, Clone, PartialEq)]
pub struct Input(pub PathBuf);

#[derive(Debug, Clone, PartialEq)]
pub struct Output(pub PathBuf);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Seek(pub Duration);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overwrite;

/// `-vf scale=W:H`. A dimension of -1 (or -2 for an even result) is computed by the
/// tool from the aspect ratio and is not checked here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scale {
    pub width: i32,
    pub height: i32,
}

impl Scale {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    /// Fixed height with an even width derived from the aspect ratio.
    pub fn to_height(height: u32) -> Result<Self> {
        let height = i32::try_from(height)
            .map_err(|_| FfxError::construction(format!("scale height {height} is out of range")))?;
        Ok(Self { width: -2, height })
    }

    /// `None` for [`VideoSize::Original`].
    pub fn from_size(size: VideoSize) -> Result<Option<Self>> {
        size.height().map(Self::to_height).transpose()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamCopy(pub Channel);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitStreamFilter {
    pub channel: Channel,
    pub filter: Filter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForceFormat(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threads {
    Auto,
    Count(usize),
}

impl Threads {
    pub fn count(self) -> usize {
        match self {
            Threads::Auto => num_cpus::get(),
            Threads::Count(count) => count.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameRate(pub f64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOutputCount(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantRateFactor(pub u8);

/// Audio bitrate in kbit/s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioBitrate(pub u32);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFormat(pub String);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DurationLimit(pub Duration);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressPipe;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Custom(pub Vec<String>);

#[derive(Debug, Clone, PartialEq)]
pub struct ConcatEntry {
    pub path: PathBuf,
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConcatSource {
    /// `concat:a|b` protocol string, no list file.
    Protocol,
    /// Concat demuxer reading a `file '...'` list from disk.
    ListFile(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConcatArgument {
    entries: Vec<ConcatEntry>,
    source: ConcatSource,
}

impl ConcatArgument {
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            entries: paths
                .into_iter()
                .map(|path| ConcatEntry {
                    path: path.into(),
                    duration: None,
                })
                .collect(),
            source: ConcatSource::Protocol,
        }
    }

    /// One entry per image, each held for `1 / frame_rate` seconds. The last image is
    /// listed a second time without a duration so the demuxer honours its slot.
    pub fn image_sequence<I, P>(paths: I, frame_rate: f64) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let slot = if frame_rate > 0.0 {
            Some(Duration::from_secs_f64(1.0 / frame_rate))
        } else {
            None
        };
        let mut entries: Vec<ConcatEntry> = paths
            .into_iter()
            .map(|path| ConcatEntry {
                path: path.into(),
                duration: slot,
            })
            .collect();
        if let Some(last) = entries.last() {
            entries.push(ConcatEntry {
                path: last.path.clone(),
                duration: None,
            });
        }
        Self {
            entries,
            source: ConcatSource::Protocol,
        }
    }

    pub fn with_list_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = ConcatSource::ListFile(path.into());
        self
    }

    pub fn push(&mut self, path: impl Into<PathBuf>) {
        self.entries.push(ConcatEntry {
            path: path.into(),
            duration: None,
        });
    }

    pub fn entries(&self) -> &[ConcatEntry] {
        &self.entries
    }

    pub fn source(&self) -> &ConcatSource {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|entry| entry.path.as_path())
    }

    /// Text of the concat demuxer list file.
    pub fn list_file_contents(&self) -> String {
        let mut contents = String::new();
        for entry in &self.entries {
            let path = entry.path.to_string_lossy().replace('\'', r"'\''");
            contents.push_str(&format!("file '{path}'\n"));
            if let Some(duration) = entry.duration {
                contents.push_str(&format!("duration {:.6}\n", duration.as_secs_f64()));
            }
        }
        contents
    }

    fn render(&self) -> Result<Vec<String>> {
        if self.entries.is_empty() {
            return Err(FfxError::construction("concat argument has no sources"));
        }
        match &self.source {
            ConcatSource::Protocol => {
                if self.entries.iter().any(|entry| entry.duration.is_some()) {
                    return Err(FfxError::construction(
                        "concat entries with durations need a list file",
                    ));
                }
                let joined = self
                    .entries
                    .iter()
                    .map(|entry| entry.path.to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("|");
                Ok(vec!["-i".to_string(), format!("concat:{joined}")])
            }
            ConcatSource::ListFile(list) => Ok(vec![
                "-f".to_string(),
                "concat".to_string(),
                "-safe".to_string(),
                "0".to_string(),
                "-i".to_string(),
                list.to_string_lossy().into_owned(),
            ]),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Input(Input),
    Concat(ConcatArgument),
    Seek(Seek),
    Output(Output),
    Overwrite(Overwrite),
    VideoCodec(VideoCodec),
    AudioCodec(AudioCodec),
    Scale(Scale),
    Size(Size),
    Copy(StreamCopy),
    BitStreamFilter(BitStreamFilter),
    ForceFormat(ForceFormat),
    Threads(Threads),
    FrameRate(FrameRate),
    FrameOutputCount(FrameOutputCount),
    Speed(Speed),
    ConstantRateFactor(ConstantRateFactor),
    AudioBitrate(AudioBitrate),
    PixelFormat(PixelFormat),
    DurationLimit(DurationLimit),
    ProgressPipe(ProgressPipe),
    Custom(Custom),
}

impl Argument {
    pub fn input(path: impl Into<PathBuf>) -> Self {
        Argument::Input(Input(path.into()))
    }

    pub fn output(path: impl Into<PathBuf>) -> Self {
        Argument::Output(Output(path.into()))
    }

    pub fn kind(&self) -> ArgumentKind {
        match self {
            Argument::Input(_) => ArgumentKind::Input,
            Argument::Concat(_) => ArgumentKind::Concat,
            Argument::Seek(_) => ArgumentKind::Seek,
            Argument::Output(_) => ArgumentKind::Output,
            Argument::Overwrite(_) => ArgumentKind::Overwrite,
            Argument::VideoCodec(_) => ArgumentKind::VideoCodec,
            Argument::AudioCodec(_) => ArgumentKind::AudioCodec,
            Argument::Scale(_) => ArgumentKind::Scale,
            Argument::Size(_) => ArgumentKind::Size,
            Argument::Copy(_) => ArgumentKind::Copy,
            Argument::BitStreamFilter(_) => ArgumentKind::BitStreamFilter,
            Argument::ForceFormat(_) => ArgumentKind::ForceFormat,
            Argument::Threads(_) => ArgumentKind::Threads,
            Argument::FrameRate(_) => ArgumentKind::FrameRate,
            Argument::FrameOutputCount(_) => ArgumentKind::FrameOutputCount,
            Argument::Speed(_) => ArgumentKind::Speed,
            Argument::ConstantRateFactor(_) => ArgumentKind::ConstantRateFactor,
            Argument::AudioBitrate(_) => ArgumentKind::AudioBitrate,
            Argument::PixelFormat(_) => ArgumentKind::PixelFormat,
            Argument::DurationLimit(_) => ArgumentKind::DurationLimit,
            Argument::ProgressPipe(_) => ArgumentKind::ProgressPipe,
            Argument::Custom(_) => ArgumentKind::Custom,
        }
    }

    /// Command-line tokens for this argument, unquoted.
    pub fn tokens(&self) -> Result<Vec<String>> {
        let pair = |flag: &str, value: String| vec![flag.to_string(), value];

        let tokens = match self {
            Argument::Input(Input(path)) => pair("-i", path.to_string_lossy().into_owned()),
            Argument::Concat(concat) => concat.render()?,
            Argument::Seek(Seek(at)) => pair("-ss", format_timestamp(*at)),
            Argument::Output(Output(path)) => vec![path.to_string_lossy().into_owned()],
            Argument::Overwrite(_) => vec!["-y".to_string()],
            Argument::VideoCodec(codec) => pair("-c:v", codec.as_str().to_string()),
            Argument::AudioCodec(codec) => pair("-c:a", codec.as_str().to_string()),
            Argument::Scale(Scale { width, height }) => {
                if *width == 0 || *height == 0 || *width < -2 || *height < -2 {
                    return Err(FfxError::construction(format!(
                        "invalid scale {width}:{height}"
                    )));
                }
                pair("-vf", format!("scale={width}:{height}"))
            }
            Argument::Size(Size { width, height }) => {
                if *width == 0 || *height == 0 {
                    return Err(FfxError::construction(format!(
                        "invalid size {width}x{height}"
                    )));
                }
                pair("-s", format!("{width}x{height}"))
            }
            Argument::Copy(StreamCopy(channel)) => {
                pair(&format!("-c{}", channel.suffix()), "copy".to_string())
            }
            Argument::BitStreamFilter(BitStreamFilter { channel, filter }) => pair(
                &format!("-bsf{}", channel.suffix()),
                filter.as_str().to_string(),
            ),
            Argument::ForceFormat(ForceFormat(format)) => pair("-f", format.clone()),
            Argument::Threads(threads) => pair("-threads", threads.count().to_string()),
            Argument::FrameRate(FrameRate(rate)) => {
                if !rate.is_finite() || *rate <= 0.0 {
                    return Err(FfxError::construction(format!("invalid frame rate {rate}")));
                }
                pair("-r", format_rate(*rate))
            }
            Argument::FrameOutputCount(FrameOutputCount(count)) => {
                pair("-vframes", count.to_string())
            }
            Argument::Speed(speed) => pair("-preset", speed.as_str().to_string()),
            Argument::ConstantRateFactor(ConstantRateFactor(crf)) => {
                pair("-crf", crf.to_string())
            }
            Argument::AudioBitrate(AudioBitrate(kbps)) => pair("-b:a", format!("{kbps}k")),
            Argument::PixelFormat(PixelFormat(format)) => pair("-pix_fmt", format.clone()),
            Argument::DurationLimit(DurationLimit(limit)) => pair("-t", format_timestamp(*limit)),
            Argument::ProgressPipe(_) => vec![
                "-progress".to_string(),
                "pipe:1".to_string(),
                "-nostats".to_string(),
            ],
            Argument::Custom(Custom(tokens)) => tokens.clone(),
        };

        Ok(tokens)
    }
}

fn format_rate(rate: f64) -> String {
    if rate.fract() == 0.0 {
        format!("{}", rate as u64)
    } else {
        format!("{rate}")
    }
}

impl fmt::Display for ArgumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Typed access to the payload of one argument variant.
pub trait ArgumentValue: Sized {
    const KIND: ArgumentKind;

    fn from_argument(argument: &Argument) -> Option<&Self>;
}

macro_rules! argument_value {
    ($($variant:ident => $payload:ty),* $(,)?) => {
        $(
            impl ArgumentValue for $payload {
                const KIND: ArgumentKind = ArgumentKind::$variant;

                fn from_argument(argument: &Argument) -> Option<&Self> {
                    match argument {
                        Argument::$variant(value) => Some(value),
                        _ => None,
                    }
                }
            }

            impl From<$payload> for Argument {
                fn from(value: $payload) -> Self {
                    Argument::$variant(value)
                }
            }
        )*
    };
}

argument_value! {
    Input => Input,
    Concat => ConcatArgument,
    Seek => Seek,
    Output => Output,
    Overwrite => Overwrite,
    VideoCodec => VideoCodec,
    AudioCodec => AudioCodec,
    Scale => Scale,
    Size => Size,
    Copy => StreamCopy,
    BitStreamFilter => BitStreamFilter,
    ForceFormat => ForceFormat,
    Threads => Threads,
    FrameRate => FrameRate,
    FrameOutputCount => FrameOutputCount,
    Speed => Speed,
    ConstantRateFactor => ConstantRateFactor,
    AudioBitrate => AudioBitrate,
    PixelFormat => PixelFormat,
    DurationLimit => DurationLimit,
    ProgressPipe => ProgressPipe,
    Custom => Custom,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_codec_and_filter_tokens() {
        assert_eq!(
            Argument::from(VideoCodec::LibX264).tokens().unwrap(),
            vec!["-c:v", "libx264"]
        );
        assert_eq!(
            Argument::from(BitStreamFilter {
                channel: Channel::Video,
                filter: Filter::H264Mp4ToAnnexB,
            })
            .tokens()
            .unwrap(),
            vec!["-bsf:v", "h264_mp4toannexb"]
        );
        assert_eq!(
            Argument::from(StreamCopy(Channel::Both)).tokens().unwrap(),
            vec!["-c", "copy"]
        );
        assert_eq!(
            Argument::from(Scale::from_size(VideoSize::Ed).unwrap().unwrap())
                .tokens()
                .unwrap(),
            vec!["-vf", "scale=-2:480"]
        );
        assert_eq!(
            Argument::from(FrameRate(15.0)).tokens().unwrap(),
            vec!["-r", "15"]
        );
        assert_eq!(
            Argument::from(Seek(Duration::from_millis(1500))).tokens().unwrap(),
            vec!["-ss", "00:00:01.500"]
        );
    }

    #[test]
    fn rejects_degenerate_values() {
        assert!(Argument::from(Scale::new(0, 480)).tokens().is_err());
        assert!(Argument::from(Size { width: 640, height: 0 }).tokens().is_err());
        assert!(Argument::from(FrameRate(0.0)).tokens().is_err());
    }

    #[test]
    fn scale_height_beyond_i32_is_rejected() {
        assert_eq!(Scale::to_height(720).unwrap(), Scale::new(-2, 720));
        let err = Scale::to_height(u32::MAX).unwrap_err();
        assert!(matches!(err, FfxError::Construction { .. }));
        assert_eq!(Scale::from_size(VideoSize::Original).unwrap(), None);
    }

    #[test]
    fn concat_protocol_joins_sources_in_order() {
        let concat = ConcatArgument::new(["a.ts", "b.ts"]);
        assert_eq!(
            Argument::from(concat).tokens().unwrap(),
            vec!["-i", "concat:a.ts|b.ts"]
        );
    }

    #[test]
    fn empty_concat_is_rejected() {
        let concat = ConcatArgument::new(Vec::<PathBuf>::new());
        let err = Argument::from(concat).tokens().unwrap_err();
        assert!(matches!(err, FfxError::Construction { .. }));
    }

    #[test]
    fn image_sequence_list_repeats_last_entry() {
        let concat =
            ConcatArgument::image_sequence(["one.png", "it's.png"], 4.0).with_list_file("list.txt");
        assert_eq!(concat.entries().len(), 3);
        assert_eq!(
            concat.list_file_contents(),
            "file 'one.png'\nduration 0.250000\nfile 'it'\\''s.png'\nduration 0.250000\nfile 'it'\\''s.png'\n"
        );
        assert_eq!(
            Argument::from(concat).tokens().unwrap(),
            vec!["-f", "concat", "-safe", "0", "-i", "list.txt"]
        );
    }

    #[test]
    fn durations_without_list_file_are_rejected() {
        let concat = ConcatArgument::image_sequence(["one.png"], 10.0);
        assert!(Argument::from(concat).tokens().is_err());
    }

    #[test]
    fn typed_lookup_matches_only_its_variant() {
        let argument = Argument::from(Scale::new(640, -1));
        assert_eq!(Scale::from_argument(&argument), Some(&Scale::new(640, -1)));
        assert!(Size::from_argument(&argument).is_none());
        assert_eq!(<Scale as ArgumentValue>::KIND, ArgumentKind::Scale);
    }
}

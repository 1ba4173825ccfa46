use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::error::{FfxError, Result};
use crate::core::formatter::format_media_line;
use crate::core::metadata::MediaSection;

/// Metadata describing one media file, as reported by the external tool.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub path: PathBuf,
    pub duration: Duration,
    /// `None` for audio-only media.
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f32>,
    pub video_codec: Option<String>,
    pub audio_codec: Option<String>,
    pub container: String,
    pub bitrate_kbps: Option<f32>,
    pub frame_count: Option<u64>,
}

impl MediaInfo {
    pub fn from_section(section: &MediaSection, path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            duration: section.duration.unwrap_or(Duration::ZERO),
            width: section.width,
            height: section.height,
            frame_rate: section.fps,
            video_codec: section.video_codec.clone(),
            audio_codec: section.audio_codec.clone(),
            container: section.container.clone(),
            bitrate_kbps: section.bitrate_kbps,
            frame_count: None,
        }
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.width?, self.height?))
    }

    pub fn has_video(&self) -> bool {
        self.dimensions().is_some()
    }
}

impl fmt::Display for MediaInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_media_line(self))
    }
}

/// A still image used as a frame source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

impl ImageInfo {
    /// Reads the image header for its dimensions.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(FfxError::FileSystem {
                path: path.to_path_buf(),
                message: "image does not exist".to_string(),
            });
        }
        let (width, height) = image::image_dimensions(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
        })
    }

    pub fn extension(&self) -> Option<&str> {
        self.path.extension().and_then(|ext| ext.to_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::SectionKind;

    fn section() -> MediaSection {
        MediaSection {
            kind: SectionKind::Input,
            index: 0,
            container: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            path: "in.mp4".to_string(),
            duration: Some(Duration::from_secs(5)),
            bitrate_kbps: Some(700.0),
            video_codec: Some("h264".to_string()),
            width: Some(320),
            height: Some(240),
            fps: Some(25.0),
            audio_codec: None,
        }
    }

    #[test]
    fn builds_from_section_and_formats() {
        let info = MediaInfo::from_section(&section(), Path::new("in.mp4"));
        assert_eq!(info.dimensions(), Some((320, 240)));
        assert_eq!(
            info.to_string(),
            "in.mp4 (mov,mp4,m4a,3gp,3g2,mj2/h264+none 320x240 @ 25.00fps, duration=00:00:05, bitrate=700.0 kb/s)"
        );
    }

    #[test]
    fn image_info_reads_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        image::RgbImage::new(64, 48).save(&path).unwrap();

        let info = ImageInfo::from_path(&path).unwrap();
        assert_eq!((info.width, info.height), (64, 48));
        assert_eq!(info.extension(), Some("png"));
    }

    #[test]
    fn missing_image_is_a_filesystem_error() {
        let err = ImageInfo::from_path("/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, FfxError::FileSystem { .. }));
    }
}

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FfxError {
    #[error("invalid command: {message}")]
    Construction { message: String },
    #[error("failed to launch {binary}: {source}")]
    LaunchFailed {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("ffmpeg process failed (exit_code={exit_code:?}): {stderr}")]
    NonZeroExit {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("ffmpeg process timed out after {after:?}: {stderr}")]
    TimedOut { after: Duration, stderr: String },
    #[error("ffmpeg process cancelled: {stderr}")]
    Cancelled { stderr: String },
    #[error("no duration or resolution found in tool output: {stderr}")]
    MetadataNotFound { stderr: String },
    #[error("output file {path} is unusable: {message}")]
    FileSystem { path: PathBuf, message: String },
    #[error("invalid configuration: {message}")]
    Config { message: String },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
}

impl FfxError {
    pub fn construction(message: impl Into<String>) -> Self {
        FfxError::Construction {
            message: message.into(),
        }
    }

    /// Text captured from the external tool, if this failure carries any.
    pub fn diagnostics(&self) -> Option<&str> {
        match self {
            FfxError::NonZeroExit { stderr, .. }
            | FfxError::TimedOut { stderr, .. }
            | FfxError::Cancelled { stderr }
            | FfxError::MetadataNotFound { stderr } => Some(stderr.as_str()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FfxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_are_exposed_for_tool_failures() {
        let err = FfxError::NonZeroExit {
            exit_code: Some(1),
            stderr: "Unknown encoder 'libfoo'".to_string(),
        };
        assert_eq!(err.diagnostics(), Some("Unknown encoder 'libfoo'"));
        assert!(err.to_string().contains("exit_code=Some(1)"));

        let err = FfxError::construction("empty container");
        assert_eq!(err.diagnostics(), None);
        assert_eq!(err.to_string(), "invalid command: empty container");
    }
}

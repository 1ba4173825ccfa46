use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::error::{FfxError, Result};

pub const ENV_FFMPEG_PATH: &str = "FFCORE_FFMPEG_PATH";
pub const ENV_FFPROBE_PATH: &str = "FFCORE_FFPROBE_PATH";
pub const ENV_TIMEOUT_SECS: &str = "FFCORE_TIMEOUT_SECS";

/// Where the tools live and how their processes are supervised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegConfig {
    pub ffmpeg_binary: PathBuf,
    pub ffprobe_binary: PathBuf,
    pub working_directory: Option<PathBuf>,
    /// No limit when unset.
    pub timeout_secs: Option<u64>,
    pub grace_period_ms: u64,
    pub poll_interval_ms: u64,
    pub overwrite: bool,
    pub hide_banner: bool,
    pub reject_duplicate_kinds: bool,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg_binary: PathBuf::from("ffmpeg"),
            ffprobe_binary: PathBuf::from("ffprobe"),
            working_directory: None,
            timeout_secs: None,
            grace_period_ms: 2_000,
            poll_interval_ms: 50,
            overwrite: true,
            hide_banner: true,
            reject_duplicate_kinds: false,
        }
    }
}

impl FfmpegConfig {
    /// Reads a TOML file, falling back to defaults when it is absent, then applies
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str::<FfmpegConfig>(&content).map_err(|err| FfxError::Config {
                message: format!("{}: {err}", path.display()),
            })?
        } else {
            debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };
        config.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_FFMPEG_PATH) {
            self.ffmpeg_binary = PathBuf::from(path);
        }
        if let Some(path) = lookup(ENV_FFPROBE_PATH) {
            self.ffprobe_binary = PathBuf::from(path);
        }
        if let Some(value) = lookup(ENV_TIMEOUT_SECS) {
            let secs = value.trim().parse::<u64>().map_err(|_| FfxError::Config {
                message: format!("{ENV_TIMEOUT_SECS} must be a whole number of seconds, got {value:?}"),
            })?;
            self.timeout_secs = Some(secs);
        }
        Ok(self)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = FfmpegConfig::load(Path::new("/no/such/ffcore.toml"))
            .unwrap()
            .with_overrides(|_| None)
            .unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert!(config.overwrite);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ffcore.toml");
        std::fs::write(
            &path,
            "ffmpeg_binary = \"/opt/ffmpeg/bin/ffmpeg\"\ntimeout_secs = 30\nreject_duplicate_kinds = true\n",
        )
        .unwrap();

        let config: FfmpegConfig = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.ffmpeg_binary, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.timeout(), Some(Duration::from_secs(30)));
        assert!(config.reject_duplicate_kinds);
        assert_eq!(config.ffprobe_binary, PathBuf::from("ffprobe"));
        assert_eq!(config.grace_period(), Duration::from_secs(2));
    }

    #[test]
    fn overrides_replace_binaries_and_timeout() {
        let config = FfmpegConfig::default()
            .with_overrides(|key| match key {
                ENV_FFMPEG_PATH => Some("/usr/local/bin/ffmpeg".to_string()),
                ENV_TIMEOUT_SECS => Some("12".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.ffmpeg_binary, PathBuf::from("/usr/local/bin/ffmpeg"));
        assert_eq!(config.timeout_secs, Some(12));
    }

    #[test]
    fn bad_timeout_override_is_a_config_error() {
        let err = FfmpegConfig::default()
            .with_overrides(|key| (key == ENV_TIMEOUT_SECS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, FfxError::Config { .. }));
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "timeout_secs = \"thirty\"").unwrap();
        assert!(matches!(
            FfmpegConfig::load(&path),
            Err(FfxError::Config { .. })
        ));
    }
}

//! Typed ffmpeg command construction and supervised execution.
//!
//! Build an [`ArgumentContainer`], render it with a [`Renderer`], and run it under a
//! [`Supervisor`], or use the [`Encoder`] for the common operations.

pub mod core;

pub use crate::core::argument::{
    Argument, ArgumentKind, ArgumentValue, AudioCodec, Channel, ConcatArgument, VideoCodec,
    VideoSize, VideoType,
};
pub use crate::core::config::FfmpegConfig;
pub use crate::core::container::ArgumentContainer;
pub use crate::core::encoder::Encoder;
pub use crate::core::error::{FfxError, Result};
pub use crate::core::event::FfmpegEvent;
pub use crate::core::media::{ImageInfo, MediaInfo};
pub use crate::core::progress::FfmpegProgress;
pub use crate::core::render::{CommandLine, Renderer};
pub use crate::core::runner::{CancellationToken, ExecOptions, ProcessResult, Supervisor};

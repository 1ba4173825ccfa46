use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;
use tracing::{error, info, trace, warn};

use crate::core::argument::{
    Argument, AudioCodec, BitStreamFilter, Channel, ConcatArgument, Custom, Filter, ForceFormat,
    FrameOutputCount, FrameRate, Overwrite, PixelFormat, Scale, Seek, Size, StreamCopy, Threads,
    VideoCodec, VideoSize, VideoType,
};
use crate::core::cleanup::{ConcatList, OutputGuard};
use crate::core::config::FfmpegConfig;
use crate::core::container::ArgumentContainer;
use crate::core::error::{FfxError, Result};
use crate::core::formatter::{format_progress_line, format_summary_line};
use crate::core::job::{Job, JobStatus, OperationKind};
use crate::core::media::{ImageInfo, MediaInfo};
use crate::core::progress::FfmpegProgress;
use crate::core::render::{render_tokens, Renderer};
use crate::core::runner::{CancellationToken, ExecOptions, ProcessResult, Supervisor};

/// Allowed drift between expected and probed durations before a warning is logged.
pub const DURATION_TOLERANCE: Duration = Duration::from_millis(500);

type ProgressCallback = Arc<dyn Fn(&FfmpegProgress) + Send + Sync>;

/// High-level operations over the external tool. Each call owns its own process and
/// temporary files; an `Encoder` can be shared freely between threads.
#[derive(Clone)]
pub struct Encoder {
    config: FfmpegConfig,
    renderer: Renderer,
    ffmpeg: Supervisor,
    ffprobe: Supervisor,
    exec: ExecOptions,
    on_progress: Option<ProgressCallback>,
}

impl Encoder {
    pub fn new(config: FfmpegConfig) -> Self {
        Self {
            renderer: Renderer::from_config(&config),
            ffmpeg: Supervisor::ffmpeg(&config),
            ffprobe: Supervisor::ffprobe(&config),
            exec: ExecOptions::from_config(&config),
            config,
            on_progress: None,
        }
    }

    pub fn config(&self) -> &FfmpegConfig {
        &self.config
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.exec.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.exec.cancel = Some(cancel);
        self
    }

    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&FfmpegProgress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Reads media info for `path` with the probe binary.
    pub fn probe(&self, path: impl AsRef<Path>) -> Result<MediaInfo> {
        let path = path.as_ref();
        let mut job = Job::new(OperationKind::Probe);
        let outcome = self.probe_inner(&mut job, path);
        self.settle(&mut job, outcome)
    }

    /// Transcodes `input` into `output` using the defaults for `video_type`.
    pub fn convert(
        &self,
        input: &MediaInfo,
        output: impl AsRef<Path>,
        video_type: VideoType,
        size: VideoSize,
        multithreaded: bool,
    ) -> Result<MediaInfo> {
        let output = output.as_ref();
        let mut container = ArgumentContainer::new().with(Argument::input(&input.path));

        if multithreaded {
            container.add(Threads::Auto);
        }
        let scale = Scale::from_size(size)?;
        if let Some(scale) = scale {
            container.add(scale);
        }

        match video_type {
            VideoType::Mp4 => {
                container.add(VideoCodec::LibX264);
                container.add(PixelFormat("yuv420p".to_string()));
                container.add(AudioCodec::Aac);
            }
            VideoType::Ts => {
                let h264 = input.video_codec.as_deref() == Some("h264");
                if scale.is_none() && h264 {
                    container.add(StreamCopy(Channel::Both));
                    container.add(BitStreamFilter {
                        channel: Channel::Video,
                        filter: Filter::H264Mp4ToAnnexB,
                    });
                } else {
                    container.add(VideoCodec::LibX264);
                    container.add(PixelFormat("yuv420p".to_string()));
                    container.add(AudioCodec::Aac);
                }
                container.add(ForceFormat("mpegts".to_string()));
            }
            VideoType::Ogv => {
                container.add(VideoCodec::LibTheora);
                container.add(AudioCodec::LibVorbis);
            }
            VideoType::WebM => {
                container.add(VideoCodec::LibVpx);
                container.add(AudioCodec::LibVorbis);
            }
        }
        container.add(Argument::output(output));

        let result = self.convert_with(container)?;
        check_duration(input.duration, result.duration, &result.path);
        Ok(result)
    }

    /// Runs a caller-built container and probes the file it produced.
    pub fn convert_with(&self, container: ArgumentContainer) -> Result<MediaInfo> {
        let mut job = Job::new(OperationKind::Convert);
        let outcome = self.convert_inner(&mut job, container);
        self.settle(&mut job, outcome)
    }

    /// Extracts one frame of `input` at `at` (a third of the way in by default).
    pub fn snapshot(
        &self,
        input: &MediaInfo,
        output: impl AsRef<Path>,
        at: Option<Duration>,
    ) -> Result<DynamicImage> {
        let mut job = Job::new(OperationKind::Snapshot);
        let outcome = self.snapshot_inner(&mut job, input, output.as_ref(), None, at);
        self.settle(&mut job, outcome)
    }

    /// Like [`Encoder::snapshot`], resized to `size`.
    pub fn snapshot_scaled(
        &self,
        input: &MediaInfo,
        output: impl AsRef<Path>,
        size: Size,
        at: Option<Duration>,
    ) -> Result<DynamicImage> {
        let mut job = Job::new(OperationKind::Snapshot);
        let outcome = self.snapshot_inner(&mut job, input, output.as_ref(), Some(size), at);
        self.settle(&mut job, outcome)
    }

    /// Concatenates `inputs` in order without re-encoding.
    pub fn join(&self, output: impl AsRef<Path>, inputs: &[MediaInfo]) -> Result<MediaInfo> {
        let mut job = Job::new(OperationKind::Join);
        let outcome = self.join_inner(&mut job, output.as_ref(), inputs);
        self.settle(&mut job, outcome)
    }

    /// Builds a video showing each image for one frame at `frame_rate`.
    pub fn join_image_sequence(
        &self,
        output: impl AsRef<Path>,
        frame_rate: f64,
        images: &[ImageInfo],
    ) -> Result<MediaInfo> {
        let mut job = Job::new(OperationKind::JoinImageSequence);
        let outcome = self.join_images_inner(&mut job, output.as_ref(), frame_rate, images);
        self.settle(&mut job, outcome)
    }

    fn probe_inner(&self, job: &mut Job, path: &Path) -> Result<MediaInfo> {
        let path = self.resolve(path)?;
        let path = path.as_path();
        if !path.exists() {
            return Err(FfxError::FileSystem {
                path: path.to_path_buf(),
                message: "file does not exist".to_string(),
            });
        }

        job.advance(JobStatus::Rendering);
        let line = render_tokens(&["-hide_banner".to_string(), path.to_string_lossy().into_owned()])?;

        job.advance(JobStatus::Executing);
        let result = self.ffprobe.execute(&line, &self.exec)?.into_result()?;

        job.advance(JobStatus::Parsing);
        result.media_info(path)
    }

    fn convert_inner(&self, job: &mut Job, mut container: ArgumentContainer) -> Result<MediaInfo> {
        let output = container
            .output_path()
            .ok_or_else(|| FfxError::construction("argument container has no output"))
            .and_then(|output| self.resolve(output))?;
        container.replace_output(&output);
        let mut guard = OutputGuard::new(&output, self.overwrites(&container));

        let expected = container
            .effective::<Scale>()
            .map(|scale| {
                (
                    u32::try_from(scale.width).ok(),
                    u32::try_from(scale.height).ok(),
                )
            })
            .or_else(|| {
                container
                    .effective::<Size>()
                    .map(|size| (Some(size.width), Some(size.height)))
            });

        self.run(job, self.with_globals(container))?;
        let info = self.probe_output(&output)?;
        if let Some(expected) = expected {
            check_dimensions(expected, &info);
        }

        guard.keep();
        Ok(info)
    }

    fn snapshot_inner(
        &self,
        job: &mut Job,
        input: &MediaInfo,
        output: &Path,
        size: Option<Size>,
        at: Option<Duration>,
    ) -> Result<DynamicImage> {
        let (width, height) = input.dimensions().ok_or_else(|| {
            FfxError::construction(format!("{} has no video stream", input.path.display()))
        })?;
        let at = at.unwrap_or(input.duration / 3);
        let output = self.resolve(output)?;
        let output = output.as_path();
        let mut guard = OutputGuard::new(output, self.config.overwrite);

        let mut container = ArgumentContainer::new()
            .with(Seek(at))
            .with(Argument::input(&input.path))
            .with(FrameOutputCount(1));
        if let Some(size) = size {
            container.add(size);
        }
        container.add(Custom(vec!["-update".to_string(), "1".to_string()]));
        container.add(Argument::output(output));

        self.run(job, self.with_globals(container))?;
        let image = image::open(output)?;

        let expected = size.map_or((width, height), |size| (size.width, size.height));
        if (image.width(), image.height()) != expected {
            warn!(
                expected = ?expected,
                actual = ?(image.width(), image.height()),
                "snapshot dimensions differ from request"
            );
        }

        guard.keep();
        Ok(image)
    }

    fn join_inner(&self, job: &mut Job, output: &Path, inputs: &[MediaInfo]) -> Result<MediaInfo> {
        let first = inputs
            .first()
            .ok_or_else(|| FfxError::construction("join needs at least one input"))?;
        let output = self.resolve(output)?;
        let output = output.as_path();
        let mut guard = OutputGuard::new(output, self.config.overwrite);

        let paths = inputs
            .iter()
            .map(|input| self.existing_absolute(&input.path))
            .collect::<Result<Vec<_>>>()?;
        let concat = ConcatArgument::new(paths);
        let list = ConcatList::create(&concat.list_file_contents())?;

        let container = ArgumentContainer::new()
            .with(concat.with_list_file(list.path()))
            .with(StreamCopy(Channel::Both))
            .with(Argument::output(output));

        self.run(job, self.with_globals(container))?;
        drop(list);
        let info = self.probe_output(output)?;

        let expected: Duration = inputs.iter().map(|input| input.duration).sum();
        check_duration(expected, info.duration, output);
        if info.dimensions() != first.dimensions() {
            warn!(
                expected = ?first.dimensions(),
                actual = ?info.dimensions(),
                "joined dimensions differ from first input"
            );
        }

        guard.keep();
        Ok(info)
    }

    fn join_images_inner(
        &self,
        job: &mut Job,
        output: &Path,
        frame_rate: f64,
        images: &[ImageInfo],
    ) -> Result<MediaInfo> {
        let first = images
            .first()
            .ok_or_else(|| FfxError::construction("image sequence is empty"))?;
        if !frame_rate.is_finite() || frame_rate <= 0.0 {
            return Err(FfxError::construction(format!(
                "invalid frame rate {frame_rate}"
            )));
        }
        let output = self.resolve(output)?;
        let output = output.as_path();
        let mut guard = OutputGuard::new(output, self.config.overwrite);

        let paths = images
            .iter()
            .map(|image| self.existing_absolute(&image.path))
            .collect::<Result<Vec<_>>>()?;
        let concat = ConcatArgument::image_sequence(paths, frame_rate);
        let list = ConcatList::create(&concat.list_file_contents())?;

        let container = ArgumentContainer::new()
            .with(concat.with_list_file(list.path()))
            .with(Size {
                width: first.width,
                height: first.height,
            })
            .with(FrameRate(frame_rate))
            .with(FrameOutputCount(images.len() as u64))
            .with(VideoCodec::LibX264)
            .with(PixelFormat("yuv420p".to_string()))
            .with(Argument::output(output));

        self.run(job, self.with_globals(container))?;
        drop(list);
        let info = self.probe_output(output)?;

        let expected = Duration::from_secs_f64(images.len() as f64 / frame_rate);
        check_duration(expected, info.duration, output);

        guard.keep();
        Ok(info)
    }

    /// Render, execute and check one container. Leaves the job in `Parsing`.
    fn run(&self, job: &mut Job, container: ArgumentContainer) -> Result<ProcessResult> {
        job.advance(JobStatus::Rendering);
        let line = self.renderer.render(&container)?;

        job.advance(JobStatus::Executing);
        info!(job = job.id, kind = ?job.kind, command = %line, "running ffmpeg");
        let mut process = self.ffmpeg.spawn(&line, &self.exec)?;
        for progress in process.progress() {
            if let Some(text) = format_progress_line(&progress, None) {
                trace!(job = job.id, "{text}");
            }
            if let Some(callback) = &self.on_progress {
                callback(&progress);
            }
        }
        let result = process.wait().into_result()?;
        if let Some(summary) = &result.report.summary {
            info!(job = job.id, summary = %format_summary_line(summary), "encode finished");
        }

        job.advance(JobStatus::Parsing);
        if let Some(output) = container.output_path() {
            verify_output(output)?;
        }
        Ok(result)
    }

    fn probe_output(&self, output: &Path) -> Result<MediaInfo> {
        let line = render_tokens(&[
            "-hide_banner".to_string(),
            output.to_string_lossy().into_owned(),
        ])?;
        self.ffprobe
            .execute(&line, &self.exec)?
            .into_result()?
            .media_info(output)
    }

    /// Prepends the overwrite policy unless the caller already chose one.
    fn with_globals(&self, container: ArgumentContainer) -> ArgumentContainer {
        if container.find::<Overwrite>().is_some() {
            return container;
        }
        let mut globals = ArgumentContainer::new();
        if self.config.overwrite {
            globals.add(Overwrite);
        } else {
            globals.add(Custom(vec!["-n".to_string()]));
        }
        globals.extend(container);
        globals
    }

    /// Whether the rendered command lets the tool replace an existing output.
    fn overwrites(&self, container: &ArgumentContainer) -> bool {
        self.config.overwrite || container.find::<Overwrite>().is_some()
    }

    /// Anchors a relative path at the directory the tool runs in.
    fn resolve(&self, path: &Path) -> Result<PathBuf> {
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        let base = match &self.config.working_directory {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => std::env::current_dir()?.join(dir),
            None => std::env::current_dir()?,
        };
        Ok(base.join(path))
    }

    fn existing_absolute(&self, path: &Path) -> Result<PathBuf> {
        let absolute = self.resolve(path)?;
        if !absolute.is_file() {
            return Err(FfxError::FileSystem {
                path: absolute,
                message: "input does not exist".to_string(),
            });
        }
        Ok(absolute)
    }

    fn settle<T>(&self, job: &mut Job, outcome: Result<T>) -> Result<T> {
        match &outcome {
            Ok(_) => {
                job.advance(JobStatus::Complete);
                info!(
                    job = job.id,
                    kind = ?job.kind,
                    elapsed_ms = job.elapsed().as_millis() as u64,
                    "operation complete"
                );
            }
            Err(err) => {
                job.fail();
                error!(job = job.id, kind = ?job.kind, error = %err, "operation failed");
            }
        }
        outcome
    }
}

fn verify_output(output: &Path) -> Result<()> {
    match fs::metadata(output) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => Err(FfxError::FileSystem {
            path: output.to_path_buf(),
            message: "empty after a successful exit".to_string(),
        }),
        Err(err) => Err(FfxError::FileSystem {
            path: output.to_path_buf(),
            message: format!("missing after a successful exit: {err}"),
        }),
    }
}

fn check_duration(expected: Duration, actual: Duration, path: &Path) {
    let drift = if expected > actual {
        expected - actual
    } else {
        actual - expected
    };
    if drift > DURATION_TOLERANCE {
        warn!(
            path = %path.display(),
            expected_ms = expected.as_millis() as u64,
            actual_ms = actual.as_millis() as u64,
            "output duration drifted"
        );
    }
}

fn check_dimensions(expected: (Option<u32>, Option<u32>), info: &MediaInfo) {
    let fits = |want: Option<u32>, got: Option<u32>| want.map_or(true, |want| got == Some(want));
    if !(fits(expected.0, info.width) && fits(expected.1, info.height)) {
        warn!(
            path = %info.path.display(),
            requested = ?expected,
            actual = ?info.dimensions(),
            "output dimensions differ from request"
        );
    }
}

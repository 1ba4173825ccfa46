use std::collections::VecDeque;
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::core::config::FfmpegConfig;
use crate::core::error::{FfxError, Result};
use crate::core::event::FfmpegEvent;
use crate::core::media::MediaInfo;
use crate::core::parser::{OutputParser, ParseReport, StreamKind};
use crate::core::progress::FfmpegProgress;
use crate::core::render::CommandLine;

/// Shared flag a caller flips to stop a running process.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-invocation execution settings.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub working_directory: Option<PathBuf>,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl ExecOptions {
    pub fn from_config(config: &FfmpegConfig) -> Self {
        Self {
            working_directory: config.working_directory.clone(),
            timeout: config.timeout(),
            cancel: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }
}

#[derive(Debug)]
pub enum Termination {
    Success,
    NonZeroExit(Option<i32>),
    TimedOut(Duration),
    Cancelled,
    LaunchFailed(io::Error),
}

impl Termination {
    pub fn is_success(&self) -> bool {
        matches!(self, Termination::Success)
    }

    fn from_status(status: ExitStatus) -> Self {
        if status.success() {
            Termination::Success
        } else {
            Termination::NonZeroExit(status.code())
        }
    }
}

/// Outcome of one supervised process with everything it wrote.
#[derive(Debug)]
pub struct ProcessResult {
    pub binary: PathBuf,
    pub termination: Termination,
    pub stdout: String,
    pub stderr: String,
    pub report: ParseReport,
    pub elapsed: Duration,
}

impl ProcessResult {
    /// Maps anything but a clean exit into the matching [`FfxError`].
    pub fn into_result(self) -> Result<Self> {
        let ProcessResult {
            binary,
            termination,
            stdout,
            stderr,
            report,
            elapsed,
        } = self;
        match termination {
            Termination::Success => Ok(ProcessResult {
                binary,
                termination: Termination::Success,
                stdout,
                stderr,
                report,
                elapsed,
            }),
            Termination::NonZeroExit(exit_code) => Err(FfxError::NonZeroExit { exit_code, stderr }),
            Termination::TimedOut(after) => Err(FfxError::TimedOut { after, stderr }),
            Termination::Cancelled => Err(FfxError::Cancelled { stderr }),
            Termination::LaunchFailed(source) => Err(FfxError::LaunchFailed { binary, source }),
        }
    }

    pub fn media_info(&self, path: &Path) -> Result<MediaInfo> {
        self.report
            .media_info(path)
            .ok_or_else(|| FfxError::MetadataNotFound {
                stderr: self.stderr.clone(),
            })
    }
}

/// Owns the lifecycle of child processes for one binary.
#[derive(Debug, Clone)]
pub struct Supervisor {
    binary: PathBuf,
    grace_period: Duration,
    poll_interval: Duration,
}

impl Supervisor {
    pub fn new(binary: impl Into<PathBuf>, grace_period: Duration, poll_interval: Duration) -> Self {
        Self {
            binary: binary.into(),
            grace_period,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    pub fn ffmpeg(config: &FfmpegConfig) -> Self {
        Self::new(
            &config.ffmpeg_binary,
            config.grace_period(),
            config.poll_interval(),
        )
    }

    pub fn ffprobe(config: &FfmpegConfig) -> Self {
        Self::new(
            &config.ffprobe_binary,
            config.grace_period(),
            config.poll_interval(),
        )
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Starts the process and hands back a lazy event stream over its output.
    pub fn spawn(&self, line: &CommandLine, options: &ExecOptions) -> Result<RunningProcess> {
        let args = line.to_args()?;

        let mut cmd = Command::new(&self.binary);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &options.working_directory {
            cmd.current_dir(dir);
        }

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|source| {
            error!(binary = %self.binary.display(), %source, "failed to launch process");
            FfxError::LaunchFailed {
                binary: self.binary.clone(),
                source,
            }
        })?;
        debug!(
            binary = %self.binary.display(),
            pid = child.id(),
            command = %line,
            "process started"
        );

        let (line_tx, line_rx) = mpsc::channel::<(StreamKind, String)>();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(StreamKind::Stdout, stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(StreamKind::Stderr, stderr, line_tx.clone()));
        }
        drop(line_tx);

        Ok(RunningProcess {
            binary: self.binary.clone(),
            stdin: child.stdin.take(),
            child,
            lines: line_rx,
            readers,
            parser: OutputParser::new(),
            pending: VecDeque::new(),
            stdout_log: String::new(),
            stderr_log: String::new(),
            started,
            timeout: options.timeout,
            deadline: options.timeout.map(|timeout| started + timeout),
            cancel: options.cancel.clone(),
            grace_period: self.grace_period,
            poll_interval: self.poll_interval,
            termination: None,
            streams_closed: false,
            reaped: false,
        })
    }

    /// Runs the process to completion. Never returns before both streams are drained
    /// and the child has been reaped. A binary that cannot be started is reported as
    /// [`Termination::LaunchFailed`]; a command line that cannot be split is an `Err`.
    pub fn execute(&self, line: &CommandLine, options: &ExecOptions) -> Result<ProcessResult> {
        match self.spawn(line, options) {
            Ok(process) => Ok(process.wait()),
            Err(FfxError::LaunchFailed { binary, source }) => Ok(ProcessResult {
                binary,
                termination: Termination::LaunchFailed(source),
                stdout: String::new(),
                stderr: String::new(),
                report: ParseReport::default(),
                elapsed: Duration::ZERO,
            }),
            Err(other) => Err(other),
        }
    }
}

/// A live child process. Iterating yields parsed events until the process has exited;
/// the sequence cannot be restarted. Dropping it kills and reaps the child.
pub struct RunningProcess {
    binary: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
    lines: Receiver<(StreamKind, String)>,
    readers: Vec<thread::JoinHandle<()>>,
    parser: OutputParser,
    pending: VecDeque<FfmpegEvent>,
    stdout_log: String,
    stderr_log: String,
    started: Instant,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    cancel: Option<CancellationToken>,
    grace_period: Duration,
    poll_interval: Duration,
    termination: Option<Termination>,
    streams_closed: bool,
    reaped: bool,
}

impl RunningProcess {
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Progress updates only, borrowed so the result can still be collected.
    pub fn progress(&mut self) -> impl Iterator<Item = FfmpegProgress> + '_ {
        self.by_ref().filter_map(|event| match event {
            FfmpegEvent::Progress(progress) => Some(progress),
            _ => None,
        })
    }

    pub fn report(&self) -> &ParseReport {
        self.parser.report()
    }

    /// Drains the remaining events and returns the classified outcome.
    pub fn wait(mut self) -> ProcessResult {
        while self.next().is_some() {}

        let termination = self
            .termination
            .take()
            .unwrap_or(Termination::NonZeroExit(None));
        ProcessResult {
            binary: self.binary.clone(),
            termination,
            stdout: std::mem::take(&mut self.stdout_log),
            stderr: std::mem::take(&mut self.stderr_log),
            report: std::mem::take(&mut self.parser).into_report(),
            elapsed: self.started.elapsed(),
        }
    }

    fn step(&mut self) {
        if let Some(reason) = self.interrupt_reason() {
            self.terminate(reason);
            return;
        }

        if !self.streams_closed {
            match self.lines.recv_timeout(self.poll_interval) {
                Ok((stream, line)) => self.handle_line(stream, line),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    self.streams_closed = true;
                    for reader in self.readers.drain(..) {
                        let _ = reader.join();
                    }
                }
            }
            return;
        }

        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.reaped = true;
                self.finish(Termination::from_status(status));
            }
            Ok(None) => thread::sleep(self.poll_interval),
            Err(err) => {
                warn!(pid = self.child.id(), %err, "failed to poll process status");
                self.stderr_log.push_str(&format!("{err}\n"));
                self.kill_and_reap();
                self.finish(Termination::NonZeroExit(None));
            }
        }
    }

    fn interrupt_reason(&self) -> Option<Termination> {
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Some(Termination::Cancelled);
        }
        match (self.deadline, self.timeout) {
            (Some(deadline), Some(timeout)) if Instant::now() >= deadline => {
                Some(Termination::TimedOut(timeout))
            }
            _ => None,
        }
    }

    fn handle_line(&mut self, stream: StreamKind, line: String) {
        let log = match stream {
            StreamKind::Stdout => &mut self.stdout_log,
            StreamKind::Stderr => &mut self.stderr_log,
        };
        log.push_str(&line);
        log.push('\n');

        for event in self.parser.push_line(stream, &line) {
            if let FfmpegEvent::Prompt(prompt) = &event {
                warn!(prompt = %prompt, "declining interactive prompt");
                self.send_stdin(b"n\n");
            }
            self.pending.push_back(event);
        }
    }

    fn send_stdin(&mut self, bytes: &[u8]) {
        if let Some(stdin) = self.stdin.as_mut() {
            if stdin.write_all(bytes).and_then(|_| stdin.flush()).is_err() {
                self.stdin = None;
            }
        }
    }

    /// Asks the tool to quit, waits out the grace period, then kills it.
    fn terminate(&mut self, reason: Termination) {
        warn!(pid = self.child.id(), ?reason, "stopping process");

        self.send_stdin(b"q");
        self.stdin = None;

        let grace_deadline = Instant::now() + self.grace_period;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => {
                    self.reaped = true;
                    break;
                }
                Ok(None) if Instant::now() < grace_deadline => thread::sleep(self.poll_interval),
                _ => {
                    warn!(pid = self.child.id(), "grace period elapsed, killing process");
                    self.kill_and_reap();
                    break;
                }
            }
        }

        self.drain_remaining();
        self.finish(reason);
    }

    fn kill_and_reap(&mut self) {
        if self.reaped {
            return;
        }
        if let Err(err) = self.child.kill() {
            debug!(pid = self.child.id(), %err, "kill failed");
        }
        let _ = self.child.wait();
        self.reaped = true;
    }

    /// Collects lines still buffered after the child is gone.
    fn drain_remaining(&mut self) {
        if self.streams_closed {
            return;
        }
        loop {
            match self.lines.recv_timeout(self.grace_period.max(self.poll_interval)) {
                Ok((stream, line)) => self.handle_line(stream, line),
                Err(RecvTimeoutError::Disconnected) => {
                    self.streams_closed = true;
                    for reader in self.readers.drain(..) {
                        let _ = reader.join();
                    }
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(pid = self.child.id(), "output streams still open after exit");
                    break;
                }
            }
        }
    }

    fn finish(&mut self, termination: Termination) {
        self.stdin = None;
        self.pending.extend(self.parser.finish());
        info!(
            binary = %self.binary.display(),
            pid = self.child.id(),
            ?termination,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "process finished"
        );
        self.termination = Some(termination);
    }
}

impl Iterator for RunningProcess {
    type Item = FfmpegEvent;

    fn next(&mut self) -> Option<FfmpegEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.termination.is_some() {
                return None;
            }
            self.step();
        }
    }
}

impl Drop for RunningProcess {
    fn drop(&mut self) {
        if !self.reaped {
            warn!(pid = self.child.id(), "dropping live process, killing it");
            self.stdin = None;
            self.kill_and_reap();
        }
    }
}

fn spawn_line_reader<R: Read + Send + 'static>(
    stream: StreamKind,
    reader: R,
    sender: Sender<(StreamKind, String)>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut line_buf: Vec<u8> = Vec::new();
        let mut byte = [0u8; 1];

        let flush = |line_buf: &mut Vec<u8>| {
            let line = String::from_utf8_lossy(line_buf)
                .trim_matches(&['\r', '\n'][..])
                .to_string();
            line_buf.clear();
            if !line.is_empty() {
                let _ = sender.send((stream, line));
            }
        };

        loop {
            match reader.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }

            match byte[0] {
                b'\r' | b'\n' => {
                    if !line_buf.is_empty() {
                        flush(&mut line_buf);
                    }
                }
                other => {
                    line_buf.push(other);
                    // the overwrite prompt is written without a line ending
                    if line_buf.ends_with(b"[y/N] ") {
                        flush(&mut line_buf);
                    }
                }
            }
        }

        if !line_buf.is_empty() {
            flush(&mut line_buf);
        }
    })
}

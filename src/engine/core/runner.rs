// Running ffmpeg. The pipeline only talks to the `Transcoder` trait so
// tests can script exit codes, stderr and output sizes.

use super::error::Result;
use super::ffmpeg_cmd::CommandSpec;
use super::log::write_debug_log;
use super::types::PassProgress;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tracing::{debug, warn};

/// What a finished child process left behind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutput {
    pub success: bool,
    /// Human-readable exit status, e.g. `exit status: 1`
    pub status: String,
    pub stdout: String,
    pub stderr: String,
}

impl RunOutput {
    fn from_status(status: ExitStatus, stdout: String, stderr: String) -> Self {
        Self {
            success: status.success(),
            status: status.to_string(),
            stdout,
            stderr,
        }
    }

    /// stdout followed by stderr, for scanners that don't care which
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }
}

/// Executes transcoding commands.
///
/// A non-zero exit is reported through [`RunOutput::success`], not as `Err`;
/// `Err` means the process couldn't be run at all.
pub trait Transcoder {
    /// Run to completion, capturing stdout and stderr
    fn run(&self, cmd: &CommandSpec) -> Result<RunOutput>;

    /// Run a long encode, reporting `-progress` lines as they arrive.
    ///
    /// The default just calls [`Transcoder::run`] and never reports progress.
    fn run_with_progress(
        &self,
        cmd: &CommandSpec,
        _on_progress: &mut dyn FnMut(&PassProgress),
    ) -> Result<RunOutput> {
        self.run(cmd)
    }
}

/// Runs the real ffmpeg binary
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegRunner;

impl FfmpegRunner {
    pub fn new() -> Self {
        Self
    }
}

/// Wraps another transcoder and appends every command, and the stderr of
/// every failure, to a debug transcript
pub struct LoggedTranscoder<'a> {
    inner: &'a dyn Transcoder,
    log_path: PathBuf,
}

impl<'a> LoggedTranscoder<'a> {
    pub fn new(inner: &'a dyn Transcoder, log_path: PathBuf) -> Self {
        Self { inner, log_path }
    }

    /// A transcript that can't be written never fails the encode
    fn log(&self, message: &str) {
        if let Err(e) = write_debug_log(&self.log_path, message) {
            warn!(error = %e, path = %self.log_path.display(), "could not append to debug transcript");
        }
    }

    fn log_result(&self, output: &RunOutput) {
        if !output.success {
            self.log(&format!("{}\n{}", output.status, output.stderr.trim_end()));
        }
    }
}

impl Transcoder for LoggedTranscoder<'_> {
    fn run(&self, cmd: &CommandSpec) -> Result<RunOutput> {
        self.log(&cmd.to_string());
        let output = self.inner.run(cmd)?;
        self.log_result(&output);
        Ok(output)
    }

    fn run_with_progress(
        &self,
        cmd: &CommandSpec,
        on_progress: &mut dyn FnMut(&PassProgress),
    ) -> Result<RunOutput> {
        self.log(&cmd.to_string());
        let output = self.inner.run_with_progress(cmd, on_progress)?;
        self.log_result(&output);
        Ok(output)
    }
}

impl Transcoder for FfmpegRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<RunOutput> {
        debug!(command = %cmd, "running");

        let output = cmd.to_command().stdin(Stdio::null()).output()?;
        Ok(RunOutput::from_status(
            output.status,
            String::from_utf8_lossy(&output.stdout).into_owned(),
            String::from_utf8_lossy(&output.stderr).into_owned(),
        ))
    }

    fn run_with_progress(
        &self,
        cmd: &CommandSpec,
        on_progress: &mut dyn FnMut(&PassProgress),
    ) -> Result<RunOutput> {
        debug!(command = %cmd, "running with progress");

        let mut command = cmd.to_command();
        command.stdin(Stdio::null());
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = command.spawn()?;

        // Drain stderr on its own thread so a chatty encoder can't stall on a
        // full pipe while we read progress from stdout
        let stderr = child.stderr.take();
        let stderr_thread = std::thread::spawn(move || {
            let mut stderr_output = String::new();
            if let Some(stderr) = stderr {
                let reader = BufReader::new(stderr);
                for line in reader.lines().map_while(std::result::Result::ok) {
                    stderr_output.push_str(&line);
                    stderr_output.push('\n');
                }
            }
            stderr_output
        });

        let mut stdout_output = String::new();
        let mut progress = PassProgress::new();
        if let Some(stdout) = child.stdout.take() {
            let reader = BufReader::new(stdout);
            for line in reader.lines().map_while(std::result::Result::ok) {
                progress.feed(&line);
                on_progress(&progress);
                stdout_output.push_str(&line);
                stdout_output.push('\n');
            }
        }

        let status = child.wait()?;
        let stderr_output = stderr_thread
            .join()
            .unwrap_or_else(|_| "Failed to capture stderr".to_string());

        Ok(RunOutput::from_status(status, stdout_output, stderr_output))
    }
}

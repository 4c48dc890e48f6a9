// ffmpeg command lines for every stage of the pipeline. Builders only
// assemble arguments; running them is the transcoder's job.

use super::filters::{AudioFilter, render_audio_filters};
use super::segments::SegmentGraph;
use super::timestamp::format_timestamp;
use super::types::{Channels, ClipWindow, Codec, EncodeJob, Pass};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// A program plus its arguments, inspectable before it is run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<OsString>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// `ffmpeg -hide_banner -y`
    pub fn ffmpeg() -> Self {
        Self::new("ffmpeg").args(["-hide_banner", "-y"])
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn push(&mut self, arg: impl Into<OsString>) {
        self.args.push(arg.into());
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// True when any argument equals `needle`
    pub fn has_arg(&self, needle: &str) -> bool {
        self.args.iter().any(|a| a == needle)
    }

    /// Value following the first occurrence of `flag`
    pub fn value_of(&self, flag: &str) -> Option<String> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(|v| v.to_string_lossy().into_owned())
    }
}

/// Shell-like rendering for logs, quoting arguments with spaces
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            let s = arg.to_string_lossy();
            if s.contains(' ') {
                write!(f, " \"{}\"", s)?;
            } else {
                write!(f, " {}", s)?;
            }
        }
        Ok(())
    }
}

pub fn null_output_target() -> &'static str {
    if cfg!(windows) { "NUL" } else { "/dev/null" }
}

/// Append user-provided ffmpeg arguments using shell-style splitting so
/// quoted strings with spaces survive.
pub fn apply_additional_args(cmd: &mut CommandSpec, additional_args: &str) {
    if additional_args.trim().is_empty() {
        return;
    }

    match shlex::split(additional_args) {
        Some(args) => cmd.args.extend(args.into_iter().map(OsString::from)),
        // Unbalanced quotes: fall back to plain whitespace
        None => cmd
            .args
            .extend(additional_args.split_whitespace().map(OsString::from)),
    }
}

/// Two-pass statistics prefix inside the invocation's working directory
pub fn two_pass_log_prefix(work_dir: &Path) -> PathBuf {
    work_dir.join("ffmpeg2pass")
}

fn push_window(cmd: &mut CommandSpec, window: &ClipWindow) {
    if window.full {
        return;
    }
    cmd.push("-ss");
    cmd.push(format_timestamp(window.start_s));
    cmd.push("-t");
    cmd.push(format_timestamp(window.duration_s));
}

fn push_input(cmd: &mut CommandSpec, input: &Path, window: &ClipWindow) {
    push_window(cmd, window);
    cmd.push("-i");
    cmd.push(input);
}

fn push_channels(cmd: &mut CommandSpec, channels: Channels) {
    if let Some(ac) = channels.ac_arg() {
        cmd.push("-ac");
        cmd.push(ac);
    }
}

/// Stand-alone audio render used to measure the exact audio size
pub struct AudioRenderArgs<'a> {
    pub input: &'a Path,
    pub window: ClipWindow,
    pub codec: Codec,
    pub bitrate_kbps: u32,
    pub track: Option<u32>,
    pub channels: Channels,
    pub filters: &'a [AudioFilter],
    pub output: &'a Path,
}

pub fn build_audio_render_cmd(a: &AudioRenderArgs<'_>) -> CommandSpec {
    let mut cmd = CommandSpec::ffmpeg();
    push_input(&mut cmd, a.input, &a.window);
    cmd.push("-vn");
    if let Some(track) = a.track {
        cmd.push("-map");
        cmd.push(format!("0:a:{}", track));
    }
    cmd.push("-c:a");
    cmd.push(a.codec.audio_encoder());
    cmd.push("-b:a");
    cmd.push(format!("{}k", a.bitrate_kbps));
    push_channels(&mut cmd, a.channels);
    if let Some(af) = render_audio_filters(a.filters) {
        cmd.push("-af");
        cmd.push(af);
    }
    cmd.push(a.output);
    cmd
}

/// First loudnorm pass: measure only, print JSON, discard output
pub fn build_loudnorm_measure_cmd(audio_file: &Path) -> CommandSpec {
    CommandSpec::new("ffmpeg")
        .arg("-hide_banner")
        .arg("-i")
        .arg(audio_file)
        .args(["-filter:a", "loudnorm=print_format=json", "-f", "null"])
        .arg(null_output_target())
}

/// Render the trim/concat graph into a lossless intermediate
pub fn build_segment_render_cmd(
    input: &Path,
    window: &ClipWindow,
    graph: &SegmentGraph<'_>,
    output: &Path,
) -> CommandSpec {
    let mut cmd = CommandSpec::ffmpeg();
    push_input(&mut cmd, input, window);
    cmd.push("-filter_complex");
    cmd.push(graph.to_string());
    cmd.push("-map");
    cmd.push(SegmentGraph::VIDEO_OUT);
    if graph.has_audio() {
        cmd.push("-map");
        cmd.push(SegmentGraph::AUDIO_OUT);
    }
    cmd = cmd.args(["-c:v", "libx265", "-x265-params", "lossless=1"]);
    if graph.has_audio() {
        cmd = cmd.args(["-c:a", "libopus", "-b:a", "512k"]);
    } else {
        cmd.push("-an");
    }
    cmd.push(output);
    cmd
}

fn build_analysis_cmd(input: &Path, window: &ClipWindow, flag: &str, filter: &str) -> CommandSpec {
    let mut cmd = CommandSpec::new("ffmpeg").arg("-hide_banner");
    push_input(&mut cmd, input, window);
    cmd.args([flag, filter, "-f", "null"])
        .arg(null_output_target())
        .args(["-v", "info"])
}

pub fn build_cropdetect_cmd(input: &Path, window: &ClipWindow) -> CommandSpec {
    build_analysis_cmd(input, window, "-vf", "cropdetect")
}

pub fn build_silencedetect_cmd(input: &Path, window: &ClipWindow) -> CommandSpec {
    build_analysis_cmd(input, window, "-af", "silencedetect=n=-50dB:d=1.4")
}

/// One pass of the final encode.
///
/// Subtitle burn-in needs `-i` before `-ss`/`-t`; otherwise the seek goes
/// first, which is faster.
pub fn build_encode_pass_cmd(job: &EncodeJob, pass: Pass) -> CommandSpec {
    let mut cmd = CommandSpec::ffmpeg();

    if job.filters.has_subtitles() {
        cmd.push("-i");
        cmd.push(&job.input_path);
        push_window(&mut cmd, &job.window);
    } else {
        push_input(&mut cmd, &job.input_path, &job.window);
    }

    if let Some(vf) = job.filters.render() {
        cmd.push("-vf");
        cmd.push(vf);
    }
    cmd = cmd.args(job.codec.args(job.video.bitrate_kbps));
    cmd.push("-pass");
    cmd.push(pass.number().to_string());
    cmd.push("-passlogfile");
    cmd.push(&job.passlog_prefix);

    match pass {
        Pass::First => {
            cmd = cmd.args(["-an", "-f", "null"]).arg(null_output_target());
        }
        Pass::Second => {
            match &job.audio {
                Some(audio) => {
                    if let Some(track) = audio.track {
                        cmd = cmd.args(["-map", "0:v:0", "-map"]);
                        cmd.push(format!("0:a:{}", track));
                    }
                    push_channels(&mut cmd, audio.channels);
                    if let Some(af) = render_audio_filters(&audio.filters) {
                        cmd.push("-af");
                        cmd.push(af);
                    }
                    cmd.push("-c:a");
                    cmd.push(job.codec.codec.audio_encoder());
                    cmd.push("-b:a");
                    cmd.push(format!("{}k", audio.bitrate_kbps));
                }
                None => cmd.push("-an"),
            }
            cmd = cmd.args(["-progress", "-", "-nostats"]);
            apply_additional_args(&mut cmd, &job.extra_args);
            cmd.push(&job.output_path);
        }
    }
    cmd
}

// Scriptable stand-ins for ffmpeg and ffprobe

#![allow(dead_code)]

use clipfit::engine::{
    AudioStreamInfo, CommandSpec, FitError, FitOptions, FitOutcome, FitPipeline, FitRequest,
    FrameRate, IdGenerator, MediaProbe, PassProgress, Result, RunOutput, Transcoder,
};
use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const MEDIA_EXTENSIONS: [&str; 5] = ["webm", "mp4", "opus", "m4a", "mkv"];

/// Canned reaction to a command whose rendered form contains `needle`
#[derive(Debug, Clone)]
pub struct Rule {
    pub needle: String,
    pub success: bool,
    pub stderr: String,
    pub stdout: String,
    /// Bytes written to the command's output file
    pub output_bytes: Option<u64>,
    /// How often the rule may fire; `None` is unlimited
    pub remaining: Option<usize>,
}

impl Rule {
    pub fn on(needle: &str) -> Self {
        Self {
            needle: needle.to_string(),
            success: true,
            stderr: String::new(),
            stdout: String::new(),
            output_bytes: None,
            remaining: None,
        }
    }

    pub fn fail(mut self, stderr: &str) -> Self {
        self.success = false;
        self.stderr = stderr.to_string();
        self
    }

    pub fn stderr(mut self, stderr: &str) -> Self {
        self.stderr = stderr.to_string();
        self
    }

    pub fn writes(mut self, bytes: u64) -> Self {
        self.output_bytes = Some(bytes);
        self
    }

    pub fn once(mut self) -> Self {
        self.remaining = Some(1);
        self
    }
}

/// Records every command and answers from a rule list. Commands no rule
/// matches succeed and write `default_bytes` to their media output.
pub struct FakeTranscoder {
    rules: RefCell<Vec<Rule>>,
    pub default_bytes: u64,
    pub commands: RefCell<Vec<CommandSpec>>,
}

impl FakeTranscoder {
    pub fn new() -> Self {
        Self {
            rules: RefCell::new(Vec::new()),
            default_bytes: 64 * 1024,
            commands: RefCell::new(Vec::new()),
        }
    }

    pub fn rule(self, rule: Rule) -> Self {
        self.rules.borrow_mut().push(rule);
        self
    }

    pub fn rendered(&self) -> Vec<String> {
        self.commands.borrow().iter().map(ToString::to_string).collect()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.rendered().iter().filter(|c| c.contains(needle)).count()
    }

    fn answer(&self, cmd: &CommandSpec) -> Rule {
        let line = cmd.to_string();
        let mut rules = self.rules.borrow_mut();
        for rule in rules.iter_mut() {
            if !line.contains(&rule.needle) || rule.remaining == Some(0) {
                continue;
            }
            if let Some(n) = rule.remaining.as_mut() {
                *n -= 1;
            }
            return rule.clone();
        }
        Rule::on("")
    }
}

fn media_output(cmd: &CommandSpec) -> Option<PathBuf> {
    let path = PathBuf::from(cmd.args.last()?);
    let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
    MEDIA_EXTENSIONS.contains(&ext.as_str()).then_some(path)
}

impl Transcoder for FakeTranscoder {
    fn run(&self, cmd: &CommandSpec) -> Result<RunOutput> {
        self.commands.borrow_mut().push(cmd.clone());
        let rule = self.answer(cmd);

        if rule.success {
            if let Some(path) = media_output(cmd) {
                let bytes = rule.output_bytes.unwrap_or(self.default_bytes);
                fs::write(&path, vec![0u8; bytes as usize])?;
            }
        }
        Ok(RunOutput {
            success: rule.success,
            status: if rule.success {
                "exit status: 0".to_string()
            } else {
                "exit status: 1".to_string()
            },
            stdout: rule.stdout,
            stderr: rule.stderr,
        })
    }

    fn run_with_progress(
        &self,
        cmd: &CommandSpec,
        on_progress: &mut dyn FnMut(&PassProgress),
    ) -> Result<RunOutput> {
        let out = self.run(cmd)?;
        let mut progress = PassProgress::new();
        for line in ["out_time_us=1000000", "progress=end"] {
            progress.feed(line);
            on_progress(&progress);
        }
        Ok(out)
    }
}

/// Fixed probe answers; `None` fields fail with `ProbeFailure`
#[derive(Debug, Clone)]
pub struct FakeProbe {
    pub duration: Option<f64>,
    /// Duration reported for intermediate renders (paths under the work dir)
    pub rendered_duration: Option<f64>,
    pub dimensions: Option<(u32, u32)>,
    pub frame_rate: Option<FrameRate>,
    pub audio: Option<Vec<AudioStreamInfo>>,
}

impl FakeProbe {
    /// 1080p30 with one stereo track
    pub fn hd(duration: f64) -> Self {
        Self {
            duration: Some(duration),
            rendered_duration: None,
            dimensions: Some((1920, 1080)),
            frame_rate: FrameRate::parse("30/1"),
            audio: Some(vec![stream(Some("stereo"), None)]),
        }
    }
}

pub fn stream(layout: Option<&str>, language: Option<&str>) -> AudioStreamInfo {
    AudioStreamInfo {
        channel_layout: layout.map(str::to_string),
        channels: None,
        language: language.map(str::to_string),
    }
}

fn missing(path: &Path, what: &str) -> FitError {
    FitError::probe(path, format!("no {} (fake)", what))
}

impl MediaProbe for FakeProbe {
    fn duration(&self, path: &Path) -> Result<f64> {
        let is_intermediate = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with("segments"));
        if is_intermediate {
            return self.rendered_duration.ok_or_else(|| missing(path, "duration"));
        }
        self.duration.ok_or_else(|| missing(path, "duration"))
    }

    fn dimensions(&self, path: &Path) -> Result<(u32, u32)> {
        self.dimensions.ok_or_else(|| missing(path, "video stream"))
    }

    fn frame_rate(&self, path: &Path) -> Result<FrameRate> {
        self.frame_rate.ok_or_else(|| missing(path, "frame rate"))
    }

    fn audio_streams(&self, path: &Path) -> Result<Vec<AudioStreamInfo>> {
        self.audio.clone().ok_or_else(|| missing(path, "audio streams"))
    }
}

/// Deterministic working directory names
pub struct SequentialIds(pub Cell<u32>);

impl SequentialIds {
    pub fn new() -> Self {
        Self(Cell::new(0))
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> String {
        let n = self.0.get() + 1;
        self.0.set(n);
        format!("test{}", n)
    }
}

/// Temp dir holding the (never read) input, outputs and working dirs
pub struct Harness {
    pub dir: TempDir,
    pub input: PathBuf,
    pub opts: FitOptions,
}

impl Harness {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("clip.mkv");
        let work_root = dir.path().join("work");
        fs::create_dir(&work_root).unwrap();
        let opts = FitOptions {
            work_root,
            ..FitOptions::default()
        };
        Self { dir, input, opts }
    }

    pub fn request(&self) -> FitRequest {
        FitRequest {
            input: self.input.clone(),
            ..FitRequest::default()
        }
    }

    pub fn run(&self, transcoder: &FakeTranscoder, probe: &FakeProbe) -> Result<FitOutcome> {
        self.run_request(transcoder, probe, &self.request())
    }

    pub fn run_request(
        &self,
        transcoder: &FakeTranscoder,
        probe: &FakeProbe,
        request: &FitRequest,
    ) -> Result<FitOutcome> {
        let ids = SequentialIds::new();
        FitPipeline::new(transcoder, probe, &ids).run(request, &self.opts, &mut |_| {})
    }

    /// Working directories left behind under the work root
    pub fn leftover_work_dirs(&self) -> usize {
        fs::read_dir(&self.opts.work_root).unwrap().count()
    }
}

/// The pass-2 command line
pub fn pass2(transcoder: &FakeTranscoder) -> String {
    transcoder
        .rendered()
        .into_iter()
        .find(|c| c.contains("-pass 2"))
        .expect("pass 2 was not run")
}

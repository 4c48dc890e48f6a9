//! The size-fitting pipeline.
//!
//! Stages run strictly in sequence, each consuming the previous one's output:
//! silence trimming and segment planning (optional, may produce an
//! intermediate clip), audio render and measurement, budget, resolution and
//! fps, and finally the two-pass encode with size verification.

use super::audio::{
    AudioPlan, AudioRenderer, AudioRequest, MixdownMode, MixdownThresholds, resolve_mixdown,
    select_audio_bitrate,
};
use super::budget::{BudgetCalculator, SizeBudget, SizeProfile, VideoBitrate, check_duration};
use super::detect::{SilenceTrimMode, parse_cropdetect, parse_silences, plan_silence_trim};
use super::encode::{EncodeOrchestrator, SizeOvershoot, encode_commands};
use super::error::{FitError, Result};
use super::ffmpeg_cmd::{
    build_cropdetect_cmd, build_segment_render_cmd, build_silencedetect_cmd, two_pass_log_prefix,
};
use super::filters::{AudioFilter, VideoFilter, VideoFilterChain};
use super::fps::FpsModel;
use super::resolution::{CurveCoefficients, ResizeMode, ResolutionModel};
use super::runner::{LoggedTranscoder, Transcoder};
use super::segments::{
    Padding, SegmentMode, SegmentRequest, SegmentSet, TimeRange, clamp_to_clip,
    first_second_every_minute, pad_and_merge, parse_segments, plan_concat, plan_cut,
};
use super::tables::MAX_BITRATE_KBPS;
use super::types::{
    ClipWindow, Codec, EncodeJob, JobAudio, PassProgress, VideoCodecOptions, VideoPlan,
};
use super::workspace::{IdGenerator, Workspace};
use crate::engine::probe::{AudioStreamInfo, MediaProbe};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Which file and which part of it to fit
#[derive(Debug, Clone, Default)]
pub struct FitRequest {
    pub input: PathBuf,
    /// Derived from the input name when absent
    pub output: Option<PathBuf>,
    /// Clip start in seconds; the whole input when both are absent
    pub start_s: Option<f64>,
    pub duration_s: Option<f64>,
}

/// Every knob of a run. Defaults match the built-in config.
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub profile: SizeProfile,
    pub codec: VideoCodecOptions,

    pub resize_mode: ResizeMode,
    pub curves: CurveCoefficients,
    pub bypass_resolution_table: bool,
    /// Skip scaling entirely
    pub no_resize: bool,
    pub resolution: Option<u32>,
    pub fps: Option<f64>,

    pub no_audio: bool,
    pub audio_bitrate_kbps: Option<u32>,
    /// Prioritize audio: bigger bitrate table, no normalization
    pub music_mode: bool,
    pub normalize: bool,
    pub mixdown: MixdownMode,
    pub mixdown_thresholds: MixdownThresholds,
    pub audio_track: Option<u32>,
    pub audio_lang: Option<String>,

    pub segments: Option<SegmentRequest>,
    pub first_second_every_minute: bool,
    pub trim_silence: Option<SilenceTrimMode>,

    pub crop: Option<String>,
    pub auto_crop: bool,
    pub subtitles: Option<PathBuf>,
    pub video_filter: Option<String>,
    pub audio_filter: Option<String>,
    pub extra_args: String,

    pub max_bitrate_kbps: u32,
    pub bitrate_compensation_kbps: i32,
    pub duration_check: bool,

    pub dry_run: bool,
    pub keep_temp_files: bool,
    /// Parent of the per-run working directory
    pub work_root: PathBuf,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            profile: SizeProfile::default(),
            codec: VideoCodecOptions::default(),
            resize_mode: ResizeMode::default(),
            curves: CurveCoefficients::default(),
            bypass_resolution_table: false,
            no_resize: false,
            resolution: None,
            fps: None,
            no_audio: false,
            audio_bitrate_kbps: None,
            music_mode: false,
            normalize: false,
            mixdown: MixdownMode::default(),
            mixdown_thresholds: MixdownThresholds::default(),
            audio_track: None,
            audio_lang: None,
            segments: None,
            first_second_every_minute: false,
            trim_silence: None,
            crop: None,
            auto_crop: false,
            subtitles: None,
            video_filter: None,
            audio_filter: None,
            extra_args: String::new(),
            max_bitrate_kbps: MAX_BITRATE_KBPS,
            bitrate_compensation_kbps: 0,
            duration_check: true,
            dry_run: false,
            keep_temp_files: false,
            work_root: std::env::temp_dir(),
        }
    }
}

/// Everything a run decided and produced
#[derive(Debug, Clone, Serialize)]
pub struct FitOutcome {
    pub output_path: PathBuf,
    /// `None` on a dry run
    pub output_bytes: Option<u64>,
    pub overshoot: Option<SizeOvershoot>,
    pub duration_s: f64,
    pub budget: SizeBudget,
    pub bitrate: VideoBitrate,
    pub audio: Option<AudioPlan>,
    pub video: VideoPlan,
    /// Pass 1 and pass 2 command lines
    pub commands: Vec<String>,
    /// Intermediate files in the kept working directory; empty once it is removed
    pub artifacts: Vec<PathBuf>,
    /// Working directory, when kept
    pub work_dir: Option<PathBuf>,
}

/// `_<n>_<stem>.<ext>` next to the input, first `n` not already taken
pub fn derive_output_path(input: &Path, codec: Codec) -> PathBuf {
    let dir = input.parent().unwrap_or_else(|| Path::new(""));
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());

    let mut n = 1u32;
    loop {
        let candidate = dir.join(format!("_{}_{}.{}", n, stem, codec.container_ext()));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Append the container extension unless the path already carries it
pub fn with_container_ext(path: PathBuf, codec: Codec) -> PathBuf {
    let ext = codec.container_ext();
    let matches = path
        .extension()
        .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext));
    if matches {
        path
    } else {
        let mut s = path.into_os_string();
        s.push(".");
        s.push(ext);
        PathBuf::from(s)
    }
}

/// Working state threaded through the early stages
struct Clip {
    input: PathBuf,
    window: ClipWindow,
}

enum SegmentPlan {
    Cut(Vec<TimeRange>),
    Concat(Vec<TimeRange>, Padding),
}

pub struct FitPipeline<'a> {
    transcoder: &'a dyn Transcoder,
    probe: &'a dyn MediaProbe,
    ids: &'a dyn IdGenerator,
}

impl<'a> FitPipeline<'a> {
    pub fn new(
        transcoder: &'a dyn Transcoder,
        probe: &'a dyn MediaProbe,
        ids: &'a dyn IdGenerator,
    ) -> Self {
        Self {
            transcoder,
            probe,
            ids,
        }
    }

    pub fn run(
        &self,
        req: &FitRequest,
        opts: &FitOptions,
        on_progress: &mut dyn FnMut(&PassProgress),
    ) -> Result<FitOutcome> {
        let mut ws = Workspace::create(&opts.work_root, self.ids)?;
        ws.keep(opts.keep_temp_files);
        let transcoder = LoggedTranscoder::new(self.transcoder, ws.log_path());

        let mut clip = self.initial_clip(req)?;
        info!(
            input = %clip.input.display(),
            start_s = clip.window.start_s,
            duration_s = clip.window.duration_s,
            "clip selected"
        );

        let mut segments = self.segment_plan(&clip, opts)?;
        if let Some(mode) = opts.trim_silence {
            // User ranges are relative to the untrimmed clip start
            if segments.is_some() {
                return Err(FitError::invalid_segment(
                    format!("trim_silence={}", mode),
                    "cannot be combined with cut or concat segments",
                ));
            }
            segments = self
                .trim_silence(&transcoder, &mut clip, mode)?
                .map(SegmentPlan::Cut);
        }
        if opts.first_second_every_minute {
            if segments.is_some() {
                return Err(FitError::invalid_segment(
                    "first_second_every_minute",
                    "cannot be combined with cut, concat or silence segments",
                ));
            }
            segments = Some(SegmentPlan::Concat(
                first_second_every_minute(clip.window.duration_s),
                Padding::default(),
            ));
        }

        if let Some(plan) = segments {
            self.render_segments(&transcoder, &mut ws, &mut clip, plan, opts)?;
        }

        let board = opts.profile.board;
        if opts.duration_check {
            check_duration(board, clip.window.duration_s)?;
        }
        let duration_s = clip.window.duration_s;

        // Audio first: its exact size decides the video budget
        let audio = if board.allows_audio() && !opts.no_audio {
            self.plan_audio(&transcoder, &mut ws, &clip, opts)?
        } else {
            None
        };
        let audio_bytes = audio.as_ref().map_or(0, |a| a.measured_bytes);

        let cap_bytes = opts.profile.cap_bytes();
        let budget = SizeBudget::new(cap_bytes, audio_bytes, duration_s)?;
        let bitrate = BudgetCalculator::default()
            .with_ceiling(opts.max_bitrate_kbps)
            .with_manual_compensation(opts.bitrate_compensation_kbps)
            .video_bitrate(&budget)?;
        info!(
            cap_bytes,
            audio_bytes,
            target_kbps = bitrate.target_kbps,
            compensated_kbps = bitrate.compensated_kbps,
            "video budget"
        );

        let video = VideoPlan {
            bitrate_kbps: bitrate.compensated_kbps,
            resolution_px: self.choose_resolution(&clip, bitrate.compensated_kbps, opts),
            fps: self.choose_fps(&clip, opts),
            crop: self.choose_crop(&transcoder, &clip, opts)?,
        };
        info!(
            resolution = ?video.resolution_px,
            fps = ?video.fps,
            crop = ?video.crop,
            "video plan"
        );

        let job = self.build_job(req, opts, &ws, &clip, &video, audio.as_ref(), cap_bytes);
        let commands: Vec<String> = encode_commands(&job).iter().map(ToString::to_string).collect();

        let (output_bytes, overshoot) = if opts.dry_run {
            for cmd in &commands {
                info!(command = %cmd, "dry run");
            }
            (None, None)
        } else {
            let report = EncodeOrchestrator::new(&transcoder).run(&job, on_progress)?;
            (Some(report.output_bytes), report.overshoot)
        };

        Ok(FitOutcome {
            output_path: job.output_path,
            output_bytes,
            overshoot,
            duration_s,
            budget,
            bitrate,
            audio,
            video,
            commands,
            artifacts: if ws.is_kept() {
                ws.artifacts().to_vec()
            } else {
                Vec::new()
            },
            work_dir: ws.is_kept().then(|| ws.dir().to_path_buf()),
        })
    }

    fn initial_clip(&self, req: &FitRequest) -> Result<Clip> {
        let start_s = req.start_s.unwrap_or(0.0);
        let full = req.start_s.is_none() && req.duration_s.is_none();

        let duration_s = match req.duration_s {
            Some(d) => d,
            // No fallback exists for the clip length itself
            None => self.probe.duration(&req.input)? - start_s,
        };
        if !(duration_s > 0.0) {
            return Err(FitError::InvalidDuration(duration_s));
        }

        let window = if full {
            ClipWindow::full(duration_s)
        } else {
            ClipWindow::slice(start_s, duration_s)
        };
        Ok(Clip {
            input: req.input.clone(),
            window,
        })
    }

    /// Parse the user's cut/concat request. A single concat range just moves
    /// the clip window and needs no intermediate render.
    fn segment_plan(&self, clip: &Clip, opts: &FitOptions) -> Result<Option<SegmentPlan>> {
        let Some(request) = &opts.segments else {
            return Ok(None);
        };
        let ranges = parse_segments(&request.spec, clip.window.start_s)?;
        Ok(Some(match request.mode {
            SegmentMode::Cut => SegmentPlan::Cut(ranges),
            SegmentMode::Concat => SegmentPlan::Concat(ranges, request.padding),
        }))
    }

    /// Returns interior cut ranges for `all` mode
    fn trim_silence(
        &self,
        transcoder: &dyn Transcoder,
        clip: &mut Clip,
        mode: SilenceTrimMode,
    ) -> Result<Option<Vec<TimeRange>>> {
        info!("running silencedetect");
        let cmd = build_silencedetect_cmd(&clip.input, &clip.window);
        let out = transcoder.run(&cmd)?;
        if !out.success {
            return Err(FitError::encode(
                "silencedetect",
                cmd.to_string(),
                &out.status,
                &out.stderr,
            ));
        }

        let silences = parse_silences(&out.stderr, clip.window.duration_s);
        if silences.is_empty() {
            info!("no silence detected");
            return Ok(None);
        }

        let trim = plan_silence_trim(&silences, clip.window.duration_s, mode);
        if trim.start_shift_s > 0.0 || trim.duration_s < clip.window.duration_s {
            info!(
                start_shift_s = trim.start_shift_s,
                duration_s = trim.duration_s,
                "trimmed silence at clip edges"
            );
            clip.window = ClipWindow::slice(clip.window.start_s + trim.start_shift_s, trim.duration_s);
        }
        Ok((!trim.cuts.is_empty()).then_some(trim.cuts))
    }

    fn render_segments(
        &self,
        transcoder: &dyn Transcoder,
        ws: &mut Workspace,
        clip: &mut Clip,
        plan: SegmentPlan,
        opts: &FitOptions,
    ) -> Result<()> {
        let clip_duration = clip.window.duration_s;
        let concat = matches!(plan, SegmentPlan::Concat(..));
        let set: SegmentSet = match plan {
            SegmentPlan::Concat(ranges, padding) if padding.is_zero() => {
                plan_concat(ranges, clip_duration)?
            }
            SegmentPlan::Concat(ranges, padding) => {
                pad_and_merge(&clamp_to_clip(ranges, clip_duration)?, padding, clip_duration)
            }
            SegmentPlan::Cut(cuts) => plan_cut(cuts, clip_duration)?,
        };
        if set.is_empty() {
            return Err(FitError::EmptySegmentSet);
        }
        if let (true, [range]) = (concat, set.ranges()) {
            clip.window = ClipWindow::slice(clip.window.start_s + range.start, range.duration());
            info!(
                start_s = clip.window.start_s,
                duration_s = clip.window.duration_s,
                "single concat segment, clipping directly"
            );
            return Ok(());
        }
        if opts.subtitles.is_some() {
            return Err(FitError::invalid_segment(
                "segments",
                "cut/concat cannot be combined with subtitle burn-in",
            ));
        }

        let with_audio = opts.profile.board.allows_audio()
            && !opts.no_audio
            && self.probe_audio_streams(&clip.input).is_none_or(|s| !s.is_empty());
        let output = ws.artifact("segments.mkv");
        let graph = set.filter_graph(with_audio);
        let cmd = build_segment_render_cmd(&clip.input, &clip.window, &graph, &output);

        info!(segments = set.len(), kept_s = set.total_duration(), "rendering segments");
        let out = transcoder.run(&cmd)?;
        if !out.success {
            return Err(FitError::encode(
                "segment render",
                cmd.to_string(),
                &out.status,
                &out.stderr,
            ));
        }

        let duration_s = match self.probe.duration(&output) {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "could not probe segment render, using planned duration");
                set.total_duration()
            }
        };
        info!(duration_s, "using segment render");
        clip.input = output;
        clip.window = ClipWindow::full(duration_s);
        Ok(())
    }

    fn probe_audio_streams(&self, input: &Path) -> Option<Vec<AudioStreamInfo>> {
        match self.probe.audio_streams(input) {
            Ok(streams) => Some(streams),
            Err(e) => {
                warn!(error = %e, "could not list audio streams");
                None
            }
        }
    }

    fn select_track(&self, streams: Option<&[AudioStreamInfo]>, opts: &FitOptions) -> Option<u32> {
        if let Some(track) = opts.audio_track {
            match streams {
                Some(s) if track as usize >= s.len() => {
                    warn!(track, "audio track not found, using the default track");
                }
                _ => return Some(track),
            }
        } else if let Some(lang) = &opts.audio_lang {
            let found = streams.and_then(|s| {
                s.iter()
                    .position(|info| info.language.as_deref() == Some(lang.as_str()))
            });
            match found {
                Some(idx) => return Some(idx as u32),
                None => warn!(%lang, "audio language not found, using the default track"),
            }
        }
        // Multi-track inputs get explicit mapping, otherwise timestamps drift
        match streams {
            Some(s) if s.len() > 1 => Some(0),
            _ => None,
        }
    }

    fn plan_audio(
        &self,
        transcoder: &dyn Transcoder,
        ws: &mut Workspace,
        clip: &Clip,
        opts: &FitOptions,
    ) -> Result<Option<AudioPlan>> {
        let streams = self.probe_audio_streams(&clip.input);
        if streams.as_ref().is_some_and(Vec::is_empty) {
            info!("no audio streams found, encoding without audio");
            return Ok(None);
        }

        let track = self.select_track(streams.as_deref(), opts);
        let bitrate_kbps = select_audio_bitrate(
            opts.profile.board,
            clip.window.duration_s,
            opts.music_mode,
            opts.audio_bitrate_kbps,
        );
        let source_layout = streams
            .as_ref()
            .and_then(|s| s.get(track.unwrap_or(0) as usize))
            .and_then(|s| s.channel_layout.as_deref());
        let channels =
            resolve_mixdown(opts.mixdown, bitrate_kbps, opts.mixdown_thresholds, source_layout);
        info!(kbps = bitrate_kbps, ?channels, ?track, "rendering audio");

        let codec = opts.codec.codec;
        let request = AudioRequest {
            input: &clip.input,
            window: clip.window,
            codec,
            bitrate_kbps,
            track,
            channels,
            normalize: opts.normalize && !opts.music_mode,
            output: ws.artifact(&format!("audio.{}", codec.audio_ext())),
            normalized_output: ws.artifact(&format!("audio.normalized.{}", codec.audio_ext())),
        };
        let plan = AudioRenderer::new(transcoder, self.probe).render(&request)?;
        info!(
            bytes = plan.measured_bytes,
            kib = plan.measured_bytes / 1024,
            "audio size"
        );
        Ok(Some(plan))
    }

    fn choose_resolution(&self, clip: &Clip, kbps: u32, opts: &FitOptions) -> Option<u32> {
        if opts.no_resize {
            return None;
        }
        if let Some(res) = opts.resolution {
            return Some(res);
        }

        let model = ResolutionModel::new(opts.resize_mode, opts.curves, opts.bypass_resolution_table);
        let source = if model.needs_source() {
            match self.probe.dimensions(&clip.input) {
                Ok(dims) => Some(dims),
                Err(e) => {
                    warn!(error = %e, "could not probe resolution, using the duration table");
                    None
                }
            }
        } else {
            None
        };
        model
            .choose(kbps, clip.window.duration_s, source)
            .max_dimension
    }

    fn choose_fps(&self, clip: &Clip, opts: &FitOptions) -> Option<f64> {
        if opts.fps.is_some() {
            return opts.fps;
        }
        let source = match self.probe.frame_rate(&clip.input) {
            Ok(rate) => Some(rate),
            Err(e) => {
                warn!(error = %e, "could not probe frame rate, applying the fps cap");
                None
            }
        };
        FpsModel::default().target_fps(clip.window.duration_s, source)
    }

    fn choose_crop(
        &self,
        transcoder: &dyn Transcoder,
        clip: &Clip,
        opts: &FitOptions,
    ) -> Result<Option<String>> {
        if !opts.auto_crop {
            return Ok(opts.crop.clone());
        }
        info!("running cropdetect");
        let cmd = build_cropdetect_cmd(&clip.input, &clip.window);
        let out = transcoder.run(&cmd)?;
        if !out.success {
            return Err(FitError::encode(
                "cropdetect",
                cmd.to_string(),
                &out.status,
                &out.stderr,
            ));
        }
        Ok(parse_cropdetect(&out.stderr))
    }

    #[allow(clippy::too_many_arguments)]
    fn build_job(
        &self,
        req: &FitRequest,
        opts: &FitOptions,
        ws: &Workspace,
        clip: &Clip,
        video: &VideoPlan,
        audio: Option<&AudioPlan>,
        cap_bytes: u64,
    ) -> EncodeJob {
        let codec = opts.codec.codec;
        let output_path = match &req.output {
            Some(path) => with_container_ext(path.clone(), codec),
            None => derive_output_path(&req.input, codec),
        };

        let mut filters = VideoFilterChain::new();
        if let Some(crop) = &video.crop {
            filters.push(VideoFilter::Crop(crop.clone()));
        }
        if let Some(res) = video.resolution_px {
            filters.push(VideoFilter::Scale(res));
        }
        if let Some(fps) = video.fps {
            filters.push(VideoFilter::Fps(fps));
        }
        if let Some(subs) = &opts.subtitles {
            filters.push(VideoFilter::Subtitles(subs.clone()));
        }
        if let Some(custom) = &opts.video_filter {
            filters.push(VideoFilter::Custom(custom.clone()));
        }

        let audio = audio.map(|plan| {
            let mut audio_filters = plan.filters();
            if let Some(custom) = &opts.audio_filter {
                audio_filters.push(AudioFilter::Custom(custom.clone()));
            }
            JobAudio {
                bitrate_kbps: plan.bitrate_kbps,
                track: plan.track,
                channels: plan.channels,
                filters: audio_filters,
            }
        });

        EncodeJob {
            input_path: clip.input.clone(),
            output_path,
            window: clip.window,
            video: video.clone(),
            audio,
            codec: opts.codec,
            filters,
            passlog_prefix: two_pass_log_prefix(ws.dir()),
            extra_args: opts.extra_args.clone(),
            cap_bytes,
        }
    }
}

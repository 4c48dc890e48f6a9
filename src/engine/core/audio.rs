//! Audio rendering and measurement.
//!
//! The audio selection is rendered once at its candidate bitrate so the exact
//! byte size is known before the video budget is computed. Two things can
//! change the render along the way:
//!
//! * a known libopus defect with some multichannel layouts, recovered by
//!   remapping the layout and retrying exactly once ([`RenderState`]);
//! * two-pass loudness normalization, whose second render replaces the
//!   measured size.

use super::budget::Board;
use super::error::{FitError, Result};
use super::ffmpeg_cmd::{AudioRenderArgs, build_audio_render_cmd, build_loudnorm_measure_cmd};
use super::filters::{AudioFilter, LoudnessParams};
use super::runner::Transcoder;
use super::tables::AUDIO_TABLE_MUSIC;
use super::types::{Channels, ClipWindow, Codec};
use crate::engine::probe::MediaProbe;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Audio bitrate for a clip: manual override, else the duration table of
/// the board (or the music table when audio is prioritized)
pub fn select_audio_bitrate(
    board: Board,
    duration_s: f64,
    music_mode: bool,
    manual_kbps: Option<u32>,
) -> u32 {
    if let Some(kbps) = manual_kbps {
        return kbps;
    }
    let table = if music_mode {
        AUDIO_TABLE_MUSIC
    } else {
        board.audio_table()
    };
    table.lookup(duration_s)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixdownMode {
    /// Mono or stereo depending on bitrate, unless the source is already narrower
    #[default]
    Auto,
    Stereo,
    Mono,
    SameAsSource,
}

impl fmt::Display for MixdownMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MixdownMode::Auto => "auto",
            MixdownMode::Stereo => "stereo",
            MixdownMode::Mono => "mono",
            MixdownMode::SameAsSource => "same_as_source",
        })
    }
}

impl FromStr for MixdownMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(MixdownMode::Auto),
            "stereo" => Ok(MixdownMode::Stereo),
            "mono" => Ok(MixdownMode::Mono),
            "same_as_source" | "source" => Ok(MixdownMode::SameAsSource),
            other => Err(format!(
                "unknown mixdown '{}' (expected auto, stereo, mono or same_as_source)",
                other
            )),
        }
    }
}

/// Bitrates at or below which `auto` mixes down (kbps)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixdownThresholds {
    pub mono_kbps: u32,
    pub stereo_kbps: u32,
}

impl Default for MixdownThresholds {
    fn default() -> Self {
        Self {
            mono_kbps: 56,
            stereo_kbps: 96,
        }
    }
}

/// Resolve the mixdown mode to a channel setting. `source_layout` is the
/// probed layout of the selected track, `None` if unknown.
pub fn resolve_mixdown(
    mode: MixdownMode,
    bitrate_kbps: u32,
    thresholds: MixdownThresholds,
    source_layout: Option<&str>,
) -> Channels {
    match mode {
        MixdownMode::Stereo => Channels::Stereo,
        MixdownMode::Mono => Channels::Mono,
        MixdownMode::SameAsSource => Channels::Source,
        MixdownMode::Auto if bitrate_kbps <= thresholds.mono_kbps => match source_layout {
            Some("mono") => Channels::Source,
            _ => Channels::Mono,
        },
        MixdownMode::Auto if bitrate_kbps <= thresholds.stereo_kbps => match source_layout {
            Some("mono" | "stereo") => Channels::Source,
            _ => Channels::Stereo,
        },
        MixdownMode::Auto => Channels::Source,
    }
}

/// Supported layout equivalent for a layout libopus rejects
pub fn remap_layout(layout: &str) -> Option<&'static str> {
    match layout {
        "5.0(side)" => Some("5.0"),
        "5.1(side)" => Some("5.1"),
        "6.0(front)" => Some("6.0"),
        "6.1(front)" => Some("6.1"),
        "7.0(front)" => Some("7.0"),
        "7.1(wide)" | "7.1(wide-side)" => Some("7.1"),
        _ => None,
    }
}

/// True when stderr shows the encoder rejecting a multichannel layout
pub fn is_layout_defect(stderr: &str, audio_encoder: &str) -> bool {
    stderr.lines().any(|line| {
        line.contains(audio_encoder)
            && (line.contains("Invalid channel layout") || line.contains("mapping family"))
    })
}

/// Render retry policy. The only automatic retry in the pipeline: a
/// recognized layout defect gets one workaround attempt, anything else
/// (including a second failure) is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RenderState {
    Rendering,
    FailedKnownDefect,
    RenderingWithWorkaround,
    Success,
    Fatal,
}

impl RenderState {
    /// Transition after a render attempt exits
    pub fn after_attempt(self, succeeded: bool, known_defect: bool) -> RenderState {
        match (self, succeeded) {
            (RenderState::Rendering | RenderState::RenderingWithWorkaround, true) => {
                RenderState::Success
            }
            (RenderState::Rendering, false) if known_defect => RenderState::FailedKnownDefect,
            _ => RenderState::Fatal,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RenderState::Success | RenderState::Fatal)
    }
}

/// Result of the loudnorm measurement pass
#[derive(Debug, Clone, PartialEq)]
pub enum LoudnessMeasurement {
    Measured(LoudnessParams),
    Unavailable { reason: String },
}

const LOUDNESS_FIELDS: [&str; 4] = ["input_i", "input_lra", "input_tp", "input_thresh"];

/// Find the first balanced `{...}` object in mixed ffmpeg output carrying all
/// four loudnorm measurements
pub fn find_loudness_json(text: &str) -> LoudnessMeasurement {
    let bytes = text.as_bytes();
    let mut from = 0;
    let mut saw_object = false;

    while let Some(offset) = text[from..].find('{') {
        let open = from + offset;
        let Some(close) = matching_brace(bytes, open) else {
            break;
        };
        saw_object = true;
        if let Some(params) = loudness_from_object(&text[open..=close]) {
            return LoudnessMeasurement::Measured(params);
        }
        from = open + 1;
    }

    LoudnessMeasurement::Unavailable {
        reason: if saw_object {
            "no JSON object with loudnorm measurements".to_string()
        } else {
            "no JSON object in loudnorm output".to_string()
        },
    }
}

fn matching_brace(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn loudness_from_object(candidate: &str) -> Option<LoudnessParams> {
    let value: serde_json::Value = serde_json::from_str(candidate).ok()?;
    let field = |name: &str| -> Option<String> {
        match value.get(name)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    };
    let [i, lra, tp, thresh] = LOUDNESS_FIELDS.map(field);
    Some(LoudnessParams {
        input_i: i?,
        input_lra: lra?,
        input_tp: tp?,
        input_thresh: thresh?,
    })
}

/// What the caller wants rendered
#[derive(Debug, Clone)]
pub struct AudioRequest<'a> {
    pub input: &'a Path,
    pub window: ClipWindow,
    pub codec: Codec,
    pub bitrate_kbps: u32,
    pub track: Option<u32>,
    pub channels: Channels,
    /// Two-pass loudness normalization (callers skip it in music mode)
    pub normalize: bool,
    pub output: PathBuf,
    pub normalized_output: PathBuf,
}

/// Measured audio, frozen once the render sequence finishes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioPlan {
    pub bitrate_kbps: u32,
    /// Exact size of the render the budget is based on
    pub measured_bytes: u64,
    pub track: Option<u32>,
    pub channels: Channels,
    /// Target layout of the `aformat` workaround, when it was needed
    pub channel_workaround: Option<String>,
    pub normalization: Option<LoudnessParams>,
    /// File whose size was measured
    pub rendered_path: PathBuf,
    /// States visited by the render retry policy
    pub states: Vec<RenderState>,
}

impl AudioPlan {
    /// Filters the final encode must repeat so it matches the measured render
    pub fn filters(&self) -> Vec<AudioFilter> {
        let mut filters = Vec::new();
        if let Some(layout) = &self.channel_workaround {
            filters.push(AudioFilter::ChannelRemap(layout.clone()));
        }
        if let Some(params) = &self.normalization {
            filters.push(AudioFilter::Loudnorm(params.clone()));
        }
        filters
    }
}

pub struct AudioRenderer<'a> {
    transcoder: &'a dyn Transcoder,
    probe: &'a dyn MediaProbe,
}

impl<'a> AudioRenderer<'a> {
    pub fn new(transcoder: &'a dyn Transcoder, probe: &'a dyn MediaProbe) -> Self {
        Self { transcoder, probe }
    }

    /// Render, retrying once with a layout remap on the known defect, then
    /// normalize if requested
    pub fn render(&self, req: &AudioRequest<'_>) -> Result<AudioPlan> {
        let mut state = RenderState::Rendering;
        let mut states = vec![state];
        let mut workaround: Option<String> = None;

        while !state.is_terminal() {
            state = match state {
                RenderState::Rendering | RenderState::RenderingWithWorkaround => {
                    let filters: Vec<AudioFilter> = workaround
                        .iter()
                        .map(|l| AudioFilter::ChannelRemap(l.clone()))
                        .collect();
                    let cmd = build_audio_render_cmd(&AudioRenderArgs {
                        input: req.input,
                        window: req.window,
                        codec: req.codec,
                        bitrate_kbps: req.bitrate_kbps,
                        track: req.track,
                        channels: req.channels,
                        filters: &filters,
                        output: &req.output,
                    });
                    remove_stale(&req.output)?;
                    let out = self.transcoder.run(&cmd)?;
                    let succeeded = out.success && req.output.is_file();
                    let defect = is_layout_defect(&out.stderr, req.codec.audio_encoder());
                    let next = state.after_attempt(succeeded, defect);
                    if next == RenderState::Fatal {
                        return Err(FitError::encode(
                            stage_name(state),
                            cmd.to_string(),
                            &out.status,
                            &out.stderr,
                        ));
                    }
                    next
                }
                RenderState::FailedKnownDefect => {
                    let layout = self.workaround_layout(req)?;
                    warn!(
                        layout = %layout,
                        "audio encoder rejected the channel layout, retrying with remap"
                    );
                    workaround = Some(layout);
                    RenderState::RenderingWithWorkaround
                }
                RenderState::Success | RenderState::Fatal => state,
            };
            states.push(state);
        }

        let measured_bytes = fs::metadata(&req.output)?.len();
        debug!(bytes = measured_bytes, kbps = req.bitrate_kbps, "measured audio render");

        let mut plan = AudioPlan {
            bitrate_kbps: req.bitrate_kbps,
            measured_bytes,
            track: req.track,
            channels: req.channels,
            channel_workaround: workaround,
            normalization: None,
            rendered_path: req.output.clone(),
            states,
        };

        if req.normalize {
            self.normalize(req, &mut plan)?;
        }
        Ok(plan)
    }

    fn workaround_layout(&self, req: &AudioRequest<'_>) -> Result<String> {
        let track = req.track.unwrap_or(0);
        let layout = self
            .probe
            .channel_layout(req.input, track)?
            .ok_or_else(|| FitError::probe(req.input, format!("no audio stream {}", track)))?;
        info!(layout = %layout, "detected source channel layout");
        remap_layout(&layout)
            .map(str::to_string)
            .ok_or(FitError::UnsupportedLayout { layout })
    }

    /// Loudness pass 1 then pass 2. Any problem here only skips normalization.
    fn normalize(&self, req: &AudioRequest<'_>, plan: &mut AudioPlan) -> Result<()> {
        info!("measuring loudness");
        let measure = build_loudnorm_measure_cmd(&req.output);
        let out = self.transcoder.run(&measure)?;

        let measurement = if out.success {
            find_loudness_json(&out.combined())
        } else {
            LoudnessMeasurement::Unavailable {
                reason: format!("loudnorm measurement exited with {}", out.status),
            }
        };

        let params = match measurement {
            LoudnessMeasurement::Measured(params) => params,
            LoudnessMeasurement::Unavailable { reason } => {
                warn!(%reason, "skipping loudness normalization");
                return Ok(());
            }
        };

        let mut filters: Vec<AudioFilter> = plan
            .channel_workaround
            .iter()
            .map(|l| AudioFilter::ChannelRemap(l.clone()))
            .collect();
        filters.push(AudioFilter::Loudnorm(params.clone()));

        let cmd = build_audio_render_cmd(&AudioRenderArgs {
            input: req.input,
            window: req.window,
            codec: req.codec,
            bitrate_kbps: req.bitrate_kbps,
            track: req.track,
            channels: req.channels,
            filters: &filters,
            output: &req.normalized_output,
        });
        remove_stale(&req.normalized_output)?;
        let out = self.transcoder.run(&cmd)?;

        if out.success && req.normalized_output.is_file() {
            plan.measured_bytes = fs::metadata(&req.normalized_output)?.len();
            plan.rendered_path = req.normalized_output.clone();
            plan.normalization = Some(params);
            info!(bytes = plan.measured_bytes, "normalized audio rendered");
        } else {
            warn!(
                status = %out.status,
                "could not render normalized audio, skipping normalization"
            );
        }
        Ok(())
    }
}

fn stage_name(state: RenderState) -> &'static str {
    match state {
        RenderState::RenderingWithWorkaround => "audio render (layout workaround)",
        _ => "audio render",
    }
}

fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

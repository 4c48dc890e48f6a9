use super::filters::{AudioFilter, VideoFilterChain};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Output codec family; decides video encoder, audio encoder and container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    /// libvpx-vp9 + libopus in .webm
    #[default]
    Vp9,
    /// libx264 + aac in .mp4
    H264,
}

impl Codec {
    pub fn video_encoder(self) -> &'static str {
        match self {
            Codec::Vp9 => "libvpx-vp9",
            Codec::H264 => "libx264",
        }
    }

    pub fn audio_encoder(self) -> &'static str {
        match self {
            Codec::Vp9 => "libopus",
            Codec::H264 => "aac",
        }
    }

    pub fn container_ext(self) -> &'static str {
        match self {
            Codec::Vp9 => "webm",
            Codec::H264 => "mp4",
        }
    }

    /// Extension for the standalone audio render
    pub fn audio_ext(self) -> &'static str {
        match self {
            Codec::Vp9 => "opus",
            Codec::H264 => "m4a",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Codec::Vp9 => "vp9",
            Codec::H264 => "h264",
        })
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "vp9" | "libvpx-vp9" => Ok(Codec::Vp9),
            "h264" | "libx264" => Ok(Codec::H264),
            other => Err(format!("unknown codec '{}' (expected vp9 or h264)", other)),
        }
    }
}

/// libvpx `-deadline`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deadline {
    #[default]
    Good,
    Best,
    Realtime,
}

impl fmt::Display for Deadline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Deadline::Good => "good",
            Deadline::Best => "best",
            Deadline::Realtime => "realtime",
        })
    }
}

impl FromStr for Deadline {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "good" => Ok(Deadline::Good),
            "best" => Ok(Deadline::Best),
            "realtime" => Ok(Deadline::Realtime),
            other => Err(format!(
                "unknown deadline '{}' (expected good, best or realtime)",
                other
            )),
        }
    }
}

/// Encoder knobs that don't depend on the clip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VideoCodecOptions {
    pub codec: Codec,
    pub deadline: Deadline,
    /// Trade quality for speed (`-cpu-used 5` / `-preset fast`)
    pub fast: bool,
    /// Disable VP9 row multithreading
    pub no_row_mt: bool,
}

impl VideoCodecOptions {
    /// Encoder arguments including the target rate
    pub fn args(&self, bitrate_kbps: u32) -> Vec<String> {
        let mut args = vec!["-c:v".to_string(), self.codec.video_encoder().to_string()];
        match self.codec {
            Codec::Vp9 => {
                let deadline = if self.fast {
                    Deadline::Good
                } else {
                    self.deadline
                };
                args.extend(["-deadline".to_string(), deadline.to_string()]);
                if self.fast {
                    args.extend(["-cpu-used".to_string(), "5".to_string()]);
                }
                if !self.no_row_mt {
                    args.extend(["-row-mt".to_string(), "1".to_string()]);
                }
            }
            Codec::H264 => {
                let preset = if self.fast { "fast" } else { "slower" };
                args.extend(["-preset".to_string(), preset.to_string()]);
            }
        }
        args.extend(["-b:v".to_string(), format!("{}k", bitrate_kbps)]);
        args
    }
}

/// Part of the input being encoded
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClipWindow {
    pub start_s: f64,
    pub duration_s: f64,
    /// Whole input: no `-ss`/`-t` are emitted
    pub full: bool,
}

impl ClipWindow {
    pub fn full(duration_s: f64) -> Self {
        Self {
            start_s: 0.0,
            duration_s,
            full: true,
        }
    }

    pub fn slice(start_s: f64, duration_s: f64) -> Self {
        Self {
            start_s,
            duration_s,
            full: false,
        }
    }
}

/// Channel count forced on audio renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Channels {
    #[default]
    Source,
    Stereo,
    Mono,
}

impl Channels {
    pub fn ac_arg(self) -> Option<&'static str> {
        match self {
            Channels::Source => None,
            Channels::Stereo => Some("2"),
            Channels::Mono => Some("1"),
        }
    }
}

/// Video targets, computed once from the finished audio plan and budget
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoPlan {
    pub bitrate_kbps: u32,
    /// Max output dimension; `None` keeps the source size
    pub resolution_px: Option<u32>,
    /// Target rate for the fps filter; `None` keeps the source rate
    pub fps: Option<f64>,
    /// Crop filter in source coordinates
    pub crop: Option<String>,
}

/// Audio settings for the final pass
#[derive(Debug, Clone, PartialEq)]
pub struct JobAudio {
    pub bitrate_kbps: u32,
    pub track: Option<u32>,
    pub channels: Channels,
    pub filters: Vec<AudioFilter>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Pass {
    /// Rate-control statistics only, output discarded
    First,
    /// Real encode
    Second,
}

impl Pass {
    pub fn number(self) -> u8 {
        match self {
            Pass::First => 1,
            Pass::Second => 2,
        }
    }
}

/// Everything the final two-pass encode needs. Built once per invocation.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub window: ClipWindow,
    pub video: VideoPlan,
    /// `None` encodes without audio
    pub audio: Option<JobAudio>,
    pub codec: VideoCodecOptions,
    pub filters: VideoFilterChain,
    /// Prefix for the encoder's two-pass statistics files
    pub passlog_prefix: PathBuf,
    /// Raw user arguments, split with shell rules before the output path
    pub extra_args: String,
    /// Cap the encode would be verified against
    pub cap_bytes: u64,
}

/// State of one encode pass, folded line by line from ffmpeg's
/// `-progress pipe:1` stream
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct PassProgress {
    /// Output timestamp reached so far
    pub out_time_us: u64,
    pub speed: Option<f64>,
    /// Set by the trailing `progress=end` block
    pub finished: bool,
    /// Length of the clip being encoded, when the caller knows it
    pub planned_s: Option<f64>,
}

impl PassProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_planned(self, planned_s: f64) -> Self {
        Self {
            planned_s: Some(planned_s),
            ..self
        }
    }

    /// Fold one `key=value` line. Unknown keys and values ffmpeg reports as
    /// `N/A` leave the state alone.
    pub fn feed(&mut self, line: &str) {
        let Some((key, value)) = line.split_once('=') else {
            return;
        };
        let value = value.trim();
        match key.trim() {
            // older builds only print out_time_ms, which also counts microseconds
            "out_time_us" | "out_time_ms" => {
                self.out_time_us = value.parse().unwrap_or(self.out_time_us);
            }
            "speed" => {
                let rate = value.strip_suffix('x').unwrap_or(value);
                self.speed = rate.trim().parse().ok().or(self.speed);
            }
            "progress" => self.finished = value == "end",
            _ => {}
        }
    }

    pub fn elapsed_s(&self) -> f64 {
        self.out_time_us as f64 / 1_000_000.0
    }

    /// Share of the planned length encoded so far, 0 to 100
    pub fn percent(&self) -> Option<f64> {
        let planned = self.planned_s.filter(|d| *d > 0.0)?;
        if self.finished {
            return Some(100.0);
        }
        Some((self.elapsed_s() / planned * 100.0).min(100.0))
    }
}

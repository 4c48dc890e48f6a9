// Input probing using ffprobe

use crate::engine::core::{FitError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::process::Command;

/// Exact frame rate as reported by ffprobe (e.g. 30000/1001)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    /// Parse a fraction string like "30000/1001" or "30/1"
    pub fn parse(s: &str) -> Option<Self> {
        let (num, den) = s.trim().split_once('/')?;
        let num: u32 = num.trim().parse().ok()?;
        let den: u32 = den.trim().parse().ok()?;
        if den == 0 {
            return None;
        }
        Some(Self { num, den })
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// First video stream of an input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub duration: Option<f64>,
}

/// One audio stream of an input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub channel_layout: Option<String>,
    pub channels: Option<u32>,
    pub language: Option<String>,
}

/// Stream metadata the pipeline needs from a probing tool.
///
/// Implemented by [`FfprobeProbe`]; tests substitute canned answers.
pub trait MediaProbe {
    /// Container duration in seconds
    fn duration(&self, path: &Path) -> Result<f64>;

    /// Width and height of the first video stream
    fn dimensions(&self, path: &Path) -> Result<(u32, u32)>;

    /// Frame rate of the first video stream
    fn frame_rate(&self, path: &Path) -> Result<FrameRate>;

    /// All audio streams, in ffmpeg's `0:a:N` order
    fn audio_streams(&self, path: &Path) -> Result<Vec<AudioStreamInfo>>;

    /// Channel layout of audio track `track`; `Ok(None)` when there is no such stream
    fn channel_layout(&self, path: &Path, track: u32) -> Result<Option<String>> {
        let streams = self.audio_streams(path)?;
        match streams.into_iter().nth(track as usize) {
            Some(stream) => stream
                .channel_layout
                .map(Some)
                .ok_or_else(|| FitError::probe(path, "audio stream has no channel layout")),
            None => Ok(None),
        }
    }
}

/// Probes inputs by running `ffprobe` and parsing its JSON output
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    program: String,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self {
            program: "ffprobe".to_string(),
        }
    }
}

impl FfprobeProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run_json(&self, path: &Path, select: &str) -> Result<String> {
        let output = Command::new(&self.program)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-select_streams",
                select,
            ])
            .arg(path)
            .output()
            .map_err(|e| FitError::probe(path, format!("Failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(FitError::probe(
                path,
                format!(
                    "ffprobe exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Probe the first video stream
    pub fn probe_input_info(&self, path: &Path) -> Result<InputInfo> {
        let json = self.run_json(path, "v:0")?;
        parse_input_info(&json).map_err(|msg| FitError::probe(path, msg))
    }
}

impl MediaProbe for FfprobeProbe {
    fn duration(&self, path: &Path) -> Result<f64> {
        let json = self.run_json(path, "v:0")?;
        parse_input_info(&json)
            .ok()
            .and_then(|info| info.duration)
            .or_else(|| parse_format_duration(&json))
            .ok_or_else(|| FitError::probe(path, "No duration found in ffprobe output"))
    }

    fn dimensions(&self, path: &Path) -> Result<(u32, u32)> {
        let info = self.probe_input_info(path)?;
        Ok((info.width, info.height))
    }

    fn frame_rate(&self, path: &Path) -> Result<FrameRate> {
        Ok(self.probe_input_info(path)?.frame_rate)
    }

    fn audio_streams(&self, path: &Path) -> Result<Vec<AudioStreamInfo>> {
        let json = self.run_json(path, "a")?;
        parse_audio_streams(&json).map_err(|msg| FitError::probe(path, msg))
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    channel_layout: Option<String>,
    channels: Option<u32>,
    tags: Option<FfprobeTags>,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

fn parse_format_duration(json: &str) -> Option<f64> {
    let probe: FfprobeOutput = serde_json::from_str(json).ok()?;
    probe.format?.duration?.parse::<f64>().ok()
}

/// Parse `ffprobe -show_streams -show_format` JSON for a video stream
pub fn parse_input_info(json: &str) -> std::result::Result<InputInfo, String> {
    let probe: FfprobeOutput =
        serde_json::from_str(json).map_err(|e| format!("Failed to parse ffprobe JSON: {}", e))?;

    let stream = probe
        .streams
        .first()
        .ok_or_else(|| "No video stream found".to_string())?;

    let width = stream.width.ok_or("Failed to get video width")?;
    let height = stream.height.ok_or("Failed to get video height")?;

    // r_frame_rate is exact; avg_frame_rate is "0/0" for some containers
    let frame_rate = stream
        .r_frame_rate
        .as_deref()
        .and_then(FrameRate::parse)
        .or_else(|| stream.avg_frame_rate.as_deref().and_then(FrameRate::parse))
        .ok_or("Failed to parse video framerate")?;

    let duration = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok());

    Ok(InputInfo {
        width,
        height,
        frame_rate,
        duration,
    })
}

/// Parse `ffprobe -select_streams a` JSON into audio stream descriptions
pub fn parse_audio_streams(json: &str) -> std::result::Result<Vec<AudioStreamInfo>, String> {
    let probe: FfprobeOutput =
        serde_json::from_str(json).map_err(|e| format!("Failed to parse ffprobe JSON: {}", e))?;

    Ok(probe
        .streams
        .into_iter()
        .map(|s| AudioStreamInfo {
            channel_layout: s.channel_layout,
            channels: s.channels,
            language: s.tags.and_then(|t| t.language),
        })
        .collect())
}

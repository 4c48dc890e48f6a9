// Typed filter stages, rendered to ffmpeg filter text only when a command
// line is built.

use super::resolution::scale_filter;
use std::fmt;
use std::path::PathBuf;

/// One `-vf` stage. Declaration order is the chain order.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoFilter {
    /// Crop in source coordinates, e.g. `crop=1920:800:0:140`
    Crop(String),
    /// Bound the larger side to this many pixels
    Scale(u32),
    Fps(f64),
    /// Burn in a subtitle file
    Subtitles(PathBuf),
    /// User-supplied filter text, appended verbatim
    Custom(String),
}

impl VideoFilter {
    fn rank(&self) -> u8 {
        match self {
            VideoFilter::Crop(_) => 0,
            VideoFilter::Scale(_) => 1,
            VideoFilter::Fps(_) => 2,
            VideoFilter::Subtitles(_) => 3,
            VideoFilter::Custom(_) => 4,
        }
    }

    pub fn is_subtitles(&self) -> bool {
        matches!(self, VideoFilter::Subtitles(_))
    }
}

impl fmt::Display for VideoFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoFilter::Crop(crop) => {
                if crop.starts_with("crop=") {
                    f.write_str(crop)
                } else {
                    write!(f, "crop={}", crop)
                }
            }
            VideoFilter::Scale(max_dimension) => f.write_str(&scale_filter(*max_dimension)),
            VideoFilter::Fps(fps) => write!(f, "fps={}", fps),
            VideoFilter::Subtitles(path) => {
                write!(f, "subtitles='{}'", escape_filter_path(&path.to_string_lossy()))
            }
            VideoFilter::Custom(text) => f.write_str(text),
        }
    }
}

/// Escape a path for use inside a single-quoted filter argument
fn escape_filter_path(path: &str) -> String {
    path.replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "'\\''")
}

/// Video stages kept in crop, scale, fps, subtitles, custom order no matter
/// the order they are added in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoFilterChain {
    stages: Vec<VideoFilter>,
}

impl VideoFilterChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, filter: VideoFilter) {
        // Stable: equal ranks keep insertion order
        let at = self
            .stages
            .iter()
            .position(|s| s.rank() > filter.rank())
            .unwrap_or(self.stages.len());
        self.stages.insert(at, filter);
    }

    pub fn with(mut self, filter: VideoFilter) -> Self {
        self.push(filter);
        self
    }

    pub fn stages(&self) -> &[VideoFilter] {
        &self.stages
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn has_subtitles(&self) -> bool {
        self.stages.iter().any(VideoFilter::is_subtitles)
    }

    /// Comma-joined filter text, `None` when there are no stages
    pub fn render(&self) -> Option<String> {
        if self.stages.is_empty() {
            return None;
        }
        Some(
            self.stages
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

/// One `-af` stage
#[derive(Debug, Clone, PartialEq)]
pub enum AudioFilter {
    /// `aformat=channel_layouts=<layout>`, the multichannel workaround
    ChannelRemap(String),
    /// Second loudness pass with measured values
    Loudnorm(LoudnessParams),
    Custom(String),
}

impl fmt::Display for AudioFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioFilter::ChannelRemap(layout) => write!(f, "aformat=channel_layouts={}", layout),
            AudioFilter::Loudnorm(p) => write!(
                f,
                "loudnorm=linear=true:measured_I={}:measured_LRA={}:measured_tp={}:measured_thresh={}",
                p.input_i, p.input_lra, p.input_tp, p.input_thresh
            ),
            AudioFilter::Custom(text) => f.write_str(text),
        }
    }
}

/// Values measured by the first loudnorm pass, kept as ffmpeg printed them
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct LoudnessParams {
    pub input_i: String,
    pub input_lra: String,
    pub input_tp: String,
    pub input_thresh: String,
}

/// Render an audio chain; `None` when empty
pub fn render_audio_filters(filters: &[AudioFilter]) -> Option<String> {
    if filters.is_empty() {
        return None;
    }
    Some(
        filters
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(","),
    )
}

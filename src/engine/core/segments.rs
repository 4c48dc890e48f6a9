// Cut/concat planning: resolves user time ranges into an ordered keep set
// and the trim/concat filter graph that reassembles it.

use super::error::{FitError, Result};
use super::timestamp::parse_timestamp;
use serde::Serialize;
use std::fmt;

/// Half-open span of seconds relative to the clip's logical start
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

impl TimeRange {
    /// Returns None unless start < end
    pub fn new(start: f64, end: f64) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// How the user's ranges are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentMode {
    /// Ranges are removed, everything between them is kept
    Cut,
    /// Ranges are kept and concatenated in order
    Concat,
}

/// Boundary padding applied before merging (seconds)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Padding {
    pub before_s: f64,
    pub after_s: f64,
}

impl Padding {
    pub fn from_millis(before_ms: u32, after_ms: u32) -> Self {
        Self {
            before_s: before_ms as f64 / 1000.0,
            after_s: after_ms as f64 / 1000.0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.before_s <= 0.0 && self.after_s <= 0.0
    }
}

/// A cut or concat request as given by the user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentRequest {
    pub mode: SegmentMode,
    /// Semicolon-separated `start-end` absolute timestamps
    pub spec: String,
    #[serde(default)]
    pub padding: Padding,
}

/// Disjoint kept ranges, strictly increasing by start
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SegmentSet {
    ranges: Vec<TimeRange>,
}

impl SegmentSet {
    pub fn ranges(&self) -> &[TimeRange] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total kept time in seconds
    pub fn total_duration(&self) -> f64 {
        self.ranges.iter().map(TimeRange::duration).sum()
    }

    /// Sort by start and fold overlapping (or touching) intervals together
    pub fn merged(mut ranges: Vec<TimeRange>) -> Self {
        ranges.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut merged: Vec<TimeRange> = Vec::with_capacity(ranges.len());
        for current in ranges {
            match merged.last_mut() {
                Some(last) if current.start <= last.end => {
                    last.end = last.end.max(current.end);
                }
                _ => merged.push(current),
            }
        }
        Self { ranges: merged }
    }

    /// Build the trim/concat graph for these segments
    pub fn filter_graph(&self, with_audio: bool) -> SegmentGraph<'_> {
        SegmentGraph {
            segments: self,
            with_audio,
        }
    }
}

/// Parse `start-end;start-end` absolute timestamps into clip-relative ranges
pub fn parse_segments(spec: &str, clip_start: f64) -> Result<Vec<TimeRange>> {
    let mut ranges = Vec::new();

    for token in spec.split(';').map(str::trim).filter(|t| !t.is_empty()) {
        let (start_str, end_str) = token
            .split_once('-')
            .ok_or_else(|| FitError::invalid_segment(token, "expected 'start-end'"))?;

        let start = parse_timestamp(start_str)
            .ok_or_else(|| FitError::invalid_segment(token, "unparseable start timestamp"))?;
        let end = parse_timestamp(end_str)
            .ok_or_else(|| FitError::invalid_segment(token, "unparseable end timestamp"))?;

        if start < clip_start || end < clip_start {
            return Err(FitError::invalid_segment(
                token,
                format!("starts before the clip start of {:.3}s", clip_start),
            ));
        }

        let range = TimeRange::new(start - clip_start, end - clip_start)
            .ok_or_else(|| FitError::invalid_segment(token, "end must be after start"))?;
        ranges.push(range);
    }

    if ranges.is_empty() {
        return Err(FitError::invalid_segment(spec, "no segments given"));
    }
    Ok(ranges)
}

/// Invert cut ranges into the ranges kept between them
pub fn plan_cut(cuts: Vec<TimeRange>, clip_duration: f64) -> Result<SegmentSet> {
    if let Some(bad) = cuts.iter().find(|c| c.start >= clip_duration) {
        return Err(FitError::invalid_segment(
            format!("{:.3}-{:.3}", bad.start, bad.end),
            format!("starts past the clip end of {:.3}s", clip_duration),
        ));
    }

    let cuts = SegmentSet::merged(cuts);
    let mut keep = Vec::with_capacity(cuts.len() + 1);
    let mut cursor = 0.0;

    for cut in cuts.ranges() {
        if let Some(range) = TimeRange::new(cursor, cut.start) {
            keep.push(range);
        }
        cursor = cut.end.min(clip_duration);
    }
    if let Some(range) = TimeRange::new(cursor, clip_duration) {
        keep.push(range);
    }

    if keep.is_empty() {
        return Err(FitError::EmptySegmentSet);
    }
    Ok(SegmentSet { ranges: keep })
}

/// Trim ranges to the clip. A range starting at or past the end is invalid;
/// one running past it is cut short.
pub fn clamp_to_clip(ranges: Vec<TimeRange>, clip_duration: f64) -> Result<Vec<TimeRange>> {
    ranges
        .into_iter()
        .map(|range| {
            TimeRange::new(range.start, range.end.min(clip_duration)).ok_or_else(|| {
                FitError::invalid_segment(
                    format!("{:.3}-{:.3}", range.start, range.end),
                    format!("starts past the clip end of {:.3}s", clip_duration),
                )
            })
        })
        .collect()
}

/// Keep the given ranges, clamped to the clip; they must not overlap
pub fn plan_concat(ranges: Vec<TimeRange>, clip_duration: f64) -> Result<SegmentSet> {
    let mut ranges = clamp_to_clip(ranges, clip_duration)?;
    ranges.sort_by(|a, b| a.start.total_cmp(&b.start));

    for pair in ranges.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(FitError::invalid_segment(
                format!("{:.3}-{:.3}", pair[1].start, pair[1].end),
                "overlaps the previous segment",
            ));
        }
    }
    if ranges.is_empty() {
        return Err(FitError::EmptySegmentSet);
    }
    Ok(SegmentSet { ranges })
}

/// Widen each range by `padding`, never crossing into a neighbour's original
/// bounds (or past `clip_end`), then merge whatever now overlaps.
pub fn pad_and_merge(ranges: &[TimeRange], padding: Padding, clip_end: f64) -> SegmentSet {
    let mut sorted = ranges.to_vec();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let padded: Vec<TimeRange> = sorted
        .iter()
        .enumerate()
        .map(|(idx, range)| {
            let prev_end = if idx == 0 { 0.0 } else { sorted[idx - 1].end };
            let next_start = sorted.get(idx + 1).map_or(clip_end, |next| next.start);

            let start = (range.start - padding.before_s).max(prev_end.min(range.start));
            let end = (range.end + padding.after_s).min(next_start.max(range.end));
            TimeRange { start, end }
        })
        .collect();

    SegmentSet::merged(padded)
}

/// One second from every minute of the clip
pub fn first_second_every_minute(duration: f64) -> Vec<TimeRange> {
    let mut ranges = Vec::new();
    let mut t = 0.0;
    while t <= duration - 1.0 {
        ranges.push(TimeRange {
            start: t,
            end: t + 1.0,
        });
        t += 60.0;
    }
    ranges
}

/// Which stream a trim stage applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    fn label_prefix(self) -> char {
        match self {
            StreamKind::Video => 'v',
            StreamKind::Audio => 'a',
        }
    }
}

/// Typed view of the trim/concat graph; rendered to text only on demand
#[derive(Debug, Clone, Copy)]
pub struct SegmentGraph<'a> {
    segments: &'a SegmentSet,
    with_audio: bool,
}

impl SegmentGraph<'_> {
    pub const VIDEO_OUT: &'static str = "[outv]";
    pub const AUDIO_OUT: &'static str = "[outa]";

    pub fn has_audio(&self) -> bool {
        self.with_audio
    }

    fn write_stream(&self, f: &mut fmt::Formatter<'_>, kind: StreamKind) -> fmt::Result {
        let prefix = kind.label_prefix();
        let (trim, setpts) = match kind {
            StreamKind::Video => ("trim", "setpts"),
            StreamKind::Audio => ("atrim", "asetpts"),
        };

        for (idx, range) in self.segments.ranges().iter().enumerate() {
            write!(
                f,
                "[0]{}=start={}:end={},{}=PTS-STARTPTS[{}{}];",
                trim,
                fmt_seconds(range.start),
                fmt_seconds(range.end),
                setpts,
                prefix,
                idx + 1
            )?;
        }
        for idx in 1..=self.segments.len() {
            write!(f, "[{}{}]", prefix, idx)?;
        }
        match kind {
            StreamKind::Video => write!(
                f,
                "concat=n={}:v=1:a=0{}",
                self.segments.len(),
                Self::VIDEO_OUT
            ),
            StreamKind::Audio => write!(
                f,
                "concat=n={}:v=0:a=1{}",
                self.segments.len(),
                Self::AUDIO_OUT
            ),
        }
    }
}

impl fmt::Display for SegmentGraph<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_stream(f, StreamKind::Video)?;
        if self.with_audio {
            f.write_str(";")?;
            self.write_stream(f, StreamKind::Audio)?;
        }
        Ok(())
    }
}

/// Seconds with at most millisecond precision and no trailing zeros
pub(crate) fn fmt_seconds(seconds: f64) -> String {
    let s = format!("{:.3}", seconds);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}
